use crate::{Property, Result, VcalError};

/// A component subtree kept verbatim (VTIMEZONE, VALARM, unknown types).
#[derive(Debug, Clone, PartialEq)]
pub struct RawComponent {
    pub name: String,
    pub properties: Vec<Property>,
    pub children: Vec<RawComponent>,
}

impl RawComponent {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into().to_ascii_uppercase(),
            properties: Vec::new(),
            children: Vec::new(),
        }
    }
}

/// Parse iCalendar text into a component tree. The parser is permissive:
/// lines that do not form a valid content line are skipped, stray END
/// lines are ignored and an unterminated component is closed at EOF.
pub(crate) fn parse_tree(text: &str) -> Result<RawComponent> {
    let mut root: Option<RawComponent> = None;
    let mut stack: Vec<RawComponent> = Vec::new();

    for line in unfold(text) {
        let Some(prop) = parse_content_line(&line) else {
            continue;
        };

        match prop.name.as_str() {
            "BEGIN" => {
                stack.push(RawComponent::new(prop.value.trim()));
            }
            "END" => {
                let Some(done) = stack.pop() else {
                    continue;
                };
                match stack.last_mut() {
                    Some(parent) => parent.children.push(done),
                    None => {
                        if root.is_none() {
                            root = Some(done);
                        }
                    }
                }
            }
            _ => {
                if let Some(top) = stack.last_mut() {
                    top.properties.push(prop);
                }
            }
        }
    }

    while let Some(done) = stack.pop() {
        match stack.last_mut() {
            Some(parent) => parent.children.push(done),
            None => {
                if root.is_none() {
                    root = Some(done);
                }
            }
        }
    }

    root.ok_or_else(|| VcalError::Parse("no component found".to_string()))
}

/// Unfold CRLF + WSP continuation lines into logical lines.
fn unfold(text: &str) -> Vec<String> {
    let mut lines: Vec<String> = Vec::new();
    for line in text.split('\n') {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if (line.starts_with(' ') || line.starts_with('\t')) && !lines.is_empty() {
            let last = lines.last_mut().unwrap();
            last.push_str(&line[1..]);
        } else {
            lines.push(line.to_string());
        }
    }
    lines
}

/// Parse one logical content line. Returns None for lines that carry no
/// property (blank lines, junk without a colon, invalid names).
fn parse_content_line(line: &str) -> Option<Property> {
    let mut in_quotes = false;
    let mut colon = None;
    for (i, c) in line.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            ':' if !in_quotes => {
                colon = Some(i);
                break;
            }
            _ => {}
        }
    }
    let colon = colon?;
    let (head, value) = (&line[..colon], &line[colon + 1..]);

    let mut segments: Vec<&str> = Vec::new();
    let mut in_quotes = false;
    let mut start = 0;
    for (i, c) in head.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            ';' if !in_quotes => {
                segments.push(&head[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    segments.push(&head[start..]);

    let name = segments[0].trim();
    if name.is_empty()
        || !name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-')
    {
        return None;
    }

    let mut prop = Property {
        name: name.to_ascii_uppercase(),
        params: Vec::new(),
        value: value.to_string(),
    };
    for segment in &segments[1..] {
        if let Some((pname, pvalue)) = segment.split_once('=') {
            let mut pvalue = pvalue.trim();
            if pvalue.len() >= 2 && pvalue.starts_with('"') && pvalue.ends_with('"') {
                pvalue = &pvalue[1..pvalue.len() - 1];
            }
            prop.params
                .push((pname.trim().to_ascii_uppercase(), pvalue.to_string()));
        }
    }
    Some(prop)
}
