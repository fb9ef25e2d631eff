use chrono::{NaiveDate, NaiveDateTime};

/// One iCalendar content line: `NAME;PARAM=VALUE:value`.
/// Names and parameter names are stored uppercase; the value is kept raw
/// (escaped) so round-tripping does not mangle it.
#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    pub name: String,
    pub params: Vec<(String, String)>,
    pub value: String,
}

impl Property {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into().to_ascii_uppercase(),
            params: Vec::new(),
            value: value.into(),
        }
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_param(name, value);
        self
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn set_param(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into().to_ascii_uppercase();
        let value = value.into();
        if let Some(entry) = self.params.iter_mut().find(|(n, _)| n == &name) {
            entry.1 = value;
        } else {
            self.params.push((name, value));
        }
    }
}

/// Lowercased email form of a calendar user address value, with any
/// `mailto:` prefix stripped.
pub fn cal_address_email(prop: &Property) -> String {
    let value = prop.value.trim();
    let value = if value.len() >= 7 && value[..7].eq_ignore_ascii_case("mailto:") {
        &value[7..]
    } else {
        value
    };
    value.to_ascii_lowercase()
}

/// The display name (`CN` parameter) of a calendar user address.
pub fn cal_address_name(prop: &Property) -> Option<&str> {
    prop.param("CN")
}

/// Unescape an iCalendar TEXT value.
pub fn unescape_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') | Some('N') => out.push('\n'),
                Some(other) => out.push(other),
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Escape a string for use as an iCalendar TEXT value.
pub fn escape_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            ';' => out.push_str("\\;"),
            ',' => out.push_str("\\,"),
            '\n' => out.push_str("\\n"),
            '\r' => {}
            _ => out.push(c),
        }
    }
    out
}

/// Parse an iCalendar DATE or DATE-TIME value. A trailing `Z` is
/// accepted and dropped; no timezone normalization is applied.
pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim().trim_end_matches(['Z', 'z']);
    if let Ok(dt) = NaiveDateTime::parse_from_str(value, "%Y%m%dT%H%M%S") {
        return Some(dt);
    }
    NaiveDate::parse_from_str(value, "%Y%m%d").ok()?.and_hms_opt(0, 0, 0)
}

/// The UNTIL bound of a raw RRULE value, if present.
pub fn rrule_until(rrule: &str) -> Option<NaiveDateTime> {
    rrule.split(';').find_map(|part| {
        let (name, value) = part.split_once('=')?;
        if name.trim().eq_ignore_ascii_case("UNTIL") {
            parse_timestamp(value)
        } else {
            None
        }
    })
}
