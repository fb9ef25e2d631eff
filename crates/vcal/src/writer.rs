use crate::calendar::Calendar;
use crate::parser::RawComponent;
use crate::property::Property;

pub(crate) fn write(cal: &Calendar, include_method: bool) -> String {
    let mut out = String::new();
    fold_line("BEGIN:VCALENDAR", &mut out);

    if !cal.properties.iter().any(|p| p.name == "VERSION") {
        fold_line("VERSION:2.0", &mut out);
    }
    if include_method {
        if let Some(method) = &cal.method {
            fold_line(&format!("METHOD:{method}"), &mut out);
        }
    }
    for prop in &cal.properties {
        write_property(prop, &mut out);
    }
    for raw in &cal.raw_components {
        write_raw(raw, &mut out);
    }
    for comp in &cal.components {
        write_raw(&comp.to_raw(), &mut out);
    }

    fold_line("END:VCALENDAR", &mut out);
    out
}

fn write_raw(raw: &RawComponent, out: &mut String) {
    fold_line(&format!("BEGIN:{}", raw.name), out);
    for prop in &raw.properties {
        write_property(prop, out);
    }
    for child in &raw.children {
        write_raw(child, out);
    }
    fold_line(&format!("END:{}", raw.name), out);
}

fn write_property(prop: &Property, out: &mut String) {
    let mut line = prop.name.clone();
    for (name, value) in &prop.params {
        line.push(';');
        line.push_str(name);
        line.push('=');
        if value.contains([';', ':', ',']) {
            line.push('"');
            line.push_str(value);
            line.push('"');
        } else {
            line.push_str(value);
        }
    }
    line.push(':');
    line.push_str(&prop.value);
    fold_line(&line, out);
}

/// Emit one content line folded at 75 octets with CRLF + space
/// continuations, splitting only on character boundaries.
fn fold_line(line: &str, out: &mut String) {
    let mut remaining = line;
    let mut first = true;
    loop {
        let limit = if first { 75 } else { 74 };
        if !first {
            out.push(' ');
        }
        if remaining.len() <= limit {
            out.push_str(remaining);
            break;
        }
        let mut cut = limit;
        while !remaining.is_char_boundary(cut) {
            cut -= 1;
        }
        out.push_str(&remaining[..cut]);
        out.push_str("\r\n");
        remaining = &remaining[cut..];
        first = false;
    }
    out.push_str("\r\n");
}
