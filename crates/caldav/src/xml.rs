use crate::types::{CalendarObject, Folder};
use crate::{DavError, Result};
use percent_encoding::percent_decode_str;
use quick_xml::events::{BytesEnd, BytesStart, Event};
use quick_xml::Reader;

pub(crate) const PROPFIND_PRINCIPAL: &str = concat!(
    "<?xml version=\"1.0\" encoding=\"utf-8\"?>",
    "<d:propfind xmlns:d=\"DAV:\">",
    "<d:prop><d:current-user-principal/></d:prop>",
    "</d:propfind>",
);

pub(crate) const PROPFIND_HOME: &str = concat!(
    "<?xml version=\"1.0\" encoding=\"utf-8\"?>",
    "<d:propfind xmlns:d=\"DAV:\" xmlns:c=\"urn:ietf:params:xml:ns:caldav\">",
    "<d:prop><c:calendar-home-set/></d:prop>",
    "</d:propfind>",
);

pub(crate) const PROPFIND_FOLDERS: &str = concat!(
    "<?xml version=\"1.0\" encoding=\"utf-8\"?>",
    "<d:propfind xmlns:d=\"DAV:\" xmlns:c=\"urn:ietf:params:xml:ns:caldav\">",
    "<d:prop>",
    "<d:resourcetype/>",
    "<d:displayname/>",
    "<d:owner/>",
    "<c:supported-calendar-component-set/>",
    "</d:prop>",
    "</d:propfind>",
);

pub(crate) fn calendar_query(component: &str, uid: &str) -> String {
    format!(
        concat!(
            "<?xml version=\"1.0\" encoding=\"utf-8\"?>",
            "<c:calendar-query xmlns:d=\"DAV:\" xmlns:c=\"urn:ietf:params:xml:ns:caldav\">",
            "<d:prop><d:getetag/><c:calendar-data/></d:prop>",
            "<c:filter>",
            "<c:comp-filter name=\"VCALENDAR\">",
            "<c:comp-filter name=\"{component}\">",
            "<c:prop-filter name=\"UID\">",
            "<c:text-match collation=\"i;octet\">{uid}</c:text-match>",
            "</c:prop-filter>",
            "</c:comp-filter>",
            "</c:comp-filter>",
            "</c:filter>",
            "</c:calendar-query>",
        ),
        component = xml_escape(component),
        uid = xml_escape(uid),
    )
}

pub(crate) fn xml_escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

fn start_name(e: &BytesStart) -> Result<String> {
    std::str::from_utf8(e.local_name().as_ref())
        .map(str::to_string)
        .map_err(|err| DavError::Xml(err.to_string()))
}

fn end_name(e: &BytesEnd) -> Result<String> {
    std::str::from_utf8(e.local_name().as_ref())
        .map(str::to_string)
        .map_err(|err| DavError::Xml(err.to_string()))
}

fn name_attr(e: &BytesStart) -> Option<String> {
    e.attributes().flatten().find_map(|attr| {
        if attr.key.local_name().as_ref() == b"name" {
            Some(String::from_utf8_lossy(&attr.value).to_string())
        } else {
            None
        }
    })
}

/// Derive an owner email address from a principal or collection href,
/// e.g. `/dav/principals/user/john%40example.com/`.
pub(crate) fn owner_from_href(href: &str) -> String {
    let decoded = percent_decode_str(href).decode_utf8_lossy();
    let segments: Vec<&str> = decoded.trim_matches('/').split('/').collect();
    if let Some(pos) = segments.iter().position(|s| *s == "user") {
        if let Some(owner) = segments.get(pos + 1) {
            return owner.to_ascii_lowercase();
        }
    }
    segments
        .iter()
        .rev()
        .find(|s| s.contains('@'))
        .map(|s| s.to_ascii_lowercase())
        .unwrap_or_default()
}

/// Extract the text of the first `<href>` found inside `container`.
pub(crate) fn parse_prop_href(xml: &str, container: &str) -> Result<Option<String>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut path: Vec<String> = Vec::new();
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => path.push(start_name(&e)?),
            Ok(Event::End(_)) => {
                path.pop();
            }
            Ok(Event::Text(e)) => {
                if path.last().map(String::as_str) == Some("href")
                    && path.iter().any(|n| n == container)
                {
                    let text = e
                        .unescape()
                        .map_err(|err| DavError::Xml(err.to_string()))?
                        .to_string();
                    return Ok(Some(text));
                }
            }
            Ok(Event::Eof) => return Ok(None),
            Err(err) => return Err(DavError::Xml(err.to_string())),
            _ => {}
        }
    }
}

/// Parse a PROPFIND multistatus into folder descriptions.
pub(crate) fn parse_folders(xml: &str) -> Result<Vec<Folder>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut folders = Vec::new();
    let mut current: Option<Folder> = None;
    let mut path: Vec<String> = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = start_name(&e)?;
                if name == "response" {
                    current = Some(Folder::default());
                } else if let Some(folder) = current.as_mut() {
                    if path.iter().any(|n| n == "resourcetype") {
                        folder.types.push(name.clone());
                    }
                }
                path.push(name);
            }
            Ok(Event::Empty(e)) => {
                let name = start_name(&e)?;
                if let Some(folder) = current.as_mut() {
                    if path.iter().any(|n| n == "resourcetype") {
                        folder.types.push(name);
                    } else if name == "comp"
                        && path
                            .iter()
                            .any(|n| n == "supported-calendar-component-set")
                    {
                        if let Some(value) = name_attr(&e) {
                            folder.components.push(value);
                        }
                    }
                }
            }
            Ok(Event::Text(e)) => {
                if let Some(folder) = current.as_mut() {
                    let text = e
                        .unescape()
                        .map_err(|err| DavError::Xml(err.to_string()))?
                        .to_string();
                    match path.last().map(String::as_str) {
                        Some("href") => {
                            if path.iter().any(|n| n == "owner") {
                                folder.owner = owner_from_href(&text);
                            } else if path.iter().rev().nth(1).map(String::as_str)
                                == Some("response")
                            {
                                folder.href = text;
                            }
                        }
                        Some("displayname") => folder.name = text,
                        _ => {}
                    }
                }
            }
            Ok(Event::End(e)) => {
                if end_name(&e)? == "response" {
                    if let Some(folder) = current.take() {
                        folders.push(folder);
                    }
                }
                path.pop();
            }
            Ok(Event::Eof) => break,
            Err(err) => return Err(DavError::Xml(err.to_string())),
            _ => {}
        }
    }

    Ok(folders)
}

/// Parse a REPORT multistatus into calendar objects (href +
/// calendar-data).
pub(crate) fn parse_report(xml: &str) -> Result<Vec<CalendarObject>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut objects = Vec::new();
    let mut href = String::new();
    let mut data = String::new();
    let mut path: Vec<String> = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = start_name(&e)?;
                if name == "response" {
                    href.clear();
                    data.clear();
                }
                path.push(name);
            }
            Ok(Event::Text(e)) => {
                let text = e
                    .unescape()
                    .map_err(|err| DavError::Xml(err.to_string()))?
                    .to_string();
                match path.last().map(String::as_str) {
                    Some("href") => href = text,
                    Some("calendar-data") => data.push_str(&text),
                    _ => {}
                }
            }
            Ok(Event::CData(e)) => {
                if path.last().map(String::as_str) == Some("calendar-data") {
                    data.push_str(&String::from_utf8_lossy(&e.into_inner()));
                }
            }
            Ok(Event::End(e)) => {
                if end_name(&e)? == "response" && !href.is_empty() && !data.is_empty() {
                    objects.push(CalendarObject {
                        href: std::mem::take(&mut href),
                        data: std::mem::take(&mut data),
                    });
                }
                path.pop();
            }
            Ok(Event::Eof) => break,
            Err(err) => return Err(DavError::Xml(err.to_string())),
            _ => {}
        }
    }

    Ok(objects)
}
