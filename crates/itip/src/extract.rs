use crate::Result;
use mimeview::MailParser;
use vcal::{Calendar, ComponentKind};

const CALENDAR_TYPES: &[&str] = &["text/calendar", "text/x-vcalendar", "application/ics"];

/// Locate the iTip payload in a message: either the whole body of a
/// calendar-typed message, or the body of the first calendar-typed
/// top-level part of a multipart/mixed or multipart/alternative message.
/// Anything else is not a scheduling message.
pub fn itip_payload(parser: &mut MailParser) -> Result<Option<String>> {
    match parser.content_type() {
        Some(ctype) if CALENDAR_TYPES.contains(&ctype) => {
            return Ok(Some(parser.body()?));
        }
        Some("multipart/mixed") | Some("multipart/alternative") => {}
        _ => return Ok(None),
    }

    let part_id = parser.parts()?.iter().position(|part| {
        part.content_type()
            .is_some_and(|ctype| CALENDAR_TYPES.contains(&ctype))
    });

    match part_id {
        Some(id) => Ok(Some(parser.part_body(id)?)),
        None => Ok(None),
    }
}

/// A parsed iTip payload, pinned to the UID and component type of its
/// first scheduling component.
#[derive(Debug, Clone)]
pub struct ItipDocument {
    pub calendar: Calendar,
    pub uid: String,
    pub kind: ComponentKind,
}

impl ItipDocument {
    /// Parse permissively. Returns None when the text is not a usable
    /// scheduling payload: unparseable, not a VCALENDAR, no scheduling
    /// component, or no UID. Components whose UID or type differ from
    /// the first one are pruned rather than rejected.
    pub fn parse(text: &str) -> Option<Self> {
        let mut calendar = Calendar::parse(text).ok()?;

        let (uid, kind) = {
            let first = calendar.components.first()?;
            (first.uid.clone()?, first.kind)
        };
        if uid.is_empty() {
            return None;
        }

        let before = calendar.components.len();
        calendar
            .components
            .retain(|c| c.kind == kind && c.uid.as_deref() == Some(uid.as_str()));
        if calendar.components.len() != before {
            tracing::debug!(uid, "pruned components with a foreign UID from iTip payload");
        }

        Some(Self {
            calendar,
            uid,
            kind,
        })
    }

    pub fn method(&self) -> Option<&str> {
        self.calendar.method.as_deref()
    }
}
