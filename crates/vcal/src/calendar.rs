use crate::component::Component;
use crate::parser::{parse_tree, RawComponent};
use crate::property::Property;
use crate::writer;
use crate::{Result, VcalError};

/// A parsed VCALENDAR: the iTip METHOD, the calendar-level properties,
/// any non-scheduling subtrees kept verbatim (VTIMEZONE), and the
/// VEVENT/VTODO components.
///
/// Invariant maintained by the handlers: at most one component lacks a
/// RECURRENCE-ID (the master); the rest are exceptions to it.
#[derive(Debug, Clone)]
pub struct Calendar {
    pub method: Option<String>,
    pub properties: Vec<Property>,
    pub raw_components: Vec<RawComponent>,
    pub components: Vec<Component>,
}

impl Calendar {
    pub fn parse(text: &str) -> Result<Self> {
        let root = parse_tree(text)?;
        if root.name != "VCALENDAR" {
            return Err(VcalError::NotVcalendar);
        }

        let mut cal = Calendar {
            method: None,
            properties: Vec::new(),
            raw_components: Vec::new(),
            components: Vec::new(),
        };

        for prop in root.properties {
            if prop.name == "METHOD" {
                cal.method = Some(prop.value.trim().to_ascii_uppercase());
            } else {
                cal.properties.push(prop);
            }
        }

        for child in root.children {
            match Component::from_raw(child) {
                Ok(comp) => cal.components.push(comp),
                Err(raw) => cal.raw_components.push(raw),
            }
        }

        Ok(cal)
    }

    /// The master: the first component without a RECURRENCE-ID, or the
    /// first component at all when every one is an exception.
    pub fn main_component(&self) -> Option<&Component> {
        self.main_component_index().map(|i| &self.components[i])
    }

    pub fn main_component_index(&self) -> Option<usize> {
        self.components
            .iter()
            .position(|c| c.recurrence_id.is_none())
            .or(if self.components.is_empty() {
                None
            } else {
                Some(0)
            })
    }

    /// The exception whose RECURRENCE-ID equals `recurrence_id` exactly
    /// (no timezone normalization).
    pub fn instance_component(&self, recurrence_id: &str) -> Option<&Component> {
        self.instance_component_index(recurrence_id)
            .map(|i| &self.components[i])
    }

    pub fn instance_component_index(&self, recurrence_id: &str) -> Option<usize> {
        self.components
            .iter()
            .position(|c| c.recurrence_id_value() == Some(recurrence_id))
    }

    /// Serialize, METHOD included.
    pub fn to_ical(&self) -> String {
        writer::write(self, true)
    }

    /// Serialize for submission to the calendar store: stored objects
    /// carry no METHOD.
    pub fn to_store_ical(&self) -> String {
        writer::write(self, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::{cal_address_email, cal_address_name, rrule_until};

    const REQUEST_ICS: &str = concat!(
        "BEGIN:VCALENDAR\r\n",
        "VERSION:2.0\r\n",
        "PRODID:-//Example//Example//EN\r\n",
        "METHOD:REQUEST\r\n",
        "BEGIN:VTIMEZONE\r\n",
        "TZID:Europe/Berlin\r\n",
        "BEGIN:STANDARD\r\n",
        "TZOFFSETFROM:+0200\r\n",
        "TZOFFSETTO:+0100\r\n",
        "DTSTART:19961027T030000\r\n",
        "END:STANDARD\r\n",
        "END:VTIMEZONE\r\n",
        "BEGIN:VEVENT\r\n",
        "UID:5463F1DD-D9F1\r\n",
        "DTSTAMP:20240701T090000Z\r\n",
        "DTSTART;TZID=Europe/Berlin:20240710T103000\r\n",
        "SUMMARY:Test Meeting\r\n",
        "SEQUENCE:1\r\n",
        "RRULE:FREQ=WEEKLY;UNTIL=20240901T000000Z\r\n",
        "ORGANIZER;CN=Jack:mailto:jack@example.com\r\n",
        "ATTENDEE;CN=John;ROLE=REQ-PARTICIPANT;PARTSTAT=NEEDS-ACTION:mailto:john@e\r\n",
        " xample.com\r\n",
        "END:VEVENT\r\n",
        "BEGIN:VEVENT\r\n",
        "UID:5463F1DD-D9F1\r\n",
        "RECURRENCE-ID:20240717T103000\r\n",
        "DTSTART;TZID=Europe/Berlin:20240717T123000\r\n",
        "SUMMARY:Test Meeting\r\n",
        "SEQUENCE:1\r\n",
        "END:VEVENT\r\n",
        "END:VCALENDAR\r\n",
    );

    #[test]
    fn parses_request() {
        let cal = Calendar::parse(REQUEST_ICS).unwrap();
        k9::assert_equal!(cal.method.as_deref(), Some("REQUEST"));
        k9::assert_equal!(cal.raw_components.len(), 1);
        k9::assert_equal!(cal.raw_components[0].name, "VTIMEZONE");
        k9::assert_equal!(cal.components.len(), 2);

        let master = cal.main_component().unwrap();
        k9::assert_equal!(master.uid.as_deref(), Some("5463F1DD-D9F1"));
        k9::assert_equal!(master.sequence_or_default(), 1);
        k9::assert_equal!(master.summary_text(), Some("Test Meeting".to_string()));
        k9::assert_equal!(
            master.dtstart_display(),
            Some("2024-07-10 10:30".to_string())
        );
        assert!(master.recurrence_id.is_none());

        let organizer = master.organizer.as_ref().unwrap();
        k9::assert_equal!(cal_address_email(organizer), "jack@example.com");
        k9::assert_equal!(cal_address_name(organizer), Some("Jack"));

        // The folded attendee line was reassembled
        let attendee = &master.attendees[0];
        k9::assert_equal!(cal_address_email(attendee), "john@example.com");
        k9::assert_equal!(attendee.param("PARTSTAT"), Some("NEEDS-ACTION"));

        let until = rrule_until(master.rrule.as_deref().unwrap()).unwrap();
        k9::assert_equal!(until.format("%Y%m%d").to_string(), "20240901");

        let exception = cal.instance_component("20240717T103000").unwrap();
        k9::assert_equal!(
            exception.dtstart_display(),
            Some("2024-07-17 12:30".to_string())
        );
        assert!(cal.instance_component("20990101T000000").is_none());
    }

    #[test]
    fn rejects_non_vcalendar_root() {
        let err = Calendar::parse("BEGIN:VCARD\r\nFN:Jane\r\nEND:VCARD\r\n").unwrap_err();
        k9::assert_equal!(err, VcalError::NotVcalendar);
    }

    #[test]
    fn tolerates_junk_lines() {
        let text = concat!(
            "BEGIN:VCALENDAR\r\n",
            "this line is junk\r\n",
            "METHOD:reply\r\n",
            "BEGIN:VEVENT\r\n",
            "UID:u1\r\n",
            "END:VEVENT\r\n",
            "END:VCALENDAR\r\n",
        );
        let cal = Calendar::parse(text).unwrap();
        k9::assert_equal!(cal.method.as_deref(), Some("REPLY"));
        k9::assert_equal!(cal.components.len(), 1);
    }

    #[test]
    fn store_serialization_drops_method() {
        let cal = Calendar::parse(REQUEST_ICS).unwrap();

        let with_method = cal.to_ical();
        assert!(with_method.contains("METHOD:REQUEST\r\n"));

        let stored = cal.to_store_ical();
        assert!(!stored.contains("METHOD"));
        assert!(stored.starts_with("BEGIN:VCALENDAR\r\n"));
        assert!(stored.ends_with("END:VCALENDAR\r\n"));
        assert!(stored.contains("BEGIN:VTIMEZONE\r\n"));
        assert!(stored.contains("UID:5463F1DD-D9F1\r\n"));
    }

    #[test]
    fn write_parse_round_trip() {
        let cal = Calendar::parse(REQUEST_ICS).unwrap();
        let rewritten = Calendar::parse(&cal.to_ical()).unwrap();

        k9::assert_equal!(rewritten.method, cal.method);
        k9::assert_equal!(rewritten.components.len(), cal.components.len());
        let master = rewritten.main_component().unwrap();
        k9::assert_equal!(master.uid.as_deref(), Some("5463F1DD-D9F1"));
        k9::assert_equal!(
            master.attendees[0].param("PARTSTAT"),
            Some("NEEDS-ACTION")
        );
        k9::assert_equal!(
            rewritten.instance_component("20240717T103000").is_some(),
            true
        );
    }

    #[test]
    fn exdate_append() {
        let mut cal = Calendar::parse(REQUEST_ICS).unwrap();
        let idx = cal.main_component_index().unwrap();
        let date = crate::parse_timestamp("20240717T103000").unwrap().date();
        cal.components[idx].push_exdate(date);

        let text = cal.to_store_ical();
        assert!(text.contains("EXDATE;VALUE=DATE:20240717\r\n"));
    }
}
