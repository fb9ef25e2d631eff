use crate::parser::RawComponent;
use crate::property::{parse_timestamp, unescape_text, Property};
use chrono::NaiveDate;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentKind {
    Event,
    Todo,
}

impl ComponentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentKind::Event => "VEVENT",
            ComponentKind::Todo => "VTODO",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "VEVENT" => Some(ComponentKind::Event),
            "VTODO" => Some(ComponentKind::Todo),
            _ => None,
        }
    }
}

/// One VEVENT or VTODO. The properties this filter reasons about are
/// lifted into typed fields; everything else rides along in `other` and
/// `children` so the object can be written back without loss.
#[derive(Debug, Clone)]
pub struct Component {
    pub kind: ComponentKind,
    pub uid: Option<String>,
    pub sequence: Option<i64>,
    pub recurrence_id: Option<Property>,
    pub organizer: Option<Property>,
    pub attendees: Vec<Property>,
    pub rrule: Option<String>,
    pub exdates: Vec<Property>,
    pub summary: Option<Property>,
    pub dtstart: Option<Property>,
    pub comment: Option<Property>,
    pub other: Vec<Property>,
    pub children: Vec<RawComponent>,
}

impl Component {
    pub fn new(kind: ComponentKind) -> Self {
        Self {
            kind,
            uid: None,
            sequence: None,
            recurrence_id: None,
            organizer: None,
            attendees: Vec::new(),
            rrule: None,
            exdates: Vec::new(),
            summary: None,
            dtstart: None,
            comment: None,
            other: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Lift a raw component of a scheduling type; non-scheduling
    /// components are handed back untouched.
    pub fn from_raw(raw: RawComponent) -> std::result::Result<Self, RawComponent> {
        let Some(kind) = ComponentKind::from_name(&raw.name) else {
            return Err(raw);
        };

        let mut comp = Component::new(kind);
        comp.children = raw.children;

        for prop in raw.properties {
            match prop.name.as_str() {
                "UID" => comp.uid = Some(prop.value.trim().to_string()),
                "SEQUENCE" => comp.sequence = prop.value.trim().parse().ok(),
                "RECURRENCE-ID" => comp.recurrence_id = Some(prop),
                "ORGANIZER" => comp.organizer = Some(prop),
                "ATTENDEE" => comp.attendees.push(prop),
                "RRULE" => comp.rrule = Some(prop.value.trim().to_string()),
                "EXDATE" => comp.exdates.push(prop),
                "SUMMARY" => comp.summary = Some(prop),
                "DTSTART" => comp.dtstart = Some(prop),
                "COMMENT" => comp.comment = Some(prop),
                _ => comp.other.push(prop),
            }
        }

        Ok(comp)
    }

    pub fn sequence_or_default(&self) -> i64 {
        self.sequence.unwrap_or(0)
    }

    pub fn recurrence_id_value(&self) -> Option<&str> {
        self.recurrence_id.as_ref().map(|p| p.value.trim())
    }

    pub fn summary_text(&self) -> Option<String> {
        self.summary.as_ref().map(|p| unescape_text(&p.value))
    }

    pub fn comment_text(&self) -> Option<String> {
        self.comment.as_ref().map(|p| unescape_text(&p.value))
    }

    /// Human-readable DTSTART: `YYYY-MM-DD HH:MM`, or the date alone for
    /// date-only values. Unparseable values are passed through raw.
    pub fn dtstart_display(&self) -> Option<String> {
        let value = self.dtstart.as_ref()?.value.trim();
        match parse_timestamp(value) {
            Some(dt) if value.contains('T') => Some(dt.format("%Y-%m-%d %H:%M").to_string()),
            Some(dt) => Some(dt.format("%Y-%m-%d").to_string()),
            None => Some(value.to_string()),
        }
    }

    /// Record a cancelled occurrence on the recurring master.
    pub fn push_exdate(&mut self, date: NaiveDate) {
        self.exdates.push(
            Property::new("EXDATE", date.format("%Y%m%d").to_string()).with_param("VALUE", "DATE"),
        );
    }

    /// Rebuild the raw property list in a stable order for writing.
    pub fn to_raw(&self) -> RawComponent {
        let mut raw = RawComponent::new(self.kind.as_str());

        if let Some(uid) = &self.uid {
            raw.properties.push(Property::new("UID", uid.clone()));
        }
        if let Some(sequence) = self.sequence {
            raw.properties
                .push(Property::new("SEQUENCE", sequence.to_string()));
        }
        if let Some(prop) = &self.recurrence_id {
            raw.properties.push(prop.clone());
        }
        if let Some(prop) = &self.dtstart {
            raw.properties.push(prop.clone());
        }
        if let Some(prop) = &self.summary {
            raw.properties.push(prop.clone());
        }
        if let Some(rrule) = &self.rrule {
            raw.properties.push(Property::new("RRULE", rrule.clone()));
        }
        raw.properties.extend(self.exdates.iter().cloned());
        if let Some(prop) = &self.organizer {
            raw.properties.push(prop.clone());
        }
        raw.properties.extend(self.attendees.iter().cloned());
        if let Some(prop) = &self.comment {
            raw.properties.push(prop.clone());
        }
        raw.properties.extend(self.other.iter().cloned());
        raw.children = self.children.clone();
        raw
    }
}
