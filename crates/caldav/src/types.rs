/// A calendar collection as reported by the server.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Folder {
    /// Collection location (href property)
    pub href: String,
    /// Email address of the collection owner
    pub owner: String,
    /// Display name
    pub name: String,
    /// Resource types (collection, calendar, schedule-inbox, ...)
    pub types: Vec<String>,
    /// Supported component set (VEVENT, VTODO, ...)
    pub components: Vec<String>,
}

impl Folder {
    pub fn is_schedule_box(&self) -> bool {
        self.types
            .iter()
            .any(|t| t == "schedule-inbox" || t == "schedule-outbox")
    }

    /// The original's default-folder heuristic: a collection whose href
    /// ends in `Default` or `Tasks`.
    pub fn is_default_candidate(&self) -> bool {
        matches!(
            self.href.trim_end_matches('/').rsplit('/').next(),
            Some("Default") | Some("Tasks")
        )
    }
}

/// One stored calendar object: its location and raw iCalendar text.
#[derive(Debug, Clone, PartialEq)]
pub struct CalendarObject {
    pub href: String,
    pub data: String,
}
