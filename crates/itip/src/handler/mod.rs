use crate::extract::ItipDocument;
use crate::notify::NotificationSink;
use crate::store::{CalendarStore, CalendarStoreProvider};
use crate::Result;
use caldav::{CalendarObject, Folder};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use std::sync::Arc;
use vcal::{parse_timestamp, rrule_until, Calendar, Component};

pub(crate) mod cancel;
pub(crate) mod reply;
pub(crate) mod request;

const HREF_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.');

/// State shared by the method handlers while processing one message.
pub(crate) struct HandlerContext {
    provider: Arc<dyn CalendarStoreProvider>,
    pub(crate) sink: Arc<dyn NotificationSink>,
    pub(crate) recipient: String,
    pub(crate) doc: ItipDocument,
    /// Creation target: the first usable folder, upgraded to the first
    /// `Default`/`Tasks` match.
    pub(crate) folder: Option<Folder>,
    /// Location of the recipient's existing copy, when one was found.
    pub(crate) location: Option<String>,
}

impl HandlerContext {
    pub(crate) fn new(
        provider: Arc<dyn CalendarStoreProvider>,
        sink: Arc<dyn NotificationSink>,
        recipient: String,
        doc: ItipDocument,
    ) -> Self {
        Self {
            provider,
            sink,
            recipient,
            doc,
            folder: None,
            location: None,
        }
    }

    pub(crate) async fn store(&self) -> Result<Arc<dyn CalendarStore>> {
        self.provider.store_for(&self.recipient).await
    }

    /// Search the recipient's calendar folders for an object carrying
    /// the incoming UID. Folders owned by other users and the schedule
    /// inbox/outbox are skipped. Remembers the fallback creation folder
    /// and, on a hit, the object's folder and href.
    pub(crate) async fn find_object(&mut self) -> Result<Option<Calendar>> {
        if self.doc.uid.is_empty() {
            return Ok(None);
        }

        let store = self.store().await?;
        let component = self.doc.kind.as_str();

        for folder in store.list_folders(component).await? {
            if !folder.owner.eq_ignore_ascii_case(&self.recipient) {
                continue;
            }
            if folder.is_schedule_box() {
                continue;
            }

            if self.folder.is_none() || folder.is_default_candidate() {
                self.folder = Some(folder.clone());
            }

            let results = store
                .search_by_uid(&folder.href, component, &self.doc.uid)
                .await?;
            if results.len() > 1 {
                tracing::warn!(
                    uid = %self.doc.uid,
                    folder = %folder.href,
                    "multiple calendar objects match one UID, using the first"
                );
            }
            for object in results {
                if let Some(existing) = ItipDocument::parse(&object.data) {
                    self.location = Some(object.href);
                    self.folder = Some(folder);
                    return Ok(Some(existing.calendar));
                }
            }
        }

        Ok(None)
    }

    /// Href for a freshly created object in the given folder.
    pub(crate) fn new_object_href(&self, folder: &Folder) -> String {
        format!(
            "{}/{}.ics",
            folder.href.trim_end_matches('/'),
            utf8_percent_encode(&self.doc.uid, HREF_SEGMENT)
        )
    }
}

pub(crate) fn store_object(calendar: &Calendar, href: String) -> CalendarObject {
    CalendarObject {
        href,
        data: calendar.to_store_ical(),
    }
}

/// Merge the revision-bearing properties of the incoming component into
/// the existing one: SEQUENCE and RRULE are taken from the request, an
/// absent incoming value clears the existing one. When the merged RRULE
/// carries an UNTIL bound, exceptions at or past that bound are dropped
/// (the organizer truncated the series).
pub(crate) fn merge_revision(calendar: &mut Calendar, target_idx: usize, incoming: &Component) {
    let kind = calendar.components[target_idx].kind;
    {
        let target = &mut calendar.components[target_idx];
        target.sequence = incoming.sequence;
        target.rrule = incoming.rrule.clone();
    }

    if let Some(until) = calendar.components[target_idx]
        .rrule
        .as_deref()
        .and_then(rrule_until)
    {
        calendar.components.retain(|c| {
            !(c.kind == kind
                && c.recurrence_id_value()
                    .and_then(parse_timestamp)
                    .is_some_and(|ts| ts >= until))
        });
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::*;
    use crate::notify::{ItipNotification, NotificationSink};
    use crate::store::{CalendarStore, CalendarStoreProvider};
    use crate::{ItipError, Result};
    use async_trait::async_trait;
    use mimeview::MailParser;
    use parking_lot::Mutex;
    use std::collections::BTreeMap;
    use std::io::Cursor;

    pub(crate) const RECIPIENT: &str = "john@example.com";
    pub(crate) const FOLDER: &str = "/dav/calendars/user/john@example.com/Default/";

    pub(crate) struct MemoryStore {
        pub(crate) folders: Vec<Folder>,
        pub(crate) objects: Mutex<BTreeMap<String, String>>,
        pub(crate) calls: Mutex<Vec<String>>,
        pub(crate) fail_listing: bool,
    }

    impl MemoryStore {
        pub(crate) fn with_default_folder() -> Arc<Self> {
            Arc::new(Self {
                folders: vec![Folder {
                    href: FOLDER.to_string(),
                    owner: RECIPIENT.to_string(),
                    name: "Calendar".to_string(),
                    types: vec!["collection".to_string(), "calendar".to_string()],
                    components: vec!["VEVENT".to_string(), "VTODO".to_string()],
                }],
                objects: Mutex::new(BTreeMap::new()),
                calls: Mutex::new(Vec::new()),
                fail_listing: false,
            })
        }

        pub(crate) fn empty() -> Arc<Self> {
            Arc::new(Self {
                folders: Vec::new(),
                objects: Mutex::new(BTreeMap::new()),
                calls: Mutex::new(Vec::new()),
                fail_listing: false,
            })
        }

        pub(crate) fn seed(self: &Arc<Self>, href: &str, data: &str) {
            self.objects
                .lock()
                .insert(href.to_string(), data.to_string());
        }

        pub(crate) fn calls(&self) -> Vec<String> {
            self.calls.lock().clone()
        }

        pub(crate) fn object(&self, href: &str) -> Option<String> {
            self.objects.lock().get(href).cloned()
        }
    }

    #[async_trait]
    impl CalendarStore for MemoryStore {
        async fn list_folders(&self, component: &str) -> Result<Vec<Folder>> {
            if self.fail_listing {
                return Err(ItipError::Store("listing failed".to_string()));
            }
            Ok(self
                .folders
                .iter()
                .filter(|f| f.components.iter().any(|c| c == component))
                .cloned()
                .collect())
        }

        async fn search_by_uid(
            &self,
            folder_href: &str,
            _component: &str,
            uid: &str,
        ) -> Result<Vec<CalendarObject>> {
            let needle = format!("UID:{uid}\r\n");
            Ok(self
                .objects
                .lock()
                .iter()
                .filter(|(href, data)| href.starts_with(folder_href) && data.contains(&needle))
                .map(|(href, data)| CalendarObject {
                    href: href.clone(),
                    data: data.clone(),
                })
                .collect())
        }

        async fn create(&self, object: &CalendarObject) -> Result<()> {
            self.calls.lock().push(format!("create {}", object.href));
            self.objects
                .lock()
                .insert(object.href.clone(), object.data.clone());
            Ok(())
        }

        async fn update(&self, object: &CalendarObject) -> Result<()> {
            self.calls.lock().push(format!("update {}", object.href));
            self.objects
                .lock()
                .insert(object.href.clone(), object.data.clone());
            Ok(())
        }

        async fn delete(&self, href: &str) -> Result<()> {
            self.calls.lock().push(format!("delete {href}"));
            self.objects.lock().remove(href);
            Ok(())
        }
    }

    pub(crate) struct StaticProvider(pub(crate) Arc<MemoryStore>);

    #[async_trait]
    impl CalendarStoreProvider for StaticProvider {
        async fn store_for(&self, _user: &str) -> Result<Arc<dyn CalendarStore>> {
            Ok(self.0.clone())
        }
    }

    #[derive(Default)]
    pub(crate) struct RecordingSink {
        pub(crate) sent: Mutex<Vec<(String, ItipNotification)>>,
    }

    #[async_trait]
    impl NotificationSink for RecordingSink {
        async fn notify(&self, recipient: &str, notification: ItipNotification) -> Result<()> {
            self.sent
                .lock()
                .push((recipient.to_string(), notification));
            Ok(())
        }
    }

    pub(crate) fn vcalendar(body: &str) -> String {
        format!(
            "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:-//Test//Test//EN\r\n{body}END:VCALENDAR\r\n"
        )
    }

    pub(crate) fn itip(method: &str, body: &str) -> String {
        format!(
            "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:-//Test//Test//EN\r\nMETHOD:{method}\r\n{body}END:VCALENDAR\r\n"
        )
    }

    pub(crate) fn vevent(props: &str) -> String {
        format!("BEGIN:VEVENT\r\n{props}END:VEVENT\r\n")
    }

    /// A single-part text/calendar message addressed to the recipient.
    pub(crate) fn message_for(ics: &str) -> MailParser {
        let eml = format!(
            concat!(
                "Return-Path: <jack@example.com>\r\n",
                "From: Jack <jack@example.com>\r\n",
                "Subject: meeting\r\n",
                "Content-Type: text/calendar; charset=UTF-8\r\n",
                "Content-Transfer-Encoding: 8bit\r\n",
                "\r\n",
                "{}",
            ),
            ics
        );
        let mut parser = MailParser::new(Cursor::new(eml.into_bytes())).unwrap();
        parser.set_recipient(RECIPIENT);
        parser.set_sender("jack@example.com");
        parser
    }

    pub(crate) fn context(store: &Arc<MemoryStore>, ics: &str) -> (HandlerContext, Arc<RecordingSink>) {
        let doc = ItipDocument::parse(ics).expect("test payload parses");
        let sink = Arc::new(RecordingSink::default());
        let ctx = HandlerContext::new(
            Arc::new(StaticProvider(store.clone())),
            sink.clone(),
            RECIPIENT.to_string(),
            doc,
        );
        (ctx, sink)
    }
}
