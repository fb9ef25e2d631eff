use crate::extract::{itip_payload, ItipDocument};
use crate::handler::{self, HandlerContext};
use crate::notify::NotificationSink;
use crate::store::CalendarStoreProvider;
use crate::{Result, Verdict};
use mimeview::MailParser;
use std::sync::Arc;

/// The closed set of iTip methods this filter acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItipMethod {
    Request,
    Reply,
    Cancel,
    Other,
}

impl ItipMethod {
    pub fn from_value(method: Option<&str>) -> Self {
        match method.map(str::to_ascii_uppercase).as_deref() {
            Some("REQUEST") => ItipMethod::Request,
            Some("REPLY") => ItipMethod::Reply,
            Some("CANCEL") => ItipMethod::Cancel,
            _ => ItipMethod::Other,
        }
    }
}

/// The mail-delivery-time scheduling filter: extracts an iTip payload
/// from the message, reconciles it against the recipient's calendar
/// store and returns a delivery verdict.
pub struct ItipFilter {
    provider: Arc<dyn CalendarStoreProvider>,
    sink: Arc<dyn NotificationSink>,
}

impl ItipFilter {
    pub fn new(provider: Arc<dyn CalendarStoreProvider>, sink: Arc<dyn NotificationSink>) -> Self {
        Self { provider, sink }
    }

    pub async fn handle(&self, parser: &mut MailParser) -> Result<Verdict> {
        let Some(payload) = itip_payload(parser)? else {
            return Ok(Verdict::Accept);
        };
        let Some(doc) = ItipDocument::parse(&payload) else {
            return Ok(Verdict::Accept);
        };

        let recipient = parser.recipient().to_string();
        if recipient.is_empty() {
            tracing::warn!("no envelope recipient on scheduling message, delivering as is");
            return Ok(Verdict::Accept);
        }

        let method = ItipMethod::from_value(doc.method());
        tracing::debug!(uid = %doc.uid, ?method, %recipient, "dispatching iTip message");

        let mut ctx =
            HandlerContext::new(self.provider.clone(), self.sink.clone(), recipient, doc);

        match method {
            ItipMethod::Request => handler::request::handle(&mut ctx).await,
            ItipMethod::Reply => handler::reply::handle(&mut ctx).await,
            ItipMethod::Cancel => handler::cancel::handle(&mut ctx).await,
            ItipMethod::Other => Ok(Verdict::Accept),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::testutil::*;
    use mimeview::MailParser;
    use std::io::Cursor;

    fn filter_for(store: &Arc<MemoryStore>) -> (ItipFilter, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        (
            ItipFilter::new(Arc::new(StaticProvider(store.clone())), sink.clone()),
            sink,
        )
    }

    #[test]
    fn method_dispatch_table() {
        k9::assert_equal!(
            ItipMethod::from_value(Some("request")),
            ItipMethod::Request
        );
        k9::assert_equal!(ItipMethod::from_value(Some("REPLY")), ItipMethod::Reply);
        k9::assert_equal!(ItipMethod::from_value(Some("Cancel")), ItipMethod::Cancel);
        k9::assert_equal!(ItipMethod::from_value(Some("PUBLISH")), ItipMethod::Other);
        k9::assert_equal!(ItipMethod::from_value(None), ItipMethod::Other);
    }

    #[tokio::test]
    async fn plain_message_is_accepted_untouched() {
        let store = MemoryStore::with_default_folder();
        let (filter, sink) = filter_for(&store);

        let mut parser = MailParser::new(Cursor::new(
            b"From: a@example.com\r\nContent-Type: text/plain\r\n\r\nhi\r\n".to_vec(),
        ))
        .unwrap();
        parser.set_recipient(RECIPIENT);

        let verdict = filter.handle(&mut parser).await.unwrap();
        k9::assert_equal!(verdict, Verdict::Accept);
        assert!(store.calls().is_empty());
        assert!(sink.sent.lock().is_empty());
    }

    #[tokio::test]
    async fn unknown_method_is_accepted() {
        let store = MemoryStore::with_default_folder();
        let (filter, _sink) = filter_for(&store);

        let ics = itip("PUBLISH", &vevent("UID:U1\r\n"));
        let mut parser = message_for(&ics);

        let verdict = filter.handle(&mut parser).await.unwrap();
        k9::assert_equal!(verdict, Verdict::Accept);
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn malformed_payload_is_accepted() {
        let store = MemoryStore::with_default_folder();
        let (filter, _sink) = filter_for(&store);

        let mut parser = message_for("BEGIN:VCARD\r\nFN:Jane\r\nEND:VCARD\r\n");
        let verdict = filter.handle(&mut parser).await.unwrap();
        k9::assert_equal!(verdict, Verdict::Accept);
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn request_flows_end_to_end() {
        let store = MemoryStore::with_default_folder();
        let (filter, _sink) = filter_for(&store);

        let ics = itip(
            "REQUEST",
            &vevent(concat!(
                "UID:U1\r\n",
                "SEQUENCE:0\r\n",
                "SUMMARY:Kickoff\r\n",
                "ORGANIZER:mailto:jack@example.com\r\n",
            )),
        );
        let mut parser = message_for(&ics);

        let verdict = filter.handle(&mut parser).await.unwrap();
        k9::assert_equal!(verdict, Verdict::Accept);
        k9::assert_equal!(store.calls(), vec![format!("create {}U1.ics", FOLDER)]);
    }

    #[tokio::test]
    async fn reply_inside_multipart_discards_message() {
        let store = MemoryStore::with_default_folder();
        store.seed(
            &format!("{}U1.ics", FOLDER),
            &vcalendar(&vevent(concat!(
                "UID:U1\r\n",
                "SEQUENCE:1\r\n",
                "SUMMARY:Kickoff\r\n",
                "ORGANIZER:mailto:john@example.com\r\n",
                "ATTENDEE;CN=Jack;PARTSTAT=NEEDS-ACTION:mailto:jack@example.com\r\n",
            ))),
        );
        let (filter, sink) = filter_for(&store);

        let ics = itip(
            "REPLY",
            &vevent(concat!(
                "UID:U1\r\n",
                "SEQUENCE:1\r\n",
                "ATTENDEE;CN=Jack;PARTSTAT=ACCEPTED:mailto:jack@example.com\r\n",
            )),
        );
        let eml = format!(
            concat!(
                "From: Jack <jack@example.com>\r\n",
                "Content-Type: multipart/mixed; boundary=\"=_b1\"\r\n",
                "\r\n",
                "--=_b1\r\n",
                "Content-Type: text/plain\r\n",
                "\r\n",
                "Jack accepted\r\n",
                "--=_b1\r\n",
                "Content-Type: text/calendar; charset=UTF-8\r\n",
                "\r\n",
                "{}\r\n",
                "--=_b1--\r\n",
            ),
            ics
        );
        let mut parser = MailParser::new(Cursor::new(eml.into_bytes())).unwrap();
        parser.set_recipient(RECIPIENT);

        let verdict = filter.handle(&mut parser).await.unwrap();
        k9::assert_equal!(verdict, Verdict::Discard);
        k9::assert_equal!(sink.sent.lock().len(), 1);
        assert!(store
            .object(&format!("{}U1.ics", FOLDER))
            .unwrap()
            .contains("PARTSTAT=ACCEPTED"));
    }
}
