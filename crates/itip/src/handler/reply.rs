use crate::handler::{store_object, HandlerContext};
use crate::notify::{ItipNotification, NotificationMode};
use crate::{Result, Verdict};
use vcal::{cal_address_email, cal_address_name};

/// RFC5546 REPLY: an attendee responded to an invitation owned by the
/// recipient (the organizer).
///
/// Records the attendee's PARTSTAT on the targeted component and
/// notifies the organizer. The reply email is suppressed either way.
pub(crate) async fn handle(ctx: &mut HandlerContext) -> Result<Verdict> {
    let existing = match ctx.find_object().await {
        Ok(existing) => existing,
        Err(err) => {
            tracing::error!(error = %err, "calendar store lookup failed, delivering message");
            return Ok(Verdict::Accept);
        }
    };

    let Some(mut existing) = existing else {
        return Ok(Verdict::Accept);
    };
    let Some(master_idx) = existing.main_component_index() else {
        return Ok(Verdict::Accept);
    };
    let Some(reply_master) = ctx.doc.calendar.main_component() else {
        return Ok(Verdict::Accept);
    };

    // SEQUENCE mismatch: deliver the message, let the MUA deal with it
    if existing.components[master_idx].sequence_or_default()
        != reply_master.sequence_or_default()
    {
        return Ok(Verdict::Accept);
    }

    // Per RFC5546 a REPLY carries exactly one ATTENDEE
    if reply_master.attendees.len() != 1 {
        return Ok(Verdict::Accept);
    }
    let sender = &reply_master.attendees[0];
    let email = cal_address_email(sender);
    if email.is_empty() {
        return Ok(Verdict::Accept);
    }
    let partstat = sender.param("PARTSTAT").unwrap_or_default().to_string();
    if partstat.is_empty() || partstat == "NEEDS-ACTION" {
        // Nothing useful to record
        return Ok(Verdict::Accept);
    }

    let target_idx = match reply_master.recurrence_id_value() {
        Some(rid) => match existing.instance_component_index(rid) {
            Some(idx) => idx,
            None => return Ok(Verdict::Accept),
        },
        None => master_idx,
    };

    let mut updated = false;
    for attendee in existing.components[target_idx].attendees.iter_mut() {
        if cal_address_email(attendee) == email
            && attendee.param("PARTSTAT") != Some(partstat.as_str())
        {
            attendee.set_param("PARTSTAT", partstat.clone());
            updated = true;
        }
    }

    if updated {
        let Some(location) = ctx.location.clone() else {
            return Ok(Verdict::Discard);
        };
        ctx.store()
            .await?
            .update(&store_object(&existing, location))
            .await?;

        let target = &existing.components[target_idx];
        let notification = ItipNotification {
            mode: NotificationMode::Reply,
            sender_name: cal_address_name(sender).unwrap_or_default().to_string(),
            sender_email: email,
            comment: reply_master.comment_text().unwrap_or_default(),
            partstat: Some(partstat),
            summary: target.summary_text(),
            start: target.dtstart_display(),
            recurrence_id: target.recurrence_id_value().map(str::to_string),
        };
        ctx.sink.notify(&ctx.recipient, notification).await?;
    }

    // The reply email is suppressed even when nothing changed
    Ok(Verdict::Discard)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::testutil::*;

    fn organizer_copy() -> String {
        vcalendar(&vevent(concat!(
            "UID:U1\r\n",
            "SEQUENCE:1\r\n",
            "DTSTART:20240710T103000\r\n",
            "SUMMARY:Test Meeting\r\n",
            "ORGANIZER;CN=John:mailto:john@example.com\r\n",
            "ATTENDEE;CN=John;PARTSTAT=ACCEPTED:mailto:john@example.com\r\n",
            "ATTENDEE;CN=Jack;PARTSTAT=NEEDS-ACTION:mailto:jack@example.com\r\n",
        )))
    }

    fn reply_ics(props: &str) -> String {
        itip("REPLY", &vevent(props))
    }

    #[tokio::test]
    async fn records_attendee_partstat() {
        let store = MemoryStore::with_default_folder();
        let href = format!("{}U1.ics", FOLDER);
        store.seed(&href, &organizer_copy());

        let ics = reply_ics(concat!(
            "UID:U1\r\n",
            "SEQUENCE:1\r\n",
            "COMMENT:see you there\r\n",
            "ATTENDEE;CN=Jack;PARTSTAT=ACCEPTED:mailto:JACK@example.com\r\n",
        ));
        let (mut ctx, sink) = context(&store, &ics);

        let verdict = handle(&mut ctx).await.unwrap();
        k9::assert_equal!(verdict, Verdict::Discard);
        k9::assert_equal!(store.calls(), vec![format!("update {href}")]);

        let stored = store.object(&href).unwrap();
        assert!(stored.contains("ATTENDEE;CN=Jack;PARTSTAT=ACCEPTED:mailto:jack@example.com\r\n"));
        // The organizer's own entry is untouched
        assert!(stored.contains("ATTENDEE;CN=John;PARTSTAT=ACCEPTED:mailto:john@example.com\r\n"));

        let sent = sink.sent.lock();
        k9::assert_equal!(sent.len(), 1);
        let (recipient, notification) = &sent[0];
        k9::assert_equal!(recipient.as_str(), RECIPIENT);
        k9::assert_equal!(notification.mode, NotificationMode::Reply);
        k9::assert_equal!(notification.sender_email.as_str(), "jack@example.com");
        k9::assert_equal!(notification.sender_name.as_str(), "Jack");
        k9::assert_equal!(notification.partstat.as_deref(), Some("ACCEPTED"));
        k9::assert_equal!(notification.comment.as_str(), "see you there");
        k9::assert_equal!(notification.summary.as_deref(), Some("Test Meeting"));
        k9::assert_equal!(notification.start.as_deref(), Some("2024-07-10 10:30"));
    }

    #[tokio::test]
    async fn sequence_mismatch_never_mutates() {
        let store = MemoryStore::with_default_folder();
        let href = format!("{}U1.ics", FOLDER);
        store.seed(&href, &organizer_copy());

        let ics = reply_ics(concat!(
            "UID:U1\r\n",
            "SEQUENCE:2\r\n",
            "ATTENDEE;PARTSTAT=ACCEPTED:mailto:jack@example.com\r\n",
        ));
        let (mut ctx, sink) = context(&store, &ics);

        let verdict = handle(&mut ctx).await.unwrap();
        k9::assert_equal!(verdict, Verdict::Accept);
        assert!(store.calls().is_empty());
        assert!(sink.sent.lock().is_empty());
        assert!(store
            .object(&href)
            .unwrap()
            .contains("ATTENDEE;CN=Jack;PARTSTAT=NEEDS-ACTION:mailto:jack@example.com\r\n"));
    }

    #[tokio::test]
    async fn malformed_reply_with_multiple_attendees() {
        let store = MemoryStore::with_default_folder();
        let href = format!("{}U1.ics", FOLDER);
        store.seed(&href, &organizer_copy());

        let ics = reply_ics(concat!(
            "UID:U1\r\n",
            "SEQUENCE:1\r\n",
            "ATTENDEE;PARTSTAT=ACCEPTED:mailto:jack@example.com\r\n",
            "ATTENDEE;PARTSTAT=ACCEPTED:mailto:meg@example.com\r\n",
        ));
        let (mut ctx, _sink) = context(&store, &ics);

        let verdict = handle(&mut ctx).await.unwrap();
        k9::assert_equal!(verdict, Verdict::Accept);
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn needs_action_reply_is_useless() {
        let store = MemoryStore::with_default_folder();
        let href = format!("{}U1.ics", FOLDER);
        store.seed(&href, &organizer_copy());

        let ics = reply_ics(concat!(
            "UID:U1\r\n",
            "SEQUENCE:1\r\n",
            "ATTENDEE;PARTSTAT=NEEDS-ACTION:mailto:jack@example.com\r\n",
        ));
        let (mut ctx, _sink) = context(&store, &ics);

        let verdict = handle(&mut ctx).await.unwrap();
        k9::assert_equal!(verdict, Verdict::Accept);
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn unchanged_partstat_still_discards() {
        let store = MemoryStore::with_default_folder();
        let href = format!("{}U1.ics", FOLDER);
        store.seed(&href, &organizer_copy());

        // John already accepted; replying ACCEPTED again changes nothing
        let ics = reply_ics(concat!(
            "UID:U1\r\n",
            "SEQUENCE:1\r\n",
            "ATTENDEE;CN=John;PARTSTAT=ACCEPTED:mailto:john@example.com\r\n",
        ));
        let (mut ctx, sink) = context(&store, &ics);

        let verdict = handle(&mut ctx).await.unwrap();
        k9::assert_equal!(verdict, Verdict::Discard);
        assert!(store.calls().is_empty());
        assert!(sink.sent.lock().is_empty());
    }

    #[tokio::test]
    async fn reply_for_unknown_exception() {
        let store = MemoryStore::with_default_folder();
        let href = format!("{}U1.ics", FOLDER);
        store.seed(&href, &organizer_copy());

        let ics = reply_ics(concat!(
            "UID:U1\r\n",
            "RECURRENCE-ID:20990101T000000\r\n",
            "SEQUENCE:1\r\n",
            "ATTENDEE;PARTSTAT=DECLINED:mailto:jack@example.com\r\n",
        ));
        let (mut ctx, _sink) = context(&store, &ics);

        let verdict = handle(&mut ctx).await.unwrap();
        k9::assert_equal!(verdict, Verdict::Accept);
        assert!(store.calls().is_empty());
    }
}
