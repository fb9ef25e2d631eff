use crate::handler::{store_object, HandlerContext};
use crate::notify::{ItipNotification, NotificationMode};
use crate::{Result, Verdict};
use vcal::{cal_address_email, cal_address_name, parse_timestamp, Component};

/// RFC5546 CANCEL: the organizer called the meeting (or one occurrence)
/// off.
///
/// A whole-series cancel deletes the object; an occurrence cancel drops
/// the matching exception and records an EXDATE on the master. Either
/// way the cancellation email is suppressed and replaced by a
/// notification to the recipient.
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
    let Some(cancel_master) = ctx.doc.calendar.main_component() else {
        return Ok(Verdict::Accept);
    };

    // SEQUENCE mismatch: deliver the message, let the MUA deal with it
    if existing.components[master_idx].sequence_or_default()
        != cancel_master.sequence_or_default()
    {
        return Ok(Verdict::Accept);
    }

    let Some(location) = ctx.location.clone() else {
        return Ok(Verdict::Accept);
    };

    let cancelled: Component;
    match cancel_master.recurrence_id_value() {
        Some(rid) => {
            // One occurrence: remove its exception component and add an
            // EXDATE entry to the master
            let removed = existing
                .instance_component_index(rid)
                .map(|idx| existing.components.remove(idx));

            let Some(master_idx) = existing.main_component_index() else {
                return Ok(Verdict::Accept);
            };
            if let Some(date) = parse_timestamp(rid).map(|ts| ts.date()) {
                existing.components[master_idx].push_exdate(date);
            }

            cancelled = removed.unwrap_or_else(|| existing.components[master_idx].clone());

            ctx.store()
                .await?
                .update(&store_object(&existing, location))
                .await?;
        }
        None => {
            // Whole series: remove the object outright. Outlook does not
            // cope with events left behind in cancelled status.
            cancelled = existing.components[master_idx].clone();
            ctx.store().await?.delete(&location).await?;
        }
    }

    let notification = notification(&cancelled, cancel_master);
    ctx.sink.notify(&ctx.recipient, notification).await?;

    Ok(Verdict::Discard)
}

fn notification(cancelled: &Component, cancel_master: &Component) -> ItipNotification {
    let organizer = cancelled.organizer.as_ref();
    ItipNotification {
        mode: NotificationMode::Cancel,
        sender_name: organizer
            .and_then(cal_address_name)
            .unwrap_or_default()
            .to_string(),
        sender_email: organizer.map(cal_address_email).unwrap_or_default(),
        comment: cancel_master.comment_text().unwrap_or_default(),
        partstat: None,
        summary: cancelled.summary_text(),
        start: cancelled.dtstart_display(),
        recurrence_id: cancelled.recurrence_id_value().map(str::to_string),
    }
}
