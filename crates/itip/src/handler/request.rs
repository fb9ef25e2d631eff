use crate::handler::{merge_revision, store_object, HandlerContext};
use crate::{Result, Verdict};

/// RFC5546 REQUEST: invitations and updates sent by the organizer.
///
/// A new invitation is written into the recipient's default folder; an
/// update is merged into the existing copy when the SEQUENCE matches.
/// The invitation email is always delivered so the MUA can render it;
/// the calendar write is a side effect.
pub(crate) async fn handle(ctx: &mut HandlerContext) -> Result<Verdict> {
    let existing = match ctx.find_object().await {
        Ok(existing) => existing,
        Err(err) => {
            tracing::error!(error = %err, "calendar store lookup failed, delivering message");
            return Ok(Verdict::Accept);
        }
    };

    let Some(folder) = ctx.folder.clone() else {
        tracing::error!(recipient = %ctx.recipient, "no calendar folder reachable for recipient");
        return Ok(Verdict::Accept);
    };

    let Some(request_master) = ctx.doc.calendar.main_component() else {
        return Ok(Verdict::Accept);
    };
    let recurrence_id = request_master.recurrence_id_value().map(str::to_string);

    let Some(mut existing) = existing else {
        if recurrence_id.is_some() {
            // An orphan exception with no master is not actionable
            return Ok(Verdict::Accept);
        }

        let object = store_object(&ctx.doc.calendar, ctx.new_object_href(&folder));
        ctx.store().await?.create(&object).await?;
        tracing::info!(uid = %ctx.doc.uid, href = %object.href, "stored incoming invitation");
        return Ok(Verdict::Accept);
    };

    match recurrence_id.as_deref() {
        Some(rid) => match existing.instance_component_index(rid) {
            None => {
                // A new exception joins the existing series
                existing.components.push(request_master.clone());
            }
            Some(idx) => {
                // TODO: a higher incoming SEQUENCE indicates a reschedule
                // and should update the existing copy instead of no-op
                if existing.components[idx].sequence_or_default()
                    != request_master.sequence_or_default()
                {
                    return Ok(Verdict::Accept);
                }
                merge_revision(&mut existing, idx, request_master);
            }
        },
        None => {
            let Some(idx) = existing.main_component_index() else {
                return Ok(Verdict::Accept);
            };
            if existing.components[idx].sequence_or_default()
                != request_master.sequence_or_default()
            {
                return Ok(Verdict::Accept);
            }
            merge_revision(&mut existing, idx, request_master);
        }
    }

    let Some(location) = ctx.location.clone() else {
        return Ok(Verdict::Accept);
    };
    ctx.store()
        .await?
        .update(&store_object(&existing, location))
        .await?;

    Ok(Verdict::Accept)
}
