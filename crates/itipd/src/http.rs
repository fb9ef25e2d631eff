use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use itip::{ItipFilter, Verdict};
use mimeview::MailParser;
use serde::Deserialize;
use std::io::{Seek, SeekFrom, Write};
use std::sync::Arc;
use tempfile::SpooledTempFile;

/// Status codes consumed by the MTA content-filter bridge.
const CODE_REJECT: u16 = 460;
const CODE_DISCARD: u16 = 461;

const SPOOL_THRESHOLD: usize = 8 * 1024 * 1024;

#[derive(Debug, Deserialize)]
struct FilterParams {
    recipient: String,
    #[serde(default)]
    sender: Option<String>,
}

pub(crate) fn make_router(filter: Arc<ItipFilter>) -> Router {
    Router::new()
        .route("/v1/filter", post(filter_message))
        .with_state(filter)
}

async fn filter_message(
    State(filter): State<Arc<ItipFilter>>,
    Query(params): Query<FilterParams>,
    body: Bytes,
) -> Response {
    // Multiple recipients means an outgoing or exotic submission which
    // this filter does not handle; deliver unchanged
    if params.recipient.contains(',') {
        return StatusCode::NO_CONTENT.into_response();
    }

    match run_filter(&filter, params, &body).await {
        Ok(response) => response,
        Err(err) => {
            tracing::error!("message filtering failed: {err:#}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn run_filter(
    filter: &ItipFilter,
    params: FilterParams,
    body: &[u8],
) -> anyhow::Result<Response> {
    let mut spool = SpooledTempFile::new(SPOOL_THRESHOLD);
    spool.write_all(body)?;
    spool.seek(SeekFrom::Start(0))?;

    let mut parser = MailParser::new(spool)?;
    parser.set_recipient(params.recipient.trim().to_ascii_lowercase());
    if let Some(sender) = params.sender {
        parser.set_sender(sender);
    }

    let verdict = filter.handle(&mut parser).await?;
    verdict_response(verdict, &parser)
}

/// Map the filter verdict onto the bridge's status codes. An accepted
/// message that was rewritten streams back with a 200; an untouched one
/// is a bodiless 204.
fn verdict_response(verdict: Verdict, parser: &MailParser) -> anyhow::Result<Response> {
    Ok(match verdict {
        Verdict::Reject => status(CODE_REJECT).into_response(),
        Verdict::Discard => status(CODE_DISCARD).into_response(),
        Verdict::Accept if parser.is_modified() => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, "message/rfc822"),
                (header::CONTENT_DISPOSITION, "attachment"),
            ],
            parser.raw()?,
        )
            .into_response(),
        Verdict::Accept => StatusCode::NO_CONTENT.into_response(),
    })
}

fn status(code: u16) -> StatusCode {
    StatusCode::from_u16(code).expect("statically valid status code")
}
