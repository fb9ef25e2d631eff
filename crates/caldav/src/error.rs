use thiserror::Error;

#[derive(Error, Debug)]
pub enum DavError {
    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("request failed with status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("failed to parse server response: {0}")]
    Xml(String),
    #[error("DAV discovery failed: {0}")]
    Discovery(String),
}
