use thiserror::Error;

#[derive(Error, Debug)]
pub enum ItipError {
    #[error("message parse error: {0}")]
    Mime(#[from] mimeview::MimeViewError),
    #[error("calendar store error: {0}")]
    Store(String),
    #[error("notification delivery failed: {0}")]
    Notify(String),
    #[error("token minting failed: {0}")]
    Token(String),
}

impl From<caldav::DavError> for ItipError {
    fn from(err: caldav::DavError) -> Self {
        ItipError::Store(err.to_string())
    }
}
