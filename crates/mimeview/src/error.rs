use thiserror::Error;

#[derive(Error, Debug)]
pub enum MimeViewError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid part identifier {0}")]
    InvalidPartId(usize),
    #[error("mutation is only supported on the top-level message")]
    NotTopLevel,
    #[error("failed to decode body: {0}")]
    Decode(String),
}
