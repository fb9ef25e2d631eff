mod encoding;
mod error;
mod parser;
mod stream;

pub use error::MimeViewError;
pub type Result<T> = std::result::Result<T, MimeViewError>;

pub use parser::MailParser;
pub use stream::{ReadSeek, SharedStream};
