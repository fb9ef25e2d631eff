mod client;
mod error;
mod types;
mod xml;

pub use error::DavError;
pub type Result<T> = std::result::Result<T, DavError>;

pub use client::DavClient;
pub use types::{CalendarObject, Folder};
pub use url::Url;
