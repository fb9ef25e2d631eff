mod error;
mod extract;
mod filter;
mod handler;
mod notify;
mod store;
mod verdict;

pub use error::ItipError;
pub type Result<T> = std::result::Result<T, ItipError>;

pub use extract::{itip_payload, ItipDocument};
pub use filter::{ItipFilter, ItipMethod};
pub use notify::{ItipNotification, NotificationMode, NotificationSink};
pub use store::{
    CalendarStore, CalendarStoreProvider, DavStoreProvider, TokenMinter, DEFAULT_TOKEN_TTL,
};
pub use verdict::Verdict;
