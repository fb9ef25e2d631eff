mod calendar;
mod component;
mod error;
mod parser;
mod property;
mod writer;

pub use error::VcalError;
pub type Result<T> = std::result::Result<T, VcalError>;

pub use calendar::Calendar;
pub use component::{Component, ComponentKind};
pub use parser::RawComponent;
pub use property::{
    cal_address_email, cal_address_name, escape_text, parse_timestamp, rrule_until, unescape_text,
    Property,
};
