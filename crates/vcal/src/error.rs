use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum VcalError {
    #[error("invalid iCalendar content: {0}")]
    Parse(String),
    #[error("root component is not a VCALENDAR")]
    NotVcalendar,
}
