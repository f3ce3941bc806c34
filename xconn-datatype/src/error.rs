use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error("Invalid value format '{0}'")]
    InvalidFormat(String),
    #[error("Value out of range")]
    ValueOutOfRange,
    #[error("Invalid date format '{0}'")]
    InvalidDateFormat(String),
    #[error("Cannot cast {0} to {1}")]
    InvalidCast(String, String),
}

impl From<std::num::ParseFloatError> for Error {
    fn from(e: std::num::ParseFloatError) -> Self {
        Error::InvalidFormat(e.to_string())
    }
}

impl From<std::num::ParseIntError> for Error {
    fn from(e: std::num::ParseIntError) -> Self {
        Error::InvalidFormat(e.to_string())
    }
}
