use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error("Expression cannot be pushed down: {0}")]
    NotPushable(String),
    #[error("Invalid number of arguments of {0}")]
    InvalidArgumentCount(&'static str),
    #[error(transparent)]
    Datatype(#[from] xconn_datatype::error::Error),
}
