use semistr::SemiStr;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error("Schema '{0}' already exists")]
    SchemaAlreadyExists(SemiStr),
    #[error("Schema '{0}' not exists")]
    SchemaNotExists(SemiStr),
    #[error("Table '{0}' already exists")]
    TableAlreadyExists(SemiStr),
    #[error("Table '{0}' not exists")]
    TableNotExists(SemiStr),
    #[error("Column name '{0}' is not unique")]
    ColumnNameNotUnique(SemiStr),
    #[error("Index '{0}' refers to unknown column '{1}'")]
    IndexColumnNotExists(SemiStr, SemiStr),
    #[error("Invalid value '{1}' of option '{0}'")]
    InvalidOption(String, String),
    #[error("Unknown special column '{0}'")]
    UnknownPseudoColumn(String),
}
