use thiserror::Error;
use xconn_catalog::error::Error as CatalogError;
use xconn_datatype::error::Error as DataTypeError;
use xconn_expr::error::Error as ExprError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error("Unknown table type '{0}'")]
    UnknownBackendType(String),
    #[error("Cannot discover columns of table '{0}': {1}")]
    SchemaDiscoveryFailed(String, String),
    #[error("Table '{0}' is read only")]
    ReadOnlyViolation(String),
    #[error("Table '{0}' is not indexable")]
    NotIndexable(String),
    #[error("Cannot connect to remote source: {0}")]
    BackendConnectFailed(String),
    #[error("Remote query failed: {0}")]
    BackendQueryFailed(String),
    #[error("Column '{0}' not found in current row")]
    NotFoundInRow(String),
    #[error("Corrupt record at row {0}: {1}")]
    RecordCorrupt(u64, String),
    #[error("{0} is not implemented")]
    NotImplemented(&'static str),
    #[error("Invalid cursor state: {0}")]
    InvalidState(String),
    #[error("Invalid value '{1}' of option '{0}'")]
    InvalidOption(String, String),
    #[error("Column '{0}' not found")]
    ColumnNotFound(String),
    #[error("Module '{0}' not found")]
    ModuleNotFound(String),
    #[error("IO Error: {0}")]
    IOError(String),
    #[error(transparent)]
    Catalog(CatalogError),
    #[error(transparent)]
    Expr(#[from] ExprError),
}

impl Error {
    /// Fatal errors abort the whole statement.
    #[inline]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::NotImplemented(_) | Error::UnknownBackendType(_))
    }

    /// Errors that leave the cursor unusable until it is closed.
    #[inline]
    pub fn invalidates_cursor(&self) -> bool {
        matches!(
            self,
            Error::BackendConnectFailed(_)
                | Error::BackendQueryFailed(_)
                | Error::IOError(_)
                | Error::NotImplemented(_)
        )
    }

    #[inline]
    pub(crate) fn invalid_option(key: &str, value: impl Into<String>) -> Self {
        Error::InvalidOption(key.to_string(), value.into())
    }
}

impl From<CatalogError> for Error {
    #[inline]
    fn from(src: CatalogError) -> Self {
        match src {
            CatalogError::InvalidOption(key, value) => Error::InvalidOption(key, value),
            other => Error::Catalog(other),
        }
    }
}

impl From<DataTypeError> for Error {
    #[inline]
    fn from(src: DataTypeError) -> Self {
        Error::RecordCorrupt(0, src.to_string())
    }
}

impl From<std::io::Error> for Error {
    #[inline]
    fn from(src: std::io::Error) -> Self {
        Error::IOError(src.to_string())
    }
}

impl From<regex::Error> for Error {
    #[inline]
    fn from(src: regex::Error) -> Self {
        Error::InvalidOption("file_name".to_string(), src.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classes() {
        assert!(Error::NotImplemented("read_column").is_fatal());
        assert!(Error::UnknownBackendType("XML".into()).is_fatal());
        assert!(!Error::BackendQueryFailed("timeout".into()).is_fatal());
        assert!(Error::BackendQueryFailed("timeout".into()).invalidates_cursor());
        let e: Error = CatalogError::InvalidOption("lrecl".into(), "x".into()).into();
        assert!(matches!(e, Error::InvalidOption(..)));
        assert_eq!("Table 't1' is read only", Error::ReadOnlyViolation("t1".into()).to_string());
    }
}
