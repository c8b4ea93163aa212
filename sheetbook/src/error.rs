//! Error taxonomy of the engine
//!
//! Formula evaluation problems are never reported here: they are stored as
//! [`ErrorValue`](crate::ErrorValue)s in the cells that produced them.

use thiserror::Error;

/// Errors returned by the public API
#[derive(Debug, Error)]
pub enum Error {
    #[error("index out of range: {0}")]
    IndexOutOfRange(String),

    #[error("duplicate name: {0}")]
    DuplicateName(String),

    #[error("invalid name: {0}")]
    InvalidName(String),

    #[error("invalid range: {0}")]
    InvalidRange(String),

    #[error("circular reference involving {0}")]
    CircularReference(String),

    #[error("corrupt package: {0}")]
    CorruptPackage(String),

    #[error("source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("license error: {0}")]
    License(String),

    #[error("the supplied password does not match the sheet protection")]
    InvalidPassword,

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn out_of_range(what: impl std::fmt::Display) -> Self {
        Error::IndexOutOfRange(what.to_string())
    }

    pub(crate) fn invalid_range(what: impl std::fmt::Display) -> Self {
        Error::InvalidRange(what.to_string())
    }
}
