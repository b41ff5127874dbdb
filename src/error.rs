//! Contains the main error type for the library.
use thiserror::Error;

/// The main error type for the library. Each protocol module has it's own error type that is contained by this error.
#[derive(Error, Debug, PartialEq)]
pub enum Error {
    #[error("Malformed Frame")]
    MalformedFrame,
    #[error("Module Not Found: {0}")]
    ModuleNotFound(String),
    #[error("Action Not Found: {0}")]
    ActionNotFound(usize),
    #[error("Invalid Argument: {0}")]
    InvalidArgument(String),
    #[error("Engine Already Running")]
    AlreadyRunning,
    #[error("Module Busy")]
    Busy,
    #[error(transparent)]
    IsoTPError(#[from] crate::isotp::error::Error),
    #[error(transparent)]
    UDSError(#[from] crate::uds::Error),
}

