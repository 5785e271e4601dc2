use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Status code carried by every RPC reply.
///
/// The presentation layer renders these; the core only produces them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusCode {
    Ok,
    InvalidArgument,
    PermissionDenied,
    NotFound,
    Unavailable,
    Internal,
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StatusCode::Ok => "OK",
            StatusCode::InvalidArgument => "INVALID_ARGUMENT",
            StatusCode::PermissionDenied => "PERMISSION_DENIED",
            StatusCode::NotFound => "NOT_FOUND",
            StatusCode::Unavailable => "UNAVAILABLE",
            StatusCode::Internal => "INTERNAL",
        };
        write!(f, "{name}")
    }
}

#[derive(Error, Debug)]
pub enum Error {
    // Caller errors
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Not found: {0}")]
    NotFound(String),

    // Device errors
    #[error("Instrument fault: {0}")]
    InstrumentFault(String),

    #[error("Hardware operation failed: {0}")]
    Hardware(String),

    // Transport errors
    #[error("Transport error: {0}")]
    Transport(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Map this error onto the status code reported to RPC callers.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::InvalidArgument(_) => StatusCode::InvalidArgument,
            Error::PermissionDenied(_) => StatusCode::PermissionDenied,
            Error::NotFound(_) => StatusCode::NotFound,
            Error::InstrumentFault(_) | Error::Transport(_) => StatusCode::Unavailable,
            Error::Hardware(_) | Error::Io(_) | Error::Config(_) => StatusCode::Internal,
        }
    }

    /// Rebuild an error from a status code and detail string received
    /// over the wire.
    ///
    /// Returns `None` for [`StatusCode::Ok`].
    pub fn from_status(code: StatusCode, detail: impl Into<String>) -> Option<Self> {
        let detail = detail.into();
        match code {
            StatusCode::Ok => None,
            StatusCode::InvalidArgument => Some(Error::InvalidArgument(detail)),
            StatusCode::PermissionDenied => Some(Error::PermissionDenied(detail)),
            StatusCode::NotFound => Some(Error::NotFound(detail)),
            StatusCode::Unavailable => Some(Error::Transport(detail)),
            StatusCode::Internal => Some(Error::Hardware(detail)),
        }
    }

    /// The human-readable detail without the variant prefix.
    pub fn detail(&self) -> String {
        match self {
            Error::InvalidArgument(d)
            | Error::PermissionDenied(d)
            | Error::NotFound(d)
            | Error::InstrumentFault(d)
            | Error::Hardware(d)
            | Error::Transport(d)
            | Error::Config(d) => d.clone(),
            Error::Io(e) => e.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
