//! # Trip Lifecycle Errors

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type used across the crate.
pub type Result<T> = anyhow::Result<T, Error>;

/// Errors surfaced by the trip lifecycle controllers.
///
/// Every error is local to the action that triggered it. Views record the
/// description as a transient notice; nothing escalates past the view.
#[derive(Error, Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum Error {
    /// Rejected client-side before any request was issued.
    #[error("code: invalid_input, description: {0}")]
    InvalidInput(String),

    /// No session, or the session's role may not use the view.
    #[error("code: unauthorized, description: {0}")]
    Unauthorized(String),

    /// Geocoding returned no match for a free-text location.
    #[error("code: location_not_found, description: {0}")]
    LocationNotFound(String),

    /// The operation is not valid in the current trip state.
    #[error("code: conflict, description: {0}")]
    Conflict(String),

    /// The backend or network failed while fulfilling the request.
    #[error("code: bad_gateway, description: {0}")]
    BadGateway(String),

    /// A payload could not be decoded.
    #[error("code: invalid_format, description: {0}")]
    InvalidFormat(String),

    /// Session storage could not be read or written.
    #[error("code: storage_error, description: {0}")]
    StorageError(String),

    /// Anything else.
    #[error("code: server_error, description: {0}")]
    ServerError(String),
}

impl Error {
    /// Returns the error code.
    #[must_use]
    pub const fn code(&self) -> &str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::Unauthorized(_) => "unauthorized",
            Self::LocationNotFound(_) => "location_not_found",
            Self::Conflict(_) => "conflict",
            Self::BadGateway(_) => "bad_gateway",
            Self::InvalidFormat(_) => "invalid_format",
            Self::StorageError(_) => "storage_error",
            Self::ServerError(_) => "server_error",
        }
    }

    /// Returns the error description.
    #[must_use]
    pub fn description(&self) -> String {
        self.to_string()
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast_ref::<Self>() {
            Some(Self::InvalidInput(e)) => Self::InvalidInput(format!("{err}: {e}")),
            Some(Self::Unauthorized(e)) => Self::Unauthorized(format!("{err}: {e}")),
            Some(Self::LocationNotFound(e)) => Self::LocationNotFound(format!("{err}: {e}")),
            Some(Self::Conflict(e)) => Self::Conflict(format!("{err}: {e}")),
            Some(Self::BadGateway(e)) => Self::BadGateway(format!("{err}: {e}")),
            Some(Self::InvalidFormat(e)) => Self::InvalidFormat(format!("{err}: {e}")),
            Some(Self::StorageError(e)) => Self::StorageError(format!("{err}: {e}")),
            Some(Self::ServerError(e)) => Self::ServerError(format!("{err}: {e}")),
            None => {
                let stack = err.chain().fold(String::new(), |cause, e| format!("{cause} -> {e}"));
                let stack = stack.trim_start_matches(" -> ").to_string();
                Self::ServerError(stack)
            }
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidFormat(err.to_string())
    }
}

/// Construct an `Error::InvalidInput` from a format string.
#[macro_export]
macro_rules! invalid {
    ($fmt:expr, $($arg:tt)*) => {
        $crate::Error::InvalidInput(format!($fmt, $($arg)*))
    };
     ($err:expr $(,)?) => {
        $crate::Error::InvalidInput(format!($err))
    };
}

/// Construct an `Error::Conflict` from a format string.
#[macro_export]
macro_rules! conflict {
    ($fmt:expr, $($arg:tt)*) => {
        $crate::Error::Conflict(format!($fmt, $($arg)*))
    };
     ($err:expr $(,)?) => {
        $crate::Error::Conflict(format!($err))
    };
}
