//! Remote store error types.
//!
//! Probes never surface these: absence is a normal probe result. They come
//! out of listing and downloads, where the caller decides whether one failed
//! blob matters.

use derive_more::{Display, Error};

/// A remote store error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for remote store operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Account, container or blob doesn't exist (HTTP 404)
    #[display("not found: {_0}")]
    NotFound(#[error(not(source))] String),
    /// Credential missing, wrong or insufficient (HTTP 401/403)
    #[display("access denied: {_0}")]
    AccessDenied(#[error(not(source))] String),
    /// Any other non-success HTTP status
    #[display("unexpected HTTP status {status} for {target}")]
    Status {
        status: u16,
        #[error(not(source))]
        target: String,
    },
    /// Connection, DNS, TLS, timeout or mid-body failure
    #[display("transport error: {_0}")]
    Transport(#[error(not(source))] String),
    /// Body couldn't be parsed as an enumeration result
    #[display("invalid response: {_0}")]
    InvalidResponse(#[error(not(source))] String),
    /// Name can't be turned into a request URL
    #[display("invalid request target: {_0}")]
    InvalidTarget(#[error(not(source))] String),
}

impl ErrorKind {
    /// Map an HTTP status code to an error for the named target.
    pub fn from_status(status: u16, target: impl Into<String>) -> Self {
        let target = target.into();
        match status {
            404 => Self::NotFound(target),
            401 | 403 => Self::AccessDenied(target),
            status => Self::Status { status, target },
        }
    }

    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Status { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}
