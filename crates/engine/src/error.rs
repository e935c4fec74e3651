//! Engine-level error types.
//!
//! Scanning never fails and transfers carry their own
//! [`transfer::error`](crate::transfer::error) taxonomy, so what's left here
//! is setting the engine up.

use derive_more::{Display, Error};

/// An engine error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for engine setup operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Template failed to compile.
    #[display("invalid download path template")]
    InvalidTemplate,
    /// Template compiled but couldn't be rendered into a safe path.
    #[display("issue with path generation from template")]
    Template,
    /// Blob name has `..` segments or nothing left once normalised.
    #[display("unsafe blob name: {_0}")]
    UnsafeName(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        false
    }
}
