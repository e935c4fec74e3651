//! Transfer error types.
//!
//! Every failure a transfer can hit resolves to one of these, attached to the
//! item that failed. Cancellation is deliberately absent: a cancelled
//! transfer ends with [`Status::Cancelled`](super::Status::Cancelled).

use blobrob_azure::error::{Error as SourceError, ErrorKind as SourceErrorKind};
use blobrob_storage::error::{Error as StorageError, ErrorKind as StorageErrorKind};
use derive_more::{Display, Error};
use std::path::PathBuf;

/// A transfer error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for transfer operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Network failure opening or reading the remote blob
    #[display("transport failure: {_0}")]
    Transport(#[error(not(source))] String),
    /// Remote blob (or the requested revision of it) doesn't exist
    #[display("remote blob not found: {_0}")]
    NotFound(#[error(not(source))] String),
    /// Remote refused to serve the blob
    #[display("access denied: {_0}")]
    AccessDenied(#[error(not(source))] String),
    /// Creating or writing the local file failed
    #[display("local I/O failure: {}", _0.display())]
    LocalIo(#[error(not(source))] PathBuf),
    /// Local file exists and overwriting wasn't allowed
    #[display("file already exists: {}", _0.display())]
    AlreadyExists(#[error(not(source))] PathBuf),
    /// Blob name couldn't be turned into a safe local path
    #[display("cannot derive a local path for {_0}")]
    InvalidName(#[error(not(source))] String),
    /// The session already reported a terminal step
    #[display("transfer session already finished")]
    SessionClosed,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

/// Re-raise a remote store error as a transfer error, keeping the tree.
pub(crate) fn from_source(err: SourceError) -> Error {
    let kind = match &*err {
        SourceErrorKind::NotFound(target) => ErrorKind::NotFound(target.clone()),
        SourceErrorKind::AccessDenied(target) => ErrorKind::AccessDenied(target.clone()),
        other => ErrorKind::Transport(other.to_string()),
    };
    err.raise(kind)
}

/// Re-raise a sink error as a transfer error for `path`, keeping the tree.
pub(crate) fn from_storage(err: StorageError, path: PathBuf) -> Error {
    let kind = match &*err {
        StorageErrorKind::AlreadyExists(_) => ErrorKind::AlreadyExists(path),
        StorageErrorKind::InvalidPath(_) => ErrorKind::InvalidName(path.display().to_string()),
        _ => ErrorKind::LocalIo(path),
    };
    err.raise(kind)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(SourceErrorKind::NotFound("a/b/c".into()), "not found")]
    #[case(SourceErrorKind::AccessDenied("a/b/c".into()), "denied")]
    #[case(SourceErrorKind::Transport("reset".into()), "transport")]
    #[case(SourceErrorKind::Status { status: 500, target: "a/b/c".into() }, "transport")]
    fn test_source_errors(#[case] source: SourceErrorKind, #[case] expected: &str) {
        let err = from_source(exn::Exn::from(source));
        let matched = match &*err {
            ErrorKind::NotFound(_) => "not found",
            ErrorKind::AccessDenied(_) => "denied",
            ErrorKind::Transport(_) => "transport",
            other => panic!("unexpected error: {other}"),
        };
        assert_eq!(matched, expected);
    }

    #[test]
    fn test_storage_errors_carry_target_path() {
        let io = std::io::Error::other("disk on fire");
        let err = from_storage(exn::Exn::from(StorageErrorKind::Io(io)), PathBuf::from("a/b.txt"));
        assert!(matches!(&*err, ErrorKind::LocalIo(path) if path == &PathBuf::from("a/b.txt")));
        assert!(!err.is_retryable());
    }
}
