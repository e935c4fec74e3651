//! Download sink errors.
//!
//! Every error is an `exn` tree rooted in an [`ErrorKind`]. The engine reads
//! the kind through `Deref` to decide how a transfer ended, e.g.
//! `matches!(&*err, ErrorKind::AlreadyExists(_))` for a refused overwrite.

use derive_more::{Display, Error};
use std::io::Error as IoError;
use std::path::{Path, PathBuf};

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("no such file in the download root: {}", _0.display())]
    NotFound(#[error(not(source))] PathBuf),
    #[display("not allowed to write {}", _0.display())]
    PermissionDenied(#[error(not(source))] PathBuf),
    /// Raised instead of clobbering an earlier download.
    #[display("refusing to overwrite {}", _0.display())]
    AlreadyExists(#[error(not(source))] PathBuf),
    /// Blob names are untrusted input: anything absolute or climbing out of
    /// the download root ends up here.
    #[display("unsafe download path: {}", _0.display())]
    InvalidPath(#[error(not(source))] PathBuf),
    /// A write arrived after the writer was closed.
    #[display("writer already closed: {}", _0.display())]
    Closed(#[error(not(source))] PathBuf),
    #[display("filesystem error: {_0}")]
    Io(IoError),
}

impl From<IoError> for ErrorKind {
    fn from(err: IoError) -> Self {
        Self::Io(err)
    }
}

impl ErrorKind {
    /// The file the error is about, when there is one.
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::NotFound(p) | Self::PermissionDenied(p) | Self::AlreadyExists(p) | Self::InvalidPath(p) | Self::Closed(p) => {
                Some(p)
            },
            Self::Io(_) => None,
        }
    }

    /// Only plain I/O failures (full disk, interrupted write) are worth
    /// another attempt; the rest will fail the same way again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_))
    }
}
