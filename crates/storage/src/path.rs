//! Path validation for sink targets.
//!
//! Blob names are attacker-controlled (anyone can upload `../../.bashrc` to a
//! public container), so every target path is resolved here before a backend
//! joins it onto its root.

use std::path::{Component, Path, PathBuf};

use crate::error::{ErrorKind, Result};

/// Normalises a relative sink path and rejects anything that would escape the
/// backend root.
///
/// `.` and empty segments are dropped, `..` pops the previous segment and is
/// an error if there is nothing left to pop. Leading slashes are ignored (blob
/// names like `/index.html` are legal on the remote side). NUL bytes and
/// Windows path prefixes are rejected, as is a path that resolves to nothing.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use blobrob_storage::validate_path;
///
/// assert!(validate_path("2024-01-01/acct/web/index.html").is_ok());
/// assert!(validate_path("acct/web/../index.html").is_ok());
/// assert!(validate_path("../../etc/passwd").is_err());
/// assert!(validate_path("acct/../../escape").is_err());
/// assert_eq!(
///     validate_path("/acct//web/./assets/../index.html").unwrap(),
///     Path::new("acct/web/index.html")
/// );
/// ```
pub fn validate(path: impl AsRef<Path>) -> Result<PathBuf> {
    let original = path.as_ref();
    let invalid = || ErrorKind::InvalidPath(original.to_path_buf());
    let mut segments = Vec::new();
    for component in original.components() {
        match component {
            Component::Normal(segment) => {
                // Path::components() lets NUL through on Unix; the syscall would truncate at it.
                if segment.as_encoded_bytes().contains(&0) {
                    exn::bail!(invalid());
                }
                segments.push(segment);
            },
            Component::CurDir | Component::RootDir => {},
            Component::Prefix(_) => exn::bail!(invalid()),
            Component::ParentDir => {
                if segments.pop().is_none() {
                    exn::bail!(invalid());
                }
            },
        }
    }
    if segments.is_empty() {
        exn::bail!(invalid());
    }
    Ok(segments.into_iter().collect())
}
