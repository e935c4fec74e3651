//! Sink backends: the local write side of a blob transfer. The remote read
//! side lives in `blobrob-azure`.

mod local;
#[cfg(feature = "mock")]
mod mock;

pub use self::local::LocalBackend;
#[cfg(feature = "mock")]
pub use self::mock::MockBackend;
use crate::error::Result;
use async_trait::async_trait;
use futures::io::AsyncWrite;
use std::path::Path;

/// Streaming writer handed out by [`StorageBackend::writer`].
pub type BoxAsyncWrite = Box<dyn AsyncWrite + Send + Unpin + 'static>;

/// Somewhere to write downloaded blobs.
///
/// # Path Handling
/// All paths are relative to the backend root and are validated with
/// [`validate_path`](crate::validate_path) by the implementation before use.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use futures::AsyncWriteExt;
/// use blobrob_storage::{backend::StorageBackend, error::Result};
///
/// async fn save(backend: &dyn StorageBackend, chunks: &[&[u8]]) -> Result<()> {
///     let mut writer = backend.writer(Path::new("acct/web/index.html")).await?;
///     for chunk in chunks {
///         writer.write_all(chunk).await.map_err(blobrob_storage::error::ErrorKind::Io)?;
///     }
///     writer.close().await.map_err(blobrob_storage::error::ErrorKind::Io)?;
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Label for log lines.
    fn name(&self) -> &str;

    /// Whether an earlier download already occupies `path`.
    async fn exists(&self, path: &Path) -> Result<bool>;

    /// Open a file for streaming writes, truncating anything already there.
    ///
    /// # Notes
    /// - Implementations create parent directories as needed.
    /// - Callers must `close()` the writer to flush it and observe the final
    ///   error, dropping it can silently lose the tail of the file.
    async fn writer(&self, path: &Path) -> Result<BoxAsyncWrite>;
}
