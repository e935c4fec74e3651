//! In-memory sink for engine tests.

use crate::StorageBackend;
use crate::backend::BoxAsyncWrite;
use crate::error::{ErrorKind, Result};
use crate::path::validate as validate_path;
use async_trait::async_trait;
use futures::io::AsyncWrite;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

type Files = Arc<Mutex<HashMap<PathBuf, Vec<u8>>>>;

/// Keeps every written file in a shared map.
///
/// Writers append straight into the shared map, so a test can observe
/// exactly which bytes reached the sink even when a transfer is abandoned
/// half-way through (just like a real file on disk).
///
/// # Examples
///
/// ```
/// use blobrob_storage::backend::{MockBackend, StorageBackend};
/// use futures::AsyncWriteExt;
/// use std::path::Path;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = MockBackend::with_files([("acct/web/old.txt", b"old")]);
/// assert!(backend.exists(Path::new("acct/web/old.txt")).await?);
///
/// let mut writer = backend.writer(Path::new("acct/web/new.txt")).await?;
/// writer.write_all(b"new").await?;
/// writer.close().await?;
/// assert_eq!(backend.contents("acct/web/new.txt").unwrap(), b"new");
/// # Ok(())
/// # }
/// ```
pub struct MockBackend {
    name: String,
    files: Files,
    failing: HashSet<PathBuf>,
}

impl MockBackend {
    /// Seed the sink with earlier downloads.
    ///
    /// Panics if any path fails validation. If test setup is wrong, then
    /// the test should not pass.
    pub fn with_files(files: impl IntoIterator<Item = (impl Into<PathBuf>, impl Into<Vec<u8>>)>) -> Self {
        let mut map = HashMap::new();
        for (path, data) in files {
            let path = path.into();
            let Ok(validated) = validate_path(&path) else {
                panic!("MockBackend::with_files: invalid path {}", path.display());
            };
            map.insert(validated, data.into());
        }
        Self {
            name: "mock".to_string(),
            files: Arc::new(Mutex::new(map)),
            failing: HashSet::new(),
        }
    }

    /// Writers opened for this path accept the open but fail every write,
    /// like a disk filling up mid-transfer.
    pub fn fail_writes_to(mut self, path: impl AsRef<Path>) -> Self {
        let Ok(validated) = validate_path(path.as_ref()) else {
            panic!("MockBackend::fail_writes_to: invalid path {}", path.as_ref().display());
        };
        self.failing.insert(validated);
        self
    }

    /// Current contents of a file, if it exists (synchronous, for asserts).
    pub fn contents(&self, path: impl AsRef<Path>) -> Option<Vec<u8>> {
        let path = validate_path(path.as_ref()).ok()?;
        lock(&self.files).get(&path).cloned()
    }

    /// Every path currently stored, sorted.
    pub fn paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = lock(&self.files).keys().cloned().collect();
        paths.sort();
        paths
    }
}
impl Default for MockBackend {
    fn default() -> Self {
        let files: [(&str, &str); 0] = [];
        Self::with_files(files)
    }
}

// A panic in one test thread shouldn't poison every assert that follows it.
fn lock(files: &Files) -> MutexGuard<'_, HashMap<PathBuf, Vec<u8>>> {
    files.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl StorageBackend for MockBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        let path = validate_path(path)?;
        Ok(lock(&self.files).contains_key(&path))
    }

    async fn writer(&self, path: &Path) -> Result<BoxAsyncWrite> {
        let path = validate_path(path)?;
        lock(&self.files).insert(path.clone(), Vec::new());
        Ok(Box::new(MockWriter {
            failing: self.failing.contains(&path),
            path,
            files: Arc::clone(&self.files),
            closed: false,
        }))
    }
}

struct MockWriter {
    path: PathBuf,
    files: Files,
    failing: bool,
    closed: bool,
}

impl MockWriter {
    fn check(&self) -> std::io::Result<()> {
        if self.closed {
            return Err(std::io::Error::other(ErrorKind::Closed(self.path.clone())));
        }
        if self.failing {
            return Err(std::io::Error::new(std::io::ErrorKind::StorageFull, "mock disk full"));
        }
        Ok(())
    }
}

impl AsyncWrite for MockWriter {
    fn poll_write(self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &[u8]) -> Poll<std::io::Result<usize>> {
        if let Err(e) = self.check() {
            return Poll::Ready(Err(e));
        }
        lock(&self.files).entry(self.path.clone()).or_default().extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(self.check())
    }

    fn poll_close(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        self.closed = true;
        Poll::Ready(Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::AsyncWriteExt;

    #[tokio::test]
    async fn test_writer_appends_visible_bytes() {
        let backend = MockBackend::default();
        let mut writer = backend.writer(Path::new("a/b.txt")).await.unwrap();
        assert_eq!(backend.contents("a/b.txt").unwrap(), b"");
        writer.write_all(b"hello ").await.unwrap();
        assert_eq!(backend.contents("a/b.txt").unwrap(), b"hello ");
        writer.write_all(b"world").await.unwrap();
        writer.close().await.unwrap();
        assert_eq!(backend.contents("a/b.txt").unwrap(), b"hello world");
    }

    #[tokio::test]
    async fn test_writer_rejects_writes_after_close() {
        let backend = MockBackend::default();
        let mut writer = backend.writer(Path::new("x")).await.unwrap();
        writer.close().await.unwrap();
        assert!(writer.write_all(b"late").await.is_err());
    }

    #[tokio::test]
    async fn test_failing_path() {
        let backend = MockBackend::default().fail_writes_to("bad/file.bin");
        let mut writer = backend.writer(Path::new("bad/file.bin")).await.unwrap();
        let err = writer.write_all(b"data").await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::StorageFull);
        let mut ok = backend.writer(Path::new("good/file.bin")).await.unwrap();
        ok.write_all(b"data").await.unwrap();
    }

    #[tokio::test]
    async fn test_with_files_and_paths() {
        let backend = MockBackend::with_files([("z.txt", "z"), ("a/b.txt", "b")]);
        assert_eq!(backend.name(), "mock");
        assert_eq!(backend.paths(), vec![PathBuf::from("a/b.txt"), PathBuf::from("z.txt")]);
        assert!(backend.exists(Path::new("z.txt")).await.unwrap());
        assert!(!backend.exists(Path::new("missing")).await.unwrap());
    }
}
