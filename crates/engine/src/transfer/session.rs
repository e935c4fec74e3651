use crate::Context;
use crate::progress::TransferProgress;
use crate::transfer::TransferItem;
use crate::transfer::error::{Error, ErrorKind, Result, from_source, from_storage};
use blobrob_azure::BoxAsyncRead;
use blobrob_storage::BoxAsyncWrite;
use exn::ResultExt;
use futures::{AsyncReadExt, AsyncWriteExt};
use std::fmt::{self, Debug, Formatter};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// How a [`Step`] left the session.
#[derive(Debug)]
pub enum Status {
    /// More to come: call [`TransferSession::step`] again.
    Transferring,
    /// End of the remote stream reached and the local file closed.
    Completed,
    /// Cancellation was requested before this step. Whatever was already
    /// written stays on disk.
    Cancelled,
    /// Reading or writing failed; the session is over.
    Failed(Error),
}

/// Result of one [`TransferSession::step`].
#[derive(Debug)]
pub struct Step {
    /// Bytes written to the sink by this step.
    pub delta: u64,
    pub progress: TransferProgress,
    pub status: Status,
}

impl Step {
    pub fn is_done(&self) -> bool {
        !matches!(self.status, Status::Transferring)
    }
}

struct Handles {
    reader: BoxAsyncRead,
    writer: BoxAsyncWrite,
}

/// A single blob download, advanced one chunk at a time.
///
/// Nothing happens in the background: each [`step`](Self::step) reads at
/// most one chunk from the remote stream, writes it out and returns, so the
/// caller can redraw or cancel between chunks. Both handles are released on
/// the step that reports a terminal [`Status`], and only on that step.
pub struct TransferSession {
    item: TransferItem,
    target: PathBuf,
    progress: TransferProgress,
    buffer: Vec<u8>,
    cancel: CancellationToken,
    handles: Option<Handles>,
}

impl TransferSession {
    /// Resolve the local path, open the remote stream and create the local
    /// file. No data is copied yet.
    ///
    /// The remote side is opened first so that a blob we can't read never
    /// leaves an empty file behind.
    #[instrument(skip_all, fields(item = %item))]
    pub async fn open(ctx: &Context, item: TransferItem, cancel: CancellationToken) -> Result<Self> {
        let target = ctx.paths.generate(&item, ctx.date).or_raise(|| ErrorKind::InvalidName(item.id()))?;
        if !ctx.overwrite {
            let exists = ctx.sink.exists(&target).await.map_err(|e| from_storage(e, target.clone()))?;
            if exists {
                exn::bail!(ErrorKind::AlreadyExists(target));
            }
        }
        let source = ctx
            .source
            .open(&item.account, &item.container, &item.name, item.revision.as_ref())
            .await
            .map_err(from_source)?;
        let writer = ctx.sink.writer(&target).await.map_err(|e| from_storage(e, target.clone()))?;
        tracing::debug!(sink = ctx.sink.name(), target = %target.display(), length = ?source.length, "Opened transfer");
        Ok(Self {
            progress: TransferProgress {
                transferred: 0,
                expected: source.length.or(item.size),
            },
            item,
            target,
            buffer: vec![0; ctx.chunk_size.max(1)],
            cancel,
            handles: Some(Handles {
                reader: source.reader,
                writer,
            }),
        })
    }

    /// Copy at most one chunk.
    ///
    /// Checked in order: cancellation, end of stream, read or write failure.
    /// Once a terminal step has been returned every further call fails with
    /// [`ErrorKind::SessionClosed`].
    pub async fn step(&mut self) -> Result<Step> {
        let Some(handles) = self.handles.as_mut() else {
            exn::bail!(ErrorKind::SessionClosed);
        };
        if self.cancel.is_cancelled() {
            if let Some(e) = self.release().await {
                tracing::warn!(error = ?e, "Failed to close cancelled transfer");
            }
            tracing::info!(item = %self.item, bytes = self.progress.transferred, "Transfer cancelled");
            return Ok(self.report(0, Status::Cancelled));
        }

        let read = match handles.reader.read(&mut self.buffer).await {
            Ok(read) => read,
            Err(e) => {
                let error = exn::Exn::from(e).raise(ErrorKind::Transport(self.item.id()));
                return Ok(self.fail(error).await);
            },
        };
        if read == 0 {
            return Ok(match self.release().await {
                Some(error) => self.report(0, Status::Failed(error)),
                None => {
                    tracing::debug!(item = %self.item, bytes = self.progress.transferred, "Transfer complete");
                    self.report(0, Status::Completed)
                },
            });
        }
        if let Err(e) = handles.writer.write_all(&self.buffer[..read]).await {
            let error = exn::Exn::from(e).raise(ErrorKind::LocalIo(self.target.clone()));
            return Ok(self.fail(error).await);
        }
        // Infallible: a usize (either 32- or 64-bit) will always fit in a u64.
        let delta = u64::try_from(read).unwrap_or(0);
        self.progress.transferred += delta;
        Ok(self.report(delta, Status::Transferring))
    }

    pub fn item(&self) -> &TransferItem {
        &self.item
    }

    /// Local path, relative to the sink root.
    pub fn target(&self) -> &Path {
        &self.target
    }

    pub fn progress(&self) -> TransferProgress {
        self.progress
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Takes effect on the next [`step`](Self::step).
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// `true` once a terminal step has been returned.
    pub fn is_done(&self) -> bool {
        self.handles.is_none()
    }

    async fn fail(&mut self, error: Error) -> Step {
        tracing::warn!(item = %self.item, error = ?error, "Transfer failed");
        if let Some(e) = self.release().await {
            tracing::debug!(error = ?e, "Failed to close sink after transfer failure");
        }
        self.report(0, Status::Failed(error))
    }

    /// Close the sink and drop both handles. Only the first call does
    /// anything.
    async fn release(&mut self) -> Option<Error> {
        let Handles { reader, mut writer } = self.handles.take()?;
        drop(reader);
        let closed = writer.close().await;
        closed.err().map(|e| exn::Exn::from(e).raise(ErrorKind::LocalIo(self.target.clone())))
    }

    fn report(&self, delta: u64, status: Status) -> Step {
        Step {
            delta,
            progress: self.progress,
            status,
        }
    }
}

impl Debug for TransferSession {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransferSession")
            .field("item", &self.item)
            .field("target", &self.target)
            .field("progress", &self.progress)
            .field("cancelled", &self.cancel.is_cancelled())
            .field("open", &self.handles.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{context, target};
    use blobrob_azure::{BlobInfo, MockStore, Revision};
    use blobrob_storage::backend::MockBackend;
    use std::sync::Arc;

    const DATA: &[u8] = &[7; 100];

    fn store() -> MockStore {
        MockStore::default().with_container("acct", "web", true).with_file("acct", "web", "a.bin", DATA)
    }

    async fn session(ctx: &Context, name: &str) -> TransferSession {
        TransferSession::open(ctx, TransferItem::new("acct", "web", name), CancellationToken::new()).await.unwrap()
    }

    /// Steps until done, returning every delta and the final status.
    async fn drive(session: &mut TransferSession) -> (Vec<u64>, Status) {
        let mut deltas = Vec::new();
        loop {
            let step = session.step().await.unwrap();
            deltas.push(step.delta);
            if step.is_done() {
                return (deltas, step.status);
            }
        }
    }

    #[tokio::test]
    async fn test_multi_chunk_deltas_sum_to_written_bytes() {
        let sink = Arc::new(MockBackend::default());
        let ctx = context(store(), &sink).with_chunk_size(32);
        let mut session = session(&ctx, "a.bin").await;
        assert_eq!(session.progress(), TransferProgress { transferred: 0, expected: Some(100) });

        let (deltas, status) = drive(&mut session).await;
        assert!(matches!(status, Status::Completed));
        assert_eq!(deltas, vec![32, 32, 32, 4, 0]);
        assert_eq!(deltas.iter().sum::<u64>(), 100);
        assert_eq!(sink.contents(target("acct", "web", "a.bin")).unwrap(), DATA);
        assert_eq!(session.progress().percent(), Some(100.0));
        assert!(session.is_done());
    }

    #[tokio::test]
    async fn test_zero_length_source() {
        let sink = Arc::new(MockBackend::default());
        let ctx = context(store().with_file("acct", "web", "empty", ""), &sink);
        let mut session = session(&ctx, "empty").await;
        let (deltas, status) = drive(&mut session).await;
        assert!(matches!(status, Status::Completed));
        assert_eq!(deltas, vec![0]);
        assert_eq!(sink.contents(target("acct", "web", "empty")).unwrap(), b"");
        assert_eq!(session.progress().percent(), None);
    }

    #[tokio::test]
    async fn test_cancel_between_steps() {
        let sink = Arc::new(MockBackend::default());
        let ctx = context(store(), &sink).with_chunk_size(10);
        let mut session = session(&ctx, "a.bin").await;
        assert_eq!(session.step().await.unwrap().delta, 10);

        session.cancel();
        let step = session.step().await.unwrap();
        assert!(matches!(step.status, Status::Cancelled));
        assert_eq!(step.delta, 0);
        assert_eq!(step.progress.transferred, 10);
        assert!(session.is_done());
        // Partial file stays behind.
        assert_eq!(sink.contents(target("acct", "web", "a.bin")).unwrap().len(), 10);

        let err = session.step().await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::SessionClosed));
    }

    #[tokio::test]
    async fn test_cancelled_before_first_step() {
        let sink = Arc::new(MockBackend::default());
        let ctx = context(store(), &sink);
        let cancel = CancellationToken::new();
        let item = TransferItem::new("acct", "web", "a.bin");
        let mut session = TransferSession::open(&ctx, item, cancel.clone()).await.unwrap();
        cancel.cancel();
        assert!(matches!(session.step().await.unwrap().status, Status::Cancelled));
    }

    #[tokio::test]
    async fn test_missing_blob_fails_to_open_without_creating_a_file() {
        let sink = Arc::new(MockBackend::default());
        let ctx = context(store(), &sink);
        let item = TransferItem::new("acct", "web", "nope.txt");
        let err = TransferSession::open(&ctx, item, CancellationToken::new()).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
        assert!(sink.paths().is_empty());
    }

    #[tokio::test]
    async fn test_blob_name_cannot_reach_another_container() {
        let name = "../../victim/web/index.html";
        let store = store().with_file("acct", "web", name, "planted");
        let sink = Arc::new(MockBackend::with_files([(target("victim", "web", "index.html"), "original")]));
        let ctx = context(store, &sink).with_overwrite(true);
        let err = TransferSession::open(&ctx, TransferItem::new("acct", "web", name), CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidName(_)));
        assert_eq!(sink.contents(target("victim", "web", "index.html")).unwrap(), b"original");
        assert_eq!(sink.paths().len(), 1);
    }

    #[tokio::test]
    async fn test_denied_blob() {
        let sink = Arc::new(MockBackend::default());
        let ctx = context(store().deny_open("acct", "web", "a.bin"), &sink);
        let item = TransferItem::new("acct", "web", "a.bin");
        let err = TransferSession::open(&ctx, item, CancellationToken::new()).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::AccessDenied(_)));
    }

    #[tokio::test]
    async fn test_existing_file_is_not_overwritten_by_default() {
        let existing = target("acct", "web", "a.bin");
        let sink = Arc::new(MockBackend::with_files([(existing.clone(), "old")]));
        let item = TransferItem::new("acct", "web", "a.bin");

        let ctx = context(store(), &sink);
        let err = TransferSession::open(&ctx, item.clone(), CancellationToken::new()).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::AlreadyExists(_)));
        assert_eq!(sink.contents(&existing).unwrap(), b"old");

        let ctx = context(store(), &sink).with_overwrite(true);
        let mut session = TransferSession::open(&ctx, item, CancellationToken::new()).await.unwrap();
        drive(&mut session).await;
        assert_eq!(sink.contents(&existing).unwrap(), DATA);
    }

    #[tokio::test]
    async fn test_write_failure_is_local_io() {
        let sink = Arc::new(MockBackend::default().fail_writes_to(target("acct", "web", "a.bin")));
        let ctx = context(store(), &sink);
        let mut session = session(&ctx, "a.bin").await;
        let (deltas, status) = drive(&mut session).await;
        assert_eq!(deltas, vec![0]);
        let Status::Failed(err) = status else {
            panic!("expected failure, got {status:?}");
        };
        assert!(matches!(&*err, ErrorKind::LocalIo(_)));
    }

    #[tokio::test]
    async fn test_read_failure_is_transport() {
        let sink = Arc::new(MockBackend::default());
        let ctx = context(store().fail_read_after("acct", "web", "a.bin", 40), &sink).with_chunk_size(32);
        let mut session = session(&ctx, "a.bin").await;
        let (deltas, status) = drive(&mut session).await;
        assert_eq!(deltas, vec![32, 8, 0]);
        let Status::Failed(err) = status else {
            panic!("expected failure, got {status:?}");
        };
        assert!(matches!(&*err, ErrorKind::Transport(_)));
        assert!(err.is_retryable());
        assert_eq!(sink.contents(target("acct", "web", "a.bin")).unwrap().len(), 40);
    }

    #[tokio::test]
    async fn test_pinned_revision() {
        let old = BlobInfo::new("a.bin", 3).with_revision(Revision::Snapshot("2024-01-01T00:00:00Z".into()));
        let sink = Arc::new(MockBackend::default());
        let ctx = context(store().with_blob("acct", "web", old.clone(), "old"), &sink);
        let item = TransferItem::from_blob("acct", "web", &old);
        let mut session = TransferSession::open(&ctx, item, CancellationToken::new()).await.unwrap();
        assert_eq!(session.target(), Path::new("2024-01-01/acct/web/a_20240101000000.bin"));
        drive(&mut session).await;
        assert_eq!(sink.contents(session.target()).unwrap(), b"old");
    }
}
