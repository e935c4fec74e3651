use crate::Context;
use crate::batch::summary::{BatchSummary, FailedItem};
use crate::progress::TransferProgress;
use crate::transfer::error::ErrorKind;
use crate::transfer::{Status, TransferItem, TransferSession};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// How one queued item ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    Succeeded,
    Failed(String),
    /// Cancelled, either mid-transfer or before it started, or already
    /// downloaded and overwriting is off.
    Skipped,
}

/// What one [`BatchTransfer::step`] did.
///
/// `index` is 1-based, so `index` of `total` reads naturally.
#[derive(Debug)]
pub enum BatchStep {
    /// The next item was opened and is ready to transfer.
    Started {
        index: usize,
        total: usize,
        item: TransferItem,
        target: PathBuf,
    },
    /// One chunk of the current item was copied.
    Progress {
        index: usize,
        total: usize,
        delta: u64,
        progress: TransferProgress,
    },
    /// The current item reached a terminal state. An item that fails to open
    /// goes straight here, without a `Started`.
    ItemFinished {
        index: usize,
        total: usize,
        item: TransferItem,
        outcome: ItemOutcome,
    },
    /// Nothing left to do. Every later call returns the same summary.
    Complete(BatchSummary),
}

/// Downloads a queue of items one after another, one chunk per
/// [`step`](Self::step).
///
/// A failed item is recorded and the batch moves on. Cancelling stops the
/// active transfer on its next step and marks it, and everything still
/// queued, as skipped.
pub struct BatchTransfer {
    ctx: Arc<Context>,
    queue: VecDeque<TransferItem>,
    total: usize,
    index: usize,
    active: Option<TransferSession>,
    cancel: CancellationToken,
    tally: BatchSummary,
    summary: Option<BatchSummary>,
}

impl BatchTransfer {
    pub fn start(ctx: Arc<Context>, items: impl IntoIterator<Item = TransferItem>) -> Self {
        let queue: VecDeque<TransferItem> = items.into_iter().collect();
        let total = queue.len();
        tracing::info!(total, "Starting batch download");
        Self {
            ctx,
            queue,
            total,
            index: 0,
            active: None,
            cancel: CancellationToken::new(),
            tally: BatchSummary {
                total,
                ..Default::default()
            },
            summary: None,
        }
    }

    /// Share an existing token, e.g. one wired to Ctrl-C.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_complete(&self) -> bool {
        self.summary.is_some()
    }

    pub async fn step(&mut self) -> BatchStep {
        if let Some(summary) = &self.summary {
            return BatchStep::Complete(summary.clone());
        }
        if self.active.is_some() {
            return self.advance().await;
        }
        if self.cancel.is_cancelled() {
            return self.finish();
        }
        let Some(item) = self.queue.pop_front() else {
            return self.finish();
        };
        self.index += 1;
        self.tally.attempted += 1;
        match TransferSession::open(&self.ctx, item.clone(), self.cancel.child_token()).await {
            Ok(session) => {
                let target = session.target().to_path_buf();
                self.active = Some(session);
                BatchStep::Started {
                    index: self.index,
                    total: self.total,
                    item,
                    target,
                }
            },
            Err(e) if matches!(&*e, ErrorKind::AlreadyExists(_)) => {
                tracing::info!(item = %item, "Already downloaded, skipping");
                self.finish_item(item, ItemOutcome::Skipped)
            },
            Err(e) => {
                tracing::warn!(item = %item, error = ?e, "Could not start download");
                self.finish_item(item, ItemOutcome::Failed(e.to_string()))
            },
        }
    }

    async fn advance(&mut self) -> BatchStep {
        let Some(session) = self.active.as_mut() else {
            return self.finish();
        };
        let outcome = match session.step().await {
            Ok(step) => match step.status {
                Status::Transferring => {
                    return BatchStep::Progress {
                        index: self.index,
                        total: self.total,
                        delta: step.delta,
                        progress: step.progress,
                    };
                },
                Status::Completed => ItemOutcome::Succeeded,
                Status::Cancelled => ItemOutcome::Skipped,
                Status::Failed(e) => ItemOutcome::Failed(e.to_string()),
            },
            Err(e) => ItemOutcome::Failed(e.to_string()),
        };
        let Some(session) = self.active.take() else {
            return self.finish();
        };
        self.finish_item(session.item().clone(), outcome)
    }

    fn finish_item(&mut self, item: TransferItem, outcome: ItemOutcome) -> BatchStep {
        match &outcome {
            ItemOutcome::Succeeded => self.tally.succeeded += 1,
            ItemOutcome::Failed(reason) => self.tally.failed.push(FailedItem {
                id: item.id(),
                reason: reason.clone(),
            }),
            ItemOutcome::Skipped => self.tally.skipped.push(item.id()),
        }
        BatchStep::ItemFinished {
            index: self.index,
            total: self.total,
            item,
            outcome,
        }
    }

    fn finish(&mut self) -> BatchStep {
        if self.cancel.is_cancelled() {
            self.tally.cancelled = true;
            self.tally.skipped.extend(self.queue.drain(..).map(|item| item.id()));
        }
        let summary = std::mem::take(&mut self.tally);
        tracing::info!(
            succeeded = summary.succeeded,
            failed = summary.failed.len(),
            skipped = summary.skipped.len(),
            "Batch download finished"
        );
        self.summary = Some(summary.clone());
        BatchStep::Complete(summary)
    }
}
