//! Discovery and download orchestration for blobrob.
//!
//! - [`scan`] probes every account/container candidate under bounded
//!   concurrency and streams [`DiscoveryEvent`]s back to the caller.
//! - [`transfer`] copies one blob to the sink, one chunk per
//!   [`step`](TransferSession::step), so the caller decides when the next
//!   chunk happens (and can cancel between any two).
//! - [`batch`] drives transfers over a queue of items, one at a time, and
//!   summarises the outcome.
//!
//! Nothing in here spawns work for transfers. Only the scanner runs in the
//! background.

pub mod batch;
pub mod error;
#[cfg(test)]
mod fixtures;
pub mod progress;
pub mod scan;
mod template;
pub mod transfer;

pub use crate::batch::{BatchStep, BatchSummary, BatchTransfer, ItemOutcome, latest_revisions};
pub use crate::progress::{Progress, TransferProgress};
pub use crate::scan::{CandidateSpace, DiscoveryEvent, DiscoveryStream, ScanOptions, Scanner};
pub use crate::template::{DEFAULT_TEMPLATE, PathGenerator, revision_file_name};
pub use crate::transfer::{Status, Step, TransferItem, TransferSession};
use blobrob_azure::SourceHandle;
use blobrob_storage::BackendHandle;
use time::{Date, OffsetDateTime};

/// Bytes read from the source per [`TransferSession::step`].
pub const DEFAULT_CHUNK_SIZE: usize = 32 * 1024;

/// Everything a transfer needs besides the item itself.
///
/// The date used in download paths is captured once, when the context is
/// built, so a batch that runs past midnight still lands in one directory.
pub struct Context {
    pub source: SourceHandle,
    pub sink: BackendHandle,
    pub paths: PathGenerator,
    pub chunk_size: usize,
    pub overwrite: bool,
    pub date: Date,
}

impl Context {
    pub fn new(source: SourceHandle, sink: BackendHandle, paths: PathGenerator) -> Self {
        Self {
            source,
            sink,
            paths,
            chunk_size: DEFAULT_CHUNK_SIZE,
            overwrite: false,
            date: OffsetDateTime::now_utc().date(),
        }
    }

    /// A zero chunk size would never make progress, so it's bumped to one.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn with_date(mut self, date: Date) -> Self {
        self.date = date;
        self
    }
}
