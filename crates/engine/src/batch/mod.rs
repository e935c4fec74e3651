//! Sequential multi-blob downloads.

mod coordinator;
mod queue;
mod summary;

pub use self::coordinator::{BatchStep, BatchTransfer, ItemOutcome};
pub use self::queue::latest_revisions;
pub use self::summary::{BatchSummary, FailedItem};
