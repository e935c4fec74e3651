//! Progress primitives shared by the scanner and transfers.

use derive_more::Display;

/// Completed units out of a known total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[display("{completed}/{total}")]
pub struct Progress {
    pub completed: u64,
    pub total: u64,
}

impl Progress {
    pub fn percent(&self) -> Option<f64> {
        (self.total > 0).then(|| self.completed as f64 * 100.0 / self.total as f64)
    }

    pub fn is_complete(&self) -> bool {
        self.completed >= self.total
    }
}

/// Single-owner counter for a fixed number of units.
///
/// Only ever advanced by whoever owns it, and saturates at the total, so
/// every [`Progress`] it hands out is non-decreasing and never overshoots.
#[derive(Debug)]
pub(crate) struct ProgressCounter {
    completed: u64,
    total: u64,
}

impl ProgressCounter {
    pub(crate) fn new(total: u64) -> Self {
        Self { completed: 0, total }
    }

    pub(crate) fn advance(&mut self, units: u64) -> Progress {
        self.completed = self.completed.saturating_add(units).min(self.total);
        self.current()
    }

    pub(crate) fn current(&self) -> Progress {
        Progress {
            completed: self.completed,
            total: self.total,
        }
    }
}

/// Bytes moved by a transfer so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferProgress {
    pub transferred: u64,
    /// Unknown when neither the listing nor the response reported a length.
    pub expected: Option<u64>,
}

impl TransferProgress {
    /// `None` when the expected length is unknown or zero. Capped at 100 in
    /// case the blob grew since it was listed.
    pub fn percent(&self) -> Option<f64> {
        match self.expected {
            Some(expected) if expected > 0 => Some((self.transferred as f64 * 100.0 / expected as f64).min(100.0)),
            _ => None,
        }
    }
}
