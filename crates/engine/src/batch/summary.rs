use std::fmt::{self, Display, Formatter};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedItem {
    pub id: String,
    pub reason: String,
}

/// Final tally of a [`BatchTransfer`](super::BatchTransfer).
///
/// Cancelled items, and files already on disk when overwriting is off, land
/// in `skipped`, never in `failed`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub total: usize,
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: Vec<FailedItem>,
    pub skipped: Vec<String>,
    pub cancelled: bool,
}

impl BatchSummary {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.skipped.is_empty()
    }
}

impl Display for BatchSummary {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.total == 0 {
            return f.write_str("No files to download.");
        }
        if self.is_clean() {
            return write!(f, "Successfully downloaded {} files!", self.succeeded);
        }
        write!(f, "Downloaded: {}\nFailed: {}", self.succeeded, self.failed.len())?;
        if !self.skipped.is_empty() {
            write!(f, "\nSkipped: {}", self.skipped.len())?;
        }
        if !self.failed.is_empty() {
            f.write_str("\n\nFailed files:")?;
            for item in &self.failed {
                write!(f, "\n{}: {}", item.id, item.reason)?;
            }
        }
        Ok(())
    }
}
