use std::sync::Arc;

/// Every account candidate crossed with every container candidate.
///
/// Cheap to clone; the workers share the container list.
#[derive(Debug, Clone)]
pub struct CandidateSpace {
    pub(super) accounts: Arc<[String]>,
    pub(super) containers: Arc<[String]>,
}

impl CandidateSpace {
    pub fn new<A, C>(accounts: A, containers: C) -> Self
    where
        A: IntoIterator,
        A::Item: Into<String>,
        C: IntoIterator,
        C::Item: Into<String>,
    {
        Self {
            accounts: accounts.into_iter().map(Into::into).collect(),
            containers: containers.into_iter().map(Into::into).collect(),
        }
    }

    pub fn accounts(&self) -> &[String] {
        &self.accounts
    }

    pub fn containers(&self) -> &[String] {
        &self.containers
    }

    /// Number of account/container pairs, the denominator for progress.
    pub fn total(&self) -> u64 {
        let accounts = u64::try_from(self.accounts.len()).unwrap_or(u64::MAX);
        let containers = u64::try_from(self.containers.len()).unwrap_or(u64::MAX);
        accounts.saturating_mul(containers)
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}
