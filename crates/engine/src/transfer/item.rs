use blobrob_azure::{BlobInfo, Revision};
use std::fmt::{self, Display, Formatter};

/// One remote object to download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferItem {
    pub account: String,
    pub container: String,
    pub name: String,
    /// `None` downloads whatever is current.
    pub revision: Option<Revision>,
    /// Expected length in bytes, when the listing reported one.
    pub size: Option<u64>,
}

impl TransferItem {
    pub fn new(account: impl Into<String>, container: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            container: container.into(),
            name: name.into(),
            revision: None,
            size: None,
        }
    }

    pub fn with_revision(mut self, revision: Revision) -> Self {
        self.revision = Some(revision);
        self
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    /// The listed blob, pinned to its revision unless it's the current one.
    pub fn from_blob(account: impl Into<String>, container: impl Into<String>, blob: &BlobInfo) -> Self {
        let item = Self::new(account, container, &blob.name).with_size(blob.size);
        match &blob.revision {
            Some(revision) if !blob.is_current() => item.with_revision(revision.clone()),
            _ => item,
        }
    }

    /// Stable identifier used in logs and batch summaries.
    pub fn id(&self) -> String {
        self.to_string()
    }
}

impl Display for TransferItem {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.account, self.container, self.name)?;
        if let Some(revision) = &self.revision {
            write!(f, "@{revision}")?;
        }
        Ok(())
    }
}
