//! Remote side of blobrob: talking to Azure Blob Storage.
//!
//! Two seams are exposed as traits so the engine never depends on HTTP:
//! [`Probe`] answers "does this account/container exist and can I list it",
//! [`ObjectSource`] lists containers and opens blobs for streaming reads.
//! [`BlobClient`] implements both against the real REST API.

mod client;
pub mod error;
#[cfg(feature = "mock")]
mod mock;
mod models;

pub use crate::client::{API_VERSION, BlobClient, CURL_TARGET, ClientOptions, DEFAULT_ENDPOINT, DEFAULT_USER_AGENT};
#[cfg(feature = "mock")]
pub use crate::mock::MockStore;
pub use crate::models::{BlobInfo, ContainerProbe, Revision};
use crate::error::Result;
use async_trait::async_trait;
use futures::io::AsyncRead;
use std::sync::Arc;

pub type BoxAsyncRead = Box<dyn AsyncRead + Send + Unpin + 'static>;
pub type ProbeHandle = Arc<dyn Probe>;
pub type SourceHandle = Arc<dyn ObjectSource>;

/// An open download.
pub struct BlobReader {
    pub reader: BoxAsyncRead,
    /// `Content-Length` of the response, when the server sent one.
    pub length: Option<u64>,
}

/// Existence checks for candidate names.
///
/// Never fails: DNS errors, timeouts and refused connections all mean "not
/// there" as far as discovery is concerned.
#[async_trait]
pub trait Probe: Send + Sync {
    async fn probe_account(&self, account: &str) -> bool;

    async fn probe_container(&self, account: &str, container: &str) -> ContainerProbe;
}

/// Listing and reading blobs in a container.
#[async_trait]
pub trait ObjectSource: Send + Sync {
    /// Every blob in the container, pagination flattened. Includes old
    /// versions when the account supports versioning.
    async fn list(&self, account: &str, container: &str) -> Result<Vec<BlobInfo>>;

    /// Every version and snapshot of exactly one blob.
    async fn versions(&self, account: &str, container: &str, name: &str) -> Result<Vec<BlobInfo>>;

    /// Open a blob (optionally pinned to a revision) for streaming.
    async fn open(&self, account: &str, container: &str, name: &str, revision: Option<&Revision>) -> Result<BlobReader>;
}
