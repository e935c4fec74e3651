//! In-memory blob store for testing.

use crate::error::{ErrorKind, Result};
use crate::models::{BlobInfo, ContainerProbe, Revision};
use crate::{BlobReader, ObjectSource, Probe};
use async_trait::async_trait;
use futures::io::AsyncRead;
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;

#[derive(Clone, Copy)]
enum Fault {
    Open,
    Denied,
    ReadAfter(usize),
}

struct MockBlob {
    info: BlobInfo,
    data: Vec<u8>,
    fault: Option<Fault>,
}

#[derive(Default)]
struct MockContainer {
    public: bool,
    blobs: Vec<MockBlob>,
}

/// In-memory [`Probe`] and [`ObjectSource`].
///
/// Accounts and containers only exist if they were added. Private
/// containers probe as existing-but-private and refuse listing. Every probe
/// is counted and the peak number of concurrent probes is tracked, so
/// tests can assert on pool bounds.
///
/// # Examples
///
/// ```
/// use blobrob_azure::{MockStore, Probe};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let store = MockStore::default()
///     .with_container("acct", "web", true)
///     .with_file("acct", "web", "index.html", "<html></html>");
/// assert!(store.probe_account("acct").await);
/// assert!(store.probe_container("acct", "web").await.public);
/// # }
/// ```
#[derive(Default)]
pub struct MockStore {
    accounts: HashMap<String, HashMap<String, MockContainer>>,
    latency: Option<Duration>,
    probes: AtomicUsize,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl MockStore {
    pub fn with_account(mut self, account: impl Into<String>) -> Self {
        self.accounts.entry(account.into()).or_default();
        self
    }

    /// Adds the container (and its account, if needed).
    pub fn with_container(mut self, account: impl Into<String>, container: impl Into<String>, public: bool) -> Self {
        let containers = self.accounts.entry(account.into()).or_default();
        containers.entry(container.into()).or_default().public = public;
        self
    }

    /// Adds a blob with an explicit listing entry. Panics if the container
    /// hasn't been added.
    pub fn with_blob(mut self, account: &str, container: &str, info: BlobInfo, data: impl Into<Vec<u8>>) -> Self {
        let Some(target) = self.accounts.get_mut(account).and_then(|c| c.get_mut(container)) else {
            panic!("MockStore::with_blob: unknown container {account}/{container}");
        };
        let data = data.into();
        target.blobs.push(MockBlob { info, data, fault: None });
        self
    }

    /// Adds a plain current blob whose listed size matches its content.
    pub fn with_file(self, account: &str, container: &str, name: &str, data: impl Into<Vec<u8>>) -> Self {
        let data = data.into();
        let info = BlobInfo::new(name, data.len() as u64);
        self.with_blob(account, container, info, data)
    }

    /// Opening the named blob fails with a transport error.
    pub fn fail_open(self, account: &str, container: &str, name: &str) -> Self {
        self.with_fault(account, container, name, Fault::Open)
    }

    /// Opening the named blob fails with access denied.
    pub fn deny_open(self, account: &str, container: &str, name: &str) -> Self {
        self.with_fault(account, container, name, Fault::Denied)
    }

    /// Reading the named blob fails once `bytes` bytes have been delivered.
    pub fn fail_read_after(self, account: &str, container: &str, name: &str, bytes: usize) -> Self {
        self.with_fault(account, container, name, Fault::ReadAfter(bytes))
    }

    /// Every probe sleeps this long, so concurrent probes overlap.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Total probes (accounts and containers) answered so far.
    pub fn probe_count(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    /// Highest number of probes that were running at the same time.
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn with_fault(mut self, account: &str, container: &str, name: &str, fault: Fault) -> Self {
        let blob = self
            .accounts
            .get_mut(account)
            .and_then(|c| c.get_mut(container))
            .and_then(|c| c.blobs.iter_mut().find(|b| b.info.name == name));
        let Some(blob) = blob else {
            panic!("MockStore: unknown blob {account}/{container}/{name}");
        };
        blob.fault = Some(fault);
        self
    }

    fn container(&self, account: &str, container: &str) -> Result<&MockContainer> {
        let target = format!("{account}/{container}");
        match self.accounts.get(account).and_then(|c| c.get(container)) {
            Some(found) if found.public => Ok(found),
            Some(_) => exn::bail!(ErrorKind::AccessDenied(target)),
            None => exn::bail!(ErrorKind::NotFound(target)),
        }
    }

    async fn observe<T>(&self, answer: T) -> T {
        self.probes.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        answer
    }
}

#[async_trait]
impl Probe for MockStore {
    async fn probe_account(&self, account: &str) -> bool {
        self.observe(self.accounts.contains_key(account)).await
    }

    async fn probe_container(&self, account: &str, container: &str) -> ContainerProbe {
        let answer = match self.accounts.get(account).and_then(|c| c.get(container)) {
            Some(found) if found.public => ContainerProbe::PUBLIC,
            Some(_) => ContainerProbe::PRIVATE,
            None => ContainerProbe::MISSING,
        };
        self.observe(answer).await
    }
}

#[async_trait]
impl ObjectSource for MockStore {
    async fn list(&self, account: &str, container: &str) -> Result<Vec<BlobInfo>> {
        Ok(self.container(account, container)?.blobs.iter().map(|b| b.info.clone()).collect())
    }

    async fn versions(&self, account: &str, container: &str, name: &str) -> Result<Vec<BlobInfo>> {
        let blobs = &self.container(account, container)?.blobs;
        Ok(blobs.iter().filter(|b| b.info.name == name).map(|b| b.info.clone()).collect())
    }

    async fn open(&self, account: &str, container: &str, name: &str, revision: Option<&Revision>) -> Result<BlobReader> {
        let found = self.container(account, container)?.blobs.iter().find(|b| {
            b.info.name == name
                && match revision {
                    Some(revision) => b.info.revision.as_ref() == Some(revision),
                    None => b.info.is_current(),
                }
        });
        let target = format!("{account}/{container}/{name}");
        let Some(blob) = found else {
            exn::bail!(ErrorKind::NotFound(target));
        };
        let fail_at = match blob.fault {
            Some(Fault::Open) => exn::bail!(ErrorKind::Transport(target)),
            Some(Fault::Denied) => exn::bail!(ErrorKind::AccessDenied(target)),
            Some(Fault::ReadAfter(bytes)) => Some(bytes),
            None => None,
        };
        Ok(BlobReader {
            length: Some(blob.data.len() as u64),
            reader: Box::new(MockReader { data: blob.data.clone(), position: 0, fail_at }),
        })
    }
}

struct MockReader {
    data: Vec<u8>,
    position: usize,
    fail_at: Option<usize>,
}

impl AsyncRead for MockReader {
    fn poll_read(mut self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &mut [u8]) -> Poll<std::io::Result<usize>> {
        if let Some(fail_at) = self.fail_at
            && self.position >= fail_at
        {
            return Poll::Ready(Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "mock connection reset")));
        }
        let limit = self.fail_at.unwrap_or(usize::MAX).min(self.data.len());
        let end = limit.min(self.position + buf.len());
        let n = end - self.position;
        buf[..n].copy_from_slice(&self.data[self.position..end]);
        self.position = end;
        Poll::Ready(Ok(n))
    }
}
