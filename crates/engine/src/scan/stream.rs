use crate::progress::ProgressCounter;
use crate::scan::CandidateSpace;
use async_stream::stream;
use blobrob_azure::ProbeHandle;
use futures::stream::BoxStream;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, mpsc};
use tokio::task::JoinSet;

pub type DiscoveryStream = BoxStream<'static, DiscoveryEvent>;

/// Everything a scan reports, in the order the consumer should apply it.
///
/// - [`ProgressUpdate`](Self::ProgressUpdate) is emitted once per candidate
///   pair; `completed` never decreases and ends at `total`.
/// - [`ContainerFound`](Self::ContainerFound) for an account always comes
///   after that account's [`AccountFound`](Self::AccountFound). Events from
///   different accounts interleave freely.
/// - [`ScanFinished`](Self::ScanFinished) is emitted exactly once, last.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryEvent {
    AccountFound {
        name: String,
    },
    /// Only containers that could be listed are reported. Private ones are
    /// detected but dropped.
    ContainerFound {
        account: String,
        container: String,
        is_public: bool,
    },
    ProgressUpdate {
        completed: u64,
        total: u64,
    },
    ScanFinished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanOptions {
    /// Accounts probed at the same time.
    pub concurrency: usize,
    /// Worker messages buffered before workers wait on the consumer.
    pub channel_capacity: usize,
}
impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            concurrency: 20,
            channel_capacity: 100,
        }
    }
}

/// What workers tell the aggregator. Progress is counted there, not here.
enum Signal {
    Attempted(u64),
    Account(String),
    Container { account: String, container: String },
}

/// One discovery run over a [`CandidateSpace`].
pub struct Scanner {
    space: CandidateSpace,
    options: ScanOptions,
}

impl Scanner {
    pub fn new(space: CandidateSpace, options: ScanOptions) -> Self {
        Self { space, options }
    }

    /// Spawn the worker pool and return the event stream.
    ///
    /// Must be called from within a tokio runtime. Probing starts right away
    /// and pauses once the channel is full, until the stream is polled.
    /// Dropping the stream stops the scan: workers give up on their next
    /// send and no new ones are spawned.
    pub fn start(self, probe: ProbeHandle) -> DiscoveryStream {
        let concurrency = self.options.concurrency.max(1);
        let (tx, mut rx) = mpsc::channel(self.options.channel_capacity.max(1));
        let mut counter = ProgressCounter::new(self.space.total());
        tracing::info!(
            accounts = self.space.accounts.len(),
            containers = self.space.containers.len(),
            concurrency,
            "Starting scan"
        );
        let pool = tokio::spawn(run_pool(self.space, concurrency, probe, tx));

        Box::pin(stream! {
            while let Some(signal) = rx.recv().await {
                match signal {
                    Signal::Attempted(units) => {
                        for _ in 0..units {
                            let progress = counter.advance(1);
                            yield DiscoveryEvent::ProgressUpdate {
                                completed: progress.completed,
                                total: progress.total,
                            };
                        }
                    },
                    Signal::Account(name) => yield DiscoveryEvent::AccountFound { name },
                    Signal::Container { account, container } => yield DiscoveryEvent::ContainerFound {
                        account,
                        container,
                        is_public: true,
                    },
                }
            }
            // Every sender is gone, so every worker is done; this only
            // collects the pool itself.
            if let Err(e) = pool.await {
                tracing::error!(error = %e, "Scan pool stopped unexpectedly");
            }
            tracing::info!(progress = %counter.current(), "Scan finished");
            yield DiscoveryEvent::ScanFinished;
        })
    }
}

async fn run_pool(space: CandidateSpace, concurrency: usize, probe: ProbeHandle, tx: mpsc::Sender<Signal>) {
    let permits = Arc::new(Semaphore::new(concurrency));
    let mut workers = JoinSet::new();
    for account in space.accounts.iter() {
        let Ok(permit) = Arc::clone(&permits).acquire_owned().await else {
            break;
        };
        if tx.is_closed() {
            tracing::debug!("Discovery stream dropped, not spawning any more workers");
            break;
        }
        workers.spawn(probe_account(
            account.clone(),
            Arc::clone(&space.containers),
            Arc::clone(&probe),
            tx.clone(),
            permit,
        ));
    }
    drop(tx);
    while let Some(result) = workers.join_next().await {
        if let Err(e) = result {
            tracing::error!(error = %e, "Scan worker panicked");
        }
    }
}

/// Probe one account and, if it exists, each of its containers in turn.
///
/// Returns early once the aggregator has gone away.
async fn probe_account(
    account: String,
    containers: Arc<[String]>,
    probe: ProbeHandle,
    tx: mpsc::Sender<Signal>,
    _permit: OwnedSemaphorePermit,
) {
    if !probe.probe_account(&account).await {
        tracing::trace!(account = %account, "Account not found");
        // Infallible: a usize (either 32- or 64-bit) will always fit in a u64.
        let _ = tx.send(Signal::Attempted(u64::try_from(containers.len()).unwrap_or(0))).await;
        return;
    }
    tracing::debug!(account = %account, "Found account");
    if tx.send(Signal::Account(account.clone())).await.is_err() {
        return;
    }
    for container in containers.iter() {
        if tx.send(Signal::Attempted(1)).await.is_err() {
            return;
        }
        let found = probe.probe_container(&account, container).await;
        if !found.exists {
            continue;
        }
        if !found.public {
            tracing::trace!(account = %account, container = %container, "Container exists but is private");
            continue;
        }
        tracing::debug!(account = %account, container = %container, "Found public container");
        let signal = Signal::Container {
            account: account.clone(),
            container: container.clone(),
        };
        if tx.send(signal).await.is_err() {
            return;
        }
    }
}
