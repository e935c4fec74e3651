//! The line-oriented consumer: scan, then list or download what turned up.

use crate::cli::Args;
use crate::error::{ErrorKind, Result};
use crate::wordlist;
use blobrob_azure::{BlobClient, BlobInfo, ClientOptions, ObjectSource, ProbeHandle, SourceHandle};
use blobrob_config::Config;
use blobrob_engine::{
    BatchStep, BatchSummary, BatchTransfer, CandidateSpace, Context, DiscoveryEvent, ItemOutcome, PathGenerator,
    ScanOptions, Scanner, Status, TransferItem, TransferProgress, TransferSession, latest_revisions,
};
use blobrob_storage::backend::LocalBackend;
use exn::ResultExt;
use futures::StreamExt;
use std::io::{IsTerminal, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub async fn run(args: Args) -> Result<()> {
    let mut config = Config::load(args.config.as_deref()).or_raise(|| ErrorKind::Config)?;
    args.apply(&mut config);
    config.validate().or_raise(|| ErrorKind::Config)?;

    let client = Arc::new(client(&config)?);
    let cancel = CancellationToken::new();
    watch_ctrl_c(cancel.clone());

    if let Some(item) = args.single_blob() {
        let item = resolve(client.as_ref(), item).await;
        let ctx = context(&config, client)?;
        return download_one(&ctx, &config.download.directory, item, cancel).await;
    }

    let space = candidates(&args, &config).await?;
    let found = scan(space, &config, client.clone(), &cancel).await;
    if cancel.is_cancelled() {
        return Ok(());
    }
    if found.is_empty() {
        println!("No public containers found.");
        return Ok(());
    }

    if args.list {
        list_found(client.as_ref(), &found, &cancel).await;
    }
    if args.download {
        let ctx = Arc::new(context(&config, client)?);
        for (account, container) in &found {
            if cancel.is_cancelled() {
                break;
            }
            if let Err(e) = download_container(&ctx, &config.download.directory, account, container, &cancel).await {
                tracing::warn!(error = ?e, "Download failed");
            }
        }
    }
    Ok(())
}

fn client(config: &Config) -> Result<BlobClient> {
    let defaults = ClientOptions::default();
    let http = &config.http;
    let options = ClientOptions {
        endpoint: http.endpoint.clone().unwrap_or(defaults.endpoint),
        user_agent: http.user_agent.clone().unwrap_or(defaults.user_agent),
        token: http.token.clone(),
        api_version: http.api_version.clone().unwrap_or(defaults.api_version),
        probe_timeout: Duration::from_secs(http.probe_timeout_secs),
    };
    BlobClient::new(options).or_raise(|| ErrorKind::Client)
}

fn context(config: &Config, source: SourceHandle) -> Result<Context> {
    let directory = &config.download.directory;
    let root = std::path::absolute(directory).or_raise(|| ErrorKind::Output(directory.clone()))?;
    let sink = LocalBackend::new("downloads", &root).or_raise(|| ErrorKind::Output(root.clone()))?;
    let paths: PathGenerator = config.download.template.parse::<PathGenerator>().or_raise(|| ErrorKind::Template)?;
    Ok(Context::new(source, Arc::new(sink), paths)
        .with_chunk_size(config.download.chunk_size)
        .with_overwrite(config.download.overwrite))
}

/// A single `-a`/`-c` replaces the matching wordlist.
async fn candidates(args: &Args, config: &Config) -> Result<CandidateSpace> {
    let accounts = match &args.account {
        Some(account) => vec![account.clone()],
        None => wordlist::load(&config.wordlists.accounts).await?,
    };
    let containers = match &args.container {
        Some(container) => vec![container.clone()],
        None => wordlist::load(&config.wordlists.containers).await?,
    };
    Ok(CandidateSpace::new(accounts, containers))
}

/// First Ctrl-C cancels whatever is running, the second one exits.
fn watch_ctrl_c(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        eprintln!("\nCancelling, press Ctrl-C again to quit immediately");
        cancel.cancel();
        if tokio::signal::ctrl_c().await.is_ok() {
            std::process::exit(130);
        }
    });
}

async fn scan(
    space: CandidateSpace,
    config: &Config,
    probe: ProbeHandle,
    cancel: &CancellationToken,
) -> Vec<(String, String)> {
    let options = ScanOptions {
        concurrency: config.scan.concurrency,
        channel_capacity: config.scan.channel_capacity,
    };
    println!("Scanning {} account/container combinations...", space.total());
    let mut events = Scanner::new(space, options).start(probe);
    let mut status = StatusLine::new();
    let mut found = Vec::new();
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => {
                status.clear();
                println!("Scan interrupted.");
                break;
            },
            event = events.next() => event,
        };
        match event {
            Some(DiscoveryEvent::ProgressUpdate { completed, total }) => {
                status.show(&format!("Scanned {completed}/{total}"));
            },
            Some(DiscoveryEvent::AccountFound { name }) => status.println(&format!("[+] Account: {name}")),
            Some(DiscoveryEvent::ContainerFound {
                account,
                container,
                is_public,
            }) => {
                let visibility = if is_public { "public" } else { "private" };
                status.println(&format!("[+] Container: {account}/{container} ({visibility})"));
                if is_public {
                    found.push((account, container));
                }
            },
            Some(DiscoveryEvent::ScanFinished) | None => {
                status.clear();
                println!("Scan finished, {} public container(s) found.", found.len());
                break;
            },
        }
    }
    found
}

/// Lists every found container until cancelled, returning how many were listed.
async fn list_found(source: &dyn ObjectSource, found: &[(String, String)], cancel: &CancellationToken) -> usize {
    let mut listed = 0;
    for (account, container) in found {
        if cancel.is_cancelled() {
            break;
        }
        match list(source, account, container).await {
            Ok(()) => listed += 1,
            Err(e) => tracing::warn!(error = ?e, "Listing failed"),
        }
    }
    listed
}

async fn list(source: &dyn ObjectSource, account: &str, container: &str) -> Result<()> {
    let target = format!("{account}/{container}");
    let blobs = source.list(account, container).await.or_raise(|| ErrorKind::Listing(target.clone()))?;
    println!("\n{target} ({} entries)", blobs.len());
    for blob in &blobs {
        println!("  {}", describe(blob));
    }
    Ok(())
}

fn describe(blob: &BlobInfo) -> String {
    let modified = blob.last_modified.map(|ts| ts.date().to_string()).unwrap_or_else(|| "-".to_string());
    let mut line = format!("{:>12}  {modified:<10}  {}", blob.size, blob.name);
    if let Some(revision) = &blob.revision
        && !blob.is_current()
    {
        let kind = if blob.is_snapshot() { "snapshot" } else { "version" };
        line.push_str(&format!("  [{kind} {revision}]"));
    }
    if blob.deleted {
        line.push_str("  [deleted]");
    }
    line
}

async fn download_container(
    ctx: &Arc<Context>,
    root: &Path,
    account: &str,
    container: &str,
    cancel: &CancellationToken,
) -> Result<BatchSummary> {
    let target = format!("{account}/{container}");
    let blobs = ctx.source.list(account, container).await.or_raise(|| ErrorKind::Listing(target.clone()))?;
    let items = latest_revisions(account, container, &blobs);
    println!("\nDownloading {} file(s) from {target}", items.len());

    let mut batch = BatchTransfer::start(Arc::clone(ctx), items).with_cancel(cancel.clone());
    let mut status = StatusLine::new();
    loop {
        match batch.step().await {
            BatchStep::Started {
                index,
                total,
                item,
                target,
            } => status.println(&format!("[{index}/{total}] {item} -> {}", root.join(target).display())),
            BatchStep::Progress { progress, .. } => status.show(&format_progress(progress)),
            BatchStep::ItemFinished { item, outcome, .. } => match outcome {
                ItemOutcome::Succeeded => status.clear(),
                ItemOutcome::Failed(reason) => status.println(&format!("  Failed {item}: {reason}")),
                ItemOutcome::Skipped => status.println(&format!("  Skipped {item}")),
            },
            BatchStep::Complete(summary) => {
                status.clear();
                println!("{summary}");
                return Ok(summary);
            },
        }
    }
}

/// Pin a `--blob` target to its newest revision, so a blob that was deleted
/// but kept its versions still downloads. Containers that refuse listing get
/// the name as given.
async fn resolve(source: &dyn ObjectSource, item: TransferItem) -> TransferItem {
    match source.versions(&item.account, &item.container, &item.name).await {
        Ok(revisions) => latest_revisions(&item.account, &item.container, &revisions).into_iter().next().unwrap_or(item),
        Err(e) => {
            tracing::debug!(item = %item, error = ?e, "Could not look up revisions, downloading as named");
            item
        },
    }
}

async fn download_one(ctx: &Context, root: &Path, item: TransferItem, cancel: CancellationToken) -> Result<()> {
    let id = item.id();
    let mut session = TransferSession::open(ctx, item, cancel).await.or_raise(|| ErrorKind::Download(id.clone()))?;
    let saved = root.join(session.target());
    let mut status = StatusLine::new();
    loop {
        let step = session.step().await.or_raise(|| ErrorKind::Download(id.clone()))?;
        match step.status {
            Status::Transferring => status.show(&format_progress(step.progress)),
            Status::Completed => {
                status.clear();
                println!("File saved to: {}", saved.display());
                return Ok(());
            },
            Status::Cancelled => {
                status.clear();
                println!("Download cancelled, partial file left at {}", saved.display());
                return Ok(());
            },
            Status::Failed(e) => {
                status.clear();
                return Err(e.raise(ErrorKind::Download(id)));
            },
        }
    }
}

fn format_progress(progress: TransferProgress) -> String {
    match (progress.expected, progress.percent()) {
        (Some(expected), Some(percent)) => format!("  {}/{expected} bytes ({percent:.0}%)", progress.transferred),
        _ => format!("  {} bytes", progress.transferred),
    }
}

/// A single redrawn line on stderr, only when stderr is a terminal.
struct StatusLine {
    interactive: bool,
    dirty: bool,
}

impl StatusLine {
    fn new() -> Self {
        Self {
            interactive: std::io::stderr().is_terminal(),
            dirty: false,
        }
    }

    fn show(&mut self, text: &str) {
        if !self.interactive {
            return;
        }
        let mut stderr = std::io::stderr().lock();
        let _ = write!(stderr, "\r\x1b[2K{text}");
        let _ = stderr.flush();
        self.dirty = true;
    }

    fn clear(&mut self) {
        if self.dirty {
            eprint!("\r\x1b[2K");
            self.dirty = false;
        }
    }

    fn println(&mut self, text: &str) {
        self.clear();
        println!("{text}");
    }
}
