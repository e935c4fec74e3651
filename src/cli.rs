use blobrob_config::Config;
use blobrob_engine::TransferItem;
use clap::{ArgGroup, Parser};
use std::path::PathBuf;

const EXAMPLES: &str = "\
Examples:
  # Brute-force scan with the default wordlists
  blobrob -b

  # Custom wordlists
  blobrob -A custom-accounts.txt -C custom-containers.txt -b

  # Target a specific account and container
  blobrob -a mywebsite -c '$web'

  # Authenticated requests, higher concurrency
  blobrob -a myaccount -t \"eyJ0eXAi...\" -n 50

  # Download the latest revision of everything public that turns up
  blobrob -b --download -o loot/

  # Download one blob
  blobrob -a mywebsite -c '$web' --blob index.html

  # Log every request as a curl command to debug_<timestamp>.log
  blobrob -d -b";

/// Azure Storage discovery & download tool.
#[derive(Debug, Parser)]
#[command(name = "blobrob", version, about, after_help = EXAMPLES, arg_required_else_help = true)]
#[command(group(ArgGroup::new("target").required(true).multiple(true).args(["brute_force", "account", "container"])))]
pub struct Args {
    /// Use the configured wordlists for both accounts and containers
    #[arg(short = 'b', long = "brute-force-defaults")]
    pub brute_force: bool,

    /// File containing storage account names, one per line
    #[arg(short = 'A', long = "accounts", value_name = "FILE")]
    pub accounts: Option<PathBuf>,

    /// File containing container names, one per line
    #[arg(short = 'C', long = "containers", value_name = "FILE")]
    pub containers: Option<PathBuf>,

    /// Single storage account name (skips the accounts wordlist)
    #[arg(short = 'a', long)]
    pub account: Option<String>,

    /// Single container name (skips the containers wordlist)
    #[arg(short = 'c', long)]
    pub container: Option<String>,

    /// Accounts probed in parallel
    #[arg(short = 'n', long, value_parser = clap::value_parser!(u16).range(1..))]
    pub concurrency: Option<u16>,

    /// Bearer token sent with every request
    #[arg(short = 't', long)]
    pub token: Option<String>,

    /// Custom User-Agent header
    #[arg(short = 'u', long)]
    pub user_agent: Option<String>,

    /// Log every request as a curl command to debug_<timestamp>.log
    #[arg(short = 'd', long)]
    pub debug: bool,

    /// Configuration file (TOML, YAML or JSON)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Verbose logging on stderr
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// List the blobs of every public container found
    #[arg(long, conflicts_with = "blob")]
    pub list: bool,

    /// Download the latest revision of every blob in every public container found
    #[arg(long, conflicts_with = "blob")]
    pub download: bool,

    /// Download a single blob from the given account and container
    #[arg(long, value_name = "NAME", requires_all = ["account", "container"])]
    pub blob: Option<String>,

    /// Replace files that already exist in the output directory
    #[arg(long)]
    pub overwrite: bool,

    /// Download directory
    #[arg(short = 'o', long, value_name = "DIR")]
    pub output: Option<PathBuf>,
}

impl Args {
    /// The `--blob` target, when one was given.
    pub fn single_blob(&self) -> Option<TransferItem> {
        match (&self.account, &self.container, &self.blob) {
            (Some(account), Some(container), Some(name)) => Some(TransferItem::new(account, container, name)),
            _ => None,
        }
    }

    /// Command line flags win over every configuration layer.
    pub fn apply(&self, config: &mut Config) {
        if let Some(path) = &self.accounts {
            config.wordlists.accounts = path.clone();
        }
        if let Some(path) = &self.containers {
            config.wordlists.containers = path.clone();
        }
        if let Some(concurrency) = self.concurrency {
            config.scan.concurrency = usize::from(concurrency);
        }
        if let Some(token) = &self.token {
            config.http.token = Some(token.clone());
        }
        if let Some(user_agent) = &self.user_agent {
            config.http.user_agent = Some(user_agent.clone());
        }
        if let Some(output) = &self.output {
            config.download.directory = output.clone();
        }
        if self.overwrite {
            config.download.overwrite = true;
        }
    }
}
