//! Tracing setup for the binary.
//!
//! Everything goes to stderr through an [`EnvFilter`] read from `BLOBROB_LOG`
//! (default `blobrob=info`, or `blobrob=debug` with `--verbose`). With
//! `--debug`, request logs from the Azure client are additionally appended to
//! `debug_<timestamp>.log` as curl commands.

use crate::error::{ErrorKind, Result};
use blobrob_azure::CURL_TARGET;
use exn::ResultExt;
use std::fs::{File, OpenOptions};
use std::path::PathBuf;
use std::sync::{Mutex, Once};
use time::OffsetDateTime;
use time::macros::format_description;
use tracing_subscriber::filter::filter_fn;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

pub const ENV_FILTER: &str = "BLOBROB_LOG";

static INIT: Once = Once::new();

/// Open the debug log, if requested. Done before tracing is installed so a
/// failure can still be reported.
pub fn debug_log(enabled: bool) -> Result<Option<(PathBuf, File)>> {
    if !enabled {
        return Ok(None);
    }
    let path = debug_log_name(OffsetDateTime::now_utc());
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .or_raise(|| ErrorKind::DebugLog(path.clone()))?;
    Ok(Some((path, file)))
}

fn debug_log_name(now: OffsetDateTime) -> PathBuf {
    let format = format_description!("[year]-[month]-[day]_[hour]-[minute]-[second]");
    let stamp = now.format(format).unwrap_or_else(|_| now.unix_timestamp().to_string());
    PathBuf::from(format!("debug_{stamp}.log"))
}

/// Install the global subscriber. Only the first call has any effect.
pub fn init(verbose: bool, debug_log: Option<File>) {
    INIT.call_once(|| {
        let default = if verbose { "blobrob=debug" } else { "blobrob=info" };
        let filter = EnvFilter::try_from_env(ENV_FILTER).unwrap_or_else(|_| EnvFilter::new(default));
        let stderr = fmt::layer().with_writer(std::io::stderr).with_target(verbose).with_filter(filter);
        let curl = debug_log.map(|file| {
            fmt::layer()
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .with_target(false)
                .with_level(false)
                .with_filter(filter_fn(|metadata| metadata.target() == CURL_TARGET))
        });
        tracing_subscriber::registry().with(stderr).with(curl).init();
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn test_debug_log_name() {
        let name = debug_log_name(datetime!(2024-03-01 09:05:07 UTC));
        assert_eq!(name, PathBuf::from("debug_2024-03-01_09-05-07.log"));
    }

    #[test]
    fn test_debug_log_disabled() {
        assert!(debug_log(false).unwrap().is_none());
    }
}
