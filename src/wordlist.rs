//! Candidate name lists.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use std::path::Path;

/// One name per line. Surrounding whitespace is trimmed and blank lines are
/// skipped; an empty list is an error rather than a scan of nothing.
pub async fn load(path: &Path) -> Result<Vec<String>> {
    let contents = tokio::fs::read_to_string(path).await.or_raise(|| ErrorKind::Wordlist(path.to_path_buf()))?;
    let names = parse(&contents);
    if names.is_empty() {
        exn::bail!(ErrorKind::EmptyWordlist(path.to_path_buf()));
    }
    tracing::debug!(path = %path.display(), count = names.len(), "Loaded wordlist");
    Ok(names)
}

fn parse(contents: &str) -> Vec<String> {
    contents.lines().map(str::trim).filter(|line| !line.is_empty()).map(String::from).collect()
}
