//! Binary error types.
//!
//! The library crates report *what* failed; these say which stage of a run
//! it failed in, so the printed error tree reads top-down.

use derive_more::{Display, Error};
use std::path::PathBuf;

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("could not load configuration")]
    Config,
    #[display("could not read wordlist {}", _0.display())]
    Wordlist(#[error(not(source))] PathBuf),
    #[display("wordlist {} has no names in it", _0.display())]
    EmptyWordlist(#[error(not(source))] PathBuf),
    #[display("could not create debug log {}", _0.display())]
    DebugLog(#[error(not(source))] PathBuf),
    #[display("could not set up the Azure client")]
    Client,
    #[display("could not set up the download directory {}", _0.display())]
    Output(#[error(not(source))] PathBuf),
    #[display("invalid download path template")]
    Template,
    #[display("could not list {_0}")]
    Listing(#[error(not(source))] String),
    #[display("could not download {_0}")]
    Download(#[error(not(source))] String),
}
