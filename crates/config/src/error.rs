use derive_more::{Display, Error};
use std::path::PathBuf;

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Explicitly requested configuration file doesn't exist
    #[display("configuration file not found: {}", _0.display())]
    NotFound(#[error(not(source))] PathBuf),
    /// Extension isn't one of toml, yaml, yml or json
    #[display("unsupported configuration format: {}", _0.display())]
    UnsupportedFormat(#[error(not(source))] PathBuf),
    /// A provider failed to parse, or the merged result didn't deserialize
    #[display("failed to load configuration")]
    Load,
    /// Parsed fine, but a value is unusable
    #[display("invalid configuration value for `{field}`: {reason}")]
    Invalid {
        #[error(not(source))]
        field: &'static str,
        #[error(not(source))]
        reason: &'static str,
    },
}

impl ErrorKind {
    /// Configuration errors never go away on their own.
    pub fn is_retryable(&self) -> bool {
        false
    }
}
