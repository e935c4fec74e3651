//! Where downloaded blobs end up.
//!
//! A [`StorageBackend`] is the write side of a transfer: the engine asks it
//! whether a target already exists and for a streaming writer to copy remote
//! bytes into. All paths are relative to the backend root and validated with
//! [`validate_path`] before they touch anything.

pub mod backend;
pub mod error;
mod path;

pub use crate::backend::{BoxAsyncWrite, StorageBackend};
pub use crate::path::validate as validate_path;
use std::sync::Arc;

pub type BackendHandle = Arc<dyn StorageBackend + Send + Sync>;
