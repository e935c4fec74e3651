//! Bounded-concurrency discovery of accounts and containers.
//!
//! A [`Scanner`] walks a [`CandidateSpace`] with a pool of workers, one per
//! account, and funnels what they find into a single [`DiscoveryStream`].
//! The stream, not the workers, owns the progress counter.

mod space;
mod stream;

pub use self::space::CandidateSpace;
pub use self::stream::{DiscoveryEvent, DiscoveryStream, ScanOptions, Scanner};
