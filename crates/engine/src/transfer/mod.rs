//! Step-wise single blob downloads.
//!
//! [`TransferSession::open`] sets up both ends, then the caller calls
//! [`TransferSession::step`] until [`Step::is_done`]. Each call moves at
//! most one chunk.

pub mod error;
mod item;
mod session;

pub use self::item::TransferItem;
pub use self::session::{Status, Step, TransferSession};
