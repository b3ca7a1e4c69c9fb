//! Write-Ahead Log
//!
//! The on-disk half of the store: an append-only file holding one JSON
//! record per line, in the order the mutations were committed.
//!
//! - `record`: the `Record` type and its line encoding
//! - `writer`: buffered appends and policy-driven flushes
//! - `replay`: rebuilding the key map from the file after a restart
//!
//! The log is never compacted or rotated; it grows with every mutation.

pub mod record;
pub mod replay;
pub mod writer;

pub use record::Record;
pub use replay::{replay, Recovered, TornTail};
pub use writer::{AppendMark, LogWriter};
