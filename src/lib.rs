//! # LedgerKV - A Durable, Expiring Key-Value Store
//!
//! LedgerKV keeps its data in memory and records every mutation in a
//! write-ahead log. On restart the log is replayed to rebuild the exact
//! same map.
//!
//! ## Features
//!
//! - **Write-Ahead Log**: One human-readable JSON record per line, append-only
//! - **Flush Policies**: Immediate, periodic (background timer) or manual
//! - **Crash Recovery**: Replay tolerates a torn record at the end of the log
//! - **TTL Support**: Keys can expire; expired keys are evicted on read
//! - **Typed Values**: Any `serde` type, fixed per store
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                              Store                                  │
//! │                                                                     │
//! │  open ──> LogWriter opens file ──> replay() rebuilds map ──> Ready  │
//! │                                                                     │
//! │  set / delete ──> Record ──> LogWriter::append ──> (flush) ──> map   │
//! │  get ──> map (lazy eviction logs a delete)                          │
//! │                                                                     │
//! │  ┌──────────────────┐   ┌──────────────────┐   ┌─────────────────┐  │
//! │  │  wal::record     │   │  wal::writer     │   │  wal::replay    │  │
//! │  │  JSON lines      │   │  buffer + fsync  │   │  torn tail      │  │
//! │  └──────────────────┘   └──────────────────┘   └─────────────────┘  │
//! │                                  ▲                                  │
//! │                     ┌────────────┴────────────┐                     │
//! │                     │    FlushScheduler       │                     │
//! │                     │ (periodic policy only)  │                     │
//! │                     └─────────────────────────┘                     │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use ledgerkv::{FlushPolicy, Store};
//! use chrono::TimeDelta;
//! use serde_json::json;
//!
//! # fn main() -> ledgerkv::Result<()> {
//! let store: Store = Store::open("app.wal", FlushPolicy::Immediate)?;
//!
//! store.set("user:1", json!({"name": "Ariz"}))?;
//! store.set_with_ttl("session:abc", json!("token"), TimeDelta::hours(1))?;
//!
//! assert_eq!(store.get("user:1")?, Some(json!({"name": "Ariz"})));
//!
//! store.delete("user:1")?;
//! store.close()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Overview
//!
//! - [`wal`]: Record format, log writer and recovery replay
//! - [`storage`]: The store, its lifecycle and the flush scheduler
//! - [`config`]: Flush policies and store configuration
//! - [`error`]: Error types
//!
//! ## Known Limitations
//!
//! The log is never compacted, so it grows with every mutation. Only one
//! process may open a given log file at a time.

pub mod config;
pub mod error;
pub mod storage;
pub mod wal;

// Re-export commonly used types for convenience
pub use config::{FlushPolicy, StoreConfig, DEFAULT_FLUSH_INTERVAL};
pub use error::{Result, StoreError};
pub use storage::{Entry, Lifecycle, Store, StoreStats, StoreValue, Ttl};
pub use wal::Record;

/// Version of LedgerKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
