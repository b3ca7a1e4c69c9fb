//! Storage Module
//!
//! This module provides the in-memory half of the store and ties it to the
//! write-ahead log.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Store                                │
//! │   ┌───────────────────────────┐   ┌─────────────────────┐   │
//! │   │ HashMap<String, Entry<V>> │◄──│  LogWriter (buffer) │   │
//! │   └───────────────────────────┘   └──────────┬──────────┘   │
//! │              one RwLock around both          │ flush        │
//! └──────────────────────────────────────────────┼──────────────┘
//!                            ▲                   ▼
//!              ┌─────────────┴─────────────┐   log file
//!              │      FlushScheduler       │
//!              │ (periodic policy, own     │
//!              │  thread + Tokio timer)    │
//!              └───────────────────────────┘
//! ```
//!
//! ## Features
//!
//! - **Durable**: Every mutation is a log record; restart replays the log
//! - **Flush Policies**: Immediate, periodic or manual
//! - **TTL Support**: Keys can have an absolute expiry
//! - **Lazy Expiry**: Expired keys are evicted (and the eviction logged) on access
//! - **Lifecycle**: Closed stores reject every operation
//!
//! ## Example
//!
//! ```no_run
//! use ledgerkv::storage::Store;
//! use ledgerkv::FlushPolicy;
//! use chrono::TimeDelta;
//!
//! # fn main() -> ledgerkv::Result<()> {
//! let store: Store<String> = Store::open("names.wal", FlushPolicy::periodic())?;
//!
//! store.set("name", "Ariz".to_string())?;
//! assert_eq!(store.get("name")?, Some("Ariz".to_string()));
//!
//! store.set_with_ttl("session", "token123".to_string(), TimeDelta::hours(1))?;
//! store.close()?;
//! # Ok(())
//! # }
//! ```

pub mod engine;
pub mod entry;
pub mod flusher;
pub mod lifecycle;

// Re-export commonly used types
pub use engine::{Store, StoreStats, StoreValue, Ttl};
pub use entry::Entry;
pub use flusher::{FlushScheduler, Flushable};
pub use lifecycle::Lifecycle;
