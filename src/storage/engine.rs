//! Durable Key-Value Store with Expiry Support
//!
//! This module implements the store façade: an in-memory map of
//! `key -> (value, optional expiry)` that mirrors an append-only log.
//!
//! ## Design Decisions
//!
//! 1. **One Lock**: A single `RwLock` guards the map *and* the log writer,
//!    because every mutation must update both together.
//! 2. **Log First**: A mutation is encoded (and under the immediate policy,
//!    flushed) before the map changes. If that fails, nothing changes.
//! 3. **Lazy Expiry**: Expired keys are evicted when read. The eviction is
//!    itself logged as a `delete`, so replaying the log always rebuilds
//!    exactly the map that was in memory.
//! 4. **Explicit Handle**: Each `Store` owns its file; any number of
//!    independent stores can live in one process.
//!
//! ## Concurrency Model
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                         Store                            │
//! │   ┌────────────────── RwLock ──────────────────────┐     │
//! │   │  lifecycle   HashMap<String, Entry>  LogWriter │     │
//! │   └────────────────────────────────────────────────┘     │
//! │        ▲ read: get (fast path), exists, keys              │
//! │        ▲ write: set, delete, flush, close, expired get    │
//! └────────┼─────────────────────────────────────────────────┘
//!          │ weak
//!  ┌───────┴────────┐
//!  │ FlushScheduler │ (periodic policy only)
//!  └────────────────┘
//! ```
//!
//! A `get` that finds an expired entry re-acquires the lock exclusively and
//! re-checks before evicting, so `get` is not read-only at this layer.

use crate::config::{FlushPolicy, StoreConfig};
use crate::error::{Result, StoreError};
use crate::storage::entry::{expiry_from_ttl, normalize_expiry, Entry};
use crate::storage::flusher::{FlushScheduler, Flushable};
use crate::storage::lifecycle::Lifecycle;
use crate::wal::record::Record;
use crate::wal::replay::{apply, replay, Recovered};
use crate::wal::writer::LogWriter;
use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Values a [`Store`] can hold.
///
/// Blanket-implemented for every type that can round-trip through serde
/// and be shared across threads.
pub trait StoreValue: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

impl<T> StoreValue for T where T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

/// Remaining lifetime of a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ttl {
    /// Key does not exist or has expired.
    Missing,
    /// Key exists and never expires.
    Persistent,
    /// Key expires after the given duration.
    ExpiresIn(TimeDelta),
}

/// Store statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStats {
    /// Number of entries in memory (including expired ones not yet evicted)
    pub keys: u64,
    /// Total GET operations
    pub get_ops: u64,
    /// Total successful SET operations
    pub set_ops: u64,
    /// Total successful DELETE operations
    pub del_ops: u64,
    /// Total expired keys evicted
    pub expired: u64,
    /// Records applied while recovering
    pub records_replayed: u64,
    /// Records written to the log since open and confirmed by a flush
    pub records_flushed: u64,
    /// Records buffered but not yet flushed
    pub records_pending: u64,
    /// Whether a torn record was dropped from the end of the log on open
    pub torn_tail_discarded: bool,
}

/// Everything behind the lock.
struct Shared<V> {
    lifecycle: Lifecycle,
    entries: HashMap<String, Entry<V>>,
    /// `None` once the store is closed
    log: Option<LogWriter>,
}

impl<V: Serialize> Shared<V> {
    fn ensure_ready(&self) -> Result<()> {
        if self.lifecycle.is_ready() {
            Ok(())
        } else {
            Err(StoreError::Closed)
        }
    }

    fn log_mut(&mut self) -> Result<&mut LogWriter> {
        self.log.as_mut().ok_or(StoreError::Closed)
    }

    /// Appends `record` and, under the immediate policy, flushes it.
    ///
    /// On error the record is not left in the buffer.
    fn log_record(&mut self, record: &Record<V>, policy: FlushPolicy) -> Result<()> {
        let log = self.log_mut()?;
        let mark = log.append(record)?;

        if policy == FlushPolicy::Immediate {
            if let Err(err) = log.flush() {
                log.rollback(mark);
                return Err(err);
            }
        }
        Ok(())
    }

    /// Logs and applies a record as one unit.
    fn commit(&mut self, record: Record<V>, policy: FlushPolicy) -> Result<()> {
        self.log_record(&record, policy)?;
        apply(&mut self.entries, record);
        Ok(())
    }
}

fn advance(current: &mut Lifecycle, next: Lifecycle) {
    debug_assert!(
        current.can_transition_to(next),
        "invalid lifecycle transition {current} -> {next}"
    );
    debug!(from = %current, to = %next, "Store lifecycle transition");
    *current = next;
}

#[derive(Debug, Default)]
struct Counters {
    get_ops: AtomicU64,
    set_ops: AtomicU64,
    del_ops: AtomicU64,
    expired: AtomicU64,
}

struct StoreInner<V> {
    state: RwLock<Shared<V>>,
    scheduler: Mutex<Option<FlushScheduler>>,
    config: StoreConfig,
    counters: Counters,
    records_replayed: u64,
    torn_tail_discarded: bool,
}

impl<V: StoreValue> Flushable for StoreInner<V> {
    fn scheduled_flush(&self) -> Result<()> {
        let mut state = self.state.write();

        // Closing performs its own final flush.
        if !state.lifecycle.is_ready() {
            return Ok(());
        }

        match state.log.as_mut() {
            Some(log) if log.pending_bytes() > 0 => log.flush(),
            _ => Ok(()),
        }
    }
}

impl<V> Drop for StoreInner<V> {
    fn drop(&mut self) {
        let path = self.config.path.display().to_string();
        let state = self.state.get_mut();
        if let Some(log) = state.log.as_mut() {
            if let Err(err) = log.flush() {
                warn!(path = %path, error = %err, "Failed to flush log while dropping unclosed store");
            }
        }
    }
}

/// A durable, expiring key-value store backed by a write-ahead log.
///
/// `Store` is a cheap handle: clones share the same map and log file.
///
/// # Example
///
/// ```no_run
/// use ledgerkv::{FlushPolicy, Store};
/// use chrono::TimeDelta;
/// use serde_json::json;
///
/// # fn main() -> ledgerkv::Result<()> {
/// let store: Store = Store::open("sessions.wal", FlushPolicy::Immediate)?;
///
/// store.set("name", json!("Ariz"))?;
/// assert_eq!(store.get("name")?, Some(json!("Ariz")));
///
/// store.set_with_ttl("session", json!({"user": 7}), TimeDelta::minutes(30))?;
/// store.delete("name")?;
///
/// store.close()?;
/// # Ok(())
/// # }
/// ```
pub struct Store<V = serde_json::Value> {
    inner: Arc<StoreInner<V>>,
}

impl<V> Clone for Store<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V> std::fmt::Debug for Store<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("path", &self.inner.config.path)
            .field("flush_policy", &self.inner.config.flush_policy)
            .field("lifecycle", &self.inner.state.read().lifecycle)
            .finish()
    }
}

impl<V: StoreValue> Store<V> {
    /// Opens (or creates) the log at `path` and replays it.
    pub fn open(path: impl AsRef<Path>, policy: FlushPolicy) -> Result<Self> {
        Self::open_with_config(StoreConfig::new(path).with_flush_policy(policy))
    }

    /// Opens a store with full configuration.
    ///
    /// Fails with [`StoreError::Io`] if the file cannot be opened and with
    /// [`StoreError::Decode`] if a record before the end of the log is
    /// malformed. A torn final record is dropped from the file.
    pub fn open_with_config(config: StoreConfig) -> Result<Self> {
        let mut lifecycle = Lifecycle::Uninitialized;
        let mut log = LogWriter::open(&config.path, config.sync_on_flush)?;

        advance(&mut lifecycle, Lifecycle::Recovering);
        let reader = BufReader::new(File::open(&config.path)?);
        let recovered: Recovered<V> = replay(reader)?;

        if let Some(tail) = &recovered.torn_tail {
            warn!(
                path = %config.path.display(),
                line = tail.line,
                offset = tail.offset,
                bytes = tail.len,
                "Discarding partial record at end of log"
            );
            log.truncate_to(recovered.valid_len)?;
        }

        advance(&mut lifecycle, Lifecycle::Ready);

        info!(
            path = %config.path.display(),
            records = recovered.records,
            keys = recovered.entries.len(),
            policy = %config.flush_policy,
            "Store opened"
        );

        let inner = Arc::new(StoreInner {
            state: RwLock::new(Shared {
                lifecycle,
                entries: recovered.entries,
                log: Some(log),
            }),
            scheduler: Mutex::new(None),
            config,
            counters: Counters::default(),
            records_replayed: recovered.records,
            torn_tail_discarded: recovered.torn_tail.is_some(),
        });
        Self::start_scheduler(&inner)?;

        Ok(Self { inner })
    }

    fn start_scheduler(inner: &Arc<StoreInner<V>>) -> Result<()> {
        if let Some(interval) = inner.config.flush_policy.interval() {
            let scheduler = FlushScheduler::start(Arc::downgrade(inner), interval)?;
            *inner.scheduler.lock() = Some(scheduler);
        }
        Ok(())
    }

    fn policy(&self) -> FlushPolicy {
        self.inner.config.flush_policy
    }

    /// Sets a key that never expires, overwriting any previous value.
    pub fn set(&self, key: impl Into<String>, value: V) -> Result<()> {
        self.set_entry(key.into(), value, None)
    }

    /// Sets a key that expires `ttl` from now.
    ///
    /// A zero `ttl` means the key never expires. A negative `ttl` stores an
    /// entry that is already expired.
    pub fn set_with_ttl(&self, key: impl Into<String>, value: V, ttl: TimeDelta) -> Result<()> {
        let expires_at = expiry_from_ttl(Utc::now(), ttl);
        self.set_entry(key.into(), value, expires_at)
    }

    /// Sets a key with an absolute expiry (`None` = never expires).
    ///
    /// A zero-time instant (`0001-01-01T00:00:00Z` or the Unix epoch) is
    /// read as "never expires", the same way the log reads it back.
    pub fn set_until(
        &self,
        key: impl Into<String>,
        value: V,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        self.set_entry(key.into(), value, expires_at)
    }

    fn set_entry(&self, key: String, value: V, expires_at: Option<DateTime<Utc>>) -> Result<()> {
        let mut state = self.inner.state.write();
        state.ensure_ready()?;
        let expires_at = normalize_expiry(expires_at);
        state.commit(Record::set(key, value, expires_at), self.policy())?;

        self.inner.counters.set_ops.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Gets the value for a key.
    ///
    /// Returns `None` if the key doesn't exist or has expired. An expired
    /// entry is evicted, and the eviction is logged as a delete.
    pub fn get(&self, key: &str) -> Result<Option<V>> {
        // First, try a read lock (fast path for existing, non-expired keys)
        {
            let state = self.inner.state.read();
            state.ensure_ready()?;
            self.inner.counters.get_ops.fetch_add(1, Ordering::Relaxed);
            match state.entries.get(key) {
                None => return Ok(None),
                Some(entry) if !entry.is_expired() => return Ok(Some(entry.value.clone())),
                Some(_) => {}
            }
        }

        // Key exists but is expired - need write lock to remove it
        let mut state = self.inner.state.write();
        state.ensure_ready()?;
        match state.entries.get(key) {
            None => Ok(None),
            // Race: another thread may have updated the key
            Some(entry) if !entry.is_expired() => Ok(Some(entry.value.clone())),
            Some(_) => {
                self.evict_expired(&mut state, key);
                Ok(None)
            }
        }
    }

    /// Logs a delete for an expired key and drops it from the map. If the
    /// delete cannot be logged the entry stays, keeping map and log in step.
    fn evict_expired(&self, state: &mut Shared<V>, key: &str) {
        match state.commit(Record::delete(key), self.policy()) {
            Ok(()) => {
                self.inner.counters.expired.fetch_add(1, Ordering::Relaxed);
            }
            Err(err) => {
                warn!(key, error = %err, "Failed to log eviction of expired key");
            }
        }
    }

    /// Deletes a key. Deleting a key that does not exist is not an error.
    pub fn delete(&self, key: &str) -> Result<()> {
        let mut state = self.inner.state.write();
        state.ensure_ready()?;
        state.commit(Record::delete(key), self.policy())?;

        self.inner.counters.del_ops.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Checks if a key exists and is not expired. Never evicts.
    pub fn exists(&self, key: &str) -> Result<bool> {
        let state = self.inner.state.read();
        state.ensure_ready()?;
        Ok(state.entries.get(key).is_some_and(|e| !e.is_expired()))
    }

    /// Gets the remaining lifetime of a key.
    pub fn ttl(&self, key: &str) -> Result<Ttl> {
        let state = self.inner.state.read();
        state.ensure_ready()?;

        let now = Utc::now();
        let ttl = match state.entries.get(key) {
            Some(entry) if !entry.is_expired_at(now) => match entry.ttl_at(now) {
                Some(remaining) => Ttl::ExpiresIn(remaining),
                None => Ttl::Persistent,
            },
            _ => Ttl::Missing,
        };
        Ok(ttl)
    }

    /// Returns all live keys, sorted.
    pub fn keys(&self) -> Result<Vec<String>> {
        Ok(self
            .live_entries()?
            .into_iter()
            .map(|(key, _)| key)
            .collect())
    }

    /// Returns all live entries, sorted by key.
    pub fn live_entries(&self) -> Result<Vec<(String, Entry<V>)>> {
        let state = self.inner.state.read();
        state.ensure_ready()?;

        let now = Utc::now();
        let mut live: Vec<_> = state
            .entries
            .iter()
            .filter(|(_, entry)| !entry.is_expired_at(now))
            .map(|(key, entry)| (key.clone(), entry.clone()))
            .collect();
        live.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(live)
    }

    /// Returns the number of live keys.
    pub fn len(&self) -> Result<usize> {
        let state = self.inner.state.read();
        state.ensure_ready()?;

        let now = Utc::now();
        Ok(state
            .entries
            .values()
            .filter(|entry| !entry.is_expired_at(now))
            .count())
    }

    /// Returns true if there are no live keys.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Evicts every expired key, logging a delete for each.
    ///
    /// # Returns
    ///
    /// Returns the number of keys that were evicted.
    pub fn purge_expired(&self) -> Result<usize> {
        let mut state = self.inner.state.write();
        state.ensure_ready()?;

        let now = Utc::now();
        let expired: Vec<String> = state
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired_at(now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            state.commit(Record::delete(key.as_str()), self.policy())?;
            self.inner.counters.expired.fetch_add(1, Ordering::Relaxed);
        }

        if !expired.is_empty() {
            debug!(
                expired = expired.len(),
                keys_remaining = state.entries.len(),
                "Expired keys purged"
            );
        }
        Ok(expired.len())
    }

    /// Forces buffered records to stable storage.
    pub fn flush(&self) -> Result<()> {
        let mut state = self.inner.state.write();
        state.ensure_ready()?;
        state.log_mut()?.flush()
    }

    /// Flushes pending writes, stops the scheduler and releases the file.
    ///
    /// Every later call, including a second `close`, returns
    /// [`StoreError::Closed`]. If the final flush fails the store stays
    /// open and the error is returned so the close can be retried.
    pub fn close(&self) -> Result<()> {
        {
            // Taking the write lock waits out in-flight operations.
            let mut state = self.inner.state.write();
            state.ensure_ready()?;
            advance(&mut state.lifecycle, Lifecycle::Closing);
        }

        // Outside the lock: a tick blocked on it must be able to finish
        // before the scheduler thread can be joined.
        let scheduler = self.inner.scheduler.lock().take();
        if let Some(mut scheduler) = scheduler {
            scheduler.stop();
        }

        let mut state = self.inner.state.write();
        let flushed = match state.log.as_mut() {
            Some(log) => log.flush(),
            None => Ok(()),
        };

        if let Err(err) = flushed {
            advance(&mut state.lifecycle, Lifecycle::Ready);
            drop(state);
            if let Err(restart_err) = Self::start_scheduler(&self.inner) {
                warn!(error = %restart_err, "Failed to restart flush scheduler after failed close");
            }
            return Err(err);
        }

        let log = state.log.take();
        drop(log);
        let keys = state.entries.len();
        state.entries.clear();
        advance(&mut state.lifecycle, Lifecycle::Closed);

        info!(path = %self.inner.config.path.display(), keys, "Store closed");
        Ok(())
    }

    /// Returns the current lifecycle state.
    pub fn lifecycle(&self) -> Lifecycle {
        self.inner.state.read().lifecycle
    }

    pub fn path(&self) -> &Path {
        &self.inner.config.path
    }

    pub fn flush_policy(&self) -> FlushPolicy {
        self.policy()
    }

    /// Returns store statistics.
    pub fn stats(&self) -> StoreStats {
        let state = self.inner.state.read();
        let counters = &self.inner.counters;
        let (records_flushed, records_pending) = state
            .log
            .as_ref()
            .map(|log| (log.committed_records(), log.pending_records()))
            .unwrap_or_default();

        StoreStats {
            keys: state.entries.len() as u64,
            get_ops: counters.get_ops.load(Ordering::Relaxed),
            set_ops: counters.set_ops.load(Ordering::Relaxed),
            del_ops: counters.del_ops.load(Ordering::Relaxed),
            expired: counters.expired.load(Ordering::Relaxed),
            records_replayed: self.inner.records_replayed,
            records_flushed,
            records_pending,
            torn_tail_discarded: self.inner.torn_tail_discarded,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use std::fs;
    use std::time::Duration;

    fn open(path: &Path, policy: FlushPolicy) -> Store<Value> {
        Store::open(path, policy).unwrap()
    }

    fn log_lines(path: &Path) -> Vec<Value> {
        fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[test]
    fn test_set_and_get() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir.path().join("a.wal"), FlushPolicy::Immediate);

        store.set("key", json!("value")).unwrap();
        assert_eq!(store.get("key").unwrap(), Some(json!("value")));
    }

    #[test]
    fn test_get_nonexistent() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir.path().join("a.wal"), FlushPolicy::Immediate);
        assert_eq!(store.get("nonexistent").unwrap(), None);
    }

    #[test]
    fn test_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir.path().join("a.wal"), FlushPolicy::Immediate);

        store.set("key", json!(1)).unwrap();
        store.delete("key").unwrap();
        assert_eq!(store.get("key").unwrap(), None);
        store.delete("key").unwrap(); // Already deleted
    }

    #[test]
    fn test_every_mutation_writes_one_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.wal");
        let store = open(&path, FlushPolicy::Immediate);

        store.set("a", json!(1)).unwrap();
        store.delete("missing").unwrap();
        store.set_with_ttl("b", json!(2), TimeDelta::hours(1)).unwrap();

        let lines = log_lines(&path);
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], json!({"operation": "set", "key": "a", "value": 1}));
        assert_eq!(lines[1], json!({"operation": "delete", "key": "missing"}));
        assert!(lines[2]["expiresAt"].is_string());
    }

    #[test]
    fn test_expiry() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir.path().join("a.wal"), FlushPolicy::Immediate);

        store
            .set_with_ttl("key", json!("value"), TimeDelta::milliseconds(50))
            .unwrap();

        // Key should exist immediately
        assert!(store.exists("key").unwrap());

        // Wait for expiry
        std::thread::sleep(Duration::from_millis(100));

        // Key should be gone
        assert!(!store.exists("key").unwrap());
        assert_eq!(store.get("key").unwrap(), None);
    }

    #[test]
    fn test_ttl_sign_semantics() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir.path().join("a.wal"), FlushPolicy::Immediate);

        store.set_with_ttl("past", json!(1), TimeDelta::hours(-1)).unwrap();
        store.set_with_ttl("future", json!(1), TimeDelta::hours(1)).unwrap();
        store.set_with_ttl("forever", json!(1), TimeDelta::zero()).unwrap();

        assert_eq!(store.get("past").unwrap(), None);
        assert_eq!(store.get("future").unwrap(), Some(json!(1)));
        assert_eq!(store.get("forever").unwrap(), Some(json!(1)));
    }

    #[test]
    fn test_extreme_ttls_do_not_panic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.wal");
        let store = open(&path, FlushPolicy::Immediate);

        store.set_with_ttl("far", json!(1), TimeDelta::MAX).unwrap();
        store.set_with_ttl("long-gone", json!(2), TimeDelta::MIN).unwrap();

        assert_eq!(store.get("far").unwrap(), Some(json!(1)));
        assert!(matches!(store.ttl("far").unwrap(), Ttl::ExpiresIn(_)));
        assert!(!store.exists("long-gone").unwrap());
        store.close().unwrap();

        let store = open(&path, FlushPolicy::Immediate);
        assert_eq!(store.get("far").unwrap(), Some(json!(1)));
        assert_eq!(store.get("long-gone").unwrap(), None);
    }

    #[test]
    fn test_pre_epoch_expiry_stays_expired_after_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.wal");
        let long_ago = "1960-01-01T00:00:00Z".parse::<DateTime<Utc>>().unwrap();

        let store = open(&path, FlushPolicy::Immediate);
        store.set_until("old", json!(1), Some(long_ago)).unwrap();
        assert!(!store.exists("old").unwrap());
        store.close().unwrap();

        let store = open(&path, FlushPolicy::Immediate);
        assert!(!store.exists("old").unwrap());
        assert_eq!(store.get("old").unwrap(), None);
    }

    #[test]
    fn test_zero_time_expiry_means_never_on_both_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.wal");

        let store = open(&path, FlushPolicy::Immediate);
        store
            .set_until("epoch", json!(1), Some(DateTime::<Utc>::UNIX_EPOCH))
            .unwrap();
        assert_eq!(store.ttl("epoch").unwrap(), Ttl::Persistent);
        assert_eq!(log_lines(&path)[0].get("expiresAt"), None);
        store.close().unwrap();

        let store = open(&path, FlushPolicy::Immediate);
        assert_eq!(store.ttl("epoch").unwrap(), Ttl::Persistent);
    }

    #[test]
    fn test_lazy_eviction_is_logged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.wal");
        let store = open(&path, FlushPolicy::Immediate);

        store.set_with_ttl("old", json!(1), TimeDelta::seconds(-1)).unwrap();
        assert_eq!(store.get("old").unwrap(), None);

        let lines = log_lines(&path);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1], json!({"operation": "delete", "key": "old"}));
        assert_eq!(store.stats().expired, 1);

        // A second read finds nothing and logs nothing.
        assert_eq!(store.get("old").unwrap(), None);
        assert_eq!(log_lines(&path).len(), 2);
    }

    #[test]
    fn test_ttl() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir.path().join("a.wal"), FlushPolicy::Immediate);

        store.set("persistent", json!(1)).unwrap();
        store.set_with_ttl("temp", json!(1), TimeDelta::seconds(100)).unwrap();

        assert_eq!(store.ttl("persistent").unwrap(), Ttl::Persistent);
        assert_eq!(store.ttl("missing").unwrap(), Ttl::Missing);
        match store.ttl("temp").unwrap() {
            Ttl::ExpiresIn(left) => {
                assert!(left > TimeDelta::seconds(98) && left <= TimeDelta::seconds(100))
            }
            other => panic!("unexpected ttl {other:?}"),
        }
    }

    #[test]
    fn test_keys_and_len_skip_expired() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir.path().join("a.wal"), FlushPolicy::Manual);

        store.set("b", json!(2)).unwrap();
        store.set("a", json!(1)).unwrap();
        store.set_with_ttl("z", json!(0), TimeDelta::seconds(-5)).unwrap();

        assert_eq!(store.keys().unwrap(), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(store.len().unwrap(), 2);
        assert!(!store.is_empty().unwrap());
        assert_eq!(store.stats().keys, 3);
    }

    #[test]
    fn test_purge_expired() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.wal");
        let store = open(&path, FlushPolicy::Immediate);

        store.set_with_ttl("key1", json!(1), TimeDelta::seconds(-1)).unwrap();
        store.set_with_ttl("key2", json!(2), TimeDelta::seconds(-1)).unwrap();
        store.set("key3", json!(3)).unwrap(); // No expiry

        assert_eq!(store.purge_expired().unwrap(), 2);
        assert_eq!(store.stats().keys, 1);
        assert_eq!(log_lines(&path).len(), 5);
        assert_eq!(store.purge_expired().unwrap(), 0);
    }

    #[test]
    fn test_manual_policy_buffers_until_flush() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.wal");
        let store = open(&path, FlushPolicy::Manual);

        store.set("a", json!(1)).unwrap();
        assert_eq!(store.get("a").unwrap(), Some(json!(1)));
        assert_eq!(fs::read_to_string(&path).unwrap(), "");
        assert_eq!(store.stats().records_pending, 1);

        store.flush().unwrap();
        assert_eq!(log_lines(&path).len(), 1);
        assert_eq!(store.stats().records_flushed, 1);
        assert_eq!(store.stats().records_pending, 0);
    }

    #[test]
    fn test_periodic_policy_flushes_in_background() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.wal");
        let store = open(&path, FlushPolicy::Periodic(Duration::from_millis(20)));

        store.set("a", json!(1)).unwrap();
        std::thread::sleep(Duration::from_millis(200));

        assert_eq!(log_lines(&path).len(), 1);
        store.close().unwrap();
    }

    #[test]
    fn test_encode_failure_changes_nothing() {
        use std::collections::HashMap;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.wal");
        let store: Store<HashMap<(u8, u8), u8>> =
            Store::open(&path, FlushPolicy::Immediate).unwrap();

        let mut bad = HashMap::new();
        bad.insert((1, 2), 3);
        let err = store.set("k", bad).unwrap_err();

        assert!(matches!(err, StoreError::Encode { .. }));
        assert_eq!(store.get("k").unwrap(), None);
        assert_eq!(fs::read_to_string(&path).unwrap(), "");
        assert_eq!(store.stats().set_ops, 0);
    }

    #[test]
    fn test_failed_immediate_flush_leaves_state_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.wal");
        let store = open(&path, FlushPolicy::Immediate);
        store.set("stable", json!(1)).unwrap();

        // Swap in a read-only handle so the next flush fails.
        {
            let mut state = store.inner.state.write();
            let file = File::open(&path).unwrap();
            state.log = Some(LogWriter::from_file(&path, file, false).unwrap());
        }

        let err = store.set("doomed", json!(2)).unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(store.get("doomed").unwrap(), None);
        assert!(store.delete("stable").is_err());
        assert_eq!(store.get("stable").unwrap(), Some(json!(1)));
        assert_eq!(store.stats().records_pending, 0);

        // Restore a writable handle; the store is usable again.
        store.inner.state.write().log = Some(LogWriter::open(&path, false).unwrap());
        store.set("doomed", json!(2)).unwrap();

        let keys: Vec<_> = log_lines(&path).iter().map(|l| l["key"].clone()).collect();
        assert_eq!(keys, vec![json!("stable"), json!("doomed")]);
    }

    #[test]
    fn test_failed_eviction_keeps_entry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.wal");
        let store = open(&path, FlushPolicy::Immediate);
        store.set_with_ttl("old", json!(1), TimeDelta::seconds(-1)).unwrap();

        {
            let mut state = store.inner.state.write();
            let file = File::open(&path).unwrap();
            state.log = Some(LogWriter::from_file(&path, file, false).unwrap());
        }

        assert_eq!(store.get("old").unwrap(), None);
        assert_eq!(store.stats().keys, 1);
        assert_eq!(store.stats().expired, 0);
    }

    #[test]
    fn test_closed_store_rejects_everything() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir.path().join("a.wal"), FlushPolicy::Manual);
        store.set("a", json!(1)).unwrap();
        store.close().unwrap();

        assert_eq!(store.lifecycle(), Lifecycle::Closed);
        assert!(matches!(store.set("a", json!(2)), Err(StoreError::Closed)));
        assert!(matches!(store.get("a"), Err(StoreError::Closed)));
        assert!(matches!(store.delete("a"), Err(StoreError::Closed)));
        assert!(matches!(store.flush(), Err(StoreError::Closed)));
        assert!(matches!(store.close(), Err(StoreError::Closed)));
        assert!(matches!(store.keys(), Err(StoreError::Closed)));
        assert_eq!(store.stats().get_ops, 0);
    }

    #[test]
    fn test_close_flushes_manual_buffer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.wal");
        let store = open(&path, FlushPolicy::Manual);

        store.set("a", json!(1)).unwrap();
        store.close().unwrap();
        assert_eq!(log_lines(&path).len(), 1);
    }

    #[test]
    fn test_drop_without_close_flushes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.wal");

        let store = open(&path, FlushPolicy::Manual);
        store.set("a", json!(1)).unwrap();
        drop(store);

        let store = open(&path, FlushPolicy::Manual);
        assert_eq!(store.get("a").unwrap(), Some(json!(1)));
    }

    #[test]
    fn test_clones_share_state() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir.path().join("a.wal"), FlushPolicy::Immediate);
        let other = store.clone();

        store.set("a", json!(1)).unwrap();
        assert_eq!(other.get("a").unwrap(), Some(json!(1)));
        other.close().unwrap();
        assert!(matches!(store.get("a"), Err(StoreError::Closed)));
    }

    #[test]
    fn test_concurrent_access() {
        use std::thread;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.wal");
        let store = open(&path, FlushPolicy::Manual);
        let mut handles = vec![];

        // Spawn multiple writers
        for i in 0..10 {
            let store = store.clone();
            handles.push(thread::spawn(move || {
                for j in 0..100 {
                    let key = format!("key-{}-{}", i, j);
                    store.set(key.clone(), json!(j)).unwrap();
                    store.get(&key).unwrap();
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        store.flush().unwrap();
        assert_eq!(store.len().unwrap(), 1000);
        assert_eq!(log_lines(&path).len(), 1000);
    }
}
