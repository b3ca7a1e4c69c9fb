//! Store configuration: where the log lives and when it is flushed.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Interval used by [`FlushPolicy::periodic`].
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(5);

/// Governs when buffered log records reach stable storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushPolicy {
    /// Flush after every append. A mutation is committed only once its
    /// flush succeeds.
    Immediate,

    /// Flush on a background tick. Appends return as soon as they are
    /// buffered.
    Periodic(Duration),

    /// Flush only when the caller asks for it.
    Manual,
}

impl FlushPolicy {
    /// Periodic flushing at [`DEFAULT_FLUSH_INTERVAL`].
    pub fn periodic() -> Self {
        FlushPolicy::Periodic(DEFAULT_FLUSH_INTERVAL)
    }

    /// Returns the tick interval for the periodic policy.
    pub fn interval(&self) -> Option<Duration> {
        match self {
            FlushPolicy::Periodic(interval) => Some(*interval),
            _ => None,
        }
    }
}

impl Default for FlushPolicy {
    fn default() -> Self {
        FlushPolicy::Immediate
    }
}

impl fmt::Display for FlushPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlushPolicy::Immediate => write!(f, "immediate"),
            FlushPolicy::Periodic(interval) => write!(f, "periodic:{}", interval.as_millis()),
            FlushPolicy::Manual => write!(f, "manual"),
        }
    }
}

/// Error returned when a flush policy string cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid flush policy {0:?} (expected immediate, manual, periodic or periodic:<ms>)")]
pub struct ParsePolicyError(String);

impl FromStr for FlushPolicy {
    type Err = ParsePolicyError;

    /// Accepts `immediate`, `manual`, `periodic` and `periodic:<millis>`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        match lower.as_str() {
            "immediate" => Ok(FlushPolicy::Immediate),
            "manual" => Ok(FlushPolicy::Manual),
            "periodic" => Ok(FlushPolicy::periodic()),
            other => {
                let millis = other
                    .strip_prefix("periodic:")
                    .and_then(|ms| ms.parse::<u64>().ok())
                    .filter(|ms| *ms > 0)
                    .ok_or_else(|| ParsePolicyError(s.to_string()))?;
                Ok(FlushPolicy::Periodic(Duration::from_millis(millis)))
            }
        }
    }
}

/// Configuration for opening a [`Store`](crate::Store).
///
/// # Example
///
/// ```
/// use ledgerkv::{FlushPolicy, StoreConfig};
/// use std::time::Duration;
///
/// let config = StoreConfig::new("data.wal")
///     .with_flush_policy(FlushPolicy::Periodic(Duration::from_millis(500)))
///     .with_sync_on_flush(false);
/// assert_eq!(config.flush_policy.interval(), Some(Duration::from_millis(500)));
/// ```
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Path of the append-only log file. Created if missing.
    pub path: PathBuf,

    /// When buffered records are flushed (default: immediate)
    pub flush_policy: FlushPolicy,

    /// Call `fsync` after writing the buffer out (default: true).
    /// When false, a flush hands bytes to the OS without waiting for the disk.
    pub sync_on_flush: bool,
}

impl StoreConfig {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            flush_policy: FlushPolicy::default(),
            sync_on_flush: true,
        }
    }

    pub fn with_flush_policy(mut self, policy: FlushPolicy) -> Self {
        self.flush_policy = policy;
        self
    }

    pub fn with_sync_on_flush(mut self, sync: bool) -> Self {
        self.sync_on_flush = sync;
        self
    }
}
