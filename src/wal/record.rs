//! Log Record Format
//!
//! Each mutation is persisted as one compact JSON object followed by `\n`:
//!
//! ```text
//! {"operation":"set","key":"session","value":{"user":7},"expiresAt":"2026-10-19T10:00:00Z"}
//! {"operation":"delete","key":"session"}
//! ```
//!
//! `value` and `expiresAt` only appear on `set` records, and `expiresAt` is
//! omitted for entries that never expire. JSON escapes control characters
//! inside strings, so a payload can never contain a raw line terminator and
//! the log stays line-framed and readable with ordinary text tools.

use crate::error::{Result, StoreError};
use crate::storage::entry::normalize_expiry;
use bytes::{BufMut, BytesMut};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Line terminator between records.
pub const RECORD_TERMINATOR: u8 = b'\n';

/// A single logged mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "lowercase")]
pub enum Record<V> {
    /// Upsert `key` with `value`, expiring at `expires_at` if present.
    Set {
        key: String,
        value: V,
        #[serde(rename = "expiresAt", default, skip_serializing_if = "Option::is_none")]
        expires_at: Option<DateTime<Utc>>,
    },

    /// Remove `key` if present.
    Delete { key: String },
}

impl<V> Record<V> {
    pub fn set(key: impl Into<String>, value: V, expires_at: Option<DateTime<Utc>>) -> Self {
        Record::Set {
            key: key.into(),
            value,
            expires_at,
        }
    }

    pub fn delete(key: impl Into<String>) -> Self {
        Record::Delete { key: key.into() }
    }

    /// The key this record mutates.
    pub fn key(&self) -> &str {
        match self {
            Record::Set { key, .. } | Record::Delete { key } => key,
        }
    }

    /// A zero-time `expiresAt` means "never expires".
    fn normalize(&mut self) {
        if let Record::Set { expires_at, .. } = self {
            *expires_at = normalize_expiry(*expires_at);
        }
    }
}

/// Serializes `record` plus its terminator onto the end of `buf`.
///
/// On failure `buf` is left exactly as it was. Returns the number of bytes
/// appended.
pub fn encode_into<V: Serialize>(record: &Record<V>, buf: &mut BytesMut) -> Result<usize> {
    let start = buf.len();

    if let Err(source) = serde_json::to_writer((&mut *buf).writer(), record) {
        buf.truncate(start);
        return Err(StoreError::Encode {
            key: record.key().to_string(),
            source,
        });
    }
    buf.put_u8(RECORD_TERMINATOR);

    Ok(buf.len() - start)
}

/// Decodes one record from a line with its terminator already stripped.
///
/// `line_no` is 1-based and only used for error reporting.
pub fn decode_line<V: DeserializeOwned>(line: &[u8], line_no: usize) -> Result<Record<V>> {
    let mut record: Record<V> = serde_json::from_slice(line).map_err(|source| {
        StoreError::Decode {
            line: line_no,
            source,
        }
    })?;
    record.normalize();
    Ok(record)
}
