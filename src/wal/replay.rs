//! Crash Recovery
//!
//! Rebuilds the key map by reapplying every record in file order:
//!
//! - `set` overwrites the key, keeping the logged expiry exactly as written.
//!   Expiry is not evaluated here; an entry that expired while the store was
//!   down is still loaded and is evicted on its next read.
//! - `delete` removes the key if it is present.
//!
//! ## Torn Tails
//!
//! A crash in the middle of a flush can leave the last record half written.
//! Because the terminator is the final byte of every record, a torn record
//! never ends in `\n`. The replayer therefore tolerates exactly one bad
//! record, and only at the very end of the file: either bytes after the last
//! terminator, or a final line that does not decode. Any earlier bad line is
//! real corruption and aborts recovery.
//!
//! The replayer only reads. The caller decides what to do with the tail
//! (the store cuts the file back to [`Recovered::valid_len`]).

use crate::error::Result;
use crate::storage::entry::Entry;
use crate::wal::record::{decode_line, Record, RECORD_TERMINATOR};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::io::BufRead;

/// A discarded partial record at the end of the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TornTail {
    /// 1-based line number of the discarded record
    pub line: usize,
    /// Byte offset where the discarded record starts
    pub offset: u64,
    /// Length of the discarded bytes
    pub len: u64,
}

/// State rebuilt from a log.
#[derive(Debug, Clone)]
pub struct Recovered<V> {
    pub entries: HashMap<String, Entry<V>>,
    /// Number of records applied
    pub records: u64,
    /// Length of the prefix made of complete, valid records
    pub valid_len: u64,
    pub torn_tail: Option<TornTail>,
}

impl<V> Default for Recovered<V> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            records: 0,
            valid_len: 0,
            torn_tail: None,
        }
    }
}

impl<V> Recovered<V> {
    fn apply(&mut self, record: Record<V>) {
        apply(&mut self.entries, record);
        self.records += 1;
    }
}

/// Applies one record to `entries`. The live write path uses this too, so a
/// replayed map matches the one that was built in memory.
pub fn apply<V>(entries: &mut HashMap<String, Entry<V>>, record: Record<V>) {
    match record {
        Record::Set {
            key,
            value,
            expires_at,
        } => {
            entries.insert(key, Entry::new(value, expires_at));
        }
        Record::Delete { key } => {
            entries.remove(&key);
        }
    }
}

/// Replays every record readable from `reader`.
pub fn replay<V, R>(mut reader: R) -> Result<Recovered<V>>
where
    V: DeserializeOwned,
    R: BufRead,
{
    let mut recovered = Recovered::default();
    let mut line = Vec::new();
    let mut line_no = 0usize;

    loop {
        line.clear();
        let read = reader.read_until(RECORD_TERMINATOR, &mut line)?;
        if read == 0 {
            break;
        }
        line_no += 1;

        let complete = line.last() == Some(&RECORD_TERMINATOR);
        let body = trim_line(&line);

        if complete && body.iter().all(u8::is_ascii_whitespace) {
            recovered.valid_len += read as u64;
            continue;
        }

        let decoded = if complete {
            decode_line::<V>(body, line_no)
        } else {
            // No terminator means the write was cut short, even if the bytes
            // happen to parse.
            recovered.torn_tail = Some(TornTail {
                line: line_no,
                offset: recovered.valid_len,
                len: read as u64,
            });
            break;
        };

        match decoded {
            Ok(record) => {
                recovered.apply(record);
                recovered.valid_len += read as u64;
            }
            Err(err) => {
                if reader.fill_buf()?.is_empty() {
                    recovered.torn_tail = Some(TornTail {
                        line: line_no,
                        offset: recovered.valid_len,
                        len: read as u64,
                    });
                    break;
                }
                return Err(err);
            }
        }
    }

    Ok(recovered)
}

fn trim_line(line: &[u8]) -> &[u8] {
    let mut end = line.len();
    while end > 0 && matches!(line[end - 1], b'\n' | b'\r') {
        end -= 1;
    }
    &line[..end]
}
