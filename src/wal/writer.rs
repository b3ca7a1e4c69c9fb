//! Append-Only Log Writer
//!
//! Records are encoded into an in-memory buffer and only reach the file on
//! [`LogWriter::flush`]. The writer tracks how many bytes of the file are
//! known-good (`committed_len`) so that a failed flush can cut off whatever
//! part of the buffer made it to disk. The buffer itself survives the
//! failure and is written again by the next flush.
//!
//! ```text
//!   append ──> [ buffer: rec rec rec ] ──flush──> [ file: ....committed | ]
//!                  ▲                                               │
//!                  └──────────── kept on failure ◄─────────────────┘ set_len(committed)
//! ```
//!
//! The file only grows. Nothing here rewrites or compacts earlier records.

use crate::error::Result;
use crate::wal::record::{encode_into, Record};
use bytes::BytesMut;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{trace, warn};

/// Initial buffer capacity
const INITIAL_BUFFER_SIZE: usize = 4096;

/// Position in the write buffer returned by [`LogWriter::append`], used to
/// undo that append with [`LogWriter::rollback`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppendMark {
    offset: usize,
}

#[derive(Debug)]
pub struct LogWriter {
    path: PathBuf,
    file: File,
    buf: BytesMut,
    /// File length known to hold only complete records
    committed_len: u64,
    sync_on_flush: bool,
    pending_records: u64,
    committed_records: u64,
}

impl LogWriter {
    /// Opens `path` for appending, creating it if needed.
    pub fn open(path: impl AsRef<Path>, sync_on_flush: bool) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;
        Self::from_file(path, file, sync_on_flush)
    }

    pub(crate) fn from_file(path: &Path, file: File, sync_on_flush: bool) -> Result<Self> {
        let committed_len = file.metadata()?.len();
        Ok(Self {
            path: path.to_path_buf(),
            file,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            committed_len,
            sync_on_flush,
            pending_records: 0,
            committed_records: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bytes of the file known to contain complete records.
    pub fn committed_len(&self) -> u64 {
        self.committed_len
    }

    /// Bytes buffered but not yet flushed.
    pub fn pending_bytes(&self) -> usize {
        self.buf.len()
    }

    pub fn pending_records(&self) -> u64 {
        self.pending_records
    }

    /// Records written by this writer and confirmed by a successful flush.
    pub fn committed_records(&self) -> u64 {
        self.committed_records
    }

    /// Encodes `record` into the buffer.
    ///
    /// Nothing is buffered if encoding fails.
    pub fn append<V: Serialize>(&mut self, record: &Record<V>) -> Result<AppendMark> {
        let mark = AppendMark {
            offset: self.buf.len(),
        };
        encode_into(record, &mut self.buf)?;
        self.pending_records += 1;
        Ok(mark)
    }

    /// Discards the record appended at `mark`.
    ///
    /// Must be the most recent append; used to back out a mutation whose
    /// immediate flush failed.
    pub fn rollback(&mut self, mark: AppendMark) {
        if mark.offset < self.buf.len() {
            self.buf.truncate(mark.offset);
            self.pending_records = self.pending_records.saturating_sub(1);
        }
    }

    /// Writes the buffer to the file and, if configured, syncs it.
    ///
    /// On failure the file is cut back to its last committed length and the
    /// buffer is kept, so the call can simply be retried.
    pub fn flush(&mut self) -> Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }

        if let Err(err) = self.write_out() {
            if let Err(trunc_err) = self.file.set_len(self.committed_len) {
                warn!(
                    path = %self.path.display(),
                    error = %trunc_err,
                    "Failed to cut partial write off the log"
                );
            }
            return Err(err.into());
        }

        self.committed_len += self.buf.len() as u64;
        self.committed_records += self.pending_records;
        trace!(
            bytes = self.buf.len(),
            records = self.pending_records,
            committed_len = self.committed_len,
            "Flushed log buffer"
        );
        self.buf.clear();
        self.pending_records = 0;
        Ok(())
    }

    fn write_out(&mut self) -> std::io::Result<()> {
        self.file.write_all(&self.buf)?;
        if self.sync_on_flush {
            self.file.sync_data()?;
        }
        Ok(())
    }

    /// Shrinks the file to `len` bytes, dropping a torn tail found during
    /// recovery. Only valid while nothing is buffered.
    pub fn truncate_to(&mut self, len: u64) -> Result<()> {
        debug_assert!(self.buf.is_empty());
        self.file.set_len(len)?;
        if self.sync_on_flush {
            self.file.sync_all()?;
        }
        self.committed_len = len;
        Ok(())
    }
}
