//! Append-only tombstone log.
//!
//! Deleted keys live in a `.del` sibling of the data file: a bare
//! concatenation of 8-byte little-endian keys, no header. The whole log
//! is read into a set on open; each delete appends one record and syncs
//! before returning, so a tombstone survives a crash even when the data
//! file's latest rows are still in the page cache.

use std::collections::HashSet;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Handle to the on-disk deletion log. The file is opened per append,
/// not held open.
#[derive(Debug)]
pub struct TombstoneLog {
    path: PathBuf,
}

impl TombstoneLog {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Reads every complete 8-byte record into a set. A truncated tail
    /// (interrupted append) is ignored; the preceding records still count.
    /// A missing file means no deletions yet.
    pub fn load(&self) -> std::io::Result<HashSet<u64>> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(HashSet::new()),
            Err(err) => return Err(err),
        };

        let mut deleted = HashSet::with_capacity(bytes.len() / 8);
        for chunk in bytes.chunks_exact(8) {
            deleted.insert(u64::from_le_bytes(chunk.try_into().unwrap()));
        }
        Ok(deleted)
    }

    /// Appends one deleted key and syncs it to disk before returning.
    pub fn append(&self, key: u64) -> std::io::Result<()> {
        let mut file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.path)?;
        file.write_all(&key.to_le_bytes())?;
        file.sync_all()?;
        Ok(())
    }

    /// Number of complete records currently on disk. Counts every append
    /// ever made, including keys later re-inserted.
    pub fn record_count(&self) -> std::io::Result<u64> {
        match std::fs::metadata(&self.path) {
            Ok(meta) => Ok(meta.len() / 8),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(0),
            Err(err) => Err(err),
        }
    }
}
