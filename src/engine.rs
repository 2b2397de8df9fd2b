//! Database façade.
//!
//! Assembles the row store, tombstone log, key index and distance kernel
//! into the public engine surface. One `Database` instance assumes
//! exclusive access to its files for its whole lifetime; all writes are
//! serialized by the caller (the server locks around every command).

use std::collections::{BinaryHeap, HashMap, HashSet};
use std::ffi::OsString;
use std::path::Path;

use crate::distance::{detect_simd, squared_l2};
use crate::error::{DbError, Result};
use crate::store::RowStore;
use crate::tombstones::TombstoneLog;

/// A single named vector database: a mmap'd row file plus its `.del`
/// deletion log.
#[derive(Debug)]
pub struct Database {
    store: RowStore,
    tombstones: TombstoneLog,
    /// Keys marked deleted. Rebuilt from the log on open.
    deleted: HashSet<u64>,
    /// Key → slot for every live key. Rebuilt from the rows on open.
    index: HashMap<u64, u32>,
    /// Chosen once at open; the scan branches on this per query.
    use_simd: bool,
}

impl Database {
    /// Opens or creates the database at `path` (the `.del` log lives at
    /// `<path>.del`). Fails with [`DbError::DimensionMismatch`] when an
    /// existing file was created with a different dimension.
    pub fn open<P: AsRef<Path>>(path: P, dim: usize, capacity: u64) -> Result<Self> {
        let store = RowStore::open(&path, dim, capacity)?;

        let mut del_path = OsString::from(path.as_ref().as_os_str());
        del_path.push(".del");
        let tombstones = TombstoneLog::new(del_path);
        let deleted = tombstones.load()?;

        // Rebuild key → slot, skipping tombstoned keys. Scanning in slot
        // order means a key appearing at several slots resolves to the
        // highest one: later writes supersede earlier ones.
        let mut index = HashMap::new();
        for slot in 0..store.count() {
            let (key, _) = store.row(slot)?;
            if !deleted.contains(&key) {
                index.insert(key, slot as u32);
            }
        }

        Ok(Self {
            store,
            tombstones,
            deleted,
            index,
            use_simd: detect_simd(),
        })
    }

    /// Vector dimension of this database.
    pub fn dim(&self) -> usize {
        self.store.dim()
    }

    /// Total appended rows, live and tombstoned.
    pub fn count(&self) -> u64 {
        self.store.count()
    }

    /// Number of live (findable) keys.
    pub fn live_count(&self) -> usize {
        self.index.len()
    }

    /// Inserts a vector under a caller-chosen key.
    ///
    /// Inserting a previously deleted key un-deletes it (the on-disk
    /// tombstone stays; the new row's higher slot wins the index rebuild
    /// on reopen). Inserting an existing live key appends a shadow row
    /// and repoints the index at it; no uniqueness is enforced.
    pub fn insert(&mut self, key: u64, values: &[f32]) -> Result<()> {
        let slot = self.store.append(key, values)?;
        self.deleted.remove(&key);
        self.index.insert(key, slot as u32);
        Ok(())
    }

    /// Inserts under the next auto-assigned key and returns it.
    ///
    /// Auto ids start at 1 and are strictly increasing across the
    /// lifetime of the file, independent of any manually chosen keys.
    pub fn insert_auto(&mut self, values: &[f32]) -> Result<u64> {
        let id = self.store.next_id_fetch_add();
        self.insert(id, values)?;
        Ok(id)
    }

    /// Overwrites the vector of a live key in place. Returns `false` when
    /// the key is deleted or unknown.
    pub fn update(&mut self, key: u64, values: &[f32]) -> Result<bool> {
        if values.len() != self.store.dim() {
            return Err(DbError::DimensionMismatch {
                expected: self.store.dim(),
                actual: values.len(),
            });
        }
        if self.deleted.contains(&key) {
            return Ok(false);
        }
        let Some(&slot) = self.index.get(&key) else {
            return Ok(false);
        };
        self.store.overwrite(slot as u64, values)?;
        Ok(true)
    }

    /// Soft-deletes a key. Returns `false` when it is already deleted.
    ///
    /// The tombstone is on disk before this returns; the row slot is not
    /// reclaimed.
    pub fn remove(&mut self, key: u64) -> Result<bool> {
        if self.deleted.contains(&key) {
            return Ok(false);
        }
        self.tombstones.append(key)?;
        self.deleted.insert(key);
        self.index.remove(&key);
        Ok(true)
    }

    /// Exact nearest neighbor: the key of the closest live row, or `-1`
    /// when no live rows exist. Ties go to the lower slot. The key is
    /// narrowed to `i32` for the wire protocol.
    pub fn search(&self, query: &[f32]) -> Result<i32> {
        self.check_query_dim(query)?;

        let mut min_dist = f32::INFINITY;
        let mut best: i32 = -1;
        for slot in 0..self.store.count() {
            let (key, values) = self.store.row(slot)?;
            if self.deleted.contains(&key) {
                continue;
            }
            let dist = squared_l2(query, values, self.use_simd);
            if dist < min_dist {
                min_dist = dist;
                best = key as i32;
            }
        }
        Ok(best)
    }

    /// Exact top-`n` live keys by ascending distance. Returns fewer than
    /// `n` entries when fewer live rows exist; `n = 0` returns nothing.
    pub fn search_n(&self, query: &[f32], n: usize) -> Result<Vec<i32>> {
        self.check_query_dim(query)?;
        if n == 0 {
            return Ok(Vec::new());
        }

        // Bounded max-heap: the root is the farthest of the current
        // candidates, so a closer row evicts it in O(log n).
        let mut heap: BinaryHeap<Candidate> = BinaryHeap::with_capacity(n + 1);
        for slot in 0..self.store.count() {
            let (key, values) = self.store.row(slot)?;
            if self.deleted.contains(&key) {
                continue;
            }
            let dist = squared_l2(query, values, self.use_simd);
            if heap.len() < n {
                heap.push(Candidate { dist, key });
            } else if let Some(worst) = heap.peek() {
                if dist < worst.dist {
                    heap.pop();
                    heap.push(Candidate { dist, key });
                }
            }
        }

        let mut results = Vec::with_capacity(heap.len());
        while let Some(entry) = heap.pop() {
            results.push(entry.key as i32);
        }
        results.reverse();
        Ok(results)
    }

    fn check_query_dim(&self, query: &[f32]) -> Result<()> {
        if query.len() != self.store.dim() {
            return Err(DbError::DimensionMismatch {
                expected: self.store.dim(),
                actual: query.len(),
            });
        }
        Ok(())
    }
}

struct Candidate {
    dist: f32,
    key: u64,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.dist == other.dist
    }
}
impl Eq for Candidate {}
impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.dist
            .partial_cmp(&other.dist)
            .unwrap_or(std::cmp::Ordering::Equal)
    }
}
