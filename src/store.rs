//! Memory-mapped row store.
//!
//! # File layout
//!
//! ```text
//! Offset   Size        Field
//! ──────────────────────────────────────────────
//! 0        8           vector_count (u64 LE)
//! 8        8           max_capacity (u64 LE)
//! 16       8           dimensions   (u64 LE)
//! 24       8           data_type_size (u64 LE, always 4)
//! 32       8           next_id      (u64 LE, starts at 1)
//! 40       88          reserved (zero on creation, ignored on read)
//! 128      stride × C  row data
//! ```
//!
//! Each row is `[key: u64 LE][values: f32 LE × dimensions]`, stride
//! `8 + 4·dimensions`. The file is sized for its full capacity at
//! creation, so appends never remap.
//!
//! # Safety
//!
//! Row reads return `&[f32]` slices borrowed straight from the mapping
//! via `bytemuck::cast_slice`. The mapping is page-aligned and every
//! float region starts at a 4-byte multiple (128 and the stride are both
//! multiples of 4), so the cast cannot fail on alignment.

use std::fs::OpenOptions;
use std::path::Path;

use memmap2::MmapMut;

use crate::error::{DbError, Result};

/// Byte size of the fixed file header.
pub const HEADER_SIZE: usize = 128;

/// Byte size of the key prefix of each row.
pub const KEY_SIZE: usize = 8;

const OFF_COUNT: usize = 0;
const OFF_CAPACITY: usize = 8;
const OFF_DIMENSIONS: usize = 16;
const OFF_DATA_TYPE_SIZE: usize = 24;
const OFF_NEXT_ID: usize = 32;

/// Append-only store of `(u64 key, [f32; dim])` rows over a writable
/// memory mapping.
#[derive(Debug)]
pub struct RowStore {
    mmap: MmapMut,
    dim: usize,
    stride: usize,
}

/// Header fields of a row file, readable without mapping the data region.
#[derive(Debug, Clone, Copy)]
pub struct HeaderInfo {
    pub vector_count: u64,
    pub max_capacity: u64,
    pub dimensions: u64,
    pub next_id: u64,
}

impl HeaderInfo {
    /// Reads just the 128-byte header of an existing row file.
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        use std::io::Read;

        let mut header = [0u8; HEADER_SIZE];
        let mut file = std::fs::File::open(path)?;
        file.read_exact(&mut header)?;

        let field = |off: usize| u64::from_le_bytes(header[off..off + 8].try_into().unwrap());
        Ok(Self {
            vector_count: field(OFF_COUNT),
            max_capacity: field(OFF_CAPACITY),
            dimensions: field(OFF_DIMENSIONS),
            next_id: field(OFF_NEXT_ID),
        })
    }
}

impl RowStore {
    /// Opens an existing row file or creates a new one sized for
    /// `capacity` rows of dimension `dim`.
    ///
    /// An existing file keeps the capacity it was created with; `capacity`
    /// only applies to newly created files. Opening a file whose stored
    /// dimension differs from `dim` fails with
    /// [`DbError::DimensionMismatch`] without modifying the file.
    pub fn open<P: AsRef<Path>>(path: P, dim: usize, capacity: u64) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;

        let stride = KEY_SIZE + dim * std::mem::size_of::<f32>();
        let len = file.metadata()?.len();

        if len == 0 {
            let file_size = HEADER_SIZE as u64 + stride as u64 * capacity;
            file.set_len(file_size)?;
            let mmap = unsafe { MmapMut::map_mut(&file)? };

            let mut store = Self { mmap, dim, stride };
            store.write_u64(OFF_COUNT, 0);
            store.write_u64(OFF_CAPACITY, capacity);
            store.write_u64(OFF_DIMENSIONS, dim as u64);
            store.write_u64(OFF_DATA_TYPE_SIZE, std::mem::size_of::<f32>() as u64);
            store.write_u64(OFF_NEXT_ID, 1);
            return Ok(store);
        }

        if (len as usize) < HEADER_SIZE {
            return Err(DbError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!("file too small for header: {} bytes", len),
            )));
        }

        let mmap = unsafe { MmapMut::map_mut(&file)? };
        let store = Self { mmap, dim, stride };

        let stored_dim = store.read_u64(OFF_DIMENSIONS);
        if stored_dim != dim as u64 {
            return Err(DbError::DimensionMismatch {
                expected: dim,
                actual: stored_dim as usize,
            });
        }

        let expected_len = HEADER_SIZE as u64 + stride as u64 * store.capacity();
        if len < expected_len {
            return Err(DbError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!("file truncated: expected {} bytes, got {}", expected_len, len),
            )));
        }

        Ok(store)
    }

    /// Number of rows appended so far (live and tombstoned alike).
    pub fn count(&self) -> u64 {
        self.read_u64(OFF_COUNT)
    }

    /// Number of rows the file was sized for at creation.
    pub fn capacity(&self) -> u64 {
        self.read_u64(OFF_CAPACITY)
    }

    /// Vector dimension fixed at creation.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Claims the next auto-assign id: returns the current counter and
    /// writes the incremented value back through the mapping.
    ///
    /// Single-writer: the two header accesses are not atomic with respect
    /// to other processes mapping the same file.
    pub fn next_id_fetch_add(&mut self) -> u64 {
        let id = self.read_u64(OFF_NEXT_ID);
        self.write_u64(OFF_NEXT_ID, id + 1);
        id
    }

    /// Appends a row and returns the slot it was written to.
    pub fn append(&mut self, key: u64, values: &[f32]) -> Result<u64> {
        if values.len() != self.dim {
            return Err(DbError::DimensionMismatch {
                expected: self.dim,
                actual: values.len(),
            });
        }
        let slot = self.count();
        if slot == self.capacity() {
            return Err(DbError::CapacityExceeded {
                capacity: self.capacity(),
            });
        }

        let off = self.row_offset(slot);
        self.mmap[off..off + KEY_SIZE].copy_from_slice(&key.to_le_bytes());
        let value_bytes: &[u8] = bytemuck::cast_slice(values);
        self.mmap[off + KEY_SIZE..off + self.stride].copy_from_slice(value_bytes);

        self.write_u64(OFF_COUNT, slot + 1);
        Ok(slot)
    }

    /// Overwrites the float payload of an existing row, leaving its key
    /// untouched. Used by update; `vector_count` does not change.
    pub fn overwrite(&mut self, slot: u64, values: &[f32]) -> Result<()> {
        if values.len() != self.dim {
            return Err(DbError::DimensionMismatch {
                expected: self.dim,
                actual: values.len(),
            });
        }
        if slot >= self.count() {
            return Err(DbError::SlotOutOfBounds {
                slot,
                count: self.count(),
            });
        }

        let off = self.row_offset(slot) + KEY_SIZE;
        let value_bytes: &[u8] = bytemuck::cast_slice(values);
        self.mmap[off..off + value_bytes.len()].copy_from_slice(value_bytes);
        Ok(())
    }

    /// Zero-copy row read: the key and a float slice borrowed from the
    /// mapping, valid for the lifetime of the store.
    pub fn row(&self, slot: u64) -> Result<(u64, &[f32])> {
        let count = self.count();
        if slot >= count {
            return Err(DbError::SlotOutOfBounds { slot, count });
        }

        let off = self.row_offset(slot);
        let key = u64::from_le_bytes(self.mmap[off..off + KEY_SIZE].try_into().unwrap());
        let values = bytemuck::cast_slice(&self.mmap[off + KEY_SIZE..off + self.stride]);
        Ok((key, values))
    }

    /// Flushes the mapping to disk.
    pub fn flush(&self) -> Result<()> {
        self.mmap.flush()?;
        Ok(())
    }

    #[inline]
    fn row_offset(&self, slot: u64) -> usize {
        HEADER_SIZE + slot as usize * self.stride
    }

    #[inline]
    fn read_u64(&self, offset: usize) -> u64 {
        u64::from_le_bytes(self.mmap[offset..offset + 8].try_into().unwrap())
    }

    #[inline]
    fn write_u64(&mut self, offset: usize, value: u64) {
        self.mmap[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
    }
}

impl Drop for RowStore {
    fn drop(&mut self) {
        // Close path requests a flush; errors here have nowhere to go.
        let _ = self.mmap.flush();
    }
}
