//! Name → database catalog held by the server process.
//!
//! Databases are opened lazily on first selection and stay open for the
//! life of the process. Each name maps to `<data_dir>/<name>.db` (plus
//! its `.del` sibling).

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::path::PathBuf;

use crate::engine::Database;
use crate::error::{DbError, Result};

/// Default row capacity for databases created through the server.
pub const DEFAULT_CAPACITY: u64 = 100_000;

pub struct Catalog {
    data_dir: PathBuf,
    capacity: u64,
    databases: HashMap<String, Database>,
}

impl Catalog {
    pub fn new(data_dir: impl Into<PathBuf>, capacity: u64) -> Self {
        Self {
            data_dir: data_dir.into(),
            capacity,
            databases: HashMap::new(),
        }
    }

    /// Opens (or creates) the named database and returns it.
    ///
    /// Re-selecting an already-open database at a different dimension
    /// logs a warning and serves the stored dimension; payload sizing
    /// follows [`Database::dim`].
    pub fn select(&mut self, name: &str, dim: usize) -> Result<&mut Database> {
        if !valid_name(name) {
            return Err(invalid_input(format!("invalid database name {:?}", name)));
        }
        if dim == 0 {
            return Err(invalid_input("dimension must be at least 1".to_string()));
        }

        let db = match self.databases.entry(name.to_string()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                std::fs::create_dir_all(&self.data_dir)?;
                let path = self.data_dir.join(format!("{}.db", name));
                tracing::info!("opening database {:?} (dim {})", path, dim);
                let db = Database::open(&path, dim, self.capacity)?;
                tracing::info!(
                    "database {} loaded: {} rows, {} live",
                    name,
                    db.count(),
                    db.live_count()
                );
                entry.insert(db)
            }
        };
        if db.dim() != dim {
            tracing::warn!(
                "database {} holds dim {} vectors, client requested {}",
                name,
                db.dim(),
                dim
            );
        }
        Ok(db)
    }

    /// Returns a previously selected database.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut Database> {
        self.databases.get_mut(name)
    }
}

/// Database names become file names; keep them to a safe alphabet so a
/// client cannot escape the data directory.
fn valid_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 128
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn invalid_input(message: String) -> DbError {
    DbError::Io(std::io::Error::new(
        std::io::ErrorKind::InvalidInput,
        message,
    ))
}
