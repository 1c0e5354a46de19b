//! Byte-level storage backends.
//!
//! A backend knows nothing about records or keys; it moves opaque bytes in
//! and out of the three named tables. `RedbBackend` is the durable one.

use std::fmt;
use std::path::Path;

use redb::{Database, ReadableTable, ReadableTableMetadata, TableDefinition};

use crate::error::Result;

const PREDICTIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("predictions");
const MODEL_PERFORMANCE: TableDefinition<&str, &[u8]> = TableDefinition::new("model_performance");
const METADATA: TableDefinition<&str, &[u8]> = TableDefinition::new("metadata");

/// The named tables of the cache database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Predictions,
    ModelPerformance,
    Metadata,
}

impl Table {
    pub const ALL: [Table; 3] = [Table::Predictions, Table::ModelPerformance, Table::Metadata];

    /// Tables holding cache records (everything but metadata).
    pub const RECORDS: [Table; 2] = [Table::Predictions, Table::ModelPerformance];

    pub fn name(self) -> &'static str {
        match self {
            Table::Predictions => "predictions",
            Table::ModelPerformance => "model_performance",
            Table::Metadata => "metadata",
        }
    }

    fn definition(self) -> TableDefinition<'static, &'static str, &'static [u8]> {
        match self {
            Table::Predictions => PREDICTIONS,
            Table::ModelPerformance => MODEL_PERFORMANCE,
            Table::Metadata => METADATA,
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Raw table access used by [`Store`](super::Store).
pub trait StorageBackend: Send + Sync {
    fn get(&self, table: Table, key: &str) -> Result<Option<Vec<u8>>>;

    /// Insert or overwrite.
    fn put(&self, table: Table, key: &str, value: &[u8]) -> Result<()>;

    /// Remove a key. Returns whether a value was present.
    fn delete(&self, table: Table, key: &str) -> Result<bool>;

    /// Snapshot of every entry in the table.
    fn entries(&self, table: Table) -> Result<Vec<(String, Vec<u8>)>>;

    fn count(&self, table: Table) -> Result<u64>;

    /// Remove every entry. Returns how many were removed.
    fn clear(&self, table: Table) -> Result<u64>;
}

/// Backend storing all tables in a single redb database file.
pub struct RedbBackend {
    db: Database,
}

impl RedbBackend {
    /// Open (or create) the database at `path`, creating any missing tables.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path)?;

        // Create all tables eagerly so later read txns don't fail
        let write_txn = db.begin_write()?;
        for table in Table::ALL {
            let _t = write_txn.open_table(table.definition())?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }
}

impl StorageBackend for RedbBackend {
    fn get(&self, table: Table, key: &str) -> Result<Option<Vec<u8>>> {
        let read_txn = self.db.begin_read()?;
        let t = read_txn.open_table(table.definition())?;
        Ok(t.get(key)?.map(|value| value.value().to_vec()))
    }

    fn put(&self, table: Table, key: &str, value: &[u8]) -> Result<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut t = write_txn.open_table(table.definition())?;
            t.insert(key, value)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn delete(&self, table: Table, key: &str) -> Result<bool> {
        let write_txn = self.db.begin_write()?;
        // The table handle is dropped at the end of the statement, before commit
        let removed = write_txn
            .open_table(table.definition())?
            .remove(key)?
            .is_some();
        write_txn.commit()?;
        Ok(removed)
    }

    fn entries(&self, table: Table) -> Result<Vec<(String, Vec<u8>)>> {
        let read_txn = self.db.begin_read()?;
        let t = read_txn.open_table(table.definition())?;
        let mut result = Vec::new();
        for entry in t.iter()? {
            let entry = entry?;
            result.push((entry.0.value().to_string(), entry.1.value().to_vec()));
        }
        Ok(result)
    }

    fn count(&self, table: Table) -> Result<u64> {
        let read_txn = self.db.begin_read()?;
        let t = read_txn.open_table(table.definition())?;
        Ok(t.len()?)
    }

    fn clear(&self, table: Table) -> Result<u64> {
        // Collect keys first (read txn)
        let keys: Vec<String> = self.entries(table)?.into_iter().map(|(k, _)| k).collect();
        if keys.is_empty() {
            return Ok(0);
        }

        let write_txn = self.db.begin_write()?;
        {
            let mut t = write_txn.open_table(table.definition())?;
            for key in &keys {
                t.remove(key.as_str())?;
            }
        }
        write_txn.commit()?;
        Ok(keys.len() as u64)
    }
}
