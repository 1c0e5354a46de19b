use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use super::backend::{RedbBackend, StorageBackend, Table};
use crate::error::{CacheError, Result};

/// A cached payload with its write time and serialized size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheRecord {
    pub data: Value,
    #[serde(rename = "cachedAt", with = "chrono::serde::ts_milliseconds")]
    pub cached_at: DateTime<Utc>,
    pub size: u64,
}

impl CacheRecord {
    /// Wrap `data`, stamping it with the current time.
    pub fn new(data: Value) -> Self {
        Self::with_timestamp(data, Utc::now())
    }

    /// Wrap `data` with an explicit write time. The size is always derived
    /// from `data`.
    pub fn with_timestamp(data: Value, cached_at: DateTime<Utc>) -> Self {
        let size = data.to_string().len() as u64;
        Self {
            data,
            cached_at,
            size,
        }
    }

    pub fn from_data<T: Serialize>(data: &T) -> Result<Self> {
        Ok(Self::new(serde_json::to_value(data)?))
    }
}

/// A record together with the raw key it is stored under.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    pub key: String,
    pub record: CacheRecord,
}

/// Outcome of [`Store::clear`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClearSummary {
    pub was_empty: bool,
    pub deleted_count: u64,
}

/// Lazily opened three-table store.
///
/// The backend is opened on first use. Concurrent first callers wait on the
/// same initialization; a failed attempt leaves the store uninitialized so
/// the next call tries again.
pub struct Store {
    path: Option<PathBuf>,
    backend: OnceCell<Arc<dyn StorageBackend>>,
}

impl Store {
    /// A store backed by a redb file at `path`, opened on first use.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            backend: OnceCell::new(),
        }
    }

    /// A store over an already open backend.
    pub fn with_backend(backend: Arc<dyn StorageBackend>) -> Self {
        Self {
            path: None,
            backend: OnceCell::new_with(Some(backend)),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.backend.initialized()
    }

    /// Open the database and create missing tables. Idempotent.
    pub async fn init(&self) -> Result<()> {
        self.backend().await.map(|_| ())
    }

    pub(crate) async fn backend(&self) -> Result<&Arc<dyn StorageBackend>> {
        self.backend
            .get_or_try_init(|| async {
                let path = self.path.clone().ok_or_else(|| {
                    CacheError::Initialization("no database path configured".to_string())
                })?;
                let location = path.display().to_string();
                let backend = tokio::task::spawn_blocking(move || RedbBackend::open(&path))
                    .await?
                    .map_err(|e| CacheError::Initialization(format!("{}: {}", location, e)))?;
                info!(path = %location, "Cache store initialized");
                Ok::<_, CacheError>(Arc::new(backend) as Arc<dyn StorageBackend>)
            })
            .await
    }

    /// Run a backend call on the blocking pool. redb transactions commit with
    /// an fsync and must stay off the async workers.
    async fn with_backend_blocking<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn StorageBackend) -> Result<T> + Send + 'static,
    {
        let backend = Arc::clone(self.backend().await?);
        tokio::task::spawn_blocking(move || op(backend.as_ref())).await?
    }

    pub async fn get(&self, table: Table, key: &str) -> Result<Option<CacheRecord>> {
        let key = key.to_string();
        match self
            .with_backend_blocking(move |b| b.get(table, &key))
            .await?
        {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    pub async fn put(&self, table: Table, key: &str, record: &CacheRecord) -> Result<()> {
        let bytes = serde_json::to_vec(record)?;
        let key = key.to_string();
        self.with_backend_blocking(move |b| b.put(table, &key, &bytes))
            .await
    }

    /// Delete `key`. Deleting an absent key is not an error; the result says
    /// whether anything was removed.
    pub async fn delete(&self, table: Table, key: &str) -> Result<bool> {
        let key = key.to_string();
        self.with_backend_blocking(move |b| b.delete(table, &key))
            .await
    }

    /// Every raw key in `table`, whether or not its value decodes.
    pub async fn keys(&self, table: Table) -> Result<Vec<String>> {
        let entries = self.with_backend_blocking(move |b| b.entries(table)).await?;
        Ok(entries.into_iter().map(|(key, _)| key).collect())
    }

    /// Snapshot of every record in `table`. Entries that fail to decode are
    /// logged and left out.
    pub async fn get_all(&self, table: Table) -> Result<Vec<StoredRecord>> {
        let entries = self.with_backend_blocking(move |b| b.entries(table)).await?;
        let mut records = Vec::with_capacity(entries.len());
        for (key, bytes) in entries {
            match serde_json::from_slice::<CacheRecord>(&bytes) {
                Ok(record) => records.push(StoredRecord { key, record }),
                Err(e) => warn!(table = %table, key = %key, error = %e, "Skipping undecodable cache record"),
            }
        }
        Ok(records)
    }

    pub async fn count(&self, table: Table) -> Result<u64> {
        self.with_backend_blocking(move |b| b.count(table)).await
    }

    /// Empty every table. The summary counts records in the two record
    /// tables; metadata is emptied but not counted.
    pub async fn clear(&self) -> Result<ClearSummary> {
        let (deleted_count, metadata) = self
            .with_backend_blocking(|b| {
                let mut deleted_count = 0;
                for table in Table::RECORDS {
                    deleted_count += b.clear(table)?;
                }
                Ok((deleted_count, b.clear(Table::Metadata)?))
            })
            .await?;
        debug!(records = deleted_count, metadata, "Cleared cache tables");

        Ok(ClearSummary {
            was_empty: deleted_count == 0,
            deleted_count,
        })
    }

    pub async fn get_metadata(&self, key: &str) -> Result<Option<Value>> {
        let key = key.to_string();
        match self
            .with_backend_blocking(move |b| b.get(Table::Metadata, &key))
            .await?
        {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    pub async fn put_metadata(&self, key: &str, value: &Value) -> Result<()> {
        let bytes = serde_json::to_vec(value)?;
        let key = key.to_string();
        self.with_backend_blocking(move |b| b.put(Table::Metadata, &key, &bytes))
            .await
    }
}
