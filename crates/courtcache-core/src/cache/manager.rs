use std::path::PathBuf;

use chrono::{Days, NaiveDate};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use super::backend::Table;
use super::store::{CacheRecord, ClearSummary, Store};
use crate::aggregate::{ModelPerformanceEntry, PredictionEntry};
use crate::error::Result;
use crate::key::{ModelPerfKey, PredictionKey};
use crate::retention::{self, CleanupReport, RetentionSetting};
use crate::utils::format_bytes;

/// Predictions for dates this many days back or more no longer change
/// upstream.
const CACHEABLE_AFTER_DAYS: u64 = 2;

/// Aggregate size of the record tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct StorageUsage {
    pub total_bytes: u64,
    pub item_count: u64,
    pub formatted_size: String,
}

impl Default for StorageUsage {
    fn default() -> Self {
        Self {
            total_bytes: 0,
            item_count: 0,
            formatted_size: format_bytes(0),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct CacheCounts {
    pub predictions: u64,
    pub model_performance: u64,
}

/// Everything the management view shows in its header.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct CacheStats {
    pub usage: StorageUsage,
    pub counts: CacheCounts,
}

/// Result of deleting one key in a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    /// Nothing was stored under the key.
    Absent,
    Failed(String),
}

/// Per-key results of a best-effort batch delete.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchDeleteReport {
    pub outcomes: Vec<(String, DeleteOutcome)>,
}

impl BatchDeleteReport {
    pub fn deleted_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| *o == DeleteOutcome::Deleted)
            .count()
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &str)> {
        self.outcomes.iter().filter_map(|(key, outcome)| match outcome {
            DeleteOutcome::Failed(reason) => Some((key.as_str(), reason.as_str())),
            _ => None,
        })
    }

    pub fn is_success(&self) -> bool {
        self.failures().next().is_none()
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }
}

/// Whether predictions for `date` are final and safe to cache: the date must
/// be more than two days before `today`.
pub fn is_cacheable_date(date: NaiveDate, today: NaiveDate) -> bool {
    match today.checked_sub_days(Days::new(CACHEABLE_AFTER_DAYS)) {
        Some(threshold) => date < threshold,
        None => false,
    }
}

/// The cache engine.
///
/// Constructed once by the application and shared by reference. Reads never
/// fail: a broken cache behaves like an empty one. Explicit deletions report
/// errors so the caller can tell the user.
pub struct CacheManager {
    store: Store,
}

impl CacheManager {
    /// Engine over a redb database at `db_path`, opened on first use.
    pub fn new(db_path: PathBuf) -> Self {
        Self {
            store: Store::new(db_path),
        }
    }

    pub fn with_store(store: Store) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub async fn init(&self) -> Result<()> {
        self.store.init().await.inspect_err(|e| {
            error!(error = %e, "Failed to initialize cache");
        })
    }

    // ===== Typed load/save =====

    async fn load<T: DeserializeOwned>(&self, table: Table, key: &str) -> Option<T> {
        let record = match self.store.get(table, key).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                debug!(table = %table, key = %key, "Cache miss");
                return None;
            }
            Err(e) => {
                error!(table = %table, key = %key, error = %e, "Failed to read cache");
                return None;
            }
        };

        match serde_json::from_value(record.data) {
            Ok(data) => {
                info!(table = %table, key = %key, "Cache hit");
                Some(data)
            }
            Err(e) => {
                warn!(table = %table, key = %key, error = %e, "Cached data has unexpected shape");
                None
            }
        }
    }

    async fn save<T: Serialize>(&self, table: Table, key: &str, data: &T) {
        let record = match CacheRecord::from_data(data) {
            Ok(record) => record,
            Err(e) => {
                error!(table = %table, key = %key, error = %e, "Failed to serialize cache data");
                return;
            }
        };
        match self.store.put(table, key, &record).await {
            Ok(()) => info!(
                table = %table,
                key = %key,
                size = %format_bytes(record.size),
                "Cached data"
            ),
            Err(e) => error!(table = %table, key = %key, error = %e, "Failed to write cache"),
        }
    }

    // ===== Predictions =====

    pub async fn load_predictions<T: DeserializeOwned>(&self, key: &PredictionKey) -> Option<T> {
        self.load(Table::Predictions, &key.encode()).await
    }

    pub async fn save_predictions<T: Serialize>(&self, key: &PredictionKey, data: &T) {
        self.save(Table::Predictions, &key.encode(), data).await
    }

    // ===== Model Performance =====

    pub async fn load_model_performance<T: DeserializeOwned>(&self, key: &ModelPerfKey) -> Option<T> {
        self.load(Table::ModelPerformance, &key.encode()).await
    }

    pub async fn save_model_performance<T: Serialize>(&self, key: &ModelPerfKey, data: &T) {
        self.save(Table::ModelPerformance, &key.encode(), data).await
    }

    // ===== Accounting =====

    pub async fn storage_usage(&self) -> StorageUsage {
        let mut total_bytes = 0;
        let mut item_count = 0;
        for table in Table::RECORDS {
            // Undecodable records add no bytes but still count as items
            let usage = async {
                let bytes = self
                    .store
                    .get_all(table)
                    .await?
                    .iter()
                    .map(|r| r.record.size)
                    .sum::<u64>();
                Ok::<_, crate::error::CacheError>((bytes, self.store.count(table).await?))
            };
            match usage.await {
                Ok((bytes, count)) => {
                    total_bytes += bytes;
                    item_count += count;
                }
                Err(e) => {
                    error!(table = %table, error = %e, "Failed to calculate storage usage");
                    return StorageUsage::default();
                }
            }
        }

        StorageUsage {
            total_bytes,
            item_count,
            formatted_size: format_bytes(total_bytes),
        }
    }

    pub async fn cache_counts(&self) -> CacheCounts {
        let counts = async {
            Ok::<_, crate::error::CacheError>(CacheCounts {
                predictions: self.store.count(Table::Predictions).await?,
                model_performance: self.store.count(Table::ModelPerformance).await?,
            })
        };
        counts.await.unwrap_or_else(|e| {
            error!(error = %e, "Failed to get cache counts");
            CacheCounts::default()
        })
    }

    pub async fn stats(&self) -> CacheStats {
        CacheStats {
            usage: self.storage_usage().await,
            counts: self.cache_counts().await,
        }
    }

    // ===== Listing =====

    pub async fn all_cache_entries(&self) -> Vec<PredictionEntry> {
        match self.store.get_all(Table::Predictions).await {
            Ok(records) => records.iter().map(PredictionEntry::from_stored).collect(),
            Err(e) => {
                error!(error = %e, "Failed to get all cache entries");
                Vec::new()
            }
        }
    }

    pub async fn all_model_performance_entries(&self) -> Vec<ModelPerformanceEntry> {
        match self.store.get_all(Table::ModelPerformance).await {
            Ok(records) => records
                .iter()
                .filter_map(|stored| {
                    let entry = ModelPerformanceEntry::from_stored(stored);
                    if entry.is_none() {
                        debug!(key = %stored.key, "Skipping undecodable model performance key");
                    }
                    entry
                })
                .collect(),
            Err(e) => {
                error!(error = %e, "Failed to get model performance cache entries");
                Vec::new()
            }
        }
    }

    // ===== Deletion =====

    async fn delete_batch(&self, table: Table, keys: &[String]) -> Result<BatchDeleteReport> {
        // Fail the whole call only if the store can't be reached at all
        self.store.init().await.inspect_err(|e| {
            error!(table = %table, error = %e, "Failed to delete cache entries");
        })?;

        let mut report = BatchDeleteReport::default();
        for key in keys {
            let outcome = match self.store.delete(table, key).await {
                Ok(true) => {
                    info!(table = %table, key = %key, "Deleted cache entry");
                    DeleteOutcome::Deleted
                }
                Ok(false) => {
                    warn!(table = %table, key = %key, "Cache entry not found");
                    DeleteOutcome::Absent
                }
                Err(e) => {
                    warn!(table = %table, key = %key, error = %e, "Failed to delete cache entry");
                    DeleteOutcome::Failed(e.to_string())
                }
            };
            report.outcomes.push((key.clone(), outcome));
        }

        info!(
            table = %table,
            requested = keys.len(),
            deleted = report.deleted_count(),
            "Deleted cache entries"
        );
        Ok(report)
    }

    /// Delete prediction records by raw key.
    pub async fn delete_entries(&self, keys: &[String]) -> Result<BatchDeleteReport> {
        self.delete_batch(Table::Predictions, keys).await
    }

    /// Delete model performance records by raw key.
    pub async fn delete_model_performance_entries(&self, keys: &[String]) -> Result<BatchDeleteReport> {
        self.delete_batch(Table::ModelPerformance, keys).await
    }

    pub async fn clear_all(&self) -> Result<ClearSummary> {
        let summary = self.store.clear().await.inspect_err(|e| {
            error!(error = %e, "Failed to clear cache");
        })?;
        if summary.was_empty {
            debug!("Cache was already empty");
        } else {
            info!(deleted = summary.deleted_count, "Cache cleared");
        }
        Ok(summary)
    }

    // ===== Retention =====

    pub async fn cleanup(&self, setting: RetentionSetting) -> CleanupReport {
        self.cleanup_as_of(setting, retention::local_today()).await
    }

    pub async fn cleanup_as_of(&self, setting: RetentionSetting, today: NaiveDate) -> CleanupReport {
        retention::sweep(&self.store, setting, today).await
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::backend::test_support::StuckKeyBackend;
    use crate::cache::backend::RedbBackend;
    use crate::key::TimePeriod;
    use serde_json::json;
    use std::sync::Arc;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn temp_manager() -> (tempfile::TempDir, CacheManager) {
        let dir = tempfile::tempdir().unwrap();
        let manager = CacheManager::new(dir.path().join("cache.redb"));
        (dir, manager)
    }

    #[test]
    fn test_is_cacheable_date() {
        let today = ymd(2024, 3, 10);
        assert!(is_cacheable_date(ymd(2024, 3, 7), today));
        assert!(!is_cacheable_date(ymd(2024, 3, 8), today));
        assert!(!is_cacheable_date(today, today));
    }

    #[tokio::test]
    async fn test_save_and_load_predictions() {
        let (_dir, manager) = temp_manager();
        let key = PredictionKey::for_date(ymd(2024, 1, 1), &["xgboost"]).unwrap();
        manager.save_predictions(&key, &vec![1, 2, 3]).await;

        let loaded: Option<Vec<i32>> = manager.load_predictions(&key).await;
        assert_eq!(loaded, Some(vec![1, 2, 3]));

        let other = PredictionKey::for_date::<&str>(ymd(2024, 1, 1), &[]).unwrap();
        assert_eq!(manager.load_predictions::<Vec<i32>>(&other).await, None);
    }

    #[tokio::test]
    async fn test_load_with_wrong_shape_is_miss() {
        let (_dir, manager) = temp_manager();
        let key = ModelPerfKey::new(TimePeriod::Days(30), "points", &["xgboost"]).unwrap();
        manager.save_model_performance(&key, &json!({"accuracy": 0.61})).await;
        assert_eq!(manager.load_model_performance::<Vec<String>>(&key).await, None);
    }

    #[tokio::test]
    async fn test_reads_on_broken_store_return_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let manager = CacheManager::new(dir.path().to_path_buf());
        assert_eq!(manager.storage_usage().await, StorageUsage::default());
        assert_eq!(manager.cache_counts().await, CacheCounts::default());
        assert!(manager.all_cache_entries().await.is_empty());
        let key = PredictionKey::for_date::<&str>(ymd(2024, 1, 1), &[]).unwrap();
        assert_eq!(manager.load_predictions::<i32>(&key).await, None);
        assert!(manager.delete_entries(&["2024-01-01".to_string()]).await.is_err());
        assert!(manager.clear_all().await.is_err());
    }

    #[tokio::test]
    async fn test_storage_usage_empty_and_sized() {
        let (_dir, manager) = temp_manager();
        let usage = manager.storage_usage().await;
        assert_eq!((usage.total_bytes, usage.item_count), (0, 0));
        assert_eq!(usage.formatted_size, "0 B");

        // A JSON string payload serializes with two quote bytes
        let payload = json!("x".repeat(2046));
        manager
            .store()
            .put(Table::Predictions, "2024-01-01", &CacheRecord::new(payload))
            .await
            .unwrap();

        let usage = manager.storage_usage().await;
        assert_eq!(usage.total_bytes, 2048);
        assert_eq!(usage.item_count, 1);
        assert_eq!(usage.formatted_size, "2.0 KB");
    }

    #[tokio::test]
    async fn test_counts_span_both_tables() {
        let (_dir, manager) = temp_manager();
        let day = PredictionKey::for_date::<&str>(ymd(2024, 1, 1), &[]).unwrap();
        let perf = ModelPerfKey::new(TimePeriod::All, "points", &["xgboost"]).unwrap();
        manager.save_predictions(&day, &json!(1)).await;
        manager.save_model_performance(&perf, &json!(2)).await;
        manager.store().put_metadata("version", &json!(2)).await.unwrap();

        assert_eq!(
            manager.cache_counts().await,
            CacheCounts {
                predictions: 1,
                model_performance: 1
            }
        );
        assert_eq!(manager.storage_usage().await.item_count, 2);
    }

    #[tokio::test]
    async fn test_usage_item_count_includes_undecodable_records() {
        let (_dir, manager) = temp_manager();
        manager
            .store()
            .put(Table::Predictions, "2024-01-01", &CacheRecord::new(json!("abc")))
            .await
            .unwrap();
        manager
            .store()
            .backend()
            .await
            .unwrap()
            .put(Table::Predictions, "2024-01-02", b"not json")
            .unwrap();

        let usage = manager.storage_usage().await;
        assert_eq!(usage.total_bytes, 5);
        assert_eq!(usage.item_count, 2);
        assert_eq!(manager.cache_counts().await.predictions, usage.item_count);
    }

    #[tokio::test]
    async fn test_model_performance_listing_skips_undecodable_keys() {
        let (_dir, manager) = temp_manager();
        for key in ["30|points|xgboost,lightgbm", "broken-key", "30|points"] {
            manager
                .store()
                .put(Table::ModelPerformance, key, &CacheRecord::new(json!(1)))
                .await
                .unwrap();
        }

        let entries = manager.all_model_performance_entries().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].cache_key, "30|points|xgboost,lightgbm");
        assert_eq!(entries[0].models, vec!["xgboost", "lightgbm"]);
    }

    #[tokio::test]
    async fn test_delete_entries_reports_per_key() {
        let (_dir, manager) = temp_manager();
        manager
            .store()
            .put(Table::Predictions, "2024-01-01", &CacheRecord::new(json!(1)))
            .await
            .unwrap();

        let keys = vec!["2024-01-01".to_string(), "2024-01-02".to_string()];
        let report = manager.delete_entries(&keys).await.unwrap();
        assert_eq!(
            report.outcomes,
            vec![
                ("2024-01-01".to_string(), DeleteOutcome::Deleted),
                ("2024-01-02".to_string(), DeleteOutcome::Absent),
            ]
        );
        assert!(report.is_success());

        // Retrying is harmless
        let again = manager.delete_entries(&keys).await.unwrap();
        assert_eq!(again.deleted_count(), 0);
        assert!(again.is_success());
    }

    #[tokio::test]
    async fn test_failed_key_does_not_abort_batch() {
        let dir = tempfile::tempdir().unwrap();
        let backend = StuckKeyBackend::new(
            RedbBackend::open(dir.path().join("cache.redb")).unwrap(),
            "2024-01-02",
        );
        let manager = CacheManager::with_store(Store::with_backend(Arc::new(backend)));
        for key in ["2024-01-01", "2024-01-02", "2024-01-03"] {
            manager
                .store()
                .put(Table::Predictions, key, &CacheRecord::new(json!(1)))
                .await
                .unwrap();
        }

        let keys: Vec<String> = ["2024-01-01", "2024-01-02", "2024-01-03"]
            .iter()
            .map(|k| k.to_string())
            .collect();
        let report = manager.delete_entries(&keys).await.unwrap();

        assert_eq!(report.deleted_count(), 2);
        assert!(!report.is_success());
        let failures: Vec<&str> = report.failures().map(|(k, _)| k).collect();
        assert_eq!(failures, vec!["2024-01-02"]);
        assert_eq!(manager.cache_counts().await.predictions, 1);
    }

    #[tokio::test]
    async fn test_model_performance_deletion_leaves_predictions() {
        let (_dir, manager) = temp_manager();
        let perf = ModelPerfKey::new(TimePeriod::Days(7), "assists", &["xgboost"]).unwrap();
        let day = PredictionKey::for_date::<&str>(ymd(2024, 1, 1), &[]).unwrap();
        manager.save_model_performance(&perf, &json!(1)).await;
        manager.save_predictions(&day, &json!(1)).await;

        let report = manager
            .delete_model_performance_entries(&[perf.encode()])
            .await
            .unwrap();
        assert_eq!(report.deleted_count(), 1);
        assert_eq!(
            manager.cache_counts().await,
            CacheCounts {
                predictions: 1,
                model_performance: 0
            }
        );
    }

    #[tokio::test]
    async fn test_clear_all() {
        let (_dir, manager) = temp_manager();
        assert!(manager.clear_all().await.unwrap().was_empty);

        let day = PredictionKey::for_date::<&str>(ymd(2024, 1, 1), &[]).unwrap();
        manager.save_predictions(&day, &json!(1)).await;
        let summary = manager.clear_all().await.unwrap();
        assert_eq!(summary.deleted_count, 1);
        assert_eq!(manager.storage_usage().await.total_bytes, 0);
    }

    #[tokio::test]
    async fn test_cleanup_delegates_to_retention_sweep() {
        let (_dir, manager) = temp_manager();
        let today = ymd(2024, 3, 20);
        for date in [ymd(2024, 3, 10), ymd(2024, 3, 17), ymd(2024, 3, 19)] {
            let key = PredictionKey::for_date::<&str>(date, &[]).unwrap();
            manager.save_predictions(&key, &json!(1)).await;
        }

        let report = manager.cleanup_as_of(RetentionSetting::Days(7), today).await;
        assert_eq!(report.deleted, 1);
        let remaining: Vec<String> = manager
            .all_cache_entries()
            .await
            .into_iter()
            .map(|e| e.key)
            .collect();
        assert!(!remaining.contains(&"2024-03-10".to_string()));
        assert_eq!(remaining.len(), 2);

        assert_eq!(
            manager.cleanup_as_of(RetentionSetting::All, ymd(2030, 1, 1)).await.deleted,
            0
        );
    }
}
