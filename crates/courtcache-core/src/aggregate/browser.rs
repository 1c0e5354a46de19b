use chrono::NaiveDate;
use tracing::info;

use super::entry::ModelPerformanceEntry;
use super::group::{group_predictions, PredictionGroup};
use super::selection::{selected_original_keys, Selection};
use super::sort::{
    sort_model_performance, sort_prediction_groups, ModelPerfSortField, PredictionSortField,
    SortState,
};
use crate::cache::{BatchDeleteReport, CacheManager, CacheStats};
use crate::error::Result;
use crate::retention::local_today;

/// State behind the cache management screen: the displayed rows, how they
/// are sorted, what is selected, and the latest totals.
#[derive(Debug, Clone, Default)]
pub struct EntryBrowser {
    pub predictions: Vec<PredictionGroup>,
    pub model_performance: Vec<ModelPerformanceEntry>,
    pub prediction_sort: SortState<PredictionSortField>,
    pub model_perf_sort: SortState<ModelPerfSortField>,
    pub selected_predictions: Selection,
    pub selected_model_perf: Selection,
    pub stats: CacheStats,
}

impl EntryBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reload rows and totals from the cache.
    pub async fn refresh(&mut self, manager: &CacheManager) {
        self.refresh_as_of(manager, local_today()).await
    }

    pub async fn refresh_as_of(&mut self, manager: &CacheManager, today: NaiveDate) {
        let entries = manager.all_cache_entries().await;
        self.predictions = group_predictions(&entries, today);
        self.model_performance = manager.all_model_performance_entries().await;
        self.stats = manager.stats().await;
    }

    // =========================================================================
    // Sorted views
    // =========================================================================

    pub fn sorted_predictions(&self) -> Vec<PredictionGroup> {
        let mut sorted = self.predictions.clone();
        sort_prediction_groups(&mut sorted, &self.prediction_sort);
        sorted
    }

    pub fn sorted_model_performance(&self) -> Vec<ModelPerformanceEntry> {
        let mut sorted = self.model_performance.clone();
        sort_model_performance(&mut sorted, &self.model_perf_sort);
        sorted
    }

    pub fn toggle_prediction_sort(&mut self, field: PredictionSortField) {
        self.prediction_sort.toggle(field);
    }

    pub fn toggle_model_perf_sort(&mut self, field: ModelPerfSortField) {
        self.model_perf_sort.toggle(field);
    }

    // =========================================================================
    // Selection
    // =========================================================================

    pub fn toggle_prediction(&mut self, base_date: &str) {
        self.selected_predictions.toggle(base_date);
    }

    pub fn toggle_all_predictions(&mut self) {
        self.selected_predictions
            .toggle_all(self.predictions.iter().map(|g| g.base_date.as_str()));
    }

    pub fn toggle_model_perf(&mut self, cache_key: &str) {
        self.selected_model_perf.toggle(cache_key);
    }

    pub fn toggle_all_model_perf(&mut self) {
        self.selected_model_perf
            .toggle_all(self.model_performance.iter().map(|e| e.cache_key.as_str()));
    }

    pub fn all_predictions_selected(&self) -> bool {
        self.selected_predictions.is_all_selected(self.predictions.len())
    }

    pub fn all_model_perf_selected(&self) -> bool {
        self.selected_model_perf.is_all_selected(self.model_performance.len())
    }

    // =========================================================================
    // Totals
    // =========================================================================

    pub fn total_size(&self) -> u64 {
        self.predictions.iter().map(|g| g.total_size).sum::<u64>()
            + self.model_performance.iter().map(|e| e.size).sum::<u64>()
    }

    pub fn selected_prediction_size(&self) -> u64 {
        self.predictions
            .iter()
            .filter(|g| self.selected_predictions.contains(&g.base_date))
            .map(|g| g.total_size)
            .sum()
    }

    pub fn selected_model_perf_size(&self) -> u64 {
        self.model_performance
            .iter()
            .filter(|e| self.selected_model_perf.contains(&e.cache_key))
            .map(|e| e.size)
            .sum()
    }

    // =========================================================================
    // Deletion
    // =========================================================================

    /// Delete every record behind the selected prediction groups.
    ///
    /// The selection is cleared and the view refreshed only once the whole
    /// batch has run. If the store is unreachable the selection is kept.
    pub async fn delete_selected_predictions(
        &mut self,
        manager: &CacheManager,
    ) -> Result<BatchDeleteReport> {
        if self.selected_predictions.is_empty() {
            return Ok(BatchDeleteReport::default());
        }

        let keys = selected_original_keys(&self.predictions, &self.selected_predictions);
        let dates = self.selected_predictions.len();
        let report = manager.delete_entries(&keys).await?;
        info!(dates, entries = keys.len(), "Deleted selected prediction dates");

        self.selected_predictions.clear();
        self.refresh(manager).await;
        Ok(report)
    }

    pub async fn delete_selected_model_perf(
        &mut self,
        manager: &CacheManager,
    ) -> Result<BatchDeleteReport> {
        if self.selected_model_perf.is_empty() {
            return Ok(BatchDeleteReport::default());
        }

        let keys: Vec<String> = self.selected_model_perf.keys().map(str::to_string).collect();
        let report = manager.delete_model_performance_entries(&keys).await?;

        self.selected_model_perf.clear();
        self.refresh(manager).await;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::sort::SortDirection;
    use crate::cache::{CacheRecord, Table};
    use serde_json::json;

    async fn seeded() -> (tempfile::TempDir, CacheManager) {
        let dir = tempfile::tempdir().unwrap();
        let manager = CacheManager::new(dir.path().join("cache.redb"));
        let predictions = [
            ("2024-01-01", 100),
            ("2024-01-01|models:xgboost|lightgbm", 200),
            ("2024-01-02", 50),
            ("2024-01-03|models:xgboost", 400),
        ];
        for (key, len) in predictions {
            let record = CacheRecord::new(json!("p".repeat(len - 2)));
            manager.store().put(Table::Predictions, key, &record).await.unwrap();
        }
        for key in ["30|points|xgboost", "all|overall|xgboost,lightgbm", "bad"] {
            let record = CacheRecord::new(json!(1));
            manager.store().put(Table::ModelPerformance, key, &record).await.unwrap();
        }
        (dir, manager)
    }

    #[tokio::test]
    async fn test_refresh_groups_and_counts() {
        let (_dir, manager) = seeded().await;
        let mut browser = EntryBrowser::new();
        browser
            .refresh_as_of(&manager, NaiveDate::from_ymd_opt(2024, 1, 5).unwrap())
            .await;

        assert_eq!(browser.predictions.len(), 3);
        assert_eq!(browser.model_performance.len(), 2);
        assert_eq!(browser.stats.counts.predictions, 4);
        assert_eq!(browser.stats.counts.model_performance, 3);
        assert_eq!(browser.total_size(), 752);

        let sorted = browser.sorted_predictions();
        assert_eq!(sorted[0].base_date, "2024-01-03");
        assert_eq!(sorted[2].base_date, "2024-01-01");
        assert_eq!(sorted[2].total_size, 300);
        assert_eq!(sorted[2].days_ago, 4);
    }

    #[tokio::test]
    async fn test_sort_toggle_through_browser() {
        let (_dir, manager) = seeded().await;
        let mut browser = EntryBrowser::new();
        browser.refresh(&manager).await;

        browser.toggle_prediction_sort(PredictionSortField::Size);
        assert_eq!(browser.prediction_sort.direction, SortDirection::Descending);
        assert_eq!(browser.sorted_predictions()[0].total_size, 400);

        browser.toggle_prediction_sort(PredictionSortField::Size);
        assert_eq!(browser.prediction_sort.field, PredictionSortField::Size);
        assert_eq!(browser.sorted_predictions()[0].total_size, 50);
    }

    #[tokio::test]
    async fn test_delete_selected_group_removes_all_its_keys_only() {
        let (_dir, manager) = seeded().await;
        let mut browser = EntryBrowser::new();
        browser.refresh(&manager).await;

        browser.toggle_prediction("2024-01-01");
        assert_eq!(browser.selected_prediction_size(), 300);

        let report = browser.delete_selected_predictions(&manager).await.unwrap();
        assert_eq!(report.deleted_count(), 2);
        assert!(browser.selected_predictions.is_empty());

        let mut remaining: Vec<String> = manager
            .all_cache_entries()
            .await
            .into_iter()
            .map(|e| e.key)
            .collect();
        remaining.sort();
        assert_eq!(remaining, vec!["2024-01-02", "2024-01-03|models:xgboost"]);
        assert_eq!(browser.predictions.len(), 2);
        assert_eq!(browser.stats.counts.predictions, 2);
    }

    #[tokio::test]
    async fn test_select_all_predictions_then_clear() {
        let (_dir, manager) = seeded().await;
        let mut browser = EntryBrowser::new();
        browser.refresh(&manager).await;

        browser.toggle_prediction("2024-01-02");
        assert!(!browser.all_predictions_selected());

        browser.toggle_all_predictions();
        assert!(browser.all_predictions_selected());
        assert_eq!(browser.selected_predictions.len(), 3);
        assert_eq!(browser.selected_prediction_size(), 750);

        browser.toggle_all_predictions();
        assert!(!browser.all_predictions_selected());
        assert!(browser.selected_predictions.is_empty());
        assert_eq!(browser.selected_prediction_size(), 0);
    }

    #[tokio::test]
    async fn test_select_all_and_delete_model_perf() {
        let (_dir, manager) = seeded().await;
        let mut browser = EntryBrowser::new();
        browser.refresh(&manager).await;

        browser.toggle_all_model_perf();
        assert!(browser.all_model_perf_selected());
        assert_eq!(browser.selected_model_perf_size(), 2);

        let report = browser.delete_selected_model_perf(&manager).await.unwrap();
        assert_eq!(report.deleted_count(), 2);
        assert!(browser.model_performance.is_empty());
        // The undecodable key is never displayed, so it is never selected
        assert_eq!(browser.stats.counts.model_performance, 1);
    }

    #[tokio::test]
    async fn test_delete_with_empty_selection_is_noop() {
        let (_dir, manager) = seeded().await;
        let mut browser = EntryBrowser::new();
        browser.refresh(&manager).await;
        let report = browser.delete_selected_predictions(&manager).await.unwrap();
        assert!(report.is_empty());
        assert_eq!(manager.cache_counts().await.predictions, 4);
    }
}
