//! Age-based eviction of cached predictions.
//!
//! Only the predictions table is swept. Model performance summaries have a
//! retention setting of their own in [`Config`](crate::config::Config), but
//! nothing here acts on it.

use std::fmt;
use std::str::FromStr;

use chrono::{Days, Local, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::cache::{Store, Table};
use crate::key::{prediction_base_date, DATE_FORMAT};

/// Day counts offered to users.
pub const RETENTION_CHOICES: [u32; 6] = [7, 14, 30, 60, 90, 180];

/// Used when no valid setting has been stored.
pub const DEFAULT_RETENTION_DAYS: u32 = 30;

/// How long cached predictions are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum RetentionSetting {
    /// Delete predictions dated more than N days before today.
    Days(u32),
    /// Keep everything.
    All,
    /// Cleanup disabled.
    Off,
}

impl Default for RetentionSetting {
    fn default() -> Self {
        RetentionSetting::Days(DEFAULT_RETENTION_DAYS)
    }
}

impl RetentionSetting {
    /// Interpret a persisted value, falling back to the default for anything
    /// that is not `all`, `off` or one of [`RETENTION_CHOICES`].
    pub fn from_stored(stored: Option<&str>) -> Self {
        match stored.map(str::parse::<RetentionSetting>) {
            Some(Ok(RetentionSetting::Days(days))) if !RETENTION_CHOICES.contains(&days) => {
                Self::default()
            }
            Some(Ok(setting)) => setting,
            _ => Self::default(),
        }
    }

    /// Earliest base date kept for `today`, or `None` when nothing expires.
    pub fn cutoff(&self, today: NaiveDate) -> Option<String> {
        match self {
            RetentionSetting::Days(days) => today
                .checked_sub_days(Days::new(u64::from(*days)))
                .map(|date| date.format(DATE_FORMAT).to_string()),
            RetentionSetting::All | RetentionSetting::Off => None,
        }
    }
}

impl fmt::Display for RetentionSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetentionSetting::Days(days) => write!(f, "{}", days),
            RetentionSetting::All => write!(f, "all"),
            RetentionSetting::Off => write!(f, "off"),
        }
    }
}

impl FromStr for RetentionSetting {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "all" => Ok(RetentionSetting::All),
            "off" => Ok(RetentionSetting::Off),
            other => other
                .parse::<u32>()
                .map(RetentionSetting::Days)
                .map_err(|_| format!("invalid retention '{}': expected days, 'all' or 'off'", s)),
        }
    }
}

impl TryFrom<String> for RetentionSetting {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<RetentionSetting> for String {
    fn from(setting: RetentionSetting) -> Self {
        setting.to_string()
    }
}

/// What a cleanup pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// Base dates before this were deleted. `None` when no sweep ran.
    pub cutoff: Option<String>,
    pub examined: usize,
    pub deleted: usize,
    pub failed: usize,
}

/// Delete predictions whose base date is before the cutoff for `setting`
/// relative to `today`.
///
/// Never fails: errors are logged and the sweep moves on to the next record.
pub async fn sweep(store: &Store, setting: RetentionSetting, today: NaiveDate) -> CleanupReport {
    let Some(cutoff) = setting.cutoff(today) else {
        info!(retention = %setting, "Retention does not expire entries - skipping cleanup");
        return CleanupReport::default();
    };

    let mut report = CleanupReport {
        cutoff: Some(cutoff.clone()),
        ..CleanupReport::default()
    };

    // Expiry depends on the key alone, so undecodable values are swept too
    let keys = match store.keys(Table::Predictions).await {
        Ok(keys) => keys,
        Err(e) => {
            error!(error = %e, "Failed to read predictions for cleanup");
            return report;
        }
    };

    for key in keys {
        report.examined += 1;
        // Zero-padded ISO dates order lexicographically
        if prediction_base_date(&key) >= cutoff.as_str() {
            continue;
        }
        match store.delete(Table::Predictions, &key).await {
            Ok(_) => report.deleted += 1,
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to delete expired prediction");
                report.failed += 1;
            }
        }
    }

    if report.deleted > 0 {
        info!(
            deleted = report.deleted,
            cutoff = %cutoff,
            retention = %setting,
            "Cleaned up old cache entries"
        );
    }
    report
}

/// Today's date in the local time zone.
pub fn local_today() -> NaiveDate {
    Local::now().date_naive()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::backend::test_support::StuckKeyBackend;
    use crate::cache::{CacheRecord, RedbBackend};
    use serde_json::json;
    use std::sync::Arc;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn days_before(today: NaiveDate, days: u64) -> String {
        (today - Days::new(days)).format(DATE_FORMAT).to_string()
    }

    async fn seeded_store(today: NaiveDate) -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path().join("cache.redb"));
        for days in [10, 3, 1] {
            let key = days_before(today, days);
            store
                .put(Table::Predictions, &key, &CacheRecord::new(json!({"days": days})))
                .await
                .unwrap();
        }
        let with_models = format!("{}|models:xgboost|lightgbm", days_before(today, 10));
        store
            .put(Table::Predictions, &with_models, &CacheRecord::new(json!(0)))
            .await
            .unwrap();
        store
            .put(Table::ModelPerformance, "7|points|xgboost", &CacheRecord::new(json!(0)))
            .await
            .unwrap();
        (dir, store)
    }

    #[test]
    fn test_parse_and_display() {
        assert_eq!("all".parse::<RetentionSetting>().unwrap(), RetentionSetting::All);
        assert_eq!("off".parse::<RetentionSetting>().unwrap(), RetentionSetting::Off);
        assert_eq!("14".parse::<RetentionSetting>().unwrap(), RetentionSetting::Days(14));
        assert!("forever".parse::<RetentionSetting>().is_err());
        assert_eq!(RetentionSetting::Days(90).to_string(), "90");
    }

    #[test]
    fn test_from_stored_falls_back_to_default() {
        assert_eq!(RetentionSetting::from_stored(None), RetentionSetting::Days(30));
        assert_eq!(RetentionSetting::from_stored(Some("junk")), RetentionSetting::Days(30));
        assert_eq!(RetentionSetting::from_stored(Some("45")), RetentionSetting::Days(30));
        assert_eq!(RetentionSetting::from_stored(Some("180")), RetentionSetting::Days(180));
        assert_eq!(RetentionSetting::from_stored(Some("off")), RetentionSetting::Off);
    }

    #[test]
    fn test_cutoff_is_zero_padded_iso() {
        assert_eq!(
            RetentionSetting::Days(7).cutoff(ymd(2024, 3, 5)),
            Some("2024-02-27".to_string())
        );
        assert_eq!(
            RetentionSetting::Days(30).cutoff(ymd(2024, 1, 15)),
            Some("2023-12-16".to_string())
        );
        assert_eq!(RetentionSetting::All.cutoff(ymd(2024, 1, 15)), None);
        assert_eq!(RetentionSetting::Off.cutoff(ymd(2024, 1, 15)), None);
    }

    #[tokio::test]
    async fn test_sweep_removes_only_entries_before_cutoff() {
        let today = ymd(2024, 3, 5);
        let (_dir, store) = seeded_store(today).await;

        let report = sweep(&store, RetentionSetting::Days(7), today).await;
        assert_eq!(report.examined, 4);
        assert_eq!(report.deleted, 2);
        assert_eq!(report.failed, 0);

        let mut remaining: Vec<String> = store
            .get_all(Table::Predictions)
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.key)
            .collect();
        remaining.sort();
        assert_eq!(remaining, vec![days_before(today, 3), days_before(today, 1)]);
    }

    #[tokio::test]
    async fn test_sweep_never_touches_model_performance() {
        let today = ymd(2024, 3, 5);
        let (_dir, store) = seeded_store(today).await;
        sweep(&store, RetentionSetting::Days(7), today).await;
        assert_eq!(store.count(Table::ModelPerformance).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_sweep_all_and_off_keep_everything() {
        let today = ymd(2024, 3, 5);
        let (_dir, store) = seeded_store(today).await;

        for setting in [RetentionSetting::All, RetentionSetting::Off] {
            let report = sweep(&store, setting, today).await;
            assert_eq!(report, CleanupReport::default());
        }
        assert_eq!(store.count(Table::Predictions).await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_sweep_removes_expired_keys_with_undecodable_values() {
        let today = ymd(2024, 3, 5);
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path().join("cache.redb"));
        store
            .put(Table::Predictions, "2020-01-01", &CacheRecord::new(json!(1)))
            .await
            .unwrap();
        store
            .backend()
            .await
            .unwrap()
            .put(Table::Predictions, "2020-01-02", b"not json")
            .unwrap();

        let report = sweep(&store, RetentionSetting::Days(7), today).await;
        assert_eq!(report.examined, 2);
        assert_eq!(report.deleted, 2);
        assert!(store.keys(Table::Predictions).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sweep_continues_past_failed_delete() {
        let today = ymd(2024, 3, 5);
        let dir = tempfile::tempdir().unwrap();
        let stuck = "2024-01-02";
        let backend = StuckKeyBackend::new(
            RedbBackend::open(dir.path().join("cache.redb")).unwrap(),
            stuck,
        );
        let store = Store::with_backend(Arc::new(backend));
        for key in ["2024-01-01", stuck, "2024-01-03", "2024-03-04"] {
            store
                .put(Table::Predictions, key, &CacheRecord::new(json!(1)))
                .await
                .unwrap();
        }

        let report = sweep(&store, RetentionSetting::Days(7), today).await;
        assert_eq!(report.examined, 4);
        assert_eq!(report.deleted, 2);
        assert_eq!(report.failed, 1);

        let mut remaining = store.keys(Table::Predictions).await.unwrap();
        remaining.sort();
        assert_eq!(remaining, vec![stuck.to_string(), "2024-03-04".to_string()]);
    }

    #[tokio::test]
    async fn test_sweep_on_unavailable_store_does_not_fail() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path());
        let report = sweep(&store, RetentionSetting::Days(7), ymd(2024, 3, 5)).await;
        assert_eq!(report.examined, 0);
        assert_eq!(report.cutoff.as_deref(), Some("2024-02-27"));
    }
}
