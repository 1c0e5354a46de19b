use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cache::StoredRecord;
use crate::key::{split_prediction_key, ModelPerfKey, TimePeriod};

/// Kind of cached data an entry holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub enum EntryKind {
    Prediction,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Prediction => "prediction",
        }
    }
}

/// One raw prediction record, as listed for management.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct PredictionEntry {
    /// Raw store key.
    pub key: String,
    pub kind: EntryKind,
    pub size: u64,
    pub cached_at: DateTime<Utc>,
    /// Raw model suffix of the key, if any.
    pub models: Option<String>,
}

impl PredictionEntry {
    pub fn from_stored(stored: &StoredRecord) -> Self {
        let (_, models) = split_prediction_key(&stored.key);
        Self {
            key: stored.key.clone(),
            kind: EntryKind::Prediction,
            size: stored.record.size,
            cached_at: stored.record.cached_at,
            models: models.map(str::to_string),
        }
    }
}

/// One decoded model performance record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct ModelPerformanceEntry {
    /// Raw store key, also the selection key.
    pub cache_key: String,
    #[cfg_attr(feature = "ts", ts(type = "string"))]
    pub time_period: TimePeriod,
    pub stat: String,
    pub models: Vec<String>,
    pub size: u64,
    pub cached_at: DateTime<Utc>,
}

impl ModelPerformanceEntry {
    /// Decode a stored record. Keys without exactly three fields yield `None`.
    pub fn from_stored(stored: &StoredRecord) -> Option<Self> {
        let key = ModelPerfKey::decode(&stored.key)?;
        Some(Self {
            cache_key: stored.key.clone(),
            time_period: key.time_period,
            stat: key.stat,
            models: key.models,
            size: stored.record.size,
            cached_at: stored.record.cached_at,
        })
    }
}
