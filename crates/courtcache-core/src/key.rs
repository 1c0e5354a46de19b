//! Composite cache keys.
//!
//! Both record tables are keyed by strings that pack several logical
//! dimensions together. Callers build keys through the structured types in
//! this module; the string form only exists at the storage boundary and is
//! byte-compatible with data written by earlier releases:
//!
//! - predictions: `2024-01-01` or `2024-01-01|models:xgboost|lightgbm`
//! - model performance: `30|points|xgboost,lightgbm` (always three fields)
//!
//! Model lists are kept in caller order. `[a, b]` and `[b, a]` are distinct
//! keys.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::KeyError;

/// Separates the base date from the model list in prediction keys.
pub const MODELS_MARKER: &str = "|models:";

/// Joins models inside a prediction key suffix.
pub const PREDICTION_MODEL_SEPARATOR: &str = "|";

/// Joins the three top-level fields of a model performance key.
pub const FIELD_SEPARATOR: &str = "|";

/// Joins models inside a model performance key.
pub const MODEL_LIST_SEPARATOR: &str = ",";

/// Date format used by prediction keys. Always zero padded, which is what
/// makes lexicographic comparison of base dates equal to date order.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

fn check_field(field: &'static str, value: &str, reserved: &[&'static str]) -> Result<(), KeyError> {
    if value.is_empty() {
        return Err(KeyError::Empty(field));
    }
    for &separator in reserved {
        if value.contains(separator) {
            return Err(KeyError::ReservedSeparator {
                field,
                value: value.to_string(),
                separator,
            });
        }
    }
    Ok(())
}

// ============================================================================
// Prediction keys
// ============================================================================

/// Key of a cached prediction: a calendar date plus an optional model subset.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PredictionKey {
    pub date: String,
    pub models: Vec<String>,
}

impl PredictionKey {
    /// Build a key for `date` and the given models, in the given order.
    pub fn for_date<S: AsRef<str>>(date: NaiveDate, models: &[S]) -> Result<Self, KeyError> {
        let models = models
            .iter()
            .map(|m| {
                let m = m.as_ref();
                check_field("model", m, &[PREDICTION_MODEL_SEPARATOR])?;
                Ok(m.to_string())
            })
            .collect::<Result<Vec<_>, KeyError>>()?;

        Ok(Self {
            date: date.format(DATE_FORMAT).to_string(),
            models,
        })
    }

    /// Parse a stored key. Never fails: whatever precedes the models marker is
    /// the base date, whatever follows it is the model list.
    pub fn parse(key: &str) -> Self {
        let (date, suffix) = split_prediction_key(key);
        let models = suffix
            .filter(|s| !s.is_empty())
            .map(|s| s.split(PREDICTION_MODEL_SEPARATOR).map(str::to_string).collect())
            .unwrap_or_default();
        Self {
            date: date.to_string(),
            models,
        }
    }

    pub fn encode(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for PredictionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.models.is_empty() {
            write!(f, "{}", self.date)
        } else {
            write!(
                f,
                "{}{}{}",
                self.date,
                MODELS_MARKER,
                self.models.join(PREDICTION_MODEL_SEPARATOR)
            )
        }
    }
}

/// Split a raw prediction key into its base date and the raw model suffix.
///
/// Splits on the first models marker only.
pub fn split_prediction_key(key: &str) -> (&str, Option<&str>) {
    match key.split_once(MODELS_MARKER) {
        Some((date, models)) => (date, Some(models)),
        None => (key, None),
    }
}

/// Base date of a raw prediction key, ignoring any model suffix.
pub fn prediction_base_date(key: &str) -> &str {
    split_prediction_key(key).0
}

/// Number of models encoded in a raw model suffix. An empty suffix holds none.
pub fn model_count(suffix: Option<&str>) -> usize {
    suffix
        .filter(|s| !s.is_empty())
        .map(|s| s.split(PREDICTION_MODEL_SEPARATOR).count())
        .unwrap_or(0)
}

// ============================================================================
// Model performance keys
// ============================================================================

/// Time window a model performance summary was computed over.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum TimePeriod {
    /// The last N days.
    Days(u32),
    /// The whole history.
    All,
    /// A stored value this release does not recognize, kept verbatim.
    Other(String),
}

impl TimePeriod {
    /// Ordering rank: day counts by value, then `all`, then unrecognized values.
    pub fn sort_rank(&self) -> (u8, u32) {
        match self {
            TimePeriod::Days(days) => (0, *days),
            TimePeriod::All => (1, 0),
            TimePeriod::Other(_) => (2, 0),
        }
    }
}

impl fmt::Display for TimePeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimePeriod::Days(days) => write!(f, "{}", days),
            TimePeriod::All => write!(f, "all"),
            TimePeriod::Other(raw) => write!(f, "{}", raw),
        }
    }
}

impl FromStr for TimePeriod {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "all" {
            return Ok(TimePeriod::All);
        }
        match s.parse::<u32>() {
            Ok(days) => Ok(TimePeriod::Days(days)),
            Err(_) => Ok(TimePeriod::Other(s.to_string())),
        }
    }
}

impl From<String> for TimePeriod {
    fn from(s: String) -> Self {
        match s.parse() {
            Ok(period) => period,
            Err(never) => match never {},
        }
    }
}

impl From<TimePeriod> for String {
    fn from(period: TimePeriod) -> Self {
        period.to_string()
    }
}

/// Key of a cached model performance summary.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModelPerfKey {
    pub time_period: TimePeriod,
    pub stat: String,
    pub models: Vec<String>,
}

impl ModelPerfKey {
    pub fn new<S: AsRef<str>>(
        time_period: TimePeriod,
        stat: &str,
        models: &[S],
    ) -> Result<Self, KeyError> {
        if let TimePeriod::Other(raw) = &time_period {
            check_field("time period", raw, &[FIELD_SEPARATOR])?;
        }
        check_field("stat", stat, &[FIELD_SEPARATOR])?;
        let models = models
            .iter()
            .map(|m| {
                let m = m.as_ref();
                check_field("model", m, &[FIELD_SEPARATOR, MODEL_LIST_SEPARATOR])?;
                Ok(m.to_string())
            })
            .collect::<Result<Vec<_>, KeyError>>()?;

        Ok(Self {
            time_period,
            stat: stat.to_string(),
            models,
        })
    }

    /// Decode a stored key. Returns `None` unless the key has exactly three
    /// `|`-separated fields.
    pub fn decode(key: &str) -> Option<Self> {
        let parts: Vec<&str> = key.split(FIELD_SEPARATOR).collect();
        let [time_period, stat, models] = parts.as_slice() else {
            return None;
        };

        let models = if models.is_empty() {
            Vec::new()
        } else {
            models.split(MODEL_LIST_SEPARATOR).map(str::to_string).collect()
        };

        Some(Self {
            time_period: TimePeriod::from((*time_period).to_string()),
            stat: (*stat).to_string(),
            models,
        })
    }

    pub fn encode(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ModelPerfKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{sep}{}{sep}{}",
            self.time_period,
            self.stat,
            self.models.join(MODEL_LIST_SEPARATOR),
            sep = FIELD_SEPARATOR
        )
    }
}
