use std::collections::HashMap;

use chrono::{DateTime, Days, Local, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use super::entry::{EntryKind, PredictionEntry};
use crate::key::{model_count, prediction_base_date};

/// Formats tried, in order, when a base date is not `year-month-day`.
const FALLBACK_DATE_FORMATS: [&str; 3] = ["%Y/%m/%d", "%m/%d/%Y", "%b %d, %Y"];
const FALLBACK_DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"];

/// All prediction records sharing a base date, folded into one display row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct PredictionGroup {
    /// Display and selection key.
    pub base_date: String,
    pub kind: EntryKind,
    pub total_size: u64,
    /// Most recent write in the group.
    pub cached_at: DateTime<Utc>,
    /// Largest model subset cached for this date.
    pub model_combinations: usize,
    /// Every raw store key folded into this group.
    pub original_keys: Vec<String>,
    pub days_ago: i64,
}

/// Group raw prediction entries by base date, keeping first-seen order.
pub fn group_predictions(entries: &[PredictionEntry], today: NaiveDate) -> Vec<PredictionGroup> {
    let mut groups: Vec<PredictionGroup> = Vec::new();
    let mut index: HashMap<(String, EntryKind), usize> = HashMap::new();

    for entry in entries {
        let base_date = prediction_base_date(&entry.key);
        let models = model_count(entry.models.as_deref());

        match index.get(&(base_date.to_string(), entry.kind)) {
            Some(&i) => {
                let group = &mut groups[i];
                group.total_size += entry.size;
                group.cached_at = group.cached_at.max(entry.cached_at);
                group.model_combinations = group.model_combinations.max(models);
                group.original_keys.push(entry.key.clone());
            }
            None => {
                index.insert((base_date.to_string(), entry.kind), groups.len());
                groups.push(PredictionGroup {
                    base_date: base_date.to_string(),
                    kind: entry.kind,
                    total_size: entry.size,
                    cached_at: entry.cached_at,
                    model_combinations: models,
                    original_keys: vec![entry.key.clone()],
                    days_ago: days_ago(base_date, today),
                });
            }
        }
    }

    groups
}

/// Whole days between `base_date` and `today`.
///
/// Unparseable dates count as today.
pub fn days_ago(base_date: &str, today: NaiveDate) -> i64 {
    let date = parse_entry_date(base_date).unwrap_or(today);
    (today - date).num_days()
}

/// Parse a base date, preferring `year-month-day` integer components.
pub fn parse_entry_date(raw: &str) -> Option<NaiveDate> {
    parse_components(raw).or_else(|| parse_generic(raw))
}

fn parse_components(raw: &str) -> Option<NaiveDate> {
    let parts: Vec<&str> = raw.split('-').collect();
    let [year, month, day] = parts.as_slice() else {
        return None;
    };
    let year = year.trim().parse::<i64>().ok()?;
    let month = month.trim().parse::<i64>().ok()?;
    let day = day.trim().parse::<i64>().ok()?;
    rolled_over_date(year, month, day)
}

/// Calendar date with out-of-range months and days carried into the
/// neighbouring month or year, so `2024-02-30` is March 1st.
fn rolled_over_date(year: i64, month: i64, day: i64) -> Option<NaiveDate> {
    let months_from_january = month.checked_sub(1)?;
    let year = year.checked_add(months_from_january.div_euclid(12))?;
    let month = u32::try_from(months_from_january.rem_euclid(12)).ok()? + 1;
    let first = NaiveDate::from_ymd_opt(i32::try_from(year).ok()?, month, 1)?;

    let offset = day.checked_sub(1)?;
    if offset >= 0 {
        first.checked_add_days(Days::new(offset.unsigned_abs()))
    } else {
        first.checked_sub_days(Days::new(offset.unsigned_abs()))
    }
}

fn parse_generic(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Local).date_naive());
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some(dt.with_timezone(&Local).date_naive());
    }
    FALLBACK_DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|dt| dt.date())
        .or_else(|| {
            FALLBACK_DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
        })
}
