use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use super::entry::ModelPerformanceEntry;
use super::group::PredictionGroup;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortDirection {
    pub fn flipped(self) -> Self {
        match self {
            SortDirection::Ascending => SortDirection::Descending,
            SortDirection::Descending => SortDirection::Ascending,
        }
    }

    /// Orient an ascending comparison.
    pub fn apply(self, ordering: Ordering) -> Ordering {
        match self {
            SortDirection::Ascending => ordering,
            SortDirection::Descending => ordering.reverse(),
        }
    }
}

/// Sortable prediction group columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PredictionSortField {
    Date,
    Type,
    Size,
    CachedAt,
    DaysAgo,
}

impl PredictionSortField {
    pub fn compare(&self, a: &PredictionGroup, b: &PredictionGroup) -> Ordering {
        match self {
            PredictionSortField::Date => a.base_date.cmp(&b.base_date),
            PredictionSortField::Type => a.kind.as_str().cmp(b.kind.as_str()),
            PredictionSortField::Size => a.total_size.cmp(&b.total_size),
            PredictionSortField::CachedAt => a.cached_at.cmp(&b.cached_at),
            PredictionSortField::DaysAgo => a.days_ago.cmp(&b.days_ago),
        }
    }
}

/// Sortable model performance columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ModelPerfSortField {
    TimePeriod,
    Stat,
    Models,
    Size,
    CachedAt,
}

impl ModelPerfSortField {
    pub fn compare(&self, a: &ModelPerformanceEntry, b: &ModelPerformanceEntry) -> Ordering {
        match self {
            ModelPerfSortField::TimePeriod => {
                a.time_period.sort_rank().cmp(&b.time_period.sort_rank())
            }
            ModelPerfSortField::Stat => a.stat.cmp(&b.stat),
            // Count only; which models doesn't matter
            ModelPerfSortField::Models => a.models.len().cmp(&b.models.len()),
            ModelPerfSortField::Size => a.size.cmp(&b.size),
            ModelPerfSortField::CachedAt => a.cached_at.cmp(&b.cached_at),
        }
    }
}

/// Current sort column and direction for one table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortState<F> {
    pub field: F,
    pub direction: SortDirection,
}

impl<F: Copy + PartialEq> SortState<F> {
    pub fn new(field: F) -> Self {
        Self {
            field,
            direction: SortDirection::Descending,
        }
    }

    /// Select `field`. Re-selecting the current field flips the direction;
    /// a different field starts out descending.
    pub fn toggle(&mut self, field: F) {
        if self.field == field {
            self.direction = self.direction.flipped();
        } else {
            self.field = field;
            self.direction = SortDirection::Descending;
        }
    }
}

impl Default for SortState<PredictionSortField> {
    fn default() -> Self {
        Self::new(PredictionSortField::Date)
    }
}

impl Default for SortState<ModelPerfSortField> {
    fn default() -> Self {
        Self::new(ModelPerfSortField::CachedAt)
    }
}

pub fn sort_prediction_groups(groups: &mut [PredictionGroup], state: &SortState<PredictionSortField>) {
    groups.sort_by(|a, b| state.direction.apply(state.field.compare(a, b)));
}

pub fn sort_model_performance(
    entries: &mut [ModelPerformanceEntry],
    state: &SortState<ModelPerfSortField>,
) {
    entries.sort_by(|a, b| state.direction.apply(state.field.compare(a, b)));
}
