//! Display-ready views over cache contents.
//!
//! Everything here is a pure transform of store snapshots: raw prediction
//! records are folded into one group per date, rows are sorted by a
//! selectable column, and selections map back to the raw keys to delete.
//! Nothing in this module writes to the store except the explicit
//! `EntryBrowser::delete_selected_*` actions.

pub mod browser;
pub mod entry;
pub mod group;
pub mod selection;
pub mod sort;

pub use browser::EntryBrowser;
pub use entry::{EntryKind, ModelPerformanceEntry, PredictionEntry};
pub use group::{days_ago, group_predictions, parse_entry_date, PredictionGroup};
pub use selection::{selected_original_keys, Selection};
pub use sort::{
    sort_model_performance, sort_prediction_groups, ModelPerfSortField, PredictionSortField,
    SortDirection, SortState,
};
