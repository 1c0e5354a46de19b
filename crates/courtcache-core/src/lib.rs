//! Local cache engine for daily predictions and model performance summaries.
//!
//! This crate provides:
//! - `CacheManager`: the engine, constructed once and shared by reference
//! - `key`: the composite key formats of the two record tables
//! - `retention`: age-based cleanup of cached predictions
//! - `aggregate`: grouped, sortable, selectable views for cache management
//!
//! The cache is never a source of truth. Every read degrades to a miss when
//! the store is unavailable.

pub mod aggregate;
pub mod cache;
pub mod config;
pub mod error;
pub mod key;
pub mod retention;
pub mod utils;

pub use aggregate::EntryBrowser;
pub use cache::{CacheManager, CacheRecord, Store, Table};
pub use config::Config;
pub use error::{CacheError, KeyError, Result};
pub use key::{ModelPerfKey, PredictionKey, TimePeriod};
pub use retention::{CleanupReport, RetentionSetting};
