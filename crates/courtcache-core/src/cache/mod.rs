//! Local persistent cache for computed predictions.
//!
//! This module provides the `CacheManager` for storing and retrieving
//! expensive, rarely-changing results in a local redb database. Records are
//! JSON payloads stamped with their write time and serialized size.
//!
//! Tables:
//! - `predictions`: daily predictions, optionally per model subset
//! - `model_performance`: model performance summaries
//! - `metadata`: opaque values, not interpreted by the cache

pub mod backend;
pub mod manager;
pub mod store;

pub use backend::{RedbBackend, StorageBackend, Table};
pub use manager::{
    is_cacheable_date, BatchDeleteReport, CacheCounts, CacheManager, CacheStats, DeleteOutcome,
    StorageUsage,
};
pub use store::{CacheRecord, ClearSummary, Store, StoredRecord};
