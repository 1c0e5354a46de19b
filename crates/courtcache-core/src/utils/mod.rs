//! Utility functions for display formatting.

pub mod format;

// Re-export commonly used functions at module level
pub use format::{format_age, format_bytes, format_stat, format_time_period, truncate_string};
