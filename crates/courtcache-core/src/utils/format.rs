use chrono::{DateTime, Utc};

use crate::key::TimePeriod;

/// Binary (1024-based) size units.
const SIZE_UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];

/// Format a byte count with one decimal digit in the largest fitting unit,
/// e.g. `12.3 KB`. Sizes beyond the last unit stay in that unit.
pub fn format_bytes(bytes: u64) -> String {
    if bytes == 0 {
        return "0 B".to_string();
    }

    let mut unit = 0;
    let mut divisor: u64 = 1;
    while unit + 1 < SIZE_UNITS.len() && bytes >= divisor * 1024 {
        divisor *= 1024;
        unit += 1;
    }
    format!("{:.1} {}", bytes as f64 / divisor as f64, SIZE_UNITS[unit])
}

/// Human label for a model performance window.
pub fn format_time_period(period: &TimePeriod) -> String {
    match period {
        TimePeriod::All => "All time".to_string(),
        TimePeriod::Days(days) => format!("Last {} days", days),
        TimePeriod::Other(raw) => raw.clone(),
    }
}

/// Human label for a statistic name; unknown names pass through.
pub fn format_stat(stat: &str) -> String {
    match stat {
        "points" => "Points",
        "rebounds" => "Rebounds",
        "assists" => "Assists",
        "steals" => "Steals",
        "blocks" => "Blocks",
        "turnovers" => "Turnovers",
        "threePointers" => "3-Pointers",
        "overall" => "Overall",
        other => other,
    }
    .to_string()
}

/// Relative age of a cache write, e.g. `5m ago`, `3h ago`, `2d ago`.
pub fn format_age(cached_at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let minutes = (now - cached_at).num_minutes();
    if minutes < 1 {
        // Also covers clock skew
        "just now".to_string()
    } else if minutes < 60 {
        format!("{}m ago", minutes)
    } else if minutes < 1440 {
        let hours = minutes / 60;
        if minutes % 60 >= 30 {
            format!("{}h ago", hours + 1)
        } else {
            format!("{}h ago", hours)
        }
    } else {
        let days = minutes / 1440;
        if (minutes % 1440) / 60 >= 12 {
            format!("{}d ago", days + 1)
        } else {
            format!("{}d ago", days)
        }
    }
}

/// Truncate a string to a maximum length, adding ellipsis if needed
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else if max_len <= 3 {
        s.chars().take(max_len).collect()
    } else {
        let truncated: String = s.chars().take(max_len - 3).collect();
        format!("{}...", truncated)
    }
}
