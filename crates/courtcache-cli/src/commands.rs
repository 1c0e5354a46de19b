//! Subcommand handlers.

use std::path::Path;

use anyhow::{bail, Context, Result};
use chrono::{NaiveDate, Utc};
use tracing::warn;

use courtcache_core::aggregate::{SortDirection, SortState};
use courtcache_core::cache::{is_cacheable_date, BatchDeleteReport};
use courtcache_core::retention::{local_today, RETENTION_CHOICES};
use courtcache_core::utils::{
    format_age, format_bytes, format_stat, format_time_period, truncate_string,
};
use courtcache_core::{
    CacheManager, CacheRecord, Config, EntryBrowser, PredictionKey, RetentionSetting, Table,
};

use crate::{ListTable, RetentionAction};

/// Widest the models column gets before truncation
const MODELS_COLUMN_WIDTH: usize = 32;

fn direction(asc: bool) -> SortDirection {
    if asc {
        SortDirection::Ascending
    } else {
        SortDirection::Descending
    }
}

pub async fn usage(manager: &CacheManager) -> Result<()> {
    let stats = manager.stats().await;
    println!(
        "Storage: {} in {} entries",
        stats.usage.formatted_size, stats.usage.item_count
    );
    println!("  predictions:       {}", stats.counts.predictions);
    println!("  model performance: {}", stats.counts.model_performance);
    Ok(())
}

pub async fn list(manager: &CacheManager, table: ListTable) -> Result<()> {
    let mut browser = EntryBrowser::new();
    browser.refresh(manager).await;
    let now = Utc::now();

    match table {
        ListTable::Predictions { sort, asc } => {
            browser.prediction_sort = SortState {
                field: sort.into(),
                direction: direction(asc),
            };
            let groups = browser.sorted_predictions();
            if groups.is_empty() {
                println!("No cached predictions");
                return Ok(());
            }

            println!(
                "{:<12} {:>7} {:>10} {:>10} {:>9}",
                "DATE", "MODELS", "SIZE", "CACHED", "DAYS AGO"
            );
            for group in &groups {
                println!(
                    "{:<12} {:>7} {:>10} {:>10} {:>9}",
                    group.base_date,
                    group.model_combinations,
                    format_bytes(group.total_size),
                    format_age(group.cached_at, now),
                    group.days_ago,
                );
            }
            println!(
                "{} dates, {}",
                groups.len(),
                format_bytes(groups.iter().map(|g| g.total_size).sum())
            );
        }
        ListTable::ModelPerformance { sort, asc } => {
            browser.model_perf_sort = SortState {
                field: sort.into(),
                direction: direction(asc),
            };
            let entries = browser.sorted_model_performance();
            if entries.is_empty() {
                println!("No cached model performance data");
                return Ok(());
            }

            println!(
                "{:<14} {:<20} {:<32} {:>10} {:>10}",
                "PERIOD", "STAT", "MODELS", "SIZE", "CACHED"
            );
            for entry in &entries {
                println!(
                    "{:<14} {:<20} {:<32} {:>10} {:>10}",
                    format_time_period(&entry.time_period),
                    format_stat(&entry.stat),
                    truncate_string(&entry.models.join(", "), MODELS_COLUMN_WIDTH),
                    format_bytes(entry.size),
                    format_age(entry.cached_at, now),
                );
                println!("  key: {}", entry.cache_key);
            }
        }
    }
    Ok(())
}

pub async fn cleanup(manager: &CacheManager, setting: RetentionSetting) -> Result<()> {
    let report = manager.cleanup(setting).await;
    match report.cutoff {
        Some(cutoff) => {
            println!(
                "Removed {} of {} predictions dated before {}",
                report.deleted, report.examined, cutoff
            );
            if report.failed > 0 {
                println!("{} entries could not be removed (see log)", report.failed);
            }
        }
        None => println!("Retention is '{}': nothing expires", setting),
    }
    Ok(())
}

/// Show or update retention. Returns the new prediction retention when it
/// changed, so the caller can apply it right away.
pub fn retention(config: &mut Config, action: &RetentionAction) -> Result<Option<RetentionSetting>> {
    match action {
        RetentionAction::Show => {
            println!("predictions:       {}", config.retention());
            println!("model performance: {}", config.model_performance_retention());
            Ok(None)
        }
        RetentionAction::Set {
            model_performance,
            value,
        } => {
            if let RetentionSetting::Days(days) = value {
                if !RETENTION_CHOICES.contains(days) {
                    bail!(
                        "Unsupported retention of {} days (choose from {:?}, all or off)",
                        days,
                        RETENTION_CHOICES
                    );
                }
            }
            if *model_performance {
                config.set_model_performance_retention(*value);
            } else {
                config.set_retention(*value);
            }
            config.save().context("Failed to save configuration")?;
            println!("Retention set to {}", value);
            Ok((!*model_performance).then_some(*value))
        }
    }
}

fn print_failures(report: &BatchDeleteReport) {
    for (key, reason) in report.failures() {
        eprintln!("  failed: {} ({})", key, reason);
    }
}

pub async fn delete_dates(manager: &CacheManager, dates: &[String]) -> Result<()> {
    let mut browser = EntryBrowser::new();
    browser.refresh(manager).await;

    for date in dates {
        if browser.predictions.iter().any(|g| &g.base_date == date) {
            if !browser.selected_predictions.contains(date) {
                browser.toggle_prediction(date);
            }
        } else {
            println!("No cached predictions for {}", date);
        }
    }

    let size = browser.selected_prediction_size();
    let report = browser.delete_selected_predictions(manager).await?;
    println!(
        "Deleted {} entries ({})",
        report.deleted_count(),
        format_bytes(size)
    );
    print_failures(&report);
    Ok(())
}

pub async fn delete_model_perf(manager: &CacheManager, keys: &[String]) -> Result<()> {
    let mut browser = EntryBrowser::new();
    browser.refresh(manager).await;

    for key in keys {
        if browser.model_performance.iter().any(|e| &e.cache_key == key) {
            if !browser.selected_model_perf.contains(key) {
                browser.toggle_model_perf(key);
            }
        } else {
            println!("No cached model performance entry for {}", key);
        }
    }

    let size = browser.selected_model_perf_size();
    let report = browser.delete_selected_model_perf(manager).await?;
    println!(
        "Deleted {} entries ({})",
        report.deleted_count(),
        format_bytes(size)
    );
    print_failures(&report);
    Ok(())
}

pub async fn clear(manager: &CacheManager) -> Result<()> {
    let summary = manager.clear_all().await?;
    if summary.was_empty {
        println!("Cache was already empty");
    } else {
        println!("Cleared {} entries", summary.deleted_count);
    }
    Ok(())
}

pub async fn get(manager: &CacheManager, date: NaiveDate, models: &[String]) -> Result<()> {
    let key = PredictionKey::for_date(date, models)?;
    match manager.load_predictions::<serde_json::Value>(&key).await {
        Some(data) => println!("{}", serde_json::to_string_pretty(&data)?),
        None => println!("No cached predictions for {}", key),
    }
    Ok(())
}

pub async fn put(
    manager: &CacheManager,
    date: NaiveDate,
    file: &Path,
    models: &[String],
) -> Result<()> {
    let key = PredictionKey::for_date(date, models)?;
    if !is_cacheable_date(date, local_today()) {
        warn!(date = %date, "Predictions this recent may still change");
    }

    let contents = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let data: serde_json::Value = serde_json::from_str(&contents)
        .with_context(|| format!("{} is not valid JSON", file.display()))?;

    // Explicit writes report failures instead of going through the silent save path
    let record = CacheRecord::new(data);
    manager
        .store()
        .put(Table::Predictions, &key.encode(), &record)
        .await
        .with_context(|| format!("Failed to cache predictions under {}", key))?;
    println!(
        "Cached predictions under {} ({})",
        key,
        format_bytes(record.size)
    );
    Ok(())
}
