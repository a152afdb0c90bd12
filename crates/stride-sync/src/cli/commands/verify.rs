//! Data-integrity verification command

use chrono::Utc;
use serde_json::json;

use crate::cli::OutputFormat;
use crate::config::Settings;
use crate::error::Result;
use crate::integrity::{self, IntegrityStats};

use super::print_json;

fn percent(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        100.0 * part as f64 / total as f64
    }
}

fn print_stats(stats: &IntegrityStats) {
    println!("Total activities: {}", stats.total);
    for (source, count) in &stats.by_source {
        println!("  {:<10} {}", source.as_str(), count);
    }
    println!();
    println!("Primary activities: {}", stats.primary_count);
    if let Some(range) = stats.primary_date_range {
        println!("  Date range: {} to {}", range.first, range.last);
    }
    println!(
        "  With HR:           {} / {} ({:.1}%)",
        stats.with_hr,
        stats.total,
        percent(stats.with_hr, stats.total)
    );
    println!(
        "  With split HR:     {} / {} ({:.1}%)",
        stats.with_splits_hr,
        stats.total,
        percent(stats.with_splits_hr, stats.total)
    );
    println!();
    println!("Long runs (>= {:.0} km): {}", integrity::LONG_RUN_KM, stats.long_runs_total);
    println!("  With HR:       {}", stats.long_runs_with_hr);
    println!("  With split HR: {}", stats.long_runs_with_splits_hr);
}

/// Compare the cache with the saved baseline; returns `false` when issues were found
///
/// With `save_baseline` the current state becomes the new baseline instead.
pub async fn verify(settings: Settings, save_baseline: bool, format: OutputFormat) -> Result<bool> {
    let store = settings.cache_file().load()?;
    let stats = IntegrityStats::analyze(&store);
    let baseline_path = settings.baseline_path();

    if save_baseline {
        let baseline = integrity::save_baseline(&baseline_path, &stats, Utc::now())?;
        if format.is_json() {
            print_json(&baseline)?;
        } else {
            print_stats(&stats);
            println!("\nBaseline saved: {}", baseline_path.display());
        }
        return Ok(true);
    }

    let baseline = integrity::load_baseline(&baseline_path)?;
    let issues = baseline
        .as_ref()
        .map(|b| integrity::compare(&stats, &b.stats))
        .unwrap_or_default();

    if format.is_json() {
        print_json(&json!({
            "stats": stats,
            "baseline": baseline,
            "issues": issues.iter().map(|i| i.to_string()).collect::<Vec<_>>(),
        }))?;
        return Ok(issues.is_empty());
    }

    print_stats(&stats);
    println!();
    match &baseline {
        None => println!("No baseline yet. Run 'stride verify --baseline' to save one."),
        Some(b) if issues.is_empty() => {
            println!("No regressions since baseline of {}", b.timestamp.format("%Y-%m-%d %H:%M UTC"));
        }
        Some(b) => {
            println!(
                "Regressions since baseline of {}:",
                b.timestamp.format("%Y-%m-%d %H:%M UTC")
            );
            for issue in &issues {
                println!("  {}", issue);
            }
        }
    }
    Ok(issues.is_empty())
}
