//! Weekly and monthly volume commands

use crate::cli::OutputFormat;
use crate::config::Settings;
use crate::error::Result;
use crate::query::{self, VolumeStatus};

use super::{print_json, truncate};

fn status_marker(status: VolumeStatus) -> &'static str {
    match status {
        VolumeStatus::BelowFloor => "LOW",
        VolumeStatus::Marginal => "OK",
        VolumeStatus::Adequate => "GOOD",
    }
}

/// Weekly volume report
pub async fn weekly(settings: Settings, year: Option<i32>, format: OutputFormat) -> Result<()> {
    let store = settings.cache_file().load()?;
    let thresholds = settings.thresholds;
    let weeks = query::weekly_summary(&store, year, &thresholds);

    if format.is_json() {
        return print_json(&weeks);
    }

    if weeks.is_empty() {
        println!("No runs found.");
        return Ok(());
    }

    println!(
        "{:<10} {:>4} {:>10} {:>6} {:<6} Dates",
        "Week", "Runs", "Distance", "HR", "Status"
    );
    println!("{}", "-".repeat(70));

    for week in &weeks {
        let hr = week
            .avg_heart_rate
            .map(|h| h.to_string())
            .unwrap_or_else(|| "-".to_string());
        let dates: Vec<String> = week.dates.iter().map(|d| d.format("%m-%d").to_string()).collect();
        println!(
            "{:<10} {:>4} {:>7.1} km {:>6} {:<6} {}",
            week.week_key,
            week.run_count,
            week.total_distance_km,
            hr,
            status_marker(week.status),
            truncate(&dates.join(", "), 30)
        );
    }

    let below = weeks.iter().filter(|w| w.status == VolumeStatus::BelowFloor).count();
    println!();
    println!(
        "{} weeks, {} below the {:.0} km floor",
        weeks.len(),
        below,
        thresholds.floor_km
    );
    println!(
        "Current streak (weeks >= {:.0} km): {}",
        thresholds.floor_km,
        query::current_streak(&weeks, &thresholds)
    );
    Ok(())
}

/// Monthly volume report
pub async fn monthly(settings: Settings, format: OutputFormat) -> Result<()> {
    let store = settings.cache_file().load()?;
    let months = query::monthly_summary(&store, &settings.thresholds);

    if format.is_json() {
        return print_json(&months);
    }

    if months.is_empty() {
        println!("No runs found.");
        return Ok(());
    }

    println!(
        "{:<8} {:>4} {:>10} {:>10} {:<6}",
        "Month", "Runs", "Distance", "Per week", "Status"
    );
    println!("{}", "-".repeat(45));
    for month in &months {
        println!(
            "{:<8} {:>4} {:>7.1} km {:>7.1} km {:<6}",
            month.month_key,
            month.run_count,
            month.total_distance_km,
            month.avg_km_per_week,
            status_marker(month.status)
        );
    }
    Ok(())
}
