use anyhow::{Context, Result};
use std::path::PathBuf;

use fillrate::models::TRAVEL_DATE_FORMAT;
use fillrate::storage::open_store;
use fillrate::utils::truncate_text;

use super::load_config;

pub async fn snapshot(config: Option<PathBuf>, sqlite: Option<PathBuf>, limit: usize) -> Result<()> {
    let mut config = load_config(config.as_deref())?;
    if sqlite.is_some() {
        config.database.sqlite_path = sqlite;
    }

    let store = open_store(&config.database).context("Failed to open snapshot store")?;
    store
        .ensure_schema()
        .await
        .context("Failed to prepare snapshot table")?;
    let rows = store.load().await.context("Failed to read snapshot")?;

    println!("Snapshot ({})", store.describe());
    println!("========================");
    if rows.is_empty() {
        println!("(empty)");
        return Ok(());
    }

    println!(
        "{:<32} {:<12} {:>5} {:>9} {:>9} {:>8}",
        "Route", "Date", "Buses", "Capacity", "Available", "Fill %"
    );
    for row in rows.iter().take(limit) {
        println!(
            "{:<32} {:<12} {:>5} {:>9} {:>9} {:>8.2}",
            truncate_text(&row.route_name, 32),
            row.travel_date.format(TRAVEL_DATE_FORMAT),
            row.bus_count,
            row.total_capacity,
            row.available_seats,
            row.fill_rate_percent
        );
    }
    if rows.len() > limit {
        println!("... {} more rows", rows.len() - limit);
    }

    Ok(())
}
