//! Common test utilities

use chrono::{NaiveDate, TimeZone, Utc};
use fillrate::models::ScrapeResult;

/// Result for `route` on 2025-03-`day` with the given seat counts
pub fn scrape_result(route: &str, day: u32, bus_count: u32, available: u32) -> ScrapeResult {
    let total = bus_count * 36;
    let filled = total - available;
    ScrapeResult {
        route_name: route.to_string(),
        travel_date: NaiveDate::from_ymd_opt(2025, 3, day).unwrap(),
        route_url: format!("https://www.redbus.in/bus-tickets/{route}?onward={day:02}-Mar-2025"),
        bus_count,
        total_capacity: total,
        available_seats: available,
        filled_seats: filled,
        fill_rate_percent: (f64::from(filled) / f64::from(total) * 10_000.0).round() / 100.0,
        scraped_at: Utc.with_ymd_and_hms(2025, 3, 9, 23, 15, 0).unwrap(),
    }
}

/// Snapshot of `n` rows spread over two routes
#[allow(dead_code)]
pub fn snapshot_rows(n: u32) -> Vec<ScrapeResult> {
    (0..n)
        .map(|i| {
            let route = if i % 2 == 0 { "north-line" } else { "south-line" };
            scrape_result(route, 1 + i, 2, i % 72)
        })
        .collect()
}
