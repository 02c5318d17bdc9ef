//! Fill-rate metrics and per-run summaries

pub mod fill_rate;

pub use fill_rate::{compute, FillMetrics, FillRateError, DEFAULT_BUS_CAPACITY};

use serde::Serialize;
use std::collections::BTreeMap;

use crate::models::ScrapeResult;

/// Per-route aggregate over all dates of a run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteSummary {
    pub route_name: String,
    pub dates: usize,
    pub buses: u32,
    pub mean_fill_rate: f64,
    pub max_fill_rate: f64,
}

/// Summarize results by route, sorted by route name
pub fn summarize(results: &[ScrapeResult]) -> Vec<RouteSummary> {
    let mut by_route: BTreeMap<&str, Vec<&ScrapeResult>> = BTreeMap::new();
    for result in results {
        by_route.entry(&result.route_name).or_default().push(result);
    }

    by_route
        .into_iter()
        .map(|(name, rows)| {
            let total: f64 = rows.iter().map(|r| r.fill_rate_percent).sum();
            let max = rows
                .iter()
                .map(|r| r.fill_rate_percent)
                .fold(f64::MIN, f64::max);
            RouteSummary {
                route_name: name.to_string(),
                dates: rows.len(),
                buses: rows.iter().map(|r| r.bus_count).sum(),
                mean_fill_rate: (total / rows.len() as f64 * 100.0).round() / 100.0,
                max_fill_rate: max,
            }
        })
        .collect()
}
