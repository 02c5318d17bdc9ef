// Core data structures for the fill-rate scraper

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::analytics::fill_rate::FillMetrics;

/// Date format used in listing URLs and the backup file (e.g. `01-Jan-2024`)
pub const TRAVEL_DATE_FORMAT: &str = "%d-%b-%Y";

/// One row of the route list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    /// Display name, e.g. "City A–City B"
    pub name: String,
    /// Listing URL carrying `onward=` / `doj=` date parameters
    pub url: String,
}

impl Route {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }
}

/// One (route, travel date) unit of work
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteTask {
    pub route_name: String,
    pub base_url: String,
    pub travel_date: NaiveDate,
}

impl RouteTask {
    pub fn new(route: &Route, travel_date: NaiveDate) -> Self {
        Self {
            route_name: route.name.clone(),
            base_url: route.url.clone(),
            travel_date,
        }
    }

    /// Cross product of routes and dates, route-major
    pub fn expand(routes: &[Route], dates: &[NaiveDate]) -> Vec<Self> {
        routes
            .iter()
            .flat_map(|route| dates.iter().map(move |date| Self::new(route, *date)))
            .collect()
    }

    /// Travel date as it appears in URLs
    pub fn date_label(&self) -> String {
        self.travel_date.format(TRAVEL_DATE_FORMAT).to_string()
    }
}

/// Fill-rate measurement for one route and travel date
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapeResult {
    pub route_name: String,
    #[serde(with = "travel_date_format")]
    pub travel_date: NaiveDate,
    pub route_url: String,
    pub bus_count: u32,
    pub total_capacity: u32,
    pub available_seats: u32,
    pub filled_seats: u32,
    pub fill_rate_percent: f64,
    pub scraped_at: DateTime<Utc>,
}

impl ScrapeResult {
    /// Assemble a result from computed metrics
    pub fn from_metrics(
        task: &RouteTask,
        route_url: String,
        bus_count: u32,
        metrics: FillMetrics,
        scraped_at: DateTime<Utc>,
    ) -> Self {
        Self {
            route_name: task.route_name.clone(),
            travel_date: task.travel_date,
            route_url,
            bus_count,
            total_capacity: metrics.total_capacity,
            available_seats: metrics.available_seats,
            filled_seats: metrics.filled_seats,
            fill_rate_percent: metrics.fill_rate_percent,
            scraped_at,
        }
    }
}

/// Serde adapter for `DD-Mon-YYYY` travel dates
pub mod travel_date_format {
    use super::TRAVEL_DATE_FORMAT;
    use chrono::NaiveDate;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(date: &NaiveDate, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&date.format(TRAVEL_DATE_FORMAT).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveDate, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        NaiveDate::parse_from_str(&s, TRAVEL_DATE_FORMAT).map_err(serde::de::Error::custom)
    }
}
