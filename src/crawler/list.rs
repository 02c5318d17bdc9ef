//! Route list loading
//!
//! Routes come from a CSV file with a `Route_name` and a `Route_link` column.
//! Other columns are ignored, blank rows are skipped, and every link must be
//! an absolute http(s) URL.

use serde::Deserialize;
use std::io::Read;
use std::path::Path;

use crate::models::Route;
use crate::utils::error::RouteListError;

/// Column holding the display name
pub const NAME_COLUMN: &str = "Route_name";

/// Column holding the search URL
pub const LINK_COLUMN: &str = "Route_link";

#[derive(Debug, Deserialize)]
struct RouteRow {
    #[serde(rename = "Route_name", default)]
    name: String,
    #[serde(rename = "Route_link", default)]
    link: String,
}

/// Load routes from a CSV file
///
/// # Errors
///
/// Returns `RouteListError` if the file is unreadable, lacks a required
/// column, or contains a row with an invalid URL.
pub fn load_routes(path: impl AsRef<Path>) -> Result<Vec<Route>, RouteListError> {
    let path = path.as_ref();
    let file = std::fs::File::open(path)?;
    let routes = read_routes(file)?;

    tracing::info!(path = %path.display(), routes = routes.len(), "Loaded route list");
    Ok(routes)
}

/// Parse routes from any CSV reader
pub fn read_routes<R: Read>(input: R) -> Result<Vec<Route>, RouteListError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(input);

    let headers = reader.headers()?.clone();
    for column in [NAME_COLUMN, LINK_COLUMN] {
        if !headers.iter().any(|h| h == column) {
            return Err(RouteListError::MissingColumn(column));
        }
    }

    let mut routes = Vec::new();
    for row in reader.deserialize::<RouteRow>() {
        let row = row?;
        if row.name.is_empty() && row.link.is_empty() {
            continue;
        }

        if !is_web_url(&row.link) {
            return Err(RouteListError::InvalidUrl {
                route: row.name,
                url: row.link,
            });
        }

        routes.push(Route::new(row.name, row.link));
    }

    Ok(routes)
}

fn is_web_url(link: &str) -> bool {
    url::Url::parse(link)
        .map(|u| matches!(u.scheme(), "http" | "https") && u.has_host())
        .unwrap_or(false)
}
