//! Listing URL date rewriting and travel-date windows
//!
//! Listing URLs carry the travel date twice, as `onward=DD-Mon-YYYY` and
//! `doj=DD-Mon-YYYY`. Rewriting swaps only those two values.

use chrono::{Duration, NaiveDate};
use regex::{Captures, Regex};
use std::sync::OnceLock;

use crate::models::TRAVEL_DATE_FORMAT;

/// Query keys holding the travel date
pub const DATE_PARAMS: [&str; 2] = ["onward", "doj"];

fn date_param_re() -> &'static Regex {
    static DATE_PARAM_RE: OnceLock<Regex> = OnceLock::new();
    DATE_PARAM_RE.get_or_init(|| {
        Regex::new(r"([?&])(onward|doj)=\d{2}-[A-Za-z]{3}-\d{4}").expect("Invalid regex pattern")
    })
}

/// Point a template listing URL at `date`.
///
/// Only well-formed `onward=` and `doj=` query values are replaced; parameters
/// missing from the template are not added, and everything else is kept
/// byte for byte.
///
/// # Examples
///
/// ```
/// use chrono::NaiveDate;
/// use fillrate::crawler::url::rewrite_travel_date;
///
/// let url = "https://example.com/search?fromCityId=1&onward=01-Jan-2024&doj=01-Jan-2024";
/// let date = NaiveDate::from_ymd_opt(2024, 2, 15).unwrap();
/// assert_eq!(
///     rewrite_travel_date(url, date),
///     "https://example.com/search?fromCityId=1&onward=15-Feb-2024&doj=15-Feb-2024"
/// );
/// ```
pub fn rewrite_travel_date(url: &str, date: NaiveDate) -> String {
    let label = date.format(TRAVEL_DATE_FORMAT).to_string();
    date_param_re()
        .replace_all(url, |caps: &Captures| format!("{}{}={}", &caps[1], &caps[2], label))
        .into_owned()
}

/// Whether the template carries at least one rewritable date parameter
pub fn has_date_params(url: &str) -> bool {
    date_param_re().is_match(url)
}

/// `days` consecutive travel dates starting at `start`
pub fn date_window(start: NaiveDate, days: u32) -> Vec<NaiveDate> {
    (0..i64::from(days))
        .map(|offset| start + Duration::days(offset))
        .collect()
}
