use chrono::NaiveDate;

use fillrate::crawler::url::{has_date_params, rewrite_travel_date};

pub fn rewrite(url: &str, date: NaiveDate) {
    if !has_date_params(url) {
        tracing::warn!(url = %url, "URL has no onward/doj date parameter, nothing to rewrite");
    }
    println!("{}", rewrite_travel_date(url, date));
}
