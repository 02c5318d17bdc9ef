//! Seat-availability label parsing

use regex::Regex;
use std::sync::OnceLock;

/// Seats advertised by a single label such as `"5 Seats left"`.
///
/// Returns the first run of ASCII digits, or 0 when the label is missing,
/// empty, or has no digits. Values too large for `u32` saturate to
/// `u32::MAX`; the fill-rate computation clamps them to capacity.
pub fn parse_seat_count(text: Option<&str>) -> u32 {
    static DIGITS_RE: OnceLock<Regex> = OnceLock::new();

    let Some(text) = text else {
        return 0;
    };

    let re = DIGITS_RE.get_or_init(|| Regex::new(r"[0-9]+").expect("Invalid regex pattern"));

    re.find(text)
        .map(|m| m.as_str().parse::<u32>().unwrap_or(u32::MAX))
        .unwrap_or(0)
}

/// Running totals over the seat labels found on one page
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeatTally {
    /// One label per bus listed
    pub bus_count: u32,
    /// Sum of advertised free seats
    pub available_seats: u32,
}

impl SeatTally {
    /// Tally a page's worth of labels
    pub fn from_labels<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        labels.into_iter().fold(Self::default(), |mut tally, label| {
            tally.push(label.as_ref());
            tally
        })
    }

    pub fn push(&mut self, label: &str) {
        self.bus_count += 1;
        self.available_seats = self
            .available_seats
            .saturating_add(parse_seat_count(Some(label)));
    }

    pub fn is_empty(&self) -> bool {
        self.bus_count == 0
    }
}
