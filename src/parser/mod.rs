//! Extraction of seat data from rendered listing pages
//!
//! Text collection happens in the browser; this module turns the collected
//! labels into numbers.

pub mod seats;

pub use seats::{parse_seat_count, SeatTally};
