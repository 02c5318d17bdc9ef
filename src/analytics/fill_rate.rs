//! Fill-rate computation
//!
//! Turns a bus count and the total of advertised free seats into capacity,
//! filled seats and a percentage rounded to two decimals.

use serde::Serialize;
use thiserror::Error;

/// Seat capacity assumed for every bus
pub const DEFAULT_BUS_CAPACITY: u32 = 36;

/// Errors that make a measurement unusable
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FillRateError {
    /// Nothing to measure: no buses, or zero capacity per bus
    #[error("Total capacity is zero ({bus_count} buses x {per_bus_capacity} seats)")]
    ZeroCapacity {
        bus_count: u32,
        per_bus_capacity: u32,
    },

    /// Capacity does not fit in `u32`
    #[error("Capacity overflow ({bus_count} buses x {per_bus_capacity} seats)")]
    Overflow {
        bus_count: u32,
        per_bus_capacity: u32,
    },
}

/// Aggregated metrics for one route and date
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FillMetrics {
    pub total_capacity: u32,
    /// Free seats after clamping to `total_capacity`
    pub available_seats: u32,
    pub filled_seats: u32,
    pub fill_rate_percent: f64,
    /// The page advertised more free seats than the buses can hold
    pub clamped: bool,
}

/// Compute fill metrics.
///
/// Reported availability above capacity is clamped so `filled_seats` never
/// goes negative; `clamped` flags it.
pub fn compute(
    bus_count: u32,
    available_seats: u32,
    per_bus_capacity: u32,
) -> Result<FillMetrics, FillRateError> {
    let total_capacity =
        bus_count
            .checked_mul(per_bus_capacity)
            .ok_or(FillRateError::Overflow {
                bus_count,
                per_bus_capacity,
            })?;

    if total_capacity == 0 {
        return Err(FillRateError::ZeroCapacity {
            bus_count,
            per_bus_capacity,
        });
    }

    let clamped = available_seats > total_capacity;
    let available_seats = available_seats.min(total_capacity);
    let filled_seats = total_capacity - available_seats;

    Ok(FillMetrics {
        total_capacity,
        available_seats,
        filled_seats,
        fill_rate_percent: round2(100.0 * f64::from(filled_seats) / f64::from(total_capacity)),
        clamped,
    })
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
