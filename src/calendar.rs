//! # Calendar Math
//! Pure day-count and lunar-phase functions. No I/O, suitable for unit tests
//! and safe to call concurrently.
//!
//! The lunar phase is the classic synodic approximation: elapsed days since a
//! known new moon, modulo the synodic month, scaled to `[0, 1)`. 0 is new
//! moon, 0.5 is full moon.

use chrono::{Datelike, NaiveDate};

use crate::error::EngineError;

/// Mean synodic month in days.
pub const SYNODIC_DAYS: f64 = 29.530588853;

/// Julian day number of the epoch new moon (2000-01-06).
pub const NEW_MOON_EPOCH_JDN: i64 = 2_451_550;

/// Offset between chrono's days-from-CE and the Julian day number.
/// JDN(0001-01-01 proleptic Gregorian) = 1_721_426, and that date is CE day 1.
const JDN_CE_OFFSET: i64 = 1_721_425;

/// Julian day number for a calendar date. Deterministic and monotonic.
pub fn day_count(date: NaiveDate) -> i64 {
    i64::from(date.num_days_from_ce()) + JDN_CE_OFFSET
}

/// Lunar phase in `[0, 1)` for a calendar date.
///
/// Dates before the epoch wrap via euclidean remainder; the result is never
/// negative and never reaches 1.0.
pub fn lunar_phase(date: NaiveDate) -> f64 {
    let elapsed = (day_count(date) - NEW_MOON_EPOCH_JDN) as f64;
    let phase = elapsed.rem_euclid(SYNODIC_DAYS) / SYNODIC_DAYS;
    // rem_euclid already guarantees [0, SYNODIC_DAYS); keep the open bound
    // airtight against float rounding.
    if phase >= 1.0 {
        0.0
    } else {
        phase
    }
}

/// Parse an ISO `YYYY-MM-DD` date, rejecting anything malformed.
pub fn parse_date(s: &str) -> Result<NaiveDate, EngineError> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|e| EngineError::invalid(format!("bad date {s:?}: {e}")))
}
