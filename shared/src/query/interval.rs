//! Interval formatting for engine-side window expressions.
//!
//! Turns a sampling interval into the coarse-unit literal the warehouse accepts
//! inside `window(col, '...')`, for example `"2 HOURS 30 SECONDS"`.

use std::time::Duration;

const MILLIS_PER_SECOND: u128 = 1_000;
const MILLIS_PER_MINUTE: u128 = 60 * MILLIS_PER_SECOND;
const MILLIS_PER_HOUR: u128 = 60 * MILLIS_PER_MINUTE;

/// Formats a duration as a space separated list of `<n> <UNIT>` components.
///
/// Components are produced in descending order (`HOURS`, `MINUTES`, `SECONDS`,
/// `MILLISECONDS`). Each unit is taken from what remains after the larger units
/// have been removed, so 90 seconds formats as `"1 MINUTES 30 SECONDS"`.
/// Zero components are skipped and sub-millisecond precision is dropped; a zero
/// duration yields an empty string.
///
/// # Example
///
/// ```
/// use shared::query::format_interval;
/// use std::time::Duration;
///
/// assert_eq!(format_interval(Duration::from_secs(3661)), "1 HOURS 1 MINUTES 1 SECONDS");
/// assert_eq!(format_interval(Duration::ZERO), "");
/// ```
#[must_use]
pub fn format_interval(interval: Duration) -> String {
    let mut remaining = interval.as_millis();

    let hours = remaining / MILLIS_PER_HOUR;
    remaining -= hours * MILLIS_PER_HOUR;
    let minutes = remaining / MILLIS_PER_MINUTE;
    remaining -= minutes * MILLIS_PER_MINUTE;
    let seconds = remaining / MILLIS_PER_SECOND;
    remaining -= seconds * MILLIS_PER_SECOND;
    let milliseconds = remaining;

    [
        (hours, "HOURS"),
        (minutes, "MINUTES"),
        (seconds, "SECONDS"),
        (milliseconds, "MILLISECONDS"),
    ]
    .iter()
    .filter(|(amount, _)| *amount > 0)
    .map(|(amount, unit)| format!("{amount} {unit}"))
    .collect::<Vec<_>>()
    .join(" ")
}
