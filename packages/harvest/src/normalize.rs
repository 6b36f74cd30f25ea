//! Raw value normalization.
//!
//! Both services report values as strings. Quality gate and build results
//! are small enums that map onto a `0.0..=1.0` health scale; everything
//! else is a decimal number. Values that fit neither become `0.0` with a
//! warning instead of failing the run.

use chrono::{DateTime, Utc};

/// Quality gate metric from the quality service.
pub const ALERT_STATUS_METRIC: &str = "alert_status";

/// Pseudo-metric name used for build results.
pub const BUILD_STATUS_METRIC: &str = "status";

const MILLIS_PER_HOUR: f64 = 3_600_000.0;

/// Converts a raw metric value to a number.
///
/// - `alert_status`: `OK` → 1.0, `WARN` → 0.5, `ERROR` → 0.0
/// - `status`: `SUCCESS` → 1.0, `UNSTABLE` → 0.5, `ERROR` → 0.0
/// - anything else is parsed as a float
///
/// Unknown enum values and unparseable numbers yield `0.0`.
#[must_use]
pub fn to_numeric(metric: &str, raw: &str) -> f64 {
    match metric {
        ALERT_STATUS_METRIC => match raw {
            "OK" => 1.0,
            "WARN" => 0.5,
            _ => 0.0,
        },
        BUILD_STATUS_METRIC => match raw {
            "SUCCESS" => 1.0,
            "UNSTABLE" => 0.5,
            _ => 0.0,
        },
        _ => match raw.parse::<f64>() {
            Ok(value) if value.is_finite() => value,
            Ok(value) => {
                log::warn!("{metric}: non-finite value {value}, using 0");
                0.0
            }
            Err(e) => {
                log::warn!("{metric}: unable to convert {raw:?} to a number ({e}), using 0");
                0.0
            }
        },
    }
}

/// Hours elapsed between an epoch-millisecond timestamp and now.
///
/// Negative when the timestamp lies in the future.
#[must_use]
pub fn hours_since(timestamp_millis: i64) -> f64 {
    hours_between(timestamp_millis, Utc::now())
}

/// Hours elapsed between an epoch-millisecond timestamp and `now`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn hours_between(timestamp_millis: i64, now: DateTime<Utc>) -> f64 {
    let elapsed = now.timestamp_millis().saturating_sub(timestamp_millis);
    elapsed as f64 / MILLIS_PER_HOUR
}
