//! UTC day bucketing
//!
//! Must agree with the backend that publishes infection keys: same epoch,
//! same day length, no timezone offset.

use crate::{Day, TimestampMs};

/// Milliseconds in one UTC day
pub const DAY_MS: i64 = 86_400_000;

/// Map an epoch-millisecond timestamp to its UTC day number.
///
/// Uses Euclidean division so timestamps before the epoch fall into
/// negative days instead of collapsing onto day 0.
pub fn day_number(tst: TimestampMs) -> Day {
    tst.div_euclid(DAY_MS)
}

/// First millisecond of the given day
pub fn day_start_ms(day: Day) -> TimestampMs {
    day.saturating_mul(DAY_MS)
}
