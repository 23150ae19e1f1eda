//! Time primitives shared by the convos crates.

pub use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use tokio_stream::wrappers::IntervalStream;

pub const NS_IN_SEC: i64 = 1_000_000_000;

fn duration_since_epoch() -> Duration {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
}

/// Current wall-clock time in nanoseconds since the unix epoch.
pub fn now_ns() -> i64 {
    duration_since_epoch().as_nanos() as i64
}

pub fn now_secs() -> i64 {
    duration_since_epoch().as_secs() as i64
}

/// A stream yielding on a fixed period, first tick after one full period.
pub fn interval_stream(period: Duration) -> IntervalStream {
    let mut interval = tokio::time::interval(period);
    interval.reset();
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    IntervalStream::new(interval)
}
