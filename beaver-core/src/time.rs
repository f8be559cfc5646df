use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Seconds since the epoch as an `f64`, the timestamp representation used
/// throughout §3's data model (lock expiry, queue priority/timestamp, log
/// timestamps).
pub fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

/// Sleeps `base` plus up to 100% uniform jitter, per §5: "all polling uses
/// OS sleep with the configured poll_interval plus up to 100% uniform
/// jitter" — this is what keeps concurrent waiters from thundering-herd
/// waking on the same tick.
pub async fn jittered_sleep(base: Duration) {
    let extra = rand::random::<f64>() * base.as_secs_f64();
    tokio::time::sleep(base + Duration::from_secs_f64(extra)).await;
}

/// The smallest representable increment used by the time-series log to
/// preserve monotonicity (§4.E) without rejecting valid, non-increasing
/// caller timestamps.
pub const EPSILON: f64 = 1e-6;
