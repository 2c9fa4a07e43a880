use std::time::Duration;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

/// Time since the Unix epoch; zero if the clock reads earlier.
pub(crate) fn get_duration_since_epoch() -> Duration {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default()
}

/// How long to wait from `now` (since epoch) until the next multiple of
/// `interval`. A time sitting exactly on a boundary waits a full interval.
pub(crate) fn until_next_boundary(
    now: Duration,
    interval: Duration,
) -> Duration {
    let interval_ms = interval.as_millis();
    if interval_ms == 0 {
        return Duration::ZERO;
    }
    let elapsed_in_slot = now.as_millis() % interval_ms;
    Duration::from_millis((interval_ms - elapsed_in_slot) as u64)
}
