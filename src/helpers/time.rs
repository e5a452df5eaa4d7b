use chrono::{DateTime, Utc};
use tokio::time::Instant;

pub fn now_ms() -> u64 {
    Utc::now().timestamp_millis().max(0) as u64
}

pub fn get_instant() -> Instant {
    Instant::now()
}

/// Milliseconds elapsed between `since` and `now`, zero when the clock went backwards.
pub fn elapsed_ms(since: u64, now: u64) -> u64 {
    now.saturating_sub(since)
}

pub fn ms_to_rfc3339(unix_ms: u64) -> Option<String> {
    DateTime::<Utc>::from_timestamp_millis(unix_ms as i64).map(|date_time| date_time.to_rfc3339())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elapsed_never_underflows() {
        assert_eq!(elapsed_ms(10, 25), 15);
        assert_eq!(elapsed_ms(25, 10), 0);
    }

    #[test]
    fn rfc3339_of_epoch() {
        assert_eq!(ms_to_rfc3339(0).unwrap(), "1970-01-01T00:00:00+00:00");
    }
}
