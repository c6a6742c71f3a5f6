use std::sync::atomic::{AtomicI64, Ordering};

/// One hour in milliseconds
pub const HOUR_MILLIS: i64 = 60 * 60 * 1000;

/// One minute in milliseconds
pub const MINUTE_MILLIS: i64 = 60 * 1000;

/// One day in milliseconds
pub const DAY_MILLIS: i64 = 24 * HOUR_MILLIS;

/// Current UTC timestamp in milliseconds
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Render a millisecond timestamp as RFC 3339 for messages and logs.
///
/// Out-of-range values fall back to the raw number.
pub fn format_millis(millis: i64) -> String {
    chrono::DateTime::from_timestamp_millis(millis)
        .map(|dt| dt.to_rfc3339_opts(chrono::SecondsFormat::Secs, true))
        .unwrap_or_else(|| millis.to_string())
}

static LAST_ID: AtomicI64 = AtomicI64::new(0);

/// Generate a Snowflake-style i64 for use as row ID.
///
/// Layout (53 bits, fits in JavaScript's Number.MAX_SAFE_INTEGER):
///   - 41 bits: milliseconds since 2024-01-01 UTC (~69 years)
///   - 12 bits: random (4096 values per ms)
///
/// The random low bits keep separate processes writing to one database apart.
/// Within a process IDs are strictly increasing.
pub fn snowflake_id() -> i64 {
    use rand::Rng;
    const EPOCH_MS: i64 = 1_704_067_200_000;
    let ts = (now_millis() - EPOCH_MS) & 0x1FF_FFFF_FFFF;
    let rand_bits: i64 = rand::thread_rng().gen_range(0..0x1000);
    let candidate = (ts << 12) | rand_bits;
    let mut prev = LAST_ID.load(Ordering::Relaxed);
    loop {
        let next = candidate.max(prev + 1);
        match LAST_ID.compare_exchange_weak(prev, next, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => return next,
            Err(actual) => prev = actual,
        }
    }
}

/// `at` plus a caller-supplied number of hours, or None when the result
/// does not fit in an i64 millisecond timestamp
pub fn hours_after(at: i64, hours: i64) -> Option<i64> {
    hours.checked_mul(HOUR_MILLIS)?.checked_add(at)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_millis() {
        assert_eq!(format_millis(0), "1970-01-01T00:00:00Z");
        assert_eq!(format_millis(1_700_000_000_000), "2023-11-14T22:13:20Z");
    }

    #[test]
    fn test_snowflake_id_positive_and_js_safe() {
        let id = snowflake_id();
        assert!(id > 0);
        assert!(id < (1i64 << 53));
    }

    #[test]
    fn test_snowflake_id_strictly_increasing() {
        let ids: Vec<i64> = (0..1000).map(|_| snowflake_id()).collect();
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_snowflake_id_low_bits_are_random() {
        // One id per millisecond: the low 12 bits come straight from the RNG
        let low: Vec<i64> = (0..16)
            .map(|_| {
                std::thread::sleep(std::time::Duration::from_millis(2));
                snowflake_id() & 0xFFF
            })
            .collect();
        assert!(low.iter().any(|bits| *bits != low[0]));
    }

    #[test]
    fn test_hours_after() {
        assert_eq!(hours_after(1_000, 2), Some(1_000 + 2 * HOUR_MILLIS));
        assert_eq!(hours_after(0, i64::MAX / 1000), None);
        assert_eq!(hours_after(i64::MAX - HOUR_MILLIS + 1, 1), None);
    }
}
