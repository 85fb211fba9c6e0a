//! Time-related utilities with clock abstraction for testability.

use chrono::{TimeZone, Utc};

/// Clock trait for dependency injection and testing
pub trait Clock: Send + Sync {
    /// Get current Unix timestamp in milliseconds (UTC)
    fn now_millis(&self) -> i64;
}

/// System clock implementation (uses actual system time)
#[derive(Debug, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        now_utc_millis()
    }
}

/// Fixed clock implementation for testing (returns a fixed time)
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    fixed_time: i64,
}

impl FixedClock {
    /// Create a new fixed clock with the given timestamp
    pub fn new(fixed_time_millis: i64) -> Self {
        Self {
            fixed_time: fixed_time_millis,
        }
    }
}

impl Clock for FixedClock {
    fn now_millis(&self) -> i64 {
        self.fixed_time
    }
}

/// Get current Unix timestamp in milliseconds (UTC)
pub fn now_utc_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Convert Unix timestamp (milliseconds) to RFC 3339 format (UTC)
pub fn timestamp_to_rfc3339(timestamp_millis: i64) -> String {
    let seconds = timestamp_millis.div_euclid(1000);
    let nanos = (timestamp_millis.rem_euclid(1000) * 1_000_000) as u32;
    match Utc.timestamp_opt(seconds, nanos) {
        chrono::LocalResult::Single(dt) => dt.to_rfc3339(),
        _ => String::from("invalid timestamp"),
    }
}

/// Render the elapsed time between two timestamps as a short human-readable
/// string ("just now", "5s ago", "3m ago", "2h ago", "4d ago").
pub fn format_time_ago(then_millis: i64, now_millis: i64) -> String {
    let elapsed_secs = (now_millis - then_millis).max(0) / 1000;

    if elapsed_secs < 1 {
        "just now".to_string()
    } else if elapsed_secs < 60 {
        format!("{}s ago", elapsed_secs)
    } else if elapsed_secs < 3600 {
        format!("{}m ago", elapsed_secs / 60)
    } else if elapsed_secs < 86_400 {
        format!("{}h ago", elapsed_secs / 3600)
    } else {
        format!("{}d ago", elapsed_secs / 86_400)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_clock_returns_fixed_time() {
        // テスト項目: FixedClock は常に固定された時刻を返す
        // given (前提条件):
        let clock = FixedClock::new(1_700_000_000_000);

        // when (操作):
        let first = clock.now_millis();
        let second = clock.now_millis();

        // then (期待する結果):
        assert_eq!(first, 1_700_000_000_000);
        assert_eq!(first, second);
    }

    #[test]
    fn test_system_clock_is_monotonic_enough() {
        // テスト項目: SystemClock は現在時刻（ミリ秒）を返す
        // given (前提条件):
        let clock = SystemClock;

        // when (操作):
        let a = clock.now_millis();
        let b = clock.now_millis();

        // then (期待する結果):
        assert!(a > 1_600_000_000_000, "timestamp should be after 2020");
        assert!(b >= a);
    }

    #[test]
    fn test_format_time_ago() {
        // テスト項目: 経過時間が人間可読な文字列に変換される
        // given (前提条件):
        let now = 1_700_000_000_000;
        let cases = [
            (now - 500, "just now"),
            (now - 1_000, "1s ago"),
            (now - 5_000, "5s ago"),
            (now - 60_000, "1m ago"),
            (now - 5 * 60_000, "5m ago"),
            (now - 3_600_000, "1h ago"),
            (now - 3 * 3_600_000, "3h ago"),
            (now - 86_400_000, "1d ago"),
            (now - 3 * 86_400_000, "3d ago"),
        ];

        for (then, want) in cases {
            // when (操作):
            let got = format_time_ago(then, now);

            // then (期待する結果):
            assert_eq!(got, want, "then={}", then);
        }
    }

    #[test]
    fn test_format_time_ago_future_timestamp() {
        // テスト項目: 未来のタイムスタンプは "just now" として扱われる
        // given (前提条件):
        let now = 1_700_000_000_000;

        // when (操作):
        let got = format_time_ago(now + 10_000, now);

        // then (期待する結果):
        assert_eq!(got, "just now");
    }

    #[test]
    fn test_timestamp_to_rfc3339() {
        // テスト項目: ミリ秒タイムスタンプが RFC 3339 形式に変換される
        // given (前提条件):
        let ts = 1_700_000_000_000;

        // when (操作):
        let got = timestamp_to_rfc3339(ts);

        // then (期待する結果):
        assert!(got.starts_with("2023-11-14T22:13:20"), "got {}", got);
    }
}
