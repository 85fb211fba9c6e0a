//! Sliding-window message rate limiting.
//!
//! Each session owns its [`RateWindow`]; only that session's task mutates it,
//! so no lock is needed on the fast path. The limiter itself is a stateless
//! policy object built from [`ServerConfig`](super::config::ServerConfig)
//! values.

use thiserror::Error;

/// Denial reason, rendered to the offending client as an inline warning.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RateLimitError {
    /// Budget exhausted for the current window
    #[error("Rate limited! Wait {wait_secs} seconds.")]
    Limited {
        /// Whole seconds until the window resets
        wait_secs: i64,
    },
}

/// Per-client rate-limiter state. Single writer: the owning session task.
#[derive(Debug, Clone, Copy)]
pub struct RateWindow {
    /// Unix millis at which the current window opened
    window_start: i64,
    /// Messages recorded in the current window
    count: u32,
    /// Unix millis of the most recent recorded message
    last_message: i64,
}

impl RateWindow {
    /// Open a fresh window at `now`.
    pub fn new(now_millis: i64) -> Self {
        Self {
            window_start: now_millis,
            count: 0,
            last_message: now_millis,
        }
    }

    /// Messages recorded in the current window.
    pub fn count(&self) -> u32 {
        self.count
    }

    /// Unix millis of the most recent recorded message.
    pub fn last_message(&self) -> i64 {
        self.last_message
    }
}

/// Fixed sliding-window policy: at most `budget` messages per `window`.
#[derive(Debug, Clone, Copy)]
pub struct RateLimiter {
    budget: u32,
    window_millis: i64,
}

impl RateLimiter {
    /// Create a limiter allowing `budget` messages per `window`.
    pub fn new(budget: u32, window: std::time::Duration) -> Self {
        Self {
            budget,
            window_millis: window.as_millis() as i64,
        }
    }

    /// Check whether another message fits in the window. Resets the window
    /// first when it has elapsed. Callers must follow an `Ok` with
    /// [`record`](Self::record) once the message is actually accepted.
    pub fn check(&self, window: &mut RateWindow, now_millis: i64) -> Result<(), RateLimitError> {
        if now_millis - window.window_start > self.window_millis {
            window.count = 0;
            window.window_start = now_millis;
        }

        if window.count >= self.budget {
            let elapsed = now_millis - window.window_start;
            let wait_secs = ((self.window_millis - elapsed) + 999) / 1000;
            return Err(RateLimitError::Limited {
                wait_secs: wait_secs.max(1),
            });
        }
        Ok(())
    }

    /// Record one accepted message.
    pub fn record(&self, window: &mut RateWindow, now_millis: i64) {
        window.count += 1;
        window.last_message = now_millis;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn limiter() -> RateLimiter {
        RateLimiter::new(5, Duration::from_secs(10))
    }

    #[test]
    fn test_budget_allows_five_then_denies() {
        // テスト項目: ウィンドウ内で 5 件まで許可され、6 件目は拒否される
        // given (前提条件):
        let limiter = limiter();
        let now = 1_700_000_000_000;
        let mut window = RateWindow::new(now);

        // when (操作): 5 件送信する
        for i in 0..5 {
            assert!(limiter.check(&mut window, now + i).is_ok());
            limiter.record(&mut window, now + i);
        }

        // then (期待する結果): 6 件目は待ち時間付きで拒否される
        let denied = limiter.check(&mut window, now + 5);
        match denied {
            Err(RateLimitError::Limited { wait_secs }) => {
                assert!(wait_secs > 0, "wait time must be positive");
                assert!(wait_secs <= 10);
            }
            other => panic!("expected rate limit denial, got {:?}", other),
        }
    }

    #[test]
    fn test_window_reset_after_expiry() {
        // テスト項目: ウィンドウ経過後はカウントがリセットされ再び送信できる
        // given (前提条件):
        let limiter = limiter();
        let now = 1_700_000_000_000;
        let mut window = RateWindow::new(now);
        for _ in 0..5 {
            limiter.check(&mut window, now).unwrap();
            limiter.record(&mut window, now);
        }
        assert!(limiter.check(&mut window, now).is_err());

        // when (操作): ウィンドウ（10 秒）+1ms 経過後にチェック
        let later = now + 10_001;
        let result = limiter.check(&mut window, later);
        limiter.record(&mut window, later);

        // then (期待する結果): 許可され、カウントは新しい 1 件のみ
        assert!(result.is_ok());
        assert_eq!(window.count(), 1);
    }

    #[test]
    fn test_denial_does_not_consume_budget() {
        // テスト項目: 拒否されたチェックはカウントを増やさない
        // given (前提条件):
        let limiter = limiter();
        let now = 1_700_000_000_000;
        let mut window = RateWindow::new(now);
        for _ in 0..5 {
            limiter.check(&mut window, now).unwrap();
            limiter.record(&mut window, now);
        }

        // when (操作):
        let _ = limiter.check(&mut window, now);
        let _ = limiter.check(&mut window, now);

        // then (期待する結果):
        assert_eq!(window.count(), 5);
    }

    #[test]
    fn test_record_updates_last_message() {
        // テスト項目: record は最終送信時刻を更新する
        // given (前提条件):
        let limiter = limiter();
        let now = 1_700_000_000_000;
        let mut window = RateWindow::new(now);

        // when (操作):
        limiter.record(&mut window, now + 42);

        // then (期待する結果):
        assert_eq!(window.last_message(), now + 42);
        assert_eq!(window.count(), 1);
    }

    #[test]
    fn test_wait_time_shrinks_as_window_ages() {
        // テスト項目: 待ち時間はウィンドウの経過とともに減少する
        // given (前提条件):
        let limiter = limiter();
        let now = 1_700_000_000_000;
        let mut window = RateWindow::new(now);
        for _ in 0..5 {
            limiter.record(&mut window, now);
        }

        // when (操作):
        let early = limiter.check(&mut window, now + 1_000);
        let late = limiter.check(&mut window, now + 8_000);

        // then (期待する結果):
        let wait_of = |r: Result<(), RateLimitError>| match r {
            Err(RateLimitError::Limited { wait_secs }) => wait_secs,
            _ => panic!("expected denial"),
        };
        assert!(wait_of(early) > wait_of(late));
    }
}
