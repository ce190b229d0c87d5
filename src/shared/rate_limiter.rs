use crate::shared::clock::Clock;
use crate::shared::config::RateLimitConfig;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// `check_limit` の判定結果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitDecision {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reset_time: Option<i64>,
    /// 再試行までの秒数
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

impl RateLimitDecision {
    pub fn allow(reset_time: Option<i64>) -> Self {
        Self {
            allowed: true,
            reset_time,
            retry_after: None,
        }
    }

    pub fn deny(reset_time: i64, retry_after: u64) -> Self {
        Self {
            allowed: false,
            reset_time: Some(reset_time),
            retry_after: Some(retry_after),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct RateLimitEntry {
    count: u32,
    reset_time: i64,
    blocked_until: Option<i64>,
}

impl RateLimitEntry {
    fn fresh(now: i64, window_ms: i64) -> Self {
        Self {
            count: 1,
            reset_time: now.saturating_add(window_ms),
            blocked_until: None,
        }
    }

    fn is_blocked(&self, now: i64) -> bool {
        self.blocked_until.is_some_and(|until| until > now)
    }

    fn is_expired(&self, now: i64) -> bool {
        now >= self.reset_time && !self.is_blocked(now)
    }
}

/// 固定ウィンドウ + ブロック期間付きのレートリミッター
///
/// クライアント側の助言的な制限であり、セキュリティ境界ではない。
pub struct RateLimiter {
    entries: Mutex<HashMap<String, RateLimitEntry>>,
    config: RateLimitConfig,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            config,
            clock,
        }
    }

    pub async fn check_limit(&self, key: &str) -> RateLimitDecision {
        let now = self.clock.now_ms();
        let mut guard = self.entries.lock().await;

        if let Some(entry) = guard.get_mut(key) {
            if let Some(until) = entry.blocked_until {
                if until > now {
                    return RateLimitDecision::deny(until, retry_after_secs(until - now));
                }
            }

            // ブロック解除後、またはウィンドウ経過後は新しいウィンドウを開始
            let block_elapsed = entry.blocked_until.is_some();
            if !block_elapsed && now < entry.reset_time {
                entry.count = entry.count.saturating_add(1);
                if entry.count > self.config.max_requests {
                    let until = now.saturating_add(self.config.block_duration_ms);
                    entry.blocked_until = Some(until);
                    return RateLimitDecision::deny(
                        until,
                        retry_after_secs(self.config.block_duration_ms),
                    );
                }
                return RateLimitDecision::allow(Some(entry.reset_time));
            }
        }

        let entry = RateLimitEntry::fresh(now, self.config.window_ms);
        guard.insert(key.to_string(), entry);
        RateLimitDecision::allow(Some(entry.reset_time))
    }

    pub async fn remaining_requests(&self, key: &str) -> u32 {
        let now = self.clock.now_ms();
        let guard = self.entries.lock().await;
        match guard.get(key) {
            Some(entry) if entry.is_blocked(now) => 0,
            Some(entry) if entry.blocked_until.is_none() && now < entry.reset_time => {
                self.config.max_requests.saturating_sub(entry.count)
            }
            _ => self.config.max_requests,
        }
    }

    /// ウィンドウとブロック期間の両方が切れたエントリを削除
    pub async fn sweep_expired(&self) -> usize {
        let now = self.clock.now_ms();
        let mut guard = self.entries.lock().await;
        let before = guard.len();
        guard.retain(|_, entry| !entry.is_expired(now));
        before - guard.len()
    }

    pub async fn tracked_keys(&self) -> usize {
        self.entries.lock().await.len()
    }
}

fn retry_after_secs(remaining_ms: i64) -> u64 {
    let remaining_ms = remaining_ms.max(0) as u64;
    remaining_ms.div_ceil(1000).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::clock::ManualClock;

    fn limiter(max: u32, window_ms: i64, block_ms: i64) -> (RateLimiter, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(0));
        let limiter = RateLimiter::new(RateLimitConfig::new(max, window_ms, block_ms), clock.clone());
        (limiter, clock)
    }

    #[tokio::test]
    async fn allows_up_to_max_then_blocks() {
        let (limiter, clock) = limiter(10, 60_000, 30_000);
        for _ in 0..10 {
            assert!(limiter.check_limit("c:posts").await.allowed);
            clock.advance(10);
        }
        let denied = limiter.check_limit("c:posts").await;
        assert!(!denied.allowed);
        assert_eq!(denied.retry_after, Some(30));

        clock.advance(30_000);
        let decision = limiter.check_limit("c:posts").await;
        assert!(decision.allowed);
        assert_eq!(limiter.remaining_requests("c:posts").await, 9);
    }

    #[tokio::test]
    async fn scenario_two_per_second_with_five_second_block() {
        let (limiter, clock) = limiter(2, 1000, 5000);
        assert!(limiter.check_limit("k").await.allowed);
        clock.set(100);
        assert!(limiter.check_limit("k").await.allowed);
        clock.set(200);
        let denied = limiter.check_limit("k").await;
        assert!(!denied.allowed);
        assert_eq!(denied.retry_after, Some(5));
        assert_eq!(denied.reset_time, Some(5200));
        clock.set(6000);
        let allowed = limiter.check_limit("k").await;
        assert!(allowed.allowed);
        assert_eq!(allowed.reset_time, Some(7000));
    }

    #[tokio::test]
    async fn block_takes_precedence_over_window_reset() {
        let (limiter, clock) = limiter(1, 100, 10_000);
        assert!(limiter.check_limit("k").await.allowed);
        assert!(!limiter.check_limit("k").await.allowed);

        // ウィンドウは切れているがブロック中
        clock.set(5_000);
        let decision = limiter.check_limit("k").await;
        assert!(!decision.allowed);
        assert_eq!(decision.retry_after, Some(5));
        assert_eq!(limiter.remaining_requests("k").await, 0);
    }

    #[tokio::test]
    async fn remaining_requests_tracks_window() {
        let (limiter, clock) = limiter(3, 1000, 1000);
        assert_eq!(limiter.remaining_requests("k").await, 3);
        limiter.check_limit("k").await;
        limiter.check_limit("k").await;
        assert_eq!(limiter.remaining_requests("k").await, 1);
        clock.set(1000);
        assert_eq!(limiter.remaining_requests("k").await, 3);
    }

    #[tokio::test]
    async fn keys_are_independent() {
        let (limiter, _clock) = limiter(1, 1000, 1000);
        assert!(limiter.check_limit("a:posts").await.allowed);
        assert!(limiter.check_limit("b:posts").await.allowed);
        assert!(!limiter.check_limit("a:posts").await.allowed);
    }

    #[tokio::test]
    async fn sweep_removes_only_fully_expired_entries() {
        let (limiter, clock) = limiter(1, 1000, 10_000);
        limiter.check_limit("idle").await;
        limiter.check_limit("blocked").await;
        limiter.check_limit("blocked").await;

        clock.set(2_000);
        assert_eq!(limiter.sweep_expired().await, 1);
        assert_eq!(limiter.tracked_keys().await, 1);

        clock.set(11_000);
        assert_eq!(limiter.sweep_expired().await, 1);
        assert_eq!(limiter.tracked_keys().await, 0);
    }

    #[tokio::test]
    async fn huge_durations_saturate_instead_of_overflowing() {
        let (limiter, clock) = limiter(1, i64::MAX, i64::MAX);
        clock.set(1_000);
        let first = limiter.check_limit("k").await;
        assert!(first.allowed);
        assert_eq!(first.reset_time, Some(i64::MAX));

        let denied = limiter.check_limit("k").await;
        assert!(!denied.allowed);
        assert_eq!(denied.reset_time, Some(i64::MAX));
        assert_eq!(limiter.remaining_requests("k").await, 0);
    }
}
