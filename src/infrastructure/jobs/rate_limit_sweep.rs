use crate::application::services::RateLimitService;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// 期限切れのレート制限エントリを定期的に掃除する
pub fn spawn_rate_limit_sweep(
    limits: Arc<RateLimitService>,
    interval_secs: u64,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
        // 初回の即時 tick は読み捨てる
        interval.tick().await;
        loop {
            interval.tick().await;
            let removed = limits.sweep_expired().await;
            if removed > 0 {
                tracing::debug!(removed, "rate limit sweep removed expired entries");
            }
        }
    })
}
