use crate::application::ports::local_storage::{CLIENT_ID_KEY, LocalStorage};
use crate::shared::clock::Clock;
use crate::shared::config::RateLimitsConfig;
use crate::shared::rate_limiter::{RateLimitDecision, RateLimiter};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

/// アクション名ごとのレートリミッターをまとめるサービス
///
/// クライアント識別子は端末ローカルに保存した UUID で、ストレージを消せば変わる。
/// UX 目的の助言的な制限であり、強制はサーバー側の責務。
pub struct RateLimitService {
    limiters: HashMap<String, RateLimiter>,
    storage: Arc<dyn LocalStorage>,
    client_id: OnceCell<String>,
}

impl RateLimitService {
    pub fn new(
        config: &RateLimitsConfig,
        storage: Arc<dyn LocalStorage>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let limiters = config
            .actions
            .iter()
            .map(|(action, limit)| (action.clone(), RateLimiter::new(*limit, Arc::clone(&clock))))
            .collect();
        Self {
            limiters,
            storage,
            client_id: OnceCell::new(),
        }
    }

    /// 保存済みのクライアントIDを返し、なければ生成して保存する
    pub async fn client_id(&self) -> &str {
        self.client_id
            .get_or_init(|| async {
                match self.storage.get_item(CLIENT_ID_KEY).await {
                    Ok(Some(id)) if !id.trim().is_empty() => return id,
                    Ok(_) => {}
                    Err(err) => warn!(error = %err, "failed to read client id; generating a new one"),
                }
                let id = uuid::Uuid::new_v4().to_string();
                if let Err(err) = self.storage.set_item(CLIENT_ID_KEY, &id).await {
                    warn!(error = %err, "failed to persist client id");
                }
                debug!(client_id = %id, "generated client id");
                id
            })
            .await
            .as_str()
    }

    pub async fn check_limit(&self, action: &str) -> RateLimitDecision {
        let Some(limiter) = self.limiters.get(action) else {
            warn!(action, "no rate limiter configured; allowing request");
            return RateLimitDecision::allow(None);
        };
        let key = format!("{}:{action}", self.client_id().await);
        let decision = limiter.check_limit(&key).await;
        if !decision.allowed {
            debug!(action, retry_after = ?decision.retry_after, "rate limit denied");
        }
        decision
    }

    pub async fn remaining_requests(&self, action: &str) -> u32 {
        let Some(limiter) = self.limiters.get(action) else {
            return u32::MAX;
        };
        let key = format!("{}:{action}", self.client_id().await);
        limiter.remaining_requests(&key).await
    }

    pub async fn sweep_expired(&self) -> usize {
        let mut removed = 0;
        for limiter in self.limiters.values() {
            removed += limiter.sweep_expired().await;
        }
        removed
    }

    pub async fn tracked_keys(&self) -> usize {
        let mut total = 0;
        for limiter in self.limiters.values() {
            total += limiter.tracked_keys().await;
        }
        total
    }

    pub fn has_action(&self, action: &str) -> bool {
        self.limiters.contains_key(action)
    }
}
