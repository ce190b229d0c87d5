use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

pub const ACTION_POSTS: &str = "posts";
pub const ACTION_COMMENTS: &str = "comments";
pub const ACTION_REACTIONS: &str = "reactions";
pub const ACTION_AUTH: &str = "auth";
pub const ACTION_UPLOADS: &str = "uploads";

const MINUTE_MS: i64 = 60 * 1000;
const HOUR_MS: i64 = 60 * MINUTE_MS;
const DAY_MS: i64 = 24 * HOUR_MS;

/// 通知の保持日数の上限（100年）
pub const MAX_NOTIFICATION_TTL_DAYS: i64 = 36_500;
/// キャッシュTTL・レート制限ウィンドウ・ブロック期間の上限（365日）
pub const MAX_DURATION_MS: i64 = 365 * DAY_MS;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub storage: StorageConfig,
    pub backend: BackendConfig,
    pub cache: CacheConfig,
    pub rate_limits: RateLimitsConfig,
    pub audit: AuditConfig,
    pub notifications: NotificationConfig,
    pub backup: BackupConfig,
    pub mirror: MirrorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub database_url: String,
    pub export_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// 未設定の場合はメモリ上のバックエンドで動作する
    pub url: Option<String>,
    pub api_key: Option<String>,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub default_ttl_ms: i64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window_ms: i64,
    pub block_duration_ms: i64,
}

impl RateLimitConfig {
    pub const fn new(max_requests: u32, window_ms: i64, block_duration_ms: i64) -> Self {
        Self {
            max_requests,
            window_ms,
            block_duration_ms,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitsConfig {
    pub sweep_interval_secs: u64,
    pub actions: BTreeMap<String, RateLimitConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    pub max_entries: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    pub max_entries: usize,
    pub ttl_days: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupConfig {
    pub history_limit: usize,
    pub auto_backup_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MirrorConfig {
    pub queue_capacity: usize,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        let data_dir = default_data_dir();
        Self {
            storage: StorageConfig {
                database_url: format!("sqlite:{}?mode=rwc", data_dir.join("forum.db").display()),
                export_dir: data_dir.join("exports"),
            },
            backend: BackendConfig {
                url: None,
                api_key: None,
                request_timeout_secs: 15,
            },
            cache: CacheConfig {
                default_ttl_ms: 5 * MINUTE_MS,
            },
            rate_limits: RateLimitsConfig::default(),
            audit: AuditConfig { max_entries: 1000 },
            notifications: NotificationConfig {
                max_entries: 50,
                ttl_days: 30,
            },
            backup: BackupConfig {
                history_limit: 10,
                auto_backup_interval_secs: 24 * 60 * 60, // 1 day
            },
            mirror: MirrorConfig {
                queue_capacity: 256,
                max_retries: 3,
                retry_backoff_ms: 500,
            },
        }
    }
}

impl Default for RateLimitsConfig {
    fn default() -> Self {
        let mut actions = BTreeMap::new();
        actions.insert(
            ACTION_POSTS.to_string(),
            RateLimitConfig::new(10, HOUR_MS, 30 * MINUTE_MS),
        );
        actions.insert(
            ACTION_COMMENTS.to_string(),
            RateLimitConfig::new(30, HOUR_MS, 15 * MINUTE_MS),
        );
        actions.insert(
            ACTION_REACTIONS.to_string(),
            RateLimitConfig::new(100, HOUR_MS, 5 * MINUTE_MS),
        );
        actions.insert(
            ACTION_AUTH.to_string(),
            RateLimitConfig::new(5, 15 * MINUTE_MS, HOUR_MS),
        );
        actions.insert(
            ACTION_UPLOADS.to_string(),
            RateLimitConfig::new(20, HOUR_MS, 30 * MINUTE_MS),
        );
        Self {
            sweep_interval_secs: 300, // 5 minutes
            actions,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        // 既定値
        let mut cfg = Self::default();

        if let Ok(v) = std::env::var("FORUM_DATABASE_URL") {
            if !v.trim().is_empty() {
                cfg.storage.database_url = v.trim().to_string();
            }
        }
        if let Ok(v) = std::env::var("FORUM_EXPORT_DIR") {
            if !v.trim().is_empty() {
                cfg.storage.export_dir = PathBuf::from(v.trim());
            }
        }

        // リモートバックエンド
        if let Ok(v) = std::env::var("FORUM_BACKEND_URL") {
            cfg.backend.url = non_empty(&v);
        }
        if let Ok(v) = std::env::var("FORUM_BACKEND_KEY") {
            cfg.backend.api_key = non_empty(&v);
        }
        if let Some(value) = env_u64("FORUM_BACKEND_TIMEOUT_SECS") {
            cfg.backend.request_timeout_secs = value.max(1);
        }

        if let Some(value) = env_u64("FORUM_CACHE_TTL_MS") {
            cfg.cache.default_ttl_ms = value as i64;
        }
        if let Some(value) = env_u64("FORUM_RATE_LIMIT_SWEEP_SECS") {
            cfg.rate_limits.sweep_interval_secs = value.max(1);
        }
        if let Some(value) = env_u64("FORUM_AUDIT_MAX_ENTRIES") {
            cfg.audit.max_entries = value as usize;
        }
        if let Some(value) = env_u64("FORUM_NOTIFICATIONS_MAX_ENTRIES") {
            cfg.notifications.max_entries = value as usize;
        }
        if let Some(value) = env_u64("FORUM_NOTIFICATIONS_TTL_DAYS") {
            cfg.notifications.ttl_days = value as i64;
        }
        if let Some(value) = env_u64("FORUM_BACKUP_HISTORY_LIMIT") {
            cfg.backup.history_limit = value as usize;
        }
        if let Some(value) = env_u64("FORUM_AUTO_BACKUP_INTERVAL_SECS") {
            cfg.backup.auto_backup_interval_secs = value.max(60);
        }
        if let Some(value) = env_u64("FORUM_MIRROR_QUEUE_CAPACITY") {
            cfg.mirror.queue_capacity = value as usize;
        }
        if let Some(value) = env_u64("FORUM_MIRROR_MAX_RETRIES") {
            cfg.mirror.max_retries = value as u32;
        }
        if let Some(value) = env_u64("FORUM_MIRROR_RETRY_BACKOFF_MS") {
            cfg.mirror.retry_backoff_ms = value;
        }

        // アクション単位の上書き: FORUM_RATE_LIMIT_<ACTION>=max,window_ms,block_ms
        for (action, limit) in cfg.rate_limits.actions.iter_mut() {
            let key = format!("FORUM_RATE_LIMIT_{}", action.to_ascii_uppercase());
            if let Ok(v) = std::env::var(&key) {
                match parse_rate_limit(&v) {
                    Some(parsed) => *limit = parsed,
                    None => tracing::warn!(variable = %key, value = %v, "ignoring malformed rate limit override"),
                }
            }
        }

        cfg
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.storage.database_url.trim().is_empty() {
            return Err("Storage database_url must not be empty".to_string());
        }
        if self.cache.default_ttl_ms <= 0 {
            return Err("Cache default_ttl_ms must be greater than 0".to_string());
        }
        if self.cache.default_ttl_ms > MAX_DURATION_MS {
            return Err(format!(
                "Cache default_ttl_ms must be at most {MAX_DURATION_MS}"
            ));
        }
        for (action, limit) in &self.rate_limits.actions {
            if limit.max_requests == 0 {
                return Err(format!(
                    "Rate limit max_requests for '{action}' must be greater than 0"
                ));
            }
            if limit.window_ms <= 0 || limit.block_duration_ms < 0 {
                return Err(format!("Rate limit durations for '{action}' are invalid"));
            }
            if limit.window_ms > MAX_DURATION_MS || limit.block_duration_ms > MAX_DURATION_MS {
                return Err(format!(
                    "Rate limit durations for '{action}' must be at most {MAX_DURATION_MS} ms"
                ));
            }
        }
        if self.audit.max_entries == 0 {
            return Err("Audit max_entries must be greater than 0".to_string());
        }
        if self.notifications.max_entries == 0 {
            return Err("Notifications max_entries must be greater than 0".to_string());
        }
        if self.notifications.ttl_days <= 0 {
            return Err("Notifications ttl_days must be greater than 0".to_string());
        }
        if self.notifications.ttl_days > MAX_NOTIFICATION_TTL_DAYS {
            return Err(format!(
                "Notifications ttl_days must be at most {MAX_NOTIFICATION_TTL_DAYS}"
            ));
        }
        if self.backup.history_limit == 0 {
            return Err("Backup history_limit must be greater than 0".to_string());
        }
        if self.mirror.queue_capacity == 0 {
            return Err("Mirror queue_capacity must be greater than 0".to_string());
        }
        if let Some(url) = &self.backend.url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(format!("Backend url must be http(s): {url}"));
            }
        }
        Ok(())
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|dir| dir.join("forum-core"))
        .unwrap_or_else(|| PathBuf::from("./data"))
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|v| parse_u64(&v))
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn parse_u64(value: &str) -> Option<u64> {
    value.trim().parse::<u64>().ok()
}

fn parse_i64(value: &str) -> Option<i64> {
    value.trim().parse::<i64>().ok()
}

fn parse_rate_limit(value: &str) -> Option<RateLimitConfig> {
    let mut parts = value.split(',');
    let max_requests = parts.next().and_then(parse_u64)?;
    let window_ms = parts.next().and_then(parse_i64)?;
    let block_duration_ms = parts.next().and_then(parse_i64)?;
    if parts.next().is_some() {
        return None;
    }
    Some(RateLimitConfig::new(
        u32::try_from(max_requests).ok()?,
        window_ms,
        block_duration_ms,
    ))
}
