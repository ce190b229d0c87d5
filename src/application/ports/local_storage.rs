use crate::shared::error::AppError;
use async_trait::async_trait;

pub const AUDIT_LOGS_KEY: &str = "audit_logs";
pub const BACKUP_HISTORY_KEY: &str = "backupHistory";
pub const CLIENT_ID_KEY: &str = "client_id";
pub const AUTO_BACKUP_ENABLED_KEY: &str = "auto_backup_enabled";

/// ユーザー単位の通知リストのキー
pub fn notifications_key(user_key: &str) -> String {
    format!("notifications_{user_key}")
}

/// 文字列キー → JSON 文字列の端末ローカルストレージ
#[async_trait]
pub trait LocalStorage: Send + Sync {
    async fn get_item(&self, key: &str) -> Result<Option<String>, AppError>;
    async fn set_item(&self, key: &str, value: &str) -> Result<(), AppError>;
    async fn remove_item(&self, key: &str) -> Result<(), AppError>;
}
