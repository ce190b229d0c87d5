use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

pub const ANONYMOUS_USER_ID: &str = "anonymous";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
    Critical,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Info => "info",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
            LogLevel::Critical => "critical",
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, LogLevel::Error | LogLevel::Critical)
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogAction {
    Login,
    Logout,
    LoginFailed,
    PostCreated,
    PostUpdated,
    PostDeleted,
    CommentCreated,
    CommentDeleted,
    ReactionAdded,
    FileUploaded,
    BackupCreated,
    BackupFailed,
    BackupDeleted,
    UserCreated,
    UserUpdated,
    UserDeleted,
    RateLimitExceeded,
    SettingsChanged,
    LogsCleared,
    LogsExported,
    SystemError,
}

impl LogAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogAction::Login => "login",
            LogAction::Logout => "logout",
            LogAction::LoginFailed => "login_failed",
            LogAction::PostCreated => "post_created",
            LogAction::PostUpdated => "post_updated",
            LogAction::PostDeleted => "post_deleted",
            LogAction::CommentCreated => "comment_created",
            LogAction::CommentDeleted => "comment_deleted",
            LogAction::ReactionAdded => "reaction_added",
            LogAction::FileUploaded => "file_uploaded",
            LogAction::BackupCreated => "backup_created",
            LogAction::BackupFailed => "backup_failed",
            LogAction::BackupDeleted => "backup_deleted",
            LogAction::UserCreated => "user_created",
            LogAction::UserUpdated => "user_updated",
            LogAction::UserDeleted => "user_deleted",
            LogAction::RateLimitExceeded => "rate_limit_exceeded",
            LogAction::SettingsChanged => "settings_changed",
            LogAction::LogsCleared => "logs_cleared",
            LogAction::LogsExported => "logs_exported",
            LogAction::SystemError => "system_error",
        }
    }
}

impl fmt::Display for LogAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 監査ログに刻印するユーザー情報
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditUser {
    pub user_id: String,
    pub email: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl AuditUser {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            email: None,
            ip_address: None,
            user_agent: None,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_email: Option<String>,
    pub action: LogAction,
    pub level: LogLevel,
    #[serde(default)]
    pub details: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

impl LogEntry {
    pub fn new(
        action: LogAction,
        level: LogLevel,
        details: Map<String, Value>,
        user: Option<&AuditUser>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp,
            user_id: user
                .map(|u| u.user_id.clone())
                .unwrap_or_else(|| ANONYMOUS_USER_ID.to_string()),
            user_email: user.and_then(|u| u.email.clone()),
            action,
            level,
            details,
            ip_address: user.and_then(|u| u.ip_address.clone()),
            user_agent: user.and_then(|u| u.user_agent.clone()),
        }
    }
}

/// `get_logs` の絞り込み条件（すべて AND）
#[derive(Debug, Clone, Default)]
pub struct LogFilter {
    pub level: Option<LogLevel>,
    pub action: Option<LogAction>,
    pub user_id: Option<String>,
    pub limit: Option<usize>,
}

impl LogFilter {
    pub fn matches(&self, entry: &LogEntry) -> bool {
        self.level.is_none_or(|level| entry.level == level)
            && self.action.is_none_or(|action| entry.action == action)
            && self
                .user_id
                .as_deref()
                .is_none_or(|user_id| entry.user_id == user_id)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LogStats {
    pub total: usize,
    pub today: usize,
    pub this_week: usize,
    pub errors: usize,
    pub by_level: BTreeMap<LogLevel, usize>,
    pub by_action: BTreeMap<LogAction, usize>,
}
