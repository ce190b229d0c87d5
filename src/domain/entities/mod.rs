pub mod audit_log;
pub mod backup;
pub mod forum;
pub mod notification;

pub use audit_log::{AuditUser, LogAction, LogEntry, LogFilter, LogLevel, LogStats};
pub use backup::{
    BackupOutcome, BackupRecord, BackupSnapshot, BackupStatus, BackupSummary, BackupType,
};
pub use forum::{MediaAttachment, NewComment, NewPost, Reaction, group_posts_cache_key};
pub use notification::{Notification, NotificationStats, NotificationType};
