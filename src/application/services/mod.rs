pub mod audit_logger;
pub mod backup_service;
pub mod forum_service;
pub mod notification_service;
pub mod rate_limit_service;

pub use audit_logger::AuditLogger;
pub use backup_service::BackupService;
pub use forum_service::ForumService;
pub use notification_service::NotificationService;
pub use rate_limit_service::RateLimitService;
