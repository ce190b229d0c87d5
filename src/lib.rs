pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod shared;
pub mod state;

pub use application::ports::{FileExporter, LocalStorage, RemoteBackend};
pub use application::services::{
    AuditLogger, BackupService, ForumService, NotificationService, RateLimitService,
};
pub use infrastructure::backend::{MemoryBackend, RestBackend};
pub use infrastructure::cache::DataCache;
pub use infrastructure::jobs::{MirrorQueue, MirrorStatus};
pub use infrastructure::storage::{
    ConnectionPool, DirectoryExporter, MemoryLocalStorage, SqliteLocalStorage,
};
pub use shared::{AppConfig, AppError, Clock, ManualClock, SystemClock};
pub use state::AppState;

/// ログ設定の初期化（`RUST_LOG` 未設定時は `forum_core=debug,info`）
pub fn init_logging() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "forum_core=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}
