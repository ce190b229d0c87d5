use crate::application::ports::{FileExporter, LocalStorage, RemoteBackend};
use crate::application::services::{
    AuditLogger, BackupService, ForumService, NotificationService, RateLimitService,
};
use crate::infrastructure::backend::{MemoryBackend, RestBackend};
use crate::infrastructure::cache::DataCache;
use crate::infrastructure::jobs::{MirrorQueue, spawn_auto_backup, spawn_rate_limit_sweep};
use crate::infrastructure::storage::{DirectoryExporter, SqliteLocalStorage};
use crate::shared::clock::{Clock, SystemClock};
use crate::shared::config::AppConfig;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

/// アプリケーション全体の状態を管理する構造体
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub clock: Arc<dyn Clock>,
    pub storage: Arc<dyn LocalStorage>,
    pub backend: Arc<dyn RemoteBackend>,
    pub mirror: MirrorQueue,
    pub cache: Arc<DataCache<Vec<Value>>>,
    pub rate_limits: Arc<RateLimitService>,
    pub audit: Arc<AuditLogger>,
    pub notifications: Arc<NotificationService>,
    pub backups: Arc<BackupService>,
    pub forum: Arc<ForumService>,
}

impl AppState {
    pub async fn new(config: AppConfig) -> anyhow::Result<Self> {
        config.validate().map_err(anyhow::Error::msg)?;

        if let Some(parent) = sqlite_file_path(&config.storage.database_url)
            .as_deref()
            .and_then(|path| path.parent())
        {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let storage = Arc::new(SqliteLocalStorage::connect(&config.storage.database_url).await?);

        let backend: Arc<dyn RemoteBackend> = match RestBackend::from_config(&config.backend)? {
            Some(rest) => Arc::new(rest),
            None => {
                info!("FORUM_BACKEND_URL not set; using in-memory backend");
                Arc::new(MemoryBackend::new())
            }
        };
        let exporter = Arc::new(DirectoryExporter::new(config.storage.export_dir.clone()));

        Ok(Self::with_components(
            config,
            storage,
            backend,
            exporter,
            Arc::new(SystemClock),
        ))
    }

    /// 依存を差し替えて組み立てる（Tokio ランタイム内で呼ぶこと）
    pub fn with_components(
        config: AppConfig,
        storage: Arc<dyn LocalStorage>,
        backend: Arc<dyn RemoteBackend>,
        exporter: Arc<dyn FileExporter>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let mirror = MirrorQueue::spawn(Arc::clone(&backend), &config.mirror, Arc::clone(&clock));
        let cache = Arc::new(DataCache::new(config.cache.default_ttl_ms, Arc::clone(&clock)));
        let rate_limits = Arc::new(RateLimitService::new(
            &config.rate_limits,
            Arc::clone(&storage),
            Arc::clone(&clock),
        ));
        let audit = Arc::new(AuditLogger::new(
            Arc::clone(&storage),
            Arc::clone(&exporter),
            Some(mirror.clone()),
            Arc::clone(&clock),
            config.audit.max_entries,
        ));
        let notifications = Arc::new(NotificationService::new(
            Arc::clone(&storage),
            Arc::clone(&clock),
            config.notifications.max_entries,
            config.notifications.ttl_days,
        ));
        let backups = Arc::new(BackupService::new(
            Arc::clone(&backend),
            Arc::clone(&storage),
            exporter,
            Arc::clone(&audit),
            Some(mirror.clone()),
            Arc::clone(&clock),
            config.backup.history_limit,
        ));
        let forum = Arc::new(ForumService::new(
            Arc::clone(&backend),
            Arc::clone(&cache),
            Arc::clone(&rate_limits),
            Arc::clone(&audit),
            Arc::clone(&notifications),
        ));

        Self {
            config: Arc::new(config),
            clock,
            storage,
            backend,
            mirror,
            cache,
            rate_limits,
            audit,
            notifications,
            backups,
            forum,
        }
    }

    /// レート制限の掃除と自動バックアップを起動する
    pub fn spawn_background_jobs(&self) -> Vec<JoinHandle<()>> {
        vec![
            spawn_rate_limit_sweep(
                Arc::clone(&self.rate_limits),
                self.config.rate_limits.sweep_interval_secs,
            ),
            spawn_auto_backup(
                Arc::clone(&self.backups),
                self.config.backup.auto_backup_interval_secs,
            ),
        ]
    }
}

/// `sqlite:` URL からファイルパスを取り出す（メモリDBは None）
fn sqlite_file_path(database_url: &str) -> Option<PathBuf> {
    let rest = database_url
        .strip_prefix("sqlite://")
        .or_else(|| database_url.strip_prefix("sqlite:"))?;
    let path = rest.split('?').next().unwrap_or_default();
    if path.is_empty() || path == ":memory:" {
        return None;
    }
    Some(PathBuf::from(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{AuditUser, BackupType, LogAction, LogFilter};
    use crate::infrastructure::storage::MemoryLocalStorage;
    use crate::shared::clock::ManualClock;

    #[test]
    fn extracts_sqlite_file_path() {
        assert_eq!(
            sqlite_file_path("sqlite:/tmp/forum/forum.db?mode=rwc"),
            Some(PathBuf::from("/tmp/forum/forum.db"))
        );
        assert_eq!(
            sqlite_file_path("sqlite://./data/forum.db"),
            Some(PathBuf::from("./data/forum.db"))
        );
        assert_eq!(sqlite_file_path("sqlite::memory:"), None);
        assert_eq!(sqlite_file_path("postgres://localhost/db"), None);
    }

    #[tokio::test]
    async fn new_builds_sqlite_backed_state() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.storage.database_url =
            format!("sqlite:{}?mode=rwc", dir.path().join("db/forum.db").display());
        config.storage.export_dir = dir.path().join("exports");

        let state = AppState::new(config).await.unwrap();
        state.forum.login(AuditUser::new("u1")).await.unwrap();
        assert!(dir.path().join("db/forum.db").exists());

        let outcome = state.backups.create_backup(BackupType::Manual).await;
        assert!(outcome.success);
        state.mirror.flush().await;
        assert_eq!(state.mirror.status().delivered, 3);
    }

    #[tokio::test]
    async fn invalid_config_is_rejected() {
        let mut config = AppConfig::default();
        config.audit.max_entries = 0;
        assert!(AppState::new(config).await.is_err());
    }

    #[tokio::test]
    async fn background_jobs_can_be_stopped() {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::with_components(
            AppConfig::default(),
            Arc::new(MemoryLocalStorage::new()),
            Arc::new(MemoryBackend::new()),
            Arc::new(DirectoryExporter::new(dir.path())),
            Arc::new(ManualClock::new(0)),
        );
        let handles = state.spawn_background_jobs();
        assert_eq!(handles.len(), 2);
        for handle in handles {
            handle.abort();
        }

        state.audit.info(LogAction::SettingsChanged, Default::default()).await;
        assert_eq!(state.audit.get_logs(&LogFilter::default()).await.len(), 1);
    }
}
