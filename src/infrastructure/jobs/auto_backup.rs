use crate::application::services::BackupService;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// 自動バックアップが有効な間、一定間隔でバックアップを作成する
pub fn spawn_auto_backup(backups: Arc<BackupService>, interval_secs: u64) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs.max(60)));
        interval.tick().await;
        loop {
            interval.tick().await;
            match backups.run_scheduled_backup().await {
                Some(outcome) if outcome.success => {
                    info!(
                        backup_id = outcome.data.as_ref().map(|d| d.id.as_str()),
                        "automatic backup completed"
                    );
                }
                Some(outcome) => {
                    warn!(error = outcome.error.as_deref(), "automatic backup failed");
                }
                None => {}
            }
        }
    })
}
