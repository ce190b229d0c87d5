use crate::application::ports::file_export::FileExporter;
use crate::application::ports::local_storage::{
    AUTO_BACKUP_ENABLED_KEY, BACKUP_HISTORY_KEY, LocalStorage,
};
use crate::application::ports::remote_backend::{
    RemoteBackend, TABLE_BACKUPS, TABLE_COMMENTS, TABLE_POSTS, TABLE_STUDENTS, TABLE_USERS,
};
use crate::application::services::audit_logger::AuditLogger;
use crate::domain::entities::{
    BackupOutcome, BackupRecord, BackupSnapshot, BackupStatus, BackupSummary, BackupType,
    LogAction,
};
use crate::infrastructure::jobs::MirrorQueue;
use crate::shared::bounded::BoundedList;
use crate::shared::clock::Clock;
use crate::shared::error::AppError;
use futures::future::try_join_all;
use serde_json::{Map, Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

/// スナップショット対象のテーブル
pub const BACKUP_TABLES: [&str; 4] = [TABLE_POSTS, TABLE_COMMENTS, TABLE_STUDENTS, TABLE_USERS];

pub const BACKUP_FAILED_MESSAGE: &str = "Error al crear backup";
pub const BACKUP_IN_PROGRESS_MESSAGE: &str = "Backup already in progress";

struct InProgress<'a>(&'a AtomicBool);

impl Drop for InProgress<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// 固定テーブルの JSON スナップショットを作るサービス
///
/// 復元機能は持たない。履歴は新しい順に `history_limit` 件まで。
pub struct BackupService {
    backend: Arc<dyn RemoteBackend>,
    storage: Arc<dyn LocalStorage>,
    exporter: Arc<dyn FileExporter>,
    audit: Arc<AuditLogger>,
    mirror: Option<MirrorQueue>,
    clock: Arc<dyn Clock>,
    history_limit: usize,
    in_progress: AtomicBool,
    history_lock: Mutex<()>,
}

impl BackupService {
    pub fn new(
        backend: Arc<dyn RemoteBackend>,
        storage: Arc<dyn LocalStorage>,
        exporter: Arc<dyn FileExporter>,
        audit: Arc<AuditLogger>,
        mirror: Option<MirrorQueue>,
        clock: Arc<dyn Clock>,
        history_limit: usize,
    ) -> Self {
        Self {
            backend,
            storage,
            exporter,
            audit,
            mirror,
            clock,
            history_limit,
            in_progress: AtomicBool::new(false),
            history_lock: Mutex::new(()),
        }
    }

    pub fn is_in_progress(&self) -> bool {
        self.in_progress.load(Ordering::SeqCst)
    }

    pub async fn create_backup(&self, kind: BackupType) -> BackupOutcome {
        if self
            .in_progress
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!(?kind, "backup requested while another is running");
            return BackupOutcome::failed(BACKUP_IN_PROGRESS_MESSAGE);
        }
        let _guard = InProgress(&self.in_progress);

        match self.build_backup(kind).await {
            Ok(summary) => {
                info!(backup_id = %summary.id, records = summary.records, "backup created");
                BackupOutcome::completed(summary)
            }
            Err(err) => {
                error!(error = %err, ?kind, "backup failed");
                let mut details = Map::new();
                details.insert("type".to_string(), json!(kind));
                details.insert("error".to_string(), Value::String(err.to_string()));
                self.audit.error(LogAction::BackupFailed, details).await;
                BackupOutcome::failed(BACKUP_FAILED_MESSAGE)
            }
        }
    }

    async fn build_backup(&self, kind: BackupType) -> Result<BackupSummary, AppError> {
        let tables = try_join_all(BACKUP_TABLES.iter().map(|table| async move {
            let rows = self.backend.select_all(table).await?;
            Ok::<_, AppError>((table.to_string(), rows))
        }))
        .await?;

        let id = uuid::Uuid::new_v4().to_string();
        let created_at = self.clock.now();
        let snapshot = BackupSnapshot::build(id.clone(), kind, created_at, tables);
        let file_name = snapshot.file_name();
        let body = serde_json::to_vec_pretty(&snapshot)?;
        self.exporter.export(&file_name, &body).await?;

        let record = BackupRecord {
            id: id.clone(),
            created_at,
            kind,
            records_count: snapshot.statistics.total_records,
            status: BackupStatus::Completed,
            file_name: file_name.clone(),
        };
        self.record_history(record).await?;

        if let Some(mirror) = &self.mirror {
            mirror.enqueue(
                TABLE_BACKUPS,
                json!({
                    "id": id,
                    "created_at": created_at,
                    "type": kind,
                    "records_count": snapshot.statistics.total_records,
                    "data": snapshot,
                }),
            );
        }

        let mut details = Map::new();
        details.insert("backup_id".to_string(), Value::String(id.clone()));
        details.insert("type".to_string(), json!(kind));
        details.insert(
            "records".to_string(),
            Value::from(snapshot.statistics.total_records),
        );
        details.insert("file_name".to_string(), Value::String(file_name.clone()));
        self.audit.info(LogAction::BackupCreated, details).await;

        Ok(BackupSummary {
            id,
            records: snapshot.statistics.total_records,
            timestamp: created_at,
            file_name,
        })
    }

    /// 新しい順
    pub async fn list_backups(&self) -> Vec<BackupRecord> {
        self.load_history().await.to_vec()
    }

    pub async fn load_backup(&self, id: &str) -> Option<BackupRecord> {
        self.load_history().await.find(|record| record.id == id).cloned()
    }

    pub async fn delete_backup(&self, id: &str) -> Result<bool, AppError> {
        let _lock = self.history_lock.lock().await;
        let mut history = self.load_history().await;
        if history.remove_first(|record| record.id == id).is_none() {
            return Ok(false);
        }
        self.save_history(&history).await?;

        if let Err(err) = self.backend.delete_eq(TABLE_BACKUPS, "id", id).await {
            warn!(backup_id = %id, error = %err, "failed to delete remote backup copy");
        }
        let mut details = Map::new();
        details.insert("backup_id".to_string(), Value::String(id.to_string()));
        self.audit.info(LogAction::BackupDeleted, details).await;
        Ok(true)
    }

    pub async fn is_auto_backup_enabled(&self) -> bool {
        match self.storage.get_item(AUTO_BACKUP_ENABLED_KEY).await {
            Ok(value) => value.as_deref() == Some("true"),
            Err(err) => {
                warn!(error = %err, "failed to read auto backup setting");
                false
            }
        }
    }

    pub async fn set_auto_backup_enabled(&self, enabled: bool) -> Result<(), AppError> {
        self.storage
            .set_item(AUTO_BACKUP_ENABLED_KEY, if enabled { "true" } else { "false" })
            .await?;
        let mut details = Map::new();
        details.insert("auto_backup_enabled".to_string(), Value::Bool(enabled));
        self.audit.info(LogAction::SettingsChanged, details).await;
        Ok(())
    }

    /// 自動バックアップが有効な場合のみ実行する
    pub async fn run_scheduled_backup(&self) -> Option<BackupOutcome> {
        if !self.is_auto_backup_enabled().await {
            return None;
        }
        Some(self.create_backup(BackupType::Automatic).await)
    }

    async fn record_history(&self, record: BackupRecord) -> Result<(), AppError> {
        let _lock = self.history_lock.lock().await;
        let mut history = self.load_history().await;
        history.push(record);
        self.save_history(&history).await
    }

    async fn load_history(&self) -> BoundedList<BackupRecord> {
        let raw = match self.storage.get_item(BACKUP_HISTORY_KEY).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return BoundedList::new(self.history_limit),
            Err(err) => {
                warn!(error = %err, "failed to read backup history");
                return BoundedList::new(self.history_limit);
            }
        };
        match serde_json::from_str::<Vec<BackupRecord>>(&raw) {
            Ok(records) => BoundedList::from_newest_first(records, self.history_limit),
            Err(err) => {
                warn!(error = %err, "corrupt backup history; starting empty");
                BoundedList::new(self.history_limit)
            }
        }
    }

    async fn save_history(&self, history: &BoundedList<BackupRecord>) -> Result<(), AppError> {
        let serialized = serde_json::to_string(&history.to_vec())?;
        self.storage.set_item(BACKUP_HISTORY_KEY, &serialized).await
    }
}
