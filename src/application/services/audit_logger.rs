use crate::application::ports::file_export::FileExporter;
use crate::application::ports::local_storage::{AUDIT_LOGS_KEY, LocalStorage};
use crate::application::ports::remote_backend::TABLE_LOGS;
use crate::domain::entities::{
    AuditUser, LogAction, LogEntry, LogFilter, LogLevel, LogStats,
};
use crate::infrastructure::jobs::MirrorQueue;
use crate::shared::bounded::BoundedList;
use crate::shared::clock::Clock;
use crate::shared::error::AppError;
use chrono::Duration;
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard, RwLock};
use tracing::{debug, warn};

struct LogState {
    entries: BoundedList<LogEntry>,
    loaded: bool,
}

/// 端末ローカルの監査ログ
///
/// 新しい順に `max_entries` 件まで保持し、ストレージには時系列順で保存する。
/// 保存・ミラーの失敗は呼び出し側に伝播させない。
pub struct AuditLogger {
    storage: Arc<dyn LocalStorage>,
    exporter: Arc<dyn FileExporter>,
    mirror: Option<MirrorQueue>,
    clock: Arc<dyn Clock>,
    user: RwLock<Option<AuditUser>>,
    state: Mutex<LogState>,
}

impl AuditLogger {
    pub fn new(
        storage: Arc<dyn LocalStorage>,
        exporter: Arc<dyn FileExporter>,
        mirror: Option<MirrorQueue>,
        clock: Arc<dyn Clock>,
        max_entries: usize,
    ) -> Self {
        Self {
            storage,
            exporter,
            mirror,
            clock,
            user: RwLock::new(None),
            state: Mutex::new(LogState {
                entries: BoundedList::new(max_entries),
                loaded: false,
            }),
        }
    }

    pub async fn set_user(&self, user: Option<AuditUser>) {
        *self.user.write().await = user;
    }

    pub async fn current_user(&self) -> Option<AuditUser> {
        self.user.read().await.clone()
    }

    pub async fn log(
        &self,
        action: LogAction,
        level: LogLevel,
        details: Map<String, Value>,
    ) -> LogEntry {
        let entry = {
            let user = self.user.read().await;
            LogEntry::new(action, level, details, user.as_ref(), self.clock.now())
        };

        let mut state = self.state().await;
        let evicted = state.entries.push(entry.clone());
        if evicted > 0 {
            debug!(evicted, "audit log trimmed to capacity");
        }
        self.persist(&state.entries).await;
        drop(state);

        if let Some(mirror) = &self.mirror {
            match serde_json::to_value(&entry) {
                Ok(row) => mirror.enqueue(TABLE_LOGS, row),
                Err(err) => warn!(error = %err, "failed to serialize audit entry for mirror"),
            }
        }
        entry
    }

    pub async fn info(&self, action: LogAction, details: Map<String, Value>) -> LogEntry {
        self.log(action, LogLevel::Info, details).await
    }

    pub async fn warning(&self, action: LogAction, details: Map<String, Value>) -> LogEntry {
        self.log(action, LogLevel::Warning, details).await
    }

    pub async fn error(&self, action: LogAction, details: Map<String, Value>) -> LogEntry {
        self.log(action, LogLevel::Error, details).await
    }

    pub async fn critical(&self, action: LogAction, details: Map<String, Value>) -> LogEntry {
        self.log(action, LogLevel::Critical, details).await
    }

    /// 新しい順で返す
    pub async fn get_logs(&self, filter: &LogFilter) -> Vec<LogEntry> {
        let state = self.state().await;
        let matching = state.entries.iter().filter(|entry| filter.matches(entry));
        match filter.limit {
            Some(limit) => matching.take(limit).cloned().collect(),
            None => matching.cloned().collect(),
        }
    }

    pub async fn get_stats(&self) -> LogStats {
        let now = self.clock.now();
        let today = now.date_naive();
        let week_start = now - Duration::days(7);

        let state = self.state().await;
        let mut stats = LogStats::default();
        for entry in state.entries.iter() {
            stats.total += 1;
            if entry.timestamp.date_naive() == today {
                stats.today += 1;
            }
            if entry.timestamp >= week_start {
                stats.this_week += 1;
            }
            if entry.level.is_error() {
                stats.errors += 1;
            }
            *stats.by_level.entry(entry.level).or_insert(0) += 1;
            *stats.by_action.entry(entry.action).or_insert(0) += 1;
        }
        stats
    }

    pub async fn clear_logs(&self) {
        let mut state = self.state().await;
        let cleared = state.entries.len();
        state.entries.clear();
        if let Err(err) = self.storage.remove_item(AUDIT_LOGS_KEY).await {
            warn!(error = %err, "failed to remove persisted audit logs");
        }
        debug!(cleared, "audit logs cleared");
    }

    /// `audit_logs_<YYYY-MM-DD>.json` として全件を書き出す
    pub async fn export_logs(&self) -> Result<PathBuf, AppError> {
        let entries = self.state().await.entries.to_vec();
        let body = serde_json::to_vec_pretty(&entries)?;
        let file_name = format!("audit_logs_{}.json", self.clock.now().format("%Y-%m-%d"));
        let path = self.exporter.export(&file_name, &body).await?;

        let mut details = Map::new();
        details.insert("file_name".to_string(), Value::String(file_name));
        details.insert("entries".to_string(), Value::from(entries.len()));
        self.info(LogAction::LogsExported, details).await;
        Ok(path)
    }

    pub async fn len(&self) -> usize {
        self.state().await.entries.len()
    }

    async fn state(&self) -> MutexGuard<'_, LogState> {
        let mut state = self.state.lock().await;
        if !state.loaded {
            let capacity = state.entries.capacity();
            state.entries = self.load(capacity).await;
            state.loaded = true;
        }
        state
    }

    async fn load(&self, capacity: usize) -> BoundedList<LogEntry> {
        let raw = match self.storage.get_item(AUDIT_LOGS_KEY).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return BoundedList::new(capacity),
            Err(err) => {
                warn!(error = %err, "failed to read audit logs; starting empty");
                return BoundedList::new(capacity);
            }
        };
        match serde_json::from_str::<Vec<LogEntry>>(&raw) {
            Ok(entries) => BoundedList::from_oldest_first(entries, capacity),
            Err(err) => {
                warn!(error = %err, "corrupt audit log in storage; starting empty");
                BoundedList::new(capacity)
            }
        }
    }

    async fn persist(&self, entries: &BoundedList<LogEntry>) {
        let serialized = match serde_json::to_string(&entries.to_vec_oldest_first()) {
            Ok(serialized) => serialized,
            Err(err) => {
                warn!(error = %err, "failed to serialize audit logs");
                return;
            }
        };
        if let Err(err) = self.storage.set_item(AUDIT_LOGS_KEY, &serialized).await {
            warn!(error = %err, "failed to persist audit logs");
        }
    }
}
