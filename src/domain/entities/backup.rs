use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

pub const SNAPSHOT_VERSION: &str = "1.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupType {
    Manual,
    Automatic,
}

/// `Failed` は履歴フォーマット互換のために残している（現状の作成経路では生成しない）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupStatus {
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupRecord {
    pub id: String,
    pub created_at: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: BackupType,
    pub records_count: usize,
    pub status: BackupStatus,
    pub file_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub id: String,
    pub created_at: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: BackupType,
    pub version: String,
    pub tables: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotStatistics {
    pub total_records: usize,
    pub tables: BTreeMap<String, usize>,
}

/// エクスポートされるバックアップ文書
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupSnapshot {
    pub metadata: SnapshotMetadata,
    pub data: BTreeMap<String, Vec<Value>>,
    pub statistics: SnapshotStatistics,
}

impl BackupSnapshot {
    pub fn build(
        id: String,
        kind: BackupType,
        created_at: DateTime<Utc>,
        tables: Vec<(String, Vec<Value>)>,
    ) -> Self {
        let mut statistics = SnapshotStatistics::default();
        let mut data = BTreeMap::new();
        let mut names = Vec::with_capacity(tables.len());
        for (table, rows) in tables {
            statistics.total_records += rows.len();
            statistics.tables.insert(table.clone(), rows.len());
            names.push(table.clone());
            data.insert(table, rows);
        }

        Self {
            metadata: SnapshotMetadata {
                id,
                created_at,
                kind,
                version: SNAPSHOT_VERSION.to_string(),
                tables: names,
            },
            data,
            statistics,
        }
    }

    pub fn file_name(&self) -> String {
        format!(
            "backup_{}_{}.json",
            self.metadata.created_at.format("%Y-%m-%d"),
            self.metadata.created_at.timestamp_millis()
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupSummary {
    pub id: String,
    pub records: usize,
    pub timestamp: DateTime<Utc>,
    pub file_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<BackupSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BackupOutcome {
    pub fn completed(summary: BackupSummary) -> Self {
        Self {
            success: true,
            data: Some(summary),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }
}
