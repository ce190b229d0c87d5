mod common;

use common::{START_MS, setup, setup_with, test_config};
use forum_core::application::ports::remote_backend::{TABLE_BACKUPS, TABLE_LOGS};
use forum_core::application::services::backup_service::BACKUP_FAILED_MESSAGE;
use forum_core::domain::entities::{BackupSnapshot, BackupType, LogAction, LogFilter};
use forum_core::MemoryBackend;

#[tokio::test]
async fn manual_backup_exports_snapshot_and_mirrors() {
    let ctx = setup().await;
    let outcome = ctx.state.backups.create_backup(BackupType::Manual).await;
    assert!(outcome.success);
    let summary = outcome.data.unwrap();
    assert_eq!(summary.records, 7);
    assert_eq!(summary.file_name, format!("backup_2026-01-01_{START_MS}.json"));

    let body = std::fs::read(ctx.export_dir.join(&summary.file_name)).unwrap();
    let snapshot: BackupSnapshot = serde_json::from_slice(&body).unwrap();
    assert_eq!(snapshot.metadata.tables.len(), 4);
    assert_eq!(snapshot.statistics.total_records, 7);

    ctx.state.mirror.flush().await;
    let mirrored = ctx.backend.rows(TABLE_BACKUPS).await;
    assert_eq!(mirrored.len(), 1);
    assert_eq!(mirrored[0]["id"], summary.id.as_str());
    assert_eq!(mirrored[0]["records_count"], 7);

    let logs = ctx.backend.rows(TABLE_LOGS).await;
    assert!(logs.iter().any(|row| row["action"] == "backup_created"));
}

#[tokio::test]
async fn empty_backend_still_produces_snapshot() {
    let ctx = setup_with(test_config(), MemoryBackend::new()).await;
    let outcome = ctx.state.backups.create_backup(BackupType::Automatic).await;
    assert!(outcome.success);
    assert_eq!(outcome.data.unwrap().records, 0);
}

#[tokio::test]
async fn export_failure_leaves_no_history() {
    let ctx = setup().await;
    // エクスポート先をファイルで塞ぐ
    std::fs::write(&ctx.export_dir, b"not a directory").unwrap();

    let outcome = ctx.state.backups.create_backup(BackupType::Manual).await;
    assert!(!outcome.success);
    assert_eq!(outcome.error.as_deref(), Some(BACKUP_FAILED_MESSAGE));
    assert!(ctx.state.backups.list_backups().await.is_empty());

    let failed = ctx
        .state
        .audit
        .get_logs(&LogFilter {
            action: Some(LogAction::BackupFailed),
            ..Default::default()
        })
        .await;
    assert_eq!(failed.len(), 1);
}

#[tokio::test]
async fn history_survives_across_state_instances() {
    let ctx = setup().await;
    for _ in 0..11 {
        assert!(ctx.state.backups.create_backup(BackupType::Manual).await.success);
        ctx.clock.advance(60_000);
    }
    let history = ctx.state.backups.list_backups().await;
    assert_eq!(history.len(), 10);
    assert!(history.windows(2).all(|pair| pair[0].created_at > pair[1].created_at));

    let oldest_kept = history.last().unwrap().id.clone();
    assert!(ctx.state.backups.load_backup(&oldest_kept).await.is_some());
    assert!(ctx.state.backups.delete_backup(&oldest_kept).await.unwrap());
    assert_eq!(ctx.state.backups.list_backups().await.len(), 9);
}

#[tokio::test]
async fn auto_backup_switch_is_persisted() {
    let ctx = setup().await;
    assert!(!ctx.state.backups.is_auto_backup_enabled().await);
    ctx.state.backups.set_auto_backup_enabled(true).await.unwrap();
    assert!(ctx.state.backups.is_auto_backup_enabled().await);

    let outcome = ctx.state.backups.run_scheduled_backup().await.unwrap();
    assert!(outcome.success);
    assert_eq!(
        ctx.state.backups.list_backups().await[0].kind,
        BackupType::Automatic
    );

    ctx.state.backups.set_auto_backup_enabled(false).await.unwrap();
    assert!(ctx.state.backups.run_scheduled_backup().await.is_none());
}
