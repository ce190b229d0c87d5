#![allow(dead_code)]

use forum_core::application::ports::remote_backend::{
    TABLE_COMMENTS, TABLE_POSTS, TABLE_STUDENTS, TABLE_USERS,
};
use forum_core::{
    AppConfig, AppState, ConnectionPool, DirectoryExporter, ManualClock, MemoryBackend,
    SqliteLocalStorage,
};
use serde_json::{Value, json};
use std::sync::Arc;

/// 2026-01-01T00:00:00Z
pub const START_MS: i64 = 1_767_225_600_000;

pub struct TestContext {
    pub state: AppState,
    pub backend: MemoryBackend,
    pub clock: Arc<ManualClock>,
    pub export_dir: std::path::PathBuf,
    _dir: tempfile::TempDir,
}

pub fn create_test_post(id: &str, group_id: &str, author_id: &str) -> Value {
    json!({
        "id": id,
        "group_id": group_id,
        "author_id": author_id,
        "title": format!("Post {id}"),
        "content": format!("Contenido de prueba {id}"),
        "media": [],
        "reactions": {},
        "created_at": "2026-01-01T00:00:00Z"
    })
}

pub fn create_test_user(id: &str) -> Value {
    json!({
        "id": id,
        "email": format!("{id}@example.edu"),
        "role": "student"
    })
}

pub async fn seeded_backend() -> MemoryBackend {
    MemoryBackend::new()
        .with_rows(
            TABLE_POSTS,
            vec![
                create_test_post("p1", "3", "profesor"),
                create_test_post("p2", "3", "profesor"),
                create_test_post("p3", "31", "profesor"),
            ],
        )
        .await
        .with_rows(TABLE_COMMENTS, vec![json!({"id": "c1", "post_id": "p1"})])
        .await
        .with_rows(TABLE_STUDENTS, vec![json!({"id": "s1", "group_id": "3"})])
        .await
        .with_rows(
            TABLE_USERS,
            vec![create_test_user("profesor"), create_test_user("student")],
        )
        .await
}

pub async fn setup_with(config: AppConfig, backend: MemoryBackend) -> TestContext {
    let pool = ConnectionPool::from_memory().await.expect("in-memory sqlite");
    pool.migrate().await.expect("migrations");
    let storage = Arc::new(SqliteLocalStorage::new(pool));

    let dir = tempfile::tempdir().expect("tempdir");
    let export_dir = dir.path().join("exports");
    let clock = Arc::new(ManualClock::new(START_MS));
    let state = AppState::with_components(
        config,
        storage,
        Arc::new(backend.clone()),
        Arc::new(DirectoryExporter::new(&export_dir)),
        clock.clone(),
    );

    TestContext {
        state,
        backend,
        clock,
        export_dir,
        _dir: dir,
    }
}

pub async fn setup() -> TestContext {
    let backend = seeded_backend().await;
    setup_with(test_config(), backend).await
}

pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.mirror.retry_backoff_ms = 1;
    config
}
