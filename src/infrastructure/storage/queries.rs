pub const SELECT_ITEM: &str = "SELECT value FROM local_storage WHERE key = ?";

pub const UPSERT_ITEM: &str = r#"
INSERT INTO local_storage (key, value, updated_at)
VALUES (?, ?, ?)
ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
"#;

pub const DELETE_ITEM: &str = "DELETE FROM local_storage WHERE key = ?";
