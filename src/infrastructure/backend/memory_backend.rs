use crate::application::ports::remote_backend::{
    RPC_CREATE_POST_WITH_MEDIA, RPC_SMART_INCREMENT_REACTION, RemoteBackend, TABLE_POSTS,
};
use crate::shared::error::AppError;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// バックエンド未設定時（オフライン・開発用）に使うメモリ上のテーブル群
#[derive(Clone, Default)]
pub struct MemoryBackend {
    tables: Arc<RwLock<HashMap<String, Vec<Value>>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn with_rows(self, table: &str, rows: Vec<Value>) -> Self {
        {
            let mut tables = self.tables.write().await;
            tables.entry(table.to_string()).or_default().extend(rows);
        }
        self
    }

    pub async fn rows(&self, table: &str) -> Vec<Value> {
        let tables = self.tables.read().await;
        tables.get(table).cloned().unwrap_or_default()
    }

    async fn create_post_with_media(&self, params: &Value) -> Result<Value, AppError> {
        let field = |name: &str| params.get(name).cloned().unwrap_or(Value::Null);
        if !field("p_group_id").is_string() || !field("p_author_id").is_string() {
            return Err(AppError::InvalidInput(
                "p_group_id and p_author_id are required".to_string(),
            ));
        }

        let row = json!({
            "id": uuid::Uuid::new_v4().to_string(),
            "group_id": field("p_group_id"),
            "author_id": field("p_author_id"),
            "title": field("p_title"),
            "content": field("p_content"),
            "media": field("p_media"),
            "reactions": {},
            "created_at": Utc::now().to_rfc3339(),
        });

        let mut tables = self.tables.write().await;
        tables
            .entry(TABLE_POSTS.to_string())
            .or_default()
            .push(row.clone());
        Ok(row)
    }

    async fn smart_increment_reaction(&self, params: &Value) -> Result<Value, AppError> {
        let post_id = params
            .get("p_post_id")
            .and_then(Value::as_str)
            .ok_or_else(|| AppError::InvalidInput("p_post_id is required".to_string()))?;
        let reaction_type = params
            .get("p_reaction_type")
            .and_then(Value::as_str)
            .ok_or_else(|| AppError::InvalidInput("p_reaction_type is required".to_string()))?;

        let mut tables = self.tables.write().await;
        let post = tables
            .get_mut(TABLE_POSTS)
            .and_then(|rows| rows.iter_mut().find(|row| row_matches(row, "id", post_id)))
            .ok_or_else(|| AppError::NotFound(format!("Post {post_id} not found")))?;

        let Some(object) = post.as_object_mut() else {
            return Err(AppError::Internal("Post row is not an object".to_string()));
        };
        let reactions = object
            .entry("reactions")
            .or_insert_with(|| Value::Object(Map::new()));
        if !reactions.is_object() {
            *reactions = Value::Object(Map::new());
        }
        let counters = reactions
            .as_object_mut()
            .ok_or_else(|| AppError::Internal("reactions is not an object".to_string()))?;
        let count = counters
            .get(reaction_type)
            .and_then(Value::as_u64)
            .unwrap_or(0)
            + 1;
        counters.insert(reaction_type.to_string(), json!(count));

        Ok(json!({
            "post_id": post_id,
            "reaction_type": reaction_type,
            "count": count,
        }))
    }
}

#[async_trait]
impl RemoteBackend for MemoryBackend {
    async fn insert_row(&self, table: &str, row: Value) -> Result<(), AppError> {
        let mut tables = self.tables.write().await;
        tables.entry(table.to_string()).or_default().push(row);
        Ok(())
    }

    async fn select_all(&self, table: &str) -> Result<Vec<Value>, AppError> {
        Ok(self.rows(table).await)
    }

    async fn select_eq(
        &self,
        table: &str,
        column: &str,
        value: &str,
    ) -> Result<Vec<Value>, AppError> {
        let tables = self.tables.read().await;
        Ok(tables
            .get(table)
            .map(|rows| {
                rows.iter()
                    .filter(|row| row_matches(row, column, value))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn delete_eq(&self, table: &str, column: &str, value: &str) -> Result<u64, AppError> {
        let mut tables = self.tables.write().await;
        let Some(rows) = tables.get_mut(table) else {
            return Ok(0);
        };
        let before = rows.len();
        rows.retain(|row| !row_matches(row, column, value));
        Ok((before - rows.len()) as u64)
    }

    async fn call_rpc(&self, function: &str, params: Value) -> Result<Value, AppError> {
        match function {
            RPC_CREATE_POST_WITH_MEDIA => self.create_post_with_media(&params).await,
            RPC_SMART_INCREMENT_REACTION => self.smart_increment_reaction(&params).await,
            other => Err(AppError::NotFound(format!("Unknown RPC: {other}"))),
        }
    }
}

/// 値が文字列・数値どちらで保存されていても文字列表現で比較する
fn row_matches(row: &Value, column: &str, expected: &str) -> bool {
    match row.get(column) {
        Some(Value::String(s)) => s == expected,
        Some(Value::Number(n)) => n.to_string() == expected,
        Some(Value::Bool(b)) => b.to_string() == expected,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn insert_select_and_delete() {
        let backend = MemoryBackend::new();
        backend
            .insert_row("posts", json!({"id": 1, "group_id": "3"}))
            .await
            .unwrap();
        backend
            .insert_row("posts", json!({"id": 2, "group_id": "31"}))
            .await
            .unwrap();

        assert_eq!(backend.select_all("posts").await.unwrap().len(), 2);
        assert_eq!(
            backend.select_eq("posts", "group_id", "3").await.unwrap(),
            vec![json!({"id": 1, "group_id": "3"})]
        );
        assert_eq!(backend.delete_eq("posts", "id", "2").await.unwrap(), 1);
        assert_eq!(backend.delete_eq("missing", "id", "2").await.unwrap(), 0);
        assert!(backend.select_all("missing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn create_post_and_increment_reaction() {
        let backend = MemoryBackend::new();
        let post = backend
            .call_rpc(
                RPC_CREATE_POST_WITH_MEDIA,
                json!({"p_group_id": "g1", "p_author_id": "u1", "p_title": "t", "p_content": "c", "p_media": []}),
            )
            .await
            .unwrap();
        let post_id = post["id"].as_str().unwrap().to_string();

        for expected in 1..=2u64 {
            let result = backend
                .call_rpc(
                    RPC_SMART_INCREMENT_REACTION,
                    json!({"p_post_id": post_id, "p_user_id": "u2", "p_reaction_type": "like"}),
                )
                .await
                .unwrap();
            assert_eq!(result["count"], expected);
        }

        let rows = backend.select_eq("posts", "id", &post_id).await.unwrap();
        assert_eq!(rows[0]["reactions"]["like"], 2);
    }

    #[tokio::test]
    async fn unknown_rpc_and_missing_post_fail() {
        let backend = MemoryBackend::new();
        assert!(matches!(
            backend.call_rpc("nope", json!({})).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            backend
                .call_rpc(
                    RPC_SMART_INCREMENT_REACTION,
                    json!({"p_post_id": "x", "p_reaction_type": "like"})
                )
                .await,
            Err(AppError::NotFound(_))
        ));
    }
}
