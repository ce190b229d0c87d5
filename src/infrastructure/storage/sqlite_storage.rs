use super::connection_pool::ConnectionPool;
use super::queries::{DELETE_ITEM, SELECT_ITEM, UPSERT_ITEM};
use crate::application::ports::local_storage::LocalStorage;
use crate::shared::error::AppError;
use async_trait::async_trait;
use chrono::Utc;

/// SQLite の `local_storage` テーブルを使う端末ストレージ
#[derive(Clone)]
pub struct SqliteLocalStorage {
    pool: ConnectionPool,
}

impl SqliteLocalStorage {
    pub fn new(pool: ConnectionPool) -> Self {
        Self { pool }
    }

    /// 接続してマイグレーションまで済ませる
    pub async fn connect(database_url: &str) -> Result<Self, AppError> {
        let pool = ConnectionPool::new(database_url).await?;
        pool.migrate().await?;
        Ok(Self::new(pool))
    }
}

#[async_trait]
impl LocalStorage for SqliteLocalStorage {
    async fn get_item(&self, key: &str) -> Result<Option<String>, AppError> {
        let value = sqlx::query_scalar::<_, String>(SELECT_ITEM)
            .bind(key)
            .fetch_optional(self.pool.get_pool())
            .await?;
        Ok(value)
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<(), AppError> {
        sqlx::query(UPSERT_ITEM)
            .bind(key)
            .bind(value)
            .bind(Utc::now().timestamp_millis())
            .execute(self.pool.get_pool())
            .await?;
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> Result<(), AppError> {
        sqlx::query(DELETE_ITEM)
            .bind(key)
            .execute(self.pool.get_pool())
            .await?;
        Ok(())
    }
}
