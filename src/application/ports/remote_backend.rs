use crate::shared::error::AppError;
use async_trait::async_trait;
use serde_json::Value;

pub const TABLE_POSTS: &str = "posts";
pub const TABLE_COMMENTS: &str = "comentarios";
pub const TABLE_USERS: &str = "users";
pub const TABLE_STUDENTS: &str = "students";
pub const TABLE_LOGS: &str = "logs";
pub const TABLE_BACKUPS: &str = "backups";
pub const TABLE_GROUP_HOME_DATA: &str = "group_home_data";
pub const TABLE_STUDENT_ESSAYS: &str = "student_essays";

pub const RPC_SMART_INCREMENT_REACTION: &str = "smart_increment_reaction";
pub const RPC_CREATE_POST_WITH_MEDIA: &str = "create_post_with_media";

/// ホスト型バックエンド（行ストア + RPC）への窓口
#[async_trait]
pub trait RemoteBackend: Send + Sync {
    async fn insert_row(&self, table: &str, row: Value) -> Result<(), AppError>;

    async fn select_all(&self, table: &str) -> Result<Vec<Value>, AppError>;

    async fn select_eq(&self, table: &str, column: &str, value: &str)
        -> Result<Vec<Value>, AppError>;

    /// 削除した行数を返す
    async fn delete_eq(&self, table: &str, column: &str, value: &str) -> Result<u64, AppError>;

    async fn call_rpc(&self, function: &str, params: Value) -> Result<Value, AppError>;
}
