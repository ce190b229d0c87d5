use crate::shared::error::AppError;
use async_trait::async_trait;
use std::path::PathBuf;

/// 生成したファイルの受け渡し先（ブラウザのダウンロードに相当）
#[async_trait]
pub trait FileExporter: Send + Sync {
    async fn export(&self, file_name: &str, contents: &[u8]) -> Result<PathBuf, AppError>;
}
