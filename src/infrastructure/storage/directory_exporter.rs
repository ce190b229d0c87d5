use crate::application::ports::file_export::FileExporter;
use crate::shared::error::AppError;
use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// エクスポートファイルを指定ディレクトリに書き出す
#[derive(Debug, Clone)]
pub struct DirectoryExporter {
    directory: PathBuf,
}

impl DirectoryExporter {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }
}

#[async_trait]
impl FileExporter for DirectoryExporter {
    async fn export(&self, file_name: &str, contents: &[u8]) -> Result<PathBuf, AppError> {
        let mut components = Path::new(file_name).components();
        let is_plain_name = matches!(
            (components.next(), components.next()),
            (Some(Component::Normal(_)), None)
        );
        if !is_plain_name {
            return Err(AppError::InvalidInput(format!(
                "Export file name must not contain path separators: {file_name}"
            )));
        }

        tokio::fs::create_dir_all(&self.directory).await?;
        let path = self.directory.join(file_name);
        tokio::fs::write(&path, contents).await?;
        debug!(path = %path.display(), bytes = contents.len(), "export written");
        Ok(path)
    }
}
