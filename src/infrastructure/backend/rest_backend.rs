use super::error::RemoteError;
use crate::application::ports::remote_backend::RemoteBackend;
use crate::shared::config::BackendConfig;
use crate::shared::error::AppError;
use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde_json::Value;
use std::time::Duration;

/// PostgREST 互換 API（`/rest/v1`）を叩くリモートバックエンド
#[derive(Clone)]
pub struct RestBackend {
    base_url: String,
    api_key: Option<String>,
    http: reqwest::Client,
}

impl RestBackend {
    pub fn new(base_url: &str, api_key: Option<String>, timeout: Duration) -> Result<Self, AppError> {
        let trimmed = base_url.trim();
        if trimmed.is_empty() {
            return Err(AppError::ConfigurationError(
                "FORUM_BACKEND_URL is empty".to_string(),
            ));
        }
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: trimmed.trim_end_matches('/').to_string(),
            api_key: api_key.filter(|value| !value.trim().is_empty()),
            http,
        })
    }

    pub fn from_config(config: &BackendConfig) -> Result<Option<Self>, AppError> {
        match config.url.as_deref() {
            Some(url) => Self::new(
                url,
                config.api_key.clone(),
                Duration::from_secs(config.request_timeout_secs),
            )
            .map(Some),
            None => Ok(None),
        }
    }

    fn table_path(table: &str) -> Result<String, RemoteError> {
        Ok(format!("/rest/v1/{}", validate_identifier(table)?))
    }

    fn rpc_path(function: &str) -> Result<String, RemoteError> {
        Ok(format!("/rest/v1/rpc/{}", validate_identifier(function)?))
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        let builder = self.http.request(method, url);
        if let Some(key) = &self.api_key {
            builder
                .header("apikey", key)
                .header("Authorization", format!("Bearer {key}"))
        } else {
            builder
        }
    }

    async fn fetch_rows(
        &self,
        path: &str,
        query: &[(String, String)],
    ) -> Result<Vec<Value>, RemoteError> {
        let resp = self.request(Method::GET, path).query(query).send().await?;
        let body = read_success_body(path, resp).await?;
        serde_json::from_str::<Vec<Value>>(&body).map_err(|err| RemoteError::Decode {
            path: path.to_string(),
            message: err.to_string(),
        })
    }
}

#[async_trait]
impl RemoteBackend for RestBackend {
    async fn insert_row(&self, table: &str, row: Value) -> Result<(), AppError> {
        let path = Self::table_path(table)?;
        let resp = self
            .request(Method::POST, &path)
            .header("Prefer", "return=minimal")
            .json(&row)
            .send()
            .await
            .map_err(RemoteError::from)?;
        read_success_body(&path, resp).await?;
        Ok(())
    }

    async fn select_all(&self, table: &str) -> Result<Vec<Value>, AppError> {
        let path = Self::table_path(table)?;
        let query = vec![("select".to_string(), "*".to_string())];
        Ok(self.fetch_rows(&path, &query).await?)
    }

    async fn select_eq(
        &self,
        table: &str,
        column: &str,
        value: &str,
    ) -> Result<Vec<Value>, AppError> {
        let path = Self::table_path(table)?;
        let column = validate_identifier(column)?;
        let query = vec![
            ("select".to_string(), "*".to_string()),
            (column.to_string(), format!("eq.{value}")),
        ];
        Ok(self.fetch_rows(&path, &query).await?)
    }

    async fn delete_eq(&self, table: &str, column: &str, value: &str) -> Result<u64, AppError> {
        let path = Self::table_path(table)?;
        let column = validate_identifier(column)?;
        let resp = self
            .request(Method::DELETE, &path)
            .header("Prefer", "return=representation")
            .query(&[(column.to_string(), format!("eq.{value}"))])
            .send()
            .await
            .map_err(RemoteError::from)?;
        let body = read_success_body(&path, resp).await?;
        if body.trim().is_empty() {
            return Ok(0);
        }
        let rows: Vec<Value> = serde_json::from_str(&body).map_err(|err| RemoteError::Decode {
            path: path.clone(),
            message: err.to_string(),
        })?;
        Ok(rows.len() as u64)
    }

    async fn call_rpc(&self, function: &str, params: Value) -> Result<Value, AppError> {
        let path = Self::rpc_path(function)?;
        let resp = self
            .request(Method::POST, &path)
            .json(&params)
            .send()
            .await
            .map_err(RemoteError::from)?;
        let body = read_success_body(&path, resp).await?;
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        let parsed = serde_json::from_str(&body).map_err(|err| RemoteError::Decode {
            path: path.clone(),
            message: err.to_string(),
        })?;
        Ok(parsed)
    }
}

async fn read_success_body(path: &str, resp: reqwest::Response) -> Result<String, RemoteError> {
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    if is_success(status) {
        return Ok(body);
    }
    Err(RemoteError::Http {
        path: path.to_string(),
        status: status.as_u16(),
        body,
    })
}

fn is_success(status: StatusCode) -> bool {
    status.is_success()
}

/// テーブル名・列名・関数名は英数字とアンダースコアのみ許可
fn validate_identifier(name: &str) -> Result<&str, RemoteError> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '_');
    if valid {
        Ok(name)
    } else {
        Err(RemoteError::InvalidIdentifier(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_are_built_from_identifiers() {
        assert_eq!(
            RestBackend::table_path("comentarios").unwrap(),
            "/rest/v1/comentarios"
        );
        assert_eq!(
            RestBackend::rpc_path("smart_increment_reaction").unwrap(),
            "/rest/v1/rpc/smart_increment_reaction"
        );
        assert!(RestBackend::table_path("posts;drop").is_err());
        assert!(RestBackend::table_path("").is_err());
    }

    #[test]
    fn new_trims_base_url_and_empty_key() {
        let backend = RestBackend::new(
            " https://db.example.edu/ ",
            Some("  ".to_string()),
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(backend.base_url, "https://db.example.edu");
        assert!(backend.api_key.is_none());
    }

    #[test]
    fn empty_url_is_configuration_error() {
        let err = RestBackend::new("   ", None, Duration::from_secs(5))
            .err()
            .unwrap();
        assert!(matches!(err, AppError::ConfigurationError(_)));
    }

    #[test]
    fn from_config_without_url_is_none() {
        let config = BackendConfig {
            url: None,
            api_key: None,
            request_timeout_secs: 5,
        };
        assert!(RestBackend::from_config(&config).unwrap().is_none());
    }

    #[test]
    fn http_404_maps_to_not_found() {
        let err: AppError = RemoteError::Http {
            path: "/rest/v1/posts".into(),
            status: 404,
            body: String::new(),
        }
        .into();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
