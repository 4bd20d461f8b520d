use super::BackendDataService;
use crate::config::Config;
use crate::error::{PersonalizationError, Result};
use crate::models::BehaviorRow;
use async_trait::async_trait;
use tracing::{debug, info};

/// REST client for a Supabase-style backend (PostgREST rows + storage buckets)
pub struct RestBackend {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    behavior_table: String,
    bucket: String,
}

impl RestBackend {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        behavior_table: impl Into<String>,
        bucket: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            behavior_table: behavior_table.into(),
            bucket: bucket.into(),
        }
    }

    /// Build from config; `None` when no backend URL is configured
    pub fn from_config(config: &Config) -> Option<Self> {
        let base_url = config.backend_url.as_deref()?;
        Some(Self::new(
            base_url,
            config.backend_api_key.clone().unwrap_or_default(),
            config.behavior_table.clone(),
            config.model_bucket.clone(),
        ))
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }
}

#[async_trait]
impl BackendDataService for RestBackend {
    async fn append_behavior_rows(&self, rows: &[BehaviorRow]) -> Result<()> {
        if rows.is_empty() {
            debug!("No behavior rows to sync");
            return Ok(());
        }

        let url = format!("{}/rest/v1/{}", self.base_url, self.behavior_table);
        let response = self
            .authorized(self.client.post(&url))
            .header("Prefer", "return=minimal")
            .json(rows)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PersonalizationError::Backend(format!(
                "Inserting behavior rows failed with {}: {}",
                status, body
            )));
        }

        info!(rows = rows.len(), "Behavior rows synced to backend");
        Ok(())
    }

    async fn upload_artifact(&self, folder: &str, file_name: &str, bytes: Vec<u8>) -> Result<()> {
        let url = format!(
            "{}/storage/v1/object/{}/{}/{}",
            self.base_url, self.bucket, folder, file_name
        );
        let size = bytes.len();

        let response = self
            .authorized(self.client.post(&url))
            .header("x-upsert", "true")
            .header("cache-control", "3600")
            .header("content-type", "application/json")
            .body(bytes)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PersonalizationError::Backend(format!(
                "Uploading {}/{} failed with {}: {}",
                folder, file_name, status, body
            )));
        }

        info!(folder = folder, file = file_name, bytes = size, "Model artifact uploaded");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ActionType;
    use chrono::Utc;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn view_row() -> BehaviorRow {
        BehaviorRow {
            user_id: "user-1".to_string(),
            product_id: Some("P1".to_string()),
            action_type: ActionType::View,
            search_term: None,
            purchases: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_append_rows_posts_to_table() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/user_behavior"))
            .and(header("apikey", "anon-key"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let backend = RestBackend::new(server.uri(), "anon-key", "user_behavior", "Model");
        backend.append_behavior_rows(&[view_row()]).await.unwrap();
    }

    #[tokio::test]
    async fn test_empty_rows_skip_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(201))
            .expect(0)
            .mount(&server)
            .await;

        let backend = RestBackend::new(server.uri(), "anon-key", "user_behavior", "Model");
        backend.append_behavior_rows(&[]).await.unwrap();
    }

    #[tokio::test]
    async fn test_upload_uses_upsert() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/storage/v1/object/Model/my-models/model.json"))
            .and(header("x-upsert", "true"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let backend = RestBackend::new(server.uri(), "anon-key", "user_behavior", "Model");
        backend
            .upload_artifact("my-models", "model.json", b"{}".to_vec())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_server_error_maps_to_backend_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .mount(&server)
            .await;

        let backend = RestBackend::new(server.uri(), "anon-key", "user_behavior", "Model");
        let result = backend.append_behavior_rows(&[view_row()]).await;

        assert!(matches!(result, Err(PersonalizationError::Backend(_))));
    }

    #[test]
    fn test_from_config_requires_url() {
        assert!(RestBackend::from_config(&Config::default()).is_none());

        let config = Config {
            backend_url: Some("https://example.supabase.co/".to_string()),
            ..Config::default()
        };
        let backend = RestBackend::from_config(&config).unwrap();
        assert_eq!(backend.base_url, "https://example.supabase.co");
    }
}
