use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::chart::ChartPayload;
use crate::dataset::DatasetFile;
use crate::error::TransportError;

pub const DEFAULT_API_URL: &str = "http://localhost:8000";

#[derive(Serialize)]
struct ChatRequest<'a> {
    query: &'a str,
}

/// Successful `/chat` reply
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct QueryReply {
    pub answer: String,
    #[serde(default)]
    pub plot: Option<ChartPayload>,
}

#[derive(Deserialize)]
struct ErrorBody {
    detail: Option<Value>,
}

/// The two round trips the session needs from the backend.
/// Each call is a single attempt; callers decide what a failure means.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn upload_dataset(&self, file: &DatasetFile) -> Result<(), TransportError>;
    async fn submit_query(&self, text: &str) -> Result<QueryReply, TransportError>;
}

#[derive(Clone)]
pub struct AnalystClient {
    client: Client,
    base_url: String,
}

impl AnalystClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl Transport for AnalystClient {
    async fn upload_dataset(&self, file: &DatasetFile) -> Result<(), TransportError> {
        let url = format!("{}/upload", self.base_url);

        let bytes = tokio::fs::read(&file.path)
            .await
            .map_err(|source| TransportError::ReadFile {
                path: file.path.clone(),
                source,
            })?;
        tracing::debug!(file = %file.name, size = bytes.len(), "uploading dataset");

        let form = Form::new().part("file", Part::bytes(bytes).file_name(file.name.clone()));

        let response = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(TransportError::Network)?;

        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        Ok(())
    }

    async fn submit_query(&self, text: &str) -> Result<QueryReply, TransportError> {
        let url = format!("{}/chat", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(&ChatRequest { query: text })
            .send()
            .await
            .map_err(TransportError::Network)?;

        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        response.json().await.map_err(TransportError::Decode)
    }
}

async fn status_error(response: Response) -> TransportError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    let detail = extract_detail(&body);
    tracing::warn!(status, detail = ?detail, "backend returned an error");
    TransportError::Status { status, detail }
}

/// Pull `{"detail": "..."}` out of an error body. Anything other than a
/// non-empty string (validation error lists, HTML error pages) yields `None`.
fn extract_detail(body: &str) -> Option<String> {
    let parsed: ErrorBody = serde_json::from_str(body).ok()?;
    match parsed.detail? {
        Value::String(s) if !s.is_empty() => Some(s),
        _ => None,
    }
}
