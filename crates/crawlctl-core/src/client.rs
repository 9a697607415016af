use crate::error::{BackendError, ConfigError, Result};
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;

pub const DEFAULT_API_BASE: &str = "http://localhost:8000";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct StartPayload {
    pub url: String,
    pub max_depth: u8,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct StatusResponse {
    pub is_running: bool,
    #[serde(default)]
    pub current_url: Option<String>,
    #[serde(default)]
    pub logs_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq, Default)]
pub struct MessageResponse {
    #[serde(default)]
    pub message: Option<String>,
}

/// Validates the configured backend origin. Only `http` and `https` bases are
/// accepted since the stream scheme is derived from them.
pub fn parse_base_url(raw: &str) -> std::result::Result<Url, ConfigError> {
    let trimmed = raw.trim();
    let url = Url::parse(trimmed).map_err(|err| ConfigError::InvalidBaseUrl {
        value: trimmed.to_string(),
        reason: err.to_string(),
    })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ConfigError::InvalidBaseUrl {
            value: trimmed.to_string(),
            reason: format!("unsupported scheme '{other}'"),
        }),
    }
}

/// HTTP side of the crawl backend: job control, status and artifact download.
#[derive(Debug, Clone)]
pub struct BackendClient {
    base_url: Url,
    http_client: Client,
}

impl BackendClient {
    pub fn new(base_url: Url, timeout: Duration) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|source| BackendError::Transport {
                endpoint: base_url.to_string(),
                source,
            })?;
        Ok(Self {
            base_url,
            http_client,
        })
    }

    pub fn endpoint(&self, name: &str) -> String {
        format!("{}/{name}", self.base_url.as_str().trim_end_matches('/'))
    }

    pub async fn start(&self, url: &str, max_depth: u8) -> Result<MessageResponse> {
        let endpoint = self.endpoint("start");
        let payload = StartPayload {
            url: url.to_string(),
            max_depth,
        };
        let response = self
            .http_client
            .post(&endpoint)
            .json(&payload)
            .send()
            .await
            .map_err(|source| transport(&endpoint, source))?;
        let response = ensure_success(&endpoint, response).await?;
        Ok(read_message(response).await)
    }

    pub async fn stop(&self) -> Result<MessageResponse> {
        let endpoint = self.endpoint("stop");
        let response = self
            .http_client
            .post(&endpoint)
            .send()
            .await
            .map_err(|source| transport(&endpoint, source))?;
        let response = ensure_success(&endpoint, response).await?;
        Ok(read_message(response).await)
    }

    pub async fn status(&self) -> Result<StatusResponse> {
        let endpoint = self.endpoint("status");
        let response = self
            .http_client
            .get(&endpoint)
            .send()
            .await
            .map_err(|source| transport(&endpoint, source))?;
        let response = ensure_success(&endpoint, response).await?;
        decode_json(&endpoint, response).await
    }

    /// Fetches the accumulated artifact as raw NDJSON text.
    pub async fn download(&self) -> Result<String> {
        let endpoint = self.endpoint("download");
        let response = self
            .http_client
            .get(&endpoint)
            .send()
            .await
            .map_err(|source| transport(&endpoint, source))?;
        let response = ensure_success(&endpoint, response).await?;
        response
            .text()
            .await
            .map_err(|source| transport(&endpoint, source))
    }
}

fn transport(endpoint: &str, source: reqwest::Error) -> BackendError {
    BackendError::Transport {
        endpoint: endpoint.to_string(),
        source,
    }
}

async fn ensure_success(endpoint: &str, response: Response) -> Result<Response> {
    let status = response.status();
    debug!(
        event = "backend_response",
        endpoint,
        status = status.as_u16()
    );
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(BackendError::Status {
        endpoint: endpoint.to_string(),
        status: status.as_u16(),
        body,
    })
}

/// Job control acknowledgements are informational; a body that is not the
/// expected JSON shape does not turn a 2xx into a failure.
async fn read_message(response: Response) -> MessageResponse {
    match response.text().await {
        Ok(body) => serde_json::from_str(&body).unwrap_or_default(),
        Err(_) => MessageResponse::default(),
    }
}

async fn decode_json<T: serde::de::DeserializeOwned>(
    endpoint: &str,
    response: Response,
) -> Result<T> {
    let body = response
        .text()
        .await
        .map_err(|source| transport(endpoint, source))?;
    serde_json::from_str(&body).map_err(|err| BackendError::Decode {
        endpoint: endpoint.to_string(),
        message: err.to_string(),
    })
}
