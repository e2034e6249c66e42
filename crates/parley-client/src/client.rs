//! HTTP client for the Parley server.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use serde::Deserialize;
use url::Url;

use parley_types::ChatApiRequest;

use crate::error::{ClientError, ErrorResponse, Result};

/// Default timeout for short requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Health check response.
#[derive(Debug, Clone, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub version: String,
}

/// Parley API client.
///
/// ```no_run
/// use parley_client::ParleyClient;
///
/// # async fn example() -> parley_client::Result<()> {
/// let client = ParleyClient::builder()
///     .base_url("http://localhost:8787")
///     .build()?;
///
/// let health = client.health().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ParleyClient {
    inner: Arc<ClientInner>,
}

#[derive(Debug)]
struct ClientInner {
    http: reqwest::Client,
    base_url: Url,
    timeout: Duration,
    stream_timeout: Option<Duration>,
}

impl ParleyClient {
    /// Create a new client builder.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Client for a server URL with default settings.
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Self::builder().base_url(base_url).build()
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    /// Build a URL for an API path.
    pub(crate) fn url(&self, path: &str) -> Result<Url> {
        let path = path.trim_start_matches('/');
        Ok(self.inner.base_url.join(path)?)
    }

    /// GET /health
    pub async fn health(&self) -> Result<HealthStatus> {
        let response = self
            .inner
            .http
            .get(self.url("health")?)
            .timeout(self.inner.timeout)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(extract_error(response).await);
        }
        Ok(response.json().await?)
    }

    /// POST /api/chat/stream and hand back the response once its status
    /// is known to be successful.
    pub async fn open_chat_stream(&self, request: &ChatApiRequest) -> Result<reqwest::Response> {
        let mut builder = self
            .inner
            .http
            .post(self.url("api/chat/stream")?)
            .header(ACCEPT, "text/event-stream")
            .json(request);
        if let Some(timeout) = self.inner.stream_timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().await?;
        if !response.status().is_success() {
            return Err(extract_error(response).await);
        }
        Ok(response)
    }
}

/// Turn a failed response into [`ClientError::Status`], using the server's
/// `{error}` body when there is one.
async fn extract_error(response: reqwest::Response) -> ClientError {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    let message = match serde_json::from_str::<ErrorResponse>(&text) {
        Ok(body) => body.error,
        Err(_) if !text.trim().is_empty() => text.trim().to_string(),
        Err(_) => status
            .canonical_reason()
            .map(str::to_string)
            .unwrap_or_else(|| format!("HTTP {}", status.as_u16())),
    };
    ClientError::Status {
        status: status.as_u16(),
        message,
    }
}

/// Builder for creating a [`ParleyClient`].
#[derive(Debug)]
pub struct ClientBuilder {
    base_url: Option<String>,
    timeout: Duration,
    stream_timeout: Option<Duration>,
    user_agent: Option<String>,
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self {
            base_url: None,
            timeout: DEFAULT_TIMEOUT,
            stream_timeout: None,
            user_agent: None,
        }
    }

    /// Set the base URL for the server.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Timeout for short requests such as health checks.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Timeout for a whole chat stream. Unlimited by default.
    pub fn stream_timeout(mut self, timeout: Duration) -> Self {
        self.stream_timeout = Some(timeout);
        self
    }

    /// Set a custom user agent.
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    /// Build the client.
    pub fn build(self) -> Result<ParleyClient> {
        let base_url = self
            .base_url
            .ok_or_else(|| ClientError::Config("base_url is required".to_string()))?;

        let mut base_url = Url::parse(&base_url)?;
        if !base_url.path().ends_with('/') {
            base_url.set_path(&format!("{}/", base_url.path()));
        }

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let user_agent = self
            .user_agent
            .unwrap_or_else(|| format!("parley-client/{}", env!("CARGO_PKG_VERSION")));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(user_agent)
            .build()?;

        Ok(ParleyClient {
            inner: Arc::new(ClientInner {
                http,
                base_url,
                timeout: self.timeout,
                stream_timeout: self.stream_timeout,
            }),
        })
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_requires_base_url() {
        let result = ClientBuilder::new().build();
        assert!(matches!(result, Err(ClientError::Config(_))));
    }

    #[test]
    fn test_builder_normalizes_trailing_slash() {
        let a = ParleyClient::new("http://localhost:8787").unwrap();
        let b = ParleyClient::new("http://localhost:8787/").unwrap();
        assert_eq!(a.base_url().as_str(), "http://localhost:8787/");
        assert_eq!(a.base_url(), b.base_url());
    }

    #[test]
    fn test_url_building_keeps_prefix() {
        let client = ParleyClient::new("http://localhost:8787/parley").unwrap();
        let url = client.url("/api/chat/stream").unwrap();
        assert_eq!(url.as_str(), "http://localhost:8787/parley/api/chat/stream");
    }

    #[test]
    fn test_invalid_url() {
        assert!(matches!(
            ParleyClient::new("not a url"),
            Err(ClientError::InvalidUrl(_))
        ));
    }
}
