/// gateway.rs – Read-only HTTP access to the trading-bot backend.
///
/// Responsibilities:
///  - Resolve the backend base URL from the host context (local vs deployed)
///  - Issue GET requests and decode JSON bodies into typed payloads
///  - Classify failures as network, HTTP status or decode errors (no retries)
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

pub const LOCAL_API_URL: &str = "http://localhost:3011";
pub const DEPLOYED_API_URL: &str = "https://ethbnb-botapi.arrnaya.com";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FetchError {
    /// The request could not be sent or the response body not received.
    #[error("network error: {0}")]
    Network(String),
    /// The backend answered with a non-2xx status.
    #[error("HTTP status {0}")]
    HttpStatus(u16),
    /// The body was not valid JSON for the expected payload shape.
    #[error("decode error: {0}")]
    Decode(String),
}

// ---------------------------------------------------------------------------
// Base URL resolution
// ---------------------------------------------------------------------------

/// Where the dashboard believes it is running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostContext {
    /// No host information (headless run); treated as local development.
    Headless,
    /// Running on behalf of the named host.
    Host(String),
}

impl HostContext {
    pub fn from_hostname(hostname: Option<&str>) -> Self {
        match hostname.map(str::trim) {
            Some(h) if !h.is_empty() => HostContext::Host(h.to_string()),
            _ => HostContext::Headless,
        }
    }
}

/// Pure function of the host context: `localhost` and headless runs talk to
/// the local backend, anything else to the deployed one.
pub fn resolve_base_url(ctx: &HostContext, local_url: &str, deployed_url: &str) -> String {
    let url = match ctx {
        HostContext::Headless => local_url,
        HostContext::Host(h) if h.eq_ignore_ascii_case("localhost") => local_url,
        HostContext::Host(_) => deployed_url,
    };
    url.trim_end_matches('/').to_string()
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// One GET round-trip returning the raw body of a 2xx response.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &str, query: &[(&str, &str)]) -> Result<String, FetchError>;
}

/// `reqwest`-backed transport.
#[derive(Clone)]
pub struct HttpTransport {
    http: Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("building HTTP client: {e}"))?;
        Ok(Self { http })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, url: &str, query: &[(&str, &str)]) -> Result<String, FetchError> {
        let resp = self
            .http
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus(status.as_u16()));
        }
        resp.text()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Gateway
// ---------------------------------------------------------------------------

pub struct Gateway<T> {
    base_url: String,
    transport: T,
}

impl<T: Transport> Gateway<T> {
    pub fn new(base_url: impl Into<String>, transport: T) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            transport,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url_for(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// GET `path` and decode the body. Exactly one outbound call, no retry.
    pub async fn get_json<D: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<D, FetchError> {
        let url = self.url_for(path);
        debug!("GET {url} {query:?}");
        let body = self.transport.get(&url, query).await?;
        serde_json::from_str(&body).map_err(|e| FetchError::Decode(format!("{path}: {e}")))
    }
}
