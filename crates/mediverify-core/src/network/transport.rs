use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;
use url::Url;

const CONNECT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("request timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("request failed: {0}")]
    Http(String),
}

pub type TransportResult<T> = Result<T, TransportError>;

/// A fully described outbound HTTP call.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub bearer: Option<String>,
    pub json_body: Option<Value>,
    pub timeout: Duration,
}

impl ApiRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            query: Vec::new(),
            headers: Vec::new(),
            bearer: None,
            json_body: None,
            timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }

    #[must_use]
    pub fn with_query(mut self, key: &str, value: &str) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    #[must_use]
    pub fn with_bearer(mut self, token: impl Into<String>) -> Self {
        self.bearer = Some(token.into());
        self
    }

    #[must_use]
    pub fn with_json(mut self, body: Value) -> Self {
        self.json_body = Some(body);
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Resolved URL including query parameters.
    pub fn full_url(&self) -> TransportResult<Url> {
        let parsed = if self.query.is_empty() {
            Url::parse(&self.url)
        } else {
            let pairs = self.query.iter().map(|(k, v)| (k.as_str(), v.as_str()));
            Url::parse_with_params(&self.url, pairs)
        };
        parsed.map_err(|e| TransportError::InvalidUrl(format!("{}: {e}", self.url)))
    }
}

#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json(&self) -> Result<Value, serde_json::Error> {
        serde_json::from_str(&self.body)
    }
}

/// Seam for all outbound HTTP. Registry clients and the summarizer talk to
/// the network through this trait so tests can script responses instead.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: ApiRequest) -> TransportResult<ApiResponse>;
}

/// Production transport over a shared reqwest client.
pub struct ReqwestTransport {
    inner: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> TransportResult<Self> {
        let inner = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .map_err(|e| TransportError::Http(e.to_string()))?;
        Ok(Self { inner })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn execute(&self, request: ApiRequest) -> TransportResult<ApiResponse> {
        let timeout = request.timeout;
        let url = request.full_url()?;

        let mut builder = self.inner.request(request.method, url).timeout(timeout);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(token) = &request.bearer {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &request.json_body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| classify(&e, timeout))?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| classify(&e, timeout))?;

        Ok(ApiResponse { status, body })
    }
}

fn classify(error: &reqwest::Error, timeout: Duration) -> TransportError {
    if error.is_timeout() {
        TransportError::Timeout {
            seconds: timeout.as_secs(),
        }
    } else if error.is_connect() {
        TransportError::Connect(error.to_string())
    } else {
        TransportError::Http(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_url_appends_query_pairs() {
        let request = ApiRequest::get("https://npiregistry.cms.hhs.gov/api/")
            .with_query("version", "2.1")
            .with_query("number", "1234567890");

        let url = request.full_url().unwrap();
        assert_eq!(
            url.as_str(),
            "https://npiregistry.cms.hhs.gov/api/?version=2.1&number=1234567890"
        );
    }

    #[test]
    fn full_url_rejects_garbage() {
        let request = ApiRequest::get("not a url");
        assert!(matches!(
            request.full_url(),
            Err(TransportError::InvalidUrl(_))
        ));
    }

    #[test]
    fn response_success_range() {
        let ok = ApiResponse {
            status: 204,
            body: String::new(),
        };
        let err = ApiResponse {
            status: 503,
            body: String::new(),
        };
        assert!(ok.is_success());
        assert!(!err.is_success());
    }

    #[test]
    fn builders_accumulate() {
        let request = ApiRequest::post("https://api.example.test/verify")
            .with_bearer("token-123")
            .with_header("x-trace", "abc")
            .with_timeout(Duration::from_secs(5));

        assert_eq!(request.bearer.as_deref(), Some("token-123"));
        assert_eq!(request.headers.len(), 1);
        assert_eq!(request.timeout, Duration::from_secs(5));
    }
}
