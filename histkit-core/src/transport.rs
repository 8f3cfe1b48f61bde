//! HTTP-shaped transport used by engines for fetch and push
//!
//! Engines never open connections themselves: remote operations receive a
//! [`Transport`] handle and an [`AuthCallback`] that supplies per-request
//! headers (for example a Basic `Authorization` header).

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

/// Header map (lower-case names)
pub type Headers = BTreeMap<String, String>;

/// Produces extra headers for a request to the given URL
pub type AuthCallback = Arc<dyn Fn(&str) -> Headers + Send + Sync>;

/// Errors raised by transports
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Failed to connect to {url}: {message}")]
    Connect { url: String, message: String },

    #[error("HTTP {status} from {url}: {message}")]
    Status {
        url: String,
        status: u16,
        message: String,
    },

    #[error("Invalid response from {url}: {message}")]
    InvalidResponse { url: String, message: String },
}

impl TransportError {
    /// HTTP status carried by the error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            TransportError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Outgoing request
#[derive(Debug, Clone, Default)]
pub struct TransportRequest {
    pub url: String,
    pub method: String,
    pub headers: Headers,
    pub body: Bytes,
}

impl TransportRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: "GET".to_string(),
            ..Default::default()
        }
    }

    pub fn post(url: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self {
            url: url.into(),
            method: "POST".to_string(),
            body: body.into(),
            ..Default::default()
        }
    }

    pub fn with_headers(mut self, headers: Headers) -> Self {
        self.headers.extend(headers);
        self
    }
}

/// Response to a [`TransportRequest`]
#[derive(Debug, Clone, Default)]
pub struct TransportResponse {
    pub url: String,
    pub status: u16,
    pub status_message: String,
    pub headers: Headers,
    pub body: Bytes,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Turn a non-2xx response into [`TransportError::Status`]
    pub fn error_for_status(self) -> Result<Self, TransportError> {
        if self.is_success() {
            return Ok(self);
        }
        Err(TransportError::Status {
            url: self.url,
            status: self.status,
            message: if self.status_message.is_empty() {
                String::from_utf8_lossy(&self.body).into_owned()
            } else {
                self.status_message
            },
        })
    }
}

/// Request/response transport
#[async_trait]
pub trait Transport: Send + Sync {
    async fn request(&self, request: TransportRequest) -> Result<TransportResponse, TransportError>;
}

/// [`Transport`] over real HTTP using reqwest
pub struct HttpTransport {
    http: reqwest::Client,
}

impl HttpTransport {
    /// Create a transport with the default 300 second timeout
    pub fn new() -> Result<Self, TransportError> {
        Self::with_timeout(Duration::from_secs(300))
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Connect {
                url: String::new(),
                message: format!("Failed to create HTTP client: {}", e),
            })?;
        Ok(Self { http })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn request(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        let method = reqwest::Method::from_bytes(request.method.as_bytes()).map_err(|e| {
            TransportError::Connect {
                url: request.url.clone(),
                message: format!("Invalid method {}: {}", request.method, e),
            }
        })?;

        let mut builder = self.http.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if !request.body.is_empty() {
            builder = builder.body(request.body.clone());
        }

        let resp = builder.send().await.map_err(|e| TransportError::Connect {
            url: request.url.clone(),
            message: e.to_string(),
        })?;

        let status = resp.status();
        let headers = resp
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();
        let body = resp.bytes().await.map_err(|e| TransportError::InvalidResponse {
            url: request.url.clone(),
            message: e.to_string(),
        })?;

        Ok(TransportResponse {
            url: request.url,
            status: status.as_u16(),
            status_message: status.canonical_reason().unwrap_or_default().to_string(),
            headers,
            body,
        })
    }
}
