//! HTTP transport used to reach the registry
//! Supports basic authentication and per-request timeouts

use crate::{ClientError, Result};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, USER_AGENT};
use reqwest::Url;
use rincon_api::ApiPath;
use std::fmt;
use std::time::Duration;
use tracing::debug;

/// HTTP methods used by the registry API
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Delete,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Get => write!(f, "GET"),
            Method::Post => write!(f, "POST"),
            Method::Delete => write!(f, "DELETE"),
        }
    }
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Delete => reqwest::Method::DELETE,
        }
    }
}

/// A single request to the registry, relative to its base URL
#[derive(Clone, Debug)]
pub struct RegistryRequest {
    pub method: Method,
    /// Path below the base URL (e.g., "/rincon/services")
    pub path: ApiPath,
    pub query: Vec<(String, String)>,
    /// JSON body, sent with `Content-Type: application/json`
    pub body: Option<serde_json::Value>,
    pub user_agent: String,
    pub timeout: Duration,
}

impl RegistryRequest {
    pub fn new(method: Method, path: impl Into<ApiPath>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            user_agent: crate::client::DEFAULT_USER_AGENT.to_string(),
            timeout: Duration::from_secs(10),
        }
    }

    pub fn query(mut self, query: Vec<(String, String)>) -> Self {
        self.query = query;
        self
    }

    pub fn body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Raw registry answer; status interpretation is left to the client
#[derive(Clone, Debug)]
pub struct TransportResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..=299).contains(&self.status)
    }
}

/// Transport delivers registry requests and returns the raw response.
///
/// Implementations report connection-level failures as errors and hand every
/// HTTP answer, successful or not, back as a TransportResponse.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: RegistryRequest) -> Result<TransportResponse>;
}

/// Transport backed by a pooled reqwest client with basic authentication
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: Url,
    auth_user: String,
    auth_password: String,
}

impl HttpTransport {
    /// Create a transport for the registry at `base_url`
    pub fn new(
        base_url: Url,
        auth_user: impl Into<String>,
        auth_password: impl Into<String>,
        connect_timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .pool_idle_timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            base_url,
            auth_user: auth_user.into(),
            auth_password: auth_password.into(),
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: RegistryRequest) -> Result<TransportResponse> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ClientError::Transport(format!("base URL {} cannot carry a path", self.base_url)))?
            .clear()
            .extend(request.path.segments());

        debug!("{} {}", request.method, url);

        let mut builder = self
            .client
            .request(request.method.into(), url)
            .basic_auth(&self.auth_user, Some(&self.auth_password))
            .header(ACCEPT, "application/json")
            .header(USER_AGENT, &request.user_agent)
            .timeout(request.timeout);

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                ClientError::Timeout(request.timeout)
            } else {
                ClientError::from(e)
            }
        })?;

        let status = response.status().as_u16();
        let body = response.bytes().await?.to_vec();
        debug!("Registry answered {} ({} bytes)", status, body.len());

        Ok(TransportResponse { status, body })
    }
}

/// Parse and check a registry base URL
pub fn parse_base_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw.trim()).map_err(|e| ClientError::InvalidBaseUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ClientError::InvalidBaseUrl {
            url: raw.to_string(),
            reason: format!("unsupported scheme '{}'", url.scheme()),
        });
    }
    if url.host_str().is_none() {
        return Err(ClientError::InvalidBaseUrl {
            url: raw.to_string(),
            reason: "missing host".to_string(),
        });
    }

    Ok(url)
}
