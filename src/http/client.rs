//! HTTP client for the remote reporting service
//!
//! Thin JSON-over-HTTP layer on top of `reqwest`.

use anyhow::{Context, Result};
use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE},
    multipart::Form,
    Client, Method, RequestBuilder,
};
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// HTTP client errors
#[derive(Error, Debug)]
pub enum HttpError {
    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Timeout after {0} seconds")]
    Timeout(u64),

    #[error("Connection refused to {0}")]
    ConnectionRefused(String),

    #[error("Unexpected status {status} from {url}: {body}")]
    Status {
        status: u16,
        url: String,
        body: String,
    },
}

/// JSON HTTP client bound to one API base URL
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    base_url: Option<String>,
    default_headers: HeaderMap,
    timeout_secs: u64,
}

impl HttpClient {
    pub fn new() -> Result<Self> {
        Self::with_timeout(30)
    }

    /// Create client with custom timeout
    pub fn with_timeout(timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: None,
            default_headers: HeaderMap::new(),
            timeout_secs,
        })
    }

    /// Set base URL for requests
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Add default header
    pub fn default_header(mut self, key: impl AsRef<str>, value: impl AsRef<str>) -> Result<Self> {
        let header_name =
            HeaderName::from_bytes(key.as_ref().as_bytes()).context("Invalid header name")?;
        let header_value = HeaderValue::from_str(value.as_ref()).context("Invalid header value")?;
        self.default_headers.insert(header_name, header_value);
        Ok(self)
    }

    /// Authenticate every request with a bearer token
    pub fn bearer_auth(self, token: &str) -> Result<Self> {
        self.default_header("Authorization", format!("Bearer {token}"))
    }

    fn build_url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        match &self.base_url {
            Some(base) => format!(
                "{}/{}",
                base.trim_end_matches('/'),
                path.trim_start_matches('/')
            ),
            None => path.to_string(),
        }
    }

    /// Send HTTP request
    pub async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let url = self.build_url(&request.url);
        debug!("Sending {} request to {}", request.method, url);

        let method =
            Method::from_bytes(request.method.as_bytes()).context("Invalid HTTP method")?;

        let mut req_builder = self.client.request(method, &url);

        for (key, value) in &self.default_headers {
            req_builder = req_builder.header(key, value);
        }

        for (key, value) in &request.headers {
            req_builder = req_builder.header(key.as_str(), value.as_str());
        }

        if let Some(body) = &request.body {
            req_builder = req_builder
                .header(CONTENT_TYPE, "application/json")
                .body(body.clone());
        }

        self.dispatch(url, req_builder).await
    }

    /// POST a multipart form, such as a log record with a file part
    pub async fn post_multipart(&self, url: &str, form: Form) -> Result<HttpResponse> {
        let url = self.build_url(url);
        debug!("Sending multipart POST request to {}", url);

        let req_builder = self
            .client
            .post(&url)
            .headers(self.default_headers.clone())
            .multipart(form);
        self.dispatch(url, req_builder).await
    }

    async fn dispatch(&self, url: String, req_builder: RequestBuilder) -> Result<HttpResponse> {
        let start = std::time::Instant::now();

        let response = req_builder.send().await.map_err(|e| {
            if e.is_timeout() {
                anyhow::anyhow!(HttpError::Timeout(self.timeout_secs))
            } else if e.is_connect() {
                anyhow::anyhow!(HttpError::ConnectionRefused(url.clone()))
            } else {
                anyhow::anyhow!(HttpError::RequestFailed(e.to_string()))
            }
        })?;

        let duration_ms = start.elapsed().as_millis() as u64;
        let status = response.status();

        let body = response
            .text()
            .await
            .context("Failed to read response body")?;

        debug!(
            "Response: {} {} in {}ms",
            status.as_u16(),
            status.canonical_reason().unwrap_or(""),
            duration_ms
        );

        Ok(HttpResponse {
            url,
            status_code: status.as_u16(),
            body,
            duration_ms,
        })
    }

    pub async fn get(&self, url: &str) -> Result<HttpResponse> {
        self.send(HttpRequest::get(url)).await
    }

    /// POST a JSON body
    pub async fn post_json<T: Serialize>(&self, url: &str, body: &T) -> Result<HttpResponse> {
        self.send(HttpRequest::post(url).json(body)?).await
    }

    /// PUT a JSON body
    pub async fn put_json<T: Serialize>(&self, url: &str, body: &T) -> Result<HttpResponse> {
        self.send(HttpRequest::put(url).json(body)?).await
    }
}

/// HTTP request builder
#[derive(Clone, Debug)]
pub struct HttpRequest {
    pub method: String,
    pub url: String,
    pub headers: HashMap<String, String>,
    pub body: Option<String>,
}

impl HttpRequest {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            headers: HashMap::new(),
            body: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new("GET", url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new("POST", url)
    }

    pub fn put(url: impl Into<String>) -> Self {
        Self::new("PUT", url)
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Serialize `body` as the JSON payload
    pub fn json<T: Serialize>(self, body: &T) -> Result<Self> {
        let payload = serde_json::to_string(body).context("Failed to serialize request body")?;
        Ok(self.body(payload))
    }
}

/// HTTP response
#[derive(Clone, Debug)]
pub struct HttpResponse {
    pub url: String,
    pub status_code: u16,
    pub body: String,
    pub duration_ms: u64,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }

    /// Fail with [`HttpError::Status`] unless the status is 2xx
    pub fn error_for_status(self) -> Result<Self, HttpError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(HttpError::Status {
                status: self.status_code,
                url: self.url,
                body: self.body,
            })
        }
    }

    /// Deserialize the JSON body
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_str(&self.body)
            .with_context(|| format!("Invalid JSON in response from {}", self.url))
    }
}
