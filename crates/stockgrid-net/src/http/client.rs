//! REST API client.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use stockgrid_core::logging::targets;

use crate::config::ApiConfig;
use crate::error::{NetworkError, Result};

/// Builder for creating a REST API client.
pub struct RestApiClientBuilder {
    base_url: String,
    bearer_token: Option<String>,
    default_headers: http::HeaderMap,
    timeout: Option<Duration>,
    user_agent: String,
}

impl RestApiClientBuilder {
    /// Create a new builder with the specified base URL.
    ///
    /// All request paths will be appended to this base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            bearer_token: None,
            default_headers: http::HeaderMap::new(),
            timeout: Some(Duration::from_secs(30)),
            user_agent: format!("stockgrid/{} (Rust)", env!("CARGO_PKG_VERSION")),
        }
    }

    /// Create a builder pointed at the versioned API described by `config`.
    pub fn from_config(config: &ApiConfig) -> Self {
        Self::new(config.api_base())
    }

    /// Set bearer token authentication.
    ///
    /// Adds `Authorization: Bearer <token>` header to all requests.
    pub fn bearer_auth(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    /// Add a default header that will be sent with every request.
    pub fn default_header(mut self, name: http::HeaderName, value: &str) -> Result<Self> {
        self.default_headers
            .insert(name, http::HeaderValue::from_str(value)?);
        Ok(self)
    }

    /// Set the request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Disable the request timeout.
    pub fn no_timeout(mut self) -> Self {
        self.timeout = None;
        self
    }

    /// Build the REST API client.
    pub fn build(self) -> Result<RestApiClient> {
        url::Url::parse(&self.base_url)?;

        let mut headers = self.default_headers;
        headers.insert(
            http::header::ACCEPT,
            http::HeaderValue::from_static("application/json"),
        );
        headers.insert(
            http::header::CONTENT_TYPE,
            http::HeaderValue::from_static("application/json"),
        );

        let mut builder = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(self.user_agent);
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        let http_client = builder.build()?;

        // Normalize base URL (remove trailing slash)
        let base_url = self.base_url.trim_end_matches('/').to_string();

        Ok(RestApiClient {
            inner: Arc::new(RestApiClientInner {
                http_client,
                base_url,
                bearer_token: self.bearer_token,
            }),
        })
    }
}

struct RestApiClientInner {
    http_client: reqwest::Client,
    base_url: String,
    bearer_token: Option<String>,
}

/// A REST API client bound to one base URL.
///
/// Cloning is cheap; clones share the connection pool.
///
/// # Example
///
/// ```ignore
/// use stockgrid_net::http::RestApiClient;
///
/// let client = RestApiClient::builder("https://stock.example.com/api/v1")
///     .bearer_auth("token")
///     .build()?;
///
/// let page: ApiResponse<ListPayload<Product>> = client
///     .get_json("product", &[("page".into(), "1".into())])
///     .await?;
/// ```
#[derive(Clone)]
pub struct RestApiClient {
    inner: Arc<RestApiClientInner>,
}

impl RestApiClient {
    /// Create a new builder for configuring a REST API client.
    pub fn builder(base_url: impl Into<String>) -> RestApiClientBuilder {
        RestApiClientBuilder::new(base_url)
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    /// Full URL for `path`, with or without a leading slash.
    pub fn url_for(&self, path: &str) -> String {
        format!("{}/{}", self.inner.base_url, path.trim_start_matches('/'))
    }

    /// Issue `GET path?query` and decode the JSON body.
    ///
    /// Non-success statuses become [`NetworkError::HttpStatus`], except 401
    /// which becomes [`NetworkError::Authentication`]. The server's `message`
    /// field is carried along when the error body provides one.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(String, String)],
    ) -> Result<T> {
        let url = self.url_for(path);
        tracing::debug!(target: targets::REST, %url, params = query.len(), "GET");

        let mut request = self.inner.http_client.get(&url).query(query);
        if let Some(token) = &self.inner.bearer_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        if response.status().is_success() {
            let bytes = response.bytes().await?;
            return Ok(serde_json::from_slice(&bytes)?);
        }
        Err(rejection(&url, response).await)
    }

    /// Download a stored file by its absolute URL.
    ///
    /// The file is named after the URL with the configured bucket prefix
    /// removed, or `file` when nothing is left.
    pub async fn fetch_file(&self, url: &str, config: &ApiConfig) -> Result<RemoteFile> {
        tracing::debug!(target: targets::REST, %url, "GET file");
        let mut request = self.inner.http_client.get(url);
        if let Some(token) = &self.inner.bearer_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(rejection(url, response).await);
        }
        let content_type = response
            .headers()
            .get(http::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let bytes = response.bytes().await?.to_vec();
        let name = match config.file_name_from_url(url) {
            "" => "file".to_string(),
            name => name.to_string(),
        };
        Ok(RemoteFile {
            name,
            content_type,
            bytes,
        })
    }
}

/// A file downloaded with [`RestApiClient::fetch_file`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    /// File name relative to the bucket.
    pub name: String,
    /// The `Content-Type` the server reported.
    pub content_type: Option<String>,
    /// File contents.
    pub bytes: Vec<u8>,
}

/// Map a non-success response to an error, keeping the server's `message`.
async fn rejection(url: &str, response: reqwest::Response) -> NetworkError {
    let status = response.status();
    let message = response
        .json::<serde_json::Value>()
        .await
        .ok()
        .and_then(|body| body.get("message").and_then(|m| m.as_str()).map(str::to_string));
    tracing::warn!(target: targets::REST, %url, status = status.as_u16(), "request rejected");

    if status == http::StatusCode::UNAUTHORIZED {
        NetworkError::Authentication(message.unwrap_or_else(|| "unauthorized".to_string()))
    } else {
        NetworkError::HttpStatus {
            status: status.as_u16(),
            message,
        }
    }
}

impl std::fmt::Debug for RestApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestApiClient")
            .field("base_url", &self.inner.base_url)
            .field("has_auth", &self.inner.bearer_token.is_some())
            .finish()
    }
}
