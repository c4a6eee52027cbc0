//! HTTP request gateway
//!
//! Every request the suite makes goes through [`Gateway::send`]. It applies the
//! shared defaults (JSON content type, default timeout), lets callers override
//! headers, query parameters and the timeout per call, and returns the status
//! and body without treating error statuses as failures.

use std::time::{Duration, Instant};

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{Method, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{ApiError, ApiResult};

/// Gateway configuration
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Base URL every path is appended to
    pub base_url: String,

    /// Timeout applied when a call does not set its own
    pub default_timeout: Duration,

    /// Value sent in the User-Agent header
    pub user_agent: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: "https://dummyjson.com".to_string(),
            default_timeout: Duration::from_secs(30),
            user_agent: format!("storecheck/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Per-call overrides
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Extra headers, merged over the defaults (caller wins)
    pub headers: Vec<(String, String)>,

    /// Query string parameters, in order
    pub query: Vec<(String, String)>,

    /// Timeout for this call only
    pub timeout: Option<Duration>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Build the final header map: `Content-Type: application/json` first,
    /// then the caller's headers on top.
    pub fn merged_headers(&self) -> ApiResult<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        for (name, value) in &self.headers {
            let header_name =
                HeaderName::from_bytes(name.as_bytes()).map_err(|e| ApiError::InvalidHeader {
                    name: name.clone(),
                    reason: e.to_string(),
                })?;
            let header_value =
                HeaderValue::from_str(value).map_err(|e| ApiError::InvalidHeader {
                    name: name.clone(),
                    reason: e.to_string(),
                })?;
            headers.insert(header_name, header_value);
        }

        Ok(headers)
    }
}

/// A response as the suite sees it: status, JSON body and round-trip time
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
    pub elapsed: Duration,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Decode the body into a typed payload
    pub fn decode<T: DeserializeOwned>(&self) -> ApiResult<T> {
        T::deserialize(&self.body).map_err(ApiError::from)
    }
}

/// How a caller wants a timeout to be treated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeoutPolicy {
    /// A timeout is an error like any other transport failure
    #[default]
    Strict,
    /// A timeout is an accepted outcome and is reported as [`Delivery::TimedOut`]
    Tolerate,
}

/// Outcome of a call under a [`TimeoutPolicy`]
#[derive(Debug, Clone)]
pub enum Delivery {
    Delivered(ApiResponse),
    TimedOut { path: String, after: Duration },
}

impl TimeoutPolicy {
    /// Apply the policy to the result of a gateway call
    pub fn apply(self, result: ApiResult<ApiResponse>) -> ApiResult<Delivery> {
        match (self, result) {
            (_, Ok(response)) => Ok(Delivery::Delivered(response)),
            (TimeoutPolicy::Tolerate, Err(ApiError::Timeout { path, after })) => {
                warn!(%path, ?after, "request timed out; tolerated by policy");
                Ok(Delivery::TimedOut { path, after })
            }
            (_, Err(e)) => Err(e),
        }
    }
}

/// Shared HTTP entry point. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Gateway {
    http: reqwest::Client,
    base_url: String,
    default_timeout: Duration,
}

impl Gateway {
    /// Create a gateway for `base_url` with default settings
    pub fn new(base_url: &str) -> ApiResult<Self> {
        Self::with_config(GatewayConfig {
            base_url: base_url.to_string(),
            ..Default::default()
        })
    }

    pub fn with_config(config: GatewayConfig) -> ApiResult<Self> {
        // Fail early on a malformed base URL rather than on the first call
        Url::parse(&config.base_url).map_err(|e| ApiError::InvalidUrl {
            url: config.base_url.clone(),
            reason: e.to_string(),
        })?;

        let http = reqwest::Client::builder()
            .user_agent(config.user_agent)
            .build()
            .map_err(ApiError::Client)?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            default_timeout: config.default_timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Resolve an endpoint path against the base URL
    pub fn endpoint(&self, path: &str) -> ApiResult<Url> {
        let joined = if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        };
        Url::parse(&joined).map_err(|e| ApiError::InvalidUrl {
            url: joined,
            reason: e.to_string(),
        })
    }

    /// Resolve `collection` plus one opaque id segment. The segment is
    /// percent-encoded, so `?`, `#`, `%` and `/` stay part of the id.
    pub fn resource(&self, collection: &str, segment: &str) -> ApiResult<Url> {
        let mut url = self.endpoint(collection)?;
        let invalid = |reason: &str| ApiError::InvalidUrl {
            url: format!("{}/{}", url, segment),
            reason: reason.to_string(),
        };
        if matches!(segment, "" | "." | "..") {
            return Err(invalid("id segment must not be empty, `.` or `..`"));
        }
        let cannot_be_base = invalid("base URL cannot take path segments");

        url.path_segments_mut()
            .map_err(|_| cannot_be_base)?
            .pop_if_empty()
            .push(segment);
        Ok(url)
    }

    /// Issue a request and return whatever status the server answered with
    pub async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        options: RequestOptions,
    ) -> ApiResult<ApiResponse> {
        let url = self.endpoint(path)?;
        self.dispatch(method, url, path, body, options).await
    }

    /// Like [`Gateway::send`], addressing `{collection}/{segment}` through
    /// [`Gateway::resource`]
    pub async fn send_resource(
        &self,
        method: Method,
        collection: &str,
        segment: &str,
        body: Option<&Value>,
        options: RequestOptions,
    ) -> ApiResult<ApiResponse> {
        let url = self.resource(collection, segment)?;
        let path = format!("{}/{}", collection, segment);
        self.dispatch(method, url, &path, body, options).await
    }

    async fn dispatch(
        &self,
        method: Method,
        url: Url,
        path: &str,
        body: Option<&Value>,
        options: RequestOptions,
    ) -> ApiResult<ApiResponse> {
        let headers = options.merged_headers()?;
        let timeout = options.timeout.unwrap_or(self.default_timeout);

        let mut request = self
            .http
            .request(method.clone(), url)
            .headers(headers)
            .timeout(timeout);
        if !options.query.is_empty() {
            request = request.query(&options.query);
        }
        if let Some(body) = body {
            request = request.body(body.to_string());
        }

        let start = Instant::now();
        let transport_error = |source: reqwest::Error| {
            if source.is_timeout() {
                ApiError::Timeout {
                    path: path.to_string(),
                    after: timeout,
                }
            } else {
                ApiError::Transport {
                    path: path.to_string(),
                    source,
                }
            }
        };

        let response = request.send().await.map_err(&transport_error)?;
        let status = response.status().as_u16();
        let bytes = response.bytes().await.map_err(&transport_error)?;
        let elapsed = start.elapsed();

        debug!(
            %method,
            path,
            status,
            elapsed_ms = elapsed.as_millis() as u64,
            "request completed"
        );

        Ok(ApiResponse {
            status,
            body: parse_body(&bytes),
            elapsed,
        })
    }
}

/// Empty bodies become `null`; bodies that are not JSON are kept as a string.
fn parse_body(bytes: &[u8]) -> Value {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Value::Null;
    }
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
}
