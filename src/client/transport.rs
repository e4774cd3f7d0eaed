//! HTTP transport abstraction.
//!
//! API clients never talk to `reqwest` directly. They hand an [`HttpRequest`]
//! to an [`HttpTransport`] and get back a fully read [`HttpResponse`]. The
//! production stack is a [`RetryingTransport`] wrapped around a
//! [`ReqwestTransport`]; tests substitute a scripted fake.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use tracing::{debug, warn};
use url::Url;

use crate::error::{ProviderError, TransportError};

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(90);

/// Default number of transport-level retries.
pub const DEFAULT_RETRIES: u32 = 3;

const DEFAULT_MIN_WAIT: Duration = Duration::from_secs(1);
const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(30);

/// An outgoing HTTP request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    /// The HTTP method.
    pub method: Method,
    /// The absolute request URL.
    pub url: Url,
    /// Headers in the order they were added.
    pub headers: Vec<(String, String)>,
    /// The request body, if any.
    pub body: Option<Vec<u8>>,
}

impl HttpRequest {
    /// Create a request without headers or body.
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: Vec::new(),
            body: None,
        }
    }

    /// Append a header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Set the body.
    pub fn body(mut self, body: Vec<u8>) -> Self {
        self.body = Some(body);
        self
    }

    /// First value of a header, compared case-insensitively.
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// A fully read HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// The HTTP status code.
    pub status: u16,
    /// The response body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Create a response.
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// Sends HTTP requests.
///
/// Implementations must be safe to share between concurrent resource
/// operations and must not keep request-scoped state.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Send a request and read the whole response body.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// [`HttpTransport`] backed by a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Build a transport with the given per-request timeout.
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::new(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let mut builder = self.client.request(request.method, request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(TransportError::new)?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| TransportError::new(format!("failed to read response body: {}", e)))?;

        Ok(HttpResponse {
            status,
            body: body.to_vec(),
        })
    }
}

/// A status code pattern such as `429`, `5xx` or `50x`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusPattern([Option<u8>; 3]);

impl StatusPattern {
    /// Whether `status` matches this pattern.
    pub fn matches(&self, status: u16) -> bool {
        if !(100..=999).contains(&status) {
            return false;
        }
        let digits = [
            (status / 100) as u8,
            ((status / 10) % 10) as u8,
            (status % 10) as u8,
        ];
        self.0
            .iter()
            .zip(digits)
            .all(|(pattern, digit)| pattern.map_or(true, |p| p == digit))
    }
}

impl FromStr for StatusPattern {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || {
            ProviderError::Configuration(format!(
                "invalid retry status code {:?}: expected three digits, 'x' as wildcard",
                s
            ))
        };

        let trimmed = s.trim();
        if trimmed.len() != 3 {
            return Err(invalid());
        }
        let mut digits = [None; 3];
        for (slot, c) in digits.iter_mut().zip(trimmed.chars()) {
            *slot = match c {
                'x' | 'X' => None,
                '0'..='9' => Some(c as u8 - b'0'),
                _ => return Err(invalid()),
            };
        }
        Ok(Self(digits))
    }
}

impl fmt::Display for StatusPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for digit in self.0 {
            match digit {
                Some(d) => write!(f, "{}", d)?,
                None => write!(f, "x")?,
            }
        }
        Ok(())
    }
}

/// The set of statuses a [`RetryingTransport`] retries.
///
/// HTTP 401 is never retried, whatever the patterns say.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryStatusCodes(Vec<StatusPattern>);

impl RetryStatusCodes {
    /// Parse a list of patterns.
    pub fn parse<S: AsRef<str>>(patterns: &[S]) -> Result<Self, ProviderError> {
        patterns
            .iter()
            .map(|p| p.as_ref().parse())
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
    }

    /// Whether a response with this status should be retried.
    pub fn should_retry(&self, status: u16) -> bool {
        status != 401 && self.0.iter().any(|p| p.matches(status))
    }
}

impl Default for RetryStatusCodes {
    fn default() -> Self {
        Self(vec![
            StatusPattern([Some(4), Some(2), Some(9)]),
            StatusPattern([Some(5), None, None]),
        ])
    }
}

/// Wraps a transport with bounded retries on transport errors and retryable
/// statuses.
///
/// After the last retry the final response is returned as is, so the caller's
/// status mapping still applies.
#[derive(Debug, Clone)]
pub struct RetryingTransport<T> {
    inner: T,
    max_retries: u32,
    status_codes: RetryStatusCodes,
    fixed_wait: Option<Duration>,
    min_wait: Duration,
    max_wait: Duration,
}

impl<T: HttpTransport> RetryingTransport<T> {
    /// Wrap `inner` with the default policy: 3 retries on 429 and 5xx.
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            max_retries: DEFAULT_RETRIES,
            status_codes: RetryStatusCodes::default(),
            fixed_wait: None,
            min_wait: DEFAULT_MIN_WAIT,
            max_wait: DEFAULT_MAX_WAIT,
        }
    }

    /// Set the number of retries after the first attempt.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the retryable statuses.
    pub fn with_status_codes(mut self, status_codes: RetryStatusCodes) -> Self {
        self.status_codes = status_codes;
        self
    }

    /// Wait a fixed duration between retries instead of backing off.
    pub fn with_fixed_wait(mut self, wait: Duration) -> Self {
        self.fixed_wait = Some(wait);
        self
    }

    fn backoff(&self, retry: u32) -> Duration {
        if let Some(wait) = self.fixed_wait {
            return wait;
        }
        let factor = 1u32.checked_shl(retry).unwrap_or(u32::MAX);
        self.min_wait.saturating_mul(factor).min(self.max_wait)
    }
}

#[async_trait]
impl<T: HttpTransport> HttpTransport for RetryingTransport<T> {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let mut retry = 0;
        loop {
            let result = self.inner.send(request.clone()).await;
            let reason = match &result {
                Ok(response) if self.status_codes.should_retry(response.status) => {
                    format!("status {}", response.status)
                }
                Ok(_) => return result,
                Err(err) => err.to_string(),
            };

            if retry >= self.max_retries {
                warn!(method = %request.method, url = %request.url, %reason, "giving up after {} retries", retry);
                return result;
            }

            let wait = self.backoff(retry);
            retry += 1;
            debug!(method = %request.method, url = %request.url, %reason, retry, ?wait, "retrying request");
            tokio::time::sleep(wait).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockTransport;

    fn request() -> HttpRequest {
        HttpRequest::new(Method::GET, Url::parse("https://example.test/api/v1/app").unwrap())
    }

    #[test]
    fn test_status_pattern_parsing() {
        let pattern: StatusPattern = "5xx".parse().unwrap();
        assert!(pattern.matches(500));
        assert!(pattern.matches(503));
        assert!(!pattern.matches(429));
        assert_eq!(pattern.to_string(), "5xx");

        let pattern: StatusPattern = "50x".parse().unwrap();
        assert!(pattern.matches(502));
        assert!(!pattern.matches(510));

        assert!("5x".parse::<StatusPattern>().is_err());
        assert!("abc".parse::<StatusPattern>().is_err());
    }

    #[test]
    fn test_unauthorized_is_never_retried() {
        let codes = RetryStatusCodes::parse(&["4xx"]).unwrap();
        assert!(codes.should_retry(403));
        assert!(!codes.should_retry(401));

        let defaults = RetryStatusCodes::default();
        assert!(defaults.should_retry(429));
        assert!(defaults.should_retry(502));
        assert!(!defaults.should_retry(404));
        assert!(!defaults.should_retry(401));
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let req = request().header("X-Scope-OrgID", "42");
        assert_eq!(req.header_value("x-scope-orgid"), Some("42"));
        assert_eq!(req.header_value("authorization"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_retryable_status_then_succeeds() {
        let mock = MockTransport::new();
        mock.push_response(503, "unavailable");
        mock.push_response(429, "slow down");
        mock.push_response(200, "[]");

        let transport = RetryingTransport::new(mock.clone());
        let response = transport.send(request()).await.unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(mock.requests().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_returns_last_response_after_exhausting_retries() {
        let mock = MockTransport::new();
        for _ in 0..4 {
            mock.push_response(500, "boom");
        }

        let transport = RetryingTransport::new(mock.clone());
        let response = transport.send(request()).await.unwrap();

        assert_eq!(response.status, 500);
        assert_eq!(mock.requests().len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_does_not_retry_client_errors() {
        let mock = MockTransport::new();
        mock.push_response(401, "");

        let transport = RetryingTransport::new(mock.clone());
        let response = transport.send(request()).await.unwrap();

        assert_eq!(response.status, 401);
        assert_eq!(mock.requests().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_transport_errors() {
        let mock = MockTransport::new();
        mock.push_error("connection reset");
        mock.push_response(200, "{}");

        let transport =
            RetryingTransport::new(mock.clone()).with_fixed_wait(Duration::from_millis(10));
        let response = transport.send(request()).await.unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(mock.requests().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_retries_returns_transport_error() {
        let mock = MockTransport::new();
        mock.push_error("connection refused");

        let transport = RetryingTransport::new(mock.clone()).with_max_retries(0);
        let err = transport.send(request()).await.unwrap_err();

        assert_eq!(err.to_string(), "connection refused");
    }

    #[test]
    fn test_backoff_is_capped() {
        let transport = RetryingTransport::new(MockTransport::new());
        assert_eq!(transport.backoff(0), Duration::from_secs(1));
        assert_eq!(transport.backoff(2), Duration::from_secs(4));
        assert_eq!(transport.backoff(10), DEFAULT_MAX_WAIT);
        assert_eq!(transport.backoff(40), DEFAULT_MAX_WAIT);
    }
}
