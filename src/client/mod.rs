//! API clients and the shared JSON request pipeline.
//!
//! Every client builds requests through [`RestClient`], which owns the
//! injected transport, the user agent and the provider-wide default headers.
//! The pipeline maps HTTP statuses onto [`ApiError`] kinds:
//!
//! - 404 becomes [`ApiError::NotFound`]
//! - 401 becomes [`ApiError::Unauthorized`]
//! - any other status >= 400 becomes [`ApiError::Status`]
//! - 204 (or a caller that expects no body) succeeds without decoding

pub mod asserts;
pub mod endpoint;
pub mod frontend;
pub mod gcom;
pub mod transport;

use std::sync::Arc;

use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use url::Url;

use crate::error::ApiError;
use transport::{HttpRequest, HttpResponse, HttpTransport};

/// Shared request pipeline for JSON APIs.
#[derive(Clone)]
pub struct RestClient {
    transport: Arc<dyn HttpTransport>,
    user_agent: String,
    default_headers: Vec<(String, String)>,
}

impl std::fmt::Debug for RestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestClient")
            .field("user_agent", &self.user_agent)
            .field("default_headers", &self.default_headers)
            .finish_non_exhaustive()
    }
}

impl RestClient {
    /// Create a pipeline over `transport`.
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        user_agent: impl Into<String>,
        default_headers: Vec<(String, String)>,
    ) -> Self {
        Self {
            transport,
            user_agent: user_agent.into(),
            default_headers,
        }
    }

    /// The configured user agent.
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// Send one request and map its status.
    ///
    /// `segments` are appended to the base URL's path, each one percent-encoded.
    /// Headers are sent in this order: default headers, `auth_headers`,
    /// `Content-Type`, `User-Agent`.
    pub async fn execute(
        &self,
        api: &'static str,
        method: Method,
        base_url: &str,
        segments: &[&str],
        auth_headers: &[(String, String)],
        body: Option<Vec<u8>>,
    ) -> Result<HttpResponse, ApiError> {
        let url = join_url(api, base_url, segments)?;

        let mut request = HttpRequest::new(method, url);
        for (name, value) in self.default_headers.iter().chain(auth_headers) {
            request = request.header(name.clone(), value.clone());
        }
        request = request
            .header("Content-Type", "application/json")
            .header("User-Agent", self.user_agent.clone());
        if let Some(body) = body {
            request = request.body(body);
        }

        let response = self
            .transport
            .send(request)
            .await
            .map_err(ApiError::Transport)?;
        check_status(response)
    }
}

/// Parse `base_url` and append path segments to it.
pub fn join_url(api: &'static str, base_url: &str, segments: &[&str]) -> Result<Url, ApiError> {
    let mut url =
        Url::parse(base_url).map_err(|source| ApiError::InvalidUrl { api, source })?;
    {
        let mut path = url.path_segments_mut().map_err(|_| ApiError::InvalidUrl {
            api,
            source: url::ParseError::RelativeUrlWithCannotBeABaseBase,
        })?;
        path.pop_if_empty().extend(segments);
    }
    Ok(url)
}

fn check_status(response: HttpResponse) -> Result<HttpResponse, ApiError> {
    match response.status {
        404 => Err(ApiError::NotFound),
        401 => Err(ApiError::Unauthorized),
        status if status >= 400 => Err(ApiError::Status {
            status,
            body: String::from_utf8_lossy(&response.body).into_owned(),
        }),
        _ => Ok(response),
    }
}

/// Serialize a request body.
pub fn encode<B: Serialize + ?Sized>(body: &B) -> Result<Vec<u8>, ApiError> {
    serde_json::to_vec(body).map_err(ApiError::Encode)
}

/// Decode a response body; 204 yields the default value.
pub fn decode<T: DeserializeOwned + Default>(response: &HttpResponse) -> Result<T, ApiError> {
    if response.status == 204 {
        return Ok(T::default());
    }
    serde_json::from_slice(&response.body).map_err(ApiError::Decode)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockTransport;

    #[test]
    fn test_join_url_appends_segments() {
        let base = "https://faro-api-us.grafana.net/faro";
        let url = join_url("test", base, &["api", "v1", "app"]).unwrap();
        assert_eq!(url.as_str(), "https://faro-api-us.grafana.net/faro/api/v1/app");

        let url = join_url("test", "http://127.0.0.1:8080/", &["api", "v1", "app", "7"]).unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:8080/api/v1/app/7");

        let url = join_url("test", "https://host/base", &["config", "rules with space"]).unwrap();
        assert_eq!(url.as_str(), "https://host/base/config/rules%20with%20space");
    }

    #[test]
    fn test_join_url_rejects_garbage() {
        let err = join_url("frontend o11y API", "::not a url", &[]).unwrap_err();
        assert!(err.to_string().starts_with("failed to parse frontend o11y API url"));
    }

    #[tokio::test]
    async fn test_execute_header_order() {
        let mock = MockTransport::new();
        mock.push_response(200, "{}");

        let client = RestClient::new(
            Arc::new(mock.clone()),
            "grafana-cloud-provider/test",
            vec![("Grafana-Terraform-Provider".to_string(), "true".to_string())],
        );
        client
            .execute(
                "test",
                Method::POST,
                "https://example.test",
                &["api"],
                &[("X-Scope-OrgID".to_string(), "12".to_string())],
                Some(b"{}".to_vec()),
            )
            .await
            .unwrap();

        let sent = mock.last_request().unwrap();
        let names: Vec<&str> = sent.headers.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(
            names,
            vec!["Grafana-Terraform-Provider", "X-Scope-OrgID", "Content-Type", "User-Agent"]
        );
        assert_eq!(sent.header_value("user-agent"), Some("grafana-cloud-provider/test"));
        assert_eq!(sent.body.as_deref(), Some(&b"{}"[..]));
    }

    #[test]
    fn test_status_mapping() {
        assert!(check_status(HttpResponse::new(404, "")).unwrap_err().is_not_found());
        assert!(check_status(HttpResponse::new(401, "")).unwrap_err().is_unauthorized());
        let err = check_status(HttpResponse::new(500, "boom")).unwrap_err();
        assert_eq!(err.to_string(), "status: 500");
        assert!(check_status(HttpResponse::new(204, "")).is_ok());
    }

    #[test]
    fn test_decode_no_content_yields_default() {
        let apps: Vec<u32> = decode(&HttpResponse::new(204, "")).unwrap();
        assert!(apps.is_empty());

        let err = decode::<Vec<u32>>(&HttpResponse::new(200, "not json")).unwrap_err();
        assert!(err.to_string().starts_with("failed to unmarshal response body"));
    }
}
