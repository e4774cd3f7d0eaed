//! Frontend Observability API client.

use std::fmt;

use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::de::DeserializeOwned;

use super::endpoint::EndpointResolver;
use super::{decode, encode, RestClient};
use crate::error::{ApiError, RequestError};
use crate::models::frontend::App;

const API_NAME: &str = "frontend o11y API";
const PATH_PREFIX: [&str; 2] = ["api", "v1"];

/// Client for the per-region Frontend Observability API.
///
/// Every call takes the regional base URL (see [`FrontendO11yClient::endpoint_url`])
/// and the numeric stack id, which is used both in the bearer token and as the
/// tenant header.
#[derive(Clone)]
pub struct FrontendO11yClient {
    rest: RestClient,
    resolver: EndpointResolver,
    auth_token: String,
}

impl fmt::Debug for FrontendO11yClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrontendO11yClient")
            .field("rest", &self.rest)
            .field("resolver", &self.resolver)
            .field("auth_token", &"<redacted>")
            .finish()
    }
}

impl FrontendO11yClient {
    /// Create a client.
    pub fn new(
        rest: RestClient,
        resolver: EndpointResolver,
        auth_token: impl Into<String>,
    ) -> Self {
        Self {
            rest,
            resolver,
            auth_token: auth_token.into(),
        }
    }

    /// The Grafana Cloud API host, e.g. `grafana.net`.
    pub fn host(&self) -> &str {
        self.resolver.cloud_api_host()
    }

    /// Base URL for a stack in `region_slug` created at `created_at`.
    pub fn endpoint_url(&self, region_slug: &str, created_at: DateTime<Utc>) -> String {
        self.resolver.resolve(region_slug, created_at)
    }

    /// Create an app.
    pub async fn create_app(
        &self,
        base_url: &str,
        stack_id: i64,
        app: &App,
    ) -> Result<App, RequestError> {
        self.request(Method::POST, base_url, stack_id, None, Some(app))
            .await
            .map_err(|e| RequestError::new(format!("failed to create faro app {:?}", app.name), e))
    }

    /// List all apps of a stack.
    pub async fn list_apps(&self, base_url: &str, stack_id: i64) -> Result<Vec<App>, RequestError> {
        self.request(Method::GET, base_url, stack_id, None, None)
            .await
            .map_err(|e| RequestError::new("failed to get faro apps", e))
    }

    /// Fetch one app.
    pub async fn get_app(
        &self,
        base_url: &str,
        stack_id: i64,
        app_id: i64,
    ) -> Result<App, RequestError> {
        self.request(Method::GET, base_url, stack_id, Some(app_id), None)
            .await
            .map_err(|e| RequestError::new("failed to get faro app", e))
    }

    /// Replace an app.
    pub async fn update_app(
        &self,
        base_url: &str,
        stack_id: i64,
        app_id: i64,
        app: &App,
    ) -> Result<App, RequestError> {
        self.request(Method::PUT, base_url, stack_id, Some(app_id), Some(app))
            .await
            .map_err(|e| RequestError::new(format!("failed to update faro app {:?}", app.name), e))
    }

    /// Delete an app.
    pub async fn delete_app(
        &self,
        base_url: &str,
        stack_id: i64,
        app_id: i64,
    ) -> Result<(), RequestError> {
        let id = app_id.to_string();
        self.rest
            .execute(
                API_NAME,
                Method::DELETE,
                base_url,
                &[PATH_PREFIX[0], PATH_PREFIX[1], "app", id.as_str()],
                &self.auth_headers(stack_id),
                None,
            )
            .await
            .map(|_| ())
            .map_err(|e| RequestError::new(format!("failed to delete faro app id={}", app_id), e))
    }

    async fn request<T: DeserializeOwned + Default>(
        &self,
        method: Method,
        base_url: &str,
        stack_id: i64,
        app_id: Option<i64>,
        body: Option<&App>,
    ) -> Result<T, ApiError> {
        let id = app_id.map(|id| id.to_string());
        let mut segments = vec![PATH_PREFIX[0], PATH_PREFIX[1], "app"];
        if let Some(id) = &id {
            segments.push(id.as_str());
        }
        let body = body.map(encode).transpose()?;

        let response = self
            .rest
            .execute(API_NAME, method, base_url, &segments, &self.auth_headers(stack_id), body)
            .await?;
        decode(&response)
    }

    fn auth_headers(&self, stack_id: i64) -> [(String, String); 2] {
        [
            (
                "Authorization".to_string(),
                format!("Bearer {}:{}", stack_id, self.auth_token),
            ),
            ("X-Scope-OrgID".to_string(), stack_id.to_string()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::transport::{ReqwestTransport, DEFAULT_TIMEOUT};
    use crate::models::frontend::AllowedOrigin;
    use httpmock::prelude::*;
    use serde_json::json;
    use std::sync::Arc;

    fn client() -> FrontendO11yClient {
        let transport = ReqwestTransport::new(DEFAULT_TIMEOUT).unwrap();
        let rest = RestClient::new(
            Arc::new(transport),
            "grafana-cloud-provider/test",
            vec![("Grafana-Terraform-Provider".to_string(), "true".to_string())],
        );
        FrontendO11yClient::new(rest, EndpointResolver::new("grafana.net"), "secret-token")
    }

    #[tokio::test]
    async fn test_create_app_sends_headers_and_body() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/v1/app")
                    .header("Authorization", "Bearer 12:secret-token")
                    .header("X-Scope-OrgID", "12")
                    .header("Content-Type", "application/json")
                    .header("User-Agent", "grafana-cloud-provider/test")
                    .header("Grafana-Terraform-Provider", "true")
                    .json_body(json!({
                        "name": "web",
                        "corsOrigins": [{"url": "https://shop.example"}]
                    }));
                then.status(200).json_body(json!({
                    "id": 7,
                    "name": "web",
                    "appKey": "key-7",
                    "corsOrigins": [{"id": 1, "url": "https://shop.example"}],
                    "collectEndpointURL": "https://faro-collector.example/collect"
                }));
            })
            .await;

        let app = App {
            name: "web".to_string(),
            cors_allowed_origins: vec![AllowedOrigin::new("https://shop.example")],
            ..Default::default()
        };
        let created = client().create_app(&server.base_url(), 12, &app).await.unwrap();

        mock.assert_async().await;
        assert_eq!(created.id, 7);
        assert_eq!(created.key, "key-7");
        assert_eq!(created.cors_allowed_origins[0].id, 1);
    }

    #[tokio::test]
    async fn test_list_apps_dedups_origins() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/v1/app");
                then.status(200).json_body(json!([
                    {
                        "id": 1,
                        "name": "a",
                        "corsOrigins": [{"url": "https://X.example"}, {"url": "https://x.example"}]
                    },
                    {"id": 2, "name": "b"}
                ]));
            })
            .await;

        let apps = client().list_apps(&server.base_url(), 3).await.unwrap();
        assert_eq!(apps.len(), 2);
        assert_eq!(apps[0].cors_allowed_origins.len(), 1);
        assert_eq!(apps[0].cors_allowed_origins[0].url, "https://X.example");
    }

    #[tokio::test]
    async fn test_get_app_not_found() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/v1/app/99");
                then.status(404);
            })
            .await;

        let err = client().get_app(&server.base_url(), 3, 99).await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "failed to get faro app: not found");
    }

    #[tokio::test]
    async fn test_update_app_unauthorized() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(PUT).path("/api/v1/app/5");
                then.status(401);
            })
            .await;

        let app = App {
            name: "test app".to_string(),
            ..Default::default()
        };
        let err = client().update_app(&server.base_url(), 3, 5, &app).await.unwrap_err();
        assert!(err.is_unauthorized());
        assert_eq!(
            err.to_string(),
            r#"failed to update faro app "test app": request not authorized for stack"#
        );
    }

    #[tokio::test]
    async fn test_create_app_server_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/v1/app");
                then.status(500).body("internal");
            })
            .await;

        let app = App {
            name: "test app".to_string(),
            ..Default::default()
        };
        let err = client().create_app(&server.base_url(), 3, &app).await.unwrap_err();
        assert_eq!(err.to_string(), r#"failed to create faro app "test app": status: 500"#);
        assert_eq!(err.kind().status(), Some(500));
    }

    #[tokio::test]
    async fn test_delete_app_no_content() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(DELETE).path("/api/v1/app/5").header("X-Scope-OrgID", "3");
                then.status(204);
            })
            .await;

        client().delete_app(&server.base_url(), 3, 5).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_delete_app_error_context() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(DELETE).path("/api/v1/app/5");
                then.status(503);
            })
            .await;

        let err = client().delete_app(&server.base_url(), 3, 5).await.unwrap_err();
        assert_eq!(err.to_string(), "failed to delete faro app id=5: status: 503");
    }

    #[tokio::test]
    async fn test_malformed_response_body() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/v1/app/1");
                then.status(200).body("<html>");
            })
            .await;

        let err = client().get_app(&server.base_url(), 3, 1).await.unwrap_err();
        assert!(err
            .to_string()
            .starts_with("failed to get faro app: failed to unmarshal response body"));
    }

    #[tokio::test]
    async fn test_invalid_base_url() {
        let err = client().list_apps("not a url", 3).await.unwrap_err();
        assert!(err
            .to_string()
            .starts_with("failed to get faro apps: failed to parse frontend o11y API url"));
    }

    #[test]
    fn test_endpoint_url_delegates_to_resolver() {
        let created = DateTime::parse_from_rfc3339("2023-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let client = client();
        assert_eq!(client.host(), "grafana.net");
        assert_eq!(
            client.endpoint_url("prod-eu-west-2", created),
            "https://faro-api-prod-eu-west-2.grafana.net/faro"
        );
    }

    #[test]
    fn test_debug_redacts_token() {
        let rendered = format!("{:?}", client());
        assert!(!rendered.contains("secret-token"));
    }
}
