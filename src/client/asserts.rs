//! Asserts configuration API client.
//!
//! The Asserts API is reached through the Grafana instance's plugin proxy:
//! `{url}/api/plugins/grafana-asserts-app/resources/asserts/api-server`.
//! Requests carry `Authorization: Bearer {auth}` and the tenant header
//! `X-Scope-OrgID: {stack_id}`.
//!
//! Errors are contextualized as `"{METHOD} /{path}"` so the resource layer can
//! add its own summary on top.

use std::fmt;

use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use super::transport::HttpResponse;
use super::{decode, encode, RestClient};
use crate::error::{ApiError, RequestError};
use crate::models::asserts::{
    DisabledAlertConfigDto, DisabledAlertConfigsDto, EnvironmentDto, LogDrilldownConfigDto,
    ModelRulesDto, ProfileDrilldownConfigDto, PrometheusRuleDto, PrometheusRulesDto, StackDto,
    StackStatusDto, TenantEnvConfigResponseDto, TenantLogConfigResponseDto,
    TenantProfileConfigResponseDto, TenantTraceConfigResponseDto, ThresholdScope,
    TraceDrilldownConfigDto,
};

const API_NAME: &str = "asserts API";

/// Path of the Asserts API server below the Grafana URL.
pub const API_SERVER_PATH: &str = "api/plugins/grafana-asserts-app/resources/asserts/api-server";

/// Client for the Asserts configuration API.
#[derive(Clone)]
pub struct AssertsClient {
    rest: RestClient,
    base_url: String,
    auth: String,
}

impl fmt::Debug for AssertsClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssertsClient")
            .field("base_url", &self.base_url)
            .field("auth", &"<redacted>")
            .finish_non_exhaustive()
    }
}

impl AssertsClient {
    /// Create a client for the Grafana instance at `grafana_url`.
    pub fn new(rest: RestClient, grafana_url: &str, auth: impl Into<String>) -> Self {
        Self {
            rest,
            base_url: format!("{}/{}", grafana_url.trim_end_matches('/'), API_SERVER_PATH),
            auth: auth.into(),
        }
    }

    /// The resolved API server URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // ========================================================================
    // Prometheus rules files
    // ========================================================================

    /// Create or replace a rules file.
    pub async fn put_prom_rules(
        &self,
        stack_id: i64,
        rules: &PrometheusRulesDto,
    ) -> Result<(), RequestError> {
        self.write(Method::PUT, stack_id, &["v1", "config", "prom-rules"], Some(rules))
            .await
    }

    /// Fetch a rules file by name.
    pub async fn get_prom_rules(
        &self,
        stack_id: i64,
        name: &str,
    ) -> Result<PrometheusRulesDto, RequestError> {
        self.fetch(stack_id, &["v1", "config", "prom-rules", name]).await
    }

    /// Delete a rules file.
    pub async fn delete_prom_rules(&self, stack_id: i64, name: &str) -> Result<(), RequestError> {
        self.write::<()>(Method::DELETE, stack_id, &["v1", "config", "prom-rules", name], None)
            .await
    }

    // ========================================================================
    // Custom model rules
    // ========================================================================

    /// Create or replace custom model rules.
    pub async fn put_model_rules(
        &self,
        stack_id: i64,
        rules: &ModelRulesDto,
    ) -> Result<(), RequestError> {
        self.write(Method::PUT, stack_id, &["v1", "config", "model-rules"], Some(rules))
            .await
    }

    /// Fetch custom model rules by name.
    pub async fn get_model_rules(
        &self,
        stack_id: i64,
        name: &str,
    ) -> Result<ModelRulesDto, RequestError> {
        self.fetch(stack_id, &["v1", "config", "model-rules", name]).await
    }

    /// Delete custom model rules.
    pub async fn delete_model_rules(&self, stack_id: i64, name: &str) -> Result<(), RequestError> {
        self.write::<()>(Method::DELETE, stack_id, &["v1", "config", "model-rules", name], None)
            .await
    }

    // ========================================================================
    // Threshold rules
    // ========================================================================

    /// Create or update custom threshold rules.
    pub async fn put_threshold_rules(
        &self,
        stack_id: i64,
        rules: &PrometheusRulesDto,
    ) -> Result<(), RequestError> {
        self.write(Method::POST, stack_id, &["v1", "config", "thresholds"], Some(rules))
            .await
    }

    /// Fetch the threshold rules of a scope as an untyped document.
    pub async fn get_threshold_rules(
        &self,
        stack_id: i64,
        scope: ThresholdScope,
    ) -> Result<Value, RequestError> {
        self.fetch(stack_id, &["v1", "config", "thresholds", scope.as_str()]).await
    }

    /// Delete one custom threshold rule.
    pub async fn delete_threshold_rule(
        &self,
        stack_id: i64,
        rule: &PrometheusRuleDto,
    ) -> Result<(), RequestError> {
        self.write(Method::DELETE, stack_id, &["v1", "config", "thresholds"], Some(rule))
            .await
    }

    // ========================================================================
    // Disabled alerts
    // ========================================================================

    /// Create or replace a disabled alert configuration.
    pub async fn put_disabled_alert_config(
        &self,
        stack_id: i64,
        config: &DisabledAlertConfigDto,
    ) -> Result<(), RequestError> {
        self.write(Method::PUT, stack_id, &["v1", "config", "disabled-alert"], Some(config))
            .await
    }

    /// List all disabled alert configurations.
    pub async fn get_disabled_alert_configs(
        &self,
        stack_id: i64,
    ) -> Result<DisabledAlertConfigsDto, RequestError> {
        self.fetch(stack_id, &["v1", "config", "disabled-alerts"]).await
    }

    /// Delete a disabled alert configuration.
    pub async fn delete_disabled_alert_config(
        &self,
        stack_id: i64,
        name: &str,
    ) -> Result<(), RequestError> {
        self.write::<()>(Method::DELETE, stack_id, &["v1", "config", "disabled-alert", name], None)
            .await
    }

    // ========================================================================
    // Drilldown configurations
    // ========================================================================

    /// Create or update a log drilldown configuration.
    pub async fn upsert_log_config(
        &self,
        stack_id: i64,
        config: &LogDrilldownConfigDto,
    ) -> Result<(), RequestError> {
        self.write(Method::POST, stack_id, &["v2", "config", "log"], Some(config))
            .await
    }

    /// List the tenant's log drilldown configurations.
    pub async fn get_log_configs(
        &self,
        stack_id: i64,
    ) -> Result<TenantLogConfigResponseDto, RequestError> {
        self.fetch(stack_id, &["v2", "config", "log"]).await
    }

    /// Delete a log drilldown configuration.
    pub async fn delete_log_config(&self, stack_id: i64, name: &str) -> Result<(), RequestError> {
        self.write::<()>(Method::DELETE, stack_id, &["v2", "config", "log", name], None)
            .await
    }

    /// Create or update a trace drilldown configuration.
    pub async fn upsert_trace_config(
        &self,
        stack_id: i64,
        config: &TraceDrilldownConfigDto,
    ) -> Result<(), RequestError> {
        self.write(Method::POST, stack_id, &["v2", "config", "trace"], Some(config))
            .await
    }

    /// List the tenant's trace drilldown configurations.
    pub async fn get_trace_configs(
        &self,
        stack_id: i64,
    ) -> Result<TenantTraceConfigResponseDto, RequestError> {
        self.fetch(stack_id, &["v2", "config", "trace"]).await
    }

    /// Delete a trace drilldown configuration.
    pub async fn delete_trace_config(&self, stack_id: i64, name: &str) -> Result<(), RequestError> {
        self.write::<()>(Method::DELETE, stack_id, &["v2", "config", "trace", name], None)
            .await
    }

    /// Create or update a profile drilldown configuration.
    pub async fn upsert_profile_config(
        &self,
        stack_id: i64,
        config: &ProfileDrilldownConfigDto,
    ) -> Result<(), RequestError> {
        self.write(Method::POST, stack_id, &["v2", "config", "profile"], Some(config))
            .await
    }

    /// List the tenant's profile drilldown configurations.
    pub async fn get_profile_configs(
        &self,
        stack_id: i64,
    ) -> Result<TenantProfileConfigResponseDto, RequestError> {
        self.fetch(stack_id, &["v2", "config", "profile"]).await
    }

    /// Delete a profile drilldown configuration.
    pub async fn delete_profile_config(
        &self,
        stack_id: i64,
        name: &str,
    ) -> Result<(), RequestError> {
        self.write::<()>(Method::DELETE, stack_id, &["v2", "config", "profile", name], None)
            .await
    }

    /// Create or update a log environment (log drilldown) configuration.
    pub async fn upsert_log_environment(
        &self,
        stack_id: i64,
        env: &EnvironmentDto,
    ) -> Result<(), RequestError> {
        self.write(Method::POST, stack_id, &["v1", "config", "log", "environment"], Some(env))
            .await
    }

    /// List the tenant's log environment configurations.
    pub async fn get_log_environments(
        &self,
        stack_id: i64,
    ) -> Result<TenantEnvConfigResponseDto, RequestError> {
        self.fetch(stack_id, &["v1", "config", "log", "environments"]).await
    }

    /// Delete a log environment configuration.
    pub async fn delete_log_environment(
        &self,
        stack_id: i64,
        name: &str,
    ) -> Result<(), RequestError> {
        self.write::<()>(
            Method::DELETE,
            stack_id,
            &["v1", "config", "log", "environment", name],
            None,
        )
            .await
    }

    // ========================================================================
    // Stack
    // ========================================================================

    /// Enable or reconfigure Asserts for the stack.
    pub async fn put_stack(&self, stack_id: i64, stack: &StackDto) -> Result<(), RequestError> {
        self.write(Method::PUT, stack_id, &["v2", "stack"], Some(stack)).await
    }

    /// Fetch the stack's onboarding status.
    pub async fn get_stack_status(&self, stack_id: i64) -> Result<StackStatusDto, RequestError> {
        self.fetch(stack_id, &["v1", "stack", "status"]).await
    }

    /// Disable Asserts for the stack.
    pub async fn disable_stack(&self, stack_id: i64) -> Result<(), RequestError> {
        self.write::<()>(Method::POST, stack_id, &["v2", "stack", "disable"], None)
            .await
    }

    // ========================================================================
    // Pipeline
    // ========================================================================

    async fn write<B: Serialize + ?Sized>(
        &self,
        method: Method,
        stack_id: i64,
        segments: &[&str],
        body: Option<&B>,
    ) -> Result<(), RequestError> {
        let context = context(&method, segments);
        let body = body
            .map(encode)
            .transpose()
            .map_err(|e| RequestError::new(context.clone(), e))?;
        self.send(method, stack_id, segments, body, &context).await.map(|_| ())
    }

    async fn fetch<T: DeserializeOwned + Default>(
        &self,
        stack_id: i64,
        segments: &[&str],
    ) -> Result<T, RequestError> {
        let context = context(&Method::GET, segments);
        let response = self.send(Method::GET, stack_id, segments, None, &context).await?;
        decode(&response).map_err(|e| RequestError::new(context, e).with_response(&response.body))
    }

    async fn send(
        &self,
        method: Method,
        stack_id: i64,
        segments: &[&str],
        body: Option<Vec<u8>>,
        context: &str,
    ) -> Result<HttpResponse, RequestError> {
        let auth = [
            ("Authorization".to_string(), format!("Bearer {}", self.auth)),
            ("X-Scope-OrgID".to_string(), stack_id.to_string()),
        ];
        self.rest
            .execute(API_NAME, method, &self.base_url, segments, &auth, body)
            .await
            .map_err(|err| {
                let body = match &err {
                    ApiError::Status { body, .. } => Some(body.clone()),
                    _ => None,
                };
                let err = RequestError::new(context, err);
                match body {
                    Some(body) => err.with_response(body.as_bytes()),
                    None => err,
                }
            })
    }
}

fn context(method: &Method, segments: &[&str]) -> String {
    format!("{} /{}", method, segments.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::asserts::MANAGED_BY;
    use crate::testing::MockTransport;
    use serde_json::json;
    use std::sync::Arc;

    const BASE: &str =
        "https://mystack.grafana.net/api/plugins/grafana-asserts-app/resources/asserts/api-server";

    fn client(mock: &MockTransport) -> AssertsClient {
        let rest = RestClient::new(
            Arc::new(mock.clone()),
            "grafana-cloud-provider/test",
            Vec::new(),
        );
        AssertsClient::new(rest, "https://mystack.grafana.net/", "glsa_token")
    }

    fn body_json(mock: &MockTransport) -> serde_json::Value {
        let request = mock.last_request().unwrap();
        serde_json::from_slice(request.body.as_deref().unwrap()).unwrap()
    }

    #[test]
    fn test_base_url_trims_trailing_slash() {
        let mock = MockTransport::new();
        assert_eq!(client(&mock).base_url(), BASE);
    }

    #[tokio::test]
    async fn test_put_prom_rules_headers_and_body() {
        let mock = MockTransport::new();
        mock.push_response(200, "");

        let rules = PrometheusRulesDto {
            name: Some("latency".to_string()),
            ..Default::default()
        };
        client(&mock).put_prom_rules(42, &rules).await.unwrap();

        let request = mock.last_request().unwrap();
        assert_eq!(request.method, Method::PUT);
        assert_eq!(request.url.as_str(), format!("{}/v1/config/prom-rules", BASE));
        assert_eq!(request.header_value("Authorization"), Some("Bearer glsa_token"));
        assert_eq!(request.header_value("X-Scope-OrgID"), Some("42"));
        assert_eq!(body_json(&mock), json!({"name": "latency"}));
    }

    #[tokio::test]
    async fn test_get_prom_rules_not_found() {
        let mock = MockTransport::new();
        mock.push_response(404, "");

        let err = client(&mock).get_prom_rules(42, "missing").await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "GET /v1/config/prom-rules/missing: not found");
    }

    #[tokio::test]
    async fn test_status_error_carries_response_body() {
        let mock = MockTransport::new();
        mock.push_response(400, "group name is required");

        let err = client(&mock)
            .put_model_rules(1, &ModelRulesDto::default())
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "PUT /v1/config/model-rules: status: 400 (response: group name is required)"
        );
    }

    #[tokio::test]
    async fn test_get_threshold_rules_by_scope() {
        let mock = MockTransport::new();
        mock.push_response(200, json!({"groups": [{"name": "g"}]}).to_string());

        let doc = client(&mock)
            .get_threshold_rules(7, ThresholdScope::Resource)
            .await
            .unwrap();
        assert_eq!(doc["groups"][0]["name"], "g");
        assert_eq!(
            mock.last_request().unwrap().url.as_str(),
            format!("{}/v1/config/thresholds/resource", BASE)
        );
    }

    #[tokio::test]
    async fn test_delete_threshold_rule_sends_rule_body() {
        let mock = MockTransport::new();
        mock.push_response(204, "");

        let rule = PrometheusRuleDto {
            record: Some("asserts:latency:p99".to_string()),
            expr: Some("0.5".to_string()),
            ..Default::default()
        };
        client(&mock).delete_threshold_rule(7, &rule).await.unwrap();

        let request = mock.last_request().unwrap();
        assert_eq!(request.method, Method::DELETE);
        assert_eq!(body_json(&mock), json!({"record": "asserts:latency:p99", "expr": "0.5"}));
    }

    #[tokio::test]
    async fn test_disabled_alert_paths() {
        let mock = MockTransport::new();
        mock.push_response(200, "");
        mock.push_response(
            200,
            json!({
                "disabledAlertConfigs": [{"name": "a", "matchLabels": {"alertname": "X"}}]
            })
            .to_string(),
        );
        mock.push_response(200, "");

        let client = client(&mock);
        let config = DisabledAlertConfigDto {
            name: Some("a".to_string()),
            managed_by: Some(MANAGED_BY.to_string()),
            ..Default::default()
        };
        client.put_disabled_alert_config(3, &config).await.unwrap();
        let listing = client.get_disabled_alert_configs(3).await.unwrap();
        client.delete_disabled_alert_config(3, "a").await.unwrap();

        assert_eq!(listing.disabled_alert_configs[0].match_labels["alertname"], "X");
        let urls: Vec<String> = mock.requests().iter().map(|r| r.url.to_string()).collect();
        assert_eq!(
            urls,
            vec![
                format!("{}/v1/config/disabled-alert", BASE),
                format!("{}/v1/config/disabled-alerts", BASE),
                format!("{}/v1/config/disabled-alert/a", BASE),
            ]
        );
    }

    #[tokio::test]
    async fn test_drilldown_paths() {
        let mock = MockTransport::new();
        for _ in 0..4 {
            mock.push_response(200, "{}");
        }

        let client = client(&mock);
        client.get_log_configs(1).await.unwrap();
        client.get_trace_configs(1).await.unwrap();
        client.delete_profile_config(1, "p").await.unwrap();
        client.get_log_environments(1).await.unwrap();

        let paths: Vec<String> = mock
            .requests()
            .iter()
            .map(|r| {
                r.url
                    .path()
                    .trim_start_matches("/api/plugins/grafana-asserts-app/resources/asserts/api-server")
                    .to_string()
            })
            .collect();
        assert_eq!(
            paths,
            vec![
                "/v2/config/log",
                "/v2/config/trace",
                "/v2/config/profile/p",
                "/v1/config/log/environments",
            ]
        );
    }

    #[tokio::test]
    async fn test_stack_status_decode_failure_includes_raw_body() {
        let mock = MockTransport::new();
        mock.push_response(200, "<html>");

        let err = client(&mock).get_stack_status(9).await.unwrap_err();
        let message = err.to_string();
        assert!(message.starts_with("GET /v1/stack/status: failed to unmarshal response body"));
        assert!(message.ends_with("(raw response: <html>)"));
    }

    #[tokio::test]
    async fn test_disable_stack_has_no_body() {
        let mock = MockTransport::new();
        mock.push_response(200, "");

        client(&mock).disable_stack(9).await.unwrap();
        let request = mock.last_request().unwrap();
        assert_eq!(request.method, Method::POST);
        assert!(request.body.is_none());
        assert!(request.url.path().ends_with("/v2/stack/disable"));
    }

    #[test]
    fn test_debug_redacts_auth() {
        let mock = MockTransport::new();
        assert!(!format!("{:?}", client(&mock)).contains("glsa_token"));
    }
}
