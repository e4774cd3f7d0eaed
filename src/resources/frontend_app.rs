//! `grafana_frontend_o11y_app`: a Frontend Observability (Faro) app, plus a
//! data source that looks one up by name.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::ignore_not_found;
use crate::client::frontend::FrontendO11yClient;
use crate::client::gcom::GcomClient;
use crate::error::ProviderError;
use crate::models::frontend::{labels_equivalent, AllowedOrigin, App, LogLabel};
use crate::resource::{DataSource, Resource, ResourceContext};
use crate::validation::Validator;

/// Keys accepted in `settings`.
pub const SETTINGS_KEYS: &[&str] = &[
    "combineLabData",
    "geolocation.enabled",
    "geolocation.level",
    "geolocation.country_denylist",
];

const STACK_LOOKUP_FAILED: &str = "failed to get Grafana Cloud Stack information";

/// State of a Frontend Observability app. The data source shares it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrontendO11yAppModel {
    /// App id assigned by the API.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    /// Numeric id of the Grafana Cloud stack. Changing it replaces the app.
    pub stack_id: i64,
    /// App name. Changing it replaces the app.
    pub name: String,
    /// Origins allowed to send telemetry (CORS).
    #[serde(default)]
    pub allowed_origins: Vec<String>,
    /// Extra attributes appended to every signal.
    #[serde(default)]
    pub extra_log_attributes: BTreeMap<String, String>,
    /// App settings, see [`SETTINGS_KEYS`].
    #[serde(default)]
    pub settings: BTreeMap<String, String>,
    /// URL telemetry is sent to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collector_endpoint: Option<String>,
}

impl FrontendO11yAppModel {
    /// Wire form of the app.
    pub fn to_client_model(&self) -> App {
        App {
            id: self.id.unwrap_or_default(),
            name: self.name.clone(),
            cors_allowed_origins: self.allowed_origins.iter().map(AllowedOrigin::new).collect(),
            extra_log_labels: self.log_labels(),
            settings: self.settings.clone(),
            ..Default::default()
        }
    }

    /// State of `app` in `stack_id`. Origins are sorted.
    pub fn from_client_model(stack_id: i64, app: App) -> Self {
        let mut allowed_origins: Vec<String> =
            app.cors_allowed_origins.into_iter().map(|o| o.url).collect();
        allowed_origins.sort();

        Self {
            id: Some(app.id),
            stack_id,
            name: app.name,
            allowed_origins,
            extra_log_attributes: app
                .extra_log_labels
                .into_iter()
                .map(|label| (label.label, label.value))
                .collect(),
            settings: app.settings,
            collector_endpoint: Some(format!("{}/{}", app.collect_endpoint_url, app.key)),
        }
    }

    fn log_labels(&self) -> Vec<LogLabel> {
        self.extra_log_attributes
            .iter()
            .map(|(label, value)| LogLabel::new(label, value))
            .collect()
    }
}

fn validate_app(model: &FrontendO11yAppModel, v: &mut Validator) {
    v.require("name", &model.name);
    if model.stack_id <= 0 {
        v.error("stack_id", "stack_id must be a positive Grafana Cloud stack id");
    }
}

/// Regional base URL and numeric id of the stack identified by `stack`
/// (slug or id).
async fn locate_stack(
    client: &FrontendO11yClient,
    gcom: &GcomClient,
    stack: &str,
) -> Result<(String, i64), ProviderError> {
    let found = gcom
        .get_stack(stack)
        .await
        .map_err(|e| ProviderError::api(STACK_LOOKUP_FAILED, e))?;
    Ok((client.endpoint_url(&found.region_slug, found.created_at), found.id))
}

/// The `grafana_frontend_o11y_app` resource.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrontendO11yApp;

#[async_trait]
impl Resource for FrontendO11yApp {
    type Model = FrontendO11yAppModel;
    const TYPE_NAME: &'static str = "grafana_frontend_o11y_app";

    fn validate(&self, model: &FrontendO11yAppModel, v: &mut Validator) {
        validate_app(model, v);
        v.keys_one_of("settings", model.settings.keys(), SETTINGS_KEYS);
    }

    #[tracing::instrument(skip_all, fields(stack_id = planned.stack_id, name = %planned.name))]
    async fn create(
        &self,
        ctx: &ResourceContext,
        planned: FrontendO11yAppModel,
    ) -> Result<FrontendO11yAppModel, ProviderError> {
        let (client, gcom) = ctx.frontend_o11y()?;
        let (base_url, _) = locate_stack(client, gcom, &planned.stack_id.to_string()).await?;

        let created = client
            .create_app(&base_url, planned.stack_id, &planned.to_client_model())
            .await
            .map_err(|e| ProviderError::api("failed to create frontend o11y app", e))?;
        tracing::info!(app_id = created.id, "created frontend o11y app");
        Ok(FrontendO11yAppModel::from_client_model(planned.stack_id, created))
    }

    async fn read(
        &self,
        ctx: &ResourceContext,
        current: FrontendO11yAppModel,
    ) -> Result<Option<FrontendO11yAppModel>, ProviderError> {
        let (client, gcom) = ctx.frontend_o11y()?;
        let (base_url, _) = locate_stack(client, gcom, &current.stack_id.to_string()).await?;

        let apps = client
            .list_apps(&base_url, current.stack_id)
            .await
            .map_err(|e| ProviderError::api("failed to get frontend o11y app", e))?;
        let Some(app) = apps.into_iter().find(|app| app.name == current.name) else {
            tracing::warn!(name = %current.name, "frontend o11y app not found");
            return Ok(None);
        };

        let keep_labels = labels_equivalent(&current.log_labels(), &app.extra_log_labels);
        let mut state = FrontendO11yAppModel::from_client_model(current.stack_id, app);
        if keep_labels {
            state.extra_log_attributes = current.extra_log_attributes;
        }
        Ok(Some(state))
    }

    #[tracing::instrument(skip_all, fields(stack_id = planned.stack_id, name = %planned.name))]
    async fn update(
        &self,
        ctx: &ResourceContext,
        prior: FrontendO11yAppModel,
        planned: FrontendO11yAppModel,
    ) -> Result<FrontendO11yAppModel, ProviderError> {
        let (client, gcom) = ctx.frontend_o11y()?;
        let (base_url, _) = locate_stack(client, gcom, &planned.stack_id.to_string()).await?;

        let app_id = prior.id.or(planned.id).ok_or_else(|| {
            ProviderError::Internal(format!(
                "frontend o11y app {:?} has no id in state",
                planned.name
            ))
        })?;
        let desired = FrontendO11yAppModel {
            id: Some(app_id),
            ..planned
        };

        let updated = client
            .update_app(&base_url, desired.stack_id, app_id, &desired.to_client_model())
            .await
            .map_err(|e| ProviderError::api("failed to update frontend o11y app", e))?;

        let mut state = FrontendO11yAppModel::from_client_model(desired.stack_id, updated);
        state.collector_endpoint = prior.collector_endpoint.or(state.collector_endpoint);
        Ok(state)
    }

    async fn delete(
        &self,
        ctx: &ResourceContext,
        current: FrontendO11yAppModel,
    ) -> Result<(), ProviderError> {
        let (client, gcom) = ctx.frontend_o11y()?;
        let (base_url, _) = locate_stack(client, gcom, &current.stack_id.to_string()).await?;
        let Some(app_id) = current.id else {
            return Ok(());
        };

        ignore_not_found(client.delete_app(&base_url, current.stack_id, app_id).await)
            .map_err(|e| ProviderError::api("failed to delete frontend o11y app", e))
    }

    /// Import IDs are `{stack slug}:{app id}`.
    async fn import(
        &self,
        ctx: &ResourceContext,
        id: &str,
    ) -> Result<Option<FrontendO11yAppModel>, ProviderError> {
        let parts: Vec<&str> = id.split(':').collect();
        let [stack_slug, app_id] = parts.as_slice() else {
            return Err(ProviderError::api(
                "incorrect ID format",
                "Resource ID should be in the format of 'stackID:appID'",
            ));
        };
        let app_id: i64 = app_id
            .parse()
            .map_err(|e: std::num::ParseIntError| ProviderError::api("invalid app ID", e))?;

        let (client, gcom) = ctx.frontend_o11y()?;
        let (base_url, stack_id) = locate_stack(client, gcom, stack_slug).await?;
        match client.get_app(&base_url, stack_id, app_id).await {
            Ok(app) => Ok(Some(FrontendO11yAppModel::from_client_model(stack_id, app))),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(ProviderError::api("failed to get frontend o11y app", err)),
        }
    }
}

/// The `grafana_frontend_o11y_app` data source.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrontendO11yAppDataSource;

#[async_trait]
impl DataSource for FrontendO11yAppDataSource {
    type Model = FrontendO11yAppModel;
    const TYPE_NAME: &'static str = "grafana_frontend_o11y_app";

    fn validate(&self, model: &FrontendO11yAppModel, v: &mut Validator) {
        validate_app(model, v);
    }

    async fn read(
        &self,
        ctx: &ResourceContext,
        config: FrontendO11yAppModel,
    ) -> Result<FrontendO11yAppModel, ProviderError> {
        let (client, gcom) = ctx.frontend_o11y()?;
        let (base_url, _) = locate_stack(client, gcom, &config.stack_id.to_string()).await?;

        let apps = client
            .list_apps(&base_url, config.stack_id)
            .await
            .map_err(|e| ProviderError::api("failed to get frontend o11y apps", e))?;
        apps.into_iter()
            .find(|app| app.name == config.name)
            .map(|app| FrontendO11yAppModel::from_client_model(config.stack_id, app))
            .ok_or_else(|| {
                ProviderError::api(
                    format!("failed to get app {:?}: not found", config.name),
                    "please verify the app name and stack ID are correct.",
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use serde_json::json;
    use tokio_util::sync::CancellationToken;

    use crate::client::endpoint::EndpointResolver;
    use crate::client::RestClient;
    use crate::resource::Clients;
    use crate::retry::RetryPolicy;
    use crate::testing::MockTransport;

    const FARO: &str = "https://faro-api-prod-eu-west-2.grafana.net/faro/api/v1/app";

    fn context(mock: &MockTransport) -> ResourceContext {
        let rest = RestClient::new(
            Arc::new(mock.clone()),
            "grafana-cloud-provider/test",
            Vec::new(),
        );
        let clients = Clients {
            frontend_o11y: Some(FrontendO11yClient::new(
                rest.clone(),
                EndpointResolver::new("grafana.net"),
                "glc_faro",
            )),
            gcom: Some(GcomClient::new(rest, "https://grafana.com", "glc_cap")),
            ..Default::default()
        };
        ResourceContext::new(Arc::new(clients), CancellationToken::new(), RetryPolicy::default())
    }

    fn push_stack(mock: &MockTransport) {
        mock.push_response(
            200,
            json!({
                "id": 42,
                "slug": "mystack",
                "regionSlug": "prod-eu-west-2",
                "clusterSlug": "prod-eu-west-2",
                "createdAt": "2025-03-01T00:00:00Z"
            })
            .to_string(),
        );
    }

    fn server_app() -> serde_json::Value {
        json!({
            "id": 7,
            "name": "storefront",
            "appKey": "abc123",
            "collectEndpointURL": "https://faro-collector-prod-eu-west-2.grafana.net/collect",
            "corsOrigins": [
                {"id": 2, "url": "https://shop.example.com"},
                {"id": 1, "url": "https://example.com"}
            ],
            "extraLogLabels": [{"id": 5, "label": "team", "value": "web"}],
            "settings": {"combineLabData": "1"}
        })
    }

    fn model() -> FrontendO11yAppModel {
        FrontendO11yAppModel {
            stack_id: 42,
            name: "storefront".to_string(),
            allowed_origins: vec![
                "https://shop.example.com".to_string(),
                "https://example.com".to_string(),
            ],
            extra_log_attributes: [("team".to_string(), "web".to_string())].into(),
            settings: [("combineLabData".to_string(), "1".to_string())].into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_from_client_model_sorts_origins_and_builds_endpoint() {
        let app: App = serde_json::from_value(server_app()).unwrap();
        let state = FrontendO11yAppModel::from_client_model(42, app);
        assert_eq!(state.id, Some(7));
        assert_eq!(state.allowed_origins, vec!["https://example.com", "https://shop.example.com"]);
        assert_eq!(
            state.collector_endpoint.as_deref(),
            Some("https://faro-collector-prod-eu-west-2.grafana.net/collect/abc123")
        );
        assert_eq!(state.extra_log_attributes["team"], "web");
    }

    #[test]
    fn test_validate_settings_keys() {
        let mut bad = model();
        bad.settings.insert("geolocation.city".to_string(), "1".to_string());
        let mut v = Validator::new();
        FrontendO11yApp.validate(&bad, &mut v);
        assert_eq!(v.diagnostics().len(), 1);
        assert_eq!(v.diagnostics()[0].attribute.as_deref(), Some("settings.geolocation.city"));
    }

    #[tokio::test]
    async fn test_create_resolves_region_endpoint() {
        let mock = MockTransport::new();
        push_stack(&mock);
        mock.push_response(200, server_app().to_string());

        let state = FrontendO11yApp.create(&context(&mock), model()).await.unwrap();
        assert_eq!(state.id, Some(7));

        let requests = mock.requests();
        assert_eq!(requests[0].url.as_str(), "https://grafana.com/api/instances/42");
        assert_eq!(requests[1].url.as_str(), FARO);
        assert_eq!(requests[1].header_value("Authorization"), Some("Bearer 42:glc_faro"));
        let sent: serde_json::Value =
            serde_json::from_slice(requests[1].body.as_deref().unwrap()).unwrap();
        assert_eq!(sent["corsOrigins"][0]["url"], "https://shop.example.com");
        assert!(sent.get("id").is_none());
    }

    #[tokio::test]
    async fn test_create_failure_summary() {
        let mock = MockTransport::new();
        push_stack(&mock);
        mock.push_response(500, "boom");
        let err = FrontendO11yApp.create(&context(&mock), model()).await.unwrap_err();
        assert_eq!(err.message(), "failed to create frontend o11y app");
    }

    #[tokio::test]
    async fn test_stack_lookup_failure() {
        let mock = MockTransport::new();
        let err = FrontendO11yApp.create(&context(&mock), model()).await.unwrap_err();
        assert_eq!(err.message(), STACK_LOOKUP_FAILED);
    }

    #[tokio::test]
    async fn test_read_keeps_equivalent_labels_and_drops_missing_app() {
        let mock = MockTransport::new();
        push_stack(&mock);
        mock.push_response(200, json!([server_app()]).to_string());

        let state = FrontendO11yApp
            .read(&context(&mock), model())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(state.extra_log_attributes, model().extra_log_attributes);

        push_stack(&mock);
        mock.push_response(200, "[]");
        assert!(FrontendO11yApp.read(&context(&mock), model()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_uses_prior_id_and_endpoint() {
        let mock = MockTransport::new();
        push_stack(&mock);
        mock.push_response(200, server_app().to_string());

        let prior = FrontendO11yAppModel {
            id: Some(7),
            collector_endpoint: Some("https://collector.example/old".to_string()),
            ..model()
        };
        let state = FrontendO11yApp
            .update(&context(&mock), prior, model())
            .await
            .unwrap();
        assert_eq!(state.collector_endpoint.as_deref(), Some("https://collector.example/old"));
        assert_eq!(mock.requests()[1].url.as_str(), format!("{}/7", FARO));
    }

    #[tokio::test]
    async fn test_import_id_errors() {
        let mock = MockTransport::new();
        let ctx = context(&mock);

        let err = FrontendO11yApp.import(&ctx, "mystack").await.unwrap_err();
        assert_eq!(err.message(), "incorrect ID format");
        assert!(err.to_string().contains("stackID:appID"));

        let err = FrontendO11yApp.import(&ctx, "mystack:seven").await.unwrap_err();
        assert_eq!(err.message(), "invalid app ID");
        assert!(mock.requests().is_empty());
    }

    #[tokio::test]
    async fn test_import_by_slug() {
        let mock = MockTransport::new();
        push_stack(&mock);
        mock.push_response(200, server_app().to_string());

        let state = FrontendO11yApp
            .import(&context(&mock), "mystack:7")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(state.stack_id, 42);
        assert_eq!(state.name, "storefront");
        assert_eq!(mock.requests()[0].url.as_str(), "https://grafana.com/api/instances/mystack");
    }

    #[tokio::test]
    async fn test_data_source_reports_missing_app() {
        let mock = MockTransport::new();
        push_stack(&mock);
        mock.push_response(200, json!([server_app()]).to_string());
        let found = FrontendO11yAppDataSource
            .read(&context(&mock), model())
            .await
            .unwrap();
        assert_eq!(found.id, Some(7));

        push_stack(&mock);
        mock.push_response(200, "[]");
        let err = FrontendO11yAppDataSource
            .read(&context(&mock), model())
            .await
            .unwrap_err();
        assert_eq!(err.message(), "failed to get app \"storefront\": not found");
        assert!(err.to_string().contains("please verify the app name and stack ID are correct."));
    }

    #[tokio::test]
    async fn test_delete_ignores_missing_app() {
        let mock = MockTransport::new();
        push_stack(&mock);
        mock.push_response(404, "");
        let current = FrontendO11yAppModel {
            id: Some(7),
            ..model()
        };
        FrontendO11yApp.delete(&context(&mock), current).await.unwrap();
        assert_eq!(mock.requests()[1].method, reqwest::Method::DELETE);
    }
}
