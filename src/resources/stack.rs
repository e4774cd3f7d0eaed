//! `grafana_asserts_stack`: enables Asserts on the configured stack.
//!
//! The tokens are write-only. The API never returns them, so state keeps
//! whatever was last applied.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{read_outcome, written};
use crate::config::Secret;
use crate::error::ProviderError;
use crate::models::asserts::StackDto;
use crate::resource::{Resource, ResourceContext};
use crate::retry::{api_failure, with_retry_read};
use crate::validation::Validator;

const LABEL: &str = "stack";

/// State of the Asserts stack configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssertsStackModel {
    /// The stack id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Cloud access policy token with `stacks:read`, `metrics:read` and
    /// `metrics:write`. Used for GCom, Mimir and the assertion detector.
    #[serde(default)]
    pub cloud_access_policy_token: Secret,
    /// Service account token, needed when Grafana managed alerts are enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grafana_token: Option<Secret>,
    /// Whether Asserts is enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    /// Onboarding status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Configuration version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<i64>,
}

fn to_dto(model: &AssertsStackModel) -> StackDto {
    let token = (!model.cloud_access_policy_token.is_empty())
        .then(|| model.cloud_access_policy_token.expose().to_string());
    StackDto {
        gcom_token: token.clone(),
        mimir_token: token.clone(),
        assertion_detector_token: token,
        grafana_token: model
            .grafana_token
            .as_ref()
            .filter(|t| !t.is_empty())
            .map(|t| t.expose().to_string()),
    }
}

/// The `grafana_asserts_stack` resource.
#[derive(Debug, Clone, Copy, Default)]
pub struct AssertsStack;

impl AssertsStack {
    async fn upsert(
        &self,
        ctx: &ResourceContext,
        planned: AssertsStackModel,
    ) -> Result<AssertsStackModel, ProviderError> {
        let (client, stack_id) = ctx.asserts()?;
        client
            .put_stack(stack_id, &to_dto(&planned))
            .await
            .map_err(|e| ProviderError::api("failed to create/update stack", e))?;

        let id = stack_id.to_string();
        let state = AssertsStackModel {
            id: Some(id.clone()),
            ..planned
        };
        written(LABEL, &id, self.read(ctx, state).await?)
    }
}

#[async_trait]
impl Resource for AssertsStack {
    type Model = AssertsStackModel;
    const TYPE_NAME: &'static str = "grafana_asserts_stack";

    fn validate(&self, model: &AssertsStackModel, v: &mut Validator) {
        v.require("cloud_access_policy_token", model.cloud_access_policy_token.expose());
    }

    #[tracing::instrument(skip_all)]
    async fn create(
        &self,
        ctx: &ResourceContext,
        planned: AssertsStackModel,
    ) -> Result<AssertsStackModel, ProviderError> {
        self.upsert(ctx, planned).await
    }

    async fn read(
        &self,
        ctx: &ResourceContext,
        current: AssertsStackModel,
    ) -> Result<Option<AssertsStackModel>, ProviderError> {
        let (client, stack_id) = ctx.asserts()?;
        let id = stack_id.to_string();

        let result = with_retry_read(ctx.retry, &ctx.cancel, |attempt, max| async move {
            client
                .get_stack_status(stack_id)
                .await
                .map_err(|err| api_failure("get stack status", attempt, max, err))
        })
        .await;

        let Some(status) = read_outcome(LABEL, &id, result)? else {
            return Ok(None);
        };
        let mut state = current;
        state.id = Some(id);
        state.enabled = status.enabled.or(state.enabled);
        state.status = status.status.or(state.status);
        state.version = status.version.or(state.version);
        Ok(Some(state))
    }

    #[tracing::instrument(skip_all)]
    async fn update(
        &self,
        ctx: &ResourceContext,
        _prior: AssertsStackModel,
        planned: AssertsStackModel,
    ) -> Result<AssertsStackModel, ProviderError> {
        self.upsert(ctx, planned).await
    }

    async fn delete(
        &self,
        ctx: &ResourceContext,
        _current: AssertsStackModel,
    ) -> Result<(), ProviderError> {
        let (client, stack_id) = ctx.asserts()?;
        client
            .disable_stack(stack_id)
            .await
            .map_err(|e| ProviderError::api("failed to disable stack", e))
    }

    async fn import(
        &self,
        ctx: &ResourceContext,
        id: &str,
    ) -> Result<Option<AssertsStackModel>, ProviderError> {
        let (_, stack_id) = ctx.asserts()?;
        if id != stack_id.to_string() {
            return Err(ProviderError::Validation(format!(
                "import ID {:?} does not match the provider's stack_id {}",
                id, stack_id
            )));
        }
        self.read(ctx, AssertsStackModel::default()).await
    }

    async fn list(&self, ctx: &ResourceContext) -> Result<Vec<String>, ProviderError> {
        let (client, stack_id) = ctx.asserts()?;
        match client.get_stack_status(stack_id).await {
            Ok(_) => Ok(vec![stack_id.to_string()]),
            Err(err) => {
                tracing::debug!(error = %err, "stack status unavailable, nothing to list");
                Ok(Vec::new())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::test_support::{asserts_context, body, path, STACK_ID};
    use crate::testing::MockTransport;
    use serde_json::json;

    fn model() -> AssertsStackModel {
        AssertsStackModel {
            cloud_access_policy_token: Secret::new("glc_cap"),
            grafana_token: Some(Secret::new("glsa_admin")),
            ..Default::default()
        }
    }

    #[test]
    fn test_dto_fans_out_access_policy_token() {
        let wire = serde_json::to_value(to_dto(&model())).unwrap();
        assert_eq!(
            wire,
            json!({
                "gcomToken": "glc_cap",
                "mimirToken": "glc_cap",
                "assertionDetectorToken": "glc_cap",
                "grafanaToken": "glsa_admin"
            })
        );
    }

    #[test]
    fn test_debug_hides_tokens() {
        let rendered = format!("{:?}", model());
        assert!(!rendered.contains("glc_cap"));
        assert!(!rendered.contains("glsa_admin"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_keeps_tokens_and_fills_status() {
        let mock = MockTransport::new();
        mock.push_response(200, "");
        mock.push_response(
            200,
            json!({"enabled": true, "status": "COMPLETE", "version": 3}).to_string(),
        );

        let state = AssertsStack.create(&asserts_context(&mock), model()).await.unwrap();
        assert_eq!(state.id, Some(STACK_ID.to_string()));
        assert_eq!(state.enabled, Some(true));
        assert_eq!(state.status.as_deref(), Some("COMPLETE"));
        assert_eq!(state.version, Some(3));
        assert_eq!(state.cloud_access_policy_token, Secret::new("glc_cap"));

        assert_eq!(path(&mock, 0), "PUT /v2/stack");
        assert_eq!(path(&mock, 1), "GET /v1/stack/status");
        assert_eq!(body(&mock, 0)["gcomToken"], "glc_cap");

        let stored = serde_json::to_value(&state).unwrap();
        assert_eq!(stored["cloud_access_policy_token"], "glc_cap");
    }

    #[tokio::test]
    async fn test_delete_disables_stack() {
        let mock = MockTransport::new();
        mock.push_response(200, "");
        AssertsStack.delete(&asserts_context(&mock), model()).await.unwrap();
        assert_eq!(path(&mock, 0), "POST /v2/stack/disable");

        mock.push_response(500, "boom");
        let err = AssertsStack.delete(&asserts_context(&mock), model()).await.unwrap_err();
        assert_eq!(err.message(), "failed to disable stack");
    }

    #[tokio::test(start_paused = true)]
    async fn test_import_checks_stack_id() {
        let mock = MockTransport::new();
        let err = AssertsStack
            .import(&asserts_context(&mock), "999")
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Validation(_)));

        mock.push_response(200, json!({"enabled": false, "status": "NOT_STARTED"}).to_string());
        let state = AssertsStack
            .import(&asserts_context(&mock), &STACK_ID.to_string())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(state.enabled, Some(false));
        assert!(state.cloud_access_policy_token.is_empty());
    }

    #[tokio::test]
    async fn test_list_swallows_status_errors() {
        let mock = MockTransport::new();
        mock.push_response(200, json!({"enabled": true}).to_string());
        mock.push_response(403, "forbidden");
        let ctx = asserts_context(&mock);

        assert_eq!(AssertsStack.list(&ctx).await.unwrap(), vec![STACK_ID.to_string()]);
        assert!(AssertsStack.list(&ctx).await.unwrap().is_empty());
    }
}
