//! `grafana_asserts_threshold_rules`: custom threshold rules of a scope.
//!
//! The API stores thresholds per scope and returns the whole scope on read,
//! so the configured YAML is kept in state and only an import renders the
//! server document.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{ignore_not_found, visibility_failed, written};
use crate::error::ProviderError;
use crate::models::asserts::{PrometheusRulesDto, ThresholdScope};
use crate::resource::{Resource, ResourceContext};
use crate::retry::wait_until_visible;
use crate::validation::Validator;

const RESOURCE_TYPE: &str = "grafana_asserts_threshold_rules";
const SCOPES: &[&str] = &["resource", "request"];

/// State of a threshold rules document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdRulesModel {
    /// `scope/name`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Rules name. Changing it replaces the rules.
    pub name: String,
    /// `resource` or `request`.
    pub scope: String,
    /// A Prometheus rules document in YAML.
    pub rules: String,
}

fn parse_rules(yaml: &str) -> Result<PrometheusRulesDto, ProviderError> {
    serde_yaml::from_str(yaml)
        .map_err(|e| ProviderError::Validation(format!("failed to unmarshal rules YAML: {}", e)))
}

/// Split `scope/name` at the first `/`. IDs without a `/` may use `:`.
/// The name keeps any further separators.
fn scope_and_name(id: &str) -> Result<(String, String), ProviderError> {
    match id.split_once('/').or_else(|| id.split_once(':')) {
        Some((scope, name)) if !scope.is_empty() && !name.is_empty() => {
            Ok((scope.to_string(), name.to_string()))
        }
        _ => Err(ProviderError::Validation(format!(
            "unexpected ID format ({}), expected scope/name",
            id
        ))),
    }
}

/// The `grafana_asserts_threshold_rules` resource.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThresholdRules;

impl ThresholdRules {
    async fn put(
        &self,
        ctx: &ResourceContext,
        model: &ThresholdRulesModel,
        summary: &str,
    ) -> Result<(), ProviderError> {
        let (client, stack_id) = ctx.asserts()?;
        let rules = parse_rules(&model.rules)?;
        client
            .put_threshold_rules(stack_id, &rules)
            .await
            .map_err(|e| ProviderError::api(summary, e))?;

        let scope = ThresholdScope::from_scope(&model.scope);
        let what = format!("threshold rules for scope {:?}", model.scope);
        wait_until_visible(ctx.retry, &ctx.cancel, &what, || async move {
            client.get_threshold_rules(stack_id, scope).await.map(drop)
        })
        .await
        .map_err(|e| visibility_failed(summary, e))
    }
}

#[async_trait]
impl Resource for ThresholdRules {
    type Model = ThresholdRulesModel;
    const TYPE_NAME: &'static str = RESOURCE_TYPE;

    fn validate(&self, model: &ThresholdRulesModel, v: &mut Validator) {
        v.require("name", &model.name);
        v.one_of("scope", &model.scope, SCOPES);
        if v.require("rules", &model.rules) {
            if let Err(err) = parse_rules(&model.rules) {
                v.error("rules", err.message());
            }
        }
    }

    #[tracing::instrument(skip_all, fields(scope = %planned.scope, name = %planned.name))]
    async fn create(
        &self,
        ctx: &ResourceContext,
        planned: ThresholdRulesModel,
    ) -> Result<ThresholdRulesModel, ProviderError> {
        self.put(ctx, &planned, "failed to create threshold rules").await?;
        let id = format!("{}/{}", planned.scope, planned.name);
        let state = ThresholdRulesModel {
            id: Some(id.clone()),
            ..planned
        };
        written("threshold rules", &id, self.read(ctx, state).await?)
    }

    async fn read(
        &self,
        ctx: &ResourceContext,
        current: ThresholdRulesModel,
    ) -> Result<Option<ThresholdRulesModel>, ProviderError> {
        let (client, stack_id) = ctx.asserts()?;
        let (scope, name) = match &current.id {
            Some(id) => scope_and_name(id)?,
            None => (current.scope.clone(), current.name.clone()),
        };

        let found = match client
            .get_threshold_rules(stack_id, ThresholdScope::from_scope(&scope))
            .await
        {
            Ok(found) => found,
            Err(err) if err.is_not_found() => {
                tracing::warn!(scope = %scope, name = %name, "threshold rules not found");
                return Ok(None);
            }
            Err(err) => return Err(ProviderError::api("failed to get threshold rules", err)),
        };

        let mut state = current;
        state.id = Some(format!("{}/{}", scope, name));
        if state.rules.trim().is_empty() {
            state.rules = serde_yaml::to_string(&found)
                .map_err(|e| {
                    ProviderError::Internal(format!("failed to marshal rules to YAML: {}", e))
                })?;
        }
        state.scope = scope;
        state.name = name;
        Ok(Some(state))
    }

    #[tracing::instrument(skip_all, fields(scope = %planned.scope, name = %planned.name))]
    async fn update(
        &self,
        ctx: &ResourceContext,
        _prior: ThresholdRulesModel,
        planned: ThresholdRulesModel,
    ) -> Result<ThresholdRulesModel, ProviderError> {
        self.put(ctx, &planned, "failed to update threshold rules").await?;
        let id = format!("{}/{}", planned.scope, planned.name);
        let state = ThresholdRulesModel {
            id: Some(id.clone()),
            ..planned
        };
        written("threshold rules", &id, self.read(ctx, state).await?)
    }

    async fn delete(
        &self,
        ctx: &ResourceContext,
        current: ThresholdRulesModel,
    ) -> Result<(), ProviderError> {
        let (client, stack_id) = ctx.asserts()?;
        let rules = parse_rules(&current.rules)?;
        let rule = rules
            .groups
            .first()
            .and_then(|group| group.rules.first())
            .ok_or_else(|| {
                ProviderError::Validation(
                    "rules must contain at least one rule to delete".to_string(),
                )
            })?;

        ignore_not_found(client.delete_threshold_rule(stack_id, rule).await)
            .map_err(|e| ProviderError::api("failed to delete threshold rules", e))
    }

    async fn import(
        &self,
        ctx: &ResourceContext,
        id: &str,
    ) -> Result<Option<ThresholdRulesModel>, ProviderError> {
        let (scope, name) = scope_and_name(id)?;
        let state = ThresholdRulesModel {
            id: Some(id.to_string()),
            name,
            scope,
            rules: String::new(),
        };
        self.read(ctx, state).await
    }
}
