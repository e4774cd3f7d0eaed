//! `grafana_asserts_custom_model_rules`: entity model rules written as YAML.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{ignore_not_found, visibility_failed, written};
use crate::error::ProviderError;
use crate::models::asserts::ModelRulesDto;
use crate::resource::{Resource, ResourceContext};
use crate::retry::wait_until_visible;
use crate::validation::Validator;

const LABEL: &str = "custom model rules";

/// State of a custom model rules document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomModelRulesModel {
    /// Same as `name`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Rules name. Changing it replaces the rules.
    pub name: String,
    /// The rules body in YAML, without the name.
    pub rules: String,
}

fn parse_rules(yaml: &str) -> Result<ModelRulesDto, serde_yaml::Error> {
    serde_yaml::from_str(yaml)
}

/// Whether `yaml` describes the same document as `body`.
fn same_rules(yaml: &str, body: &serde_json::Map<String, Value>) -> bool {
    match parse_rules(yaml) {
        Ok(parsed) => &parsed.body == body,
        Err(_) => false,
    }
}

/// The `grafana_asserts_custom_model_rules` resource.
#[derive(Debug, Clone, Copy, Default)]
pub struct CustomModelRules;

impl CustomModelRules {
    async fn put(
        &self,
        ctx: &ResourceContext,
        model: &CustomModelRulesModel,
        summary: &str,
    ) -> Result<(), ProviderError> {
        let (client, stack_id) = ctx.asserts()?;
        let mut rules = parse_rules(&model.rules)
            .map_err(|e| {
                ProviderError::Validation(format!("failed to unmarshal rules YAML: {}", e))
            })?;
        rules.name = Some(model.name.clone());

        client
            .put_model_rules(stack_id, &rules)
            .await
            .map_err(|e| ProviderError::api(summary, e))?;

        let name = model.name.as_str();
        let what = format!("{} {:?}", LABEL, name);
        wait_until_visible(ctx.retry, &ctx.cancel, &what, || async move {
            client.get_model_rules(stack_id, name).await.map(drop)
        })
        .await
        .map_err(|e| visibility_failed(summary, e))
    }
}

#[async_trait]
impl Resource for CustomModelRules {
    type Model = CustomModelRulesModel;
    const TYPE_NAME: &'static str = "grafana_asserts_custom_model_rules";

    fn validate(&self, model: &CustomModelRulesModel, v: &mut Validator) {
        v.require("name", &model.name);
        if v.require("rules", &model.rules) {
            if let Err(err) = parse_rules(&model.rules) {
                v.error("rules", format!("failed to unmarshal rules YAML: {}", err));
            }
        }
    }

    #[tracing::instrument(skip_all, fields(name = %planned.name))]
    async fn create(
        &self,
        ctx: &ResourceContext,
        planned: CustomModelRulesModel,
    ) -> Result<CustomModelRulesModel, ProviderError> {
        self.put(ctx, &planned, "failed to create custom model rules").await?;
        let name = planned.name.clone();
        let state = CustomModelRulesModel {
            id: Some(name.clone()),
            ..planned
        };
        written(LABEL, &name, self.read(ctx, state).await?)
    }

    async fn read(
        &self,
        ctx: &ResourceContext,
        current: CustomModelRulesModel,
    ) -> Result<Option<CustomModelRulesModel>, ProviderError> {
        let (client, stack_id) = ctx.asserts()?;
        let name = current.id.clone().unwrap_or_else(|| current.name.clone());

        let found = match client.get_model_rules(stack_id, &name).await {
            Ok(found) => found,
            Err(err) if err.is_not_found() => {
                tracing::warn!(name = %name, "custom model rules not found");
                return Ok(None);
            }
            Err(err) => return Err(ProviderError::api("failed to get custom model rules", err)),
        };

        let mut state = current;
        state.id = Some(name.clone());
        state.name = found.name.unwrap_or(name);
        if !same_rules(&state.rules, &found.body) {
            state.rules = serde_yaml::to_string(&found.body)
                .map_err(|e| {
                    ProviderError::Internal(format!("failed to marshal rules to YAML: {}", e))
                })?;
        }
        Ok(Some(state))
    }

    #[tracing::instrument(skip_all, fields(name = %planned.name))]
    async fn update(
        &self,
        ctx: &ResourceContext,
        prior: CustomModelRulesModel,
        planned: CustomModelRulesModel,
    ) -> Result<CustomModelRulesModel, ProviderError> {
        self.put(ctx, &planned, "failed to update custom model rules").await?;
        let state = CustomModelRulesModel {
            id: prior.id.or_else(|| Some(planned.name.clone())),
            ..planned
        };
        let name = state.name.clone();
        written(LABEL, &name, self.read(ctx, state).await?)
    }

    async fn delete(
        &self,
        ctx: &ResourceContext,
        current: CustomModelRulesModel,
    ) -> Result<(), ProviderError> {
        let (client, stack_id) = ctx.asserts()?;
        let name = current.id.unwrap_or(current.name);
        ignore_not_found(client.delete_model_rules(stack_id, &name).await)
            .map_err(|e| ProviderError::api("failed to delete custom model rules", e))
    }

    async fn import(
        &self,
        ctx: &ResourceContext,
        id: &str,
    ) -> Result<Option<CustomModelRulesModel>, ProviderError> {
        let state = CustomModelRulesModel {
            id: Some(id.to_string()),
            name: id.to_string(),
            rules: String::new(),
        };
        self.read(ctx, state).await
    }
}
