//! `grafana_asserts_suppressed_assertions_config`: silences assertions whose
//! labels match.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{ignore_not_found, read_outcome, written};
use crate::error::ProviderError;
use crate::models::asserts::{DisabledAlertConfigDto, MANAGED_BY};
use crate::resource::{Resource, ResourceContext};
use crate::retry::{api_failure, not_found, with_retry_read};
use crate::validation::Validator;

const LABEL: &str = "disabled alert configuration";

/// State of a disabled alert configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisabledAlertConfigModel {
    /// Same as `name`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Configuration name. Changing it replaces the configuration.
    pub name: String,
    /// Labels an assertion must carry to be suppressed.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub match_labels: BTreeMap<String, String>,
}

/// The `grafana_asserts_suppressed_assertions_config` resource.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledAlertConfig;

impl DisabledAlertConfig {
    async fn put(
        &self,
        ctx: &ResourceContext,
        model: &DisabledAlertConfigModel,
        summary: &str,
    ) -> Result<(), ProviderError> {
        let (client, stack_id) = ctx.asserts()?;
        let dto = DisabledAlertConfigDto {
            name: Some(model.name.clone()),
            match_labels: model.match_labels.clone(),
            managed_by: Some(MANAGED_BY.to_string()),
        };
        client
            .put_disabled_alert_config(stack_id, &dto)
            .await
            .map_err(|e| ProviderError::api(summary, e))
    }
}

#[async_trait]
impl Resource for DisabledAlertConfig {
    type Model = DisabledAlertConfigModel;
    const TYPE_NAME: &'static str = "grafana_asserts_suppressed_assertions_config";

    fn validate(&self, model: &DisabledAlertConfigModel, v: &mut Validator) {
        v.require("name", &model.name);
    }

    #[tracing::instrument(skip_all, fields(name = %planned.name))]
    async fn create(
        &self,
        ctx: &ResourceContext,
        planned: DisabledAlertConfigModel,
    ) -> Result<DisabledAlertConfigModel, ProviderError> {
        self.put(ctx, &planned, "failed to create disabled alert configuration")
            .await?;
        let name = planned.name.clone();
        let state = DisabledAlertConfigModel {
            id: Some(name.clone()),
            ..planned
        };
        written(LABEL, &name, self.read(ctx, state).await?)
    }

    async fn read(
        &self,
        ctx: &ResourceContext,
        current: DisabledAlertConfigModel,
    ) -> Result<Option<DisabledAlertConfigModel>, ProviderError> {
        let (client, stack_id) = ctx.asserts()?;
        let name = current.id.clone().unwrap_or_else(|| current.name.clone());
        let key = name.as_str();

        let result = with_retry_read(ctx.retry, &ctx.cancel, |attempt, max| async move {
            let configs = match client.get_disabled_alert_configs(stack_id).await {
                Ok(configs) => configs,
                Err(err) => {
                    return Err(api_failure("get disabled alert configurations", attempt, max, err))
                }
            };
            configs
                .disabled_alert_configs
                .into_iter()
                .find(|config| config.name.as_deref() == Some(key))
                .ok_or_else(|| not_found(LABEL, key, attempt, max))
        })
        .await;

        let Some(found) = read_outcome(LABEL, key, result)? else {
            return Ok(None);
        };
        Ok(Some(DisabledAlertConfigModel {
            id: Some(name.clone()),
            name: found.name.unwrap_or(name),
            match_labels: found.match_labels,
        }))
    }

    #[tracing::instrument(skip_all, fields(name = %planned.name))]
    async fn update(
        &self,
        ctx: &ResourceContext,
        prior: DisabledAlertConfigModel,
        planned: DisabledAlertConfigModel,
    ) -> Result<DisabledAlertConfigModel, ProviderError> {
        self.put(ctx, &planned, "failed to update disabled alert configuration")
            .await?;
        let state = DisabledAlertConfigModel {
            id: prior.id.or_else(|| Some(planned.name.clone())),
            ..planned
        };
        let name = state.name.clone();
        written(LABEL, &name, self.read(ctx, state).await?)
    }

    async fn delete(
        &self,
        ctx: &ResourceContext,
        current: DisabledAlertConfigModel,
    ) -> Result<(), ProviderError> {
        let (client, stack_id) = ctx.asserts()?;
        let name = current.id.unwrap_or(current.name);
        ignore_not_found(client.delete_disabled_alert_config(stack_id, &name).await)
            .map_err(|e| ProviderError::api("failed to delete disabled alert configuration", e))
    }

    async fn import(
        &self,
        ctx: &ResourceContext,
        id: &str,
    ) -> Result<Option<DisabledAlertConfigModel>, ProviderError> {
        let state = DisabledAlertConfigModel {
            id: Some(id.to_string()),
            name: id.to_string(),
            match_labels: BTreeMap::new(),
        };
        self.read(ctx, state).await
    }

    async fn list(&self, ctx: &ResourceContext) -> Result<Vec<String>, ProviderError> {
        let (client, stack_id) = ctx.asserts()?;
        let configs = client
            .get_disabled_alert_configs(stack_id)
            .await
            .map_err(|e| ProviderError::api("failed to list disabled alert configurations", e))?;
        Ok(configs
            .disabled_alert_configs
            .into_iter()
            .filter_map(|config| config.name)
            .collect())
    }
}
