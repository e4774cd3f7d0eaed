//! `grafana_asserts_log_drilldown_config`: a log drilldown environment
//! written as YAML.
//!
//! The API normalizes the environment document, so the configured YAML is
//! kept in state as written. Import renders the server's copy.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{ignore_not_found, read_outcome, written};
use crate::error::ProviderError;
use crate::models::asserts::EnvironmentDto;
use crate::resource::{Resource, ResourceContext};
use crate::retry::{api_failure, with_retry_read};
use crate::validation::Validator;

const LABEL: &str = "log environment config";

/// State of a log drilldown environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogDrilldownConfigModel {
    /// Same as `name`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Environment name. Changing it replaces the environment.
    pub name: String,
    /// The environment document in YAML, without the name.
    pub config: String,
}

fn parse_environment(yaml: &str) -> Result<EnvironmentDto, ProviderError> {
    serde_yaml::from_str(yaml)
        .map_err(|e| {
            ProviderError::Validation(format!("failed to unmarshal environment YAML: {}", e))
        })
}

/// The `grafana_asserts_log_drilldown_config` resource.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogDrilldownConfig;

impl LogDrilldownConfig {
    async fn upsert(
        &self,
        ctx: &ResourceContext,
        model: &LogDrilldownConfigModel,
    ) -> Result<(), ProviderError> {
        let (client, stack_id) = ctx.asserts()?;
        let mut env = parse_environment(&model.config)?;
        env.name = Some(model.name.clone());
        client
            .upsert_log_environment(stack_id, &env)
            .await
            .map_err(|e| ProviderError::api("failed to upsert log environment config", e))
    }
}

#[async_trait]
impl Resource for LogDrilldownConfig {
    type Model = LogDrilldownConfigModel;
    const TYPE_NAME: &'static str = "grafana_asserts_log_drilldown_config";

    fn validate(&self, model: &LogDrilldownConfigModel, v: &mut Validator) {
        v.require("name", &model.name);
        if v.require("config", &model.config) {
            if let Err(err) = parse_environment(&model.config) {
                v.error("config", err.message());
            }
        }
    }

    #[tracing::instrument(skip_all, fields(name = %planned.name))]
    async fn create(
        &self,
        ctx: &ResourceContext,
        planned: LogDrilldownConfigModel,
    ) -> Result<LogDrilldownConfigModel, ProviderError> {
        self.upsert(ctx, &planned).await?;
        let name = planned.name.clone();
        let state = LogDrilldownConfigModel {
            id: Some(name.clone()),
            ..planned
        };
        written(LABEL, &name, self.read(ctx, state).await?)
    }

    async fn read(
        &self,
        ctx: &ResourceContext,
        current: LogDrilldownConfigModel,
    ) -> Result<Option<LogDrilldownConfigModel>, ProviderError> {
        let (client, stack_id) = ctx.asserts()?;
        let name = current.id.clone().unwrap_or_else(|| current.name.clone());

        let result = with_retry_read(ctx.retry, &ctx.cancel, |attempt, max| async move {
            client
                .get_log_environments(stack_id)
                .await
                .map_err(|err| api_failure("get tenant environment log config", attempt, max, err))
        })
        .await;

        let Some(tenant) = read_outcome(LABEL, &name, result)? else {
            return Ok(None);
        };
        let Some(found) = tenant
            .environments
            .into_iter()
            .find(|env| env.name.as_deref() == Some(name.as_str()))
        else {
            tracing::warn!(name = %name, "log environment config not found");
            return Ok(None);
        };

        let mut state = current;
        if state.config.trim().is_empty() {
            state.config = serde_yaml::to_string(&found.body)
                .map_err(|e| {
                    ProviderError::Internal(format!("failed to marshal environment to YAML: {}", e))
                })?;
        }
        state.id = Some(name.clone());
        state.name = name;
        Ok(Some(state))
    }

    #[tracing::instrument(skip_all, fields(name = %planned.name))]
    async fn update(
        &self,
        ctx: &ResourceContext,
        prior: LogDrilldownConfigModel,
        planned: LogDrilldownConfigModel,
    ) -> Result<LogDrilldownConfigModel, ProviderError> {
        self.upsert(ctx, &planned).await?;
        let state = LogDrilldownConfigModel {
            id: prior.id.or_else(|| Some(planned.name.clone())),
            ..planned
        };
        let name = state.name.clone();
        written(LABEL, &name, self.read(ctx, state).await?)
    }

    async fn delete(
        &self,
        ctx: &ResourceContext,
        current: LogDrilldownConfigModel,
    ) -> Result<(), ProviderError> {
        let (client, stack_id) = ctx.asserts()?;
        let name = current.id.unwrap_or(current.name);
        ignore_not_found(client.delete_log_environment(stack_id, &name).await)
            .map_err(|e| ProviderError::api("failed to delete log environment config", e))
    }

    async fn import(
        &self,
        ctx: &ResourceContext,
        id: &str,
    ) -> Result<Option<LogDrilldownConfigModel>, ProviderError> {
        let state = LogDrilldownConfigModel {
            id: Some(id.to_string()),
            name: id.to_string(),
            config: String::new(),
        };
        self.read(ctx, state).await
    }

    async fn list(&self, ctx: &ResourceContext) -> Result<Vec<String>, ProviderError> {
        let (client, stack_id) = ctx.asserts()?;
        let tenant = client
            .get_log_environments(stack_id)
            .await
            .map_err(|e| ProviderError::api("failed to list log environment configs", e))?;
        Ok(tenant.environments.into_iter().filter_map(|env| env.name).collect())
    }
}
