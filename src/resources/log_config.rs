//! `grafana_asserts_log_config`: where Asserts looks up logs for an entity.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::drilldown::{
    build_match_rules, flatten_match_rules, mapping, validate_match_rules, LOG_MATCH_OPS,
};
use super::{ignore_not_found, non_empty, read_outcome, written, MatchRuleModel};
use crate::error::ProviderError;
use crate::models::asserts::{LogDrilldownConfigDto, MANAGED_BY};
use crate::resource::{Resource, ResourceContext};
use crate::retry::{api_failure, with_retry_read};
use crate::validation::Validator;

const LABEL: &str = "log configuration";

/// State of a log drilldown configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogConfigModel {
    /// Same as `name`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Configuration name. Changing it replaces the configuration.
    pub name: String,
    /// Accepted but not sent; the API does not support it yet.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i64>,
    /// Entity property matches selecting where the configuration applies.
    #[serde(rename = "match", default, skip_serializing_if = "Vec::is_empty")]
    pub match_rules: Vec<MatchRuleModel>,
    /// Whether this is the tenant's default configuration.
    pub default_config: bool,
    /// Loki data source to query.
    pub data_source_uid: String,
    /// Label that marks error lines.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_label: Option<String>,
    /// Entity property to log label mapping.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub entity_property_to_log_label_mapping: BTreeMap<String, String>,
    /// Filter logs by span ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter_by_span_id: Option<bool>,
    /// Filter logs by trace ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter_by_trace_id: Option<bool>,
}

fn to_dto(model: &LogConfigModel) -> LogDrilldownConfigDto {
    LogDrilldownConfigDto {
        name: model.name.clone(),
        match_rules: build_match_rules(&model.match_rules),
        default_config: model.default_config,
        data_source_uid: model.data_source_uid.clone(),
        error_label: non_empty(model.error_label.clone()),
        entity_property_to_log_label_mapping: mapping(&model.entity_property_to_log_label_mapping),
        filter_by_span_id: model.filter_by_span_id,
        filter_by_trace_id: model.filter_by_trace_id,
        managed_by: Some(MANAGED_BY.to_string()),
    }
}

/// Overlay what the API reports onto `state`. Fields the API omits keep their prior value.
fn apply_dto(mut state: LogConfigModel, found: LogDrilldownConfigDto) -> LogConfigModel {
    state.name = found.name;
    if !found.match_rules.is_empty() {
        state.match_rules = flatten_match_rules(found.match_rules);
    }
    state.default_config = found.default_config;
    state.data_source_uid = found.data_source_uid;
    state.error_label = found.error_label.or(state.error_label);
    if let Some(labels) = found.entity_property_to_log_label_mapping {
        state.entity_property_to_log_label_mapping = labels;
    }
    state.filter_by_span_id = found.filter_by_span_id.or(state.filter_by_span_id);
    state.filter_by_trace_id = found.filter_by_trace_id.or(state.filter_by_trace_id);
    state
}

/// The `grafana_asserts_log_config` resource.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogConfig;

impl LogConfig {
    async fn upsert(
        &self,
        ctx: &ResourceContext,
        model: &LogConfigModel,
        summary: &str,
    ) -> Result<(), ProviderError> {
        let (client, stack_id) = ctx.asserts()?;
        client
            .upsert_log_config(stack_id, &to_dto(model))
            .await
            .map_err(|e| ProviderError::api(summary, e))
    }
}

#[async_trait]
impl Resource for LogConfig {
    type Model = LogConfigModel;
    const TYPE_NAME: &'static str = "grafana_asserts_log_config";

    fn validate(&self, model: &LogConfigModel, v: &mut Validator) {
        v.require("name", &model.name);
        v.require("data_source_uid", &model.data_source_uid);
        validate_match_rules(v, &model.match_rules, LOG_MATCH_OPS);
    }

    #[tracing::instrument(skip_all, fields(name = %planned.name))]
    async fn create(
        &self,
        ctx: &ResourceContext,
        planned: LogConfigModel,
    ) -> Result<LogConfigModel, ProviderError> {
        self.upsert(ctx, &planned, "failed to create log configuration").await?;
        let name = planned.name.clone();
        let state = LogConfigModel {
            id: Some(name.clone()),
            ..planned
        };
        written(LABEL, &name, self.read(ctx, state).await?)
    }

    async fn read(
        &self,
        ctx: &ResourceContext,
        current: LogConfigModel,
    ) -> Result<Option<LogConfigModel>, ProviderError> {
        let (client, stack_id) = ctx.asserts()?;
        let name = current.id.clone().unwrap_or_else(|| current.name.clone());

        let result = with_retry_read(ctx.retry, &ctx.cancel, |attempt, max| async move {
            client
                .get_log_configs(stack_id)
                .await
                .map_err(|err| api_failure("get tenant log configuration", attempt, max, err))
        })
        .await;

        let Some(tenant) = read_outcome(LABEL, &name, result)? else {
            return Ok(None);
        };
        let Some(found) = tenant
            .log_drilldown_configs
            .into_iter()
            .find(|config| config.name == name)
        else {
            tracing::warn!(name = %name, "log configuration not found");
            return Ok(None);
        };

        let state = LogConfigModel {
            id: Some(name),
            ..current
        };
        Ok(Some(apply_dto(state, found)))
    }

    #[tracing::instrument(skip_all, fields(name = %planned.name))]
    async fn update(
        &self,
        ctx: &ResourceContext,
        prior: LogConfigModel,
        planned: LogConfigModel,
    ) -> Result<LogConfigModel, ProviderError> {
        self.upsert(ctx, &planned, "failed to update log configuration").await?;
        let state = LogConfigModel {
            id: prior.id.or_else(|| Some(planned.name.clone())),
            ..planned
        };
        let name = state.name.clone();
        written(LABEL, &name, self.read(ctx, state).await?)
    }

    async fn delete(
        &self,
        ctx: &ResourceContext,
        current: LogConfigModel,
    ) -> Result<(), ProviderError> {
        let (client, stack_id) = ctx.asserts()?;
        let name = current.id.unwrap_or(current.name);
        ignore_not_found(client.delete_log_config(stack_id, &name).await)
            .map_err(|e| ProviderError::api("failed to delete log configuration", e))
    }

    async fn import(
        &self,
        ctx: &ResourceContext,
        id: &str,
    ) -> Result<Option<LogConfigModel>, ProviderError> {
        let state = LogConfigModel {
            id: Some(id.to_string()),
            name: id.to_string(),
            priority: None,
            match_rules: Vec::new(),
            default_config: false,
            data_source_uid: String::new(),
            error_label: None,
            entity_property_to_log_label_mapping: BTreeMap::new(),
            filter_by_span_id: None,
            filter_by_trace_id: None,
        };
        self.read(ctx, state).await
    }

    async fn list(&self, ctx: &ResourceContext) -> Result<Vec<String>, ProviderError> {
        let (client, stack_id) = ctx.asserts()?;
        let tenant = client
            .get_log_configs(stack_id)
            .await
            .map_err(|e| ProviderError::api("failed to list log configurations", e))?;
        Ok(tenant
            .log_drilldown_configs
            .into_iter()
            .map(|config| config.name)
            .collect())
    }
}
