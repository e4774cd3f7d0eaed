//! `grafana_asserts_trace_config`: where Asserts looks up traces for an entity.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::drilldown::{
    build_match_rules, flatten_match_rules, mapping, validate_match_rules, QUERY_MATCH_OPS,
};
use super::{ignore_not_found, read_outcome, written, MatchRuleModel};
use crate::error::ProviderError;
use crate::models::asserts::{TraceDrilldownConfigDto, MANAGED_BY};
use crate::resource::{Resource, ResourceContext};
use crate::retry::{api_failure, with_retry_read};
use crate::validation::Validator;

const LABEL: &str = "trace configuration";

/// State of a trace drilldown configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceConfigModel {
    /// Same as `name`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Configuration name. Changing it replaces the configuration.
    pub name: String,
    /// Lower values win when several configurations match.
    pub priority: i64,
    /// Entity property matches selecting where the configuration applies.
    #[serde(rename = "match", default, skip_serializing_if = "Vec::is_empty")]
    pub match_rules: Vec<MatchRuleModel>,
    /// Whether this is the tenant's default configuration.
    pub default_config: bool,
    /// Tempo data source to query.
    pub data_source_uid: String,
    /// Entity property to trace label mapping.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub entity_property_to_trace_label_mapping: BTreeMap<String, String>,
}

fn to_dto(model: &TraceConfigModel) -> TraceDrilldownConfigDto {
    TraceDrilldownConfigDto {
        name: model.name.clone(),
        priority: model.priority.clamp(0, i64::from(i32::MAX)) as i32,
        match_rules: build_match_rules(&model.match_rules),
        default_config: model.default_config,
        data_source_uid: model.data_source_uid.clone(),
        entity_property_to_trace_label_mapping: mapping(
            &model.entity_property_to_trace_label_mapping,
        ),
        managed_by: Some(MANAGED_BY.to_string()),
    }
}

fn apply_dto(mut state: TraceConfigModel, found: TraceDrilldownConfigDto) -> TraceConfigModel {
    state.name = found.name;
    state.priority = i64::from(found.priority);
    if !found.match_rules.is_empty() {
        state.match_rules = flatten_match_rules(found.match_rules);
    }
    state.default_config = found.default_config;
    state.data_source_uid = found.data_source_uid;
    if let Some(labels) = found.entity_property_to_trace_label_mapping {
        state.entity_property_to_trace_label_mapping = labels;
    }
    state
}

/// The `grafana_asserts_trace_config` resource.
#[derive(Debug, Clone, Copy, Default)]
pub struct TraceConfig;

impl TraceConfig {
    async fn upsert(
        &self,
        ctx: &ResourceContext,
        model: &TraceConfigModel,
        summary: &str,
    ) -> Result<(), ProviderError> {
        let (client, stack_id) = ctx.asserts()?;
        client
            .upsert_trace_config(stack_id, &to_dto(model))
            .await
            .map_err(|e| ProviderError::api(summary, e))
    }
}

#[async_trait]
impl Resource for TraceConfig {
    type Model = TraceConfigModel;
    const TYPE_NAME: &'static str = "grafana_asserts_trace_config";

    fn validate(&self, model: &TraceConfigModel, v: &mut Validator) {
        v.require("name", &model.name);
        v.int_between("priority", model.priority, 0, i64::from(i32::MAX));
        v.require("data_source_uid", &model.data_source_uid);
        validate_match_rules(v, &model.match_rules, QUERY_MATCH_OPS);
    }

    #[tracing::instrument(skip_all, fields(name = %planned.name))]
    async fn create(
        &self,
        ctx: &ResourceContext,
        planned: TraceConfigModel,
    ) -> Result<TraceConfigModel, ProviderError> {
        self.upsert(ctx, &planned, "failed to create trace configuration").await?;
        let name = planned.name.clone();
        let state = TraceConfigModel {
            id: Some(name.clone()),
            ..planned
        };
        written(LABEL, &name, self.read(ctx, state).await?)
    }

    async fn read(
        &self,
        ctx: &ResourceContext,
        current: TraceConfigModel,
    ) -> Result<Option<TraceConfigModel>, ProviderError> {
        let (client, stack_id) = ctx.asserts()?;
        let name = current.id.clone().unwrap_or_else(|| current.name.clone());

        let result = with_retry_read(ctx.retry, &ctx.cancel, |attempt, max| async move {
            client
                .get_trace_configs(stack_id)
                .await
                .map_err(|err| api_failure("get tenant trace configuration", attempt, max, err))
        })
        .await;

        let Some(tenant) = read_outcome(LABEL, &name, result)? else {
            return Ok(None);
        };
        let Some(found) = tenant
            .trace_drilldown_configs
            .into_iter()
            .find(|config| config.name == name)
        else {
            tracing::warn!(name = %name, "trace configuration not found");
            return Ok(None);
        };

        let state = TraceConfigModel {
            id: Some(name),
            ..current
        };
        Ok(Some(apply_dto(state, found)))
    }

    #[tracing::instrument(skip_all, fields(name = %planned.name))]
    async fn update(
        &self,
        ctx: &ResourceContext,
        prior: TraceConfigModel,
        planned: TraceConfigModel,
    ) -> Result<TraceConfigModel, ProviderError> {
        self.upsert(ctx, &planned, "failed to update trace configuration").await?;
        let state = TraceConfigModel {
            id: prior.id.or_else(|| Some(planned.name.clone())),
            ..planned
        };
        let name = state.name.clone();
        written(LABEL, &name, self.read(ctx, state).await?)
    }

    async fn delete(
        &self,
        ctx: &ResourceContext,
        current: TraceConfigModel,
    ) -> Result<(), ProviderError> {
        let (client, stack_id) = ctx.asserts()?;
        let name = current.id.unwrap_or(current.name);
        ignore_not_found(client.delete_trace_config(stack_id, &name).await)
            .map_err(|e| ProviderError::api("failed to delete trace configuration", e))
    }

    async fn import(
        &self,
        ctx: &ResourceContext,
        id: &str,
    ) -> Result<Option<TraceConfigModel>, ProviderError> {
        let state = TraceConfigModel {
            id: Some(id.to_string()),
            name: id.to_string(),
            priority: 0,
            match_rules: Vec::new(),
            default_config: false,
            data_source_uid: String::new(),
            entity_property_to_trace_label_mapping: BTreeMap::new(),
        };
        self.read(ctx, state).await
    }

    async fn list(&self, ctx: &ResourceContext) -> Result<Vec<String>, ProviderError> {
        let (client, stack_id) = ctx.asserts()?;
        let tenant = client
            .get_trace_configs(stack_id)
            .await
            .map_err(|e| ProviderError::api("failed to list trace configurations", e))?;
        Ok(tenant
            .trace_drilldown_configs
            .into_iter()
            .map(|config| config.name)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::test_support::{asserts_context, body, path};
    use crate::testing::MockTransport;
    use serde_json::json;

    fn model() -> TraceConfigModel {
        serde_json::from_value(json!({
            "name": "checkout-traces",
            "priority": 10,
            "match": [
                {"property": "asserts_entity_type", "op": "=", "values": ["Service"]},
                {"property": "namespace", "op": "STARTS WITH", "values": ["prod-"]}
            ],
            "default_config": false,
            "data_source_uid": "tempo-uid",
            "entity_property_to_trace_label_mapping": {"service": "service.name"}
        }))
        .unwrap()
    }

    #[test]
    fn test_validate_priority_range_and_ops() {
        let mut bad = model();
        bad.priority = i64::from(i32::MAX) + 1;
        bad.match_rules[0].op = "equals".to_string();
        let mut v = Validator::new();
        TraceConfig.validate(&bad, &mut v);
        let attributes: Vec<_> = v
            .diagnostics()
            .iter()
            .filter_map(|d| d.attribute.as_deref())
            .collect();
        assert_eq!(attributes, vec!["priority", "match.0.op"]);

        let mut v = Validator::new();
        TraceConfig.validate(&model(), &mut v);
        assert!(!v.has_errors());
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_sends_priority_and_reads_back() {
        let mock = MockTransport::new();
        mock.push_response(200, "");
        mock.push_response(
            200,
            json!({"traceDrilldownConfigs": [to_dto(&model())]}).to_string(),
        );

        let state = TraceConfig.create(&asserts_context(&mock), model()).await.unwrap();
        assert_eq!(state.priority, 10);
        assert_eq!(state.match_rules.len(), 2);
        assert_eq!(state.entity_property_to_trace_label_mapping["service"], "service.name");

        assert_eq!(path(&mock, 0), "POST /v2/config/trace");
        let sent = body(&mock, 0);
        assert_eq!(sent["priority"], 10);
        assert_eq!(sent["managedBy"], "terraform");
        assert_eq!(sent["match"][1]["op"], "STARTS WITH");
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_missing_listing_removes_from_state() {
        let mock = MockTransport::new();
        let state = TraceConfig.read(&asserts_context(&mock), model()).await.unwrap();
        assert!(state.is_none());
        assert_eq!(mock.requests().len(), 3);
    }

    #[tokio::test]
    async fn test_delete_error_summary() {
        let mock = MockTransport::new();
        mock.push_response(500, "boom");
        let err = TraceConfig.delete(&asserts_context(&mock), model()).await.unwrap_err();
        assert_eq!(err.message(), "failed to delete trace configuration");
        assert_eq!(path(&mock, 0), "DELETE /v2/config/trace/checkout-traces");
    }
}
