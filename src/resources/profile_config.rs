//! `grafana_asserts_profile_config`: where Asserts looks up profiles for an entity.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::drilldown::{
    build_match_rules, flatten_match_rules, mapping, validate_match_rules, QUERY_MATCH_OPS,
};
use super::{ignore_not_found, read_outcome, written, MatchRuleModel};
use crate::error::ProviderError;
use crate::models::asserts::{ProfileDrilldownConfigDto, MANAGED_BY};
use crate::resource::{Resource, ResourceContext};
use crate::retry::{api_failure, with_retry_read};
use crate::validation::Validator;

const LABEL: &str = "profile configuration";

/// State of a profile drilldown configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileConfigModel {
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
    /// Pyroscope data source to query.
    pub data_source_uid: String,
    /// Entity property to profile label mapping.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub entity_property_to_profile_label_mapping: BTreeMap<String, String>,
}

fn to_dto(model: &ProfileConfigModel) -> ProfileDrilldownConfigDto {
    ProfileDrilldownConfigDto {
        name: model.name.clone(),
        priority: model.priority.clamp(0, i64::from(i32::MAX)) as i32,
        match_rules: build_match_rules(&model.match_rules),
        default_config: model.default_config,
        data_source_uid: model.data_source_uid.clone(),
        entity_property_to_profile_label_mapping: mapping(
            &model.entity_property_to_profile_label_mapping,
        ),
        managed_by: Some(MANAGED_BY.to_string()),
    }
}

fn apply_dto(
    mut state: ProfileConfigModel,
    found: ProfileDrilldownConfigDto,
) -> ProfileConfigModel {
    state.name = found.name;
    state.priority = i64::from(found.priority);
    if !found.match_rules.is_empty() {
        state.match_rules = flatten_match_rules(found.match_rules);
    }
    state.default_config = found.default_config;
    state.data_source_uid = found.data_source_uid;
    if let Some(labels) = found.entity_property_to_profile_label_mapping {
        state.entity_property_to_profile_label_mapping = labels;
    }
    state
}

/// The `grafana_asserts_profile_config` resource.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProfileConfig;

impl ProfileConfig {
    async fn upsert(
        &self,
        ctx: &ResourceContext,
        model: &ProfileConfigModel,
        summary: &str,
    ) -> Result<(), ProviderError> {
        let (client, stack_id) = ctx.asserts()?;
        client
            .upsert_profile_config(stack_id, &to_dto(model))
            .await
            .map_err(|e| ProviderError::api(summary, e))
    }
}

#[async_trait]
impl Resource for ProfileConfig {
    type Model = ProfileConfigModel;
    const TYPE_NAME: &'static str = "grafana_asserts_profile_config";

    fn validate(&self, model: &ProfileConfigModel, v: &mut Validator) {
        v.require("name", &model.name);
        v.int_between("priority", model.priority, 0, i64::from(i32::MAX));
        v.require("data_source_uid", &model.data_source_uid);
        validate_match_rules(v, &model.match_rules, QUERY_MATCH_OPS);
    }

    #[tracing::instrument(skip_all, fields(name = %planned.name))]
    async fn create(
        &self,
        ctx: &ResourceContext,
        planned: ProfileConfigModel,
    ) -> Result<ProfileConfigModel, ProviderError> {
        self.upsert(ctx, &planned, "failed to create profile configuration").await?;
        let name = planned.name.clone();
        let state = ProfileConfigModel {
            id: Some(name.clone()),
            ..planned
        };
        written(LABEL, &name, self.read(ctx, state).await?)
    }

    async fn read(
        &self,
        ctx: &ResourceContext,
        current: ProfileConfigModel,
    ) -> Result<Option<ProfileConfigModel>, ProviderError> {
        let (client, stack_id) = ctx.asserts()?;
        let name = current.id.clone().unwrap_or_else(|| current.name.clone());

        let result = with_retry_read(ctx.retry, &ctx.cancel, |attempt, max| async move {
            client
                .get_profile_configs(stack_id)
                .await
                .map_err(|err| api_failure("get tenant profile configuration", attempt, max, err))
        })
        .await;

        let Some(tenant) = read_outcome(LABEL, &name, result)? else {
            return Ok(None);
        };
        let Some(found) = tenant
            .profile_drilldown_configs
            .into_iter()
            .find(|config| config.name == name)
        else {
            tracing::warn!(name = %name, "profile configuration not found");
            return Ok(None);
        };

        let state = ProfileConfigModel {
            id: Some(name),
            ..current
        };
        Ok(Some(apply_dto(state, found)))
    }

    #[tracing::instrument(skip_all, fields(name = %planned.name))]
    async fn update(
        &self,
        ctx: &ResourceContext,
        prior: ProfileConfigModel,
        planned: ProfileConfigModel,
    ) -> Result<ProfileConfigModel, ProviderError> {
        self.upsert(ctx, &planned, "failed to update profile configuration").await?;
        let state = ProfileConfigModel {
            id: prior.id.or_else(|| Some(planned.name.clone())),
            ..planned
        };
        let name = state.name.clone();
        written(LABEL, &name, self.read(ctx, state).await?)
    }

    async fn delete(
        &self,
        ctx: &ResourceContext,
        current: ProfileConfigModel,
    ) -> Result<(), ProviderError> {
        let (client, stack_id) = ctx.asserts()?;
        let name = current.id.unwrap_or(current.name);
        ignore_not_found(client.delete_profile_config(stack_id, &name).await)
            .map_err(|e| ProviderError::api("failed to delete profile configuration", e))
    }

    async fn import(
        &self,
        ctx: &ResourceContext,
        id: &str,
    ) -> Result<Option<ProfileConfigModel>, ProviderError> {
        let state = ProfileConfigModel {
            id: Some(id.to_string()),
            name: id.to_string(),
            priority: 0,
            match_rules: Vec::new(),
            default_config: false,
            data_source_uid: String::new(),
            entity_property_to_profile_label_mapping: BTreeMap::new(),
        };
        self.read(ctx, state).await
    }

    async fn list(&self, ctx: &ResourceContext) -> Result<Vec<String>, ProviderError> {
        let (client, stack_id) = ctx.asserts()?;
        let tenant = client
            .get_profile_configs(stack_id)
            .await
            .map_err(|e| ProviderError::api("failed to list profile configurations", e))?;
        Ok(tenant
            .profile_drilldown_configs
            .into_iter()
            .map(|config| config.name)
            .collect())
    }
}
