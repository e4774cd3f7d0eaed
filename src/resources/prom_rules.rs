//! `grafana_asserts_prom_rule_file`: a Prometheus recording and alerting
//! rules file managed by Asserts.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{default_true, ignore_not_found, non_empty, read_outcome, written};
use crate::error::ProviderError;
use crate::models::asserts::{PrometheusRuleDto, PrometheusRuleGroupDto, PrometheusRulesDto};
use crate::resource::{Resource, ResourceContext};
use crate::retry::{api_failure, not_found, with_retry_read};
use crate::validation::Validator;

const LABEL: &str = "Prometheus rules file";

/// State of a rules file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromRuleFileModel {
    /// Same as `name`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// File name. Changing it replaces the file.
    pub name: String,
    /// Whether the file's rules are evaluated.
    #[serde(default = "default_true")]
    pub active: bool,
    /// Rule groups.
    #[serde(rename = "group", default)]
    pub groups: Vec<RuleGroupModel>,
}

/// A rule group.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleGroupModel {
    /// Group name.
    pub name: String,
    /// Evaluation interval, e.g. `30s`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<String>,
    /// Rules of the group.
    #[serde(rename = "rule", default)]
    pub rules: Vec<RuleModel>,
}

/// A recording rule (`record`) or an alerting rule (`alert`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleModel {
    /// Recorded series name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record: Option<String>,
    /// Alert name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alert: Option<String>,
    /// PromQL expression.
    #[serde(default)]
    pub expr: String,
    /// How long the condition must hold before firing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    /// Whether the rule is evaluated.
    #[serde(default = "default_true")]
    pub active: bool,
    /// Labels added to the result.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    /// Alert annotations.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    /// Groups the rule is disabled in.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub disable_in_groups: BTreeSet<String>,
}

impl Default for RuleModel {
    fn default() -> Self {
        Self {
            record: None,
            alert: None,
            expr: String::new(),
            duration: None,
            active: true,
            labels: BTreeMap::new(),
            annotations: BTreeMap::new(),
            disable_in_groups: BTreeSet::new(),
        }
    }
}

fn present(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.is_empty())
}

/// Check the structural rules the API enforces.
pub(crate) fn validate_rule_groups(v: &mut Validator, groups: &[RuleGroupModel]) {
    if groups.is_empty() {
        v.error("group", "at least one rule group is required");
        return;
    }
    for (g, group) in groups.iter().enumerate() {
        if group.rules.is_empty() {
            v.error(
                format!("group.{}.rule", g),
                format!("group '{}' must have at least one rule", group.name),
            );
        }
        for (r, rule) in group.rules.iter().enumerate() {
            let attribute = format!("group.{}.rule.{}", g, r);
            match (present(&rule.record), present(&rule.alert)) {
                (true, true) => v.error(
                    attribute.clone(),
                    format!(
                        "rule in group '{}' cannot have both 'record' and 'alert' specified",
                        group.name
                    ),
                ),
                (false, false) => v.error(
                    attribute.clone(),
                    format!(
                        "rule in group '{}' must have either 'record' or 'alert' specified",
                        group.name
                    ),
                ),
                _ => {},
            }
            if rule.expr.is_empty() {
                v.error(
                    format!("{}.expr", attribute),
                    format!("rule in group '{}' must have 'expr' specified", group.name),
                );
            }
        }
    }
}

/// Convert rule groups to their wire form.
///
/// `active` is only sent when false, and empty collections are omitted.
pub(crate) fn build_rule_groups(groups: &[RuleGroupModel]) -> Vec<PrometheusRuleGroupDto> {
    groups
        .iter()
        .map(|group| PrometheusRuleGroupDto {
            name: Some(group.name.clone()),
            interval: non_empty(group.interval.clone()),
            rules: group.rules.iter().map(build_rule).collect(),
        })
        .collect()
}

fn build_rule(rule: &RuleModel) -> PrometheusRuleDto {
    PrometheusRuleDto {
        record: non_empty(rule.record.clone()),
        alert: non_empty(rule.alert.clone()),
        expr: Some(rule.expr.clone()),
        duration: non_empty(rule.duration.clone()),
        active: (!rule.active).then_some(false),
        labels: rule.labels.clone(),
        annotations: rule.annotations.clone(),
        disable_in_groups: rule.disable_in_groups.iter().cloned().collect(),
    }
}

/// Convert wire rule groups back to state.
pub(crate) fn flatten_rule_groups(groups: Vec<PrometheusRuleGroupDto>) -> Vec<RuleGroupModel> {
    groups
        .into_iter()
        .map(|group| RuleGroupModel {
            name: group.name.unwrap_or_default(),
            interval: group.interval,
            rules: group.rules.into_iter().map(flatten_rule).collect(),
        })
        .collect()
}

fn flatten_rule(rule: PrometheusRuleDto) -> RuleModel {
    RuleModel {
        record: rule.record,
        alert: rule.alert,
        expr: rule.expr.unwrap_or_default(),
        duration: rule.duration,
        active: rule.active.unwrap_or(true),
        labels: rule.labels,
        annotations: rule.annotations,
        disable_in_groups: rule.disable_in_groups.into_iter().collect(),
    }
}

/// The `grafana_asserts_prom_rule_file` resource.
#[derive(Debug, Clone, Copy, Default)]
pub struct PromRuleFile;

impl PromRuleFile {
    async fn put(
        &self,
        ctx: &ResourceContext,
        model: &PromRuleFileModel,
        summary: &str,
    ) -> Result<(), ProviderError> {
        let (client, stack_id) = ctx.asserts()?;
        let dto = PrometheusRulesDto {
            name: Some(model.name.clone()),
            active: (!model.active).then_some(false),
            groups: build_rule_groups(&model.groups),
        };
        client
            .put_prom_rules(stack_id, &dto)
            .await
            .map_err(|e| ProviderError::api(summary, e))
    }
}

#[async_trait]
impl Resource for PromRuleFile {
    type Model = PromRuleFileModel;
    const TYPE_NAME: &'static str = "grafana_asserts_prom_rule_file";

    fn validate(&self, model: &PromRuleFileModel, v: &mut Validator) {
        v.require("name", &model.name);
        validate_rule_groups(v, &model.groups);
    }

    #[tracing::instrument(skip_all, fields(name = %planned.name))]
    async fn create(
        &self,
        ctx: &ResourceContext,
        planned: PromRuleFileModel,
    ) -> Result<PromRuleFileModel, ProviderError> {
        self.put(ctx, &planned, "failed to create Prometheus rules file").await?;
        let name = planned.name.clone();
        let state = PromRuleFileModel {
            id: Some(name.clone()),
            ..planned
        };
        written(LABEL, &name, self.read(ctx, state).await?)
    }

    async fn read(
        &self,
        ctx: &ResourceContext,
        current: PromRuleFileModel,
    ) -> Result<Option<PromRuleFileModel>, ProviderError> {
        let (client, stack_id) = ctx.asserts()?;
        let name = current.id.clone().unwrap_or_else(|| current.name.clone());
        let key = name.as_str();

        let result = with_retry_read(ctx.retry, &ctx.cancel, |attempt, max| async move {
            client.get_prom_rules(stack_id, key).await.map_err(|err| {
                if err.is_not_found() {
                    not_found(LABEL, key, attempt, max)
                } else {
                    api_failure("get Prometheus rules file", attempt, max, err)
                }
            })
        })
        .await;

        let Some(found) = read_outcome(LABEL, key, result)? else {
            return Ok(None);
        };
        let mut state = current;
        state.id = Some(name.clone());
        state.name = found.name.unwrap_or(name);
        state.active = found.active.unwrap_or(true);
        if !found.groups.is_empty() {
            state.groups = flatten_rule_groups(found.groups);
        }
        Ok(Some(state))
    }

    #[tracing::instrument(skip_all, fields(name = %planned.name))]
    async fn update(
        &self,
        ctx: &ResourceContext,
        prior: PromRuleFileModel,
        planned: PromRuleFileModel,
    ) -> Result<PromRuleFileModel, ProviderError> {
        self.put(ctx, &planned, "failed to update Prometheus rules file").await?;
        let state = PromRuleFileModel {
            id: prior.id.or_else(|| Some(planned.name.clone())),
            ..planned
        };
        let name = state.name.clone();
        written(LABEL, &name, self.read(ctx, state).await?)
    }

    async fn delete(
        &self,
        ctx: &ResourceContext,
        current: PromRuleFileModel,
    ) -> Result<(), ProviderError> {
        let (client, stack_id) = ctx.asserts()?;
        let name = current.id.unwrap_or(current.name);
        ignore_not_found(client.delete_prom_rules(stack_id, &name).await)
            .map_err(|e| ProviderError::api("failed to delete Prometheus rules file", e))
    }

    async fn import(
        &self,
        ctx: &ResourceContext,
        id: &str,
    ) -> Result<Option<PromRuleFileModel>, ProviderError> {
        let state = PromRuleFileModel {
            id: Some(id.to_string()),
            name: id.to_string(),
            active: true,
            groups: Vec::new(),
        };
        self.read(ctx, state).await
    }
}
