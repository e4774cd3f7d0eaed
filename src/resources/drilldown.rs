//! Entity match rules shared by the log, trace and profile drilldown configs.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::models::asserts::PropertyMatchEntryDto;
use crate::validation::Validator;

/// Operators accepted by log configurations.
pub(crate) const LOG_MATCH_OPS: &[&str] =
    &["equals", "not equals", "contains", "is null", "is not null"];

/// Operators accepted by trace and profile configurations.
pub(crate) const QUERY_MATCH_OPS: &[&str] = &[
    "=",
    "<>",
    "<",
    ">",
    "<=",
    ">=",
    "IS NULL",
    "IS NOT NULL",
    "STARTS WITH",
    "CONTAINS",
];

/// One entity property match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchRuleModel {
    /// Entity property to match.
    pub property: String,
    /// Match operator.
    pub op: String,
    /// Values to match against.
    #[serde(default)]
    pub values: Vec<String>,
}

pub(crate) fn validate_match_rules(
    v: &mut Validator,
    rules: &[MatchRuleModel],
    allowed_ops: &[&str],
) {
    for (i, rule) in rules.iter().enumerate() {
        v.require(&format!("match.{}.property", i), &rule.property);
        v.one_of(&format!("match.{}.op", i), &rule.op, allowed_ops);
    }
}

pub(crate) fn build_match_rules(rules: &[MatchRuleModel]) -> Vec<PropertyMatchEntryDto> {
    rules
        .iter()
        .map(|rule| PropertyMatchEntryDto {
            property: rule.property.clone(),
            op: rule.op.clone(),
            values: rule.values.clone(),
        })
        .collect()
}

pub(crate) fn flatten_match_rules(entries: Vec<PropertyMatchEntryDto>) -> Vec<MatchRuleModel> {
    entries
        .into_iter()
        .map(|entry| MatchRuleModel {
            property: entry.property,
            op: entry.op,
            values: entry.values,
        })
        .collect()
}

/// An empty label mapping is the same as no mapping.
pub(crate) fn mapping(labels: &BTreeMap<String, String>) -> Option<BTreeMap<String, String>> {
    (!labels.is_empty()).then(|| labels.clone())
}
