//! Wire models of the Asserts API.
//!
//! Field names follow the API's camelCase JSON. Optional fields are omitted
//! when unset so that server-side defaults apply.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::nullable;

/// Value of `managedBy` on objects written by this provider.
pub const MANAGED_BY: &str = "terraform";

/// A Prometheus rules file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrometheusRulesDto {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<PrometheusRuleGroupDto>,
}

/// A group of Prometheus rules evaluated together.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrometheusRuleGroupDto {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<String>,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<PrometheusRuleDto>,
}

/// A recording or alerting rule.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrometheusRuleDto {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alert: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expr: Option<String>,
    #[serde(rename = "for", default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Vec::is_empty")]
    pub disable_in_groups: Vec<String>,
}

/// A named document whose body is user-supplied YAML.
///
/// Used for custom model rules and log drilldown environments, where the
/// provider only injects the name and passes the rest through untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NamedDocumentDto {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(flatten)]
    pub body: Map<String, Value>,
}

/// Custom model rules.
pub type ModelRulesDto = NamedDocumentDto;

/// A log drilldown environment.
pub type EnvironmentDto = NamedDocumentDto;

/// Response of the tenant environment listing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TenantEnvConfigResponseDto {
    #[serde(default, deserialize_with = "nullable")]
    pub environments: Vec<EnvironmentDto>,
}

/// Which threshold rule set to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThresholdScope {
    /// Resource thresholds.
    Resource,
    /// Request thresholds.
    Request,
}

impl ThresholdScope {
    /// `"resource"` selects resource thresholds; anything else request thresholds.
    pub fn from_scope(scope: &str) -> Self {
        if scope == "resource" {
            Self::Resource
        } else {
            Self::Request
        }
    }

    /// Path segment of the scope.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Resource => "resource",
            Self::Request => "request",
        }
    }
}

/// A suppressed assertion (disabled alert) configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisabledAlertConfigDto {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "BTreeMap::is_empty")]
    pub match_labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub managed_by: Option<String>,
}

/// Response of the disabled alert configuration listing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisabledAlertConfigsDto {
    #[serde(default, deserialize_with = "nullable")]
    pub disabled_alert_configs: Vec<DisabledAlertConfigDto>,
}

/// One entity property match of a drilldown configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyMatchEntryDto {
    #[serde(default)]
    pub property: String,
    #[serde(default)]
    pub op: String,
    #[serde(default, deserialize_with = "nullable")]
    pub values: Vec<String>,
}

/// Log drilldown configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogDrilldownConfigDto {
    #[serde(default)]
    pub name: String,
    #[serde(
        rename = "match",
        default,
        deserialize_with = "nullable",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub match_rules: Vec<PropertyMatchEntryDto>,
    #[serde(default)]
    pub default_config: bool,
    #[serde(default)]
    pub data_source_uid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_property_to_log_label_mapping: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter_by_span_id: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter_by_trace_id: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub managed_by: Option<String>,
}

/// Response of the tenant log configuration listing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantLogConfigResponseDto {
    #[serde(default, deserialize_with = "nullable")]
    pub log_drilldown_configs: Vec<LogDrilldownConfigDto>,
}

/// Trace drilldown configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceDrilldownConfigDto {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub priority: i32,
    #[serde(
        rename = "match",
        default,
        deserialize_with = "nullable",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub match_rules: Vec<PropertyMatchEntryDto>,
    #[serde(default)]
    pub default_config: bool,
    #[serde(default)]
    pub data_source_uid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_property_to_trace_label_mapping: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub managed_by: Option<String>,
}

/// Response of the tenant trace configuration listing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantTraceConfigResponseDto {
    #[serde(default, deserialize_with = "nullable")]
    pub trace_drilldown_configs: Vec<TraceDrilldownConfigDto>,
}

/// Profile drilldown configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileDrilldownConfigDto {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub priority: i32,
    #[serde(
        rename = "match",
        default,
        deserialize_with = "nullable",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub match_rules: Vec<PropertyMatchEntryDto>,
    #[serde(default)]
    pub default_config: bool,
    #[serde(default)]
    pub data_source_uid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_property_to_profile_label_mapping: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub managed_by: Option<String>,
}

/// Response of the tenant profile configuration listing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantProfileConfigResponseDto {
    #[serde(default, deserialize_with = "nullable")]
    pub profile_drilldown_configs: Vec<ProfileDrilldownConfigDto>,
}

/// Stack enablement request.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackDto {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gcom_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mimir_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assertion_detector_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grafana_token: Option<String>,
}

impl std::fmt::Debug for StackDto {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redact = |token: &Option<String>| token.as_ref().map(|_| "<redacted>");
        f.debug_struct("StackDto")
            .field("gcom_token", &redact(&self.gcom_token))
            .field("mimir_token", &redact(&self.mimir_token))
            .field("assertion_detector_token", &redact(&self.assertion_detector_token))
            .field("grafana_token", &redact(&self.grafana_token))
            .finish()
    }
}

/// Stack status as reported by the API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackStatusDto {
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub version: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_prom_rule_wire_names() {
        let rule = PrometheusRuleDto {
            alert: Some("HighLatency".to_string()),
            expr: Some("latency > 1".to_string()),
            duration: Some("5m".to_string()),
            active: Some(false),
            disable_in_groups: vec!["canary".to_string()],
            ..Default::default()
        };

        assert_eq!(
            serde_json::to_value(&rule).unwrap(),
            json!({
                "alert": "HighLatency",
                "expr": "latency > 1",
                "for": "5m",
                "active": false,
                "disableInGroups": ["canary"]
            })
        );
    }

    #[test]
    fn test_named_document_keeps_unknown_fields() {
        let doc: ModelRulesDto = serde_yaml::from_str(
            "entities:\n  - type: Service\n    name: workload\n",
        )
        .unwrap();
        assert!(doc.name.is_none());
        assert!(doc.body.contains_key("entities"));

        let named = ModelRulesDto {
            name: Some("svc".to_string()),
            ..doc
        };
        let value = serde_json::to_value(&named).unwrap();
        assert_eq!(value["name"], "svc");
        assert_eq!(value["entities"][0]["type"], "Service");
    }

    #[test]
    fn test_tenant_listing_tolerates_null() {
        let listing: TenantLogConfigResponseDto =
            serde_json::from_value(json!({"logDrilldownConfigs": null})).unwrap();
        assert!(listing.log_drilldown_configs.is_empty());

        let listing: DisabledAlertConfigsDto = serde_json::from_value(json!({})).unwrap();
        assert!(listing.disabled_alert_configs.is_empty());
    }

    #[test]
    fn test_threshold_scope() {
        assert_eq!(ThresholdScope::from_scope("resource"), ThresholdScope::Resource);
        assert_eq!(ThresholdScope::from_scope("request"), ThresholdScope::Request);
        assert_eq!(ThresholdScope::from_scope("anything"), ThresholdScope::Request);
        assert_eq!(ThresholdScope::Resource.as_str(), "resource");
    }

    #[test]
    fn test_stack_dto_debug_redacts_tokens() {
        let dto = StackDto {
            gcom_token: Some("glc_secret".to_string()),
            ..Default::default()
        };
        let rendered = format!("{:?}", dto);
        assert!(!rendered.contains("glc_secret"));
        assert!(rendered.contains("<redacted>"));
    }
}
