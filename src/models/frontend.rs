//! Wire models of the Frontend Observability API.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::nullable;

/// An extra label attached to every signal an app sends.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogLabel {
    /// Server-assigned identifier. Legacy; not part of label identity.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub id: i64,
    /// Label name.
    pub label: String,
    /// Label value.
    pub value: String,
}

impl LogLabel {
    /// A label without a server-assigned id.
    pub fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            id: 0,
            label: label.into(),
            value: value.into(),
        }
    }
}

/// A CORS origin allowed to send telemetry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowedOrigin {
    /// Server-assigned identifier.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub id: i64,
    /// The origin URL.
    pub url: String,
}

impl AllowedOrigin {
    /// An origin without a server-assigned id.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            id: 0,
            url: url.into(),
        }
    }
}

/// A Frontend Observability app.
///
/// Decoding removes duplicate CORS origins case-insensitively, keeping the
/// first occurrence with its original casing and order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawApp")]
pub struct App {
    /// App identifier.
    #[serde(skip_serializing_if = "is_zero")]
    pub id: i64,
    /// Display name.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,
    /// Generated app key, appended to the collector URL.
    #[serde(rename = "appKey", skip_serializing_if = "String::is_empty")]
    pub key: String,
    /// Extra labels added to every signal.
    #[serde(rename = "extraLogLabels", skip_serializing_if = "Vec::is_empty")]
    pub extra_log_labels: Vec<LogLabel>,
    /// Allowed CORS origins.
    #[serde(rename = "corsOrigins", skip_serializing_if = "Vec::is_empty")]
    pub cors_allowed_origins: Vec<AllowedOrigin>,
    /// Rate limit for the app.
    #[serde(rename = "allowedRate", skip_serializing_if = "is_zero_u64")]
    pub allowed_rate: u64,
    /// Free-form settings.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub settings: BTreeMap<String, String>,
    /// Collector base URL.
    #[serde(rename = "collectEndpointURL", skip_serializing_if = "String::is_empty")]
    pub collect_endpoint_url: String,
    /// Creation time.
    #[serde(rename = "createdAt", skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    /// Last update time.
    #[serde(rename = "updatedAt", skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    /// Soft-delete tombstone.
    #[serde(rename = "deletedAt", skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
struct RawApp {
    #[serde(default)]
    id: i64,
    #[serde(default, deserialize_with = "nullable")]
    name: String,
    #[serde(rename = "appKey", default, deserialize_with = "nullable")]
    key: String,
    #[serde(rename = "extraLogLabels", default, deserialize_with = "nullable")]
    extra_log_labels: Vec<LogLabel>,
    #[serde(rename = "corsOrigins", default, deserialize_with = "nullable")]
    cors_allowed_origins: Vec<AllowedOrigin>,
    #[serde(rename = "allowedRate", default)]
    allowed_rate: u64,
    #[serde(default, deserialize_with = "nullable")]
    settings: BTreeMap<String, String>,
    #[serde(rename = "collectEndpointURL", default, deserialize_with = "nullable")]
    collect_endpoint_url: String,
    #[serde(rename = "createdAt", default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(rename = "updatedAt", default)]
    updated_at: Option<DateTime<Utc>>,
    #[serde(rename = "deletedAt", default)]
    deleted_at: Option<DateTime<Utc>>,
}

impl From<RawApp> for App {
    fn from(raw: RawApp) -> Self {
        Self {
            id: raw.id,
            name: raw.name,
            key: raw.key,
            extra_log_labels: raw.extra_log_labels,
            cors_allowed_origins: dedup_origins(raw.cors_allowed_origins),
            allowed_rate: raw.allowed_rate,
            settings: raw.settings,
            collect_endpoint_url: raw.collect_endpoint_url,
            created_at: raw.created_at,
            updated_at: raw.updated_at,
            deleted_at: raw.deleted_at,
        }
    }
}

fn dedup_origins(origins: Vec<AllowedOrigin>) -> Vec<AllowedOrigin> {
    let mut seen = HashSet::new();
    origins
        .into_iter()
        .filter(|origin| seen.insert(origin.url.to_lowercase()))
        .collect()
}

/// Compare two label collections as sets of `(label, value)` pairs.
///
/// Order and the legacy `id` field are ignored.
pub fn labels_equivalent(a: &[LogLabel], b: &[LogLabel]) -> bool {
    let pairs = |labels: &[LogLabel]| -> BTreeSet<(String, String)> {
        labels
            .iter()
            .map(|l| (l.label.clone(), l.value.clone()))
            .collect()
    };
    pairs(a) == pairs(b)
}

fn is_zero(v: &i64) -> bool {
    *v == 0
}

fn is_zero_u64(v: &u64) -> bool {
    *v == 0
}
