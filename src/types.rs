//! Shared provider types: composite resource IDs, import results and metadata.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ProviderError;

const DEFAULT_SEPARATOR: &str = ":";

/// How an ID field is parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdFieldType {
    /// A base-10 `i64`.
    Int,
    /// Any string.
    String,
}

/// One named part of a composite ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdField {
    /// Field name, used in error messages and import examples.
    pub name: &'static str,
    /// Field type.
    pub kind: IdFieldType,
}

impl IdField {
    /// A string field.
    pub const fn string(name: &'static str) -> Self {
        Self {
            name,
            kind: IdFieldType::String,
        }
    }

    /// An integer field.
    pub const fn int(name: &'static str) -> Self {
        Self {
            name,
            kind: IdFieldType::Int,
        }
    }
}

/// A parsed ID part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdPart {
    /// Value of an [`IdFieldType::Int`] field.
    Int(i64),
    /// Value of an [`IdFieldType::String`] field.
    Str(String),
}

impl IdPart {
    /// The integer value, if this is an int part.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            Self::Str(_) => None,
        }
    }

    /// The string value, if this is a string part.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(v) => Some(v),
            Self::Int(_) => None,
        }
    }
}

impl fmt::Display for IdPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{}", v),
            Self::Str(v) => f.write_str(v),
        }
    }
}

impl From<i64> for IdPart {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<&str> for IdPart {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for IdPart {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

/// Layout of a resource's composite ID, e.g. `stack_id:name`.
///
/// IDs are written with `:`. Resources that historically used another
/// separator accept it as a legacy separator when parsing.
///
/// ```
/// use grafana_cloud_provider::types::{IdField, IdPart, ResourceId};
///
/// let id = ResourceId::new(
///     "grafana_frontend_o11y_app",
///     &[IdField::string("stack_slug"), IdField::int("app_id")],
/// );
/// let parts = id.split("mystack:42").unwrap();
/// assert_eq!(parts[1], IdPart::Int(42));
/// assert_eq!(id.make(&parts).unwrap(), "mystack:42");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceId {
    resource_name: &'static str,
    separators: Vec<&'static str>,
    fields: Vec<IdField>,
}

impl ResourceId {
    /// An ID using the default `:` separator.
    pub fn new(resource_name: &'static str, fields: &[IdField]) -> Self {
        Self {
            resource_name,
            separators: vec![DEFAULT_SEPARATOR],
            fields: fields.to_vec(),
        }
    }

    /// An ID that also accepts `legacy` when parsing.
    pub fn with_legacy_separator(
        resource_name: &'static str,
        legacy: &'static str,
        fields: &[IdField],
    ) -> Self {
        Self {
            resource_name,
            separators: vec![DEFAULT_SEPARATOR, legacy],
            fields: fields.to_vec(),
        }
    }

    /// The resource type this ID belongs to.
    pub fn resource_name(&self) -> &'static str {
        self.resource_name
    }

    /// An import command example for documentation.
    pub fn example(&self) -> String {
        let fields: Vec<String> = self
            .fields
            .iter()
            .map(|f| format!("{{{{ {} }}}}", f.name))
            .collect();
        format!(
            "terraform import {}.name {:?}\n",
            self.resource_name,
            fields.join(DEFAULT_SEPARATOR)
        )
    }

    /// Join typed parts into an ID string.
    pub fn make(&self, parts: &[IdPart]) -> Result<String, ProviderError> {
        if parts.len() != self.fields.len() {
            return Err(ProviderError::Internal(format!(
                "expected {} fields, got {}",
                self.fields.len(),
                parts.len()
            )));
        }
        for (part, field) in parts.iter().zip(&self.fields) {
            let matches = matches!(
                (part, field.kind),
                (IdPart::Int(_), IdFieldType::Int) | (IdPart::Str(_), IdFieldType::String)
            );
            if !matches {
                return Err(ProviderError::Internal(format!(
                    "unexpected value type for field {:?}",
                    field.name
                )));
            }
        }
        let parts: Vec<String> = parts.iter().map(IdPart::to_string).collect();
        Ok(parts.join(DEFAULT_SEPARATOR))
    }

    /// Parse an ID string into typed parts.
    pub fn split(&self, id: &str) -> Result<Vec<IdPart>, ProviderError> {
        for separator in &self.separators {
            let raw: Vec<&str> = id.split(separator).collect();
            if raw.len() != self.fields.len() {
                continue;
            }
            return raw
                .into_iter()
                .zip(&self.fields)
                .map(|(part, field)| match field.kind {
                    IdFieldType::Int => part.parse().map(IdPart::Int).map_err(|_| {
                        ProviderError::Validation(format!(
                            "expected int for field {:?}, got {:?}",
                            field.name, part
                        ))
                    }),
                    IdFieldType::String => Ok(IdPart::Str(part.to_string())),
                })
                .collect();
        }

        let names: Vec<&str> = self.fields.iter().map(|f| f.name).collect();
        Err(ProviderError::Validation(format!(
            "id {:?} does not match expected format. Should be in the format: {}",
            id,
            names.join(DEFAULT_SEPARATOR)
        )))
    }

    /// Parse a single-field ID.
    pub fn single(&self, id: &str) -> Result<IdPart, ProviderError> {
        self.split(id)?
            .into_iter()
            .next()
            .ok_or_else(|| {
                ProviderError::Internal(format!("{} has no ID fields", self.resource_name))
            })
    }
}

/// An imported resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportedResource {
    /// The resource type.
    pub resource_type: String,
    /// The imported state.
    pub state: serde_json::Value,
}

impl ImportedResource {
    /// Create a new imported resource.
    pub fn new(resource_type: impl Into<String>, state: serde_json::Value) -> Self {
        Self {
            resource_type: resource_type.into(),
            state,
        }
    }
}

/// The resource and data source types a provider serves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ProviderMetadata {
    /// List of resource type names.
    pub resources: Vec<String>,
    /// List of data source type names.
    pub data_sources: Vec<String>,
}
