//! Grafana Cloud Provider
//!
//! Resource layer of an infrastructure-as-code provider for Grafana Cloud.
//! It manages Frontend Observability apps and Asserts configuration objects
//! as declarative resources over JSON state.
//!
//! # Overview
//!
//! The crate provides:
//!
//! - **API clients**: Frontend Observability, Asserts and Grafana Cloud (GCom)
//!   over a shared, retrying HTTP transport
//! - **Endpoint resolution**: the regional Frontend Observability base URL for a stack
//! - **Retry-read wrapper**: polling reads after writes against eventually consistent APIs
//! - **Resources**: typed create/read/update/delete/import per object type
//! - **ProviderService trait**: the host-facing API, implemented by [`GrafanaProvider`]
//! - **Error types**: sentinel-bearing HTTP errors and user-facing diagnostics
//! - **Logging**: Integration with `tracing` for structured logging
//!
//! # Quick Start
//!
//! ```ignore
//! use grafana_cloud_provider::{init_logging, GrafanaProvider, ProviderService};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     init_logging();
//!
//!     let provider = GrafanaProvider::new();
//!     let diagnostics = provider
//!         .configure(json!({
//!             "url": "https://mystack.grafana.net",
//!             "auth": "glsa_...",
//!             "stack_id": 1234,
//!         }))
//!         .await?;
//!     assert!(diagnostics.is_empty());
//!
//!     let state = provider
//!         .create(
//!             "grafana_asserts_log_config",
//!             json!({
//!                 "name": "checkout",
//!                 "default_config": false,
//!                 "data_source_uid": "loki-uid",
//!             }),
//!         )
//!         .await?;
//!     tracing::info!(%state, "created");
//!     Ok(())
//! }
//! ```
//!
//! # Resource Types
//!
//! - `grafana_frontend_o11y_app` (resource and data source)
//! - `grafana_asserts_prom_rule_file`
//! - `grafana_asserts_custom_model_rules`
//! - `grafana_asserts_threshold_rules`
//! - `grafana_asserts_suppressed_assertions_config`
//! - `grafana_asserts_log_config`, `grafana_asserts_trace_config`,
//!   `grafana_asserts_profile_config`
//! - `grafana_asserts_log_drilldown_config`
//! - `grafana_asserts_stack`

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod config;
pub mod diagnostic;
pub mod error;
pub mod logging;
pub mod models;
pub mod provider;
pub mod resource;
pub mod resources;
pub mod retry;
pub mod testing;
pub mod types;
pub mod validation;

// Re-export main types at crate root
pub use config::{ProviderConfig, Secret};
pub use diagnostic::{Diagnostic, DiagnosticSeverity};
pub use error::{ApiError, ProviderError, RequestError, TransportError};
pub use logging::{init_logging, init_logging_with_default, try_init_logging};
pub use provider::{GrafanaProvider, ProviderService};
pub use resource::{DataSource, Registry, Resource, ResourceContext};
pub use retry::{with_retry_read, RetryPolicy, RetryReadError};
pub use types::{ImportedResource, ProviderMetadata, ResourceId};
pub use validation::Validator;

// Re-export async_trait for convenience
pub use async_trait::async_trait;

// Re-export commonly used external types
pub use serde_json;
pub use tracing;
