//! The provider service.
//!
//! [`ProviderService`] is the host-facing API: every call carries a type name
//! and JSON state. [`GrafanaProvider`] implements it by building the API
//! clients in `configure` and dispatching to the registered resources.

use std::sync::Arc;

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::client::asserts::AssertsClient;
use crate::client::endpoint::EndpointResolver;
use crate::client::frontend::FrontendO11yClient;
use crate::client::gcom::GcomClient;
use crate::client::transport::{HttpTransport, ReqwestTransport, RetryingTransport, DEFAULT_TIMEOUT};
use crate::client::RestClient;
use crate::config::{ProviderConfig, Settings};
use crate::diagnostic::{has_errors, Diagnostic};
use crate::error::ProviderError;
use crate::resource::{Clients, Registry, ResourceContext};
use crate::resources;
use crate::retry::RetryPolicy;
use crate::types::{ImportedResource, ProviderMetadata};

/// Host-facing provider operations over JSON state.
///
/// # Example
///
/// ```ignore
/// use grafana_cloud_provider::{GrafanaProvider, ProviderService};
/// use serde_json::json;
///
/// let provider = GrafanaProvider::new();
/// let diagnostics = provider.configure(json!({"cloud_access_policy_token": "glc_..."})).await?;
/// let state = provider.read_data_source("grafana_frontend_o11y_app", json!({
///     "stack_id": 42,
///     "name": "web",
/// })).await?;
/// ```
#[async_trait::async_trait]
pub trait ProviderService: Send + Sync + 'static {
    // =========================================================================
    // Metadata
    // =========================================================================

    /// Resource and data source type names.
    fn metadata(&self) -> ProviderMetadata;

    // =========================================================================
    // Provider Lifecycle
    // =========================================================================

    /// Validate the provider configuration without building clients.
    async fn validate_provider_config(
        &self,
        config: serde_json::Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        let _ = config;
        Ok(vec![])
    }

    /// Configure the provider with credentials and settings.
    /// Returns diagnostics (errors and warnings).
    async fn configure(&self, config: serde_json::Value) -> Result<Vec<Diagnostic>, ProviderError>;

    /// Stop the provider. In-flight retry loops end with a cancellation error.
    async fn stop(&self) -> Result<(), ProviderError> {
        Ok(())
    }

    // =========================================================================
    // Resource Operations
    // =========================================================================

    /// Validate a resource's configuration.
    async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: serde_json::Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        let _ = (resource_type, config);
        Ok(vec![])
    }

    /// Create a new resource.
    async fn create(
        &self,
        resource_type: &str,
        planned_state: serde_json::Value,
    ) -> Result<serde_json::Value, ProviderError>;

    /// Read the current state of a resource. `None` means it no longer exists.
    async fn read(
        &self,
        resource_type: &str,
        current_state: serde_json::Value,
    ) -> Result<Option<serde_json::Value>, ProviderError>;

    /// Update an existing resource.
    async fn update(
        &self,
        resource_type: &str,
        prior_state: serde_json::Value,
        planned_state: serde_json::Value,
    ) -> Result<serde_json::Value, ProviderError>;

    /// Delete a resource.
    async fn delete(
        &self,
        resource_type: &str,
        current_state: serde_json::Value,
    ) -> Result<(), ProviderError>;

    /// Import existing infrastructure into management.
    async fn import_resource(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError> {
        let _ = id;
        Err(ProviderError::Unimplemented(format!(
            "import is not supported for {}",
            resource_type
        )))
    }

    /// IDs of every existing object of a resource type.
    async fn list_resources(&self, resource_type: &str) -> Result<Vec<String>, ProviderError> {
        Err(ProviderError::Unimplemented(format!(
            "listing is not supported for {}",
            resource_type
        )))
    }

    // =========================================================================
    // Data Source Operations
    // =========================================================================

    /// Validate a data source's configuration.
    async fn validate_data_source_config(
        &self,
        data_source_type: &str,
        config: serde_json::Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        let _ = (data_source_type, config);
        Ok(vec![])
    }

    /// Read data from an external source.
    async fn read_data_source(
        &self,
        data_source_type: &str,
        config: serde_json::Value,
    ) -> Result<serde_json::Value, ProviderError>;
}

type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// The Grafana Cloud provider.
pub struct GrafanaProvider {
    registry: Registry,
    clients: RwLock<Option<Arc<Clients>>>,
    cancel: CancellationToken,
    retry: RetryPolicy,
    env: EnvLookup,
    transport: Option<Arc<dyn HttpTransport>>,
}

impl std::fmt::Debug for GrafanaProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GrafanaProvider")
            .field("registry", &self.registry)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl Default for GrafanaProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl GrafanaProvider {
    /// A provider serving every resource, reading the process environment.
    pub fn new() -> Self {
        Self {
            registry: resources::register_all(Registry::new()),
            clients: RwLock::new(None),
            cancel: CancellationToken::new(),
            retry: RetryPolicy::default(),
            env: Arc::new(|name| std::env::var(name).ok()),
            transport: None,
        }
    }

    /// Send every request through `transport` instead of the built-in
    /// reqwest client and its retry layer.
    pub fn with_transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Resolve environment fallbacks through `lookup`.
    pub fn with_env<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.env = Arc::new(lookup);
        self
    }

    /// Use `retry` for reads after writes.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn parse_config(
        &self,
        config: serde_json::Value,
    ) -> Result<(Settings, Vec<Diagnostic>), Vec<Diagnostic>> {
        let mut config = ProviderConfig::from_value(config)
            .map_err(|e| {
                vec![Diagnostic::error("invalid provider configuration").with_detail(e.to_string())]
            })?;
        let mut diagnostics = config.apply_env(|name| (self.env)(name));
        if has_errors(&diagnostics) {
            return Err(diagnostics);
        }
        let mut settings = match config.resolve() {
            Ok(settings) => settings,
            Err(mut errors) => {
                diagnostics.append(&mut errors);
                return Err(diagnostics);
            }
        };
        diagnostics.append(&mut settings.warnings);
        Ok((settings, diagnostics))
    }

    fn build_transport(
        &self,
        settings: &Settings,
    ) -> Result<Arc<dyn HttpTransport>, ProviderError> {
        if let Some(transport) = &self.transport {
            return Ok(Arc::clone(transport));
        }
        let inner = ReqwestTransport::new(DEFAULT_TIMEOUT)
            .map_err(|e| {
                ProviderError::Configuration(format!("failed to build HTTP client: {}", e))
            })?;
        let mut transport = RetryingTransport::new(inner)
            .with_max_retries(settings.retries)
            .with_status_codes(settings.retry_status_codes.clone());
        if let Some(wait) = settings.retry_wait {
            transport = transport.with_fixed_wait(wait);
        }
        Ok(Arc::new(transport))
    }

    fn build_clients(&self, settings: &Settings) -> Result<Clients, ProviderError> {
        let rest = RestClient::new(
            self.build_transport(settings)?,
            settings.user_agent.clone(),
            settings.default_headers.clone(),
        );

        let mut clients = Clients::default();
        if let Some(asserts) = &settings.asserts {
            clients.asserts = Some(AssertsClient::new(
                rest.clone(),
                &asserts.url,
                asserts.auth.expose(),
            ));
            clients.asserts_stack_id = asserts.stack_id;
        }
        if let Some(cloud) = &settings.cloud {
            clients.gcom = Some(GcomClient::new(
                rest.clone(),
                cloud.api_url.clone(),
                cloud.token.expose(),
            ));
        }
        if let Some(frontend) = &settings.frontend_o11y {
            let resolver = EndpointResolver::new(frontend.api_host.clone())
                .with_override(frontend.api_url.clone());
            clients.frontend_o11y = Some(FrontendO11yClient::new(
                rest,
                resolver,
                frontend.token.expose(),
            ));
        }
        Ok(clients)
    }

    async fn context(&self) -> Result<ResourceContext, ProviderError> {
        let clients = self.clients.read().await;
        let clients = clients
            .as_ref()
            .ok_or_else(|| ProviderError::Configuration("provider is not configured".to_string()))?;
        Ok(ResourceContext::new(Arc::clone(clients), self.cancel.clone(), self.retry))
    }
}

#[async_trait::async_trait]
impl ProviderService for GrafanaProvider {
    fn metadata(&self) -> ProviderMetadata {
        self.registry.metadata()
    }

    async fn validate_provider_config(
        &self,
        config: serde_json::Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        match self.parse_config(config) {
            Ok((_, diagnostics)) => Ok(diagnostics),
            Err(diagnostics) => Ok(diagnostics),
        }
    }

    #[instrument(skip_all)]
    async fn configure(&self, config: serde_json::Value) -> Result<Vec<Diagnostic>, ProviderError> {
        let (settings, diagnostics) = match self.parse_config(config) {
            Ok(parsed) => parsed,
            Err(diagnostics) => {
                warn!(errors = diagnostics.len(), "provider configuration rejected");
                return Ok(diagnostics);
            }
        };
        let clients = self.build_clients(&settings)?;
        info!(
            asserts = clients.asserts.is_some(),
            frontend_o11y = clients.frontend_o11y.is_some(),
            "provider configured"
        );
        *self.clients.write().await = Some(Arc::new(clients));
        Ok(diagnostics)
    }

    async fn stop(&self) -> Result<(), ProviderError> {
        debug!("stopping provider");
        self.cancel.cancel();
        Ok(())
    }

    async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: serde_json::Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        self.registry.validate_resource(resource_type, config)
    }

    #[instrument(skip(self, planned_state))]
    async fn create(
        &self,
        resource_type: &str,
        planned_state: serde_json::Value,
    ) -> Result<serde_json::Value, ProviderError> {
        let ctx = self.context().await?;
        self.registry.create(&ctx, resource_type, planned_state).await
    }

    #[instrument(skip(self, current_state))]
    async fn read(
        &self,
        resource_type: &str,
        current_state: serde_json::Value,
    ) -> Result<Option<serde_json::Value>, ProviderError> {
        let ctx = self.context().await?;
        self.registry.read(&ctx, resource_type, current_state).await
    }

    #[instrument(skip(self, prior_state, planned_state))]
    async fn update(
        &self,
        resource_type: &str,
        prior_state: serde_json::Value,
        planned_state: serde_json::Value,
    ) -> Result<serde_json::Value, ProviderError> {
        let ctx = self.context().await?;
        self.registry.update(&ctx, resource_type, prior_state, planned_state).await
    }

    #[instrument(skip(self, current_state))]
    async fn delete(
        &self,
        resource_type: &str,
        current_state: serde_json::Value,
    ) -> Result<(), ProviderError> {
        let ctx = self.context().await?;
        self.registry.delete(&ctx, resource_type, current_state).await
    }

    #[instrument(skip(self))]
    async fn import_resource(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError> {
        let ctx = self.context().await?;
        let imported = self.registry.import(&ctx, resource_type, id).await?;
        Ok(imported
            .into_iter()
            .map(|state| ImportedResource::new(resource_type, state))
            .collect())
    }

    async fn list_resources(&self, resource_type: &str) -> Result<Vec<String>, ProviderError> {
        let ctx = self.context().await?;
        self.registry.list(&ctx, resource_type).await
    }

    async fn validate_data_source_config(
        &self,
        data_source_type: &str,
        config: serde_json::Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        self.registry.validate_data_source(data_source_type, config)
    }

    #[instrument(skip(self, config))]
    async fn read_data_source(
        &self,
        data_source_type: &str,
        config: serde_json::Value,
    ) -> Result<serde_json::Value, ProviderError> {
        let ctx = self.context().await?;
        self.registry.read_data_source(&ctx, data_source_type, config).await
    }
}
