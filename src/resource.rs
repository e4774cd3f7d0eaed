//! Typed resource and data source traits, and the registry the provider
//! dispatches through.
//!
//! Resources work on a single serde model that is both the configuration and
//! the state. The provider hands them JSON; [`Registry`] parses it into the
//! model, runs [`Resource::validate`] before any network call, and serializes
//! the result back.
//!
//! ```ignore
//! struct LogConfig;
//!
//! #[async_trait]
//! impl Resource for LogConfig {
//!     type Model = LogConfigModel;
//!     const TYPE_NAME: &'static str = "grafana_asserts_log_config";
//!
//!     async fn create(
//!         &self,
//!         ctx: &ResourceContext,
//!         planned: LogConfigModel,
//!     ) -> Result<LogConfigModel, ProviderError> {
//!         // ...
//!     }
//!     // read, update, delete
//! }
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::client::asserts::AssertsClient;
use crate::client::frontend::FrontendO11yClient;
use crate::client::gcom::GcomClient;
use crate::diagnostic::Diagnostic;
use crate::error::ProviderError;
use crate::retry::RetryPolicy;
use crate::types::ProviderMetadata;
use crate::validation::Validator;

/// The API clients built by `configure`. Each is present only when its
/// credentials were configured.
#[derive(Debug, Clone, Default)]
pub struct Clients {
    /// Asserts API client.
    pub asserts: Option<AssertsClient>,
    /// Tenant id for Asserts calls.
    pub asserts_stack_id: i64,
    /// Frontend Observability API client.
    pub frontend_o11y: Option<FrontendO11yClient>,
    /// Grafana Cloud API client.
    pub gcom: Option<GcomClient>,
}

/// Everything a resource operation needs besides its model.
#[derive(Debug, Clone)]
pub struct ResourceContext {
    /// Configured clients.
    pub clients: Arc<Clients>,
    /// Fires when the host stops the provider.
    pub cancel: CancellationToken,
    /// Policy for reads after writes.
    pub retry: RetryPolicy,
}

impl ResourceContext {
    /// Create a context.
    pub fn new(clients: Arc<Clients>, cancel: CancellationToken, retry: RetryPolicy) -> Self {
        Self {
            clients,
            cancel,
            retry,
        }
    }

    /// The Asserts client and tenant id.
    pub fn asserts(&self) -> Result<(&AssertsClient, i64), ProviderError> {
        match &self.clients.asserts {
            Some(client) if self.clients.asserts_stack_id != 0 => {
                Ok((client, self.clients.asserts_stack_id))
            }
            Some(_) => Err(ProviderError::Configuration(
                "stack_id must be set in provider configuration for Asserts resources".to_string(),
            )),
            None => Err(ProviderError::Configuration(
                "the Asserts API client is required for this resource. Set the url and auth provider attributes"
                    .to_string(),
            )),
        }
    }

    /// The Frontend Observability and Grafana Cloud clients.
    pub fn frontend_o11y(&self) -> Result<(&FrontendO11yClient, &GcomClient), ProviderError> {
        match (&self.clients.frontend_o11y, &self.clients.gcom) {
            (Some(frontend), Some(gcom)) => Ok((frontend, gcom)),
            _ => Err(ProviderError::Configuration(
                "the Frontend Observability API client is required for this resource. \
                 Set the cloud_access_policy_token provider attribute"
                    .to_string(),
            )),
        }
    }
}

/// A managed object.
///
/// `read` returns `Ok(None)` when the object no longer exists, which removes
/// it from state. `delete` treats an already deleted object as success.
#[async_trait]
pub trait Resource: Send + Sync + 'static {
    /// Configuration and state of the resource.
    type Model: Serialize + DeserializeOwned + Send + Sync + 'static;

    /// Type name the resource is registered under.
    const TYPE_NAME: &'static str;

    /// Check the model before any network call.
    fn validate(&self, model: &Self::Model, v: &mut Validator) {
        let _ = (model, v);
    }

    /// Create the object.
    async fn create(
        &self,
        ctx: &ResourceContext,
        planned: Self::Model,
    ) -> Result<Self::Model, ProviderError>;

    /// Refresh `current` from the API.
    async fn read(
        &self,
        ctx: &ResourceContext,
        current: Self::Model,
    ) -> Result<Option<Self::Model>, ProviderError>;

    /// Apply `planned` over `prior`.
    async fn update(
        &self,
        ctx: &ResourceContext,
        prior: Self::Model,
        planned: Self::Model,
    ) -> Result<Self::Model, ProviderError>;

    /// Delete the object.
    async fn delete(
        &self,
        ctx: &ResourceContext,
        current: Self::Model,
    ) -> Result<(), ProviderError>;

    /// Build state for an existing object from its import ID.
    async fn import(
        &self,
        ctx: &ResourceContext,
        id: &str,
    ) -> Result<Option<Self::Model>, ProviderError> {
        let _ = (ctx, id);
        Err(ProviderError::Unimplemented(format!(
            "import is not supported for {}",
            Self::TYPE_NAME
        )))
    }

    /// IDs of every existing object of this type.
    async fn list(&self, ctx: &ResourceContext) -> Result<Vec<String>, ProviderError> {
        let _ = ctx;
        Err(ProviderError::Unimplemented(format!(
            "listing is not supported for {}",
            Self::TYPE_NAME
        )))
    }
}

/// A read-only lookup.
#[async_trait]
pub trait DataSource: Send + Sync + 'static {
    /// Lookup arguments and result.
    type Model: Serialize + DeserializeOwned + Send + Sync + 'static;

    /// Type name the data source is registered under.
    const TYPE_NAME: &'static str;

    /// Check the arguments before any network call.
    fn validate(&self, model: &Self::Model, v: &mut Validator) {
        let _ = (model, v);
    }

    /// Fill in the computed fields.
    async fn read(
        &self,
        ctx: &ResourceContext,
        config: Self::Model,
    ) -> Result<Self::Model, ProviderError>;
}

// ============================================================================
// Type erasure
// ============================================================================

#[async_trait]
trait AnyResource: Send + Sync {
    fn validate(&self, config: Value) -> Vec<Diagnostic>;
    async fn create(&self, ctx: &ResourceContext, planned: Value) -> Result<Value, ProviderError>;
    async fn read(
        &self,
        ctx: &ResourceContext,
        current: Value,
    ) -> Result<Option<Value>, ProviderError>;
    async fn update(
        &self,
        ctx: &ResourceContext,
        prior: Value,
        planned: Value,
    ) -> Result<Value, ProviderError>;
    async fn delete(&self, ctx: &ResourceContext, current: Value) -> Result<(), ProviderError>;
    async fn import(&self, ctx: &ResourceContext, id: &str) -> Result<Option<Value>, ProviderError>;
    async fn list(&self, ctx: &ResourceContext) -> Result<Vec<String>, ProviderError>;
}

#[async_trait]
trait AnyDataSource: Send + Sync {
    fn validate(&self, config: Value) -> Vec<Diagnostic>;
    async fn read(&self, ctx: &ResourceContext, config: Value) -> Result<Value, ProviderError>;
}

fn parse<M: DeserializeOwned>(value: Value) -> Result<M, ProviderError> {
    serde_json::from_value(value).map_err(|e| ProviderError::Validation(e.to_string()))
}

fn checked<M, F>(value: Value, validate: F) -> Result<M, ProviderError>
where
    M: DeserializeOwned,
    F: FnOnce(&M, &mut Validator),
{
    let model = parse(value)?;
    let mut v = Validator::new();
    validate(&model, &mut v);
    v.finish()?;
    Ok(model)
}

fn validate_value<M, F>(value: Value, validate: F) -> Vec<Diagnostic>
where
    M: DeserializeOwned,
    F: FnOnce(&M, &mut Validator),
{
    match parse::<M>(value) {
        Ok(model) => {
            let mut v = Validator::new();
            validate(&model, &mut v);
            v.into_diagnostics()
        }
        Err(err) => err.diagnostics(),
    }
}

#[async_trait]
impl<R: Resource> AnyResource for R {
    fn validate(&self, config: Value) -> Vec<Diagnostic> {
        validate_value(config, |m, v| Resource::validate(self, m, v))
    }

    async fn create(&self, ctx: &ResourceContext, planned: Value) -> Result<Value, ProviderError> {
        let planned = checked(planned, |m, v| Resource::validate(self, m, v))?;
        let state = Resource::create(self, ctx, planned).await?;
        Ok(serde_json::to_value(state)?)
    }

    async fn read(
        &self,
        ctx: &ResourceContext,
        current: Value,
    ) -> Result<Option<Value>, ProviderError> {
        let current = parse(current)?;
        match Resource::read(self, ctx, current).await? {
            Some(state) => Ok(Some(serde_json::to_value(state)?)),
            None => {
                tracing::info!(resource_type = R::TYPE_NAME, "object no longer exists, removing from state");
                Ok(None)
            }
        }
    }

    async fn update(
        &self,
        ctx: &ResourceContext,
        prior: Value,
        planned: Value,
    ) -> Result<Value, ProviderError> {
        let prior = parse(prior)?;
        let planned = checked(planned, |m, v| Resource::validate(self, m, v))?;
        let state = Resource::update(self, ctx, prior, planned).await?;
        Ok(serde_json::to_value(state)?)
    }

    async fn delete(&self, ctx: &ResourceContext, current: Value) -> Result<(), ProviderError> {
        Resource::delete(self, ctx, parse(current)?).await
    }

    async fn import(
        &self,
        ctx: &ResourceContext,
        id: &str,
    ) -> Result<Option<Value>, ProviderError> {
        match Resource::import(self, ctx, id).await? {
            Some(state) => Ok(Some(serde_json::to_value(state)?)),
            None => Ok(None),
        }
    }

    async fn list(&self, ctx: &ResourceContext) -> Result<Vec<String>, ProviderError> {
        Resource::list(self, ctx).await
    }
}

#[async_trait]
impl<D: DataSource> AnyDataSource for D {
    fn validate(&self, config: Value) -> Vec<Diagnostic> {
        validate_value(config, |m, v| DataSource::validate(self, m, v))
    }

    async fn read(&self, ctx: &ResourceContext, config: Value) -> Result<Value, ProviderError> {
        let config = checked(config, |m, v| DataSource::validate(self, m, v))?;
        Ok(serde_json::to_value(DataSource::read(self, ctx, config).await?)?)
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Resources and data sources by type name.
#[derive(Default)]
pub struct Registry {
    resources: BTreeMap<&'static str, Box<dyn AnyResource>>,
    data_sources: BTreeMap<&'static str, Box<dyn AnyDataSource>>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("resources", &self.resources.keys().collect::<Vec<_>>())
            .field("data_sources", &self.data_sources.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Registry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a resource under [`Resource::TYPE_NAME`].
    pub fn with_resource<R: Resource>(mut self, resource: R) -> Self {
        self.resources.insert(R::TYPE_NAME, Box::new(resource));
        self
    }

    /// Register a data source under [`DataSource::TYPE_NAME`].
    pub fn with_data_source<D: DataSource>(mut self, data_source: D) -> Self {
        self.data_sources
            .insert(D::TYPE_NAME, Box::new(data_source));
        self
    }

    /// Registered type names.
    pub fn metadata(&self) -> ProviderMetadata {
        ProviderMetadata {
            resources: self.resources.keys().map(|k| k.to_string()).collect(),
            data_sources: self.data_sources.keys().map(|k| k.to_string()).collect(),
        }
    }

    fn resource(&self, resource_type: &str) -> Result<&dyn AnyResource, ProviderError> {
        self.resources
            .get(resource_type)
            .map(|r| r.as_ref())
            .ok_or_else(|| ProviderError::UnknownResource(resource_type.to_string()))
    }

    fn data_source(&self, data_source_type: &str) -> Result<&dyn AnyDataSource, ProviderError> {
        self.data_sources
            .get(data_source_type)
            .map(|d| d.as_ref())
            .ok_or_else(|| ProviderError::UnknownResource(data_source_type.to_string()))
    }

    /// Validate a resource configuration without calling any API.
    pub fn validate_resource(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        Ok(self.resource(resource_type)?.validate(config))
    }

    /// Validate a data source configuration without calling any API.
    pub fn validate_data_source(
        &self,
        data_source_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        Ok(self.data_source(data_source_type)?.validate(config))
    }

    /// Dispatch a create.
    pub async fn create(
        &self,
        ctx: &ResourceContext,
        resource_type: &str,
        planned: Value,
    ) -> Result<Value, ProviderError> {
        self.resource(resource_type)?.create(ctx, planned).await
    }

    /// Dispatch a read.
    pub async fn read(
        &self,
        ctx: &ResourceContext,
        resource_type: &str,
        current: Value,
    ) -> Result<Option<Value>, ProviderError> {
        self.resource(resource_type)?.read(ctx, current).await
    }

    /// Dispatch an update.
    pub async fn update(
        &self,
        ctx: &ResourceContext,
        resource_type: &str,
        prior: Value,
        planned: Value,
    ) -> Result<Value, ProviderError> {
        self.resource(resource_type)?.update(ctx, prior, planned).await
    }

    /// Dispatch a delete.
    pub async fn delete(
        &self,
        ctx: &ResourceContext,
        resource_type: &str,
        current: Value,
    ) -> Result<(), ProviderError> {
        self.resource(resource_type)?.delete(ctx, current).await
    }

    /// Dispatch an import.
    pub async fn import(
        &self,
        ctx: &ResourceContext,
        resource_type: &str,
        id: &str,
    ) -> Result<Option<Value>, ProviderError> {
        self.resource(resource_type)?.import(ctx, id).await
    }

    /// Dispatch a listing.
    pub async fn list(
        &self,
        ctx: &ResourceContext,
        resource_type: &str,
    ) -> Result<Vec<String>, ProviderError> {
        self.resource(resource_type)?.list(ctx).await
    }

    /// Dispatch a data source read.
    pub async fn read_data_source(
        &self,
        ctx: &ResourceContext,
        data_source_type: &str,
        config: Value,
    ) -> Result<Value, ProviderError> {
        self.data_source(data_source_type)?.read(ctx, config).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Serialize, Deserialize)]
    struct Widget {
        name: String,
        #[serde(default)]
        id: Option<String>,
    }

    struct WidgetResource;

    #[async_trait]
    impl Resource for WidgetResource {
        type Model = Widget;
        const TYPE_NAME: &'static str = "test_widget";

        fn validate(&self, model: &Widget, v: &mut Validator) {
            v.require("name", &model.name);
        }

        async fn create(
            &self,
            _ctx: &ResourceContext,
            mut planned: Widget,
        ) -> Result<Widget, ProviderError> {
            planned.id = Some(format!("w-{}", planned.name));
            Ok(planned)
        }

        async fn read(
            &self,
            _ctx: &ResourceContext,
            current: Widget,
        ) -> Result<Option<Widget>, ProviderError> {
            Ok((current.name != "gone").then_some(current))
        }

        async fn update(
            &self,
            _ctx: &ResourceContext,
            prior: Widget,
            mut planned: Widget,
        ) -> Result<Widget, ProviderError> {
            planned.id = prior.id;
            Ok(planned)
        }

        async fn delete(
            &self,
            _ctx: &ResourceContext,
            _current: Widget,
        ) -> Result<(), ProviderError> {
            Ok(())
        }
    }

    fn ctx() -> ResourceContext {
        ResourceContext::new(Arc::default(), CancellationToken::new(), RetryPolicy::default())
    }

    fn registry() -> Registry {
        Registry::new().with_resource(WidgetResource)
    }

    #[tokio::test]
    async fn test_dispatch_create_and_read() {
        let registry = registry();
        let state = registry
            .create(&ctx(), "test_widget", json!({"name": "a"}))
            .await
            .unwrap();
        assert_eq!(state["id"], "w-a");

        let read = registry.read(&ctx(), "test_widget", state).await.unwrap();
        assert!(read.is_some());

        let gone = registry
            .read(&ctx(), "test_widget", json!({"name": "gone", "id": "w-gone"}))
            .await
            .unwrap();
        assert!(gone.is_none());
    }

    #[tokio::test]
    async fn test_create_validates_first() {
        let err = registry()
            .create(&ctx(), "test_widget", json!({"name": ""}))
            .await
            .unwrap_err();
        assert_eq!(err.diagnostics()[0].attribute.as_deref(), Some("name"));
    }

    #[tokio::test]
    async fn test_unknown_type() {
        let err = registry()
            .delete(&ctx(), "test_gadget", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::UnknownResource(name) if name == "test_gadget"));
    }

    #[tokio::test]
    async fn test_import_and_list_default_to_unimplemented() {
        let registry = registry();
        assert!(matches!(
            registry.import(&ctx(), "test_widget", "a").await,
            Err(ProviderError::Unimplemented(_))
        ));
        assert!(matches!(
            registry.list(&ctx(), "test_widget").await,
            Err(ProviderError::Unimplemented(_))
        ));
    }

    #[test]
    fn test_validate_reports_parse_errors() {
        let diags = registry()
            .validate_resource("test_widget", json!({"name": 5}))
            .unwrap();
        assert!(diags[0].is_error());
    }

    #[test]
    fn test_context_requires_asserts_stack_id() {
        let err = ctx().asserts().unwrap_err();
        assert!(err.to_string().contains("url and auth"));
        assert!(ctx().frontend_o11y().is_err());
    }

    #[test]
    fn test_metadata_lists_types() {
        assert_eq!(registry().metadata().resources, vec!["test_widget".to_string()]);
    }
}
