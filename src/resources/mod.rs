//! Resource and data source implementations.
//!
//! Every Asserts resource follows the same shape: validate the model, write
//! through the Asserts client, then read back with the retry-read wrapper
//! because the API is eventually consistent.

mod custom_model_rules;
mod disabled_alert_config;
mod drilldown;
mod frontend_app;
mod log_config;
mod log_drilldown_config;
mod profile_config;
mod prom_rules;
mod stack;
mod threshold_rules;
mod trace_config;

pub use custom_model_rules::{CustomModelRules, CustomModelRulesModel};
pub use disabled_alert_config::{DisabledAlertConfig, DisabledAlertConfigModel};
pub use drilldown::MatchRuleModel;
pub use frontend_app::{FrontendO11yApp, FrontendO11yAppDataSource, FrontendO11yAppModel};
pub use log_config::{LogConfig, LogConfigModel};
pub use log_drilldown_config::{LogDrilldownConfig, LogDrilldownConfigModel};
pub use profile_config::{ProfileConfig, ProfileConfigModel};
pub use prom_rules::{PromRuleFile, PromRuleFileModel, RuleGroupModel, RuleModel};
pub use stack::{AssertsStack, AssertsStackModel};
pub use threshold_rules::{ThresholdRules, ThresholdRulesModel};
pub use trace_config::{TraceConfig, TraceConfigModel};

use tracing::warn;

use crate::error::{ProviderError, RequestError};
use crate::resource::Registry;
use crate::retry::{ReadFailure, RetryReadError};

/// Register every resource and data source of this provider.
pub fn register_all(registry: Registry) -> Registry {
    registry
        .with_resource(FrontendO11yApp)
        .with_data_source(FrontendO11yAppDataSource)
        .with_resource(PromRuleFile)
        .with_resource(CustomModelRules)
        .with_resource(ThresholdRules)
        .with_resource(DisabledAlertConfig)
        .with_resource(LogConfig)
        .with_resource(TraceConfig)
        .with_resource(ProfileConfig)
        .with_resource(LogDrilldownConfig)
        .with_resource(AssertsStack)
}

/// Outcome of a retried read: `None` when the object does not exist.
pub(crate) fn read_outcome<T>(
    resource_type: &str,
    name: &str,
    result: Result<T, RetryReadError<ReadFailure>>,
) -> Result<Option<T>, ProviderError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(err) if err.is_not_found() => {
            warn!(resource_type, name, error = %err, "object not found");
            Ok(None)
        }
        Err(RetryReadError::Cancelled { attempts }) => Err(ProviderError::Cancelled(format!(
            "read of {} {} cancelled after {} attempt(s)",
            resource_type, name, attempts
        ))),
        Err(err @ RetryReadError::Timeout { .. }) => {
            Err(ProviderError::DeadlineExceeded(err.to_string()))
        }
        Err(RetryReadError::Terminal(err)) => {
            Err(ProviderError::api(format!("failed to read {}", resource_type), err))
        }
    }
}

/// A freshly written object must be readable.
pub(crate) fn written<T>(
    resource_type: &str,
    name: &str,
    state: Option<T>,
) -> Result<T, ProviderError> {
    state.ok_or_else(|| {
        ProviderError::NotFound(format!(
            "{} {:?} was written but could not be read back",
            resource_type, name
        ))
    })
}

/// Treat a 404 on delete as success.
pub(crate) fn ignore_not_found(result: Result<(), RequestError>) -> Result<(), RequestError> {
    match result {
        Err(err) if err.is_not_found() => Ok(()),
        other => other,
    }
}

/// Map a failed wait-until-visible into a provider error.
pub(crate) fn visibility_failed(summary: &str, err: RetryReadError<ReadFailure>) -> ProviderError {
    match err {
        RetryReadError::Cancelled { .. } => {
            ProviderError::Cancelled(format!("{}: {}", summary, err))
        }
        err => ProviderError::api(summary, err),
    }
}

/// Empty strings and absent values are the same in state.
pub(crate) fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

fn default_true() -> bool {
    true
}
