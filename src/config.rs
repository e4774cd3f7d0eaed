//! Provider configuration.
//!
//! The host hands the provider block over as JSON. It is deserialized into a
//! [`ProviderConfig`], unset attributes are filled from `GRAFANA_*`
//! environment variables, and [`ProviderConfig::resolve`] validates the result
//! into [`Settings`] that the API clients are built from.
//!
//! | attribute | environment variable |
//! |-----------|----------------------|
//! | `url` | `GRAFANA_URL` |
//! | `auth` | `GRAFANA_AUTH` |
//! | `stack_id` | `GRAFANA_STACK_ID` |
//! | `cloud_access_policy_token` | `GRAFANA_CLOUD_ACCESS_POLICY_TOKEN` |
//! | `cloud_api_url` | `GRAFANA_CLOUD_API_URL` |
//! | `frontend_o11y_api_access_token` | `GRAFANA_FRONTEND_O11Y_API_ACCESS_TOKEN` |
//! | `frontend_o11y_api_url` | `GRAFANA_FRONTEND_O11Y_API_URL` |
//! | `http_headers` | `GRAFANA_HTTP_HEADERS` (JSON object) |
//! | `retries` | `GRAFANA_RETRIES` |
//! | `retry_wait` | `GRAFANA_RETRY_WAIT` (seconds) |
//! | `retry_status_codes` | `GRAFANA_RETRY_STATUS_CODES` (comma separated) |

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::client::transport::{RetryStatusCodes, DEFAULT_RETRIES};
use crate::diagnostic::Diagnostic;
use crate::validation::Validator;

/// Default Grafana Cloud API URL.
pub const DEFAULT_CLOUD_API_URL: &str = "https://grafana.com";

/// Crate version, sent in the user agent and the version header.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// A credential that never shows up in `Debug` output or logs.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    /// Wrap a credential.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The raw credential.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Whether the credential is blank.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<redacted>")
    }
}

/// The provider block as written by the user.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Root URL of the Grafana instance, used for the Asserts API.
    pub url: Option<String>,
    /// Service account token for the Grafana instance.
    pub auth: Option<Secret>,
    /// Numeric stack id, used as the Asserts tenant.
    pub stack_id: Option<i64>,
    /// Grafana Cloud access policy token.
    pub cloud_access_policy_token: Option<Secret>,
    /// Grafana Cloud API URL.
    pub cloud_api_url: Option<String>,
    /// Token for the Frontend Observability API.
    pub frontend_o11y_api_access_token: Option<Secret>,
    /// Fixed Frontend Observability API URL, bypassing region resolution.
    pub frontend_o11y_api_url: Option<String>,
    /// Extra headers sent with every request.
    pub http_headers: Option<BTreeMap<String, String>>,
    /// Transport-level retries.
    pub retries: Option<u32>,
    /// Fixed wait between transport retries, in seconds.
    pub retry_wait: Option<u64>,
    /// Statuses retried by the transport, e.g. `429`, `5xx`.
    pub retry_status_codes: Option<Vec<String>>,
    /// User agent override.
    pub user_agent: Option<String>,
}

/// Asserts API settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssertsSettings {
    /// Grafana instance URL.
    pub url: String,
    /// Grafana service account token.
    pub auth: Secret,
    /// Tenant id; zero when not configured.
    pub stack_id: i64,
}

/// Grafana Cloud API settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudSettings {
    /// API URL, e.g. `https://grafana.com`.
    pub api_url: String,
    /// Access policy token.
    pub token: Secret,
}

/// Frontend Observability API settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrontendO11ySettings {
    /// Host the regional endpoints live under, e.g. `grafana.net`.
    pub api_host: String,
    /// API token.
    pub token: Secret,
    /// Manual endpoint override.
    pub api_url: Option<String>,
}

/// Validated configuration the API clients are built from.
#[derive(Debug, Clone)]
pub struct Settings {
    /// User agent for every request.
    pub user_agent: String,
    /// Headers sent with every request, before the auth headers.
    pub default_headers: Vec<(String, String)>,
    /// Transport-level retries.
    pub retries: u32,
    /// Fixed wait between transport retries.
    pub retry_wait: Option<Duration>,
    /// Statuses retried by the transport.
    pub retry_status_codes: RetryStatusCodes,
    /// Present when `url` and `auth` are set.
    pub asserts: Option<AssertsSettings>,
    /// Present when a cloud access policy token is set.
    pub cloud: Option<CloudSettings>,
    /// Present when a Frontend Observability token is available.
    pub frontend_o11y: Option<FrontendO11ySettings>,
    /// Non-fatal problems found while resolving.
    pub warnings: Vec<Diagnostic>,
}

impl ProviderConfig {
    /// Parse the provider block. `null` is an empty block.
    pub fn from_value(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        if value.is_null() {
            return Ok(Self::default());
        }
        serde_json::from_value(value)
    }

    /// Fill unset attributes from the environment.
    ///
    /// Empty variables count as unset. Malformed values are reported as
    /// diagnostics on the attribute they would have set.
    pub fn apply_env<F>(&mut self, lookup: F) -> Vec<Diagnostic>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.is_empty());
        let mut v = Validator::new();

        fill(&mut self.url, || get("GRAFANA_URL"));
        fill(&mut self.auth, || get("GRAFANA_AUTH").map(Secret));
        fill(&mut self.cloud_access_policy_token, || {
            get("GRAFANA_CLOUD_ACCESS_POLICY_TOKEN").map(Secret)
        });
        fill(&mut self.cloud_api_url, || get("GRAFANA_CLOUD_API_URL"));
        fill(&mut self.frontend_o11y_api_access_token, || {
            get("GRAFANA_FRONTEND_O11Y_API_ACCESS_TOKEN").map(Secret)
        });
        fill(&mut self.frontend_o11y_api_url, || get("GRAFANA_FRONTEND_O11Y_API_URL"));

        if self.stack_id.is_none() {
            if let Some(raw) = get("GRAFANA_STACK_ID") {
                match raw.parse() {
                    Ok(id) => self.stack_id = Some(id),
                    Err(err) => {
                        v.error("stack_id", format!("invalid GRAFANA_STACK_ID {:?}: {}", raw, err))
                    }
                }
            }
        }
        if self.retries.is_none() {
            if let Some(raw) = get("GRAFANA_RETRIES") {
                match raw.parse() {
                    Ok(n) => self.retries = Some(n),
                    Err(err) => {
                        v.error("retries", format!("invalid GRAFANA_RETRIES {:?}: {}", raw, err))
                    }
                }
            }
        }
        if self.retry_wait.is_none() {
            if let Some(raw) = get("GRAFANA_RETRY_WAIT") {
                match raw.parse() {
                    Ok(n) => self.retry_wait = Some(n),
                    Err(err) => v.error(
                        "retry_wait",
                        format!("invalid GRAFANA_RETRY_WAIT {:?}: {}", raw, err),
                    ),
                }
            }
        }
        if self.retry_status_codes.is_none() {
            if let Some(raw) = get("GRAFANA_RETRY_STATUS_CODES") {
                self.retry_status_codes = Some(
                    raw.split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(String::from)
                        .collect(),
                );
            }
        }
        if self.http_headers.is_none() {
            if let Some(raw) = get("GRAFANA_HTTP_HEADERS") {
                match serde_json::from_str(&raw) {
                    Ok(headers) => self.http_headers = Some(headers),
                    Err(err) => v.error(
                        "http_headers",
                        format!("invalid JSON in GRAFANA_HTTP_HEADERS: {}", err),
                    ),
                }
            }
        }

        v.into_diagnostics()
    }

    /// Validate and derive client settings.
    pub fn resolve(self) -> Result<Settings, Vec<Diagnostic>> {
        let mut v = Validator::new();

        let url = self.url.filter(|u| !u.is_empty());
        if let Some(url) = &url {
            v.http_url("url", url);
        }
        if let Some(stack_id) = self.stack_id {
            if stack_id < 0 {
                v.error("stack_id", format!("stack_id must not be negative, got {}", stack_id));
            }
        }

        let cloud_api_url = self
            .cloud_api_url
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| DEFAULT_CLOUD_API_URL.to_string());
        let api_host = match cloud_api_host(&cloud_api_url) {
            Ok(host) => Some(host),
            Err(err) => {
                v.error("cloud_api_url", err);
                None
            }
        };
        if let Some(override_url) = &self.frontend_o11y_api_url {
            v.http_url("frontend_o11y_api_url", override_url);
        }

        let retry_status_codes = match &self.retry_status_codes {
            Some(codes) => match RetryStatusCodes::parse(codes) {
                Ok(codes) => codes,
                Err(err) => {
                    v.error("retry_status_codes", err.message().to_string());
                    RetryStatusCodes::default()
                }
            },
            None => RetryStatusCodes::default(),
        };

        let auth = self.auth.filter(|s| !s.is_empty());
        if url.is_some() != auth.is_some() {
            v.warning(
                if url.is_some() { "auth" } else { "url" },
                "both url and auth must be set to manage Asserts resources",
            );
        }

        if v.has_errors() {
            return Err(v.into_diagnostics());
        }

        let mut default_headers = vec![
            ("Grafana-Terraform-Provider".to_string(), "true".to_string()),
            ("Grafana-Terraform-Provider-Version".to_string(), VERSION.to_string()),
        ];
        default_headers.extend(self.http_headers.unwrap_or_default());

        let asserts = match (url, auth) {
            (Some(url), Some(auth)) => Some(AssertsSettings {
                url,
                auth,
                stack_id: self.stack_id.unwrap_or_default(),
            }),
            _ => None,
        };

        let cloud_token = self.cloud_access_policy_token.filter(|s| !s.is_empty());
        let frontend_token = self
            .frontend_o11y_api_access_token
            .filter(|s| !s.is_empty())
            .or_else(|| cloud_token.clone());
        let frontend_o11y = match (frontend_token, api_host) {
            (Some(token), Some(api_host)) => Some(FrontendO11ySettings {
                api_host,
                token,
                api_url: self.frontend_o11y_api_url.filter(|u| !u.is_empty()),
            }),
            _ => None,
        };
        let cloud = cloud_token.map(|token| CloudSettings {
            api_url: cloud_api_url,
            token,
        });

        let settings = Settings {
            user_agent: self
                .user_agent
                .unwrap_or_else(|| format!("grafana-cloud-provider/{}", VERSION)),
            default_headers,
            retries: self.retries.unwrap_or(DEFAULT_RETRIES),
            retry_wait: self
                .retry_wait
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
            retry_status_codes,
            asserts,
            cloud,
            frontend_o11y,
            warnings: v.into_diagnostics(),
        };
        tracing::debug!(
            asserts = settings.asserts.is_some(),
            cloud = settings.cloud.is_some(),
            frontend_o11y = settings.frontend_o11y.is_some(),
            retries = settings.retries,
            "resolved provider settings"
        );
        Ok(settings)
    }
}

fn fill<T>(slot: &mut Option<T>, from_env: impl FnOnce() -> Option<T>) {
    if slot.is_none() {
        *slot = from_env();
    }
}

/// Derive the Frontend Observability host from the Grafana Cloud API URL.
///
/// `https://grafana.com` becomes `grafana.net`: the second-to-last host label
/// with a `.net` suffix.
pub fn cloud_api_host(cloud_api_url: &str) -> Result<String, String> {
    let url = Url::parse(cloud_api_url).map_err(|_| "invalid cloud url".to_string())?;
    let host = url.host_str().ok_or_else(|| "invalid cloud url".to_string())?;
    let labels: Vec<&str> = host.split('.').collect();
    if labels.len() < 2 {
        return Err("invalid cloud url".to_string());
    }
    Ok(format!("{}.net", labels[labels.len() - 2]))
}
