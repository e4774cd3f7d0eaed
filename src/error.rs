//! Error types for the Grafana Cloud provider.
//!
//! Errors are layered the same way the provider is: transport failures
//! ([`TransportError`]) are classified by the request pipeline into an
//! [`ApiError`] kind, the API clients attach operation context with a
//! [`RequestError`], and resources surface everything as a [`ProviderError`]
//! that converts into user-facing [`Diagnostic`]s.
//!
//! The sentinel kinds ([`ApiError::NotFound`], [`ApiError::Unauthorized`])
//! stay reachable through every layer, so callers can branch on them without
//! parsing messages:
//!
//! ```
//! use grafana_cloud_provider::error::{ApiError, ProviderError, RequestError};
//!
//! let err = RequestError::new("failed to get faro app", ApiError::NotFound);
//! assert_eq!(err.to_string(), "failed to get faro app: not found");
//!
//! let err = ProviderError::api("failed to get frontend o11y app", err);
//! assert!(err.is_not_found());
//! ```

use std::error::Error as StdError;
use std::fmt;

use thiserror::Error;

use crate::diagnostic::Diagnostic;

/// A failure below HTTP semantics: connection, TLS, timeout or body read.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct TransportError(pub String);

impl TransportError {
    /// Create a transport error from any displayable cause.
    pub fn new(message: impl fmt::Display) -> Self {
        Self(message.to_string())
    }
}

/// Outcome classification of a single API request.
#[derive(Debug, Error)]
pub enum ApiError {
    /// HTTP 404.
    #[error("not found")]
    NotFound,

    /// HTTP 401. Never retried; it indicates a configuration error.
    #[error("request not authorized for stack")]
    Unauthorized,

    /// Any other HTTP status >= 400.
    #[error("status: {status}")]
    Status {
        /// The HTTP status code.
        status: u16,
        /// The raw response body, kept for error reporting.
        body: String,
    },

    /// The base URL could not be parsed or extended with the request path.
    #[error("failed to parse {api} url: {source}")]
    InvalidUrl {
        /// Name of the API whose URL was rejected.
        api: &'static str,
        /// The underlying parse error.
        #[source]
        source: url::ParseError,
    },

    /// The request body could not be serialized.
    #[error("failed to marshal request body: {0}")]
    Encode(#[source] serde_json::Error),

    /// The transport failed before an HTTP status was available.
    #[error("failed to do request: {0}")]
    Transport(#[source] TransportError),

    /// The response body was not the expected JSON document.
    #[error("failed to unmarshal response body: {0}")]
    Decode(#[source] serde_json::Error),
}

impl ApiError {
    /// Whether this error is the not-found sentinel.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }

    /// Whether this error is the unauthorized sentinel.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized)
    }

    /// The HTTP status that produced this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::NotFound => Some(404),
            Self::Unauthorized => Some(401),
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// An [`ApiError`] wrapped with the operation that produced it.
///
/// Displays as `"{context}: {source}"`, optionally followed by the raw
/// response body when one was attached with [`RequestError::with_response`].
#[derive(Debug)]
pub struct RequestError {
    context: String,
    source: ApiError,
    response: Option<String>,
}

impl RequestError {
    /// Wrap an API error with operation context.
    pub fn new(context: impl Into<String>, source: ApiError) -> Self {
        Self {
            context: context.into(),
            source,
            response: None,
        }
    }

    /// Attach the raw response body to the rendered message.
    pub fn with_response(mut self, body: &[u8]) -> Self {
        if !body.is_empty() {
            self.response = Some(String::from_utf8_lossy(body).into_owned());
        }
        self
    }

    /// The operation context.
    pub fn context(&self) -> &str {
        &self.context
    }

    /// The classified error kind.
    pub fn kind(&self) -> &ApiError {
        &self.source
    }

    /// Whether the request failed with HTTP 404.
    pub fn is_not_found(&self) -> bool {
        self.source.is_not_found()
    }

    /// Whether the request failed with HTTP 401.
    pub fn is_unauthorized(&self) -> bool {
        self.source.is_unauthorized()
    }
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.context, self.source)?;
        match (&self.response, &self.source) {
            (Some(body), ApiError::Decode(_)) => write!(f, " (raw response: {})", body),
            (Some(body), _) => write!(f, " (response: {})", body),
            (None, _) => Ok(()),
        }
    }
}

impl StdError for RequestError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(&self.source)
    }
}

/// Errors surfaced by provider operations.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The requested object was not found.
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Input rejected before any network call.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Configuration rejected with attribute-level diagnostics.
    #[error("Invalid configuration: {}", summarize(.0))]
    InvalidConfig(Vec<Diagnostic>),

    /// The provider is not configured for this operation.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The requested resource or data source type is unknown.
    #[error("Unknown resource type: {0}")]
    UnknownResource(String),

    /// A state document could not be (de)serialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A remote call failed.
    #[error("{summary}: {source}")]
    Api {
        /// Short, user-facing summary of the failed step.
        summary: String,
        /// The underlying failure.
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },

    /// The operation ran out of time.
    #[error("Deadline exceeded: {0}")]
    DeadlineExceeded(String),

    /// The operation was cancelled by the host.
    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    /// The operation is not supported by this resource.
    #[error("Unimplemented: {0}")]
    Unimplemented(String),

    /// An internal invariant was violated.
    #[error("Internal error: {0}")]
    Internal(String),
}

fn summarize(diagnostics: &[Diagnostic]) -> String {
    let errors: Vec<&str> = diagnostics
        .iter()
        .filter(|d| d.is_error())
        .map(|d| d.summary.as_str())
        .collect();
    errors.join("; ")
}

impl ProviderError {
    /// Wrap a remote failure with a user-facing summary.
    pub fn api(
        summary: impl Into<String>,
        source: impl Into<Box<dyn StdError + Send + Sync>>,
    ) -> Self {
        Self::Api {
            summary: summary.into(),
            source: source.into(),
        }
    }

    /// Get the error message as a string.
    pub fn message(&self) -> &str {
        match self {
            Self::NotFound(msg) => msg,
            Self::Validation(msg) => msg,
            Self::InvalidConfig(_) => "invalid configuration",
            Self::Configuration(msg) => msg,
            Self::UnknownResource(msg) => msg,
            Self::Serialization(_err) => "serialization error (see Debug output)",
            Self::Api { summary, .. } => summary,
            Self::DeadlineExceeded(msg) => msg,
            Self::Cancelled(msg) => msg,
            Self::Unimplemented(msg) => msg,
            Self::Internal(msg) => msg,
        }
    }

    /// Whether the error chain ends in a not-found condition.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound(_) => true,
            Self::Api { source, .. } => source
                .downcast_ref::<RequestError>()
                .is_some_and(RequestError::is_not_found),
            _ => false,
        }
    }

    /// Convert this error into diagnostics for the host.
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        match self {
            Self::InvalidConfig(diagnostics) => diagnostics.clone(),
            Self::Api { summary, source } => {
                vec![Diagnostic::error(summary.clone()).with_detail(source.to_string())]
            }
            other => vec![Diagnostic::error(other.to_string())],
        }
    }
}
