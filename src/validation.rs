//! Input validation helpers.
//!
//! Configuration structs are parsed once with serde and then checked here,
//! before any network call. A [`Validator`] collects attribute-level
//! [`Diagnostic`]s so users see every problem in one pass.
//!
//! # Example
//!
//! ```
//! use grafana_cloud_provider::validation::Validator;
//!
//! let mut v = Validator::new();
//! v.require("name", "");
//! v.one_of("match.0.op", "~=", &["=", "<>"]);
//! assert_eq!(v.diagnostics().len(), 2);
//! assert_eq!(v.diagnostics()[0].attribute.as_deref(), Some("name"));
//! ```

use url::Url;

use crate::diagnostic::{has_errors, Diagnostic};
use crate::error::ProviderError;

/// Collects validation diagnostics with attribute paths.
#[derive(Debug, Default)]
pub struct Validator {
    diagnostics: Vec<Diagnostic>,
}

impl Validator {
    /// Create an empty validator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an error at `attribute`.
    pub fn error(&mut self, attribute: impl Into<String>, summary: impl Into<String>) {
        self.diagnostics
            .push(Diagnostic::error(summary).with_attribute(attribute));
    }

    /// Record a warning at `attribute`.
    pub fn warning(&mut self, attribute: impl Into<String>, summary: impl Into<String>) {
        self.diagnostics
            .push(Diagnostic::warning(summary).with_attribute(attribute));
    }

    /// Require a non-blank string. Returns whether it was present.
    pub fn require(&mut self, attribute: &str, value: &str) -> bool {
        if value.trim().is_empty() {
            self.error(attribute, format!("{} is required", attribute));
            return false;
        }
        true
    }

    /// Require `value` to be one of `allowed` (case-sensitive).
    pub fn one_of(&mut self, attribute: &str, value: &str, allowed: &[&str]) {
        if !allowed.contains(&value) {
            self.error(
                attribute,
                format!("expected {} to be one of {:?}, got {}", attribute, allowed, value),
            );
        }
    }

    /// Require every key of a map attribute to be one of `allowed`.
    pub fn keys_one_of<'a>(
        &mut self,
        attribute: &str,
        keys: impl IntoIterator<Item = &'a String>,
        allowed: &[&str],
    ) {
        for key in keys {
            if !allowed.contains(&key.as_str()) {
                self.error(
                    format!("{}.{}", attribute, key),
                    format!("expected {} key to be one of {:?}, got {}", attribute, allowed, key),
                );
            }
        }
    }

    /// Require `value` to be within `min..=max`.
    pub fn int_between(&mut self, attribute: &str, value: i64, min: i64, max: i64) {
        if value < min || value > max {
            self.error(
                attribute,
                format!(
                    "expected {} to be in the range ({} - {}), got {}",
                    attribute, min, max, value
                ),
            );
        }
    }

    /// Require an absolute http(s) URL.
    pub fn http_url(&mut self, attribute: &str, value: &str) {
        match Url::parse(value) {
            Ok(url) if matches!(url.scheme(), "http" | "https") && url.host().is_some() => {},
            Ok(_) => self.error(
                attribute,
                format!(
                    "expected {} to have a host and an http or https scheme, got {}",
                    attribute, value
                ),
            ),
            Err(err) => self.error(attribute, format!("invalid {}: {}", attribute, err)),
        }
    }

    /// Whether any error was recorded.
    pub fn has_errors(&self) -> bool {
        has_errors(&self.diagnostics)
    }

    /// The collected diagnostics.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Take the collected diagnostics.
    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        self.diagnostics
    }

    /// `Ok` when no error was recorded, else [`ProviderError::InvalidConfig`].
    pub fn finish(self) -> Result<(), ProviderError> {
        if self.has_errors() {
            Err(ProviderError::InvalidConfig(self.diagnostics))
        } else {
            Ok(())
        }
    }
}
