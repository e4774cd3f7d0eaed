//! Logging and tracing setup.
//!
//! All logs are written to **stderr**. The provider host owns stdout, so
//! nothing in this crate ever prints there.
//!
//! # Quick Start
//!
//! ```ignore
//! use grafana_cloud_provider::{init_logging, GrafanaProvider};
//!
//! #[tokio::main]
//! async fn main() {
//!     // Reads RUST_LOG, defaults to info
//!     init_logging();
//!
//!     let provider = GrafanaProvider::new();
//!     tracing::info!("provider ready");
//! }
//! ```
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: Controls log levels (e.g., `info`, `grafana_cloud_provider=debug`)
//!
//! Retry loops log every attempt at `debug` and give-ups at `warn`. Request
//! bodies and tokens are never logged.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Default filter when `RUST_LOG` is not set.
pub const DEFAULT_LEVEL: &str = "info";

/// Initialize the global subscriber, filtering with `RUST_LOG` or `info`.
///
/// # Panics
///
/// Panics if a global subscriber has already been set.
pub fn init_logging() {
    init_logging_with_default(DEFAULT_LEVEL);
}

/// Initialize logging with a custom default level.
///
/// Like [`init_logging`], but `default_level` is used when `RUST_LOG` is not
/// set.
///
/// # Panics
///
/// Panics if a global subscriber has already been set.
///
/// # Example
///
/// ```ignore
/// use grafana_cloud_provider::init_logging_with_default;
///
/// // Verbose retry logging unless RUST_LOG says otherwise
/// init_logging_with_default("grafana_cloud_provider=debug");
/// ```
pub fn init_logging_with_default(default_level: &str) {
    tracing_subscriber::registry()
        .with(env_filter(default_level))
        .with(stderr_layer())
        .init();
}

/// Try to initialize logging, returning false if already initialized.
///
/// Unlike [`init_logging`], this never panics, which makes it safe to call
/// from every test.
pub fn try_init_logging() -> bool {
    tracing_subscriber::registry()
        .with(env_filter(DEFAULT_LEVEL))
        .with(stderr_layer())
        .try_init()
        .is_ok()
}

fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

fn stderr_layer<S>() -> impl tracing_subscriber::Layer<S>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
}
