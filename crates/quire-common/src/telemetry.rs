//! Tracing setup for quire binaries.
//!
//! # Usage
//!
//! ```ignore
//! use quire_common::telemetry::{self, TelemetryConfig};
//!
//! fn main() {
//!     telemetry::init(TelemetryConfig::from_env("quire-cli"));
//!     tracing::info!("started");
//! }
//! ```

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Telemetry configuration
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name for the startup log line
    pub service_name: String,
    /// Console log level used when `RUST_LOG` is unset
    pub console_level: String,
}

impl TelemetryConfig {
    /// Load config from environment variables.
    ///
    /// - `QUIRE_LOG`: default level (falls back to DEBUG in debug builds, INFO otherwise)
    /// - `RUST_LOG`: standard env filter, overrides everything
    pub fn from_env(service_name: impl Into<String>) -> Self {
        let fallback = if cfg!(debug_assertions) {
            Level::DEBUG
        } else {
            Level::INFO
        };

        Self {
            service_name: service_name.into(),
            console_level: std::env::var("QUIRE_LOG")
                .unwrap_or_else(|_| fallback.as_str().to_lowercase()),
        }
    }

    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.console_level = level.into();
        self
    }
}

/// Install the global subscriber.
///
/// Safe to call more than once; later calls are ignored.
pub fn init(config: TelemetryConfig) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.console_level.to_lowercase()));

    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .with_filter(env_filter);

    if tracing_subscriber::registry()
        .with(console_layer)
        .try_init()
        .is_ok()
    {
        tracing::debug!(
            service = %config.service_name,
            level = %config.console_level,
            "telemetry initialized"
        );
    }
}
