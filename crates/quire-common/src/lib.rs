//! Shared plumbing for quire crates: configuration, id generation, telemetry.

pub mod config;
pub mod error;
pub mod ids;
#[cfg(feature = "telemetry")]
pub mod telemetry;

pub use config::QuireConfig;
pub use error::ConfigError;
pub use ids::RequestIdGenerator;
