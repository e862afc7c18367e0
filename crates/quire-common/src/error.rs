use miette::Diagnostic;
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("invalid configuration value for {var}: {message}")]
    #[diagnostic(
        code(config::invalid),
        help("unset {var} to use the default, or fix its value")
    )]
    Invalid { var: &'static str, message: String },
}
