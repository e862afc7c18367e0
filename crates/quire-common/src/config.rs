use std::time::Duration;

use quire_protocol::{EditorSettings, SyntaxVisibility};

use crate::error::ConfigError;

/// Session configuration shared by the authority and the developer tools.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuireConfig {
    /// How long a host command waits for a selection answer.
    pub selection_timeout: Duration,
    pub allow_external_resources: bool,
    pub viewport_margin: u32,
    pub syntax_visibility: SyntaxVisibility,
    /// Default console log level when `RUST_LOG` is unset.
    pub log_level: String,
}

impl Default for QuireConfig {
    fn default() -> Self {
        Self {
            selection_timeout: Duration::from_millis(Self::DEFAULT_SELECTION_TIMEOUT_MS),
            allow_external_resources: false,
            viewport_margin: 20,
            syntax_visibility: SyntaxVisibility::Selection,
            log_level: "info".to_string(),
        }
    }
}

impl QuireConfig {
    pub const DEFAULT_SELECTION_TIMEOUT_MS: u64 = 3000;

    /// Load configuration from environment variables.
    ///
    /// Optional env vars:
    /// - `QUIRE_SELECTION_TIMEOUT_MS`: selection request timeout (default: 3000)
    /// - `QUIRE_ALLOW_EXTERNAL_RESOURCES`: `true`/`false` (default: false)
    /// - `QUIRE_VIEWPORT_MARGIN`: lines rendered beyond the viewport (default: 20)
    /// - `QUIRE_SYNTAX_VISIBILITY`: `show`, `dim` or `selection` (default: selection)
    /// - `QUIRE_LOG`: default log level (default: info)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let selection_timeout = match lookup("QUIRE_SELECTION_TIMEOUT_MS") {
            Some(raw) => Duration::from_millis(parse_number("QUIRE_SELECTION_TIMEOUT_MS", &raw)?),
            None => defaults.selection_timeout,
        };

        let allow_external_resources = match lookup("QUIRE_ALLOW_EXTERNAL_RESOURCES") {
            Some(raw) => parse_bool("QUIRE_ALLOW_EXTERNAL_RESOURCES", &raw)?,
            None => defaults.allow_external_resources,
        };

        let viewport_margin = match lookup("QUIRE_VIEWPORT_MARGIN") {
            Some(raw) => {
                let n = parse_number("QUIRE_VIEWPORT_MARGIN", &raw)?;
                u32::try_from(n).map_err(|_| ConfigError::Invalid {
                    var: "QUIRE_VIEWPORT_MARGIN",
                    message: format!("{n} is too large"),
                })?
            }
            None => defaults.viewport_margin,
        };

        let syntax_visibility = match lookup("QUIRE_SYNTAX_VISIBILITY") {
            Some(raw) => SyntaxVisibility::parse(raw.trim()).ok_or(ConfigError::Invalid {
                var: "QUIRE_SYNTAX_VISIBILITY",
                message: format!("`{raw}` is not one of show, dim, selection"),
            })?,
            None => defaults.syntax_visibility,
        };

        let log_level = lookup("QUIRE_LOG").unwrap_or(defaults.log_level);

        Ok(Self {
            selection_timeout,
            allow_external_resources,
            viewport_margin,
            syntax_visibility,
            log_level,
        })
    }

    /// Project into the settings pushed to surfaces.
    pub fn editor_settings(&self) -> EditorSettings {
        EditorSettings {
            syntax_visibility: self.syntax_visibility,
            allow_external_resources: self.allow_external_resources,
            viewport_margin: self.viewport_margin,
            ..EditorSettings::default()
        }
    }
}

fn parse_number(var: &'static str, raw: &str) -> Result<u64, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::Invalid {
        var,
        message: format!("`{raw}` is not a non-negative integer"),
    })
}

fn parse_bool(var: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            var,
            message: format!("`{raw}` is not a boolean"),
        }),
    }
}
