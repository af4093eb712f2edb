//! Server configuration.
//!
//! Three knobs, loadable from a TOML file or the environment:
//!
//! ```toml
//! addr = "0.0.0.0:3000"
//! environment = "production"   # or "development"
//! request_timeout_ms = 30000   # 0 disables the deadline
//! ```
//!
//! | Variable                     | Field                |
//! |------------------------------|----------------------|
//! | `PASSAGE_ADDR`               | `addr`               |
//! | `PASSAGE_ENV`                | `environment`        |
//! | `PASSAGE_REQUEST_TIMEOUT_MS` | `request_timeout_ms` |

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::error::Error;

/// Deployment environment. Decides how much of an unhandled error the
/// client gets to see.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    #[serde(alias = "prod")]
    Production,
}

impl Environment {
    /// `production` / `prod` (any case) is production; anything else is
    /// development.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            _ => Self::Development,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    pub addr: String,
    pub environment: Environment,
    pub request_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0:3000".to_owned(),
            environment: Environment::Development,
            request_timeout_ms: 30_000,
        }
    }
}

impl Config {
    pub fn from_toml(source: &str) -> Result<Self, Error> {
        Ok(toml::from_str(source)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml(&source)
    }

    /// Defaults overridden by `PASSAGE_*` variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(addr) = lookup("PASSAGE_ADDR") {
            config.addr = addr;
        }
        if let Some(env) = lookup("PASSAGE_ENV") {
            config.environment = Environment::parse(&env);
        }
        if let Some(raw) = lookup("PASSAGE_REQUEST_TIMEOUT_MS") {
            match raw.trim().parse() {
                Ok(ms) => config.request_timeout_ms = ms,
                Err(e) => warn!(value = %raw, "ignoring PASSAGE_REQUEST_TIMEOUT_MS: {e}"),
            }
        }
        config
    }

    /// The per-request deadline, if enabled.
    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_ms > 0).then(|| Duration::from_millis(self.request_timeout_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn toml_fills_missing_fields_with_defaults() {
        let config = Config::from_toml(r#"environment = "prod""#).unwrap();

        assert_eq!(config.environment, Environment::Production);
        assert_eq!(config.addr, "0.0.0.0:3000");
        assert_eq!(config.request_timeout(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn zero_timeout_disables_deadline() {
        let config = Config::from_toml("request_timeout_ms = 0").unwrap();
        assert_eq!(config.request_timeout(), None);
    }

    #[test]
    fn bad_toml_is_a_config_error() {
        let err = Config::from_toml("environment = 42").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn environment_variables_override_defaults() {
        let vars: HashMap<&str, &str> = [
            ("PASSAGE_ADDR", "127.0.0.1:8080"),
            ("PASSAGE_ENV", "Production"),
            ("PASSAGE_REQUEST_TIMEOUT_MS", "250"),
        ]
        .into_iter()
        .collect();

        let config = Config::from_lookup(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(config.addr, "127.0.0.1:8080");
        assert_eq!(config.environment, Environment::Production);
        assert_eq!(config.request_timeout(), Some(Duration::from_millis(250)));
    }

    #[test]
    fn unparsable_timeout_keeps_default() {
        let config = Config::from_lookup(|k| {
            (k == "PASSAGE_REQUEST_TIMEOUT_MS").then(|| "soon".to_owned())
        });
        assert_eq!(config.request_timeout_ms, 30_000);
    }
}
