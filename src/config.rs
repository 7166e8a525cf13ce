//! Runtime configuration (ambient stack: spec.md's policy parameters,
//! loaded the way `examples/pycckuu-wintermute/src/config.rs` loads its
//! own settings — a `serde`-derived struct deserialized from TOML, with
//! every knob defaulted so a missing config file still produces a
//! runnable system).

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors loading or parsing a [`RuntimeConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Io {
        /// The path that could not be read.
        path: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The config file's contents could not be parsed as TOML.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Tunable parameters for the six reference policies and the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Email domains treated as trusted recipients.
    pub trusted_email_domains: Vec<String>,
    /// Individually approved recipient addresses outside trusted domains.
    pub approved_recipients: Vec<String>,
    /// Path prefixes file operations are confined to.
    pub allowed_path_prefixes: Vec<String>,
    /// Maximum tool calls allowed per tool within `rate_limit_window_secs`.
    pub rate_limit_max_calls: usize,
    /// The sliding window, in seconds, over which `rate_limit_max_calls`
    /// is enforced.
    pub rate_limit_window_secs: u64,
    /// Maximum sensitive-looking exports allowed per session before the
    /// exfiltration heuristic policy denies further attempts.
    pub max_sensitive_exports_per_session: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            trusted_email_domains: vec!["company.com".to_string(), "trusted-partner.com".to_string()],
            approved_recipients: Vec::new(),
            allowed_path_prefixes: vec![
                "/documents/".to_string(),
                "/shared/".to_string(),
                "/public/".to_string(),
            ],
            rate_limit_max_calls: 10,
            rate_limit_window_secs: 60,
            max_sensitive_exports_per_session: 2,
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(toml::from_str(&text)?)
    }
}
