//! Application configuration file
//!
//! The server reads a YAML file such as:
//!
//! ```yaml
//! debug: false
//! bind: 0.0.0.0:8000
//! allowed_origins: ["*"]
//! secret_keys:
//!   x-api-key: change-me
//! rate_limit:
//!   requests: 100
//!   per_ms: 60000
//! log:
//!   level: info
//!   format: json
//! ```
//!
//! Every field is optional; a missing file yields the defaults.

use crate::logging::LogConfig;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Sliding-window rate limit settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Requests allowed per window
    pub requests: usize,
    /// Window length in milliseconds
    pub per_ms: u64,
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.per_ms)
    }
}

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Include panic details in error bodies
    pub debug: bool,
    /// Listen address
    pub bind: String,
    /// CORS allow-list; empty or `*` allows every origin
    pub allowed_origins: Vec<String>,
    /// Headers required on every request
    pub secret_keys: BTreeMap<String, String>,
    pub rate_limit: Option<RateLimitConfig>,
    pub log: LogConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            debug: false,
            bind: "0.0.0.0:8000".to_string(),
            allowed_origins: vec!["*".to_string()],
            secret_keys: BTreeMap::new(),
            rate_limit: None,
            log: LogConfig::default(),
        }
    }
}

const DEFAULT_TEMPLATE: &str = "\
# Include panic messages and backtraces in 500 responses
debug: false

# Address the HTTP server listens on
bind: 0.0.0.0:8000

# CORS allow-list; an empty list or \"*\" allows every origin
allowed_origins:
  - \"*\"

# Headers every request must carry, name: value
secret_keys: {}

# Per client and path sliding window; remove to disable
# rate_limit:
#   requests: 100
#   per_ms: 60000

log:
  # trace, debug, info, warn or error (RUST_LOG overrides)
  level: info
  # json or pretty
  format: json
  enable_print: true
  # directory for a daily rolling log file
  # save_path: ./logs
  buffer_lines: 8192
";

impl AppConfig {
    /// Parse a YAML document
    pub fn from_yaml(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).context("invalid configuration")
    }

    /// Load `path`, falling back to defaults when it does not exist
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::warn!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_yaml(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    /// Write the commented default configuration to `path`
    pub fn write_default(path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        fs::write(path, DEFAULT_TEMPLATE)
            .with_context(|| format!("writing config {}", path.display()))
    }
}
