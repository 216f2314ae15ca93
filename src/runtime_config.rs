//! Coroutine runtime settings read from the environment.
//!
//! ### `STARROUTE_STACK_SIZE`
//!
//! Stack size for request coroutines, in decimal (`16384`) or hexadecimal
//! (`0x4000`). Default: `0x4000` (16 KB). Handlers with deep call chains or
//! large locals need more; memory use is roughly stack size times concurrent
//! connections.
//!
//! ```rust
//! use starroute::runtime_config::RuntimeConfig;
//!
//! let config = RuntimeConfig::from_env();
//! assert!(config.stack_size > 0);
//! ```

use std::env;

/// Default coroutine stack size
pub const DEFAULT_STACK_SIZE: usize = 0x4000;

/// Runtime configuration loaded from environment variables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Stack size for coroutines in bytes
    pub stack_size: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            stack_size: DEFAULT_STACK_SIZE,
        }
    }
}

fn parse_stack_size(val: &str) -> Option<usize> {
    let val = val.trim();
    let parsed = match val.strip_prefix("0x").or_else(|| val.strip_prefix("0X")) {
        Some(hex) => usize::from_str_radix(hex, 16).ok(),
        None => val.parse().ok(),
    };
    parsed.filter(|size| *size > 0)
}

impl RuntimeConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let stack_size = env::var("STARROUTE_STACK_SIZE")
            .ok()
            .and_then(|v| parse_stack_size(&v))
            .unwrap_or(DEFAULT_STACK_SIZE);
        RuntimeConfig { stack_size }
    }

    /// Apply to the global `may` scheduler; call before the server starts
    pub fn apply(&self) {
        may::config().set_stack_size(self.stack_size);
        tracing::debug!(stack_size = self.stack_size, "Coroutine stack size set");
    }
}
