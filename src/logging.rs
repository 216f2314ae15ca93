//! Structured logging setup
//!
//! Every log line goes through `tracing`. [`init_logging`] installs a
//! registry with one `fmt` layer per sink (stdout and an optional daily
//! rolling file), each behind its own `EnvFilter` and a lossy non-blocking
//! writer: when the buffer is full new lines are dropped instead of stalling
//! the coroutine that is serving a request.
//!
//! `RUST_LOG` takes precedence over the configured level. The level and the
//! format can also be overridden with `STARROUTE_LOG_LEVEL` and
//! `STARROUTE_LOG_FORMAT`.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use tracing_appender::non_blocking::{NonBlockingBuilder, WorkerGuard};
use tracing_appender::rolling;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

/// Log file name used inside `save_path`
pub const LOG_FILE_NAME: &str = "starroute.log";

/// Log format: JSON for production, pretty-print for development
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

impl LogFormat {
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "pretty" => LogFormat::Pretty,
            _ => LogFormat::Json,
        }
    }
}

/// Logging configuration, the `log` section of the config file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// trace/debug/info/warn/error
    pub level: String,
    pub format: LogFormat,
    /// Write to stdout
    pub enable_print: bool,
    /// Directory for the daily rolling log file
    pub save_path: Option<PathBuf>,
    /// Lines buffered per sink before new lines are dropped
    pub buffer_lines: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Json,
            enable_print: true,
            save_path: None,
            buffer_lines: 8192,
        }
    }
}

impl LogConfig {
    /// Defaults with environment overrides applied
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Apply `STARROUTE_LOG_LEVEL` and `STARROUTE_LOG_FORMAT`
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(level) = env::var("STARROUTE_LOG_LEVEL") {
            self.level = level;
        }
        if let Ok(format) = env::var("STARROUTE_LOG_FORMAT") {
            self.format = LogFormat::parse(&format);
        }
        self
    }

    /// Development preset
    pub fn default_dev() -> Self {
        Self {
            level: "debug".to_string(),
            format: LogFormat::Pretty,
            ..Self::default()
        }
    }

    fn filter(&self) -> EnvFilter {
        let filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&self.level))
            .unwrap_or_else(|_| EnvFilter::new("info"));
        // may_minihttp reports client disconnects at debug/info
        match "may_minihttp=warn".parse() {
            Ok(directive) => filter.add_directive(directive),
            Err(_) => filter,
        }
    }
}

/// Keeps the background writers alive; dropping it flushes them
#[must_use = "dropping the guard stops log output"]
pub struct LogGuard {
    _guards: Vec<WorkerGuard>,
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

fn fmt_layer<W>(format: LogFormat, writer: W, ansi: bool) -> BoxedLayer
where
    W: for<'w> tracing_subscriber::fmt::MakeWriter<'w> + Send + Sync + 'static,
{
    match format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .with_thread_ids(true)
            .with_writer(writer)
            .boxed(),
        LogFormat::Pretty => tracing_subscriber::fmt::layer()
            .pretty()
            .with_target(true)
            .with_ansi(ansi)
            .with_writer(writer)
            .boxed(),
    }
}

/// Install the global subscriber
///
/// # Errors
///
/// Fails when the log directory cannot be created or a subscriber is
/// already installed.
///
/// # Example
///
/// ```no_run
/// use starroute::logging::{init_logging, LogConfig};
///
/// let _guard = init_logging(&LogConfig::from_env()).expect("logging");
/// tracing::info!("ready");
/// ```
pub fn init_logging(config: &LogConfig) -> Result<LogGuard> {
    let mut layers: Vec<BoxedLayer> = Vec::new();
    let mut guards = Vec::new();

    if config.enable_print {
        let (writer, guard) = NonBlockingBuilder::default()
            .lossy(true)
            .buffered_lines_limit(config.buffer_lines)
            .finish(std::io::stdout());
        layers.push(
            fmt_layer(config.format, writer, true)
                .with_filter(config.filter())
                .boxed(),
        );
        guards.push(guard);
    }

    if let Some(dir) = &config.save_path {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating log directory {}", dir.display()))?;
        let (writer, guard) = NonBlockingBuilder::default()
            .lossy(true)
            .buffered_lines_limit(config.buffer_lines)
            .finish(rolling::daily(dir, LOG_FILE_NAME));
        layers.push(
            fmt_layer(config.format, writer, false)
                .with_filter(config.filter())
                .boxed(),
        );
        guards.push(guard);
    }

    tracing_subscriber::registry()
        .with(layers)
        .try_init()
        .context("Failed to initialize logging")?;

    Ok(LogGuard { _guards: guards })
}
