//! # Log Output Bootstrap
//!
//! `core-fiber` and `core-future` only emit `tracing` events. A host that
//! already owns a subscriber needs nothing from this module; everyone else
//! calls [`init_logging`] once at startup.
//!
//! Every fiber runs on its own named OS thread (`RuntimeConfig::thread_name`),
//! so enabling [`LoggingConfig::with_thread_names`] is usually the quickest
//! way to tell interleaved fibers apart in the output.
//!
//! ```ignore
//! use core_runtime::logging::{init_logging, LogFormat, LogLevel, LoggingConfig};
//!
//! init_logging(
//!     LoggingConfig::default()
//!         .with_format(LogFormat::Compact)
//!         .with_level(LogLevel::Debug)
//!         .with_thread_names(true),
//! )?;
//! ```

use crate::error::{Error, Result};
use std::io;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

/// Targets that follow [`LoggingConfig::level`] when no explicit directives
/// are given. Everything else stays at `warn`.
pub const WORKSPACE_TARGETS: &[&str] = &["core_runtime", "core_fiber", "core_future", "fiber_futures"];

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// How events are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Multi-line, colored; for a developer watching a terminal.
    Pretty,
    /// One JSON object per event.
    Json,
    /// One line per event.
    Compact,
}

impl Default for LogFormat {
    fn default() -> Self {
        if cfg!(debug_assertions) {
            LogFormat::Pretty
        } else {
            LogFormat::Json
        }
    }
}

/// Where rendered events are written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub format: LogFormat,
    pub level: LogLevel,
    pub output: LogOutput,
    /// `EnvFilter` directives used verbatim instead of the level-based
    /// default, e.g. `"core_future=trace,core_fiber=debug"`.
    pub directives: Option<String>,
    /// Prefer `RUST_LOG` over both `directives` and `level` when it is set.
    pub use_env: bool,
    /// Log span open/close; fibers that suspend inside a span re-enter it on
    /// resumption, which shows up here.
    pub span_events: bool,
    pub display_target: bool,
    pub display_thread_names: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            level: LogLevel::Info,
            output: LogOutput::default(),
            directives: None,
            use_env: false,
            span_events: false,
            display_target: true,
            display_thread_names: false,
        }
    }
}

impl LoggingConfig {
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn with_output(mut self, output: LogOutput) -> Self {
        self.output = output;
        self
    }

    pub fn with_directives(mut self, directives: impl Into<String>) -> Self {
        self.directives = Some(directives.into());
        self
    }

    pub fn with_env(mut self, use_env: bool) -> Self {
        self.use_env = use_env;
        self
    }

    pub fn with_span_events(mut self, enabled: bool) -> Self {
        self.span_events = enabled;
        self
    }

    pub fn with_target(mut self, display: bool) -> Self {
        self.display_target = display;
        self
    }

    pub fn with_thread_names(mut self, display: bool) -> Self {
        self.display_thread_names = display;
        self
    }

    /// The directive string [`init_logging`] will install, ignoring
    /// `RUST_LOG`.
    pub fn filter_directives(&self) -> String {
        match &self.directives {
            Some(directives) => directives.clone(),
            None => {
                let mut parts = vec![String::from("warn")];
                parts.extend(
                    WORKSPACE_TARGETS
                        .iter()
                        .map(|target| format!("{}={}", target, self.level.as_str())),
                );
                parts.join(",")
            }
        }
    }
}

/// Installs a global `tracing` subscriber built from `config`.
///
/// # Errors
///
/// [`Error::Config`] if the directives do not parse, or if a global
/// subscriber is already installed (including by an earlier call).
pub fn init_logging(config: LoggingConfig) -> Result<()> {
    let filter = build_filter(&config)?;
    tracing_subscriber::registry()
        .with(fmt_layer(&config))
        .with(filter)
        .try_init()
        .map_err(|e| Error::Config(format!("logging already initialized: {}", e)))
}

pub(crate) fn build_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    if config.use_env {
        if let Ok(filter) = EnvFilter::try_from_default_env() {
            return Ok(filter);
        }
    }
    let directives = config.filter_directives();
    EnvFilter::try_new(&directives)
        .map_err(|e| Error::Config(format!("invalid log directives `{}`: {}", directives, e)))
}

fn fmt_layer(config: &LoggingConfig) -> BoxedLayer {
    let spans = if config.span_events {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };
    let base = tracing_subscriber::fmt::layer()
        .with_target(config.display_target)
        .with_thread_names(config.display_thread_names)
        .with_span_events(spans);

    match (config.format, config.output) {
        (LogFormat::Pretty, LogOutput::Stdout) => base.pretty().with_writer(io::stdout).boxed(),
        (LogFormat::Pretty, LogOutput::Stderr) => base.pretty().with_writer(io::stderr).boxed(),
        (LogFormat::Compact, LogOutput::Stdout) => base.compact().with_writer(io::stdout).boxed(),
        (LogFormat::Compact, LogOutput::Stderr) => base.compact().with_writer(io::stderr).boxed(),
        (LogFormat::Json, LogOutput::Stdout) => base
            .json()
            .flatten_event(true)
            .with_writer(io::stdout)
            .boxed(),
        (LogFormat::Json, LogOutput::Stderr) => base
            .json()
            .flatten_event(true)
            .with_writer(io::stderr)
            .boxed(),
    }
}
