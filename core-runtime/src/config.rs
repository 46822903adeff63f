//! # Runtime Configuration Module
//!
//! Provides configuration management for the fiber runtime.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a
//! `RuntimeConfig` instance holding the settings shared by the event loop and
//! the future layer. It enforces fail-fast validation so a misconfigured pool
//! is rejected before any fiber starts.
//!
//! ## Settings
//!
//! - `max_fibers` - Upper bound on fibers alive at once (each fiber occupies
//!   one blocking-pool thread)
//! - `fiber_stack_size` - Stack size for fiber threads (optional)
//! - `thread_name` - Name given to fiber threads
//! - `unhandled_policy` - Whether an unhandled failure stops the loop
//! - `unhandled_sink` - Optional host hook for unhandled failures
//! - `diagnostics` - Leak detection and backtrace capture
//!
//! ## Usage
//!
//! ```
//! use core_runtime::config::{RuntimeConfig, UnhandledPolicy};
//!
//! let config = RuntimeConfig::builder()
//!     .max_fibers(64)
//!     .thread_name("worker-fiber")
//!     .unhandled_policy(UnhandledPolicy::Log)
//!     .build()
//!     .expect("Failed to build config");
//!
//! assert_eq!(config.max_fibers, 64);
//! ```
//!
//! ## Error Handling
//!
//! The builder validates every value and provides actionable error messages:
//!
//! ```should_panic
//! use core_runtime::config::RuntimeConfig;
//!
//! // This will panic with an actionable error message
//! let config = RuntimeConfig::builder()
//!     .max_fibers(0)
//!     .build()
//!     .expect("Should fail - a pool needs at least one fiber");
//! ```

use crate::error::{Error, Result};
use crate::sink::UnhandledSink;
use std::sync::Arc;

/// Default number of fibers that may be alive at once.
pub const DEFAULT_MAX_FIBERS: usize = 512;

/// Hard upper bound for `max_fibers`.
pub const MAX_FIBERS_LIMIT: usize = 10_000;

/// Smallest accepted fiber stack size (64 KiB).
pub const MIN_FIBER_STACK_SIZE: usize = 64 * 1024;

/// What the event loop does when a failure reaches the unhandled channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnhandledPolicy {
    /// Log the failure, then stop the loop and return it to the caller of
    /// `block_on`. Mirrors an uncaught exception taking the process down.
    #[default]
    Abort,
    /// Log the failure and keep running.
    Log,
}

/// Diagnostic settings for the future layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiagnosticsConfig {
    /// Track every future from construction to first consumption.
    pub leak_detection: bool,

    /// Capture a full backtrace (in addition to the caller location) for
    /// creation and consumption traces. Expensive; off by default.
    pub capture_backtraces: bool,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            leak_detection: true,
            capture_backtraces: false,
        }
    }
}

/// Runtime configuration for the fiber stack.
///
/// Use [`RuntimeConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct RuntimeConfig {
    /// Maximum number of fibers alive at once
    pub max_fibers: usize,

    /// Stack size of fiber threads, `None` for the platform default
    pub fiber_stack_size: Option<usize>,

    /// Name given to fiber threads
    pub thread_name: String,

    /// Reaction to failures on the unhandled channel
    pub unhandled_policy: UnhandledPolicy,

    /// Host hook for unhandled failures (optional)
    pub unhandled_sink: Option<Arc<dyn UnhandledSink>>,

    /// Leak detection and trace capture
    pub diagnostics: DiagnosticsConfig,
}

impl std::fmt::Debug for RuntimeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeConfig")
            .field("max_fibers", &self.max_fibers)
            .field("fiber_stack_size", &self.fiber_stack_size)
            .field("thread_name", &self.thread_name)
            .field("unhandled_policy", &self.unhandled_policy)
            .field(
                "unhandled_sink",
                &self
                    .unhandled_sink
                    .as_ref()
                    .map(|_| "UnhandledSink { ... }"),
            )
            .field("diagnostics", &self.diagnostics)
            .finish()
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_fibers: DEFAULT_MAX_FIBERS,
            fiber_stack_size: None,
            thread_name: "fiber".to_string(),
            unhandled_policy: UnhandledPolicy::default(),
            unhandled_sink: None,
            diagnostics: DiagnosticsConfig::default(),
        }
    }
}

impl RuntimeConfig {
    /// Creates a new builder for constructing a `RuntimeConfig`.
    pub fn builder() -> RuntimeConfigBuilder {
        RuntimeConfigBuilder::default()
    }

    /// Validates the configuration and returns an error if invalid.
    ///
    /// This checks:
    /// - The fiber pool holds at least one fiber and stays under the limit
    /// - The stack size, when set, is large enough to run a fiber body
    /// - The thread name is not empty
    pub fn validate(&self) -> Result<()> {
        if self.max_fibers == 0 {
            return Err(Error::Config(
                "max_fibers must be greater than 0".to_string(),
            ));
        }

        if self.max_fibers > MAX_FIBERS_LIMIT {
            return Err(Error::Config(format!(
                "max_fibers exceeds maximum of {} fibers",
                MAX_FIBERS_LIMIT
            )));
        }

        if let Some(size) = self.fiber_stack_size {
            if size < MIN_FIBER_STACK_SIZE {
                return Err(Error::Config(format!(
                    "fiber_stack_size must be at least {} bytes, got {}",
                    MIN_FIBER_STACK_SIZE, size
                )));
            }
        }

        if self.thread_name.trim().is_empty() {
            return Err(Error::Config("thread_name cannot be empty".to_string()));
        }

        Ok(())
    }
}

/// Builder for constructing [`RuntimeConfig`] instances.
///
/// Unset values fall back to the defaults of [`RuntimeConfig::default`].
/// [`build()`](RuntimeConfigBuilder::build) validates the result.
#[derive(Default)]
pub struct RuntimeConfigBuilder {
    max_fibers: Option<usize>,
    fiber_stack_size: Option<usize>,
    thread_name: Option<String>,
    unhandled_policy: Option<UnhandledPolicy>,
    unhandled_sink: Option<Arc<dyn UnhandledSink>>,
    diagnostics: Option<DiagnosticsConfig>,
}

impl RuntimeConfigBuilder {
    /// Sets the maximum number of fibers alive at once.
    ///
    /// Default: 512. Every suspended fiber keeps its thread, so a program
    /// that parks more fibers than this stops making progress.
    pub fn max_fibers(mut self, max: usize) -> Self {
        self.max_fibers = Some(max);
        self
    }

    /// Sets the stack size of fiber threads in bytes.
    pub fn fiber_stack_size(mut self, bytes: usize) -> Self {
        self.fiber_stack_size = Some(bytes);
        self
    }

    /// Sets the name given to fiber threads.
    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = Some(name.into());
        self
    }

    /// Sets the reaction to unhandled failures.
    pub fn unhandled_policy(mut self, policy: UnhandledPolicy) -> Self {
        self.unhandled_policy = Some(policy);
        self
    }

    /// Sets a host hook receiving unhandled failures.
    pub fn unhandled_sink(mut self, sink: Arc<dyn UnhandledSink>) -> Self {
        self.unhandled_sink = Some(sink);
        self
    }

    /// Enables or disables leak detection.
    pub fn leak_detection(mut self, enabled: bool) -> Self {
        self.diagnostics
            .get_or_insert_with(DiagnosticsConfig::default)
            .leak_detection = enabled;
        self
    }

    /// Enables or disables full backtrace capture.
    pub fn capture_backtraces(mut self, enabled: bool) -> Self {
        self.diagnostics
            .get_or_insert_with(DiagnosticsConfig::default)
            .capture_backtraces = enabled;
        self
    }

    /// Replaces the whole diagnostics section.
    pub fn diagnostics(mut self, diagnostics: DiagnosticsConfig) -> Self {
        self.diagnostics = Some(diagnostics);
        self
    }

    /// Builds the final `RuntimeConfig` instance.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when a value fails validation.
    pub fn build(self) -> Result<RuntimeConfig> {
        let defaults = RuntimeConfig::default();

        let config = RuntimeConfig {
            max_fibers: self.max_fibers.unwrap_or(defaults.max_fibers),
            fiber_stack_size: self.fiber_stack_size.or(defaults.fiber_stack_size),
            thread_name: self.thread_name.unwrap_or(defaults.thread_name),
            unhandled_policy: self.unhandled_policy.unwrap_or(defaults.unhandled_policy),
            unhandled_sink: self.unhandled_sink,
            diagnostics: self.diagnostics.unwrap_or(defaults.diagnostics),
        };

        config.validate()?;

        Ok(config)
    }
}
