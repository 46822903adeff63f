//! # Core Runtime Module
//!
//! Provides the ambient runtime infrastructure shared by the fiber crates:
//! - Logging and tracing bootstrap
//! - Runtime configuration (fiber pool, unhandled-failure policy, diagnostics)
//! - The `UnhandledSink` trait through which hosts observe failures nobody
//!   consumed
//!
//! ## Overview
//!
//! Nothing in this crate knows about fibers or futures. It establishes the
//! configuration and logging conventions that `core-fiber` and `core-future`
//! build on, so that hosts configure the whole stack in one place.

pub mod config;
pub mod error;
pub mod logging;
pub mod sink;

pub use config::{DiagnosticsConfig, RuntimeConfig, RuntimeConfigBuilder, UnhandledPolicy};
pub use error::{Error, Result};
pub use sink::{SharedError, UnhandledSink};
