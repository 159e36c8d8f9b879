//! # Tickwork Core
//!
//! Shared building blocks for the Tickwork workspace: the unified error type
//! and the TOML-backed configuration.

pub mod config;
pub mod error;

pub use config::{DuplicatePolicy, LoggingConfig, SchedulerConfig, TickworkConfig};
pub use error::{Result, TickworkError};
