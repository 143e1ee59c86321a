//! Full-Stack Harness Configuration
//!
//! Provides the static configuration of a full-stack test run:
//! - Harness settings (`[harness]`)
//! - Service dependencies (`[[service]]`)
//! - Build targets (`[[target]]`)
//! - Test cases (`[[test]]`, plus case files discovered under `harness.cases`)
//!
//! # Configuration Hierarchy
//!
//! Settings are merged in the following order (later overrides earlier):
//! 1. Manifest (`full-stack.toml`)
//! 2. Environment variables (`FULLSTACK_*`)
//! 3. CLI flags (handled by the caller)
//!
//! # Example
//!
//! ```no_run
//! use fullstack_config::ConfigLoader;
//! use std::path::Path;
//!
//! let loader = ConfigLoader::new();
//! let config = loader.load_from_directory(Path::new(".")).unwrap();
//! println!("{} test cases", config.cases.len());
//! ```

pub mod case;
pub mod command;
pub mod loader;
pub mod manifest;
pub mod names;
pub mod service;
pub mod target;

use std::path::PathBuf;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found (searched for {0})")]
    NotFound(PathBuf),

    #[error("Failed to read {path}: {error}")]
    IoError {
        path: PathBuf,
        error: std::io::Error,
    },

    #[error("Invalid TOML syntax in {file}: {error}")]
    TomlParseError {
        file: PathBuf,
        error: toml::de::Error,
    },

    #[error("Duplicate {kind} name '{name}'")]
    DuplicateName { kind: &'static str, name: String },

    #[error("{kind} names '{first}' and '{second}' both map to '{key}'")]
    NameCollision {
        kind: &'static str,
        first: String,
        second: String,
        key: String,
    },

    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Invalid path: {0}")]
    InvalidPath(PathBuf),
}

impl ConfigError {
    /// Create an invalid value error
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

// Re-export main types
pub use case::{Expectation, TestCaseSpec};
pub use command::CommandSpec;
pub use loader::{Config, ConfigLoader, EnvOverrides};
pub use manifest::{Backend, HarnessSection, Manifest, MANIFEST_FILE};
pub use service::{HealthCheck, PortSpec, ServiceSpec};
pub use target::{TargetKind, TargetSpec};
