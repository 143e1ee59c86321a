//! Harness manifest (full-stack.toml)
//!
//! The manifest declares harness settings, the services to provision, the
//! targets to build, and (optionally) test cases inline.

use crate::case::TestCaseSpec;
use crate::names::{ensure_distinct, env_key, file_key};
use crate::service::ServiceSpec;
use crate::target::TargetSpec;
use crate::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Manifest file name searched for by the loader
pub const MANIFEST_FILE: &str = "full-stack.toml";

/// Default per-case timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Default output directory, relative to the project root
pub const DEFAULT_OUTPUT_DIR: &str = "target/full-stack";

/// Service backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// One container per service via a Docker-compatible CLI
    #[default]
    Docker,
    /// One host process per service
    Process,
}

impl FromStr for Backend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "docker" => Ok(Self::Docker),
            "process" => Ok(Self::Process),
            other => Err(ConfigError::invalid(
                "backend",
                format!("unknown backend '{}' (expected docker or process)", other),
            )),
        }
    }
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Docker => write!(f, "docker"),
            Self::Process => write!(f, "process"),
        }
    }
}

/// `[harness]` section
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HarnessSection {
    /// Concurrent test workers (default: available parallelism)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,

    /// Default per-case timeout in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,

    /// Directory receiving run-scoped output
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,

    /// Structured report file
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<PathBuf>,

    /// Service backend
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend: Option<Backend>,

    /// Docker-compatible CLI (docker, podman)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_cli: Option<String>,

    /// Directories scanned for case files
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cases: Vec<PathBuf>,
}

/// Parsed full-stack.toml
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    /// Harness settings
    #[serde(default)]
    pub harness: HarnessSection,

    /// Services to provision
    #[serde(default, rename = "service", skip_serializing_if = "Vec::is_empty")]
    pub services: Vec<ServiceSpec>,

    /// Targets to build
    #[serde(default, rename = "target", skip_serializing_if = "Vec::is_empty")]
    pub targets: Vec<TargetSpec>,

    /// Inline test cases
    #[serde(default, rename = "test", skip_serializing_if = "Vec::is_empty")]
    pub tests: Vec<TestCaseSpec>,
}

/// A case file: only `[[test]]` tables are allowed
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct CaseFile {
    #[serde(default, rename = "test")]
    pub tests: Vec<TestCaseSpec>,
}

impl Manifest {
    /// Parse a manifest file
    ///
    /// Not validated: overrides may still change it. See [`Manifest::validate`].
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = read_config(path)?;
        let mut manifest: Self = parse_toml(path, &content)?;
        for case in &mut manifest.tests {
            case.source = Some(path.to_path_buf());
        }
        Ok(manifest)
    }

    /// Validate settings, services, targets and inline cases
    pub fn validate(&self) -> ConfigResult<()> {
        if self.harness.workers == Some(0) {
            return Err(ConfigError::invalid("harness.workers", "must be at least 1"));
        }
        if self.harness.timeout == Some(0) {
            return Err(ConfigError::invalid("harness.timeout", "must be at least 1 second"));
        }
        if let Some(cli) = &self.harness.container_cli {
            if cli.trim().is_empty() {
                return Err(ConfigError::invalid(
                    "harness.container_cli",
                    "cannot be empty",
                ));
            }
        }

        for service in &self.services {
            service.validate()?;
        }
        ensure_unique("service", self.services.iter().map(|s| s.name.as_str()))?;
        ensure_distinct("service", self.services.iter().map(|s| s.name.as_str()), env_key)?;

        for target in &self.targets {
            target.validate()?;
        }
        ensure_unique("target", self.targets.iter().map(|t| t.name.as_str()))?;
        ensure_distinct("target", self.targets.iter().map(|t| t.name.as_str()), env_key)?;

        validate_cases(&self.tests)
    }

    /// Worker count (manifest value, else available parallelism)
    pub fn workers(&self) -> usize {
        self.harness.workers.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }

    /// Default per-case timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.harness.timeout.unwrap_or(DEFAULT_TIMEOUT_SECS))
    }

    /// Output directory, relative to the project root unless absolute
    pub fn output_dir(&self) -> PathBuf {
        self.harness
            .output_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR))
    }

    /// Service backend
    pub fn backend(&self) -> Backend {
        self.harness.backend.unwrap_or_default()
    }

    /// Docker-compatible CLI program
    pub fn container_cli(&self) -> &str {
        self.harness.container_cli.as_deref().unwrap_or("docker")
    }

    /// Look up a service by name
    pub fn service(&self, name: &str) -> Option<&ServiceSpec> {
        self.services.iter().find(|s| s.name == name)
    }

    /// Look up a target by artifact id
    pub fn target(&self, name: &str) -> Option<&TargetSpec> {
        self.targets.iter().find(|t| t.name == name)
    }
}

/// Validate a set of cases, including id uniqueness
pub fn validate_cases(cases: &[TestCaseSpec]) -> ConfigResult<()> {
    for case in cases {
        case.validate()?;
    }
    ensure_unique("test", cases.iter().map(|c| c.id.as_str()))?;
    // Work directories must stay apart on case-insensitive file systems too
    ensure_distinct("test", cases.iter().map(|c| c.id.as_str()), |id| {
        file_key(id).to_lowercase()
    })
}

fn ensure_unique<'a>(kind: &'static str, names: impl Iterator<Item = &'a str>) -> ConfigResult<()> {
    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(name) {
            return Err(ConfigError::DuplicateName {
                kind,
                name: name.to_string(),
            });
        }
    }
    Ok(())
}

pub(crate) fn read_config(path: &Path) -> ConfigResult<String> {
    std::fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ConfigError::NotFound(path.to_path_buf())
        } else {
            ConfigError::IoError {
                path: path.to_path_buf(),
                error: e,
            }
        }
    })
}

pub(crate) fn parse_toml<T: serde::de::DeserializeOwned>(
    path: &Path,
    content: &str,
) -> ConfigResult<T> {
    toml::from_str(content).map_err(|e| ConfigError::TomlParseError {
        file: path.to_path_buf(),
        error: e,
    })
}
