//! Configuration Loader
//!
//! Finds `full-stack.toml`, applies environment overrides, and collects test
//! cases from the manifest and from case files under `harness.cases`.

use crate::case::TestCaseSpec;
use crate::manifest::{parse_toml, read_config, validate_cases, Backend, CaseFile, Manifest};
use crate::{ConfigError, ConfigResult, MANIFEST_FILE};
use std::env;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Environment overrides, captured once at startup
///
/// - `FULLSTACK_WORKERS` - worker count
/// - `FULLSTACK_TIMEOUT` - per-case timeout in seconds
/// - `FULLSTACK_BACKEND` - `docker` or `process`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvOverrides {
    pub workers: Option<String>,
    pub timeout: Option<String>,
    pub backend: Option<String>,
}

impl EnvOverrides {
    /// Read overrides from the process environment
    pub fn from_env() -> Self {
        Self {
            workers: env::var("FULLSTACK_WORKERS").ok(),
            timeout: env::var("FULLSTACK_TIMEOUT").ok(),
            backend: env::var("FULLSTACK_BACKEND").ok(),
        }
    }

    /// No overrides
    pub fn none() -> Self {
        Self::default()
    }
}

/// Configuration loader
pub struct ConfigLoader {
    overrides: EnvOverrides,
}

/// Loaded configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Manifest with environment overrides applied
    pub manifest: Manifest,

    /// Path of the manifest file
    pub manifest_path: PathBuf,

    /// Project root (directory containing the manifest)
    pub root: PathBuf,

    /// Every case: inline cases first, then case files in path order
    pub cases: Vec<TestCaseSpec>,
}

impl ConfigLoader {
    /// Create a loader using the process environment for overrides
    pub fn new() -> Self {
        Self::with_overrides(EnvOverrides::from_env())
    }

    /// Create a loader with explicit overrides
    pub fn with_overrides(overrides: EnvOverrides) -> Self {
        Self { overrides }
    }

    /// Find the manifest by walking up from `start_dir`
    pub fn find_manifest(start_dir: &Path) -> ConfigResult<PathBuf> {
        let mut current = start_dir.to_path_buf();

        loop {
            let candidate = current.join(MANIFEST_FILE);
            if candidate.is_file() {
                return Ok(candidate);
            }

            match current.parent() {
                Some(parent) => current = parent.to_path_buf(),
                None => return Err(ConfigError::NotFound(start_dir.join(MANIFEST_FILE))),
            }
        }
    }

    /// Load configuration starting from the given directory
    pub fn load_from_directory(&self, start_dir: &Path) -> ConfigResult<Config> {
        let path = Self::find_manifest(start_dir)?;
        self.load_from_file(&path)
    }

    /// Load configuration from a specific manifest file
    pub fn load_from_file(&self, path: &Path) -> ConfigResult<Config> {
        let manifest = Manifest::load_from_file(path)?;
        let manifest = self.apply_env_overrides(manifest)?;
        manifest.validate()?;

        let root = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        let mut cases = manifest.tests.clone();
        cases.extend(discover_cases(&root, &manifest.harness.cases)?);
        validate_cases(&cases)?;

        Ok(Config {
            manifest,
            manifest_path: path.to_path_buf(),
            root,
            cases,
        })
    }

    /// Apply environment overrides to the manifest
    fn apply_env_overrides(&self, mut manifest: Manifest) -> ConfigResult<Manifest> {
        if let Some(workers) = &self.overrides.workers {
            let workers = workers.trim().parse::<usize>().map_err(|_| {
                ConfigError::invalid("FULLSTACK_WORKERS", format!("'{}' is not a number", workers))
            })?;
            manifest.harness.workers = Some(workers);
        }

        if let Some(timeout) = &self.overrides.timeout {
            let timeout = timeout.trim().parse::<u64>().map_err(|_| {
                ConfigError::invalid("FULLSTACK_TIMEOUT", format!("'{}' is not a number", timeout))
            })?;
            manifest.harness.timeout = Some(timeout);
        }

        if let Some(backend) = &self.overrides.backend {
            manifest.harness.backend = Some(backend.parse::<Backend>()?);
        }

        Ok(manifest)
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    /// Resolve a path relative to the project root
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    /// Absolute-or-root-relative output directory
    pub fn output_dir(&self) -> PathBuf {
        self.resolve(&self.manifest.output_dir())
    }
}

/// Collect `[[test]]` tables from every `*.toml` file under the case directories
fn discover_cases(root: &Path, dirs: &[PathBuf]) -> ConfigResult<Vec<TestCaseSpec>> {
    let mut cases = Vec::new();

    for dir in dirs {
        let dir = if dir.is_absolute() {
            dir.clone()
        } else {
            root.join(dir)
        };
        if !dir.is_dir() {
            return Err(ConfigError::InvalidPath(dir));
        }

        for entry in WalkDir::new(&dir)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter()
            .filter_map(Result::ok)
        {
            let path = entry.path();
            if !entry.file_type().is_file() || path.extension() != Some(OsStr::new("toml")) {
                continue;
            }

            let content = read_config(path)?;
            let file: CaseFile = parse_toml(path, &content)?;
            cases.extend(file.tests.into_iter().map(|mut case| {
                case.source = Some(path.to_path_buf());
                case
            }));
        }
    }

    Ok(cases)
}
