//! Build orchestration
//!
//! Runs the toolchain once per target, each confined to its own directory
//! under the run-scoped output directory, and verifies what it produced.

use crate::artifact::{self, BuildArtifact};
use crate::error::{BuildError, BuildResult};
use fullstack_config::names::file_key;
use fullstack_config::TargetSpec;
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Instant;
use tracing::{debug, info};

/// Name of the saved log inside each target directory
pub const BUILD_LOG_FILE: &str = "build.log";

/// Build configuration
#[derive(Debug, Clone)]
pub struct BuildConfig {
    /// Directory toolchain commands run relative to
    pub project_root: PathBuf,
    /// Run-scoped output directory; nothing is written outside it
    pub out_dir: PathBuf,
    /// Build targets in parallel
    pub parallel: bool,
    /// Environment passed to every toolchain invocation
    pub env: BTreeMap<String, String>,
}

impl BuildConfig {
    /// Create a build configuration
    pub fn new(project_root: impl Into<PathBuf>, out_dir: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
            out_dir: out_dir.into(),
            parallel: true,
            env: BTreeMap::new(),
        }
    }

    /// Set whether to build in parallel
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Add an environment variable for every toolchain invocation
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }
}

/// Drives the platform toolchain
pub struct BuildDriver {
    config: BuildConfig,
}

impl BuildDriver {
    /// Create a new build driver
    pub fn new(config: BuildConfig) -> Self {
        Self { config }
    }

    /// Build every target
    ///
    /// Artifacts are returned in target-name order. If any target fails, the
    /// error of the first failing target (in the same order) is returned.
    pub fn build(&self, targets: &[TargetSpec]) -> BuildResult<Vec<BuildArtifact>> {
        let mut ordered: Vec<&TargetSpec> = targets.iter().collect();
        ordered.sort_by(|a, b| a.name.cmp(&b.name));

        info!(targets = ordered.len(), parallel = self.config.parallel, "building targets");

        let results: Vec<BuildResult<BuildArtifact>> = if self.config.parallel {
            ordered.par_iter().map(|t| self.build_target(t)).collect()
        } else {
            ordered.iter().map(|t| self.build_target(t)).collect()
        };

        results.into_iter().collect()
    }

    /// Directory a target's output is confined to
    pub fn target_dir(&self, target: &TargetSpec) -> PathBuf {
        absolute(&self.config.out_dir).join(file_key(&target.name))
    }

    /// Build a single target
    pub fn build_target(&self, target: &TargetSpec) -> BuildResult<BuildArtifact> {
        let dir = self.target_dir(target);
        fs::create_dir_all(&dir).map_err(|e| BuildError::io(&dir, e))?;

        let argv = target.toolchain_argv();
        let (program, args) = match argv.split_first() {
            Some((program, args)) => (program, args),
            None => {
                return Err(BuildError::ToolchainUnavailable {
                    target: target.name.clone(),
                    program: String::new(),
                    error: "empty command".to_string(),
                })
            }
        };

        let workdir = match &target.workdir {
            Some(workdir) => self.config.project_root.join(workdir),
            None => self.config.project_root.clone(),
        };

        debug!(target = %target.name, command = %argv.join(" "), "invoking toolchain");
        let start = Instant::now();

        let output = Command::new(program)
            .args(args)
            .current_dir(&workdir)
            .env("FULLSTACK_OUT_DIR", &dir)
            .env("CARGO_TARGET_DIR", dir.join("cargo"))
            .envs(&self.config.env)
            .envs(&target.env)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| BuildError::ToolchainUnavailable {
                target: target.name.clone(),
                program: program.clone(),
                error: e.to_string(),
            })?;

        let build_time = start.elapsed();
        let log = format_log(
            &argv,
            &String::from_utf8_lossy(&output.stdout),
            &String::from_utf8_lossy(&output.stderr),
        );

        let log_path = dir.join(BUILD_LOG_FILE);
        fs::write(&log_path, &log).map_err(|e| BuildError::io(&log_path, e))?;

        if !output.status.success() {
            return Err(BuildError::CompilationFailed {
                target: target.name.clone(),
                exit_code: output.status.code(),
                log,
            });
        }

        let path = dir.join(&target.artifact);
        if !path.is_file() {
            return Err(BuildError::MissingArtifact {
                target: target.name.clone(),
                path,
                log,
            });
        }

        let (digest, size) = artifact::inspect(&target.name, target.kind, &path)?;

        info!(
            target = %target.name,
            platform = %target.platform(),
            size,
            elapsed_ms = build_time.as_millis() as u64,
            "artifact built"
        );

        Ok(BuildArtifact {
            id: target.name.clone(),
            kind: target.kind,
            platform: target.platform(),
            path,
            log_path,
            log,
            digest,
            size,
            build_time,
        })
    }
}

/// Command line plus captured streams
fn format_log(argv: &[String], stdout: &str, stderr: &str) -> String {
    let mut log = format!("$ {}\n", argv.join(" "));
    if !stdout.is_empty() {
        log.push_str("STDOUT:\n");
        log.push_str(stdout);
        if !stdout.ends_with('\n') {
            log.push('\n');
        }
    }
    if !stderr.is_empty() {
        log.push_str("STDERR:\n");
        log.push_str(stderr);
        if !stderr.ends_with('\n') {
            log.push('\n');
        }
    }
    log
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_log() {
        let argv = vec!["cargo".to_string(), "build".to_string()];
        let log = format_log(&argv, "compiled", "warning: unused");
        assert_eq!(
            log,
            "$ cargo build\nSTDOUT:\ncompiled\nSTDERR:\nwarning: unused\n"
        );
    }

    #[test]
    fn test_format_log_empty_streams() {
        let argv = vec!["true".to_string()];
        assert_eq!(format_log(&argv, "", ""), "$ true\n");
    }

    #[test]
    fn test_target_dir_is_absolute() {
        let driver = BuildDriver::new(BuildConfig::new(".", "out"));
        let target = fullstack_config::TargetSpec::new(
            "app.wasm",
            fullstack_config::TargetKind::Wasm,
            "app.wasm",
        );
        let dir = driver.target_dir(&target);
        assert!(dir.is_absolute());
        assert!(dir.ends_with("out/app.wasm"));
    }
}
