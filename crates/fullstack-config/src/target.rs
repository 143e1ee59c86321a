//! Build targets (`[[target]]`)

use crate::names::check_name;
use crate::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

/// WebAssembly target triple used by `wasm` targets
pub const WASM_TRIPLE: &str = "wasm32-unknown-unknown";

/// Kind of build target
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    /// Host-native executable or library
    #[default]
    Native,
    /// WebAssembly module
    Wasm,
}

impl TargetKind {
    /// Target triple passed to the toolchain, if not the host
    pub fn triple(&self) -> Option<&'static str> {
        match self {
            Self::Native => None,
            Self::Wasm => Some(WASM_TRIPLE),
        }
    }
}

impl std::fmt::Display for TargetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Native => write!(f, "native"),
            Self::Wasm => write!(f, "wasm"),
        }
    }
}

/// A build target; its name doubles as the artifact identifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TargetSpec {
    /// Artifact identifier (e.g. "app.wasm")
    pub name: String,

    /// Target kind
    #[serde(default)]
    pub kind: TargetKind,

    /// Cargo package to build (default command only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package: Option<String>,

    /// Explicit toolchain command, replacing the default cargo invocation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<Vec<String>>,

    /// Directory the command runs in, relative to the project root
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workdir: Option<PathBuf>,

    /// Extra environment for the toolchain
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,

    /// Artifact location, relative to the target's output directory
    pub artifact: PathBuf,
}

impl TargetSpec {
    /// Create a new build target
    pub fn new(name: impl Into<String>, kind: TargetKind, artifact: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            kind,
            package: None,
            command: None,
            workdir: None,
            env: BTreeMap::new(),
            artifact: artifact.into(),
        }
    }

    /// Set the cargo package
    pub fn with_package(mut self, package: impl Into<String>) -> Self {
        self.package = Some(package.into());
        self
    }

    /// Set an explicit command
    pub fn with_command<I, S>(mut self, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.command = Some(command.into_iter().map(Into::into).collect());
        self
    }

    /// Platform the artifact is built for
    pub fn platform(&self) -> String {
        match self.kind.triple() {
            Some(triple) => triple.to_string(),
            None => format!("{}-{}", std::env::consts::ARCH, std::env::consts::OS),
        }
    }

    /// Toolchain invocation: the explicit command, or `cargo build --release`
    pub fn toolchain_argv(&self) -> Vec<String> {
        if let Some(command) = &self.command {
            return command.clone();
        }

        let mut argv = vec![
            "cargo".to_string(),
            "build".to_string(),
            "--release".to_string(),
        ];
        if let Some(triple) = self.kind.triple() {
            argv.push("--target".to_string());
            argv.push(triple.to_string());
        }
        if let Some(package) = &self.package {
            argv.push("--package".to_string());
            argv.push(package.clone());
        }
        argv
    }

    /// Validate the target definition
    pub fn validate(&self) -> ConfigResult<()> {
        check_name("target.name", &self.name)?;
        if let Some(command) = &self.command {
            if command.first().map_or(true, |p| p.is_empty()) {
                return Err(ConfigError::invalid(
                    format!("target.{}.command", self.name),
                    "command cannot be empty",
                ));
            }
        }
        if !is_confined(&self.artifact) {
            return Err(ConfigError::InvalidPath(self.artifact.clone()));
        }
        Ok(())
    }
}

/// Relative, non-empty, and never escaping upwards
fn is_confined(path: &Path) -> bool {
    path.components().next().is_some()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_default_wasm_command() {
        let target = TargetSpec::new("app.wasm", TargetKind::Wasm, "app.wasm").with_package("app");
        assert_eq!(
            target.toolchain_argv(),
            vec![
                "cargo",
                "build",
                "--release",
                "--target",
                "wasm32-unknown-unknown",
                "--package",
                "app"
            ]
        );
        assert_eq!(target.platform(), "wasm32-unknown-unknown");
    }

    #[test]
    fn test_explicit_command_wins() {
        let target =
            TargetSpec::new("app", TargetKind::Native, "app").with_command(["make", "app"]);
        assert_eq!(target.toolchain_argv(), vec!["make", "app"]);
    }

    #[test]
    fn test_parse_target() {
        let target: TargetSpec = toml::from_str(
            r#"
name = "app.wasm"
kind = "wasm"
package = "app"
artifact = "cargo/wasm32-unknown-unknown/release/app.wasm"
"#,
        )
        .unwrap();
        assert_eq!(target.kind, TargetKind::Wasm);
        assert!(target.validate().is_ok());
    }

    #[rstest]
    #[case("app.wasm", true)]
    #[case("..", false)]
    #[case(".", false)]
    #[case("web/app", false)]
    fn test_target_name(#[case] name: &str, #[case] ok: bool) {
        let target = TargetSpec::new(name, TargetKind::Native, "app");
        assert_eq!(target.validate().is_ok(), ok);
    }

    #[rstest]
    #[case("app.wasm", true)]
    #[case("./out/app", true)]
    #[case("../escape", false)]
    #[case("/abs/app", false)]
    #[case("", false)]
    fn test_artifact_confinement(#[case] path: &str, #[case] ok: bool) {
        let target = TargetSpec::new("t", TargetKind::Native, path);
        assert_eq!(target.validate().is_ok(), ok);
    }
}
