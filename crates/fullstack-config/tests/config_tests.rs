//! Manifest loading and validation tests

use fullstack_config::{
    Backend, CommandSpec, ConfigError, ConfigLoader, EnvOverrides, Expectation, HealthCheck,
    PortSpec, TargetKind, MANIFEST_FILE,
};
use pretty_assertions::assert_eq;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn loader() -> ConfigLoader {
    ConfigLoader::with_overrides(EnvOverrides::none())
}

fn create_manifest(dir: &Path, content: &str) -> std::path::PathBuf {
    let path = dir.join(MANIFEST_FILE);
    fs::write(&path, content).unwrap();
    path
}

// ============================================================================
// Loading
// ============================================================================

#[test]
fn test_load_complete_manifest() {
    let temp_dir = TempDir::new().unwrap();
    create_manifest(
        temp_dir.path(),
        r#"
[harness]
workers = 4
timeout = 120
report = "target/full-stack/report.json"

[[service]]
name = "db"
image = "postgres:16"
env = { POSTGRES_PASSWORD = "test" }
ports = [5432]
readiness_timeout = 10
health = { kind = "command", command = ["pg_isready", "-U", "postgres"] }

[[target]]
name = "app.wasm"
kind = "wasm"
package = "app"
artifact = "cargo/wasm32-unknown-unknown/release/app.wasm"

[[test]]
id = "smoke"
command = "true"
services = ["db"]
artifacts = ["app.wasm"]
"#,
    );

    let config = loader().load_from_directory(temp_dir.path()).unwrap();
    let manifest = &config.manifest;

    assert_eq!(config.root, temp_dir.path());
    assert_eq!(manifest.workers(), 4);
    assert_eq!(manifest.backend(), Backend::Docker);

    let db = manifest.service("db").unwrap();
    assert_eq!(db.ports, vec![PortSpec::Container(5432)]);
    assert_eq!(
        db.health,
        HealthCheck::Command {
            command: CommandSpec::argv(["pg_isready", "-U", "postgres"])
        }
    );

    let app = manifest.target("app.wasm").unwrap();
    assert_eq!(app.kind, TargetKind::Wasm);

    assert_eq!(config.cases.len(), 1);
    assert_eq!(config.cases[0].expect, Expectation::Pass);
    assert_eq!(
        config.cases[0].source.as_deref(),
        Some(temp_dir.path().join(MANIFEST_FILE).as_path())
    );
}

#[test]
fn test_output_dir_resolves_against_root() {
    let temp_dir = TempDir::new().unwrap();
    let path = create_manifest(temp_dir.path(), "[harness]\noutput_dir = \"out\"\n");

    let config = loader().load_from_file(&path).unwrap();
    assert_eq!(config.output_dir(), temp_dir.path().join("out"));
}

// ============================================================================
// Errors
// ============================================================================

#[test]
fn test_invalid_toml_reports_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = create_manifest(temp_dir.path(), "[harness\n");

    match loader().load_from_file(&path) {
        Err(ConfigError::TomlParseError { file, .. }) => assert_eq!(file, path),
        other => panic!("expected parse error, got {:?}", other),
    }
}

#[test]
fn test_escaping_artifact_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let path = create_manifest(
        temp_dir.path(),
        r#"
[[target]]
name = "app"
artifact = "../../etc/passwd"
"#,
    );

    assert!(matches!(
        loader().load_from_file(&path),
        Err(ConfigError::InvalidPath(_))
    ));
}

#[test]
fn test_nonexistent_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("missing.toml");

    assert!(matches!(
        loader().load_from_file(&path),
        Err(ConfigError::NotFound(_))
    ));
}

#[test]
fn test_case_file_rejects_other_sections() {
    let temp_dir = TempDir::new().unwrap();
    let path = create_manifest(temp_dir.path(), "[harness]\ncases = [\"cases\"]\n");
    fs::create_dir(temp_dir.path().join("cases")).unwrap();
    fs::write(
        temp_dir.path().join("cases").join("bad.toml"),
        "[[service]]\nname = \"db\"\n",
    )
    .unwrap();

    assert!(matches!(
        loader().load_from_file(&path),
        Err(ConfigError::TomlParseError { .. })
    ));
}
