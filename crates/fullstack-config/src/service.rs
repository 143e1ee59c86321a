//! Service dependencies (`[[service]]`)
//!
//! A service is an external dependency (database, broker, mock API) started
//! before any test runs and torn down once the run ends.

use crate::command::CommandSpec;
use crate::names::{check_name, env_key};
use crate::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

fn default_readiness_timeout() -> u64 {
    60
}

fn default_http_path() -> String {
    "/".to_string()
}

/// A service the test suite depends on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceSpec {
    /// Service name, used in test `services` lists and environment variables
    pub name: String,

    /// Container image reference (required by the docker backend)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// Command override (container) or the process to run (process backend)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<CommandSpec>,

    /// Environment passed to the service
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,

    /// Exposed ports
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<PortSpec>,

    /// Readiness probe
    #[serde(default)]
    pub health: HealthCheck,

    /// Seconds to wait for the health check to pass
    #[serde(default = "default_readiness_timeout")]
    pub readiness_timeout: u64,
}

impl ServiceSpec {
    /// Create a service with defaults for everything but the name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: None,
            command: None,
            env: BTreeMap::new(),
            ports: Vec::new(),
            health: HealthCheck::None,
            readiness_timeout: default_readiness_timeout(),
        }
    }

    /// Set the container image
    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }

    /// Set the command
    pub fn with_command(mut self, command: CommandSpec) -> Self {
        self.command = Some(command);
        self
    }

    /// Add an exposed port
    pub fn with_port(mut self, port: PortSpec) -> Self {
        self.ports.push(port);
        self
    }

    /// Set the health check
    pub fn with_health(mut self, health: HealthCheck) -> Self {
        self.health = health;
        self
    }

    /// Set the readiness timeout in seconds
    pub fn with_readiness_timeout(mut self, secs: u64) -> Self {
        self.readiness_timeout = secs;
        self
    }

    /// Readiness timeout as a duration
    pub fn readiness_timeout(&self) -> Duration {
        Duration::from_secs(self.readiness_timeout)
    }

    /// Validate the service definition
    pub fn validate(&self) -> ConfigResult<()> {
        let field = |f: &str| format!("service.{}.{}", self.name, f);

        check_name("service.name", &self.name)?;
        let key = env_key(&self.name);
        if key == "ARTIFACT" || key.starts_with("ARTIFACT_") {
            return Err(ConfigError::invalid(
                "service.name",
                format!("'{}' clashes with the FULLSTACK_ARTIFACT_ variables", self.name),
            ));
        }
        if self.readiness_timeout == 0 {
            return Err(ConfigError::invalid(
                field("readiness_timeout"),
                "must be at least 1 second",
            ));
        }
        if let Some(command) = &self.command {
            if command.is_empty() {
                return Err(ConfigError::invalid(field("command"), "command cannot be empty"));
            }
        }

        match &self.health {
            HealthCheck::Tcp { port } | HealthCheck::Http { port, .. } => {
                if !self.ports.iter().any(|p| p.container() == *port) {
                    return Err(ConfigError::invalid(
                        field("health"),
                        format!("port {} is not listed in ports", port),
                    ));
                }
            }
            HealthCheck::Command { command } if command.is_empty() => {
                return Err(ConfigError::invalid(field("health"), "command cannot be empty"));
            }
            _ => {}
        }

        Ok(())
    }
}

/// An exposed port: either a bare container port or an explicit mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PortSpec {
    /// Container port; the host port is chosen by the backend
    Container(u16),
    /// Container port with an optional fixed host port
    Mapped {
        container: u16,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        host: Option<u16>,
    },
}

impl PortSpec {
    /// Port inside the service
    pub fn container(&self) -> u16 {
        match self {
            Self::Container(port) => *port,
            Self::Mapped { container, .. } => *container,
        }
    }

    /// Fixed host port, if one was requested
    pub fn host(&self) -> Option<u16> {
        match self {
            Self::Container(_) => None,
            Self::Mapped { host, .. } => *host,
        }
    }
}

/// How readiness of a service is established
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum HealthCheck {
    /// Ready as soon as the service is running
    #[default]
    None,
    /// Ready once the command exits with status 0
    Command { command: CommandSpec },
    /// Ready once a TCP connection to the port succeeds
    Tcp { port: u16 },
    /// Ready once `GET http://host:port/path` returns 2xx
    Http {
        port: u16,
        #[serde(default = "default_http_path")]
        path: String,
    },
}

impl HealthCheck {
    /// Short label for logs
    pub fn label(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Command { .. } => "command",
            Self::Tcp { .. } => "tcp",
            Self::Http { .. } => "http",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_service() {
        let toml = r#"
name = "db"
image = "postgres:16"
env = { POSTGRES_PASSWORD = "test" }
ports = [5432, { container = 8080, host = 18080 }]
readiness_timeout = 10
health = { kind = "command", command = ["pg_isready"] }
"#;
        let spec: ServiceSpec = toml::from_str(toml).unwrap();
        assert_eq!(spec.name, "db");
        assert_eq!(spec.image.as_deref(), Some("postgres:16"));
        assert_eq!(spec.ports[0], PortSpec::Container(5432));
        assert_eq!(spec.ports[1].container(), 8080);
        assert_eq!(spec.ports[1].host(), Some(18080));
        assert_eq!(spec.readiness_timeout(), Duration::from_secs(10));
        assert_eq!(spec.health.label(), "command");
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn test_defaults() {
        let spec: ServiceSpec = toml::from_str(r#"name = "cache""#).unwrap();
        assert_eq!(spec.health, HealthCheck::None);
        assert_eq!(spec.readiness_timeout, 60);
        assert!(spec.ports.is_empty());
    }

    #[test]
    fn test_http_health_default_path() {
        let spec: ServiceSpec = toml::from_str(
            r#"
name = "api"
ports = [8080]
health = { kind = "http", port = 8080 }
"#,
        )
        .unwrap();
        assert_eq!(
            spec.health,
            HealthCheck::Http {
                port: 8080,
                path: "/".to_string()
            }
        );
    }

    #[test]
    fn test_health_port_must_be_exposed() {
        let spec = ServiceSpec::new("db")
            .with_port(PortSpec::Container(5432))
            .with_health(HealthCheck::Tcp { port: 6379 });
        let err = spec.validate().unwrap_err();
        assert!(err.to_string().contains("6379"));
    }

    #[test]
    fn test_name_must_be_a_single_component() {
        assert!(ServiceSpec::new("..").validate().is_err());
        assert!(ServiceSpec::new("db/primary").validate().is_err());
        assert!(ServiceSpec::new("db.primary").validate().is_ok());
    }

    #[test]
    fn test_name_clashing_with_artifact_vars_rejected() {
        assert!(ServiceSpec::new("artifact").validate().is_err());
        assert!(ServiceSpec::new("artifact-store").validate().is_err());
        assert!(ServiceSpec::new("artifacts").validate().is_ok());
    }

    #[test]
    fn test_zero_readiness_timeout_rejected() {
        let spec = ServiceSpec::new("db").with_readiness_timeout(0);
        assert!(spec.validate().is_err());
    }

    #[test]
    fn test_unknown_field_rejected() {
        let result: Result<ServiceSpec, _> = toml::from_str(
            r#"
name = "db"
imag = "typo"
"#,
        );
        assert!(result.is_err());
    }
}
