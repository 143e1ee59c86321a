//! Service controller abstraction
//!
//! A [`ServiceController`] owns the lifecycle of isolated services for one
//! backend. The provisioner only talks to services through this trait.

use crate::endpoint::Endpoint;
use crate::error::ProvisionResult;
use async_trait::async_trait;
use fullstack_config::{CommandSpec, ServiceSpec};

/// Handle to a started service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceHandle {
    /// Service name from the manifest
    pub service: String,
    /// Backend identifier (container id, process key)
    pub id: String,
}

impl ServiceHandle {
    /// Create a handle
    pub fn new(service: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            id: id.into(),
        }
    }
}

/// Lifecycle operations for one service backend
#[async_trait]
pub trait ServiceController: Send + Sync {
    /// Backend name for diagnostics
    fn backend(&self) -> &'static str;

    /// Start an isolated instance of the service
    async fn start(&self, spec: &ServiceSpec, run_id: &str) -> ProvisionResult<ServiceHandle>;

    /// Resolve where the started service is reachable
    async fn endpoint(&self, handle: &ServiceHandle, spec: &ServiceSpec)
        -> ProvisionResult<Endpoint>;

    /// Run a command in the service's context; `Ok(true)` on exit status 0
    async fn exec(&self, handle: &ServiceHandle, command: &CommandSpec) -> std::io::Result<bool>;

    /// Whether the service is still running
    async fn is_running(&self, handle: &ServiceHandle) -> bool;

    /// Recent output of the service
    async fn logs(&self, handle: &ServiceHandle) -> String;

    /// Stop and remove the service; stopping an absent service succeeds
    async fn stop(&self, handle: &ServiceHandle) -> ProvisionResult<()>;

    /// Best-effort synchronous stop, used when no runtime is available
    fn stop_blocking(&self, handle: &ServiceHandle);
}

/// Container/file-system safe form of a name
pub(crate) fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect()
}

/// Keep only the last `lines` lines of `text`
pub(crate) fn tail(text: &str, lines: usize) -> String {
    let all: Vec<&str> = text.lines().collect();
    let start = all.len().saturating_sub(lines);
    all[start..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize("DB_main"), "db_main");
        assert_eq!(sanitize("web api"), "web-api");
    }

    #[test]
    fn test_tail() {
        assert_eq!(tail("a\nb\nc\nd", 2), "c\nd");
        assert_eq!(tail("a", 5), "a");
        assert_eq!(tail("", 5), "");
    }
}
