//! Docker-compatible container backend
//!
//! Drives the `docker` CLI (or a compatible one such as `podman`). Every
//! container is labelled with the run id so leftovers can be identified.

use crate::controller::{sanitize, tail, ServiceController, ServiceHandle};
use crate::endpoint::{parse_port_binding, Endpoint};
use crate::error::{ProvisionError, ProvisionResult};
use async_trait::async_trait;
use fullstack_config::{CommandSpec, ServiceSpec};
use std::process::{Output, Stdio};
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Label carrying the run id
pub const RUN_LABEL: &str = "fullstack.run";

/// Label carrying the service name
pub const SERVICE_LABEL: &str = "fullstack.service";

const LOG_TAIL_LINES: usize = 50;

/// Containers via a Docker-compatible CLI
pub struct DockerController {
    program: String,
}

impl DockerController {
    /// Use the given CLI program (`docker`, `podman`)
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Container name for a service in a run
    pub fn container_name(run_id: &str, service: &str) -> String {
        format!("fullstack-{}-{}", sanitize(run_id), sanitize(service))
    }

    /// Arguments of the `run` invocation for a service
    pub fn run_args(spec: &ServiceSpec, run_id: &str) -> ProvisionResult<Vec<String>> {
        let image = spec.image.as_ref().ok_or_else(|| ProvisionError::InvalidSpec {
            service: spec.name.clone(),
            backend: "docker",
            reason: "no image configured".to_string(),
        })?;

        let mut args = vec![
            "run".to_string(),
            "--detach".to_string(),
            "--name".to_string(),
            Self::container_name(run_id, &spec.name),
            "--label".to_string(),
            format!("{}={}", RUN_LABEL, run_id),
            "--label".to_string(),
            format!("{}={}", SERVICE_LABEL, spec.name),
        ];

        for port in &spec.ports {
            args.push("--publish".to_string());
            args.push(match port.host() {
                Some(host) => format!("127.0.0.1:{}:{}", host, port.container()),
                None => format!("127.0.0.1::{}", port.container()),
            });
        }

        for (key, value) in &spec.env {
            args.push("--env".to_string());
            args.push(format!("{}={}", key, value));
        }

        args.push(image.clone());
        if let Some(command) = &spec.command {
            args.extend(command.to_argv());
        }

        Ok(args)
    }

    async fn cli<I, S>(&self, args: I) -> std::io::Result<Output>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<std::ffi::OsStr>,
    {
        Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
    }
}

#[async_trait]
impl ServiceController for DockerController {
    fn backend(&self) -> &'static str {
        "docker"
    }

    async fn start(&self, spec: &ServiceSpec, run_id: &str) -> ProvisionResult<ServiceHandle> {
        let args = Self::run_args(spec, run_id)?;
        let name = Self::container_name(run_id, &spec.name);
        debug!(service = %spec.name, command = %args.join(" "), "starting container");

        let output = self
            .cli(&args)
            .await
            .map_err(|e| ProvisionError::StartFailed {
                service: spec.name.clone(),
                reason: format!("could not run {}: {}", self.program, e),
            })?;

        if !output.status.success() {
            // `run` can fail after the container was created (e.g. port clash)
            let _ = self.cli(["rm", "--force", name.as_str()]).await;
            return Err(ProvisionError::StartFailed {
                service: spec.name.clone(),
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let id = String::from_utf8_lossy(&output.stdout).trim().to_string();
        info!(service = %spec.name, container = %name, "container started");
        Ok(ServiceHandle::new(&spec.name, if id.is_empty() { name } else { id }))
    }

    async fn endpoint(
        &self,
        handle: &ServiceHandle,
        spec: &ServiceSpec,
    ) -> ProvisionResult<Endpoint> {
        let mut endpoint = Endpoint::local();

        for port in &spec.ports {
            let host_port = match port.host() {
                Some(host) => host,
                None => {
                    let binding = format!("{}/tcp", port.container());
                    let output = self
                        .cli(["port", handle.id.as_str(), binding.as_str()])
                        .await
                        .map_err(|e| ProvisionError::EndpointUnavailable {
                            service: handle.service.clone(),
                            reason: e.to_string(),
                        })?;
                    parse_port_binding(&String::from_utf8_lossy(&output.stdout)).ok_or_else(
                        || ProvisionError::EndpointUnavailable {
                            service: handle.service.clone(),
                            reason: format!("port {} is not published", port.container()),
                        },
                    )?
                }
            };
            endpoint = endpoint.with_port(port.container(), host_port);
        }

        Ok(endpoint)
    }

    async fn exec(&self, handle: &ServiceHandle, command: &CommandSpec) -> std::io::Result<bool> {
        let mut args = vec!["exec".to_string(), handle.id.clone()];
        args.extend(command.to_argv());
        Ok(self.cli(&args).await?.status.success())
    }

    async fn is_running(&self, handle: &ServiceHandle) -> bool {
        match self
            .cli(["inspect", "--format", "{{.State.Running}}", handle.id.as_str()])
            .await
        {
            Ok(output) => String::from_utf8_lossy(&output.stdout).trim() == "true",
            Err(_) => false,
        }
    }

    async fn logs(&self, handle: &ServiceHandle) -> String {
        let tail_arg = LOG_TAIL_LINES.to_string();
        match self
            .cli(["logs", "--tail", tail_arg.as_str(), handle.id.as_str()])
            .await
        {
            Ok(output) => {
                let mut logs = String::from_utf8_lossy(&output.stdout).to_string();
                logs.push_str(&String::from_utf8_lossy(&output.stderr));
                tail(&logs, LOG_TAIL_LINES)
            }
            Err(e) => format!("<logs unavailable: {}>", e),
        }
    }

    async fn stop(&self, handle: &ServiceHandle) -> ProvisionResult<()> {
        let output = self
            .cli(["rm", "--force", "--volumes", handle.id.as_str()])
            .await
            .map_err(|e| ProvisionError::StopFailed {
                service: handle.service.clone(),
                reason: e.to_string(),
            })?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() && !stderr.contains("No such container") {
            return Err(ProvisionError::StopFailed {
                service: handle.service.clone(),
                reason: stderr.trim().to_string(),
            });
        }

        info!(service = %handle.service, "container removed");
        Ok(())
    }

    fn stop_blocking(&self, handle: &ServiceHandle) {
        let result = std::process::Command::new(&self.program)
            .args(["rm", "--force", "--volumes", handle.id.as_str()])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
        if let Err(e) = result {
            warn!(service = %handle.service, error = %e, "failed to remove container");
        }
    }
}
