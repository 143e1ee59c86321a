//! Host process backend
//!
//! Runs each service's `command` as a child process of the harness. Output
//! goes to `<log_dir>/<service>.log`. Ports are taken to be bound directly
//! on the host.

use crate::controller::{sanitize, tail, ServiceController, ServiceHandle};
use crate::endpoint::Endpoint;
use crate::error::{ProvisionError, ProvisionResult};
use async_trait::async_trait;
use fullstack_config::{CommandSpec, ServiceSpec};
use std::collections::HashMap;
use std::fs::{self, File};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::process::{Child, Command};
use tracing::{info, warn};

const LOG_TAIL_LINES: usize = 50;
const REAP_TIMEOUT: Duration = Duration::from_secs(2);

/// Services as host processes
pub struct ProcessController {
    log_dir: PathBuf,
    children: Mutex<HashMap<String, Child>>,
}

impl ProcessController {
    /// Write service output under `log_dir`
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        Self {
            log_dir: log_dir.into(),
            children: Mutex::new(HashMap::new()),
        }
    }

    fn log_path(&self, service: &str) -> PathBuf {
        self.log_dir.join(format!("{}.log", sanitize(service)))
    }

    fn children(&self) -> MutexGuard<'_, HashMap<String, Child>> {
        // A poisoned map still holds valid children that must be stopped
        self.children.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn start_failed(spec: &ServiceSpec, reason: impl ToString) -> ProvisionError {
        ProvisionError::StartFailed {
            service: spec.name.clone(),
            reason: reason.to_string(),
        }
    }
}

#[async_trait]
impl ServiceController for ProcessController {
    fn backend(&self) -> &'static str {
        "process"
    }

    async fn start(&self, spec: &ServiceSpec, _run_id: &str) -> ProvisionResult<ServiceHandle> {
        let command = spec.command.as_ref().ok_or_else(|| ProvisionError::InvalidSpec {
            service: spec.name.clone(),
            backend: "process",
            reason: "no command configured".to_string(),
        })?;
        let argv = command.to_argv();
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| Self::start_failed(spec, "empty command"))?;

        fs::create_dir_all(&self.log_dir).map_err(|e| Self::start_failed(spec, e))?;
        let log_path = self.log_path(&spec.name);
        let stdout = File::create(&log_path).map_err(|e| Self::start_failed(spec, e))?;
        let stderr = stdout.try_clone().map_err(|e| Self::start_failed(spec, e))?;

        let child = Command::new(program)
            .args(args)
            .envs(&spec.env)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Self::start_failed(spec, format!("could not spawn '{}': {}", program, e)))?;

        let id = format!("{}-{}", sanitize(&spec.name), child.id().unwrap_or_default());
        info!(service = %spec.name, id = %id, "process started");

        self.children().insert(id.clone(), child);
        Ok(ServiceHandle::new(&spec.name, id))
    }

    async fn endpoint(
        &self,
        _handle: &ServiceHandle,
        spec: &ServiceSpec,
    ) -> ProvisionResult<Endpoint> {
        Ok(spec.ports.iter().fold(Endpoint::local(), |endpoint, port| {
            endpoint.with_port(port.container(), port.host().unwrap_or(port.container()))
        }))
    }

    async fn exec(&self, _handle: &ServiceHandle, command: &CommandSpec) -> std::io::Result<bool> {
        let argv = command.to_argv();
        let Some((program, args)) = argv.split_first() else {
            return Ok(false);
        };
        let status = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await?;
        Ok(status.success())
    }

    async fn is_running(&self, handle: &ServiceHandle) -> bool {
        match self.children().get_mut(&handle.id) {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }

    async fn logs(&self, handle: &ServiceHandle) -> String {
        match fs::read_to_string(self.log_path(&handle.service)) {
            Ok(content) => tail(&content, LOG_TAIL_LINES),
            Err(e) => format!("<logs unavailable: {}>", e),
        }
    }

    async fn stop(&self, handle: &ServiceHandle) -> ProvisionResult<()> {
        let Some(mut child) = self.children().remove(&handle.id) else {
            return Ok(());
        };

        if let Err(e) = child.start_kill() {
            // Already exited
            if e.kind() != std::io::ErrorKind::InvalidInput {
                return Err(ProvisionError::StopFailed {
                    service: handle.service.clone(),
                    reason: e.to_string(),
                });
            }
        }
        let _ = child.wait().await;

        info!(service = %handle.service, "process stopped");
        Ok(())
    }

    fn stop_blocking(&self, handle: &ServiceHandle) {
        let Some(mut child) = self.children().remove(&handle.id) else {
            return;
        };
        if let Err(e) = child.start_kill() {
            warn!(service = %handle.service, error = %e, "failed to kill process");
        }
        if !reap(&mut child) {
            warn!(service = %handle.service, "killed process was not reaped");
        }
    }
}

/// Wait, without a runtime, for a killed child to be collected
fn reap(child: &mut Child) -> bool {
    let deadline = Instant::now() + REAP_TIMEOUT;
    loop {
        match child.try_wait() {
            Ok(Some(_)) | Err(_) => return true,
            Ok(None) if Instant::now() >= deadline => return false,
            Ok(None) => std::thread::sleep(Duration::from_millis(10)),
        }
    }
}
