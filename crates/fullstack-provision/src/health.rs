//! Readiness probing with bounded backoff

use crate::controller::{ServiceController, ServiceHandle};
use crate::endpoint::Endpoint;
use crate::error::{ProvisionError, ProvisionResult};
use crate::shutdown::ShutdownSignal;
use fullstack_config::{HealthCheck, ServiceSpec};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout, Instant};
use tracing::debug;

/// Upper bound for a single probe attempt
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Exponential backoff between health probes
#[derive(Debug, Clone)]
pub struct Backoff {
    current: Duration,
    max: Duration,
}

impl Backoff {
    /// Start at `initial`, doubling up to `max`
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            current: initial,
            max,
        }
    }

    /// Delay before the next attempt
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        delay
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_millis(100), Duration::from_secs(2))
    }
}

/// Run the service's health check once
pub async fn probe(
    controller: &dyn ServiceController,
    handle: &ServiceHandle,
    spec: &ServiceSpec,
    endpoint: &Endpoint,
    http: &reqwest::Client,
) -> Result<(), String> {
    match &spec.health {
        HealthCheck::None => Ok(()),

        HealthCheck::Command { command } => match controller.exec(handle, command).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(format!("'{}' exited unsuccessfully", command)),
            Err(e) => Err(format!("'{}' could not run: {}", command, e)),
        },

        HealthCheck::Tcp { port } => {
            let address = endpoint
                .address(*port)
                .ok_or_else(|| format!("port {} has no host mapping", port))?;
            match timeout(PROBE_TIMEOUT, TcpStream::connect(&address)).await {
                Ok(Ok(_)) => Ok(()),
                Ok(Err(e)) => Err(format!("connect to {} failed: {}", address, e)),
                Err(_) => Err(format!("connect to {} timed out", address)),
            }
        }

        HealthCheck::Http { port, path } => {
            let address = endpoint
                .address(*port)
                .ok_or_else(|| format!("port {} has no host mapping", port))?;
            let url = format!("http://{}{}", address, path);
            match http.get(&url).timeout(PROBE_TIMEOUT).send().await {
                Ok(response) if response.status().is_success() => Ok(()),
                Ok(response) => Err(format!("GET {} returned {}", url, response.status())),
                Err(e) => Err(format!("GET {} failed: {}", url, e)),
            }
        }
    }
}

/// Poll the health check until it passes, the service exits, the readiness
/// timeout elapses, or the run is cancelled
pub async fn wait_ready(
    controller: &dyn ServiceController,
    handle: &ServiceHandle,
    spec: &ServiceSpec,
    endpoint: &Endpoint,
    mut backoff: Backoff,
    shutdown: &mut ShutdownSignal,
) -> ProvisionResult<()> {
    let http = reqwest::Client::new();
    let limit = spec.readiness_timeout();
    // `None` when the timeout is too far out to represent
    let deadline = Instant::now().checked_add(limit);
    let mut attempts = 0u32;

    loop {
        if shutdown.is_triggered() {
            return Err(ProvisionError::Cancelled {
                service: spec.name.clone(),
            });
        }

        if !controller.is_running(handle).await {
            return Err(ProvisionError::Exited {
                service: spec.name.clone(),
                logs: controller.logs(handle).await,
            });
        }

        attempts += 1;
        let last_error = match probe(controller, handle, spec, endpoint, &http).await {
            Ok(()) => {
                debug!(service = %spec.name, attempts, "health check passed");
                return Ok(());
            }
            Err(e) => e,
        };
        debug!(service = %spec.name, attempts, error = %last_error, "health check pending");

        let remaining = match deadline {
            Some(deadline) => deadline.saturating_duration_since(Instant::now()),
            None => Duration::MAX,
        };
        if remaining.is_zero() {
            return Err(ProvisionError::Unhealthy {
                service: spec.name.clone(),
                timeout: limit,
                last_error,
                logs: controller.logs(handle).await,
            });
        }

        let delay = backoff.next_delay().min(remaining);
        tokio::select! {
            _ = shutdown.triggered() => {
                return Err(ProvisionError::Cancelled {
                    service: spec.name.clone(),
                });
            }
            _ = sleep(delay) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let mut backoff = Backoff::new(Duration::from_millis(100), Duration::from_millis(500));
        let delays: Vec<_> = (0..5).map(|_| backoff.next_delay().as_millis()).collect();
        assert_eq!(delays, vec![100, 200, 400, 500, 500]);
    }

    #[test]
    fn test_default_backoff() {
        let mut backoff = Backoff::default();
        assert_eq!(backoff.next_delay(), Duration::from_millis(100));
        for _ in 0..10 {
            backoff.next_delay();
        }
        assert_eq!(backoff.next_delay(), Duration::from_secs(2));
    }
}
