//! Provisioned environments
//!
//! [`Provisioner::provision`] brings up every service of a run and hands back
//! an [`Environment`]. The environment owns the started services: they are
//! stopped by [`Environment::teardown`], or by `Drop` if the run never got
//! that far.

use crate::controller::{ServiceController, ServiceHandle};
use crate::endpoint::Endpoint;
use crate::error::{ProvisionError, ProvisionResult};
use crate::health::{wait_ready, Backoff};
use crate::shutdown::ShutdownSignal;
use fullstack_config::ServiceSpec;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Starts the services of a run
pub struct Provisioner {
    controller: Arc<dyn ServiceController>,
    run_id: String,
    backoff: Backoff,
}

impl Provisioner {
    /// Create a provisioner for one run
    pub fn new(controller: Arc<dyn ServiceController>, run_id: impl Into<String>) -> Self {
        Self {
            controller,
            run_id: run_id.into(),
            backoff: Backoff::default(),
        }
    }

    /// Override the health-check backoff
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Start every service in order and wait for each to become healthy
    ///
    /// On failure all services started so far are stopped before the error
    /// is returned.
    pub async fn provision(
        &self,
        specs: &[ServiceSpec],
        shutdown: &ShutdownSignal,
    ) -> ProvisionResult<Environment> {
        let mut environment = Environment::empty(Arc::clone(&self.controller));
        let mut shutdown = shutdown.clone();

        for spec in specs {
            if let Err(e) = self.provision_one(spec, &mut environment, &mut shutdown).await {
                warn!(service = %spec.name, error = %e, "provisioning failed, tearing down");
                environment.teardown().await;
                return Err(e);
            }
        }

        Ok(environment)
    }

    async fn provision_one(
        &self,
        spec: &ServiceSpec,
        environment: &mut Environment,
        shutdown: &mut ShutdownSignal,
    ) -> ProvisionResult<()> {
        let cancelled = || ProvisionError::Cancelled {
            service: spec.name.clone(),
        };
        if shutdown.is_triggered() {
            return Err(cancelled());
        }

        let start = Instant::now();
        info!(
            service = %spec.name,
            backend = self.controller.backend(),
            "starting service"
        );

        // Not raced against cancellation: the handle must be recorded to be
        // torn down
        let handle = self.controller.start(spec, &self.run_id).await?;
        environment.started.push(handle.clone());

        let endpoint = self.controller.endpoint(&handle, spec).await?;
        wait_ready(
            self.controller.as_ref(),
            &handle,
            spec,
            &endpoint,
            self.backoff.clone(),
            shutdown,
        )
        .await?;

        info!(
            service = %spec.name,
            host = %endpoint.host,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "service ready"
        );
        environment.endpoints.insert(spec.name.clone(), endpoint);
        Ok(())
    }
}

/// Running services of a run
pub struct Environment {
    controller: Arc<dyn ServiceController>,
    started: Vec<ServiceHandle>,
    endpoints: BTreeMap<String, Endpoint>,
}

impl Environment {
    /// Environment with no services
    pub fn empty(controller: Arc<dyn ServiceController>) -> Self {
        Self {
            controller,
            started: Vec::new(),
            endpoints: BTreeMap::new(),
        }
    }

    /// Endpoints by service name
    pub fn endpoints(&self) -> &BTreeMap<String, Endpoint> {
        &self.endpoints
    }

    pub fn endpoint(&self, service: &str) -> Option<&Endpoint> {
        self.endpoints.get(service)
    }

    /// Services still running, in start order
    pub fn services(&self) -> &[ServiceHandle] {
        &self.started
    }

    /// Stop every service in reverse start order
    ///
    /// Safe to call more than once. Failures are logged and returned; every
    /// service is attempted regardless.
    pub async fn teardown(&mut self) -> Vec<ProvisionError> {
        let mut errors = Vec::new();

        while let Some(handle) = self.started.pop() {
            match self.controller.stop(&handle).await {
                Ok(()) => {}
                Err(e) => {
                    warn!(service = %handle.service, error = %e, "teardown failed");
                    errors.push(e);
                }
            }
        }
        self.endpoints.clear();

        errors
    }
}

impl Drop for Environment {
    fn drop(&mut self) {
        while let Some(handle) = self.started.pop() {
            warn!(service = %handle.service, "service still running at drop, stopping");
            self.controller.stop_blocking(&handle);
        }
    }
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Environment")
            .field("backend", &self.controller.backend())
            .field("started", &self.started)
            .field("endpoints", &self.endpoints)
            .finish()
    }
}
