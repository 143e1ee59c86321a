/// Provisioning error types
use std::time::Duration;
use thiserror::Error;

pub type ProvisionResult<T> = Result<T, ProvisionError>;

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("Service '{service}' cannot be provisioned by the {backend} backend: {reason}")]
    InvalidSpec {
        service: String,
        backend: &'static str,
        reason: String,
    },

    #[error("Service '{service}' failed to start: {reason}")]
    StartFailed { service: String, reason: String },

    #[error("Could not resolve endpoint of service '{service}': {reason}")]
    EndpointUnavailable { service: String, reason: String },

    #[error("Service '{service}' exited before becoming healthy")]
    Exited { service: String, logs: String },

    #[error("Service '{service}' did not pass its health check within {timeout:?}: {last_error}")]
    Unhealthy {
        service: String,
        timeout: Duration,
        last_error: String,
        logs: String,
    },

    #[error("Provisioning of service '{service}' was cancelled")]
    Cancelled { service: String },

    #[error("Service '{service}' could not be stopped: {reason}")]
    StopFailed { service: String, reason: String },
}

impl ProvisionError {
    /// Service the error belongs to
    pub fn service(&self) -> &str {
        match self {
            Self::InvalidSpec { service, .. }
            | Self::StartFailed { service, .. }
            | Self::EndpointUnavailable { service, .. }
            | Self::Exited { service, .. }
            | Self::Unhealthy { service, .. }
            | Self::Cancelled { service }
            | Self::StopFailed { service, .. } => service.as_str(),
        }
    }

    /// Recent service output captured for diagnosis
    pub fn logs(&self) -> Option<&str> {
        match self {
            Self::Exited { logs, .. } | Self::Unhealthy { logs, .. } if !logs.is_empty() => {
                Some(logs.as_str())
            }
            _ => None,
        }
    }
}
