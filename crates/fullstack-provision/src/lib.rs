//! Service provisioning for full-stack test runs
//!
//! Provides the environment a test run executes against:
//! - Service backends behind [`ServiceController`] (containers, host processes)
//! - Health polling with bounded exponential backoff
//! - Endpoint discovery (container port -> host port)
//! - Unconditional teardown, including on early return or panic
//! - Run-level cancellation

pub mod controller;
pub mod docker;
pub mod endpoint;
pub mod environment;
pub mod error;
pub mod health;
pub mod process;
pub mod shutdown;

// Re-export main types
pub use controller::{ServiceController, ServiceHandle};
pub use docker::DockerController;
pub use endpoint::Endpoint;
pub use environment::{Environment, Provisioner};
pub use error::{ProvisionError, ProvisionResult};
pub use health::Backoff;
pub use process::ProcessController;
pub use shutdown::{Shutdown, ShutdownSignal};
