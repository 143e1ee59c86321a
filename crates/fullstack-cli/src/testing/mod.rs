//! Full-stack test execution
//!
//! Plans which cases run, executes them against the provisioned environment
//! with bounded concurrency, and reports the outcome.

pub mod error;
pub mod plan;
pub mod report;
pub mod reporter;
pub mod result;
pub mod runner;

pub use error::{ExecutionError, ExecutionResult};
pub use plan::TestPlan;
pub use report::{HarnessFailure, RunReport, Stage, UnsatisfiedCase};
pub use reporter::TestReporter;
pub use result::{TestResult, TestStatus};
pub use runner::{RunContext, TestRunner};
