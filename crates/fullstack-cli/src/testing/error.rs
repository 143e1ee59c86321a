/// Test execution error types
use thiserror::Error;

pub type ExecutionResult<T> = Result<T, ExecutionError>;

/// Why a declared case could not be executed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionError {
    #[error("Test '{case}' requires undeclared {kind} '{name}'")]
    MissingDependency {
        case: String,
        kind: DependencyKind,
        name: String,
    },

    #[error("Could not prepare working directory for '{case}': {reason}")]
    WorkDir { case: String, reason: String },

    #[error("Could not start '{program}': {reason}")]
    Spawn { program: String, reason: String },
}

impl ExecutionError {
    /// Case the error belongs to, if any
    pub fn case(&self) -> Option<&str> {
        match self {
            Self::MissingDependency { case, .. } | Self::WorkDir { case, .. } => Some(case.as_str()),
            Self::Spawn { .. } => None,
        }
    }
}

/// Kind of dependency a case declares
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencyKind {
    Service,
    Artifact,
}

impl std::fmt::Display for DependencyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Service => write!(f, "service"),
            Self::Artifact => write!(f, "artifact"),
        }
    }
}
