/// Build driver error types
use std::path::PathBuf;
use thiserror::Error;

pub type BuildResult<T> = Result<T, BuildError>;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Toolchain '{program}' for target '{target}' could not be started: {error}")]
    ToolchainUnavailable {
        target: String,
        program: String,
        error: String,
    },

    #[error("Compilation failed for target '{target}' (exit code {exit_code:?})")]
    CompilationFailed {
        target: String,
        exit_code: Option<i32>,
        log: String,
    },

    #[error("Target '{target}' built but produced no artifact at {path}")]
    MissingArtifact {
        target: String,
        path: PathBuf,
        log: String,
    },

    #[error("Artifact for target '{target}' at {path} is invalid: {reason}")]
    InvalidArtifact {
        target: String,
        path: PathBuf,
        reason: String,
    },

    #[error("I/O error at {path}: {error}")]
    Io {
        path: PathBuf,
        error: std::io::Error,
    },
}

impl BuildError {
    /// Create an I/O error with path context
    pub fn io(path: impl Into<PathBuf>, error: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            error,
        }
    }

    /// Target the error belongs to, if any
    pub fn target(&self) -> Option<&str> {
        match self {
            Self::ToolchainUnavailable { target, .. }
            | Self::CompilationFailed { target, .. }
            | Self::MissingArtifact { target, .. }
            | Self::InvalidArtifact { target, .. } => Some(target.as_str()),
            Self::Io { .. } => None,
        }
    }

    /// Captured build log, if the toolchain ran
    pub fn log(&self) -> Option<&str> {
        match self {
            Self::CompilationFailed { log, .. } | Self::MissingArtifact { log, .. } => {
                Some(log.as_str())
            }
            _ => None,
        }
    }
}
