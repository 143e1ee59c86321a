//! Command specifications shared by services, health checks and test cases

use serde::{Deserialize, Serialize};

/// A command to execute, either through the shell or as an argument vector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CommandSpec {
    /// Shell command line (run with `sh -c`)
    Shell(String),
    /// Program followed by its arguments
    Argv(Vec<String>),
}

impl CommandSpec {
    /// Build a shell command
    pub fn shell(command: impl Into<String>) -> Self {
        Self::Shell(command.into())
    }

    /// Build an argument-vector command
    pub fn argv<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Argv(args.into_iter().map(Into::into).collect())
    }

    /// Whether the command has nothing to run
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Shell(command) => command.trim().is_empty(),
            Self::Argv(args) => args.first().map_or(true, |p| p.is_empty()),
        }
    }

    /// Expand into a program and its arguments
    pub fn to_argv(&self) -> Vec<String> {
        match self {
            Self::Shell(command) => vec!["sh".to_string(), "-c".to_string(), command.clone()],
            Self::Argv(args) => args.clone(),
        }
    }
}

impl std::fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Shell(command) => write!(f, "{}", command),
            Self::Argv(args) => write!(f, "{}", args.join(" ")),
        }
    }
}
