//! Per-case outcomes

use serde::{Serialize, Serializer};
use std::time::Duration;

/// Terminal state of a test case
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TestStatus {
    Passed,
    Failed,
    Errored,
    Skipped,
    TimedOut,
}

impl TestStatus {
    /// Whether this status fails the run
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed | Self::Errored | Self::TimedOut)
    }

    /// Single-character progress mark
    pub fn mark(&self) -> char {
        match self {
            Self::Passed => '.',
            Self::Failed => 'F',
            Self::Errored => 'E',
            Self::Skipped => 'S',
            Self::TimedOut => 'T',
        }
    }

    /// Label used in verbose output and report files
    pub fn label(&self) -> &'static str {
        match self {
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::Errored => "errored",
            Self::Skipped => "skipped",
            Self::TimedOut => "timed-out",
        }
    }
}

impl std::fmt::Display for TestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Result of running a single case
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestResult {
    /// Case identifier
    pub id: String,
    /// Terminal state
    pub status: TestStatus,
    /// Wall-clock time spent running the command
    #[serde(rename = "duration_ms", serialize_with = "serialize_millis")]
    pub duration: Duration,
    /// Combined stdout and stderr
    pub output: String,
    /// Exit code, when the process exited normally
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    /// Diagnostic for anything but a clean pass
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl TestResult {
    /// Result for a case that never ran
    pub fn skipped(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: TestStatus::Skipped,
            duration: Duration::ZERO,
            output: String::new(),
            exit_code: None,
            message: Some(reason.into()),
        }
    }

    /// Result for a case the harness could not execute properly
    pub fn errored(id: impl Into<String>, message: impl Into<String>, duration: Duration) -> Self {
        Self {
            id: id.into(),
            status: TestStatus::Errored,
            duration,
            output: String::new(),
            exit_code: None,
            message: Some(message.into()),
        }
    }

    pub fn is_failure(&self) -> bool {
        self.status.is_failure()
    }
}

fn serialize_millis<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(duration.as_millis() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_statuses() {
        assert!(!TestStatus::Passed.is_failure());
        assert!(!TestStatus::Skipped.is_failure());
        assert!(TestStatus::Failed.is_failure());
        assert!(TestStatus::Errored.is_failure());
        assert!(TestStatus::TimedOut.is_failure());
    }

    #[test]
    fn test_serialized_form() {
        let result = TestResult {
            id: "smoke".to_string(),
            status: TestStatus::TimedOut,
            duration: Duration::from_millis(1500),
            output: "partial".to_string(),
            exit_code: None,
            message: Some("exceeded 1s".to_string()),
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"], "timed-out");
        assert_eq!(json["duration_ms"], 1500);
        assert!(json.get("exit_code").is_none());
    }
}
