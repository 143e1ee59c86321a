//! Run reports - the single outcome of a harness invocation

use crate::testing::error::ExecutionError;
use crate::testing::result::{TestResult, TestStatus};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use fullstack_build::BuildArtifact;
use serde::Serialize;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

/// Every result passed (skipped allowed)
pub const EXIT_SUCCESS: u8 = 0;
/// At least one case failed, errored, timed out or could not start
pub const EXIT_TEST_FAILURE: u8 = 1;
/// Services could not be provisioned
pub const EXIT_PROVISION_FAILURE: u8 = 2;
/// Artifacts could not be built
pub const EXIT_BUILD_FAILURE: u8 = 3;
/// Invalid configuration or command line
pub const EXIT_USAGE: u8 = 4;

/// Overall status of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Passed,
    Failed,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Passed => write!(f, "passed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Stage at which the infrastructure could not be established
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Provision,
    Build,
}

/// Provisioning or build failure that prevented the cases from running
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HarnessFailure {
    pub stage: Stage,
    pub message: String,
    /// Captured service or build log
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log: Option<String>,
}

/// A selected case that could not be started
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnsatisfiedCase {
    pub id: String,
    pub reason: String,
}

impl From<&ExecutionError> for UnsatisfiedCase {
    fn from(error: &ExecutionError) -> Self {
        Self {
            id: error.case().unwrap_or_default().to_string(),
            reason: error.to_string(),
        }
    }
}

/// Outcome of a run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Results in completion order
    pub results: Vec<TestResult>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub unsatisfied: Vec<UnsatisfiedCase>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub harness_failure: Option<HarnessFailure>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<BuildArtifact>,
    /// The run was interrupted
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub cancelled: bool,
}

impl RunReport {
    /// Empty report of a run that just started
    pub fn new(run_id: impl Into<String>, started_at: DateTime<Utc>) -> Self {
        Self {
            run_id: run_id.into(),
            status: RunStatus::Passed,
            started_at,
            finished_at: started_at,
            results: Vec::new(),
            unsatisfied: Vec::new(),
            harness_failure: None,
            artifacts: Vec::new(),
            cancelled: false,
        }
    }

    /// Stamp the finish time and derive the overall status
    pub fn finish(mut self, finished_at: DateTime<Utc>) -> Self {
        self.finished_at = finished_at;
        self.status = if self.cancelled {
            RunStatus::Failed
        } else {
            overall_status(
                &self.results,
                !self.unsatisfied.is_empty(),
                self.harness_failure.is_some(),
            )
        };
        self
    }

    /// Number of results with the given status
    pub fn count(&self, status: TestStatus) -> usize {
        self.results.iter().filter(|r| r.status == status).count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &TestResult> {
        self.results.iter().filter(|r| r.is_failure())
    }

    /// Process exit code for this report
    pub fn exit_code(&self) -> u8 {
        match &self.harness_failure {
            Some(HarnessFailure {
                stage: Stage::Provision,
                ..
            }) => EXIT_PROVISION_FAILURE,
            Some(HarnessFailure {
                stage: Stage::Build, ..
            }) => EXIT_BUILD_FAILURE,
            None if self.status == RunStatus::Failed => EXIT_TEST_FAILURE,
            None => EXIT_SUCCESS,
        }
    }

    /// Write the report; JSON for `.json` paths, a key/value table otherwise
    pub fn write_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let content = if is_json {
            serde_json::to_string_pretty(self).context("Failed to serialize report")?
        } else {
            self.to_table()
        };

        fs::write(path, content)
            .with_context(|| format!("Failed to write report to {}", path.display()))
    }

    /// Tab-separated key/value rendering
    pub fn to_table(&self) -> String {
        let mut rows: Vec<(String, String)> = vec![
            ("run_id".into(), self.run_id.clone()),
            ("status".into(), self.status.to_string()),
            ("exit_code".into(), self.exit_code().to_string()),
            ("started_at".into(), self.started_at.to_rfc3339()),
            ("finished_at".into(), self.finished_at.to_rfc3339()),
            ("total".into(), self.results.len().to_string()),
        ];
        for status in [
            TestStatus::Passed,
            TestStatus::Failed,
            TestStatus::Errored,
            TestStatus::TimedOut,
            TestStatus::Skipped,
        ] {
            rows.push((status.label().to_string(), self.count(status).to_string()));
        }
        rows.push(("unsatisfied".into(), self.unsatisfied.len().to_string()));
        if self.cancelled {
            rows.push(("cancelled".into(), "true".into()));
        }

        if let Some(failure) = &self.harness_failure {
            let stage = match failure.stage {
                Stage::Provision => "provision",
                Stage::Build => "build",
            };
            rows.push(("harness_failure".into(), stage.to_string()));
            rows.push(("harness_message".into(), one_line(&failure.message)));
        }
        for result in &self.results {
            rows.push((format!("test.{}", result.id), result.status.to_string()));
            rows.push((
                format!("duration_ms.{}", result.id),
                result.duration.as_millis().to_string(),
            ));
        }
        for case in &self.unsatisfied {
            rows.push((format!("unsatisfied.{}", case.id), one_line(&case.reason)));
        }

        let mut table = String::new();
        for (key, value) in rows {
            let _ = writeln!(table, "{}\t{}", key, value);
        }
        table
    }
}

/// Failed if any result failed, errored or timed out, any case could not
/// start, or the infrastructure could not be established
pub fn overall_status(results: &[TestResult], unsatisfied: bool, harness_failure: bool) -> RunStatus {
    if harness_failure || unsatisfied || results.iter().any(TestResult::is_failure) {
        RunStatus::Failed
    } else {
        RunStatus::Passed
    }
}

fn one_line(text: &str) -> String {
    text.replace(['\t', '\n', '\r'], " ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::error::DependencyKind;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use std::time::Duration;
    use tempfile::TempDir;

    fn result(id: &str, status: TestStatus) -> TestResult {
        TestResult {
            id: id.to_string(),
            status,
            duration: Duration::from_millis(12),
            output: String::new(),
            exit_code: None,
            message: None,
        }
    }

    fn report(results: Vec<TestResult>) -> RunReport {
        let mut report = RunReport::new("run-1", Utc::now());
        report.results = results;
        report.finish(Utc::now())
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(report(vec![]).exit_code(), EXIT_SUCCESS);
        assert_eq!(
            report(vec![result("a", TestStatus::Passed), result("b", TestStatus::Skipped)])
                .exit_code(),
            EXIT_SUCCESS
        );
        assert_eq!(
            report(vec![result("a", TestStatus::TimedOut)]).exit_code(),
            EXIT_TEST_FAILURE
        );

        let mut provision = RunReport::new("run-1", Utc::now());
        provision.harness_failure = Some(HarnessFailure {
            stage: Stage::Provision,
            message: "db unhealthy".to_string(),
            log: None,
        });
        let provision = provision.finish(Utc::now());
        assert_eq!(provision.status, RunStatus::Failed);
        assert_eq!(provision.exit_code(), EXIT_PROVISION_FAILURE);

        let mut build = RunReport::new("run-1", Utc::now());
        build.harness_failure = Some(HarnessFailure {
            stage: Stage::Build,
            message: "compile error".to_string(),
            log: Some("error[E0308]".to_string()),
        });
        assert_eq!(build.finish(Utc::now()).exit_code(), EXIT_BUILD_FAILURE);
    }

    #[test]
    fn test_unsatisfied_cases_fail_the_run() {
        let mut report = RunReport::new("run-1", Utc::now());
        report.results = vec![result("a", TestStatus::Passed)];
        report.unsatisfied = vec![UnsatisfiedCase::from(&ExecutionError::MissingDependency {
            case: "b".to_string(),
            kind: DependencyKind::Service,
            name: "ghost".to_string(),
        })];
        let report = report.finish(Utc::now());

        assert_eq!(report.unsatisfied[0].id, "b");
        assert_eq!(report.status, RunStatus::Failed);
        assert_eq!(report.exit_code(), EXIT_TEST_FAILURE);
    }

    #[test]
    fn test_cancelled_run_fails() {
        let mut report = RunReport::new("run-1", Utc::now());
        report.results = vec![result("a", TestStatus::Skipped)];
        report.cancelled = true;
        let report = report.finish(Utc::now());
        assert_eq!(report.status, RunStatus::Failed);
        assert_eq!(report.exit_code(), EXIT_TEST_FAILURE);
    }

    #[test]
    fn test_write_json() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("out/report.json");
        report(vec![result("smoke", TestStatus::Failed)])
            .write_to(&path)
            .unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["run_id"], "run-1");
        assert_eq!(json["status"], "failed");
        assert_eq!(json["results"][0]["id"], "smoke");
        assert_eq!(json["results"][0]["status"], "failed");
        assert!(json.get("harness_failure").is_none());
    }

    #[test]
    fn test_write_table() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("report.tsv");
        report(vec![
            result("smoke", TestStatus::Passed),
            result("slow", TestStatus::TimedOut),
        ])
        .write_to(&path)
        .unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let rows: Vec<(&str, &str)> = content
            .lines()
            .map(|l| l.split_once('\t').unwrap())
            .collect();
        assert!(rows.contains(&("status", "failed")));
        assert!(rows.contains(&("exit_code", "1")));
        assert!(rows.contains(&("passed", "1")));
        assert!(rows.contains(&("timed-out", "1")));
        assert!(rows.contains(&("test.slow", "timed-out")));
        assert!(rows.contains(&("duration_ms.smoke", "12")));
    }

    fn any_status() -> impl Strategy<Value = TestStatus> {
        prop_oneof![
            Just(TestStatus::Passed),
            Just(TestStatus::Failed),
            Just(TestStatus::Errored),
            Just(TestStatus::Skipped),
            Just(TestStatus::TimedOut),
        ]
    }

    proptest! {
        #[test]
        fn prop_failed_iff_any_failure(statuses in prop::collection::vec(any_status(), 0..20)) {
            let results: Vec<_> = statuses
                .iter()
                .enumerate()
                .map(|(i, s)| result(&format!("case-{}", i), *s))
                .collect();
            let expected = if statuses.iter().any(|s| s.is_failure()) {
                RunStatus::Failed
            } else {
                RunStatus::Passed
            };
            prop_assert_eq!(overall_status(&results, false, false), expected);
            prop_assert_eq!(overall_status(&results, false, true), RunStatus::Failed);
        }

        #[test]
        fn prop_status_independent_of_completion_order(
            statuses in prop::collection::vec(any_status(), 0..20),
        ) {
            let results: Vec<_> = statuses
                .iter()
                .enumerate()
                .map(|(i, s)| result(&format!("case-{}", i), *s))
                .collect();
            let mut reversed = results.clone();
            reversed.reverse();
            prop_assert_eq!(
                overall_status(&results, false, false),
                overall_status(&reversed, false, false)
            );
        }
    }
}
