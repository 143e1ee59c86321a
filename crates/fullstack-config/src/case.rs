//! Test cases (`[[test]]`)

use crate::command::CommandSpec;
use crate::names::check_name;
use crate::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Expected outcome of a test command
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Expectation {
    /// The command exits with status 0
    #[default]
    Pass,
    /// The command exits with a non-zero status
    Fail,
}

/// A single full-stack test case
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TestCaseSpec {
    /// Unique identifier
    pub id: String,

    /// Command to execute
    pub command: CommandSpec,

    /// Services that must be provisioned
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub services: Vec<String>,

    /// Artifacts that must be built
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<String>,

    /// Resources this case needs exclusive use of
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclusive: Vec<String>,

    /// Expected outcome
    #[serde(default)]
    pub expect: Expectation,

    /// Exact exit code expected, overriding `expect`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expect_exit_code: Option<i32>,

    /// Substring that must appear in the captured output
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expect_output: Option<String>,

    /// Timeout in seconds, overriding the harness default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,

    /// Skip this case, with a reason
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip: Option<String>,

    /// Extra environment for the command
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,

    /// File the case was declared in
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

impl TestCaseSpec {
    /// Create a case expecting success
    pub fn new(id: impl Into<String>, command: CommandSpec) -> Self {
        Self {
            id: id.into(),
            command,
            services: Vec::new(),
            artifacts: Vec::new(),
            exclusive: Vec::new(),
            expect: Expectation::Pass,
            expect_exit_code: None,
            expect_output: None,
            timeout: None,
            skip: None,
            env: BTreeMap::new(),
            source: None,
        }
    }

    /// Require services
    pub fn with_services<I, S>(mut self, services: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.services = services.into_iter().map(Into::into).collect();
        self
    }

    /// Require artifacts
    pub fn with_artifacts<I, S>(mut self, artifacts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.artifacts = artifacts.into_iter().map(Into::into).collect();
        self
    }

    /// Declare exclusive resources
    pub fn with_exclusive<I, S>(mut self, resources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclusive = resources.into_iter().map(Into::into).collect();
        self
    }

    /// Set the expected outcome
    pub fn with_expect(mut self, expect: Expectation) -> Self {
        self.expect = expect;
        self
    }

    /// Set the timeout in seconds
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Some(secs);
        self
    }

    /// Mark as skipped
    pub fn with_skip(mut self, reason: impl Into<String>) -> Self {
        self.skip = Some(reason.into());
        self
    }

    /// Per-case timeout, if set
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout.map(Duration::from_secs)
    }

    /// Whether an exit code satisfies the expectation
    pub fn accepts_exit_code(&self, code: i32) -> bool {
        match (self.expect_exit_code, self.expect) {
            (Some(expected), _) => code == expected,
            (None, Expectation::Pass) => code == 0,
            (None, Expectation::Fail) => code != 0,
        }
    }

    /// Validate the case definition
    pub fn validate(&self) -> ConfigResult<()> {
        check_name("test.id", &self.id)?;
        if self.command.is_empty() {
            return Err(ConfigError::invalid(
                format!("test.{}.command", self.id),
                "command cannot be empty",
            ));
        }
        if self.timeout == Some(0) {
            return Err(ConfigError::invalid(
                format!("test.{}.timeout", self.id),
                "must be at least 1 second",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_parse_case() {
        let case: TestCaseSpec = toml::from_str(
            r#"
id = "smoke"
command = "curl -fsS http://localhost"
services = ["db"]
artifacts = ["app.wasm"]
exclusive = ["db-writer"]
timeout = 30
"#,
        )
        .unwrap();
        assert_eq!(case.id, "smoke");
        assert_eq!(case.expect, Expectation::Pass);
        assert_eq!(case.timeout(), Some(Duration::from_secs(30)));
        assert_eq!(case.exclusive, vec!["db-writer"]);
        assert!(case.validate().is_ok());
    }

    #[rstest]
    #[case(Expectation::Pass, None, 0, true)]
    #[case(Expectation::Pass, None, 1, false)]
    #[case(Expectation::Fail, None, 0, false)]
    #[case(Expectation::Fail, None, 2, true)]
    #[case(Expectation::Pass, Some(3), 3, true)]
    #[case(Expectation::Pass, Some(3), 0, false)]
    fn test_accepts_exit_code(
        #[case] expect: Expectation,
        #[case] exact: Option<i32>,
        #[case] code: i32,
        #[case] accepted: bool,
    ) {
        let mut case = TestCaseSpec::new("t", CommandSpec::shell("true")).with_expect(expect);
        case.expect_exit_code = exact;
        assert_eq!(case.accepts_exit_code(code), accepted);
    }

    #[test]
    fn test_empty_command_rejected() {
        let case = TestCaseSpec::new("t", CommandSpec::shell(""));
        assert!(case.validate().is_err());
    }

    #[test]
    fn test_path_like_ids_rejected() {
        for id in [".", "..", "../run", "api/login"] {
            let case = TestCaseSpec::new(id, CommandSpec::shell("true"));
            assert!(case.validate().is_err(), "{:?} accepted", id);
        }
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let case = TestCaseSpec::new("t", CommandSpec::shell("true")).with_timeout(0);
        assert!(case.validate().is_err());
    }
}
