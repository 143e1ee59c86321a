//! Test reporter - display test results

use crate::testing::report::{RunReport, RunStatus, Stage};
use crate::testing::result::{TestResult, TestStatus};
use colored::*;
use std::io::{self, Write};

/// Lines of captured output shown per failing case
const OUTPUT_TAIL_LINES: usize = 40;

/// Test reporter with output configuration
pub struct TestReporter {
    /// Show a line per result instead of a mark
    verbose: bool,
    /// Results seen so far
    seen: usize,
}

impl TestReporter {
    /// Create a new test reporter
    pub fn new(verbose: bool) -> Self {
        Self { verbose, seen: 0 }
    }

    /// Print progress for a result as it arrives
    pub fn record(&mut self, result: &TestResult) {
        self.seen += 1;
        if self.verbose {
            println!("{}", self.format_progress(result));
        } else {
            print!("{}", self.format_progress(result));
            let _ = io::stdout().flush();
        }
    }

    /// Print the summary of a finished run
    pub fn finish(&self, report: &RunReport) {
        // Marks need a newline before the summary
        if !self.verbose && self.seen > 0 {
            println!();
        }
        print!("{}", self.format_summary(report));
    }

    /// Progress mark (or line, when verbose) for one result
    pub fn format_progress(&self, result: &TestResult) -> String {
        if !self.verbose {
            let mark = result.status.mark().to_string();
            return paint(result.status, &mark).to_string();
        }

        let label = paint(result.status, &result.status.label().to_uppercase()).bold();
        match &result.message {
            Some(message) if result.status != TestStatus::Passed => format!(
                "{} {} ({:.2?}): {}",
                label,
                result.id,
                result.duration,
                message
            ),
            _ => format!("{} {} ({:.2?})", label, result.id, result.duration),
        }
    }

    /// Summary text of a finished run
    pub fn format_summary(&self, report: &RunReport) -> String {
        let mut out = String::new();
        out.push('\n');

        if let Some(failure) = &report.harness_failure {
            let stage = match failure.stage {
                Stage::Provision => "service provisioning failed",
                Stage::Build => "build failed",
            };
            out.push_str(&format!(
                "{} {}\n",
                "Infrastructure could not be established:".red().bold(),
                stage
            ));
            out.push_str(&format!("  {} {}\n", "●".red(), failure.message));
            if let Some(log) = &failure.log {
                for line in tail_lines(log, OUTPUT_TAIL_LINES) {
                    out.push_str(&format!("      {}\n", line.dimmed()));
                }
            }
            out.push_str(&format!("{}\n", "No tests were run.".yellow()));
            out.push_str(&format!("Run: {}\n", report.run_id));
            return out;
        }

        out.push_str(&format!("{}\n", "─".repeat(50)));

        let total = report.results.len() + report.unsatisfied.len();
        let failed = report.failures().count() + report.unsatisfied.len();
        let status = if report.status == RunStatus::Failed {
            "FAILED".red().bold()
        } else {
            "PASSED".green().bold()
        };

        out.push_str(&format!(
            "Test result: {} | {} total, {} passed, {} failed, {} errored, {} timed out, {} skipped\n",
            status,
            total.to_string().bold(),
            report.count(TestStatus::Passed).to_string().green().bold(),
            count(report.count(TestStatus::Failed)),
            count(report.count(TestStatus::Errored)),
            count(report.count(TestStatus::TimedOut)),
            report.count(TestStatus::Skipped),
        ));
        if failed > 0 {
            out.push_str(&format!(
                "{} of {} tests failed\n",
                failed.to_string().red().bold(),
                total
            ));
        }
        let elapsed = (report.finished_at - report.started_at)
            .to_std()
            .unwrap_or_default();
        out.push_str(&format!("Time: {:.2?}\n", elapsed));
        out.push_str(&format!("Run: {}\n", report.run_id));

        if !report.unsatisfied.is_empty() {
            out.push('\n');
            out.push_str(&format!("{}\n", "Not started:".red().bold()));
            for case in &report.unsatisfied {
                out.push_str(&format!("  {} {}\n", "●".red(), case.id.bold()));
                out.push_str(&format!("      {}\n", case.reason.dimmed()));
            }
        }

        let failures: Vec<_> = report.failures().collect();
        if !failures.is_empty() {
            out.push('\n');
            out.push_str(&format!("{}\n", "Failures:".red().bold()));
            out.push('\n');

            for result in failures {
                out.push_str(&format!(
                    "  {} {} ({})\n",
                    "●".red(),
                    result.id.bold(),
                    result.status
                ));
                if let Some(message) = &result.message {
                    out.push_str(&format!("    {}\n", message));
                }
                for line in tail_lines(&result.output, OUTPUT_TAIL_LINES) {
                    out.push_str(&format!("      {}\n", line.dimmed()));
                }
                out.push('\n');
            }
        }

        out
    }
}

fn paint(status: TestStatus, text: &str) -> ColoredString {
    match status {
        TestStatus::Passed => text.green(),
        TestStatus::Failed | TestStatus::Errored => text.red(),
        TestStatus::TimedOut => text.yellow(),
        TestStatus::Skipped => text.cyan(),
    }
}

fn count(n: usize) -> ColoredString {
    if n > 0 {
        n.to_string().red().bold()
    } else {
        n.to_string().normal()
    }
}

fn tail_lines(text: &str, n: usize) -> impl Iterator<Item = &str> {
    let lines: Vec<&str> = text.lines().collect();
    let skip = lines.len().saturating_sub(n);
    lines.into_iter().skip(skip)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::report::{HarnessFailure, UnsatisfiedCase};
    use chrono::Utc;
    use std::time::Duration;

    fn result(id: &str, status: TestStatus, output: &str) -> TestResult {
        TestResult {
            id: id.to_string(),
            status,
            duration: Duration::from_millis(10),
            output: output.to_string(),
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
    fn test_progress_marks() {
        colored::control::set_override(false);
        let reporter = TestReporter::new(false);
        let marks: String = [
            TestStatus::Passed,
            TestStatus::Failed,
            TestStatus::Errored,
            TestStatus::TimedOut,
            TestStatus::Skipped,
        ]
        .into_iter()
        .map(|s| reporter.format_progress(&result("x", s, "")))
        .collect();
        assert_eq!(marks, ".FETS");
    }

    #[test]
    fn test_verbose_line() {
        colored::control::set_override(false);
        let reporter = TestReporter::new(true);
        let mut failed = result("smoke", TestStatus::Failed, "");
        failed.message = Some("exit code 1".to_string());
        let line = reporter.format_progress(&failed);
        assert!(line.starts_with("FAILED smoke"));
        assert!(line.ends_with("exit code 1"));
    }

    #[test]
    fn test_summary_all_pass() {
        colored::control::set_override(false);
        let summary = TestReporter::new(false).format_summary(&report(vec![
            result("a", TestStatus::Passed, ""),
            result("b", TestStatus::Skipped, ""),
        ]));
        assert!(summary.contains("Test result: PASSED | 2 total, 1 passed, 0 failed"));
        assert!(!summary.contains("Failures:"));
        assert!(!summary.contains("tests failed"));
    }

    #[test]
    fn test_summary_with_failures_shows_output() {
        colored::control::set_override(false);
        let summary = TestReporter::new(false).format_summary(&report(vec![
            result("a", TestStatus::Passed, ""),
            result("b", TestStatus::Failed, "assertion failed: left == right"),
        ]));
        assert!(summary.contains("Test result: FAILED"));
        assert!(summary.contains("1 of 2 tests failed"));
        assert!(summary.contains("Failures:"));
        assert!(summary.contains("assertion failed: left == right"));
    }

    #[test]
    fn test_summary_lists_unsatisfied() {
        colored::control::set_override(false);
        let mut report = RunReport::new("run-1", Utc::now());
        report.unsatisfied = vec![UnsatisfiedCase {
            id: "needs-ghost".to_string(),
            reason: "requires undeclared service 'ghost'".to_string(),
        }];
        let summary = TestReporter::new(false).format_summary(&report.finish(Utc::now()));
        assert!(summary.contains("Not started:"));
        assert!(summary.contains("needs-ghost"));
        assert!(summary.contains("1 of 1 tests failed"));
    }

    #[test]
    fn test_summary_infrastructure_failure() {
        colored::control::set_override(false);
        let mut report = RunReport::new("run-1", Utc::now());
        report.harness_failure = Some(HarnessFailure {
            stage: Stage::Build,
            message: "Build of 'app.wasm' failed".to_string(),
            log: Some("error: expected `;`".to_string()),
        });
        let summary = TestReporter::new(false).format_summary(&report.finish(Utc::now()));
        insta::assert_snapshot!(summary.trim(), @r"
Infrastructure could not be established: build failed
  ● Build of 'app.wasm' failed
      error: expected `;`
No tests were run.
Run: run-1
");
    }
}
