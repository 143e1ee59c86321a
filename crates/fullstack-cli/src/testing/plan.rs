//! Test planning - select cases and what they need

use crate::testing::error::{DependencyKind, ExecutionError};
use fullstack_config::{Config, Manifest, ServiceSpec, TargetSpec, TestCaseSpec};
use std::collections::BTreeSet;

/// What a run executes and what has to exist first
#[derive(Debug, Clone, Default)]
pub struct TestPlan {
    /// Cases that will produce a result, in declaration order
    pub runnable: Vec<TestCaseSpec>,
    /// Cases whose dependencies are not declared
    pub unsatisfied: Vec<ExecutionError>,
    /// Services needed by runnable cases, in manifest order
    pub services: Vec<ServiceSpec>,
    /// Targets needed by runnable cases, in manifest order
    pub targets: Vec<TargetSpec>,
}

impl TestPlan {
    /// Plan a run of the loaded configuration
    pub fn new(config: &Config, filter: Option<&str>) -> Self {
        Self::from_parts(&config.manifest, &config.cases, filter)
    }

    /// Plan from a manifest and an explicit case list
    pub fn from_parts(manifest: &Manifest, cases: &[TestCaseSpec], filter: Option<&str>) -> Self {
        let mut plan = TestPlan::default();
        let mut needed_services = BTreeSet::new();
        let mut needed_targets = BTreeSet::new();

        for case in cases {
            if let Some(pattern) = filter {
                if !case.id.contains(pattern) {
                    continue;
                }
            }

            if let Some(missing) = missing_dependency(manifest, case) {
                plan.unsatisfied.push(missing);
                continue;
            }

            // Skipped cases report without running, so they need nothing
            if case.skip.is_none() {
                needed_services.extend(case.services.iter().map(String::as_str));
                needed_targets.extend(case.artifacts.iter().map(String::as_str));
            }
            plan.runnable.push(case.clone());
        }

        plan.services = manifest
            .services
            .iter()
            .filter(|s| needed_services.contains(s.name.as_str()))
            .cloned()
            .collect();
        plan.targets = manifest
            .targets
            .iter()
            .filter(|t| needed_targets.contains(t.name.as_str()))
            .cloned()
            .collect();

        plan
    }

    /// Number of selected cases, runnable or not
    pub fn total(&self) -> usize {
        self.runnable.len() + self.unsatisfied.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

fn missing_dependency(manifest: &Manifest, case: &TestCaseSpec) -> Option<ExecutionError> {
    let missing = |kind, name: &String| ExecutionError::MissingDependency {
        case: case.id.clone(),
        kind,
        name: name.clone(),
    };

    if let Some(name) = case.services.iter().find(|s| manifest.service(s).is_none()) {
        return Some(missing(DependencyKind::Service, name));
    }
    case.artifacts
        .iter()
        .find(|a| manifest.target(a).is_none())
        .map(|name| missing(DependencyKind::Artifact, name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use fullstack_config::{CommandSpec, TargetKind};
    use pretty_assertions::assert_eq;

    fn manifest() -> Manifest {
        Manifest {
            services: vec![
                ServiceSpec::new("db"),
                ServiceSpec::new("cache"),
                ServiceSpec::new("queue"),
            ],
            targets: vec![
                TargetSpec::new("app.wasm", TargetKind::Wasm, "app.wasm"),
                TargetSpec::new("server", TargetKind::Native, "server"),
            ],
            ..Default::default()
        }
    }

    fn case(id: &str) -> TestCaseSpec {
        TestCaseSpec::new(id, CommandSpec::shell("true"))
    }

    fn ids(plan: &TestPlan) -> Vec<&str> {
        plan.runnable.iter().map(|c| c.id.as_str()).collect()
    }

    #[test]
    fn test_only_needed_dependencies() {
        let cases = vec![
            case("smoke").with_services(["queue", "db"]).with_artifacts(["app.wasm"]),
            case("plain"),
        ];
        let plan = TestPlan::from_parts(&manifest(), &cases, None);

        assert_eq!(ids(&plan), vec!["smoke", "plain"]);
        // Manifest order, not case order
        let services: Vec<_> = plan.services.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(services, vec!["db", "queue"]);
        let targets: Vec<_> = plan.targets.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(targets, vec!["app.wasm"]);
    }

    #[test]
    fn test_missing_dependency_is_unsatisfied() {
        let cases = vec![
            case("needs-ghost").with_services(["ghost"]),
            case("needs-lib").with_artifacts(["lib.so"]),
            case("fine").with_services(["db"]),
        ];
        let plan = TestPlan::from_parts(&manifest(), &cases, None);

        assert_eq!(ids(&plan), vec!["fine"]);
        assert_eq!(plan.total(), 3);
        assert_eq!(
            plan.unsatisfied,
            vec![
                ExecutionError::MissingDependency {
                    case: "needs-ghost".to_string(),
                    kind: DependencyKind::Service,
                    name: "ghost".to_string(),
                },
                ExecutionError::MissingDependency {
                    case: "needs-lib".to_string(),
                    kind: DependencyKind::Artifact,
                    name: "lib.so".to_string(),
                },
            ]
        );
        assert_eq!(plan.services.len(), 1);
    }

    #[test]
    fn test_filter_by_substring() {
        let cases = vec![case("api-login"), case("api-logout"), case("ui-render")];
        let plan = TestPlan::from_parts(&manifest(), &cases, Some("api"));
        assert_eq!(ids(&plan), vec!["api-login", "api-logout"]);

        let plan = TestPlan::from_parts(&manifest(), &cases, Some("nothing"));
        assert!(plan.is_empty());
    }

    #[test]
    fn test_skipped_case_needs_nothing() {
        let cases = vec![case("later").with_services(["db"]).with_skip("flaky")];
        let plan = TestPlan::from_parts(&manifest(), &cases, None);
        assert_eq!(ids(&plan), vec!["later"]);
        assert!(plan.services.is_empty());
    }
}
