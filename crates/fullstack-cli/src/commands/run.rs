//! Run command - provision, build, test, report, tear down

use crate::commands;
use crate::config::RunSettings;
use crate::testing::report::EXIT_SUCCESS;
use crate::testing::{
    HarnessFailure, RunContext, RunReport, Stage, TestPlan, TestReporter, TestRunner,
    UnsatisfiedCase,
};
use anyhow::{Context, Result};
use chrono::Utc;
use colored::*;
use fullstack_build::{BuildArtifact, BuildConfig, BuildDriver};
use fullstack_config::{Backend, Config, ConfigLoader};
use fullstack_provision::{
    DockerController, Environment, ProcessController, Provisioner, ServiceController, Shutdown,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Arguments for the run command
#[derive(Debug, Default)]
pub struct RunArgs {
    /// Explicit manifest path
    pub config: Option<PathBuf>,
    /// Worker count override
    pub workers: Option<usize>,
    /// Default per-case timeout override, in seconds
    pub timeout: Option<u64>,
    /// Keep cases whose id contains this
    pub filter: Option<String>,
    /// Report file override
    pub report: Option<PathBuf>,
    /// Backend override
    pub backend: Option<Backend>,
    /// Only list the plan
    pub list: bool,
    /// One line per result
    pub verbose: bool,
}

/// Run the harness; returns the process exit code
///
/// Errors are configuration or environment problems detected before
/// anything was started.
pub async fn run(args: RunArgs, settings: RunSettings) -> Result<u8> {
    let cwd = std::env::current_dir().context("Failed to determine current directory")?;
    let config = load_config(&args, &cwd)?;

    let workers = args.workers.unwrap_or_else(|| config.manifest.workers());
    if workers == 0 {
        anyhow::bail!("--workers must be at least 1");
    }
    let timeout = args
        .timeout
        .map(Duration::from_secs)
        .unwrap_or_else(|| config.manifest.timeout());
    let backend = args.backend.unwrap_or_else(|| config.manifest.backend());
    let report_path = match &args.report {
        Some(path) => Some(cwd.join(path)),
        None => config.manifest.harness.report.as_ref().map(|p| config.resolve(p)),
    };

    let plan = TestPlan::new(&config, args.filter.as_deref());
    if args.list {
        commands::list::run(&plan);
        return Ok(EXIT_SUCCESS);
    }
    if plan.is_empty() {
        println!("{}", "No tests found.".yellow());
        return Ok(EXIT_SUCCESS);
    }

    let started_at = Utc::now();
    let run_id = format!("{}-{}", started_at.format("%Y%m%d-%H%M%S"), std::process::id());
    let run_dir = config.output_dir().join(&run_id);
    std::fs::create_dir_all(&run_dir)
        .with_context(|| format!("Failed to create run directory {}", run_dir.display()))?;

    info!(
        run_id = %run_id,
        backend = %backend,
        workers,
        services = plan.services.len(),
        targets = plan.targets.len(),
        cases = plan.runnable.len(),
        "starting run"
    );
    println!(
        "Running {} test{} ({} service{}, {} target{})",
        plan.total().to_string().bold(),
        plural(plan.total()),
        plan.services.len(),
        plural(plan.services.len()),
        plan.targets.len(),
        plural(plan.targets.len()),
    );

    let mut report = RunReport::new(&run_id, started_at);
    report.unsatisfied = plan.unsatisfied.iter().map(UnsatisfiedCase::from).collect();
    let mut reporter = TestReporter::new(args.verbose);

    let shutdown = Arc::new(Shutdown::new());
    listen_for_interrupt(Arc::clone(&shutdown));

    // Services
    let controller: Arc<dyn ServiceController> = match backend {
        Backend::Docker => Arc::new(DockerController::new(config.manifest.container_cli())),
        Backend::Process => Arc::new(ProcessController::new(run_dir.join("services"))),
    };
    let provisioned = Provisioner::new(controller, &run_id)
        .provision(&plan.services, &shutdown.signal())
        .await;
    let mut environment = match provisioned {
        Ok(environment) => environment,
        Err(e) => {
            error!(error = %e, "provisioning failed");
            report.harness_failure = Some(HarnessFailure {
                stage: Stage::Provision,
                message: e.to_string(),
                log: e.logs().map(String::from),
            });
            return Ok(conclude(report, &reporter, report_path.as_deref()));
        }
    };

    // Artifacts
    let artifacts = match build(&config, &plan, &run_dir, &settings).await? {
        Ok(artifacts) => artifacts,
        Err(failure) => {
            teardown(&mut environment).await;
            report.harness_failure = Some(failure);
            return Ok(conclude(report, &reporter, report_path.as_deref()));
        }
    };

    // Cases
    let mut context = RunContext::new(&run_dir);
    context.endpoints = environment.endpoints().clone();
    context.artifacts = artifacts
        .iter()
        .map(|artifact| (artifact.id.clone(), artifact.clone()))
        .collect();
    context.forwarded_env = settings.forwarded_env();

    let runner = TestRunner::new(workers).with_timeout(timeout);
    let cases = plan.runnable.clone();
    let signal = shutdown.signal();
    let (results_tx, mut results_rx) = mpsc::unbounded_channel();
    let execution = tokio::spawn(async move {
        runner.run(cases, Arc::new(context), results_tx, signal).await;
    });

    while let Some(result) = results_rx.recv().await {
        reporter.record(&result);
        report.results.push(result);
    }
    if let Err(e) = execution.await {
        error!(error = %e, "test execution task failed");
    }

    teardown(&mut environment).await;

    report.artifacts = artifacts;
    report.cancelled = shutdown.is_triggered();
    Ok(conclude(report, &reporter, report_path.as_deref()))
}

fn load_config(args: &RunArgs, cwd: &Path) -> Result<Config> {
    let loader = ConfigLoader::new();
    let config = match &args.config {
        Some(path) => loader.load_from_file(&cwd.join(path)),
        None => loader.load_from_directory(cwd),
    };
    config.context("Invalid configuration")
}

/// Build every planned target; the inner error is a harness failure
async fn build(
    config: &Config,
    plan: &TestPlan,
    run_dir: &Path,
    settings: &RunSettings,
) -> Result<std::result::Result<Vec<BuildArtifact>, HarnessFailure>> {
    if plan.targets.is_empty() {
        return Ok(Ok(Vec::new()));
    }

    let build_config = settings.forwarded_env().into_iter().fold(
        BuildConfig::new(&config.root, run_dir.join("build")),
        |build_config, (key, value)| build_config.with_env(key, value),
    );
    let driver = BuildDriver::new(build_config);
    let targets = plan.targets.clone();

    let built = tokio::task::spawn_blocking(move || driver.build(&targets))
        .await
        .context("Build task failed")?;

    match built {
        Ok(artifacts) => {
            for artifact in &artifacts {
                info!(
                    artifact = %artifact.id,
                    platform = %artifact.platform,
                    digest = %artifact.short_digest(),
                    "artifact ready"
                );
                if settings.full_diagnostics() {
                    eprintln!("{} {}", "Build log:".bold(), artifact.id);
                    eprintln!("{}", artifact.log);
                }
            }
            Ok(Ok(artifacts))
        }
        Err(e) => {
            error!(error = %e, "build failed");
            Ok(Err(HarnessFailure {
                stage: Stage::Build,
                message: e.to_string(),
                log: e.log().map(String::from),
            }))
        }
    }
}

async fn teardown(environment: &mut Environment) {
    let errors = environment.teardown().await;
    for e in &errors {
        eprintln!("{} {}", "warning:".yellow().bold(), e);
    }
}

/// Trigger `shutdown` on Ctrl-C
fn listen_for_interrupt(shutdown: Arc<Shutdown>) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, cancelling run");
            shutdown.trigger();
        }
    });
}

/// Print the summary, write the report file, and pick the exit code
fn conclude(report: RunReport, reporter: &TestReporter, report_path: Option<&Path>) -> u8 {
    let report = report.finish(Utc::now());
    reporter.finish(&report);

    if let Some(path) = report_path {
        match report.write_to(path) {
            Ok(()) => info!(path = %path.display(), "report written"),
            Err(e) => eprintln!("{} {:#}", "warning:".yellow().bold(), e),
        }
    }

    report.exit_code()
}

fn plural(n: usize) -> &'static str {
    if n == 1 {
        ""
    } else {
        "s"
    }
}
