use clap::Parser;
use colored::*;
use fullstack_config::Backend;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod testing;

use testing::report::{EXIT_SUCCESS, EXIT_USAGE};

/// Full-stack test harness.
///
/// Provisions the services declared in full-stack.toml, builds the declared
/// artifacts (native and WebAssembly), runs every test case against them and
/// tears the services down again.
///
/// EXAMPLES:
///     run-full-stack-tests                          Run every test case
///     run-full-stack-tests --filter api --workers 2 Run matching cases, two at a time
///     run-full-stack-tests --list                   Show what would run
///     run-full-stack-tests --report out/report.json Also write a JSON report
///
/// EXIT CODES:
///     0  All tests passed (skipped tests allowed)
///     1  One or more tests failed, errored, timed out or could not start
///     2  Services could not be provisioned
///     3  Artifacts could not be built
///     4  Invalid configuration or command line
///
/// ENVIRONMENT VARIABLES:
///     CI                 Verbose output, no color; forwarded to tests
///     RUST_BACKTRACE     Forwarded to tests; non-zero also echoes build logs
///     NO_COLOR           Disable colored output
///     FULLSTACK_WORKERS  Worker count (overrides the manifest)
///     FULLSTACK_TIMEOUT  Per-case timeout in seconds (overrides the manifest)
///     FULLSTACK_BACKEND  docker or process (overrides the manifest)
///     RUST_LOG           Log filter for diagnostics on stderr
#[derive(Parser)]
#[command(name = "run-full-stack-tests")]
#[command(version)]
struct Cli {
    /// Maximum number of test cases running at once
    #[arg(long, short = 'j', value_name = "N")]
    workers: Option<usize>,

    /// Default per-case timeout in seconds
    #[arg(long, value_name = "SECS", value_parser = clap::value_parser!(u64).range(1..))]
    timeout: Option<u64>,

    /// Only run test cases whose id contains PATTERN
    #[arg(long, value_name = "PATTERN")]
    filter: Option<String>,

    /// Manifest path (default: nearest full-stack.toml walking up)
    #[arg(long, short = 'c', value_name = "PATH")]
    config: Option<PathBuf>,

    /// Write a report file (JSON for *.json, key/value table otherwise)
    #[arg(long, value_name = "PATH")]
    report: Option<PathBuf>,

    /// Service backend (docker or process)
    #[arg(long, value_name = "BACKEND")]
    backend: Option<Backend>,

    /// List the selected test cases without running anything
    #[arg(long)]
    list: bool,

    /// Print a line per test result
    #[arg(long, short = 'v')]
    verbose: bool,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // --help and --version are not errors
            let code = if e.use_stderr() { EXIT_USAGE } else { EXIT_SUCCESS };
            let _ = e.print();
            return ExitCode::from(code);
        }
    };

    let settings = config::RunSettings::from_env();
    let no_color = cli.no_color || settings.no_color;
    if no_color {
        colored::control::set_override(false);
    }

    // Diagnostics go to stderr; stdout carries the test summary
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_ansi(!no_color)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(settings.default_log_level())),
        )
        .try_init();

    let args = commands::run::RunArgs {
        config: cli.config,
        workers: cli.workers,
        timeout: cli.timeout,
        filter: cli.filter,
        report: cli.report,
        backend: cli.backend,
        list: cli.list,
        verbose: cli.verbose || settings.is_ci(),
    };

    match commands::run::run(args, settings).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("{} {:#}", "error:".red().bold(), e);
            ExitCode::from(EXIT_USAGE)
        }
    }
}
