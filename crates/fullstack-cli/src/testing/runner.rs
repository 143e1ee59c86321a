//! Test runner - execute cases against a provisioned environment
//!
//! Cases run as child processes with bounded concurrency. A case that
//! declares exclusive resources first takes the lock of every resource (in
//! sorted order) and only then a worker slot, so cases queued behind a lock
//! never occupy a worker. Results are sent as each case finishes.

use crate::testing::error::{ExecutionError, ExecutionResult};
use crate::testing::result::{TestResult, TestStatus};
use fullstack_build::BuildArtifact;
use fullstack_config::names::{env_key, file_key};
use fullstack_config::TestCaseSpec;
use fullstack_provision::{Endpoint, ShutdownSignal};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::sync::{mpsc, Mutex, OwnedMutexGuard, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info};

/// How long to keep draining output after the process is gone
const OUTPUT_GRACE: Duration = Duration::from_secs(1);

/// Captured output kept per case; older bytes are dropped
const OUTPUT_LIMIT: usize = 1 << 20;

/// What every case of a run can see
#[derive(Debug, Clone, Default)]
pub struct RunContext {
    /// Run-scoped output directory
    pub run_dir: PathBuf,
    /// Provisioned services by name
    pub endpoints: BTreeMap<String, Endpoint>,
    /// Built artifacts by id
    pub artifacts: BTreeMap<String, BuildArtifact>,
    /// Variables passed through from the harness environment
    pub forwarded_env: BTreeMap<String, String>,
}

impl RunContext {
    /// Context for a run directory with nothing provisioned
    pub fn new(run_dir: impl Into<PathBuf>) -> Self {
        Self {
            run_dir: run_dir.into(),
            ..Default::default()
        }
    }

    /// Fresh working directory of a case
    pub fn work_dir(&self, case_id: &str) -> PathBuf {
        self.run_dir.join("work").join(file_key(case_id))
    }

    /// Environment of a case's command
    ///
    /// Only the services and artifacts the case declares are exposed. The
    /// case's own `env` is applied last.
    pub fn case_env(&self, case: &TestCaseSpec) -> BTreeMap<String, String> {
        let mut vars = self.forwarded_env.clone();
        vars.insert(
            "FULLSTACK_RUN_DIR".to_string(),
            self.run_dir.display().to_string(),
        );
        vars.insert(
            "FULLSTACK_WORK_DIR".to_string(),
            self.work_dir(&case.id).display().to_string(),
        );

        for name in &case.services {
            let Some(endpoint) = self.endpoints.get(name) else {
                continue;
            };
            let prefix = format!("FULLSTACK_{}", env_key(name));
            vars.insert(format!("{}_HOST", prefix), endpoint.host.clone());
            if let Some(port) = endpoint.primary_port() {
                vars.insert(format!("{}_PORT", prefix), port.to_string());
            }
            for (container, host) in &endpoint.ports {
                vars.insert(format!("{}_PORT_{}", prefix, container), host.to_string());
            }
        }

        for id in &case.artifacts {
            if let Some(artifact) = self.artifacts.get(id) {
                vars.insert(
                    format!("FULLSTACK_ARTIFACT_{}", env_key(id)),
                    artifact.path.display().to_string(),
                );
            }
        }

        vars.extend(case.env.clone());
        vars
    }
}

/// Test runner with configuration
pub struct TestRunner {
    /// Maximum concurrently running cases
    workers: usize,
    /// Timeout for cases that do not set their own
    timeout: Duration,
}

impl TestRunner {
    /// Create a runner with `workers` slots (at least one)
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
            timeout: Duration::from_secs(fullstack_config::manifest::DEFAULT_TIMEOUT_SECS),
        }
    }

    /// Set the default per-case timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run every case, sending one result per case in completion order
    ///
    /// Returns once every case reached a terminal state. After `shutdown`
    /// fires, running cases are killed and waiting cases are skipped.
    pub async fn run(
        &self,
        cases: Vec<TestCaseSpec>,
        context: Arc<RunContext>,
        results: mpsc::UnboundedSender<TestResult>,
        shutdown: ShutdownSignal,
    ) {
        let slots = Arc::new(Semaphore::new(self.workers));
        let mut locks: HashMap<String, Arc<Mutex<()>>> = HashMap::new();
        let mut tasks = JoinSet::new();

        info!(cases = cases.len(), workers = self.workers, "running test cases");

        for case in cases {
            if let Some(reason) = &case.skip {
                debug!(case = %case.id, "skipped");
                let _ = results.send(TestResult::skipped(&case.id, reason));
                continue;
            }

            let resources: BTreeSet<&String> = case.exclusive.iter().collect();
            let case_locks: Vec<Arc<Mutex<()>>> = resources
                .into_iter()
                .map(|name| Arc::clone(locks.entry(name.clone()).or_default()))
                .collect();

            let timeout = case.timeout().unwrap_or(self.timeout);
            let slots = Arc::clone(&slots);
            let context = Arc::clone(&context);
            let results = results.clone();
            let mut shutdown = shutdown.clone();

            tasks.spawn(async move {
                let result = match acquire(&case_locks, &slots, &mut shutdown).await {
                    Some(_held) => execute(&case, &context, timeout, &mut shutdown).await,
                    None => TestResult::skipped(&case.id, "run cancelled"),
                };
                debug!(case = %result.id, status = %result.status, "case finished");
                let _ = results.send(result);
            });
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "test task failed");
            }
        }
    }
}

/// Locks and worker slot held while a case runs
struct Held {
    _locks: Vec<OwnedMutexGuard<()>>,
    _slot: tokio::sync::OwnedSemaphorePermit,
}

/// Take every exclusive lock, then a worker slot; `None` if cancelled first
async fn acquire(
    locks: &[Arc<Mutex<()>>],
    slots: &Arc<Semaphore>,
    shutdown: &mut ShutdownSignal,
) -> Option<Held> {
    let mut guards = Vec::with_capacity(locks.len());
    for lock in locks {
        tokio::select! {
            biased;
            _ = shutdown.triggered() => return None,
            guard = Arc::clone(lock).lock_owned() => guards.push(guard),
        }
    }

    let slot = tokio::select! {
        biased;
        _ = shutdown.triggered() => return None,
        slot = Arc::clone(slots).acquire_owned() => slot.ok()?,
    };

    if shutdown.is_triggered() {
        return None;
    }
    Some(Held {
        _locks: guards,
        _slot: slot,
    })
}

enum Exit {
    Status(std::io::Result<ExitStatus>),
    TimedOut,
    Cancelled,
}

/// Run one case to a terminal state
async fn execute(
    case: &TestCaseSpec,
    context: &RunContext,
    timeout: Duration,
    shutdown: &mut ShutdownSignal,
) -> TestResult {
    let start = Instant::now();

    // The id names a directory that is about to be emptied
    if let Err(e) = case.validate() {
        return TestResult::errored(&case.id, e.to_string(), start.elapsed());
    }
    let work_dir = context.work_dir(&case.id);

    if let Err(e) = prepare_work_dir(&case.id, &work_dir) {
        return TestResult::errored(&case.id, e.to_string(), start.elapsed());
    }

    let argv = case.command.to_argv();
    let mut child = match spawn(&argv, &work_dir, context.case_env(case)) {
        Ok(child) => child,
        Err(e) => return TestResult::errored(&case.id, e.to_string(), start.elapsed()),
    };
    debug!(case = %case.id, command = %case.command, "case started");

    let output = Arc::new(StdMutex::new(OutputTail::default()));
    let mut readers = Vec::new();
    if let Some(stdout) = child.stdout.take() {
        readers.push(tokio::spawn(capture(stdout, Arc::clone(&output))));
    }
    if let Some(stderr) = child.stderr.take() {
        readers.push(tokio::spawn(capture(stderr, Arc::clone(&output))));
    }

    let exit = tokio::select! {
        status = child.wait() => Exit::Status(status),
        _ = tokio::time::sleep(timeout) => Exit::TimedOut,
        _ = shutdown.triggered() => Exit::Cancelled,
    };
    if !matches!(exit, Exit::Status(_)) {
        let _ = child.start_kill();
        let _ = child.wait().await;
    }

    // Grandchildren may keep the pipes open after the case process is gone
    let _ = tokio::time::timeout(OUTPUT_GRACE, async {
        for reader in readers {
            let _ = reader.await;
        }
    })
    .await;
    let duration = start.elapsed();
    let output = output.lock().unwrap_or_else(|e| e.into_inner()).to_text();

    let (status, exit_code, message) = match exit {
        Exit::Status(Ok(status)) => match status.code() {
            Some(code) => judge(case, code, &output),
            None => (
                TestStatus::Errored,
                None,
                Some(format!("terminated by {}", describe_signal(&status))),
            ),
        },
        Exit::Status(Err(e)) => (
            TestStatus::Errored,
            None,
            Some(format!("failed to wait for process: {}", e)),
        ),
        Exit::TimedOut => (
            TestStatus::TimedOut,
            None,
            Some(format!("exceeded timeout of {:?}", timeout)),
        ),
        Exit::Cancelled => (TestStatus::Errored, None, Some("cancelled".to_string())),
    };

    TestResult {
        id: case.id.clone(),
        status,
        duration,
        output,
        exit_code,
        message,
    }
}

/// Compare an exit code and output against the case's expectation
fn judge(case: &TestCaseSpec, code: i32, output: &str) -> (TestStatus, Option<i32>, Option<String>) {
    if !case.accepts_exit_code(code) {
        let expected = match case.expect_exit_code {
            Some(expected) => format!("exit code {}", expected),
            None => format!("expected to {:?}", case.expect).to_lowercase(),
        };
        return (
            TestStatus::Failed,
            Some(code),
            Some(format!("exit code {} ({})", code, expected)),
        );
    }

    if let Some(needle) = &case.expect_output {
        if !output.contains(needle.as_str()) {
            return (
                TestStatus::Failed,
                Some(code),
                Some(format!("expected output not found: {:?}", needle)),
            );
        }
    }

    (TestStatus::Passed, Some(code), None)
}

fn prepare_work_dir(case: &str, dir: &Path) -> ExecutionResult<()> {
    let fail = |e: std::io::Error| ExecutionError::WorkDir {
        case: case.to_string(),
        reason: e.to_string(),
    };
    if dir.exists() {
        fs::remove_dir_all(dir).map_err(fail)?;
    }
    fs::create_dir_all(dir).map_err(fail)
}

fn spawn(
    argv: &[String],
    work_dir: &Path,
    env: BTreeMap<String, String>,
) -> ExecutionResult<tokio::process::Child> {
    let (program, args) = argv.split_first().ok_or_else(|| ExecutionError::Spawn {
        program: String::new(),
        reason: "empty command".to_string(),
    })?;

    Command::new(program)
        .args(args)
        .current_dir(work_dir)
        .envs(env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| ExecutionError::Spawn {
            program: program.clone(),
            reason: e.to_string(),
        })
}

/// The last `OUTPUT_LIMIT` bytes of a case's combined output
#[derive(Debug, Default)]
struct OutputTail {
    bytes: Vec<u8>,
    dropped: usize,
}

impl OutputTail {
    fn push(&mut self, chunk: &[u8]) {
        self.bytes.extend_from_slice(chunk);
        if self.bytes.len() > OUTPUT_LIMIT {
            let excess = self.bytes.len() - OUTPUT_LIMIT;
            self.bytes.drain(..excess);
            self.dropped += excess;
        }
    }

    fn to_text(&self) -> String {
        let text = String::from_utf8_lossy(&self.bytes);
        if self.dropped == 0 {
            return text.into_owned();
        }
        format!("[{} bytes of earlier output dropped]\n{}", self.dropped, text)
    }
}

/// Append everything read from `stream` to the shared tail
async fn capture(mut stream: impl AsyncRead + Unpin, tail: Arc<StdMutex<OutputTail>>) {
    let mut chunk = [0u8; 8192];
    loop {
        match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                let mut tail = tail.lock().unwrap_or_else(|e| e.into_inner());
                tail.push(&chunk[..n]);
            }
        }
    }
}

#[cfg(unix)]
fn describe_signal(status: &ExitStatus) -> String {
    use std::os::unix::process::ExitStatusExt;
    match status.signal() {
        Some(signal) => format!("signal {}", signal),
        None => "unknown signal".to_string(),
    }
}

#[cfg(not(unix))]
fn describe_signal(_status: &ExitStatus) -> String {
    "unknown signal".to_string()
}
