//! External solver jobs
//!
//! A job runs the case's solver script as a child process, merges its stdout
//! and stderr into one line log, and records how the process ended. Whether
//! the run produced usable results is decided later by the result marker
//! file, not by the exit code.

use serde::Serialize;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, info, warn};

use crate::SolverConfig;

/// How long to keep draining output after the process has gone
const DRAIN_GRACE: Duration = Duration::from_secs(5);

/// Errors from starting a solver job
#[derive(Error, Debug)]
pub enum SolverError {
    #[error("Solver script not found: {0}")]
    ScriptNotFound(PathBuf),

    #[error("Failed to launch {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("A solver job is already running for this session")]
    AlreadyRunning,
}

/// Everything needed to launch one solver run
#[derive(Debug, Clone)]
pub struct SolverSpec {
    /// Interpreter, e.g. /bin/bash
    pub shell: PathBuf,
    /// Script passed to the interpreter, relative to `working_dir`
    pub script: PathBuf,
    /// Case directory the solver runs in
    pub working_dir: PathBuf,
    pub timeout: Option<Duration>,
    pub log_capacity: usize,
}

impl SolverSpec {
    pub fn from_config(config: &SolverConfig, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            shell: config.shell.clone(),
            script: config.script.clone(),
            working_dir: working_dir.into(),
            timeout: config.timeout_secs.map(Duration::from_secs),
            log_capacity: config.log_capacity.max(1),
        }
    }
}

/// Lifecycle of a solver job
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobState {
    Running,
    /// Process ended on its own; `code` is None when killed by a signal
    Exited { code: Option<i32> },
    Cancelled,
    TimedOut,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobState::Running)
    }
}

/// A window of the job log
#[derive(Debug, Clone, Serialize)]
pub struct LogSlice {
    pub lines: Vec<String>,
    /// Index to pass as `since` to continue reading
    pub next: usize,
    /// Lines evicted from the front of the log
    pub dropped: usize,
}

/// Bounded line log with stable absolute indices
#[derive(Debug)]
struct JobLog {
    lines: VecDeque<String>,
    dropped: usize,
    capacity: usize,
}

impl JobLog {
    fn new(capacity: usize) -> Self {
        Self {
            lines: VecDeque::new(),
            dropped: 0,
            capacity,
        }
    }

    fn push(&mut self, line: String) {
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
            self.dropped += 1;
        }
        self.lines.push_back(line);
    }

    fn total(&self) -> usize {
        self.dropped + self.lines.len()
    }

    fn since(&self, index: usize) -> LogSlice {
        let start = index.max(self.dropped) - self.dropped;
        LogSlice {
            lines: self.lines.iter().skip(start).cloned().collect(),
            next: self.total(),
            dropped: self.dropped,
        }
    }
}

/// A running or finished solver process
pub struct SolverJob {
    spec: SolverSpec,
    state: watch::Sender<JobState>,
    cancel: watch::Sender<bool>,
    log: Mutex<JobLog>,
    lines: broadcast::Sender<String>,
    started_at: Instant,
    finished_after: Mutex<Option<Duration>>,
}

impl SolverJob {
    /// Launch the solver script. Must be called from within a tokio runtime.
    pub fn spawn(spec: SolverSpec) -> Result<Arc<Self>, SolverError> {
        let script_path = spec.working_dir.join(&spec.script);
        if !script_path.is_file() {
            return Err(SolverError::ScriptNotFound(script_path));
        }

        let mut cmd = Command::new(&spec.shell);
        cmd.arg(&spec.script)
            .current_dir(&spec.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Own process group, so cancelling also reaches whatever the script starts
        #[cfg(unix)]
        cmd.process_group(0);

        debug!("Running: {:?}", cmd);

        let mut child = cmd.spawn().map_err(|e| SolverError::Launch {
            program: spec.shell.display().to_string(),
            source: e,
        })?;

        info!(
            pid = child.id(),
            script = %spec.script.display(),
            case = %spec.working_dir.display(),
            "Solver started"
        );

        let (state, _) = watch::channel(JobState::Running);
        let (cancel, cancel_rx) = watch::channel(false);
        let (lines, _) = broadcast::channel(256);

        let job = Arc::new(Self {
            log: Mutex::new(JobLog::new(spec.log_capacity)),
            spec,
            state,
            cancel,
            lines,
            started_at: Instant::now(),
            finished_after: Mutex::new(None),
        });

        // stdout and stderr feed one channel so the log keeps arrival order
        let (line_tx, mut line_rx) = mpsc::unbounded_channel::<String>();
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward_lines(stdout, line_tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_lines(stderr, line_tx));
        }

        let collector = {
            let job = Arc::clone(&job);
            tokio::spawn(async move {
                while let Some(line) = line_rx.recv().await {
                    job.record_line(line);
                }
            })
        };

        {
            let job = Arc::clone(&job);
            tokio::spawn(async move {
                let terminal = supervise(child, cancel_rx, job.spec.timeout).await;
                if tokio::time::timeout(DRAIN_GRACE, collector).await.is_err() {
                    warn!("Solver output still open after exit, no longer collecting");
                }
                job.finish(terminal);
            });
        }

        Ok(job)
    }

    fn record_line(&self, line: String) {
        info!(target: "flowlab::solver", "{}", line);
        if let Ok(mut log) = self.log.lock() {
            log.push(line.clone());
        }
        // No subscribers is fine
        let _ = self.lines.send(line);
    }

    fn finish(&self, terminal: JobState) {
        let elapsed = self.started_at.elapsed();
        if let Ok(mut slot) = self.finished_after.lock() {
            *slot = Some(elapsed);
        }
        info!(
            state = ?terminal,
            elapsed_ms = elapsed.as_millis() as u64,
            "Solver finished"
        );
        self.state.send_replace(terminal);
    }

    /// Current state
    pub fn state(&self) -> JobState {
        self.state.borrow().clone()
    }

    pub fn is_running(&self) -> bool {
        !self.state.borrow().is_terminal()
    }

    /// Ask the job to stop. No effect once it has finished.
    pub fn cancel(&self) {
        if self.is_running() {
            info!("Cancelling solver job");
            self.cancel.send_replace(true);
        }
    }

    /// Wait until the job reaches a terminal state
    pub async fn wait(&self) -> JobState {
        let mut rx = self.state.subscribe();
        match rx.wait_for(JobState::is_terminal).await {
            Ok(state) => state.clone(),
            // The sender lives in `self`, so this only happens during teardown
            Err(_) => self.state(),
        }
    }

    /// Log lines from absolute index `since`
    pub fn lines_since(&self, since: usize) -> LogSlice {
        match self.log.lock() {
            Ok(log) => log.since(since),
            Err(_) => LogSlice {
                lines: Vec::new(),
                next: since,
                dropped: 0,
            },
        }
    }

    /// Total number of lines produced so far
    pub fn line_count(&self) -> usize {
        self.log.lock().map(|log| log.total()).unwrap_or(0)
    }

    /// Receive lines as they are produced
    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.lines.subscribe()
    }

    /// Wall time since launch, or total run time once finished
    pub fn elapsed(&self) -> Duration {
        self.finished_after
            .lock()
            .ok()
            .and_then(|slot| *slot)
            .unwrap_or_else(|| self.started_at.elapsed())
    }
}

impl std::fmt::Debug for SolverJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SolverJob")
            .field("script", &self.spec.script)
            .field("working_dir", &self.spec.working_dir)
            .field("state", &self.state())
            .finish()
    }
}

async fn forward_lines<R>(reader: R, tx: mpsc::UnboundedSender<String>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                // Solver output is not guaranteed to be UTF-8
                let line = String::from_utf8_lossy(&buf);
                if tx.send(line.trim_end().to_string()).is_err() {
                    break;
                }
            }
            Err(e) => {
                warn!("Stopped reading solver output: {}", e);
                break;
            }
        }
    }
}

enum Outcome {
    Exited(std::io::Result<std::process::ExitStatus>),
    Cancelled,
    TimedOut,
}

async fn supervise(
    mut child: Child,
    mut cancel_rx: watch::Receiver<bool>,
    timeout: Option<Duration>,
) -> JobState {
    let deadline = async {
        match timeout {
            Some(limit) => tokio::time::sleep(limit).await,
            None => std::future::pending::<()>().await,
        }
    };

    let outcome = tokio::select! {
        status = child.wait() => Outcome::Exited(status),
        Ok(_) = cancel_rx.wait_for(|cancelled| *cancelled) => Outcome::Cancelled,
        _ = deadline => Outcome::TimedOut,
    };

    match outcome {
        Outcome::Exited(Ok(status)) => JobState::Exited {
            code: status.code(),
        },
        Outcome::Exited(Err(e)) => {
            warn!("Failed to wait for solver: {}", e);
            JobState::Exited { code: None }
        }
        Outcome::Cancelled => {
            terminate(&mut child).await;
            JobState::Cancelled
        }
        Outcome::TimedOut => {
            warn!(timeout_secs = timeout.map(|t| t.as_secs()), "Solver timed out");
            terminate(&mut child).await;
            JobState::TimedOut
        }
    }
}

/// Kill the script's whole process group, then reap the shell
async fn terminate(child: &mut Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        // The shell leads its group, see `SolverJob::spawn`
        if let Err(e) = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
            warn!(pid = pid, "Failed to kill solver process group: {}", e);
        }
    }
    if let Err(e) = child.kill().await {
        warn!("Failed to kill solver: {}", e);
    }
}
