//! External executables and their background runs.
//!
//! An [`Executable`] is a handle to a binary the tests drive: the
//! orchestration CLI (run to completion, output captured) or the scheduler
//! server (run in the background until stopped). The harness never looks at
//! what the binary prints beyond the readiness probe.
//!
//! # Background lifecycle
//!
//! ```text
//! run_background() ──spawn──▶ waiting ──ready──▶ BackgroundRun ──stop()──▶ exited
//!                               │
//!                               └─timeout / exit / cancel──▶ killed, Err
//! ```
//!
//! Child output is drained on background tasks and forwarded to
//! `tracing::debug!`; an undrained pipe would eventually block the child.

use std::ffi::OsStr;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::net::TcpStream;
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use oasis_core::config::{CliConfig, DATA_DIR_PLACEHOLDER, SchedulerConfig};
use oasis_core::metrics as m;

use crate::error::HarnessError;

/// Interval between TCP readiness probes.
const TCP_PROBE_INTERVAL: Duration = Duration::from_millis(50);

/// Default time to wait for readiness.
const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(30);

/// Default time to wait for a killed process to exit.
const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(10);

/// How a background process signals it is ready to serve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    /// Ready as soon as it is spawned
    Immediate,
    /// Ready once a TCP connect to the address succeeds
    Tcp(SocketAddr),
    /// Ready once a stdout or stderr line contains the pattern
    LogLine(String),
}

impl Readiness {
    /// Builds the probe described by the `[scheduler]` config section.
    pub fn from_config(config: &SchedulerConfig) -> Result<Self, HarnessError> {
        match config.readiness.as_str() {
            "none" => Ok(Self::Immediate),
            "tcp" => config
                .ready_addr
                .parse()
                .map(Self::Tcp)
                .map_err(|e| {
                    HarnessError::Config(format!(
                        "scheduler.ready_addr '{}': {e}",
                        config.ready_addr
                    ))
                }),
            "log-line" if !config.ready_pattern.is_empty() => {
                Ok(Self::LogLine(config.ready_pattern.clone()))
            }
            "log-line" => Err(HarnessError::Config(
                "scheduler.ready_pattern must not be empty".to_owned(),
            )),
            other => Err(HarnessError::Config(format!(
                "unknown scheduler.readiness '{other}'"
            ))),
        }
    }
}

/// Captured result of running an executable to completion.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Exit status
    pub status: ExitStatus,
    /// Standard output, lossily decoded
    pub stdout: String,
    /// Standard error, lossily decoded
    pub stderr: String,
}

impl CommandOutput {
    /// Returns `true` if the process exited with status 0.
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// Returns `true` if stdout contains `pattern`.
    pub fn stdout_contains(&self, pattern: &str) -> bool {
        self.stdout.contains(pattern)
    }

    /// Returns `true` if stderr contains `pattern`.
    pub fn stderr_contains(&self, pattern: &str) -> bool {
        self.stderr.contains(pattern)
    }
}

/// Handle to a runnable binary, built once per suite.
#[derive(Debug, Clone)]
pub struct Executable {
    name: String,
    program: PathBuf,
    args: Vec<String>,
    env: Vec<(String, String)>,
    current_dir: Option<PathBuf>,
    readiness: Readiness,
    ready_timeout: Duration,
    stop_grace: Duration,
}

impl Executable {
    /// Creates a handle for `program`, identified as `name` in logs and errors.
    pub fn new(name: impl Into<String>, program: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            current_dir: None,
            readiness: Readiness::Immediate,
            ready_timeout: DEFAULT_READY_TIMEOUT,
            stop_grace: DEFAULT_STOP_GRACE,
        }
    }

    /// Handle for the orchestration CLI under test.
    pub fn for_cli(config: &CliConfig) -> Self {
        Self::new("oasis", &config.binary).args(config.args.iter().cloned())
    }

    /// Handle for the scheduler server, with `{data_dir}` substituted in its args.
    pub fn for_scheduler(config: &SchedulerConfig, data_dir: &Path) -> Result<Self, HarnessError> {
        let data_dir_str = data_dir.display().to_string();
        let args = config
            .args
            .iter()
            .map(|arg| arg.replace(DATA_DIR_PLACEHOLDER, &data_dir_str));

        Ok(Self::new("scheduler", &config.binary)
            .args(args)
            .current_dir(data_dir)
            .readiness(Readiness::from_config(config)?)
            .ready_timeout(config.ready_timeout())
            .stop_grace(config.stop_grace()))
    }

    /// Appends fixed arguments passed on every invocation.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Sets an environment variable for every invocation.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Sets the working directory.
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// Sets the readiness probe used by [`run_background`](Self::run_background).
    pub fn readiness(mut self, readiness: Readiness) -> Self {
        self.readiness = readiness;
        self
    }

    /// Sets how long [`run_background`](Self::run_background) waits for readiness.
    pub fn ready_timeout(mut self, timeout: Duration) -> Self {
        self.ready_timeout = timeout;
        self
    }

    /// Sets how long [`BackgroundRun::stop`] waits for the process to exit.
    pub fn stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace = grace;
        self
    }

    /// Name used in logs and errors.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Program path or name.
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Configured working directory.
    pub fn working_dir(&self) -> Option<&Path> {
        self.current_dir.as_deref()
    }

    fn command<I, S>(&self, extra: I) -> Command
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).args(extra).stdin(Stdio::null());
        for (k, v) in &self.env {
            cmd.env(k, v);
        }
        if let Some(dir) = &self.current_dir {
            cmd.current_dir(dir);
        }
        cmd
    }

    /// Runs to completion with `args` appended and captures the output.
    ///
    /// A non-zero exit is not an error; inspect [`CommandOutput::status`].
    pub async fn run<I, S>(&self, args: I) -> Result<CommandOutput, HarnessError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let output = self
            .command(args)
            .output()
            .await
            .map_err(|e| HarnessError::Spawn {
                name: self.name.clone(),
                reason: format!("{}: {e}", self.program.display()),
            })?;

        let result = CommandOutput {
            status: output.status,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        debug!(name = %self.name, status = %result.status, "command finished");
        Ok(result)
    }

    /// Spawns the executable and blocks until it reports readiness.
    ///
    /// Waiting is bounded by the ready timeout and by `cancel`. If the
    /// process exits, times out, or is cancelled before it is ready, it is
    /// killed and an error is returned.
    pub async fn run_background(
        &self,
        cancel: &CancellationToken,
    ) -> Result<BackgroundRun, HarnessError> {
        let mut child = self
            .command(std::iter::empty::<&OsStr>())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| HarnessError::Spawn {
                name: self.name.clone(),
                reason: format!("{}: {e}", self.program.display()),
            })?;

        let pid = child.id();
        info!(name = %self.name, pid, "background process spawned");

        let (ready_tx, mut ready_rx) = mpsc::channel::<()>(1);
        let pattern = match &self.readiness {
            Readiness::LogLine(pattern) => Some(pattern.clone()),
            _ => None,
        };

        let mut drains = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            drains.push(spawn_drain(
                self.name.clone(),
                "stdout",
                stdout,
                pattern.clone(),
                ready_tx.clone(),
            ));
        }
        if let Some(stderr) = child.stderr.take() {
            drains.push(spawn_drain(
                self.name.clone(),
                "stderr",
                stderr,
                pattern,
                ready_tx.clone(),
            ));
        }
        // Drains hold the only senders; the channel closes once both streams end.
        drop(ready_tx);

        let started = Instant::now();
        let outcome = tokio::select! {
            _ = cancel.cancelled() => Err(HarnessError::Cancelled { name: self.name.clone() }),
            waited = tokio::time::timeout(
                self.ready_timeout,
                wait_ready(&self.name, &self.readiness, &mut child, &mut ready_rx),
            ) => waited.unwrap_or_else(|_| Err(HarnessError::ReadyTimeout {
                name: self.name.clone(),
                timeout: self.ready_timeout,
            })),
        };

        if let Err(e) = outcome {
            warn!(name = %self.name, pid, error = %e, "background process failed to become ready");
            if let Err(kill_err) = child.kill().await {
                debug!(name = %self.name, error = %kill_err, "kill after failed start");
            }
            for drain in &drains {
                drain.abort();
            }
            return Err(e);
        }

        let elapsed = started.elapsed();
        metrics::histogram!(m::FIXTURE_BACKGROUND_READY_SECONDS).record(elapsed.as_secs_f64());
        info!(name = %self.name, pid, ready_secs = elapsed.as_secs_f64(), "background process ready");

        Ok(BackgroundRun {
            name: self.name.clone(),
            pid,
            child,
            stop_grace: self.stop_grace,
            drains,
        })
    }
}

async fn wait_ready(
    name: &str,
    readiness: &Readiness,
    child: &mut Child,
    ready_rx: &mut mpsc::Receiver<()>,
) -> Result<(), HarnessError> {
    let exited = |status: ExitStatus| HarnessError::NotReady {
        name: name.to_owned(),
        reason: format!("exited early with {status}"),
    };

    match readiness {
        Readiness::Immediate => Ok(()),
        Readiness::Tcp(addr) => loop {
            if TcpStream::connect(*addr).await.is_ok() {
                return Ok(());
            }
            match child.try_wait() {
                Ok(Some(status)) => return Err(exited(status)),
                Ok(None) => {}
                Err(e) => {
                    return Err(HarnessError::NotReady {
                        name: name.to_owned(),
                        reason: e.to_string(),
                    });
                }
            }
            tokio::time::sleep(TCP_PROBE_INTERVAL).await;
        },
        Readiness::LogLine(pattern) => tokio::select! {
            matched = ready_rx.recv() => matched.ok_or_else(|| HarnessError::NotReady {
                name: name.to_owned(),
                reason: format!("output closed before a line containing '{pattern}'"),
            }),
            status = child.wait() => Err(match status {
                Ok(status) => exited(status),
                Err(e) => HarnessError::NotReady { name: name.to_owned(), reason: e.to_string() },
            }),
        },
    }
}

fn spawn_drain<R>(
    name: String,
    stream: &'static str,
    reader: R,
    pattern: Option<String>,
    ready_tx: mpsc::Sender<()>,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        let mut pattern = pattern;
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    debug!(name = %name, stream, "{line}");
                    if pattern.as_deref().is_some_and(|p| line.contains(p)) {
                        let _ = ready_tx.try_send(());
                        pattern = None;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    debug!(name = %name, stream, error = %e, "output stream read failed");
                    break;
                }
            }
        }
    })
}

/// A started instance of a background executable.
///
/// `stop` is the only way out besides drop; dropping an un-stopped run
/// kills the process.
#[derive(Debug)]
pub struct BackgroundRun {
    name: String,
    pid: Option<u32>,
    child: Child,
    stop_grace: Duration,
    drains: Vec<JoinHandle<()>>,
}

impl BackgroundRun {
    /// Executable name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// OS process id at spawn time.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Returns `true` if the process has not exited yet.
    pub fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Kills the process and waits up to the grace period for it to exit.
    pub async fn stop(mut self) -> Result<(), HarnessError> {
        if let Ok(Some(status)) = self.child.try_wait() {
            info!(name = %self.name, pid = self.pid, %status, "background process already exited");
            return Ok(());
        }

        self.child.start_kill().map_err(|e| HarnessError::Stop {
            name: self.name.clone(),
            reason: e.to_string(),
        })?;

        match tokio::time::timeout(self.stop_grace, self.child.wait()).await {
            Ok(Ok(status)) => {
                info!(name = %self.name, pid = self.pid, %status, "background process stopped");
                Ok(())
            }
            Ok(Err(e)) => Err(HarnessError::Stop {
                name: self.name.clone(),
                reason: e.to_string(),
            }),
            Err(_) => Err(HarnessError::StopTimeout {
                name: self.name.clone(),
                grace: self.stop_grace,
            }),
        }
    }
}

impl Drop for BackgroundRun {
    fn drop(&mut self) {
        for drain in &self.drains {
            drain.abort();
        }
    }
}
