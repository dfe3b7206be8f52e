//! Process Execution
//!
//! Every database operation in Herdux is a fresh invocation of a native client
//! binary (`psql`, `pg_dump`, `mysql`, ...). This module is the single place
//! where subprocesses are started.
//!
//! # Contract
//! - `run` never fails: a nonzero exit, a spawn failure and a timeout all come
//!   back as a [`RunResult`] with a nonzero `exit_code` and a message in `stderr`
//! - The child inherits the ambient environment; `RunOptions::env` is layered on top
//! - Interactive commands get a finite default timeout, long transfers opt out
//!   with [`RunOptions::no_timeout`]

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

mod scripted;

pub use scripted::{RecordedCall, ScriptedRunner};

/// Default ceiling for interactive commands
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Exit code reported when the process never produced one (spawn failure, timeout)
pub const SYNTHETIC_FAILURE_CODE: i32 = 1;

/// Captured outcome of one subprocess invocation
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RunResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl RunResult {
    /// Successful run with the given stdout
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self { stdout: stdout.into(), stderr: String::new(), exit_code: 0 }
    }

    /// Nonzero exit with the given stderr
    pub fn exited(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self { stdout: String::new(), stderr: stderr.into(), exit_code }
    }

    /// Synthesized failure for a process that never exited on its own
    pub fn failed(message: impl Into<String>) -> Self {
        Self::exited(SYNTHETIC_FAILURE_CODE, message)
    }

    #[must_use]
    pub const fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Per-invocation options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    pub cwd: Option<PathBuf>,
    /// Variables layered over the inherited environment
    pub env: Vec<(String, String)>,
    /// `None` disables the ceiling
    pub timeout: Option<Duration>,
    /// File streamed to the child's stdin
    pub stdin_file: Option<PathBuf>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self { cwd: None, env: Vec::new(), timeout: Some(DEFAULT_TIMEOUT), stdin_file: None }
    }
}

impl RunOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    #[must_use]
    pub fn envs(mut self, vars: impl IntoIterator<Item = (String, String)>) -> Self {
        self.env.extend(vars);
        self
    }

    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub const fn no_timeout(mut self) -> Self {
        self.timeout = None;
        self
    }

    #[must_use]
    pub fn stdin_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.stdin_file = Some(path.into());
        self
    }

    #[must_use]
    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }
}

/// Runs external programs
///
/// Engines hold an `Arc<dyn CommandRunner>` so tests can substitute a
/// [`ScriptedRunner`] for the real [`SystemRunner`].
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, program: &str, args: &[String], opts: RunOptions) -> RunResult;
}

/// Runner backed by real subprocesses
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, program: &str, args: &[String], opts: RunOptions) -> RunResult {
        debug!(program, ?args, timeout = ?opts.timeout, "running command");

        let mut cmd = Command::new(program);
        cmd.args(args)
            .envs(opts.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = &opts.cwd {
            cmd.current_dir(dir);
        }

        match &opts.stdin_file {
            Some(path) => match open_stdin(path) {
                Ok(stdin) => {
                    cmd.stdin(stdin);
                }
                Err(message) => return RunResult::failed(message),
            },
            None => {
                cmd.stdin(Stdio::null());
            }
        }

        let child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!(program, error = %e, "failed to start command");
                return RunResult::failed(format!("Failed to start {program}: {e}"));
            }
        };

        // Dropping the pending future on timeout drops the child, which kills it.
        let output = match opts.timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait_with_output()).await {
                Ok(output) => output,
                Err(_) => {
                    warn!(program, timeout = ?limit, "command timed out");
                    return RunResult::failed(format!(
                        "Command timed out after {}ms: {program}",
                        limit.as_millis()
                    ));
                }
            },
            None => child.wait_with_output().await,
        };

        let output = match output {
            Ok(output) => output,
            Err(e) => return RunResult::failed(format!("Failed to wait for {program}: {e}")),
        };

        let exit_code = output.status.code().unwrap_or(SYNTHETIC_FAILURE_CODE);
        let mut stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        if stderr.trim().is_empty() && exit_code != 0 {
            stderr = format!("{program} exited with status {exit_code}");
        }

        RunResult { stdout: String::from_utf8_lossy(&output.stdout).into_owned(), stderr, exit_code }
    }
}

fn open_stdin(path: &Path) -> std::result::Result<Stdio, String> {
    std::fs::File::open(path)
        .map(Stdio::from)
        .map_err(|e| format!("Could not open {} for reading: {e}", path.display()))
}

/// Check whether a binary is resolvable on the PATH
pub async fn binary_exists(runner: &dyn CommandRunner, name: &str) -> bool {
    let locator = if cfg!(windows) { "where" } else { "which" };
    runner.run(locator, &[name.to_string()], RunOptions::new()).await.success()
}

/// First line of `<name> --version`, if the binary answers
pub async fn binary_version(runner: &dyn CommandRunner, name: &str) -> Option<String> {
    let result = runner
        .run(name, &["--version".to_string()], RunOptions::new().timeout(Duration::from_secs(5)))
        .await;
    if !result.success() {
        return None;
    }
    result.stdout.trim().lines().next().map(str::trim).filter(|l| !l.is_empty()).map(String::from)
}

/// Turn string literals into an owned argument vector
pub fn args<I, S>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    items.into_iter().map(Into::into).collect()
}
