//! Version-control output collection.
//!
//! Every call runs `git` with an explicit working directory and a bounded
//! timeout; the process-wide current directory is never touched.

use crate::error::{Error, Result};
use std::ffi::OsString;
use std::path::Path;
use std::process::{Command, Output, Stdio};
use std::time::Duration;
use tracing::debug;

/// Default upper bound for a single git invocation.
pub const DEFAULT_DIFF_TIMEOUT: Duration = Duration::from_secs(30);

/// Which diff, if any, to embed in the prompt.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DiffMode {
    /// No diff
    #[default]
    None,
    /// Changes staged in the index (`git diff --staged`)
    Staged,
    /// Unstaged working-tree changes (`git diff`)
    Unstaged,
    /// Difference between two refs (`git diff <from> <to>`)
    Branches(String, String),
}

impl DiffMode {
    /// Returns the `git` arguments for this mode, or `None` when disabled.
    #[must_use]
    pub fn git_args(&self) -> Option<Vec<&str>> {
        match self {
            Self::None => None,
            Self::Staged => Some(vec!["diff", "--staged"]),
            Self::Unstaged => Some(vec!["diff"]),
            Self::Branches(from, to) => Some(vec!["diff", from.as_str(), to.as_str()]),
        }
    }

    /// Returns true unless the mode is [`DiffMode::None`].
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        !matches!(self, Self::None)
    }
}

/// Parses `"a,b"` into a pair of ref names.
///
/// # Errors
///
/// Returns [`Error::Config`] unless there are exactly two non-empty names.
pub fn parse_branch_pair(pair: &str) -> Result<(String, String)> {
    let parts: Vec<&str> = pair.split(',').map(str::trim).collect();
    match parts.as_slice() {
        [from, to] if !from.is_empty() && !to.is_empty() => {
            Ok(((*from).to_string(), (*to).to_string()))
        }
        _ => Err(Error::config(format!(
            "expected exactly two branch names separated by a comma, got '{pair}'"
        ))),
    }
}

/// Source of version-control text for the prompt.
pub trait DiffCollector {
    /// Returns the diff for `dir` according to `mode`.
    ///
    /// # Errors
    ///
    /// Returns a recoverable error when the diff cannot be produced.
    fn diff(&self, dir: &Path, mode: &DiffMode) -> Result<String>;

    /// Returns the one-line log of commits reachable from `to` but not `from`.
    ///
    /// # Errors
    ///
    /// Returns a recoverable error when the log cannot be produced.
    fn log(&self, dir: &Path, from: &str, to: &str) -> Result<String>;
}

/// [`DiffCollector`] backed by the `git` executable.
#[derive(Debug, Clone)]
pub struct GitCollector {
    program: OsString,
    timeout: Duration,
}

impl GitCollector {
    /// Creates a collector with the given per-call timeout.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            program: OsString::from("git"),
            timeout,
        }
    }

    /// Overrides the executable, mainly for tests.
    #[must_use]
    pub fn with_program(mut self, program: impl Into<OsString>) -> Self {
        self.program = program.into();
        self
    }

    fn run(&self, dir: &Path, args: &[&str]) -> Result<String> {
        debug!("Running git {} in {}", args.join(" "), dir.display());

        let mut command = Command::new(&self.program);
        command.args(args).current_dir(dir);

        let output = run_with_timeout(command, self.timeout)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::diff(format!(
                "`git {}` exited with {}: {}",
                args.join(" "),
                output.status,
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl Default for GitCollector {
    fn default() -> Self {
        Self::new(DEFAULT_DIFF_TIMEOUT)
    }
}

impl DiffCollector for GitCollector {
    fn diff(&self, dir: &Path, mode: &DiffMode) -> Result<String> {
        match mode.git_args() {
            Some(args) => self.run(dir, &args),
            None => Ok(String::new()),
        }
    }

    fn log(&self, dir: &Path, from: &str, to: &str) -> Result<String> {
        let range = format!("{from}..{to}");
        self.run(dir, &["log", "--oneline", range.as_str()])
    }
}

/// Runs a command to completion, killing it once `timeout` elapses.
///
/// The child runs on a single-threaded runtime scoped to this call. Both
/// pipes are read concurrently with the wait, and the child is killed when
/// the timed-out future is dropped.
///
/// # Errors
///
/// - [`Error::DiffCollection`] if the process cannot be spawned or awaited
/// - [`Error::DiffUnavailable`] on timeout
pub(crate) fn run_with_timeout(command: Command, timeout: Duration) -> Result<Output> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| Error::diff(format!("failed to start process runtime: {e}")))?;

    runtime.block_on(wait_with_timeout(command, timeout))
}

async fn wait_with_timeout(command: Command, timeout: Duration) -> Result<Output> {
    let program = command.get_program().to_string_lossy().into_owned();

    let child = tokio::process::Command::from(command)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| Error::diff(format!("failed to start {program}: {e}")))?;

    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(e)) => Err(Error::diff(format!("failed to wait for {program}: {e}"))),
        Err(_) => {
            debug!("{} did not finish within {:?}, killed", program, timeout);
            Err(Error::DiffUnavailable {
                timeout_secs: timeout.as_secs(),
            })
        }
    }
}
