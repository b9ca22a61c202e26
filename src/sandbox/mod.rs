//! Execution sandbox for remediation scripts.
//!
//! Every script runs as a separate child process of the configured
//! interpreter. Isolation is process isolation: own address space,
//! captured output, no way to corrupt the agent's state. It is not a
//! privilege sandbox; the child runs as the agent's user.
//!
//! 1. Pre-flight syntax check, in-process (see [`preflight`])
//! 2. Script written to a uniquely named file in the work directory
//! 3. Interpreter spawned on that file, stdout and stderr captured
//! 4. Exit status zero means success
//!
//! Script files are kept in the work directory as an audit trail.

pub mod preflight;

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::Context;
use tracing::{debug, info, warn};

use crate::error::Result;

/// Outcome of one script run.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionResult {
    pub succeeded: bool,
    /// stdout followed by stderr
    pub combined_output: String,
    pub exit_code: Option<i32>,
    /// Audit copy of the script, when it could be written
    pub script: Option<PathBuf>,
}

impl ExecutionResult {
    fn failed(script: Option<PathBuf>, message: String) -> Self {
        Self {
            succeeded: false,
            combined_output: message,
            exit_code: None,
            script,
        }
    }

    fn from_output(script: PathBuf, output: Output) -> Self {
        let mut combined_output = String::from_utf8_lossy(&output.stdout).into_owned();
        combined_output.push_str(&String::from_utf8_lossy(&output.stderr));
        Self {
            succeeded: output.status.success(),
            combined_output,
            exit_code: output.status.code(),
            script: Some(script),
        }
    }
}

pub struct SandboxExecutor {
    work_dir: PathBuf,
    interpreter: PathBuf,
    envs: Vec<(String, String)>,
    spawned: AtomicUsize,
}

impl SandboxExecutor {
    /// Creates the executor and its work directory.
    pub fn new(work_dir: impl Into<PathBuf>, interpreter: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let work_dir = work_dir.into();
        std::fs::create_dir_all(&work_dir)
            .with_context(|| format!("Cannot create executor work dir {}", work_dir.display()))?;
        Ok(Self {
            work_dir,
            interpreter: interpreter.into(),
            envs: Vec::new(),
            spawned: AtomicUsize::new(0),
        })
    }

    /// Adds an environment variable to every child.
    #[cfg(test)]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Number of children launched so far.
    pub fn spawn_count(&self) -> usize {
        self.spawned.load(Ordering::Relaxed)
    }

    /// Runs `source` to completion. Blocks until the child exits.
    ///
    /// Only a pre-flight rejection is an `Err` (`InvalidSource`); any
    /// later failure (write error, spawn error, non-zero exit) comes
    /// back as an unsuccessful [`ExecutionResult`].
    pub fn execute(&self, source: &str) -> Result<ExecutionResult> {
        preflight::check(source)?;

        let script = match self.write_script(source) {
            Ok(path) => path,
            Err(e) => {
                warn!("Cannot write script to {}: {e}", self.work_dir.display());
                return Ok(ExecutionResult::failed(None, format!("Cannot write script: {e}\n")));
            }
        };

        debug!("Running {} with {}", script.display(), self.interpreter.display());
        self.spawned.fetch_add(1, Ordering::Relaxed);
        let output = Command::new(&self.interpreter)
            .arg(&script)
            .current_dir(&self.work_dir)
            .envs(self.envs.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::null())
            .output();

        let result = match output {
            Ok(output) => ExecutionResult::from_output(script, output),
            Err(e) => ExecutionResult::failed(
                Some(script),
                format!("Cannot spawn {}: {e}\n", self.interpreter.display()),
            ),
        };
        info!(
            "Script finished: {} (exit {:?})",
            if result.succeeded { "OK" } else { "FAIL" },
            result.exit_code
        );
        Ok(result)
    }

    /// Runs `source` with a wall-clock bound; the child is killed when
    /// the bound expires. Used for operator-authored snippets.
    pub async fn execute_bounded(&self, source: &str, timeout: Duration) -> Result<ExecutionResult> {
        preflight::check(source)?;

        let script = match self.write_script(source) {
            Ok(path) => path,
            Err(e) => {
                return Ok(ExecutionResult::failed(None, format!("Cannot write script: {e}\n")));
            }
        };

        self.spawned.fetch_add(1, Ordering::Relaxed);
        let child = tokio::process::Command::new(&self.interpreter)
            .arg(&script)
            .current_dir(&self.work_dir)
            .envs(self.envs.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let child = match child {
            Ok(child) => child,
            Err(e) => {
                return Ok(ExecutionResult::failed(
                    Some(script),
                    format!("Cannot spawn {}: {e}\n", self.interpreter.display()),
                ));
            }
        };

        // Dropping the wait future on timeout drops the child, which kills it
        match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => Ok(ExecutionResult::from_output(script, output)),
            Ok(Err(e)) => Ok(ExecutionResult::failed(Some(script), format!("Wait failed: {e}\n"))),
            Err(_) => {
                warn!("Script {} timed out after {}s", script.display(), timeout.as_secs_f64());
                Ok(ExecutionResult::failed(
                    Some(script),
                    format!("Timed out after {}s\n", timeout.as_secs_f64()),
                ))
            }
        }
    }

    fn write_script(&self, source: &str) -> std::io::Result<PathBuf> {
        let mut file = tempfile::Builder::new()
            .prefix("ara_auto_")
            .suffix(".sh")
            .tempfile_in(&self.work_dir)?;
        file.write_all(source.as_bytes())?;
        file.flush()?;
        let (_, path) = file.keep().map_err(|e| e.error)?;
        Ok(path)
    }
}
