// src/exec/process.rs

//! Shell command task.

use std::process::Stdio;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::engine::DoneSignal;
use crate::recipe::TaskAdapter;

/// Runs one shell command; succeeds iff it exits with status 0.
///
/// Configure it from a setup handler with [`set_command`](Self::set_command).
/// stdout is logged at `info`, stderr at `debug`. Dropping the adapter kills
/// the process.
///
/// # Panics
///
/// The process is awaited on a `tokio::task::spawn_local` task, so the tree
/// must be started inside a tokio `LocalSet`. Starting it on a runtime
/// without a `LocalSet` panics. Without any runtime the task reports failure.
#[derive(Debug, Default)]
pub struct ProcessTask {
    name: String,
    command: Option<String>,
    process: Option<JoinHandle<()>>,
}

impl ProcessTask {
    pub fn set_command(&mut self, command: impl Into<String>) {
        self.command = Some(command.into());
    }

    /// Label used in log lines.
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn command(&self) -> Option<&str> {
        self.command.as_deref()
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl TaskAdapter for ProcessTask {
    fn start(&mut self, done: DoneSignal) {
        let Some(command) = self.command.clone() else {
            error!(task = %self.name, "ProcessTask started without a command");
            done.emit(false);
            return;
        };
        // Only the missing runtime is detectable; a missing `LocalSet` panics below.
        if tokio::runtime::Handle::try_current().is_err() {
            error!(task = %self.name, "ProcessTask started without a tokio runtime; reporting failure");
            done.emit(false);
            return;
        }

        let name = self.name.clone();
        self.process = Some(tokio::task::spawn_local(async move {
            let success = match run_command(&name, &command).await {
                Ok(code) => code == 0,
                Err(err) => {
                    error!(task = %name, error = %err, "task execution error");
                    false
                }
            };
            done.emit(success);
        }));
    }
}

impl Drop for ProcessTask {
    fn drop(&mut self) {
        if let Some(process) = self.process.take() {
            // The child is killed when the aborted future drops it.
            process.abort();
        }
    }
}

/// Spawn `command` through the platform shell and wait for it.
///
/// Returns the exit code (`-1` when the process was killed by a signal).
pub async fn run_command(name: &str, command: &str) -> Result<i32> {
    info!(task = %name, cmd = %command, "starting task process");

    let mut cmd = if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(command);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(command);
        c
    };
    cmd.stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd
        .spawn()
        .with_context(|| format!("spawning process for task '{name}'"))?;

    if let Some(stdout) = child.stdout.take() {
        let task_name = name.to_string();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                info!(task = %task_name, "stdout: {}", line);
            }
        });
    }
    if let Some(stderr) = child.stderr.take() {
        let task_name = name.to_string();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(task = %task_name, "stderr: {}", line);
            }
        });
    }

    let status = child
        .wait()
        .await
        .with_context(|| format!("waiting for process of task '{name}'"))?;
    let code = status.code().unwrap_or(-1);
    info!(
        task = %name,
        exit_code = code,
        success = status.success(),
        "task process exited"
    );
    Ok(code)
}
