//! Command execution
//!
//! Actions never spawn processes themselves; they hand a [`CommandRequest`]
//! to a [`CommandRunner`]. [`ShellRunner`] runs it through the platform shell.

use crate::error::{ExecutionError, ExecutionResult};
use crate::runner::context::OutputSink;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{trace, warn};

/// A shell command to run
#[derive(Debug, Clone)]
pub struct CommandRequest {
    pub command: String,
    pub cwd: PathBuf,
    pub env: HashMap<String, String>,
    /// When set together with `output`, output lines are prefixed with it
    pub label: Option<String>,
    pub output: Option<OutputSink>,
}

/// Result of a finished command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandOutcome {
    /// Exit code, `None` when terminated by a signal
    pub code: Option<i32>,
}

impl CommandOutcome {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Runs shell commands on behalf of actions
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, request: CommandRequest) -> ExecutionResult<CommandOutcome>;
}

/// Runs commands through `sh -c` (or `cmd /C` on Windows)
#[derive(Debug, Clone, Copy, Default)]
pub struct ShellRunner;

#[async_trait]
impl CommandRunner for ShellRunner {
    async fn run(&self, request: CommandRequest) -> ExecutionResult<CommandOutcome> {
        let mut command = shell_command(&request.command);
        command
            .current_dir(&request.cwd)
            .envs(&request.env)
            .stdin(Stdio::inherit());

        let spawn_error = |e: std::io::Error| ExecutionError::Spawn {
            command: request.command.clone(),
            error: e.to_string(),
        };

        let status = match (&request.label, &request.output) {
            (Some(label), Some(sink)) => {
                command.stdout(Stdio::piped()).stderr(Stdio::piped());
                let mut child = command.spawn().map_err(spawn_error)?;

                let stdout = child.stdout.take();
                let stderr = child.stderr.take();
                tokio::join!(
                    forward(stdout, sink, label),
                    forward(stderr, sink, label)
                );

                child.wait().await.map_err(spawn_error)?
            }
            _ => {
                command.stdout(Stdio::inherit()).stderr(Stdio::inherit());
                command.status().await.map_err(spawn_error)?
            }
        };

        trace!(command = %request.command, code = ?status.code(), "command finished");
        Ok(CommandOutcome {
            code: status.code(),
        })
    }
}

fn shell_command(command: &str) -> Command {
    if cfg!(windows) {
        let mut cmd = Command::new("cmd");
        cmd.arg("/C").arg(command);
        cmd
    } else {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command);
        cmd
    }
}

/// Copy a child stream into the sink line by line
async fn forward<R: AsyncRead + Unpin>(reader: Option<R>, sink: &OutputSink, label: &str) {
    let Some(reader) = reader else { return };
    let mut lines = BufReader::new(reader).lines();

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if let Err(e) = sink.write_line(Some(label), &line) {
                    warn!(error = %e, "failed to write command output");
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "failed to read command output");
                break;
            }
        }
    }
}
