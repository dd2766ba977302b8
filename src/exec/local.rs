//! Production executor that runs commands on the local host.

use std::path::Path;
use std::process::Stdio;
use std::time::Instant;

use tokio::io::AsyncWriteExt;

use super::{Command, CommandExecutor, CommandOutput, ExecError};

/// Runs commands as child processes of the current process.
///
/// Child processes are killed if the returned future is dropped, so a
/// timed-out or cancelled call never leaves an orphan behind.
///
/// # Example
///
/// ```no_run
/// use vlan_isolate::exec::{Command, CommandExecutor, LocalExecutor};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let output = LocalExecutor::new()
///     .execute(&Command::new("ip").args(["-o", "link", "show"]))
///     .await?;
/// println!("{}", output.stdout);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalExecutor;

impl LocalExecutor {
    /// Creates a local executor.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl CommandExecutor for LocalExecutor {
    async fn execute(&self, command: &Command) -> Result<CommandOutput, ExecError> {
        let started = Instant::now();
        tracing::trace!(command = %command, "Spawning");

        let mut child = tokio::process::Command::new(&command.program)
            .args(&command.args)
            .stdin(if command.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ExecError::Spawn {
                program: command.program.clone(),
                source,
            })?;

        let stdin = child.stdin.take();
        let input = command.stdin.as_deref();
        let feed = async move {
            if let (Some(mut pipe), Some(bytes)) = (stdin, input) {
                pipe.write_all(bytes).await?;
                pipe.shutdown().await?;
            }
            Ok::<_, std::io::Error>(())
        };

        // Feed stdin while draining output so large payloads cannot deadlock.
        let (fed, output) = tokio::join!(feed, child.wait_with_output());
        fed.map_err(|source| ExecError::Io {
            context: "writing stdin",
            source,
        })?;
        let output = output.map_err(|source| ExecError::Io {
            context: "waiting for process",
            source,
        })?;

        let result = CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code().unwrap_or(-1),
            duration: started.elapsed(),
        };
        tracing::debug!(
            command = %command,
            exit_code = result.exit_code,
            elapsed_ms = result.duration.as_millis(),
            "Command finished"
        );
        Ok(result)
    }

    async fn upload(&self, local: &Path, remote: &Path) -> Result<(), ExecError> {
        copy(local, remote).await
    }

    async fn download(&self, remote: &Path, local: &Path) -> Result<(), ExecError> {
        copy(remote, local).await
    }
}

async fn copy(from: &Path, to: &Path) -> Result<(), ExecError> {
    tokio::fs::copy(from, to)
        .await
        .map(|_| ())
        .map_err(|source| ExecError::Transfer {
            from: from.display().to_string(),
            to: to.display().to_string(),
            source,
        })
}
