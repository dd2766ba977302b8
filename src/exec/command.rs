//! Command request/response types and the executor trait.

use std::fmt;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use super::ExecError;

/// A command to run on a host.
///
/// This is a value type that can be constructed and passed to any
/// [`CommandExecutor`] implementation. Arguments are passed verbatim and
/// never interpreted by a shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// Program name or path.
    pub program: String,
    /// Arguments, one element per argv entry.
    pub args: Vec<String>,
    /// Optional bytes written to the process's standard input.
    pub stdin: Option<Vec<u8>>,
}

impl Command {
    /// Creates a command with no arguments.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            stdin: None,
        }
    }

    /// Appends one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Sets the bytes fed to standard input.
    #[must_use]
    pub fn with_stdin(mut self, stdin: Vec<u8>) -> Self {
        self.stdin = Some(stdin);
        self
    }

    /// Wraps this command so it runs through `wrapper` (e.g. `sudo -n`).
    #[must_use]
    pub fn wrapped(self, wrapper: &[String]) -> Self {
        let Some((program, rest)) = wrapper.split_first() else {
            return self;
        };
        let mut args = rest.to_vec();
        args.push(self.program);
        args.extend(self.args);
        Self {
            program: program.clone(),
            args,
            stdin: self.stdin,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                write!(f, " '{arg}'")?;
            } else {
                write!(f, " {arg}")?;
            }
        }
        Ok(())
    }
}

/// The captured result of a finished command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Captured standard output (lossy UTF-8).
    pub stdout: String,
    /// Captured standard error (lossy UTF-8).
    pub stderr: String,
    /// Exit code; `-1` when the process was terminated by a signal.
    pub exit_code: i32,
    /// Wall-clock time the command took.
    pub duration: Duration,
}

impl CommandOutput {
    /// Creates an output record.
    #[must_use]
    pub fn new(
        exit_code: i32,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
        duration: Duration,
    ) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: stderr.into(),
            exit_code,
            duration,
        }
    }

    /// Returns true if the command exited with status 0.
    #[must_use]
    pub const fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Returns true if stdout or stderr mentions any of `markers`.
    ///
    /// Used to recognize "already gone" and "already exists" answers from
    /// tools that only report them as text.
    #[must_use]
    pub fn mentions_any(&self, markers: &[&str]) -> bool {
        markers
            .iter()
            .any(|m| self.stderr.contains(m) || self.stdout.contains(m))
    }
}

/// Trait for running commands and transferring files on a host.
///
/// # Design
///
/// This trait abstracts process execution, enabling:
/// - Dependency injection for testing with scripted executors
/// - Running the same backends locally or through a remote transport
///
/// A non-zero exit is reported through [`CommandOutput`], not as an error;
/// only failures to run the command at all are [`ExecError`]s.
pub trait CommandExecutor: Send + Sync {
    /// Runs a command to completion and captures its output.
    fn execute(
        &self,
        command: &Command,
    ) -> impl Future<Output = Result<CommandOutput, ExecError>> + Send;

    /// Copies a local file to the target host.
    fn upload(&self, local: &Path, remote: &Path)
    -> impl Future<Output = Result<(), ExecError>> + Send;

    /// Copies a file from the target host to a local path.
    fn download(
        &self,
        remote: &Path,
        local: &Path,
    ) -> impl Future<Output = Result<(), ExecError>> + Send;
}

impl<E: CommandExecutor> CommandExecutor for Arc<E> {
    fn execute(
        &self,
        command: &Command,
    ) -> impl Future<Output = Result<CommandOutput, ExecError>> + Send {
        (**self).execute(command)
    }

    fn upload(
        &self,
        local: &Path,
        remote: &Path,
    ) -> impl Future<Output = Result<(), ExecError>> + Send {
        (**self).upload(local, remote)
    }

    fn download(
        &self,
        remote: &Path,
        local: &Path,
    ) -> impl Future<Output = Result<(), ExecError>> + Send {
        (**self).download(remote, local)
    }
}
