//! External process execution.
//!
//! Every command is an argument vector handed straight to the OS; nothing
//! goes through a local shell. Remote commands reach the satellite through
//! `ssh`, see [`crate::location::Location::command`].

use async_trait::async_trait;
use std::fmt;
use std::io;
use std::process::Stdio;
use tokio::process::Command;

/// A program and its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Captured result of a finished process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl CommandOutput {
    /// Successful output with the given stdout.
    pub fn ok(stdout: impl Into<Vec<u8>>) -> Self {
        Self {
            success: true,
            code: Some(0),
            stdout: stdout.into(),
            stderr: Vec::new(),
        }
    }

    /// Failed output with the given exit code and stderr.
    pub fn failed(code: i32, stderr: impl Into<Vec<u8>>) -> Self {
        Self {
            success: false,
            code: Some(code),
            stdout: Vec::new(),
            stderr: stderr.into(),
        }
    }

    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    /// Stderr with surrounding whitespace removed.
    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).trim().to_string()
    }

    /// Describe a failure for logs: stderr when present, exit code otherwise.
    pub fn diagnostic(&self) -> String {
        let stderr = self.stderr_lossy();
        if !stderr.is_empty() {
            return stderr;
        }
        match self.code {
            Some(code) => format!("exited with status {}", code),
            None => "terminated by signal".to_string(),
        }
    }
}

/// Runs external commands to completion.
#[async_trait]
pub trait Runner: Send + Sync {
    async fn run(&self, command: &CommandSpec) -> io::Result<CommandOutput>;
}

/// [`Runner`] backed by real child processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessRunner;

#[async_trait]
impl Runner for ProcessRunner {
    async fn run(&self, command: &CommandSpec) -> io::Result<CommandOutput> {
        tracing::trace!(command = %command, "Spawning process");

        let output = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        Ok(CommandOutput {
            success: output.status.success(),
            code: output.status.code(),
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use std::sync::Mutex;

    type Handler = Box<dyn Fn(&CommandSpec) -> io::Result<CommandOutput> + Send + Sync>;

    /// Runner answering from a closure and recording every command.
    pub(crate) struct FakeRunner {
        handler: Handler,
        pub(crate) calls: Mutex<Vec<CommandSpec>>,
    }

    impl FakeRunner {
        pub(crate) fn new<F>(handler: F) -> Self
        where
            F: Fn(&CommandSpec) -> io::Result<CommandOutput> + Send + Sync + 'static,
        {
            Self {
                handler: Box::new(handler),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn calls(&self) -> Vec<CommandSpec> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Runner for FakeRunner {
        async fn run(&self, command: &CommandSpec) -> io::Result<CommandOutput> {
            self.calls.lock().unwrap().push(command.clone());
            (self.handler)(command)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_joins_arguments() {
        let cmd = CommandSpec::new("rsync").args(["-rz", "a", "b/"]);
        assert_eq!(cmd.to_string(), "rsync -rz a b/");
    }

    #[test]
    fn test_diagnostic_prefers_stderr() {
        let out = CommandOutput::failed(23, "  rsync: link_stat failed\n");
        assert_eq!(out.diagnostic(), "rsync: link_stat failed");

        let out = CommandOutput::failed(12, "");
        assert_eq!(out.diagnostic(), "exited with status 12");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_runner_captures_output() {
        let out = ProcessRunner
            .run(&CommandSpec::new("echo").arg("hello"))
            .await
            .unwrap();
        assert!(out.success);
        assert_eq!(out.stdout_lossy().trim(), "hello");
        assert!(out.stderr.is_empty());
    }

    #[tokio::test]
    async fn test_process_runner_missing_program() {
        let result = ProcessRunner
            .run(&CommandSpec::new("definitely-not-a-real-program-xyz"))
            .await;
        assert!(result.is_err());
    }
}
