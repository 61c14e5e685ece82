//! Process execution behind the `CommandRunner` trait.
//!
//! `SystemRunner` spawns real processes with `tokio::process`;
//! `ScriptedRunner` replays canned output and records every call.

use std::fmt;
use std::process::Stdio;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use tokio::process::Command;

use crate::error::{DiskmonError, Result};
use crate::normalize::smart::EXIT_COMMAND_NOT_FOUND;

/// Longest stdout/stderr excerpt written to the debug log
const LOG_EXCERPT_CHARS: usize = 2000;

/// Argument vector for one external command. Never passed through a shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub program: String,
    pub args: Vec<String>,
    pub timeout: Duration,
    /// Executables run by `program` that must also exist locally (e.g. the
    /// target of `sudo`)
    pub requires: Vec<String>,
}

impl CommandLine {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout: Duration::from_secs(3),
            requires: Vec::new(),
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

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn requires(mut self, executable: impl Into<String>) -> Self {
        self.requires.push(executable.into());
        self
    }

    /// True if `needle` is the program or one of its arguments
    pub fn mentions(&self, needle: &str) -> bool {
        self.program == needle || self.args.iter().any(|a| a == needle)
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Captured result of a process that ran to completion
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process was terminated by a signal
    pub exit_code: Option<i32>,
}

impl CommandOutput {
    pub fn new(stdout: impl Into<String>, stderr: impl Into<String>, exit_code: i32) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: stderr.into(),
            exit_code: Some(exit_code),
        }
    }

    pub fn ok(stdout: impl Into<String>) -> Self {
        Self::new(stdout, "", 0)
    }

    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// stdout and stderr joined, whichever are non-empty
    pub fn combined(&self) -> String {
        let stdout = self.stdout.trim();
        let stderr = self.stderr.trim();
        match (stdout.is_empty(), stderr.is_empty()) {
            (_, true) => stdout.to_string(),
            (true, false) => stderr.to_string(),
            (false, false) => format!("{}\n{}", stdout, stderr),
        }
    }

    /// A wrapping shell (ssh, sudo) could not find the target executable
    pub fn command_not_found(&self) -> bool {
        self.exit_code == Some(EXIT_COMMAND_NOT_FOUND) || self.stderr.to_lowercase().contains("command not found")
    }
}

/// Runs external commands
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run to completion. `Err` means the command could not produce output
    /// at all (missing, not permitted, timed out); a non-zero exit is `Ok`.
    async fn run(&self, command: &CommandLine) -> Result<CommandOutput>;
}

/// Truncate on a char boundary, marking the cut
pub fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}... [truncated, {} bytes total]", &text[..idx], text.len()),
        None => text.to_string(),
    }
}

/// Runner that spawns real processes
#[derive(Debug, Clone, Default)]
pub struct SystemRunner;

impl SystemRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, command: &CommandLine) -> Result<CommandOutput> {
        for executable in std::iter::once(&command.program).chain(&command.requires) {
            if which::which(executable).is_err() {
                return Err(DiskmonError::CommandUnavailable(format!("{}: command not found", executable)));
            }
        }

        debug!("Executing: {}", command);

        let child = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => {
                    DiskmonError::CommandUnavailable(format!("{}: command not found", command.program))
                }
                std::io::ErrorKind::PermissionDenied => {
                    DiskmonError::CommandUnavailable(format!("{}: permission denied", command.program))
                }
                _ => DiskmonError::Execution(format!("Failed to spawn {}: {}", command.program, e)),
            })?;

        // dropping the future on timeout kills the child
        let output = match tokio::time::timeout(command.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(DiskmonError::Execution(format!("{} failed: {}", command.program, e)));
            }
            Err(_) => {
                return Err(DiskmonError::Execution(format!(
                    "{} timed out after {}ms",
                    command.program,
                    command.timeout.as_millis()
                )));
            }
        };

        let output = CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            exit_code: output.status.code(),
        };

        debug!("{} exited with {:?}", command.program, output.exit_code);
        if !output.stdout.is_empty() {
            debug!("STDOUT:\n{}", truncate(&output.stdout, LOG_EXCERPT_CHARS));
        }
        if !output.stderr.is_empty() {
            debug!("STDERR:\n{}", truncate(&output.stderr, LOG_EXCERPT_CHARS));
        }

        Ok(output)
    }
}

#[derive(Debug, Clone)]
enum Reply {
    Output(CommandOutput),
    Unavailable,
}

#[derive(Debug, Clone)]
struct Script {
    key: String,
    reply: Reply,
    delay: Duration,
}

/// Runner that replays canned responses; for tests and dry runs.
///
/// A script matches when its key equals the program or any argument; the
/// first registered match wins.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    scripts: Vec<Script>,
    calls: Mutex<Vec<CommandLine>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reply with `output` to commands mentioning `key`
    pub fn respond_to(self, key: &str, output: CommandOutput) -> Self {
        self.respond_after(key, output, Duration::ZERO)
    }

    /// Same as `respond_to` but sleep first
    pub fn respond_after(mut self, key: &str, output: CommandOutput, delay: Duration) -> Self {
        self.scripts.push(Script {
            key: key.to_string(),
            reply: Reply::Output(output),
            delay,
        });
        self
    }

    /// Behave as if the executable were missing
    pub fn unavailable(mut self, key: &str) -> Self {
        self.scripts.push(Script {
            key: key.to_string(),
            reply: Reply::Unavailable,
            delay: Duration::ZERO,
        });
        self
    }

    /// Every command seen so far, in call order
    pub fn calls(&self) -> Vec<CommandLine> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, command: &CommandLine) -> Result<CommandOutput> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(command.clone());

        let script = self
            .scripts
            .iter()
            .find(|s| command.mentions(&s.key))
            .ok_or_else(|| DiskmonError::Execution(format!("no scripted response for '{}'", command)))?;

        if !script.delay.is_zero() {
            tokio::time::sleep(script.delay).await;
        }

        match &script.reply {
            Reply::Output(output) => Ok(output.clone()),
            Reply::Unavailable => Err(DiskmonError::CommandUnavailable(format!(
                "{}: command not found",
                command.program
            ))),
        }
    }
}
