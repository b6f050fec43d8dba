//! External tool execution
//!
//! Every external program (cmake, ninja, strip) goes through a [`ToolRunner`]
//! so the command line is logged once and failures carry the exit status.

use crate::environment::BaseEnvironment;
use crate::error::{BuildError, BuildResult};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

/// A fully described external command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub current_dir: Option<PathBuf>,
    /// Complete environment for the child; inherits the parent's when `None`
    pub env: Option<BaseEnvironment>,
}

impl ToolCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
            env: None,
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

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    pub fn env(mut self, env: BaseEnvironment) -> Self {
        self.env = Some(env);
        self
    }

    /// Shell-style rendering for logs and error messages
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.display().to_string())
            .chain(self.args.iter().cloned())
            .map(|part| quote_arg(&part))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn quote_arg(arg: &str) -> String {
    if !arg.is_empty() && !arg.contains(|c: char| c.is_whitespace() || c == '"') {
        arg.to_string()
    } else {
        format!("\"{}\"", arg.replace('"', "\\\""))
    }
}

/// Result of a finished command
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub execution_time: Duration,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Combined output
    pub fn output(&self) -> String {
        let mut output = String::new();
        if !self.stdout.is_empty() {
            output.push_str("STDOUT:\n");
            output.push_str(&self.stdout);
            output.push('\n');
        }
        if !self.stderr.is_empty() {
            output.push_str("STDERR:\n");
            output.push_str(&self.stderr);
        }
        output
    }
}

/// Runs external commands on behalf of a named build step
pub trait ToolRunner: Send + Sync {
    /// Run `command` to completion. A non-zero exit is an
    /// [`BuildError::ExternalBuild`].
    fn run(&self, step: &str, command: &ToolCommand) -> BuildResult<ToolOutput>;
}

/// Runs commands as child processes
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    /// Capture stdout/stderr instead of streaming them to the terminal
    capture_output: bool,
}

impl ProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capture(mut self, capture: bool) -> Self {
        self.capture_output = capture;
        self
    }
}

impl ToolRunner for ProcessRunner {
    fn run(&self, step: &str, command: &ToolCommand) -> BuildResult<ToolOutput> {
        let command_line = command.command_line();
        log::info!("check_call: {}", command_line);

        let mut child = Command::new(&command.program);
        child.args(&command.args);
        if let Some(dir) = &command.current_dir {
            child.current_dir(dir);
        }
        if let Some(env) = &command.env {
            child.env_clear().envs(env.iter());
        }
        if self.capture_output {
            child.stdout(Stdio::piped()).stderr(Stdio::piped());
        }

        let start = Instant::now();
        let output = child.output().map_err(|e| {
            BuildError::external(step, command_line.as_str(), "failed to spawn", e.to_string())
        })?;

        let result = ToolOutput {
            exit_code: output.status.code().unwrap_or(1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            execution_time: start.elapsed(),
        };

        if !output.status.success() {
            return Err(BuildError::external(
                step,
                command_line,
                output.status,
                result.output(),
            ));
        }

        log::debug!(
            "{} finished in {:.2}s",
            step,
            result.execution_time.as_secs_f64()
        );
        Ok(result)
    }
}
