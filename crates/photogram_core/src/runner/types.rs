//! Command, result, and error types for external process execution.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

/// Number of trailing output lines carried in error messages.
const ERROR_TAIL_LINES: usize = 15;

/// A fully resolved external command.
///
/// Arguments are discrete tokens handed straight to the OS; nothing is ever
/// interpreted by a shell. Built once by the command builders and never
/// mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    program: PathBuf,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
    timeout: Option<Duration>,
}

impl CommandSpec {
    /// Create a command for the given program with no arguments.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            timeout: None,
        }
    }

    /// Append a single argument token.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append a path argument token.
    pub fn path_arg(self, path: &Path) -> Self {
        self.arg(path.to_string_lossy())
    }

    /// Append several argument tokens.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Run the process from this directory instead of inheriting one.
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Kill the process if it runs longer than `timeout`.
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Short tool name for messages (`/opt/mvs/bin/DensifyPointCloud` -> `DensifyPointCloud`).
    pub fn program_name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.program.to_string_lossy().to_string())
    }

    pub fn arg_tokens(&self) -> &[String] {
        &self.args
    }

    pub fn working_dir_path(&self) -> Option<&Path> {
        self.working_dir.as_deref()
    }

    pub fn timeout_limit(&self) -> Option<Duration> {
        self.timeout
    }

    /// Render the command line for logs.
    ///
    /// Tokens containing whitespace or quotes are double-quoted. The result is
    /// for humans only and is never executed.
    pub fn display(&self) -> String {
        std::iter::once(self.program.to_string_lossy().to_string())
            .chain(self.args.iter().cloned())
            .map(|token| quote_for_display(&token))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn quote_for_display(token: &str) -> String {
    if token.is_empty() {
        return "\"\"".to_string();
    }
    if token.chars().any(|c| c.is_whitespace() || c == '"' || c == '\'') {
        format!("\"{}\"", token.replace('"', "\\\""))
    } else {
        token.to_string()
    }
}

/// Outcome of a process that ran to completion with a zero exit status.
#[derive(Debug, Clone)]
pub struct ProcessResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

impl ProcessResult {
    /// Iterate over captured output lines, tagging stderr lines.
    pub fn output_lines(&self) -> impl Iterator<Item = (&str, bool)> {
        self.stdout
            .lines()
            .map(|l| (l, false))
            .chain(self.stderr.lines().map(|l| (l, true)))
    }
}

/// Errors from running an external command.
#[derive(Error, Debug)]
pub enum RunnerError {
    /// The program could not be resolved to an executable.
    #[error("Executable not found: {program}")]
    ExecutableNotFound { program: String },

    /// The process ran but reported failure.
    #[error("{program} exited with code {code}{}", output_tail(.stderr, .stdout))]
    NonZeroExit {
        program: String,
        code: i32,
        stdout: String,
        stderr: String,
    },

    /// The process exceeded its deadline and was killed.
    #[error("{program} timed out after {}s and was terminated{}", whole_secs(.timeout), output_tail(.stderr, .stdout))]
    TimedOut {
        program: String,
        timeout: Duration,
        stdout: String,
        stderr: String,
    },

    /// The process could not be started for a reason other than a missing executable.
    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    /// I/O failure while supervising a running process.
    #[error("I/O error while running {program}: {source}")]
    Io {
        program: String,
        #[source]
        source: io::Error,
    },
}

impl RunnerError {
    pub fn executable_not_found(program: impl Into<String>) -> Self {
        Self::ExecutableNotFound {
            program: program.into(),
        }
    }

    pub fn non_zero_exit(
        program: impl Into<String>,
        code: i32,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
    ) -> Self {
        Self::NonZeroExit {
            program: program.into(),
            code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    pub fn timed_out(
        program: impl Into<String>,
        timeout: Duration,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
    ) -> Self {
        Self::TimedOut {
            program: program.into(),
            timeout,
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    /// Name of the program this error concerns.
    pub fn program(&self) -> &str {
        match self {
            Self::ExecutableNotFound { program }
            | Self::NonZeroExit { program, .. }
            | Self::TimedOut { program, .. }
            | Self::Spawn { program, .. }
            | Self::Io { program, .. } => program,
        }
    }

    /// Exit code, when the process ran to completion.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::NonZeroExit { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Captured `(stdout, stderr)` for failures that got as far as running.
    pub fn captured_output(&self) -> Option<(&str, &str)> {
        match self {
            Self::NonZeroExit { stdout, stderr, .. } | Self::TimedOut { stdout, stderr, .. } => {
                Some((stdout, stderr))
            }
            _ => None,
        }
    }
}

/// Result type for runner operations.
pub type RunnerResult<T> = Result<T, RunnerError>;

fn whole_secs(timeout: &Duration) -> u64 {
    timeout.as_secs()
}

/// Last lines of stderr (or stdout when stderr is empty), formatted for an error message.
fn output_tail(stderr: &str, stdout: &str) -> String {
    let source = if stderr.trim().is_empty() { stdout } else { stderr };
    let lines: Vec<&str> = source.lines().filter(|l| !l.trim().is_empty()).collect();
    if lines.is_empty() {
        return String::new();
    }
    let start = lines.len().saturating_sub(ERROR_TAIL_LINES);
    let mut out = String::from("\n  output tail:");
    for line in &lines[start..] {
        out.push_str("\n    ");
        out.push_str(line);
    }
    out
}
