//! `std::process` backed command runner.

use std::io::{self, BufRead, BufReader, Read};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};

use super::types::{CommandSpec, ProcessResult, RunnerError, RunnerResult};
use super::CommandRunner;

/// Runs commands as real child processes.
///
/// stdout and stderr are drained on background threads so a chatty tool can
/// never block on a full pipe. With echo enabled every line is also written
/// to this process's stderr as it arrives, so the operator sees the same
/// diagnostics as when running the tool by hand.
///
/// A command with a deadline runs in its own process group on unix and the
/// whole group is killed when the deadline passes, so helpers the tool
/// forked cannot keep the run alive.
pub struct SystemRunner {
    echo: bool,
    poll_interval: Duration,
    output_grace: Duration,
}

impl SystemRunner {
    pub fn new() -> Self {
        Self {
            echo: false,
            poll_interval: Duration::from_millis(50),
            output_grace: Duration::from_secs(2),
        }
    }

    /// Echo child output live to stderr.
    pub fn with_echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    /// How often a deadline-bound child is polled for exit.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// How long to keep reading output after the child is gone.
    ///
    /// Descendants that inherited the pipes can hold them open past the
    /// child's exit; whatever arrived by then is kept.
    pub fn with_output_grace(mut self, grace: Duration) -> Self {
        self.output_grace = grace;
        self
    }

    /// Wait for exit, killing the child once `timeout` elapses.
    ///
    /// Returns `None` when the deadline was hit.
    fn wait_with_deadline(
        &self,
        child: &mut Child,
        started: Instant,
        timeout: Option<Duration>,
    ) -> io::Result<Option<ExitStatus>> {
        let Some(limit) = timeout else {
            return child.wait().map(Some);
        };

        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(Some(status));
            }
            if started.elapsed() >= limit {
                // kill fails if the child exited in between; reaping covers both cases
                let _ = terminate(child);
                child.wait()?;
                return Ok(None);
            }
            thread::sleep(self.poll_interval);
        }
    }
}

impl Default for SystemRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandRunner for SystemRunner {
    fn execute(&self, spec: &CommandSpec) -> RunnerResult<ProcessResult> {
        let program = spec.program_name();

        if let Some(dir) = spec.working_dir_path() {
            if !dir.is_dir() {
                return Err(RunnerError::Spawn {
                    program,
                    source: io::Error::new(
                        io::ErrorKind::NotFound,
                        format!("working directory does not exist: {}", dir.display()),
                    ),
                });
            }
        }

        let mut cmd = Command::new(spec.program());
        cmd.args(spec.arg_tokens())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = spec.working_dir_path() {
            cmd.current_dir(dir);
        }
        // Commands without a deadline stay in our group so terminal signals reach them
        #[cfg(unix)]
        if spec.timeout_limit().is_some() {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        tracing::debug!("Running: {}", spec.display());

        let started = Instant::now();
        let mut child = cmd.spawn().map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => RunnerError::executable_not_found(
                spec.program().to_string_lossy().to_string(),
            ),
            _ => RunnerError::Spawn {
                program: program.clone(),
                source: e,
            },
        })?;

        let (tx, rx) = mpsc::channel();
        if let Some(pipe) = child.stdout.take() {
            drain(pipe, Stream::Stdout, self.echo, tx.clone());
        }
        if let Some(pipe) = child.stderr.take() {
            drain(pipe, Stream::Stderr, self.echo, tx.clone());
        }
        drop(tx);

        let waited = self.wait_with_deadline(&mut child, started, spec.timeout_limit());
        let (stdout, stderr) = collect(&rx, Instant::now() + self.output_grace);
        let duration = started.elapsed();

        let status = waited.map_err(|e| RunnerError::Io {
            program: program.clone(),
            source: e,
        })?;

        let Some(status) = status else {
            tracing::warn!("{} killed after {:.1}s", program, duration.as_secs_f64());
            // timeout_limit is always set when the deadline path returns None
            let limit = spec.timeout_limit().unwrap_or(duration);
            return Err(RunnerError::timed_out(program, limit, stdout, stderr));
        };

        // Signal termination has no code on unix
        let exit_code = status.code().unwrap_or(-1);
        tracing::debug!(
            "{} exited with code {} after {:.1}s",
            program,
            exit_code,
            duration.as_secs_f64()
        );

        if !status.success() {
            return Err(RunnerError::non_zero_exit(program, exit_code, stdout, stderr));
        }

        Ok(ProcessResult {
            exit_code,
            stdout,
            stderr,
            duration,
        })
    }
}

#[derive(Debug, Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

/// Kill the child's process group, or just the child where there is none.
#[cfg(unix)]
fn terminate(child: &mut Child) -> io::Result<()> {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let group = Pid::from_raw(child.id() as i32);
    match killpg(group, Signal::SIGKILL) {
        Ok(()) => Ok(()),
        Err(_) => child.kill(),
    }
}

#[cfg(not(unix))]
fn terminate(child: &mut Child) -> io::Result<()> {
    child.kill()
}

/// Forward a pipe line by line on a detached thread until EOF.
fn drain<R: Read + Send + 'static>(pipe: R, stream: Stream, echo: bool, tx: Sender<(Stream, String)>) {
    thread::spawn(move || {
        let mut reader = BufReader::new(pipe);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf).into_owned();
                    if echo {
                        eprint!("{}", line);
                    }
                    if tx.send((stream, line)).is_err() {
                        break;
                    }
                }
            }
        }
    });
}

/// Gather forwarded lines until both pipes close or `deadline` passes.
fn collect(rx: &Receiver<(Stream, String)>, deadline: Instant) -> (String, String) {
    let mut stdout = String::new();
    let mut stderr = String::new();
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match rx.recv_timeout(remaining) {
            Ok((Stream::Stdout, line)) => stdout.push_str(&line),
            Ok((Stream::Stderr, line)) => stderr.push_str(&line),
            Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {
                tracing::debug!("Output pipes still open after exit; keeping what arrived");
                break;
            }
        }
    }
    (stdout, stderr)
}
