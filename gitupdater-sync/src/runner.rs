//! The process capability: run a program in a directory, get its exit code
//! and output back.
//!
//! Everything that shells out (git, the notifier) goes through [`Runner`], so
//! tests can swap in `fake::ScriptedRunner`.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::error::RunnerError;

const POLL_INTERVAL: Duration = Duration::from_millis(25);

// ---------------------------------------------------------------------------
// Invocation / output
// ---------------------------------------------------------------------------

/// One command to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub env: Vec<(String, String)>,
    /// Kill the child once this much time has passed.
    pub timeout: Option<Duration>,
}

impl Invocation {
    pub fn new(program: impl Into<String>, cwd: impl AsRef<Path>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: cwd.as_ref().to_path_buf(),
            env: Vec::new(),
            timeout: None,
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

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// `program arg1 arg2`, for logs and error messages.
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// What a finished process produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// `None` when the process was terminated by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// The most useful text for a human: stderr if any, else stdout.
    pub fn diagnostic(&self) -> &str {
        let err = self.stderr.trim();
        if err.is_empty() {
            self.stdout.trim()
        } else {
            err
        }
    }
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

/// Narrow process capability.
pub trait Runner: Send + Sync {
    fn execute(&self, invocation: &Invocation) -> Result<CommandOutput, RunnerError>;
}

impl<R: Runner + ?Sized> Runner for Arc<R> {
    fn execute(&self, invocation: &Invocation) -> Result<CommandOutput, RunnerError> {
        (**self).execute(invocation)
    }
}

impl<R: Runner + ?Sized> Runner for &R {
    fn execute(&self, invocation: &Invocation) -> Result<CommandOutput, RunnerError> {
        (**self).execute(invocation)
    }
}

/// Runs real processes with a C locale, so tool output is stable to parse.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner;

impl Runner for ProcessRunner {
    fn execute(&self, invocation: &Invocation) -> Result<CommandOutput, RunnerError> {
        let program = invocation.program.clone();
        tracing::debug!(cwd = %invocation.cwd.display(), "running {}", invocation.command_line());

        let mut child = Command::new(&invocation.program)
            .args(&invocation.args)
            .current_dir(&invocation.cwd)
            .env("LANG", "C")
            .env("LC_ALL", "C")
            .envs(invocation.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| RunnerError::Spawn {
                program: program.clone(),
                source,
            })?;

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let status = match invocation.timeout {
            Some(limit) => wait_until(&mut child, limit, &program)?,
            None => child.wait().map_err(|source| RunnerError::Io {
                program: program.clone(),
                source,
            })?,
        };

        Ok(CommandOutput {
            code: status.code(),
            stdout: collect(stdout),
            stderr: collect(stderr),
        })
    }
}

/// Poll the child until it exits or `limit` passes; on timeout the child is
/// killed and reaped. Reader threads are left to finish on their own.
fn wait_until(child: &mut Child, limit: Duration, program: &str) -> Result<ExitStatus, RunnerError> {
    let deadline = Instant::now() + limit;
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(status),
            Ok(None) => {}
            Err(source) => {
                return Err(RunnerError::Io {
                    program: program.to_string(),
                    source,
                })
            }
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            return Err(RunnerError::TimedOut {
                program: program.to_string(),
                after: limit,
            });
        }
        thread::sleep(POLL_INTERVAL);
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<Vec<u8>>> {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            buf
        })
    })
}

fn collect(handle: Option<JoinHandle<Vec<u8>>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn tmp() -> tempfile::TempDir {
        tempfile::TempDir::new().expect("tempdir")
    }

    #[test]
    fn captures_exit_code_and_both_streams() {
        let dir = tmp();
        let out = ProcessRunner
            .execute(
                &Invocation::new("sh", dir.path())
                    .args(["-c", "echo out; echo err >&2; exit 3"]),
            )
            .expect("run sh");
        assert_eq!(out.code, Some(3));
        assert_eq!(out.stdout.trim(), "out");
        assert_eq!(out.stderr.trim(), "err");
        assert_eq!(out.diagnostic(), "err");
    }

    #[test]
    fn runs_in_the_requested_directory_with_c_locale() {
        let dir = tmp();
        let out = ProcessRunner
            .execute(&Invocation::new("sh", dir.path()).args(["-c", "pwd; echo $LANG"]))
            .expect("run sh");
        let mut lines = out.stdout.lines();
        let pwd = std::fs::canonicalize(lines.next().expect("pwd")).expect("canon");
        assert_eq!(pwd, std::fs::canonicalize(dir.path()).expect("canon"));
        assert_eq!(lines.next(), Some("C"));
    }

    #[test]
    fn missing_program_is_a_spawn_error() {
        let dir = tmp();
        let err = ProcessRunner
            .execute(&Invocation::new("gitupdater-no-such-binary", dir.path()))
            .unwrap_err();
        assert!(err.is_not_found(), "got: {err}");
    }

    #[test]
    fn slow_process_is_killed_at_the_deadline() {
        let dir = tmp();
        let started = Instant::now();
        let err = ProcessRunner
            .execute(
                &Invocation::new("sleep", dir.path())
                    .arg("5")
                    .timeout(Duration::from_millis(200)),
            )
            .unwrap_err();
        assert!(matches!(err, RunnerError::TimedOut { .. }), "got: {err}");
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn command_line_joins_program_and_args() {
        let inv = Invocation::new("git", "/tmp").args(["merge", "--ff-only"]);
        assert_eq!(inv.command_line(), "git merge --ff-only");
    }
}
