//! Scripted [`Runner`] for tests: replies are matched on program, working
//! directory and an argument prefix, and every call is recorded.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use crate::error::RunnerError;
use crate::runner::{CommandOutput, Invocation, Runner};

#[derive(Debug, Clone)]
enum Reply {
    Output(CommandOutput),
    TimedOut,
    Missing,
}

#[derive(Debug)]
struct Rule {
    program: String,
    cwd: Option<PathBuf>,
    args: Vec<String>,
    /// Consumed front to back; the last reply repeats.
    replies: VecDeque<Reply>,
}

impl Rule {
    fn matches(&self, inv: &Invocation) -> bool {
        self.program == inv.program
            && self.cwd.as_ref().map_or(true, |c| c == &inv.cwd)
            && inv.args.len() >= self.args.len()
            && self.args.iter().zip(&inv.args).all(|(a, b)| a == b)
    }

    fn next(&mut self) -> Reply {
        if self.replies.len() > 1 {
            self.replies.pop_front().unwrap_or(Reply::Missing)
        } else {
            self.replies.front().cloned().unwrap_or(Reply::Missing)
        }
    }
}

/// Unmatched invocations succeed with empty output.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<Invocation>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reply with `outputs` in order (last one repeats) to `program args…`
    /// run in `cwd` (any directory when `None`). Earlier rules take priority.
    pub fn on(
        self,
        program: &str,
        cwd: Option<&Path>,
        args: &[&str],
        outputs: Vec<CommandOutput>,
    ) -> Self {
        self.push(program, cwd, args, outputs.into_iter().map(Reply::Output).collect())
    }

    pub fn on_timeout(self, program: &str, cwd: Option<&Path>, args: &[&str]) -> Self {
        self.push(program, cwd, args, VecDeque::from([Reply::TimedOut]))
    }

    /// Every invocation of `program` fails as if it were not installed.
    pub fn missing(self, program: &str) -> Self {
        self.push(program, None, &[], VecDeque::from([Reply::Missing]))
    }

    /// A clean working copy at `path`, tracking `origin/main`, whose `HEAD`
    /// moves from `before` to `after` once merged. `before == after` scripts
    /// an up-to-date repo.
    pub fn git_repo(self, path: &Path, before: &str, after: &str) -> Self {
        let behind = if before == after { "0" } else { "1" };
        let toplevel = format!("{}\n", path.display());
        self.on(
            "git",
            Some(path),
            &["rev-parse", "--show-toplevel"],
            vec![CommandOutput::ok(toplevel)],
        )
        .on("git", Some(path), &["status", "--porcelain"], vec![CommandOutput::ok("")])
        .on(
            "git",
            Some(path),
            &["rev-parse", "--verify", "--quiet", "HEAD"],
            vec![
                CommandOutput::ok(format!("{before}\n")),
                CommandOutput::ok(format!("{after}\n")),
            ],
        )
        .on(
            "git",
            Some(path),
            &["rev-parse", "--verify", "--quiet"],
            vec![CommandOutput::ok(format!("{after}\n"))],
        )
        .on(
            "git",
            Some(path),
            &["rev-parse", "--abbrev-ref", "@{upstream}"],
            vec![CommandOutput::ok("origin/main\n")],
        )
        .on(
            "git",
            Some(path),
            &["rev-list", "--left-right", "--count"],
            vec![CommandOutput::ok(format!("0\t{behind}\n"))],
        )
    }

    /// Everything executed so far, in order.
    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Recorded calls whose argument list starts with `args`.
    pub fn calls_with(&self, args: &[&str]) -> Vec<Invocation> {
        self.calls()
            .into_iter()
            .filter(|inv| {
                inv.args.len() >= args.len() && args.iter().zip(&inv.args).all(|(a, b)| a == b)
            })
            .collect()
    }

    fn push(
        self,
        program: &str,
        cwd: Option<&Path>,
        args: &[&str],
        replies: VecDeque<Reply>,
    ) -> Self {
        if let Ok(mut rules) = self.rules.lock() {
            rules.push(Rule {
                program: program.to_string(),
                cwd: cwd.map(Path::to_path_buf),
                args: args.iter().map(|a| a.to_string()).collect(),
                replies,
            });
        }
        self
    }
}

impl Runner for ScriptedRunner {
    fn execute(&self, invocation: &Invocation) -> Result<CommandOutput, RunnerError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(invocation.clone());
        }
        let reply = match self.rules.lock() {
            Ok(mut rules) => rules
                .iter_mut()
                .find(|r| r.matches(invocation))
                .map(Rule::next),
            Err(_) => None,
        };
        match reply {
            None => Ok(CommandOutput::ok("")),
            Some(Reply::Output(out)) => Ok(out),
            Some(Reply::TimedOut) => Err(RunnerError::TimedOut {
                program: invocation.program.clone(),
                after: invocation.timeout.unwrap_or(Duration::ZERO),
            }),
            Some(Reply::Missing) => Err(RunnerError::Spawn {
                program: invocation.program.clone(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "not installed"),
            }),
        }
    }
}
