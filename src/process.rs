//! Subprocess seam
//!
//! Native tools (cmake, vswhere, MSBuild) run through [`CommandRunner`].
//! [`TranscriptRunner`] records every invocation with its full output in
//! the run transcript whatever the outcome.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use crate::runlog::RunLog;

/// A command line to execute
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cwd: Option<PathBuf>,
}

impl Invocation {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn arg_path(self, path: &Path) -> Self {
        self.arg(path.to_string_lossy())
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
        self.cwd = Some(dir.into());
        self
    }

    /// File name of the program (`cmake`, `MSBuild.exe`)
    pub fn program_name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.program.to_string_lossy().to_string())
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", quote(&self.program.to_string_lossy()))?;
        for arg in &self.args {
            write!(f, " {}", quote(arg))?;
        }
        Ok(())
    }
}

fn quote(s: &str) -> String {
    if s.is_empty() || s.contains(char::is_whitespace) {
        format!("\"{}\"", s)
    } else {
        s.to_string()
    }
}

/// Captured result of a finished process
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutput {
    /// Exit code (-1 when killed by a signal)
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Last non-empty stderr line, falling back to stdout
    pub fn tail_line(&self) -> Option<&str> {
        fn last(s: &str) -> Option<&str> {
            s.lines().filter(|l| !l.trim().is_empty()).last()
        }
        last(&self.stderr).or_else(|| last(&self.stdout))
    }
}

/// Process launch errors (not non-zero exits)
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
}

/// Command runner trait
pub trait CommandRunner: Send + Sync {
    fn run(&self, invocation: &Invocation) -> Result<CommandOutput, RunnerError>;
}

/// Runs real subprocesses and captures their output
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessRunner;

impl CommandRunner for ProcessRunner {
    fn run(&self, invocation: &Invocation) -> Result<CommandOutput, RunnerError> {
        let mut command = Command::new(&invocation.program);
        command.args(&invocation.args);
        if let Some(cwd) = &invocation.cwd {
            command.current_dir(cwd);
        }

        tracing::debug!(command = %invocation, "spawning");
        let output = command.output().map_err(|source| RunnerError::Spawn {
            program: invocation.program.to_string_lossy().to_string(),
            source,
        })?;

        Ok(CommandOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

/// Wraps a runner and appends every command to the run transcript
pub struct TranscriptRunner {
    inner: Arc<dyn CommandRunner>,
    log: Arc<RunLog>,
}

impl TranscriptRunner {
    pub fn new(inner: Arc<dyn CommandRunner>, log: Arc<RunLog>) -> Self {
        Self { inner, log }
    }
}

impl CommandRunner for TranscriptRunner {
    fn run(&self, invocation: &Invocation) -> Result<CommandOutput, RunnerError> {
        let result = self.inner.run(invocation);
        let recorded = match &result {
            Ok(output) => self.log.record_command(invocation, Ok(output)),
            Err(e) => self.log.record_command(invocation, Err(&e.to_string())),
        };
        if let Err(e) = recorded {
            tracing::warn!(error = %e, "failed to append to command transcript");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invocation_display_quotes_spaces() {
        let inv = Invocation::new("cmake")
            .args(["-S", "/src/cef binary", "-G"])
            .arg("Visual Studio 17 2022");
        assert_eq!(
            inv.to_string(),
            "cmake -S \"/src/cef binary\" -G \"Visual Studio 17 2022\""
        );
    }

    #[test]
    fn test_program_name() {
        let inv = Invocation::new("/opt/cmake/bin/cmake");
        assert_eq!(inv.program_name(), "cmake");
    }

    #[test]
    fn test_tail_line_prefers_stderr() {
        let out = CommandOutput {
            exit_code: 1,
            stdout: "configuring\n".into(),
            stderr: "first\nCMake Error: bad generator\n\n".into(),
        };
        assert_eq!(out.tail_line(), Some("CMake Error: bad generator"));

        let out = CommandOutput {
            exit_code: 1,
            stdout: "configuring\n".into(),
            stderr: String::new(),
        };
        assert_eq!(out.tail_line(), Some("configuring"));
    }

    #[cfg(unix)]
    #[test]
    fn test_process_runner_captures_output() {
        let out = ProcessRunner
            .run(&Invocation::new("sh").args(["-c", "echo hello; echo oops >&2; exit 3"]))
            .unwrap();
        assert_eq!(out.exit_code, 3);
        assert_eq!(out.stdout.trim(), "hello");
        assert_eq!(out.stderr.trim(), "oops");
    }

    #[test]
    fn test_process_runner_missing_program() {
        let err = ProcessRunner
            .run(&Invocation::new("/definitely/not/a/program"))
            .unwrap_err();
        assert!(matches!(err, RunnerError::Spawn { .. }));
    }
}
