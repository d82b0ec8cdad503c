//! Scripted command runner

use std::io;
use std::sync::Mutex;

use crate::process::{CommandOutput, CommandRunner, Invocation, RunnerError};

/// Filesystem effect run when a rule matches (e.g. write the files cmake would generate)
pub type SideEffect = Box<dyn Fn(&Invocation) + Send + Sync>;

enum Response {
    Output(CommandOutput),
    SpawnFailure,
}

struct Rule {
    /// Substring of the rendered command line
    pattern: String,
    response: Response,
    effect: Option<SideEffect>,
}

/// Mock runner for tests.
///
/// Rules match on a substring of the rendered command line; the most
/// recently added matching rule wins. Unmatched commands exit 0 with no
/// output.
#[derive(Default)]
pub struct MockRunner {
    rules: Mutex<Vec<Rule>>,
    invocations: Mutex<Vec<Invocation>>,
}

impl MockRunner {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, pattern: &str, response: Response, effect: Option<SideEffect>) {
        if let Ok(mut rules) = self.rules.lock() {
            rules.push(Rule {
                pattern: pattern.to_string(),
                response,
                effect,
            });
        }
    }

    /// Reply with `output`
    pub fn respond(&self, pattern: &str, output: CommandOutput) {
        self.push(pattern, Response::Output(output), None);
    }

    /// Exit with `code` and no output
    pub fn exit(&self, pattern: &str, code: i32) {
        self.respond(
            pattern,
            CommandOutput {
                exit_code: code,
                ..Default::default()
            },
        );
    }

    /// Exit 0 printing `stdout`
    pub fn stdout(&self, pattern: &str, stdout: impl Into<String>) {
        self.respond(
            pattern,
            CommandOutput {
                exit_code: 0,
                stdout: stdout.into(),
                stderr: String::new(),
            },
        );
    }

    /// Reply with `output` after running `effect`
    pub fn on_run(
        &self,
        pattern: &str,
        output: CommandOutput,
        effect: impl Fn(&Invocation) + Send + Sync + 'static,
    ) {
        self.push(pattern, Response::Output(output), Some(Box::new(effect)));
    }

    /// Fail to launch, as if the program were not installed
    pub fn missing(&self, pattern: &str) {
        self.push(pattern, Response::SpawnFailure, None);
    }

    /// Everything run so far, in order
    pub fn invocations(&self) -> Vec<Invocation> {
        self.invocations
            .lock()
            .map(|i| i.clone())
            .unwrap_or_default()
    }

    /// Number of invocations whose command line contains `pattern`
    pub fn calls_matching(&self, pattern: &str) -> usize {
        self.invocations()
            .iter()
            .filter(|i| i.to_string().contains(pattern))
            .count()
    }
}

impl CommandRunner for MockRunner {
    fn run(&self, invocation: &Invocation) -> Result<CommandOutput, RunnerError> {
        if let Ok(mut invocations) = self.invocations.lock() {
            invocations.push(invocation.clone());
        }

        let line = invocation.to_string();
        let rules = match self.rules.lock() {
            Ok(rules) => rules,
            Err(_) => return Ok(CommandOutput::default()),
        };
        let Some(rule) = rules.iter().rev().find(|r| line.contains(&r.pattern)) else {
            return Ok(CommandOutput::default());
        };

        if let Some(effect) = &rule.effect {
            effect(invocation);
        }
        match &rule.response {
            Response::Output(output) => Ok(output.clone()),
            Response::SpawnFailure => Err(RunnerError::Spawn {
                program: invocation.program.to_string_lossy().to_string(),
                source: io::Error::new(io::ErrorKind::NotFound, "program not found"),
            }),
        }
    }
}
