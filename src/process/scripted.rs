//! Deterministic runner for tests and benchmarks
//!
//! Rules are matched in insertion order against the program name and, optionally,
//! a substring of the space-joined arguments or the exact argument list. Unmatched
//! invocations behave like a missing binary.

use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::{CommandRunner, RunOptions, RunResult};

/// One invocation seen by a [`ScriptedRunner`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub timeout: Option<Duration>,
    pub stdin_file: Option<PathBuf>,
}

impl RecordedCall {
    /// Arguments joined with single spaces
    #[must_use]
    pub fn command_line(&self) -> String {
        self.args.join(" ")
    }

    /// Value of an environment variable passed to this call
    #[must_use]
    pub fn env_var(&self, key: &str) -> Option<&str> {
        self.env.iter().rev().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone)]
enum ArgMatch {
    Any,
    Contains(String),
    Exact(String),
}

#[derive(Debug, Clone)]
struct Rule {
    program: String,
    args: ArgMatch,
    result: RunResult,
    delay: Option<Duration>,
}

impl Rule {
    fn matches(&self, program: &str, joined: &str) -> bool {
        if self.program != program {
            return false;
        }
        match &self.args {
            ArgMatch::Any => true,
            ArgMatch::Contains(needle) => joined.contains(needle.as_str()),
            ArgMatch::Exact(expected) => joined == expected,
        }
    }
}

/// Scripted [`CommandRunner`]
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedRunner {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every call to `program`
    #[must_use]
    pub fn on(self, program: &str, result: RunResult) -> Self {
        self.push(Rule { program: program.to_string(), args: ArgMatch::Any, result, delay: None })
    }

    /// Answer calls to `program` whose joined arguments contain `needle`
    #[must_use]
    pub fn on_args(self, program: &str, needle: &str, result: RunResult) -> Self {
        self.push(Rule {
            program: program.to_string(),
            args: ArgMatch::Contains(needle.to_string()),
            result,
            delay: None,
        })
    }

    /// Like [`Self::on_args`], answering only after `delay`
    ///
    /// If the caller's timeout is shorter than `delay`, the call fails the way a
    /// real timed-out process does.
    #[must_use]
    pub fn on_args_delayed(self, program: &str, needle: &str, delay: Duration, result: RunResult) -> Self {
        self.push(Rule {
            program: program.to_string(),
            args: ArgMatch::Contains(needle.to_string()),
            result,
            delay: Some(delay),
        })
    }

    /// Answer calls to `program` whose joined arguments equal `args` exactly
    #[must_use]
    pub fn on_exact(self, program: &str, args: &str, result: RunResult) -> Self {
        self.push(Rule { program: program.to_string(), args: ArgMatch::Exact(args.to_string()), result, delay: None })
    }

    /// Report `binary` as present for `which`/`where` lookups of that exact name
    #[must_use]
    pub fn with_binary(self, binary: &str) -> Self {
        let locator = if cfg!(windows) { "where" } else { "which" };
        self.on_exact(locator, binary, RunResult::ok(format!("/usr/bin/{binary}\n")))
    }

    /// Every call made so far, in order
    #[must_use]
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Calls made to one program
    #[must_use]
    pub fn calls_to(&self, program: &str) -> Vec<RecordedCall> {
        self.calls().into_iter().filter(|c| c.program == program).collect()
    }

    fn push(self, rule: Rule) -> Self {
        if let Ok(mut rules) = self.rules.lock() {
            rules.push(rule);
        }
        self
    }

    fn find(&self, program: &str, joined: &str) -> Option<Rule> {
        let rules = self.rules.lock().ok()?;
        rules.iter().find(|r| r.matches(program, joined)).cloned()
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, program: &str, args: &[String], opts: RunOptions) -> RunResult {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(RecordedCall {
                program: program.to_string(),
                args: args.to_vec(),
                env: opts.env.clone(),
                timeout: opts.timeout,
                stdin_file: opts.stdin_file.clone(),
            });
        }

        let joined = args.join(" ");
        let Some(rule) = self.find(program, &joined) else {
            return RunResult::failed(format!("Failed to start {program}: not found"));
        };

        if let Some(delay) = rule.delay {
            match opts.timeout {
                Some(limit) if limit < delay => {
                    tokio::time::sleep(limit).await;
                    return RunResult::failed(format!(
                        "Command timed out after {}ms: {program}",
                        limit.as_millis()
                    ));
                }
                _ => tokio::time::sleep(delay).await,
            }
        }

        rule.result
    }
}
