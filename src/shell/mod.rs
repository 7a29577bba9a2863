//! Top-level command loop.
//!
//! Each complete command line is parsed, compiled by the [`Engine`] and
//! driven to completion before the next one is read. A line that leaves the
//! parser wanting more input (an open `if`, an unterminated quote) is joined
//! with the following lines first.

mod error;

use std::io::Write;
use std::time::Duration;

use rustyline::error::ReadlineError;
use rustyline::{Config, DefaultEditor};
use tracing::{debug, warn};

use crate::engine::Engine;
use crate::parser::ast::Scope;
use crate::parser::{parse_line, ParseError};
use crate::runtime::{Environment, Runner};

pub use error::{ShellError, ShellErrorKind};

const CONTINUATION_PROMPT: &str = "> ";

/// Shell loop settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellConfig {
    /// Pause between invocations of a closure waiting on a child.
    pub poll_interval: Duration,
    /// Interactive prompt.
    pub prompt: String,
    /// In-memory history length.
    pub history_size: usize,
    /// Print each lowered chain program to stderr before running it.
    pub dump_steps: bool,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(5),
            prompt: "jish$ ".to_string(),
            history_size: 1_000,
            dump_steps: false,
        }
    }
}

/// What the loop does after one command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Read the next line.
    Continue,
    /// Stop with this exit status.
    Exit(i32),
}

/// Command loop state.
#[derive(Debug)]
pub struct Shell {
    engine: Engine,
    runner: Environment,
    config: ShellConfig,
    last_status: i32,
}

impl Shell {
    /// Creates a shell over `runner`.
    pub fn new(engine: Engine, runner: Environment, config: ShellConfig) -> Self {
        Self {
            engine,
            runner,
            config,
            last_status: 0,
        }
    }

    /// Returns the status of the last completed command line.
    pub fn last_status(&self) -> i32 {
        self.last_status
    }

    /// Returns the variables seen by compiled code.
    pub fn runner(&self) -> &Environment {
        &self.runner
    }

    /// Compiles and runs one parsed command line.
    pub fn execute(&mut self, scope: &Scope) -> Result<Flow, ShellError> {
        if self.config.dump_steps {
            let program = self.engine.lower(scope)?;
            let _ = write!(std::io::stderr(), "{program}");
        }
        let closure = match self.engine.compile(scope) {
            Ok(closure) => closure,
            Err(error) => {
                self.last_status = 2;
                return Err(error.into());
            }
        };
        let result = closure.run_to_completion(&mut self.runner, self.config.poll_interval);
        drop(closure);
        self.report_jobs();
        match result {
            Ok(status) => {
                self.last_status = status;
                debug!(status, "command line finished");
                Ok(Flow::Continue)
            }
            Err(error) => match error.exit_code() {
                Some(code) => {
                    self.last_status = code;
                    Ok(Flow::Exit(code))
                }
                None => {
                    self.last_status = 1;
                    Err(error.into())
                }
            },
        }
    }

    /// Parses and runs one complete command line.
    pub fn run_line(&mut self, line: &str) -> Result<Flow, ShellError> {
        let scope = parse_line(line)?;
        self.execute(&scope)
    }

    /// Runs a script, stopping at the first error or `exit`.
    ///
    /// Returns the status of the last command line, or the `exit` status.
    pub fn run_source(&mut self, source: &str) -> Result<i32, ShellError> {
        let mut pending = String::new();
        for line in source.lines() {
            pending.push_str(line);
            pending.push('\n');
            let Some(scope) = complete(&pending)? else {
                continue;
            };
            pending.clear();
            if let Flow::Exit(code) = self.execute(&scope)? {
                return Ok(code);
            }
        }
        if !pending.trim().is_empty() {
            parse_line(&pending)?;
        }
        Ok(self.last_status)
    }

    /// Reads lines from the terminal until end of input or `exit`.
    ///
    /// Errors are printed and the loop continues.
    pub fn interactive(&mut self) -> Result<i32, ShellError> {
        let config = Config::builder()
            .max_history_size(self.config.history_size)?
            .auto_add_history(false)
            .build();
        let mut editor = DefaultEditor::with_config(config)?;
        let mut pending = String::new();
        loop {
            let prompt = if pending.is_empty() {
                self.config.prompt.as_str()
            } else {
                CONTINUATION_PROMPT
            };
            let line = match editor.readline(prompt) {
                Ok(line) => line,
                Err(ReadlineError::Interrupted) => {
                    pending.clear();
                    continue;
                }
                Err(ReadlineError::Eof) => return Ok(self.last_status),
                Err(error) => return Err(error.into()),
            };
            pending.push_str(&line);
            pending.push('\n');
            let Some(parsed) = complete(&pending).transpose() else {
                continue;
            };
            editor.add_history_entry(pending.trim_end())?;
            pending.clear();
            let flow = parsed
                .map_err(ShellError::from)
                .and_then(|scope| self.execute(&scope));
            match flow {
                Ok(Flow::Continue) => {}
                Ok(Flow::Exit(code)) => return Ok(code),
                Err(error) => {
                    warn!(kind = ?error.kind, "command line failed");
                    let _ = writeln!(std::io::stderr(), "jish: {error}");
                }
            }
        }
    }

    fn report_jobs(&mut self) {
        for (pid, status) in self.engine.reap_detached() {
            if self.runner.is_interactive() {
                let _ = writeln!(std::io::stderr(), "[{pid}] done {status}");
            }
        }
    }
}

/// Parses `source`, returning `None` when more input could complete it.
fn complete(source: &str) -> Result<Option<Scope>, ParseError> {
    match parse_line(source) {
        Ok(scope) => Ok(Some(scope)),
        Err(error) if error.is_incomplete() => Ok(None),
        Err(error) => Err(error),
    }
}
