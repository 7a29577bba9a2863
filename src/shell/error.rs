//! Shell loop error contracts.

use std::fmt;

use crate::codegen::CodegenError;
use crate::parser::ParseError;
use crate::runtime::ClosureError;

/// Stable shell error categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShellErrorKind {
    /// The line did not parse.
    Parse,
    /// The line parsed but could not be compiled.
    Compile,
    /// The compiled closure failed while running.
    Run,
    /// Reading input failed.
    Input,
}

/// Shell loop error payload.
#[derive(Debug)]
pub struct ShellError {
    /// Error category.
    pub kind: ShellErrorKind,
    /// Human-readable error summary.
    pub message: String,
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl ShellError {
    fn wrap(
        kind: ShellErrorKind,
        error: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            kind,
            message: error.to_string(),
            source: Some(Box::new(error)),
        }
    }

    /// Creates an `Input` error.
    pub fn input(message: impl Into<String>) -> Self {
        Self {
            kind: ShellErrorKind::Input,
            message: message.into(),
            source: None,
        }
    }
}

impl From<ParseError> for ShellError {
    fn from(error: ParseError) -> Self {
        Self::wrap(ShellErrorKind::Parse, error)
    }
}

impl From<CodegenError> for ShellError {
    fn from(error: CodegenError) -> Self {
        Self::wrap(ShellErrorKind::Compile, error)
    }
}

impl From<ClosureError> for ShellError {
    fn from(error: ClosureError) -> Self {
        Self::wrap(ShellErrorKind::Run, error)
    }
}

impl From<rustyline::error::ReadlineError> for ShellError {
    fn from(error: rustyline::error::ReadlineError) -> Self {
        Self::input(error.to_string())
    }
}

impl fmt::Display for ShellError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ShellErrorKind::Parse => write!(f, "syntax error: {}", self.message),
            ShellErrorKind::Compile => write!(f, "compile error: {}", self.message),
            ShellErrorKind::Run | ShellErrorKind::Input => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for ShellError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|source| source as &(dyn std::error::Error + 'static))
    }
}
