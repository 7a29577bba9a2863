//! Lexer error contracts.

use std::fmt;

use crate::lexer::span::Span;

/// Stable lexer error categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LexErrorKind {
    /// A `'` quote was never closed.
    UnterminatedSingleQuote,
    /// A `"` quote was never closed.
    UnterminatedDoubleQuote,
    /// Input ended right after a `\`.
    TrailingBackslash,
}

impl fmt::Display for LexErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnterminatedSingleQuote => write!(f, "unterminated single quote"),
            Self::UnterminatedDoubleQuote => write!(f, "unterminated double quote"),
            Self::TrailingBackslash => write!(f, "trailing backslash"),
        }
    }
}

/// Lexer error payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexError {
    /// Error category.
    pub kind: LexErrorKind,
    /// Span from the opening delimiter to end of input.
    pub span: Span,
}

impl LexError {
    /// Creates a lexer error.
    pub fn new(kind: LexErrorKind, span: Span) -> Self {
        Self { kind, span }
    }
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at byte {}", self.kind, self.span.start.value())
    }
}

impl std::error::Error for LexError {}
