//! Parser error contracts.

use std::fmt;

use crate::lexer::{LexError, Span, Token};

/// Stable parser error categories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// A concrete token did not match grammar expectations.
    UnexpectedToken,
    /// Input ended before required grammar elements were found.
    UnexpectedEndOfInput,
    /// Lexer-level error surfaced through the parser.
    Lex(LexError),
    /// `if` or `$( )` nesting exceeded the configured bound.
    NestingTooDeep,
}

/// Parser error payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    /// Error category.
    pub kind: ParseErrorKind,
    /// Optional source span near the failure.
    pub span: Option<Span>,
    /// Expected token labels.
    pub expected: Vec<String>,
    /// Found token label.
    pub found: Option<String>,
}

impl ParseError {
    /// Creates a parser error.
    pub fn new(
        kind: ParseErrorKind,
        span: Option<Span>,
        expected: Vec<String>,
        found: Option<String>,
    ) -> Self {
        Self {
            kind,
            span,
            expected,
            found,
        }
    }

    /// Creates an `UnexpectedToken` error.
    pub fn unexpected_token(
        token: &Token,
        expected: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        let found = if token.kind == crate::lexer::TokenKind::Word {
            format!("'{}'", token.lexeme)
        } else {
            token.kind.label().to_string()
        };
        Self::new(
            ParseErrorKind::UnexpectedToken,
            Some(token.span),
            expected.into_iter().map(Into::into).collect(),
            Some(found),
        )
    }

    /// Creates an `UnexpectedEndOfInput` error.
    pub fn unexpected_end_of_input(
        expected: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self::new(
            ParseErrorKind::UnexpectedEndOfInput,
            None,
            expected.into_iter().map(Into::into).collect(),
            None,
        )
    }

    /// Creates a `NestingTooDeep` error.
    pub fn nesting_too_deep(span: Span) -> Self {
        Self::new(ParseErrorKind::NestingTooDeep, Some(span), Vec::new(), None)
    }

    /// Returns `true` when more input could complete the command.
    ///
    /// Interactive callers use this to prompt for a continuation line.
    pub fn is_incomplete(&self) -> bool {
        matches!(
            self.kind,
            ParseErrorKind::UnexpectedEndOfInput | ParseErrorKind::Lex(_)
        )
    }
}

impl From<LexError> for ParseError {
    fn from(error: LexError) -> Self {
        let span = error.span;
        Self::new(ParseErrorKind::Lex(error), Some(span), Vec::new(), None)
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ParseErrorKind::Lex(error) => return write!(f, "{error}"),
            ParseErrorKind::NestingTooDeep => return write!(f, "nesting too deep"),
            ParseErrorKind::UnexpectedToken => write!(f, "unexpected token")?,
            ParseErrorKind::UnexpectedEndOfInput => write!(f, "unexpected end of input")?,
        }
        if let Some(found) = &self.found {
            write!(f, " {found}")?;
        }
        if !self.expected.is_empty() {
            write!(f, ", expected {}", self.expected.join(" or "))?;
        }
        Ok(())
    }
}

impl std::error::Error for ParseError {}
