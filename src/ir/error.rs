//! IR error contracts.

use std::fmt;

/// Stable IR error categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IrErrorKind {
    /// A configured resource limit was exceeded.
    LimitExceeded,
    /// A required IR invariant was violated.
    InvariantViolation,
    /// A word cannot be stored as a C string.
    InvalidLiteral,
}

/// IR error payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IrError {
    /// Error category.
    pub kind: IrErrorKind,
    /// Human-readable error summary.
    pub message: String,
    /// Optional additional detail.
    pub detail: Option<String>,
}

impl IrError {
    /// Creates an IR error.
    pub fn new(kind: IrErrorKind, message: impl Into<String>, detail: Option<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            detail,
        }
    }

    /// Creates a `LimitExceeded` error.
    pub fn limit_exceeded(message: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(IrErrorKind::LimitExceeded, message, Some(detail.into()))
    }

    /// Creates an `InvariantViolation` error.
    pub fn invariant_violation(message: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(IrErrorKind::InvariantViolation, message, Some(detail.into()))
    }

    /// Creates an `InvalidLiteral` error.
    pub fn invalid_literal(message: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(IrErrorKind::InvalidLiteral, message, Some(detail.into()))
    }
}

impl fmt::Display for IrError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.detail {
            Some(detail) => write!(f, "{}: {}", self.message, detail),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for IrError {}
