//! Codegen error contracts.

use std::fmt;
use std::io;

use crate::ir::error::IrError;

/// Stable codegen error categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodegenErrorKind {
    /// Mapping memory for code or a trampoline failed.
    BlockAllocation,
    /// Switching a block to read+execute failed.
    BlockProtect,
    /// Instruction selection or lowering failed.
    Encode,
    /// A tag or external symbol could not be resolved.
    Link,
}

/// Codegen error payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodegenError {
    /// Error category.
    pub kind: CodegenErrorKind,
    /// Human-readable error summary.
    pub message: String,
    /// OS error code for allocation and protection failures.
    pub errno: Option<i32>,
}

impl CodegenError {
    /// Creates a codegen error.
    pub fn new(kind: CodegenErrorKind, message: impl Into<String>, errno: Option<i32>) -> Self {
        Self {
            kind,
            message: message.into(),
            errno,
        }
    }

    /// Creates a `BlockAllocation` error from the current `errno`.
    pub fn block_allocation(message: impl Into<String>) -> Self {
        Self::new(
            CodegenErrorKind::BlockAllocation,
            message,
            io::Error::last_os_error().raw_os_error(),
        )
    }

    /// Creates a `BlockProtect` error from the current `errno`.
    pub fn block_protect(message: impl Into<String>) -> Self {
        Self::new(
            CodegenErrorKind::BlockProtect,
            message,
            io::Error::last_os_error().raw_os_error(),
        )
    }

    /// Creates an `Encode` error.
    pub fn encode(message: impl Into<String>) -> Self {
        Self::new(CodegenErrorKind::Encode, message, None)
    }

    /// Creates a `Link` error.
    pub fn link(message: impl Into<String>) -> Self {
        Self::new(CodegenErrorKind::Link, message, None)
    }
}

impl From<IrError> for CodegenError {
    fn from(error: IrError) -> Self {
        Self::encode(error.to_string())
    }
}

impl fmt::Display for CodegenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self.kind {
            CodegenErrorKind::BlockAllocation => "block allocation failed",
            CodegenErrorKind::BlockProtect => "block protection failed",
            CodegenErrorKind::Encode => "encode failed",
            CodegenErrorKind::Link => "link failed",
        };
        write!(f, "{label}: {}", self.message)?;
        if let Some(errno) = self.errno {
            write!(f, " ({})", io::Error::from_raw_os_error(errno))?;
        }
        Ok(())
    }
}

impl std::error::Error for CodegenError {}
