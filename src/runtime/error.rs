//! Closure run-time error contracts.

use std::fmt;
use std::io;

use crate::parser::ast::Builtin;

/// Error raised by one closure invocation.
///
/// The syscall kinds carry the originating `errno`. `Exit` and `Again` are
/// control signals that travel through the same channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClosureError {
    /// `chdir(2)` failed.
    Chdir(i32),
    /// `dup2(2)` failed.
    Dup2(i32),
    /// `execvp(3)` failed.
    Execvp(i32),
    /// `fork(2)` failed.
    Fork(i32),
    /// `open(2)` failed.
    Open(i32),
    /// `pipe(2)` failed.
    Pipe(i32),
    /// `waitpid(2)` failed.
    Waitpid(i32),
    /// `exit N` was executed.
    Exit(i32),
    /// `again` was executed; reserved.
    Again,
    /// A builtin without compiled behavior was reached.
    NotImplemented(&'static str),
}

impl ClosureError {
    /// Returns the exit status when this is the `exit` control signal.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::Exit(code) => Some(*code),
            _ => None,
        }
    }

    /// Returns the OS error code of syscall failures.
    pub fn errno(&self) -> Option<i32> {
        match self {
            Self::Chdir(errno)
            | Self::Dup2(errno)
            | Self::Execvp(errno)
            | Self::Fork(errno)
            | Self::Open(errno)
            | Self::Pipe(errno)
            | Self::Waitpid(errno) => Some(*errno),
            Self::Exit(_) | Self::Again | Self::NotImplemented(_) => None,
        }
    }
}

impl fmt::Display for ClosureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let syscall = match self {
            Self::Chdir(_) => "chdir",
            Self::Dup2(_) => "dup2",
            Self::Execvp(_) => "execvp",
            Self::Fork(_) => "fork",
            Self::Open(_) => "open",
            Self::Pipe(_) => "pipe",
            Self::Waitpid(_) => "waitpid",
            Self::Exit(code) => return write!(f, "exit {code}"),
            Self::Again => return f.write_str("again: not implemented"),
            Self::NotImplemented(name) => return write!(f, "{name}: not implemented"),
        };
        let errno = self.errno().unwrap_or_default();
        write!(f, "{syscall}: {}", io::Error::from_raw_os_error(errno))
    }
}

impl std::error::Error for ClosureError {}

// ---------------------------------------------------------------------------
// Fault record shared with machine code
// ---------------------------------------------------------------------------

/// Fault categories written into [`RawFault::kind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub(crate) enum FaultKind {
    Chdir = 1,
    Dup2 = 2,
    Execvp = 3,
    Fork = 4,
    Open = 5,
    Pipe = 6,
    Waitpid = 7,
    Exit = 8,
    Again = 9,
    NotImplemented = 10,
}

impl FaultKind {
    pub(crate) fn from_raw(raw: u32) -> Option<Self> {
        Some(match raw {
            1 => Self::Chdir,
            2 => Self::Dup2,
            3 => Self::Execvp,
            4 => Self::Fork,
            5 => Self::Open,
            6 => Self::Pipe,
            7 => Self::Waitpid,
            8 => Self::Exit,
            9 => Self::Again,
            10 => Self::NotImplemented,
            _ => return None,
        })
    }

    /// Builds the error for this kind. `code` is an errno, an exit status or
    /// a builtin id depending on the kind.
    pub(crate) fn error(self, code: i32) -> ClosureError {
        match self {
            Self::Chdir => ClosureError::Chdir(code),
            Self::Dup2 => ClosureError::Dup2(code),
            Self::Execvp => ClosureError::Execvp(code),
            Self::Fork => ClosureError::Fork(code),
            Self::Open => ClosureError::Open(code),
            Self::Pipe => ClosureError::Pipe(code),
            Self::Waitpid => ClosureError::Waitpid(code),
            Self::Exit => ClosureError::Exit(code),
            Self::Again => ClosureError::Again,
            Self::NotImplemented => ClosureError::NotImplemented(
                Builtin::from_id(code as u32).map_or("builtin", Builtin::name),
            ),
        }
    }
}

/// Fault slot a step writes before returning [`Status::FAULT`].
///
/// [`Status::FAULT`]: crate::runtime::Status::FAULT
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(C)]
pub struct RawFault {
    kind: u32,
    code: i32,
}

impl RawFault {
    pub(crate) fn record(&mut self, kind: FaultKind, code: i32) {
        self.kind = kind as u32;
        self.code = code;
    }

    /// Converts the record into an error. An empty record means the machine
    /// code reported a fault without describing it.
    pub(crate) fn into_error(self) -> ClosureError {
        match FaultKind::from_raw(self.kind) {
            Some(kind) => kind.error(self.code),
            None => ClosureError::NotImplemented("unknown fault"),
        }
    }
}
