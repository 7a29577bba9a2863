//! Command-line parser.
//!
//! Produces the typed tree in [`ast`] that the control-flow compiler consumes.

pub mod ast;
pub mod error;
#[allow(clippy::module_inception)]
mod parser;

pub use ast::{
    Builtin, Command, IfClosure, Invocation, Pipe, PipeStage, Redirect, Scope, Target, Word,
};
pub use error::{ParseError, ParseErrorKind};
pub use parser::{parse_line, ParseOptions, Parser};
