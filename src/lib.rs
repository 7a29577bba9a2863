//! Library entrypoint for `jish`.
//!
//! A command line goes through the lexer and parser into a syntax tree, is
//! lowered to a forward-only chain program, emitted as native x86-64 code
//! and run as a [`runtime::Closure`] by the shell loop.

pub mod codegen;
#[cfg(feature = "jit-debug")]
pub mod debug;
pub mod engine;
pub mod ir;
pub mod lexer;
pub mod parser;
pub mod runtime;
pub mod shell;

pub use engine::Engine;
