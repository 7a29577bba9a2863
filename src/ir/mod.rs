//! Chain-program intermediate representation.
//!
//! The control-flow compiler lowers a parsed [`Scope`](crate::parser::Scope)
//! into a [`ChainProgram`]: a flat, forward-branching list of tagged steps the
//! native emitter turns into machine code.

pub mod chain;
pub mod error;
pub mod ids;
pub mod lower;
pub mod program;
pub mod tags;
pub mod verify;

pub use chain::{
    Argument, Arm, Branch, Capture, ChainStep, InvokeDescriptor, InvokeTarget, OpenMode,
    PipelineStep, StdTarget, StepKind,
};
pub use error::{IrError, IrErrorKind};
pub use ids::{SlotId, Tag};
pub use lower::LoweringContext;
pub use program::{ChainProgram, CompileOptions};
pub use tags::{TagKind, TagTable};
pub use verify::verify_program;
