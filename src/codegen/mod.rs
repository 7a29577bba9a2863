//! Native code generation.
//!
//! A [`ChainProgram`] becomes machine code in three passes: the backend
//! emits position-independent steps with symbolic `rel32` fields, the
//! linker lays out literals and patches every field for the final base
//! address, and the block layer maps the result executable.

pub mod block;
pub mod error;
pub mod link;
pub mod symbols;
pub mod trampoline;
pub mod x86_64;

pub use block::{ExecBlock, WritableBlock};
pub use error::{CodegenError, CodegenErrorKind};
pub use link::{image_len, link, LinkedImage};
pub use trampoline::{SharedTrampolines, TrampolineCache};
pub use x86_64::Assembly;

use crate::ir::program::ChainProgram;

/// Emits native code for the host architecture.
#[cfg(target_arch = "x86_64")]
pub fn emit(program: &mut ChainProgram) -> Result<Assembly, CodegenError> {
    x86_64::emit(program)
}

/// Emits native code for the host architecture.
#[cfg(not(target_arch = "x86_64"))]
pub fn emit(_program: &mut ChainProgram) -> Result<Assembly, CodegenError> {
    Err(CodegenError::encode("unsupported target architecture"))
}
