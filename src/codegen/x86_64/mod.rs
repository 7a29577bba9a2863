//! x86-64 backend: instruction builder and chain step emitter.

pub mod asm;
pub mod emit;

pub use asm::{Assembler, Cond, Reg, Reloc};
pub use emit::{emit, Assembly};
