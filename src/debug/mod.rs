//! Debugger-visible names for generated code.
//!
//! Each compiled block is described as a small ELF symbol file and
//! published through the GDB JIT interface for as long as its closure lives.

pub mod elf;
pub mod gdb_jit;

pub use elf::{build_object, DebugImage, DebugSymbol, SymbolKind};
pub use gdb_jit::{DebugRegistry, Registration};

use crate::codegen::LinkedImage;

/// Describes a linked image placed at `base`.
pub fn describe(image: &LinkedImage, base: usize) -> DebugImage {
    let base = base as u64;
    let mut symbols = Vec::with_capacity(image.steps.len() + image.literals.len());
    for (tag, range) in &image.steps {
        let name = if range.start == image.entry_offset {
            "jish_entry".to_string()
        } else {
            format!("jish_step_{tag}")
        };
        symbols.push(DebugSymbol {
            name,
            address: base + range.start as u64,
            size: range.len() as u64,
            kind: SymbolKind::Function,
        });
    }
    for (tag, range) in &image.literals {
        symbols.push(DebugSymbol {
            name: format!("jish_str_{tag}"),
            address: base + range.start as u64,
            size: range.len() as u64 + 1,
            kind: SymbolKind::Object,
        });
    }
    DebugImage {
        code_address: base,
        code_size: image.code_len as u64,
        data_address: base + image.data_offset as u64,
        data_size: (image.bytes.len() - image.data_offset) as u64,
        symbols,
    }
}

/// Builds and publishes the symbol file of `image`.
pub fn register(registry: &'static DebugRegistry, image: &LinkedImage, base: usize) -> Registration {
    registry.register(build_object(&describe(image, base)))
}
