//! Trampolines for external calls beyond `rel32` range.
//!
//! A trampoline is `mov r11, imm64; jmp r11` in its own tiny executable
//! block, built once per target address and kept for the life of the cache.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::codegen::block::{ExecBlock, WritableBlock};
use crate::codegen::error::CodegenError;

/// Size of one encoded trampoline.
pub const TRAMPOLINE_LEN: usize = 13;

/// Encodes `mov r11, target; jmp r11`.
pub fn encode_trampoline(target: usize) -> [u8; TRAMPOLINE_LEN] {
    let mut bytes = [0u8; TRAMPOLINE_LEN];
    bytes[0] = 0x49; // REX.W + B
    bytes[1] = 0xBB; // mov r11, imm64
    bytes[2..10].copy_from_slice(&(target as u64).to_le_bytes());
    bytes[10..].copy_from_slice(&[0x41, 0xFF, 0xE3]); // jmp r11
    bytes
}

/// Returns `true` when a `rel32` at `site` (address after the field) reaches `target`.
pub fn in_rel32_range(site: usize, target: usize) -> bool {
    let delta = target as i128 - site as i128;
    i32::try_from(delta).is_ok()
}

/// Trampoline cache shared by an engine and every closure it compiled.
///
/// Closures call through these blocks, so each closure holds a clone and
/// the blocks stay mapped until the last of them is gone.
pub type SharedTrampolines = Arc<Mutex<TrampolineCache>>;

/// Trampoline table keyed by target address. Never evicted.
#[derive(Debug, Default)]
pub struct TrampolineCache {
    entries: HashMap<usize, ExecBlock>,
}

impl TrampolineCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the trampoline for `target`, building it near `near` if needed.
    pub fn get_or_create(&mut self, target: usize, near: usize) -> Result<usize, CodegenError> {
        if let Some(block) = self.entries.get(&target) {
            return Ok(block.base());
        }
        let hint = (near & !0xFFFF).saturating_sub(1 << 20);
        let mut block = WritableBlock::allocate_near(TRAMPOLINE_LEN, hint)?;
        block.write(&encode_trampoline(target))?;
        let block = block.finalize()?;
        let address = block.base();
        debug!(callee = target, trampoline = address, "created trampoline");
        self.entries.insert(target, block);
        Ok(address)
    }

    /// Returns the number of cached trampolines.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when no trampoline was built yet.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
