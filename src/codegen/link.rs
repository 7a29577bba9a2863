//! Image layout and relocation.
//!
//! An image is the emitted code, padded with `int3` to a 16-byte boundary,
//! followed by every interned literal as a NUL-terminated string. All
//! references are `rel32`, so the image only becomes valid once it is
//! linked against the address it will live at.

use std::collections::HashMap;
use std::ops::Range;

use tracing::trace;

use crate::codegen::error::CodegenError;
use crate::codegen::symbols;
use crate::codegen::trampoline::{in_rel32_range, TrampolineCache};
use crate::codegen::x86_64::Assembly;
use crate::ir::ids::Tag;
use crate::ir::tags::{TagKind, TagTable};

const PADDING: u8 = 0xCC;

/// A relocated image ready to copy into its block.
#[derive(Debug, Clone)]
pub struct LinkedImage {
    /// Code followed by the data section.
    pub bytes: Vec<u8>,
    /// Length of the emitted code, before padding.
    pub code_len: usize,
    /// Offset of the data section.
    pub data_offset: usize,
    /// Offset of the entry step.
    pub entry_offset: usize,
    /// Code range of each step.
    pub steps: Vec<(Tag, Range<usize>)>,
    /// Range of each literal, terminator excluded.
    pub literals: Vec<(Tag, Range<usize>)>,
}

fn data_offset(code_len: usize) -> usize {
    (code_len + 15) & !15
}

/// Returns the size of the image `assembly` links into.
pub fn image_len(assembly: &Assembly, tags: &TagTable) -> usize {
    let data: usize = tags.literals().map(|(_, text)| text.len() + 1).sum();
    data_offset(assembly.code.len()) + data
}

/// Lays out and relocates `assembly` for an image based at `base`.
///
/// Symbol calls out of `rel32` reach go through `trampolines`.
pub fn link(
    assembly: Assembly,
    tags: &TagTable,
    base: usize,
    trampolines: &mut TrampolineCache,
) -> Result<LinkedImage, CodegenError> {
    let Assembly {
        mut code,
        labels,
        relocs,
        steps,
        entry,
    } = assembly;
    let code_len = code.len();
    let data_start = data_offset(code_len);
    code.resize(data_start, PADDING);

    let mut literals = Vec::new();
    let mut literal_offsets = HashMap::new();
    for (tag, text) in tags.literals() {
        let start = code.len();
        code.extend_from_slice(text.as_bytes());
        literals.push((tag, start..code.len()));
        literal_offsets.insert(tag, start);
        code.push(0);
    }

    for reloc in relocs {
        let site = base + reloc.at + 4;
        let target = match tags.kind(reloc.target) {
            Some(TagKind::Code) => match labels.get(&reloc.target) {
                Some(offset) => base + offset,
                None => {
                    return Err(CodegenError::link(format!(
                        "label {} is never bound",
                        reloc.target
                    )))
                }
            },
            Some(TagKind::Literal(_)) => match literal_offsets.get(&reloc.target) {
                Some(offset) => base + offset,
                None => {
                    return Err(CodegenError::link(format!(
                        "literal {} has no data",
                        reloc.target
                    )))
                }
            },
            Some(TagKind::Symbol(name)) => {
                let address = symbols::resolve(name).ok_or_else(|| {
                    CodegenError::link(format!("unresolved host symbol `{name}`"))
                })?;
                if in_rel32_range(site, address) {
                    address
                } else {
                    let trampoline = trampolines.get_or_create(address, base)?;
                    trace!(symbol = %name, trampoline, "call routed through trampoline");
                    trampoline
                }
            }
            None => {
                return Err(CodegenError::link(format!(
                    "tag {} was never allocated",
                    reloc.target
                )))
            }
        };
        if !in_rel32_range(site, target) {
            return Err(CodegenError::link(format!(
                "tag {} at {target:#x} is out of rel32 range of {site:#x}",
                reloc.target
            )));
        }
        let delta = (target as i64 - site as i64) as i32;
        code[reloc.at..reloc.at + 4].copy_from_slice(&delta.to_le_bytes());
    }

    let entry_offset = labels
        .get(&entry)
        .copied()
        .ok_or_else(|| CodegenError::link(format!("entry {entry} is never bound")))?;

    Ok(LinkedImage {
        bytes: code,
        code_len,
        data_offset: data_start,
        entry_offset,
        steps,
        literals,
    })
}
