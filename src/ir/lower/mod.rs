//! Syntax tree to chain-program lowering.
//!
//! Lowering is single-pass backpatching: every construct is compiled between a
//! head tag and a tail tag that the caller already owns, so control flow only
//! ever branches forward. Command substitutions and detached compound commands
//! are queued and lowered after the main program as independent nested
//! programs, each ending in its own terminal step.

mod pipeline;
mod scope;

use std::collections::VecDeque;

use tracing::debug;

use crate::ir::chain::{ChainStep, StepKind};
use crate::ir::error::IrError;
use crate::ir::ids::{SlotId, Tag};
use crate::ir::program::{ChainProgram, CompileOptions};
use crate::ir::tags::TagTable;
use crate::parser::ast::{Command, Scope};

/// Stateful lowering context for syntax tree to chain-program conversion.
#[derive(Debug, Clone)]
pub struct LoweringContext {
    options: CompileOptions,
}

impl LoweringContext {
    /// Creates a lowering context.
    pub fn new(options: CompileOptions) -> Self {
        Self { options }
    }

    /// Returns lowering options.
    pub fn options(&self) -> CompileOptions {
        self.options
    }

    /// Lowers one parsed command line.
    pub fn lower(&mut self, scope: &Scope) -> Result<ChainProgram, IrError> {
        let mut lowerer = Lowerer::new(self.options);
        let entry = lowerer.tags.fresh()?;
        let tail = lowerer.tags.fresh()?;
        lowerer.compile_scope(scope, entry, tail)?;
        lowerer.push(tail, StepKind::Terminal);

        while let Some(deferred) = lowerer.deferred.pop_front() {
            let tail = lowerer.tags.fresh()?;
            match deferred.body {
                Nested::Scope(body) => lowerer.compile_scope(body, deferred.entry, tail)?,
                Nested::Command(body) => lowerer.compile_command(body, deferred.entry, tail)?,
            }
            lowerer.push(tail, StepKind::Terminal);
        }

        debug!(
            steps = lowerer.steps.len(),
            tags = lowerer.tags.len(),
            slots = lowerer.slot_count,
            "lowered command line"
        );
        Ok(ChainProgram {
            entry,
            steps: lowerer.steps,
            tags: lowerer.tags,
            slot_count: lowerer.slot_count,
        })
    }
}

/// Body of a nested program awaiting lowering.
enum Nested<'a> {
    /// Command substitution.
    Scope(&'a Scope),
    /// Detached compound command.
    Command(&'a Command),
}

struct Deferred<'a> {
    entry: Tag,
    body: Nested<'a>,
}

/// Per-compilation lowering state.
pub(crate) struct Lowerer<'a> {
    options: CompileOptions,
    tags: TagTable,
    steps: Vec<ChainStep>,
    deferred: VecDeque<Deferred<'a>>,
    slot_count: u32,
}

impl<'a> Lowerer<'a> {
    fn new(options: CompileOptions) -> Self {
        Self {
            options,
            tags: TagTable::new(options.max_tags),
            steps: Vec::new(),
            deferred: VecDeque::new(),
            slot_count: 0,
        }
    }

    fn push(&mut self, tag: Tag, kind: StepKind) {
        self.steps.push(ChainStep::new(tag, kind));
    }

    /// Queues a nested program and returns its entry tag.
    fn defer(&mut self, body: Nested<'a>) -> Result<Tag, IrError> {
        let entry = self.tags.fresh()?;
        self.deferred.push_back(Deferred { entry, body });
        Ok(entry)
    }

    fn allocate_slot(&mut self) -> Result<SlotId, IrError> {
        if self.slot_count as usize >= self.options.max_captures {
            return Err(IrError::limit_exceeded(
                "too many command substitutions",
                format!("limit {}", self.options.max_captures),
            ));
        }
        let slot = SlotId::new(self.slot_count);
        self.slot_count += 1;
        Ok(slot)
    }
}
