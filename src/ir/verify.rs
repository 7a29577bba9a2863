//! Chain-program verification pass.
//!
//! Catches lowering bugs (dangling tags, backward branches, out-of-range pipe
//! or slot references) before any machine code is emitted.

use std::collections::HashMap;

use crate::ir::chain::{Argument, ChainStep, InvokeTarget, PipelineStep, StdTarget, StepKind};
use crate::ir::error::IrError;
use crate::ir::ids::Tag;
use crate::ir::program::ChainProgram;
use crate::ir::tags::TagKind;

// ===========================================================================
// Public API
// ===========================================================================

/// Verifies structural invariants of a chain program.
///
/// Returns the first error found, or `Ok(())` when the program is well-formed.
pub fn verify_program(program: &ChainProgram) -> Result<(), IrError> {
    ProgramVerifier::new(program)?.verify()
}

// ===========================================================================
// ProgramVerifier
// ===========================================================================

struct ProgramVerifier<'a> {
    program: &'a ChainProgram,
    positions: HashMap<Tag, usize>,
}

impl<'a> ProgramVerifier<'a> {
    fn new(program: &'a ChainProgram) -> Result<Self, IrError> {
        let mut positions = HashMap::with_capacity(program.steps.len());
        for (index, step) in program.steps.iter().enumerate() {
            if positions.insert(step.tag, index).is_some() {
                return Err(IrError::invariant_violation(
                    "tag defined twice",
                    format!("step[{index}] redefines {}", step.tag),
                ));
            }
            if program.tags.kind(step.tag) != Some(&TagKind::Code) {
                return Err(IrError::invariant_violation(
                    "step tag is not a code tag",
                    format!("step[{index}] at {}", step.tag),
                ));
            }
        }
        Ok(Self { program, positions })
    }

    fn verify(&self) -> Result<(), IrError> {
        if !self.positions.contains_key(&self.program.entry) {
            return Err(IrError::invariant_violation(
                "entry tag is not defined",
                self.program.entry.to_string(),
            ));
        }
        for (index, step) in self.program.steps.iter().enumerate() {
            self.verify_edges(index, step)?;
            if let StepKind::Invoke { pipeline, .. } = &step.kind {
                self.verify_pipeline(index, pipeline)?;
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Control flow
    // -----------------------------------------------------------------------

    fn verify_edges(&self, index: usize, step: &ChainStep) -> Result<(), IrError> {
        for successor in step.successors() {
            let Some(&position) = self.positions.get(&successor) else {
                return Err(IrError::invariant_violation(
                    "dangling successor",
                    format!("step[{index}] ({}) continues to {successor}", step.tag),
                ));
            };
            if position <= index {
                return Err(IrError::invariant_violation(
                    "backward branch",
                    format!(
                        "step[{index}] ({}) continues to {successor} at step[{position}]",
                        step.tag
                    ),
                ));
            }
        }
        for entry in step.nested_entries() {
            if !self.positions.contains_key(&entry) {
                return Err(IrError::invariant_violation(
                    "nested program entry is not defined",
                    format!("step[{index}] ({}) starts {entry}", step.tag),
                ));
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Pipelines
    // -----------------------------------------------------------------------

    fn verify_pipeline(&self, index: usize, pipeline: &PipelineStep) -> Result<(), IrError> {
        if pipeline.commands.is_empty() {
            return Err(IrError::invariant_violation(
                "empty pipeline",
                format!("step[{index}]"),
            ));
        }
        for capture in &pipeline.captures {
            if capture.slot.value() >= self.program.slot_count {
                return Err(IrError::invariant_violation(
                    "capture slot out of range",
                    format!(
                        "step[{index}] fills slot {} of {}",
                        capture.slot.value(),
                        self.program.slot_count
                    ),
                ));
            }
        }
        for (command_index, command) in pipeline.commands.iter().enumerate() {
            let ctx = format!("step[{index}] command[{command_index}]");
            if let InvokeTarget::Program(argument) = command.target {
                self.check_argument(pipeline, argument, &ctx)?;
            }
            for argument in &command.arguments {
                self.check_argument(pipeline, *argument, &ctx)?;
            }
            for target in [command.stdin, command.stdout].into_iter().flatten() {
                match target {
                    StdTarget::File { path, .. } => self.check_argument(pipeline, path, &ctx)?,
                    StdTarget::PipeEnd(pipe) if pipe >= pipeline.pipes => {
                        return Err(IrError::invariant_violation(
                            "pipe index out of range",
                            format!("{ctx} uses pipe {pipe} of {}", pipeline.pipes),
                        ));
                    }
                    StdTarget::PipeEnd(_) => {}
                }
            }
        }
        Ok(())
    }

    fn check_argument(
        &self,
        pipeline: &PipelineStep,
        argument: Argument,
        ctx: &str,
    ) -> Result<(), IrError> {
        match argument {
            Argument::Literal(tag) => {
                if self.program.tags.literal_text(tag).is_none() {
                    return Err(IrError::invariant_violation(
                        "argument tag is not a literal",
                        format!("{ctx} references {tag}"),
                    ));
                }
            }
            Argument::Expansion(slot) => {
                if !pipeline.captures.iter().any(|capture| capture.slot == slot) {
                    return Err(IrError::invariant_violation(
                        "expansion slot is not captured by its step",
                        format!("{ctx} reads slot {}", slot.value()),
                    ));
                }
            }
        }
        Ok(())
    }
}
