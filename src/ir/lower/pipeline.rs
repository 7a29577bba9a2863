//! Pipeline and invocation lowering.
//!
//! A whole pipeline is walked before its step is pushed: every pipe index,
//! capture slot and literal tag is known by the time the emitter sees the
//! step.

use crate::ir::chain::{
    Argument, Capture, InvokeDescriptor, InvokeTarget, OpenMode, PipelineStep, StdTarget, StepKind,
};
use crate::ir::error::IrError;
use crate::ir::ids::Tag;
use crate::parser::ast::{Builtin, Invocation, Pipe, PipeStage, Redirect, Target, Word};

use super::{Lowerer, Nested};

/// Root of a pipeline walk.
#[derive(Clone, Copy)]
pub(super) enum Stage<'a> {
    Invocation(&'a Invocation),
    Pipe(&'a Pipe),
}

impl Stage<'_> {
    /// First builtin in the pipeline that has no compiled behavior.
    fn unsupported_builtin(self) -> Option<Builtin> {
        match self {
            Stage::Invocation(invocation) => match invocation.target {
                Target::Builtin(builtin) if !builtin.is_supported() => Some(builtin),
                _ => None,
            },
            Stage::Pipe(pipe) => [&*pipe.left, &*pipe.right].into_iter().find_map(|stage| {
                match stage {
                    PipeStage::Invocation(invocation) => {
                        Stage::Invocation(invocation).unsupported_builtin()
                    }
                    PipeStage::Pipe(pipe) => Stage::Pipe(pipe).unsupported_builtin(),
                }
            }),
        }
    }
}

impl<'a> Lowerer<'a> {
    /// Compiles a pipeline (or lone invocation) into one step.
    pub(super) fn compile_pipeline(
        &mut self,
        stage: Stage<'a>,
        detached: bool,
        head: Tag,
        next: Tag,
    ) -> Result<(), IrError> {
        if let Some(builtin) = stage.unsupported_builtin() {
            self.push(head, StepKind::Unimplemented { builtin, next });
            return Ok(());
        }

        let mut step = PipelineStep {
            detached,
            ..PipelineStep::default()
        };
        match stage {
            Stage::Invocation(invocation) => {
                self.walk_invocation(&mut step, invocation, None, None)?
            }
            Stage::Pipe(pipe) => self.walk_pipe(&mut step, pipe, None, None)?,
        }
        self.push(
            head,
            StepKind::Invoke {
                pipeline: step,
                next,
            },
        );
        Ok(())
    }

    fn walk_stage(
        &mut self,
        step: &mut PipelineStep,
        stage: &'a PipeStage,
        stdin: Option<StdTarget>,
        stdout: Option<StdTarget>,
    ) -> Result<(), IrError> {
        match stage {
            PipeStage::Invocation(invocation) => {
                self.walk_invocation(step, invocation, stdin, stdout)
            }
            PipeStage::Pipe(pipe) => self.walk_pipe(step, pipe, stdin, stdout),
        }
    }

    fn walk_pipe(
        &mut self,
        step: &mut PipelineStep,
        pipe: &'a Pipe,
        stdin: Option<StdTarget>,
        stdout: Option<StdTarget>,
    ) -> Result<(), IrError> {
        let index = step.pipes;
        step.pipes += 1;
        self.walk_stage(step, &pipe.left, stdin, Some(StdTarget::PipeEnd(index)))?;
        self.walk_stage(step, &pipe.right, Some(StdTarget::PipeEnd(index)), stdout)
    }

    fn walk_invocation(
        &mut self,
        step: &mut PipelineStep,
        invocation: &'a Invocation,
        mut stdin: Option<StdTarget>,
        mut stdout: Option<StdTarget>,
    ) -> Result<(), IrError> {
        if step.commands.len() >= self.options.max_pipeline_width {
            return Err(IrError::limit_exceeded(
                "pipeline is too wide",
                format!("limit {}", self.options.max_pipeline_width),
            ));
        }
        if invocation.arguments.len() > self.options.max_arguments {
            return Err(IrError::limit_exceeded(
                "too many arguments",
                format!(
                    "{} arguments, limit {}",
                    invocation.arguments.len(),
                    self.options.max_arguments
                ),
            ));
        }

        let target = match &invocation.target {
            Target::Builtin(builtin) => InvokeTarget::Builtin(*builtin),
            Target::Program(word) => InvokeTarget::Program(self.lower_word(step, word)?),
        };
        let arguments = invocation
            .arguments
            .iter()
            .map(|word| self.lower_word(step, word))
            .collect::<Result<Vec<_>, _>>()?;

        for redirect in &invocation.redirects {
            match redirect {
                Redirect::Input(path) => {
                    stdin = Some(self.file_target(step, path, OpenMode::Read)?);
                }
                Redirect::OutputAppend(path) => {
                    stdout = Some(self.file_target(step, path, OpenMode::Append)?);
                }
                Redirect::OutputReplace(path) => {
                    stdout = Some(self.file_target(step, path, OpenMode::Replace)?);
                }
            }
        }

        step.commands.push(InvokeDescriptor {
            target,
            arguments,
            stdin,
            stdout,
        });
        Ok(())
    }

    fn file_target(
        &mut self,
        step: &mut PipelineStep,
        path: &'a Word,
        mode: OpenMode,
    ) -> Result<StdTarget, IrError> {
        let path = self.lower_word(step, path)?;
        Ok(StdTarget::File { path, mode })
    }

    fn lower_word(&mut self, step: &mut PipelineStep, word: &'a Word) -> Result<Argument, IrError> {
        match word {
            Word::Literal(text) => Ok(Argument::Literal(self.tags.literal(text)?)),
            Word::Substitution(scope) => {
                let slot = self.allocate_slot()?;
                let entry = self.defer(Nested::Scope(scope))?;
                step.captures.push(Capture { slot, entry });
                Ok(Argument::Expansion(slot))
            }
        }
    }
}
