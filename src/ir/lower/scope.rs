//! Scope, boolean, conditional and detach lowering.

use crate::ir::chain::{Branch, StepKind};
use crate::ir::error::IrError;
use crate::ir::ids::Tag;
use crate::parser::ast::{Command, IfClosure, Scope};

use super::pipeline::Stage;
use super::{Lowerer, Nested};

impl<'a> Lowerer<'a> {
    /// Compiles `scope` so that control enters at `head` and leaves at `tail`.
    pub(super) fn compile_scope(
        &mut self,
        scope: &'a Scope,
        head: Tag,
        tail: Tag,
    ) -> Result<(), IrError> {
        if scope.is_empty() {
            self.push(head, StepKind::Pass { next: tail });
            return Ok(());
        }

        let last = scope.commands.len() - 1;
        let mut head = head;
        for (index, command) in scope.commands.iter().enumerate() {
            let next = if index == last {
                tail
            } else {
                self.tags.fresh()?
            };
            self.compile_command(command, head, next)?;
            head = next;
        }
        Ok(())
    }

    /// Compiles one command between `head` and `next`.
    pub(super) fn compile_command(
        &mut self,
        command: &'a Command,
        head: Tag,
        next: Tag,
    ) -> Result<(), IrError> {
        match command {
            Command::Invocation(invocation) => {
                self.compile_pipeline(Stage::Invocation(invocation), false, head, next)
            }
            Command::Pipe(pipe) => self.compile_pipeline(Stage::Pipe(pipe), false, head, next),
            Command::And(left, right) => self.compile_short_circuit(left, right, true, head, next),
            Command::Or(left, right) => self.compile_short_circuit(left, right, false, head, next),
            Command::If(closure) => self.compile_if(closure, head, next),
            Command::Detach(inner) => self.compile_detach(inner, head, next),
        }
    }

    fn compile_short_circuit(
        &mut self,
        left: &'a Command,
        right: &'a Command,
        is_and: bool,
        head: Tag,
        next: Tag,
    ) -> Result<(), IrError> {
        let test = self.tags.fresh()?;
        self.compile_command(left, head, test)?;

        let right_head = self.tags.fresh()?;
        let branch = if is_and {
            Branch::If {
                direct: right_head,
                reverse: next,
            }
        } else {
            Branch::If {
                direct: next,
                reverse: right_head,
            }
        };
        self.push(test, StepKind::Test(branch));
        self.compile_command(right, right_head, next)
    }

    fn compile_if(&mut self, closure: &'a IfClosure, head: Tag, next: Tag) -> Result<(), IrError> {
        let test = self.tags.fresh()?;
        self.compile_scope(&closure.condition, head, test)?;

        let direct = self.tags.fresh()?;
        let reverse = self.tags.fresh()?;
        self.push(test, StepKind::Test(Branch::If { direct, reverse }));

        self.compile_arm(closure.direct.as_ref(), direct, next)?;
        self.compile_arm(closure.reverse.as_ref(), reverse, next)
    }

    fn compile_arm(&mut self, arm: Option<&'a Scope>, head: Tag, next: Tag) -> Result<(), IrError> {
        match arm {
            Some(scope) => self.compile_scope(scope, head, next),
            None => {
                self.push(head, StepKind::Pass { next });
                Ok(())
            }
        }
    }

    fn compile_detach(&mut self, inner: &'a Command, head: Tag, next: Tag) -> Result<(), IrError> {
        match inner {
            Command::Invocation(invocation) => {
                self.compile_pipeline(Stage::Invocation(invocation), true, head, next)
            }
            Command::Pipe(pipe) => self.compile_pipeline(Stage::Pipe(pipe), true, head, next),
            compound => {
                let entry = self.defer(Nested::Command(compound))?;
                self.push(head, StepKind::Detach { entry, next });
                Ok(())
            }
        }
    }
}
