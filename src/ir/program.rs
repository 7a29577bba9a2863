//! Chain program container and compile options.

use std::fmt;

use crate::ir::chain::{Argument, Branch, ChainStep, InvokeTarget, StdTarget, StepKind};
use crate::ir::ids::Tag;
use crate::ir::tags::TagTable;

/// Resource guardrails for lowering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CompileOptions {
    /// Maximum tags in one compilation.
    pub max_tags: usize,
    /// Maximum commands in one pipeline.
    pub max_pipeline_width: usize,
    /// Maximum arguments of one invocation.
    pub max_arguments: usize,
    /// Maximum command substitutions in one compiled program.
    pub max_captures: usize,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            max_tags: 65_536,
            max_pipeline_width: 256,
            max_arguments: 4_096,
            max_captures: 1_024,
        }
    }
}

/// Linear, tag-addressed program produced by lowering.
#[derive(Debug, Clone)]
pub struct ChainProgram {
    /// Tag of the first step to run.
    pub entry: Tag,
    /// Steps in layout order.
    pub steps: Vec<ChainStep>,
    /// Label table, including interned literals.
    pub tags: TagTable,
    /// Number of capture slots the closure must provide.
    pub slot_count: u32,
}

impl ChainProgram {
    /// Finds the step defined at `tag`.
    pub fn step(&self, tag: Tag) -> Option<&ChainStep> {
        self.steps.iter().find(|step| step.tag == tag)
    }

    /// Returns the layout position of the step defined at `tag`.
    pub fn position(&self, tag: Tag) -> Option<usize> {
        self.steps.iter().position(|step| step.tag == tag)
    }

    /// Counts steps matching a predicate.
    pub fn count_steps(&self, predicate: impl Fn(&StepKind) -> bool) -> usize {
        self.steps.iter().filter(|step| predicate(&step.kind)).count()
    }

    fn fmt_argument(&self, f: &mut fmt::Formatter<'_>, argument: Argument) -> fmt::Result {
        match argument {
            Argument::Literal(tag) => {
                write!(f, "{:?}", self.tags.literal_text(tag).unwrap_or("<?>"))
            }
            Argument::Expansion(slot) => write!(f, "$slot{}", slot.value()),
        }
    }

    fn fmt_std(&self, f: &mut fmt::Formatter<'_>, op: &str, target: StdTarget) -> fmt::Result {
        match target {
            StdTarget::File { path, mode } => {
                write!(f, " {op}{mode:?}:")?;
                self.fmt_argument(f, path)
            }
            StdTarget::PipeEnd(index) => write!(f, " {op}pipe{index}"),
        }
    }
}

impl fmt::Display for ChainProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "entry {} ({} slots)", self.entry, self.slot_count)?;
        for step in &self.steps {
            write!(f, "{}: ", step.tag)?;
            match &step.kind {
                StepKind::Invoke { pipeline, next } => {
                    write!(f, "invoke pipes={}", pipeline.pipes)?;
                    if pipeline.detached {
                        write!(f, " detached")?;
                    }
                    for capture in &pipeline.captures {
                        write!(f, " capture slot{}<-{}", capture.slot.value(), capture.entry)?;
                    }
                    for command in &pipeline.commands {
                        write!(f, " [")?;
                        match command.target {
                            InvokeTarget::Builtin(builtin) => write!(f, "{}", builtin.name())?,
                            InvokeTarget::Program(argument) => self.fmt_argument(f, argument)?,
                        }
                        for argument in &command.arguments {
                            write!(f, " ")?;
                            self.fmt_argument(f, *argument)?;
                        }
                        if let Some(stdin) = command.stdin {
                            self.fmt_std(f, "<", stdin)?;
                        }
                        if let Some(stdout) = command.stdout {
                            self.fmt_std(f, ">", stdout)?;
                        }
                        write!(f, "]")?;
                    }
                    writeln!(f, " -> {next}")?;
                }
                StepKind::Test(Branch::If { direct, reverse }) => {
                    writeln!(f, "test ok -> {direct}, fail -> {reverse}")?;
                }
                StepKind::Test(Branch::Chain(next)) => writeln!(f, "test -> {next}")?,
                StepKind::Pass { next } => writeln!(f, "pass -> {next}")?,
                StepKind::Terminal => writeln!(f, "terminal")?,
                StepKind::Detach { entry, next } => writeln!(f, "detach {entry} -> {next}")?,
                StepKind::Unimplemented { builtin, next } => {
                    writeln!(f, "unimplemented {} -> {next}", builtin.name())?;
                }
            }
        }
        Ok(())
    }
}
