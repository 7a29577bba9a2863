//! Chain-step contracts produced by the control-flow compiler.

use crate::ir::ids::{SlotId, Tag};
use crate::parser::ast::Builtin;

/// One tagged unit of compiled control flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainStep {
    /// Entry tag of the step.
    pub tag: Tag,
    /// What the step does.
    pub kind: StepKind,
}

impl ChainStep {
    /// Creates a chain step.
    pub fn new(tag: Tag, kind: StepKind) -> Self {
        Self { tag, kind }
    }

    /// Tags control may flow to after this step.
    pub fn successors(&self) -> Vec<Tag> {
        match &self.kind {
            StepKind::Invoke { next, .. }
            | StepKind::Pass { next }
            | StepKind::Detach { next, .. }
            | StepKind::Unimplemented { next, .. } => vec![*next],
            StepKind::Test(branch) => branch.targets(),
            StepKind::Terminal => Vec::new(),
        }
    }

    /// Entry tags of nested programs this step starts.
    pub fn nested_entries(&self) -> Vec<Tag> {
        match &self.kind {
            StepKind::Invoke { pipeline, .. } => {
                pipeline.captures.iter().map(|capture| capture.entry).collect()
            }
            StepKind::Detach { entry, .. } => vec![*entry],
            _ => Vec::new(),
        }
    }
}

/// Step kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepKind {
    /// Runs one pipeline (a single invocation is a one-stage pipeline).
    Invoke {
        /// Pipeline to run.
        pipeline: PipelineStep,
        /// Continuation.
        next: Tag,
    },
    /// Branches on the closure's condition flag.
    Test(Branch),
    /// Sets the continuation and returns.
    Pass {
        /// Continuation.
        next: Tag,
    },
    /// Ends the closure.
    Terminal,
    /// Runs a nested program in a background child.
    Detach {
        /// Nested program entry.
        entry: Tag,
        /// Continuation.
        next: Tag,
    },
    /// A builtin without compiled behavior; faults when reached.
    Unimplemented {
        /// The offending builtin.
        builtin: Builtin,
        /// Continuation, never taken.
        next: Tag,
    },
}

/// Destinations of a control node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Branch {
    /// Exactly one destination.
    Chain(Tag),
    /// Success and failure destinations.
    If {
        /// Taken when the condition flag is zero.
        direct: Tag,
        /// Taken when the condition flag is non-zero.
        reverse: Tag,
    },
}

/// One arm of an `If` branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arm {
    /// Success arm.
    Direct,
    /// Failure arm.
    Reverse,
}

impl Branch {
    /// Selects one arm as a single-tag chain.
    pub fn select(self, arm: Arm) -> Branch {
        match (self, arm) {
            (Branch::Chain(tag), _) => Branch::Chain(tag),
            (Branch::If { direct, .. }, Arm::Direct) => Branch::Chain(direct),
            (Branch::If { reverse, .. }, Arm::Reverse) => Branch::Chain(reverse),
        }
    }

    /// Returns the first destination.
    pub fn head(self) -> Tag {
        match self {
            Branch::Chain(tag) => tag,
            Branch::If { direct, .. } => direct,
        }
    }

    /// Returns every destination.
    pub fn targets(self) -> Vec<Tag> {
        match self {
            Branch::Chain(tag) => vec![tag],
            Branch::If { direct, reverse } => vec![direct, reverse],
        }
    }
}

/// Everything one pipeline step needs at emission time.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PipelineStep {
    /// Number of OS pipes to open.
    pub pipes: u32,
    /// Commands in source order.
    pub commands: Vec<InvokeDescriptor>,
    /// Substitutions to capture before forking, in source order.
    pub captures: Vec<Capture>,
    /// Whether the children go to the detachables instead of the wait queue.
    pub detached: bool,
}

/// One command-substitution capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capture {
    /// Slot receiving the output.
    pub slot: SlotId,
    /// Entry tag of the nested program.
    pub entry: Tag,
}

/// One command to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvokeDescriptor {
    /// Builtin or program.
    pub target: InvokeTarget,
    /// Arguments after the target.
    pub arguments: Vec<Argument>,
    /// Standard input binding.
    pub stdin: Option<StdTarget>,
    /// Standard output binding.
    pub stdout: Option<StdTarget>,
}

/// Resolved invocation target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvokeTarget {
    /// A builtin.
    Builtin(Builtin),
    /// A program path or name.
    Program(Argument),
}

/// A string operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Argument {
    /// Interned literal.
    Literal(Tag),
    /// Captured substitution output.
    Expansion(SlotId),
}

/// Standard stream binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StdTarget {
    /// Open a path.
    File {
        /// Path operand.
        path: Argument,
        /// How to open it.
        mode: OpenMode,
    },
    /// One end of a pipe in the enclosing pipeline.
    PipeEnd(u32),
}

/// File redirection modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// `<`
    Read,
    /// `>>`
    Append,
    /// `>`
    Replace,
}

impl OpenMode {
    /// Returns the `open(2)` flags for this mode.
    pub fn flags(self) -> i32 {
        match self {
            OpenMode::Read => libc::O_RDONLY,
            OpenMode::Append => libc::O_WRONLY | libc::O_CREAT | libc::O_APPEND,
            OpenMode::Replace => libc::O_WRONLY | libc::O_CREAT | libc::O_TRUNC,
        }
    }
}
