//! Typed syntax tree consumed by the control-flow compiler.
//!
//! Every node kind carries exactly the children it needs, so a malformed
//! tree (a pipe stage that is an `if`, an `if` without a condition) cannot
//! be constructed.

/// Top-level or nested command sequence.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Scope {
    /// Commands in source order.
    pub commands: Vec<Command>,
}

impl Scope {
    /// Creates a scope from commands.
    pub fn new(commands: Vec<Command>) -> Self {
        Self { commands }
    }

    /// Returns `true` when the scope has no commands.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

/// One command in a scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// A single invocation.
    Invocation(Invocation),
    /// `left | right`.
    Pipe(Pipe),
    /// `left && right`.
    And(Box<Command>, Box<Command>),
    /// `left || right`.
    Or(Box<Command>, Box<Command>),
    /// `if ... then ... else ... end`.
    If(Box<IfClosure>),
    /// `command &`.
    Detach(Box<Command>),
}

/// Two pipeline halves joined by one pipe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pipe {
    /// Writer side.
    pub left: Box<PipeStage>,
    /// Reader side.
    pub right: Box<PipeStage>,
}

impl Pipe {
    /// Creates a pipe node.
    pub fn new(left: PipeStage, right: PipeStage) -> Self {
        Self {
            left: Box::new(left),
            right: Box::new(right),
        }
    }
}

/// Operand of a pipe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipeStage {
    /// One command.
    Invocation(Invocation),
    /// A nested sub-pipeline.
    Pipe(Pipe),
}

/// Conditional with optional arms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IfClosure {
    /// Condition scope; its final status selects the arm.
    pub condition: Scope,
    /// Arm taken on success.
    pub direct: Option<Scope>,
    /// Arm taken on failure.
    pub reverse: Option<Scope>,
}

/// One command to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// What to run.
    pub target: Target,
    /// Arguments after the target.
    pub arguments: Vec<Word>,
    /// Redirections in source order.
    pub redirects: Vec<Redirect>,
}

impl Invocation {
    /// Creates an invocation of a regular program with literal arguments.
    pub fn program(name: &str, arguments: &[&str]) -> Self {
        Self {
            target: Target::Program(Word::literal(name)),
            arguments: arguments.iter().map(|arg| Word::literal(arg)).collect(),
            redirects: Vec::new(),
        }
    }

    /// Creates an invocation of a builtin with literal arguments.
    pub fn builtin(builtin: Builtin, arguments: &[&str]) -> Self {
        Self {
            target: Target::Builtin(builtin),
            arguments: arguments.iter().map(|arg| Word::literal(arg)).collect(),
            redirects: Vec::new(),
        }
    }

    /// Adds one redirection.
    pub fn with_redirect(mut self, redirect: Redirect) -> Self {
        self.redirects.push(redirect);
        self
    }
}

/// Invocation target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// A shell builtin.
    Builtin(Builtin),
    /// A regular program, looked up through `PATH` at exec time.
    Program(Word),
}

/// A word operand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Word {
    /// Literal text.
    Literal(String),
    /// `$( scope )`, replaced by the scope's captured output.
    Substitution(Scope),
}

impl Word {
    /// Creates a literal word.
    pub fn literal(text: &str) -> Self {
        Self::Literal(text.to_string())
    }
}

/// Standard stream redirection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Redirect {
    /// `< path`
    Input(Word),
    /// `>> path`
    OutputAppend(Word),
    /// `> path`
    OutputReplace(Word),
}

/// Builtin command names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    /// `cd [dir]`
    Cd,
    /// `exit [status]`
    Exit,
    /// `true`
    True,
    /// `false`
    False,
    /// `again`
    Again,
    /// `fg`
    Fg,
    /// `get`
    Get,
    /// `help`
    Help,
    /// `history`
    History,
    /// `jobs`
    Jobs,
    /// `set`
    Set,
    /// `unset`
    Unset,
}

impl Builtin {
    /// All builtins, in declaration order.
    pub const ALL: [Builtin; 12] = [
        Self::Cd,
        Self::Exit,
        Self::True,
        Self::False,
        Self::Again,
        Self::Fg,
        Self::Get,
        Self::Help,
        Self::History,
        Self::Jobs,
        Self::Set,
        Self::Unset,
    ];

    /// Resolves a builtin by its command name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|builtin| builtin.name() == name)
    }

    /// Returns the command name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Cd => "cd",
            Self::Exit => "exit",
            Self::True => "true",
            Self::False => "false",
            Self::Again => "again",
            Self::Fg => "fg",
            Self::Get => "get",
            Self::Help => "help",
            Self::History => "history",
            Self::Jobs => "jobs",
            Self::Set => "set",
            Self::Unset => "unset",
        }
    }

    /// Returns `true` when the builtin has compiled behavior.
    pub fn is_supported(self) -> bool {
        matches!(self, Self::Cd | Self::Exit | Self::True | Self::False)
    }

    /// Stable numeric id shared with the host helpers.
    pub fn id(self) -> u32 {
        self as u32
    }

    /// Inverse of [`Builtin::id`].
    pub fn from_id(id: u32) -> Option<Self> {
        Self::ALL.get(id as usize).copied()
    }
}
