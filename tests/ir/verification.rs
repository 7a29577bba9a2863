//! Structural checks on hand-built chain programs.

use jish::ir::{
    verify_program, Argument, Capture, ChainProgram, ChainStep, InvokeDescriptor, InvokeTarget,
    IrErrorKind, OpenMode, PipelineStep, SlotId, StdTarget, StepKind, Tag, TagTable,
};

// ===========================================================================
// Helpers
// ===========================================================================

struct Builder {
    tags: TagTable,
    steps: Vec<ChainStep>,
    slot_count: u32,
}

impl Builder {
    fn new() -> Self {
        Self {
            tags: TagTable::new(64),
            steps: Vec::new(),
            slot_count: 0,
        }
    }

    fn tag(&mut self) -> Tag {
        self.tags.fresh().expect("tag")
    }

    fn literal(&mut self, text: &str) -> Argument {
        Argument::Literal(self.tags.literal(text).expect("literal"))
    }

    fn push(&mut self, tag: Tag, kind: StepKind) {
        self.steps.push(ChainStep::new(tag, kind));
    }

    fn finish(self, entry: Tag) -> ChainProgram {
        ChainProgram {
            entry,
            steps: self.steps,
            tags: self.tags,
            slot_count: self.slot_count,
        }
    }
}

fn program(command: InvokeDescriptor, pipes: u32, captures: Vec<Capture>, slots: u32) -> ChainProgram {
    let mut builder = Builder::new();
    builder.slot_count = slots;
    let head = builder.tag();
    let tail = builder.tag();
    let nested = builder.tag();
    let pipeline = PipelineStep {
        pipes,
        commands: vec![command],
        captures: captures
            .into_iter()
            .map(|capture| Capture {
                entry: nested,
                ..capture
            })
            .collect(),
        detached: false,
    };
    builder.push(head, StepKind::Invoke { pipeline, next: tail });
    builder.push(tail, StepKind::Terminal);
    builder.push(nested, StepKind::Terminal);
    builder.finish(head)
}

fn command(target: InvokeTarget) -> InvokeDescriptor {
    InvokeDescriptor {
        target,
        arguments: Vec::new(),
        stdin: None,
        stdout: None,
    }
}

fn violation(program: &ChainProgram) -> String {
    let err = verify_program(program).expect_err("program should be rejected");
    assert_eq!(err.kind, IrErrorKind::InvariantViolation);
    err.message
}

// ===========================================================================
// Cases
// ===========================================================================

#[test]
fn undefined_entry() {
    let mut builder = Builder::new();
    let head = builder.tag();
    let missing = builder.tag();
    builder.push(head, StepKind::Terminal);
    assert_eq!(violation(&builder.finish(missing)), "entry tag is not defined");
}

#[test]
fn step_on_literal_tag() {
    let mut builder = Builder::new();
    let Argument::Literal(tag) = builder.literal("ls") else {
        unreachable!();
    };
    builder.push(tag, StepKind::Terminal);
    assert_eq!(violation(&builder.finish(tag)), "step tag is not a code tag");
}

#[test]
fn detach_into_nowhere() {
    let mut builder = Builder::new();
    let head = builder.tag();
    let tail = builder.tag();
    let nowhere = builder.tag();
    builder.push(head, StepKind::Detach { entry: nowhere, next: tail });
    builder.push(tail, StepKind::Terminal);
    assert_eq!(
        violation(&builder.finish(head)),
        "nested program entry is not defined"
    );
}

#[test]
fn pipe_end_beyond_pipeline() {
    let mut builder = Builder::new();
    let head = builder.tag();
    let tail = builder.tag();
    let name = builder.literal("cat");
    let mut cat = command(InvokeTarget::Program(name));
    cat.stdout = Some(StdTarget::PipeEnd(1));
    let pipeline = PipelineStep {
        pipes: 1,
        commands: vec![cat],
        ..PipelineStep::default()
    };
    builder.push(head, StepKind::Invoke { pipeline, next: tail });
    builder.push(tail, StepKind::Terminal);
    assert_eq!(violation(&builder.finish(head)), "pipe index out of range");
}

#[test]
fn capture_slot_beyond_slot_count() {
    let capture = Capture {
        slot: SlotId::new(1),
        entry: Tag::default(),
    };
    let target = InvokeTarget::Program(Argument::Expansion(SlotId::new(1)));
    let program = program(command(target), 0, vec![capture], 1);
    assert_eq!(violation(&program), "capture slot out of range");
}

#[test]
fn file_path_must_be_a_literal() {
    let mut builder = Builder::new();
    let head = builder.tag();
    let tail = builder.tag();
    let name = builder.literal("sort");
    let mut sort = command(InvokeTarget::Program(name));
    sort.stdin = Some(StdTarget::File {
        path: Argument::Literal(tail),
        mode: OpenMode::Read,
    });
    let pipeline = PipelineStep {
        commands: vec![sort],
        ..PipelineStep::default()
    };
    builder.push(head, StepKind::Invoke { pipeline, next: tail });
    builder.push(tail, StepKind::Terminal);
    assert_eq!(
        violation(&builder.finish(head)),
        "argument tag is not a literal"
    );
}

#[test]
fn captured_expansion_is_accepted() {
    let capture = Capture {
        slot: SlotId::new(0),
        entry: Tag::default(),
    };
    let target = InvokeTarget::Program(Argument::Expansion(SlotId::new(0)));
    let program = program(command(target), 0, vec![capture], 1);
    assert!(verify_program(&program).is_ok());
}
