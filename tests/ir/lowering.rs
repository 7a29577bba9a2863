//! Lowering of parsed command lines into chain programs.

use jish::ir::{
    verify_program, Argument, Branch, ChainProgram, CompileOptions, InvokeTarget, IrErrorKind,
    LoweringContext, OpenMode, StdTarget, StepKind,
};
use jish::parser::{parse_line, Builtin};

// ===========================================================================
// Helpers
// ===========================================================================

fn lower_with(input: &str, options: CompileOptions) -> ChainProgram {
    let scope = parse_line(input).unwrap_or_else(|err| panic!("{input:?} should parse: {err}"));
    let program = LoweringContext::new(options)
        .lower(&scope)
        .unwrap_or_else(|err| panic!("{input:?} should lower: {err}"));
    verify_program(&program).unwrap_or_else(|err| panic!("{input:?} should verify: {err}"));
    program
}

fn lower(input: &str) -> ChainProgram {
    lower_with(input, CompileOptions::default())
}

fn terminals(program: &ChainProgram) -> usize {
    program.count_steps(|kind| matches!(kind, StepKind::Terminal))
}

fn literal(program: &ChainProgram, argument: Argument) -> &str {
    let Argument::Literal(tag) = argument else {
        panic!("expected a literal, got {argument:?}");
    };
    program.tags.literal_text(tag).expect("literal tag")
}

// ===========================================================================
// Shapes
// ===========================================================================

#[test]
fn dump_of_and_chain() {
    let program = lower("true && false");
    assert_eq!(
        program.to_string(),
        "entry t0 (0 slots)\n\
         t0: invoke pipes=0 [true] -> t2\n\
         t2: test ok -> t3, fail -> t1\n\
         t3: invoke pipes=0 [false] -> t1\n\
         t1: terminal\n"
    );
}

#[test]
fn if_arms_converge_on_one_tag() {
    let program = lower("if true then a else b end; c");
    let StepKind::Test(Branch::If { direct, reverse }) = program.steps[1].kind else {
        panic!("expected test, got {:?}", program.steps[1].kind);
    };
    let next_of = |tag| match &program.step(tag).expect("arm").kind {
        StepKind::Invoke { next, .. } => *next,
        other => panic!("expected invoke, got {other:?}"),
    };
    let join = next_of(direct);
    assert_eq!(join, next_of(reverse));
    let StepKind::Invoke { pipeline, .. } = &program.step(join).expect("join").kind else {
        panic!("expected the join to run c");
    };
    let InvokeTarget::Program(name) = pipeline.commands[0].target else {
        panic!("expected a program");
    };
    assert_eq!(literal(&program, name), "c");
}

#[test]
fn three_stage_pipeline_wires_pipe_ends() {
    let program = lower("a | b | c");
    let StepKind::Invoke { pipeline, .. } = &program.steps[0].kind else {
        panic!("expected invoke");
    };
    assert_eq!(pipeline.pipes, 2);
    let ends: Vec<_> = pipeline
        .commands
        .iter()
        .map(|command| (command.stdin, command.stdout))
        .collect();
    assert_eq!(
        ends,
        vec![
            (None, Some(StdTarget::PipeEnd(0))),
            (Some(StdTarget::PipeEnd(0)), Some(StdTarget::PipeEnd(1))),
            (Some(StdTarget::PipeEnd(1)), None),
        ]
    );
}

#[test]
fn file_redirect_overrides_pipe_end() {
    let program = lower("a > out | b");
    let StepKind::Invoke { pipeline, .. } = &program.steps[0].kind else {
        panic!("expected invoke");
    };
    let Some(StdTarget::File { path, mode }) = pipeline.commands[0].stdout else {
        panic!("expected a file target");
    };
    assert_eq!(mode, OpenMode::Replace);
    assert_eq!(literal(&program, path), "out");
    assert_eq!(pipeline.commands[1].stdin, Some(StdTarget::PipeEnd(0)));
}

#[test]
fn repeated_words_share_one_literal() {
    let program = lower("echo x x; echo x");
    let literals: Vec<_> = program.tags.literals().map(|(_, text)| text).collect();
    assert_eq!(literals, vec!["echo", "x"]);
}

#[test]
fn substitutions_become_nested_programs() {
    let program = lower("echo $(pwd) $(date)");
    assert_eq!(program.slot_count, 2);
    assert_eq!(terminals(&program), 3);
    let StepKind::Invoke { pipeline, .. } = &program.steps[0].kind else {
        panic!("expected invoke");
    };
    assert_eq!(pipeline.captures.len(), 2);
    for capture in &pipeline.captures {
        assert!(program.position(capture.entry).expect("nested entry") > 1);
    }
    assert_eq!(
        pipeline.commands[0].arguments,
        vec![
            Argument::Expansion(pipeline.captures[0].slot),
            Argument::Expansion(pipeline.captures[1].slot),
        ]
    );
}

#[test]
fn nested_substitution_slots_are_distinct() {
    let program = lower("echo $(basename $(pwd))");
    assert_eq!(program.slot_count, 2);
    assert_eq!(terminals(&program), 3);
}

#[test]
fn detached_if_is_a_nested_program() {
    let program = lower("if true then a end &");
    let StepKind::Detach { entry, next } = program.steps[0].kind else {
        panic!("expected detach, got {:?}", program.steps[0].kind);
    };
    assert_eq!(program.step(next).map(|step| &step.kind), Some(&StepKind::Terminal));
    assert!(program.position(entry).expect("nested entry") > 1);
    assert_eq!(terminals(&program), 2);
}

#[test]
fn unsupported_builtin_lowers_to_unimplemented() {
    let program = lower("true | jobs");
    assert_eq!(
        program.steps[0].kind,
        StepKind::Unimplemented {
            builtin: Builtin::Jobs,
            next: program.steps[1].tag,
        }
    );
}

#[test]
fn empty_line_is_pass_then_terminal() {
    let program = lower("");
    assert_eq!(program.to_string(), "entry t0 (0 slots)\nt0: pass -> t1\nt1: terminal\n");
}

// ===========================================================================
// Limits
// ===========================================================================

#[test]
fn pipeline_width_limit() {
    let options = CompileOptions {
        max_pipeline_width: 2,
        ..CompileOptions::default()
    };
    let scope = parse_line("a | b | c").expect("parse");
    let err = LoweringContext::new(options)
        .lower(&scope)
        .expect_err("too wide");
    assert_eq!(err.kind, IrErrorKind::LimitExceeded);
    lower_with("a | b", options);
}

#[test]
fn capture_and_tag_limits() {
    let scope = parse_line("echo $(a) $(b)").expect("parse");
    let captures = CompileOptions {
        max_captures: 1,
        ..CompileOptions::default()
    };
    let err = LoweringContext::new(captures).lower(&scope).expect_err("captures");
    assert_eq!(err.kind, IrErrorKind::LimitExceeded);

    let tags = CompileOptions {
        max_tags: 3,
        ..CompileOptions::default()
    };
    let err = LoweringContext::new(tags).lower(&scope).expect_err("tags");
    assert_eq!(err.message, "tag table is full");
}

#[test]
fn argument_limit() {
    let options = CompileOptions {
        max_arguments: 2,
        ..CompileOptions::default()
    };
    let scope = parse_line("echo a b c").expect("parse");
    let err = LoweringContext::new(options).lower(&scope).expect_err("arguments");
    assert_eq!(err.message, "too many arguments");
}

#[test]
fn words_with_nul_are_rejected() {
    let scope = parse_line("echo 'a\0b'").expect("parse");
    let err = LoweringContext::new(CompileOptions::default())
        .lower(&scope)
        .expect_err("nul in word");
    assert_eq!(err.kind, IrErrorKind::InvalidLiteral);
}
