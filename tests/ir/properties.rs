//! Property-based tests for lowering using `proptest`.

use std::collections::HashSet;

use jish::ir::{verify_program, ChainProgram, CompileOptions, LoweringContext, StepKind};
use jish::parser::{
    Builtin, Command, IfClosure, Invocation, Pipe, PipeStage, Redirect, Scope, Word,
};
use proptest::prelude::*;

// ---------------------------------------------------------------------------
// Strategies
// ---------------------------------------------------------------------------

fn arb_invocation() -> impl Strategy<Value = Invocation> {
    prop_oneof![
        Just(Invocation::builtin(Builtin::True, &[])),
        Just(Invocation::builtin(Builtin::False, &[])),
        Just(Invocation::builtin(Builtin::Cd, &["/tmp"])),
        Just(Invocation::builtin(Builtin::Exit, &["3"])),
        Just(Invocation::builtin(Builtin::Jobs, &[])),
        Just(Invocation::program("ls", &["-l"])),
        Just(Invocation::program("echo", &["a", "b"])),
        Just(Invocation::program("sort", &[]).with_redirect(Redirect::Input(Word::literal("in")))),
        Just(
            Invocation::program("cat", &[])
                .with_redirect(Redirect::OutputAppend(Word::literal("log")))
        ),
    ]
}

fn nest_pipe(mut stages: Vec<Invocation>) -> Pipe {
    let last = stages.pop().expect("two stages");
    let before = stages.pop().expect("two stages");
    let mut pipe = Pipe::new(PipeStage::Invocation(before), PipeStage::Invocation(last));
    while let Some(left) = stages.pop() {
        pipe = Pipe::new(PipeStage::Invocation(left), PipeStage::Pipe(pipe));
    }
    pipe
}

fn arb_scope(command: BoxedStrategy<Command>) -> impl Strategy<Value = Scope> {
    prop::collection::vec(command, 0..3).prop_map(Scope::new)
}

fn arb_command() -> impl Strategy<Value = Command> {
    let leaf = prop_oneof![
        arb_invocation().prop_map(Command::Invocation),
        prop::collection::vec(arb_invocation(), 2..5).prop_map(|stages| Command::Pipe(nest_pipe(stages))),
    ];
    leaf.prop_recursive(4, 48, 4, |inner| {
        prop_oneof![
            (inner.clone(), inner.clone())
                .prop_map(|(left, right)| Command::And(Box::new(left), Box::new(right))),
            (inner.clone(), inner.clone())
                .prop_map(|(left, right)| Command::Or(Box::new(left), Box::new(right))),
            inner.clone().prop_map(|command| Command::Detach(Box::new(command))),
            (
                arb_scope(inner.clone()),
                prop::option::of(arb_scope(inner.clone())),
                prop::option::of(arb_scope(inner.clone())),
            )
                .prop_map(|(condition, direct, reverse)| {
                    Command::If(Box::new(IfClosure {
                        condition,
                        direct,
                        reverse,
                    }))
                }),
            (arb_invocation(), arb_scope(inner)).prop_map(|(mut invocation, scope)| {
                invocation.arguments.push(Word::Substitution(scope));
                Command::Invocation(invocation)
            }),
        ]
    })
}

fn arb_line() -> impl Strategy<Value = Scope> {
    prop::collection::vec(arb_command(), 0..4).prop_map(Scope::new)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn lower(scope: &Scope) -> ChainProgram {
    LoweringContext::new(CompileOptions::default())
        .lower(scope)
        .expect("generated lines stay within default limits")
}

/// Nested programs started by the line: captures and detached compounds.
fn nested_programs(program: &ChainProgram) -> usize {
    program
        .steps
        .iter()
        .map(|step| step.nested_entries().len())
        .sum()
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn lowered_programs_verify(scope in arb_line()) {
        let program = lower(&scope);
        prop_assert!(verify_program(&program).is_ok(), "{program}");
    }

    #[test]
    fn every_tag_is_defined_once(scope in arb_line()) {
        let program = lower(&scope);
        let mut seen = HashSet::new();
        for step in &program.steps {
            prop_assert!(seen.insert(step.tag), "{} defined twice", step.tag);
        }
        prop_assert!(seen.contains(&program.entry));
    }

    #[test]
    fn control_only_flows_forward(scope in arb_line()) {
        let program = lower(&scope);
        for (index, step) in program.steps.iter().enumerate() {
            for successor in step.successors() {
                let position = program.position(successor).expect("defined successor");
                prop_assert!(position > index, "{} -> {successor}", step.tag);
            }
            for entry in step.nested_entries() {
                let position = program.position(entry).expect("defined nested entry");
                prop_assert!(position > index, "{} starts {entry}", step.tag);
            }
        }
    }

    #[test]
    fn one_terminal_per_program(scope in arb_line()) {
        let program = lower(&scope);
        let terminals = program.count_steps(|kind| matches!(kind, StepKind::Terminal));
        prop_assert_eq!(terminals, 1 + nested_programs(&program));
    }

    #[test]
    fn slots_match_captures(scope in arb_line()) {
        let program = lower(&scope);
        let captures: usize = program
            .steps
            .iter()
            .map(|step| match &step.kind {
                StepKind::Invoke { pipeline, .. } => pipeline.captures.len(),
                _ => 0,
            })
            .sum();
        prop_assert_eq!(program.slot_count as usize, captures);
    }
}
