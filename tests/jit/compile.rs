//! Compilation without running the generated code.

use jish::codegen::CodegenErrorKind;
use jish::ir::CompileOptions;
use jish::runtime::Environment;
use jish::shell::{Shell, ShellConfig, ShellErrorKind};
use jish::Engine;
use proptest::prelude::*;

use crate::{parse, quiet_engine};

// ---------------------------------------------------------------------------
// Strategies
// ---------------------------------------------------------------------------

fn arb_line() -> impl Strategy<Value = &'static str> {
    prop_oneof![
        Just(""),
        Just("true"),
        Just("exit 3"),
        Just("cd /tmp"),
        Just("cd"),
        Just("ls -la /"),
        Just("echo a | sort | uniq -c > out"),
        Just("cat < in >> log"),
        Just("true && false || echo recovered"),
        Just("if test -d / then echo dir else echo file end"),
        Just("if a then if b then c end end; d"),
        Just("echo $(basename $(pwd)) $(date)"),
        Just("$(which ls) -l"),
        Just("sleep 1 &"),
        Just("if true then sleep 1 end &"),
        Just("cd / | exit 4"),
        Just("jobs; again; help"),
        Just("cat > $(mktemp)"),
    ]
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn entry_lies_inside_the_block() {
    let closure = quiet_engine().compile(&parse("ls | wc -l")).expect("compile");
    assert!(closure.code_range().contains(&closure.entry_address()));
    assert_eq!(closure.pending_children(), 0);
    assert_eq!(closure.status(), 0);
}

#[test]
fn lowered_program_compiles_separately() {
    let engine = quiet_engine();
    let program = engine.lower(&parse("echo $(pwd) > out")).expect("lower");
    assert_eq!(program.slot_count, 1);
    let closure = engine.compile_program(program).expect("compile");
    assert_eq!(closure.capture(0).as_deref(), Some(""));
    assert!(closure.capture_fds().is_empty());
}

#[test]
fn trampolines_are_shared_between_closures() {
    let engine = quiet_engine();
    let _first = engine.compile(&parse("a | b")).expect("compile");
    let after_first = engine.trampoline_count();
    let _second = engine.compile(&parse("c | d")).expect("compile");
    assert_eq!(engine.trampoline_count(), after_first);
}

#[test]
fn clones_share_one_block() {
    let closure = quiet_engine().compile(&parse("true")).expect("compile");
    let clone = closure.clone();
    let range = closure.code_range();
    drop(closure);
    assert_eq!(clone.code_range(), range);
}

#[test]
fn lowering_limits_surface_as_encode_errors() {
    let engine = Engine::new(CompileOptions {
        max_tags: 2,
        ..CompileOptions::default()
    });
    let err = engine.compile(&parse("ls")).expect_err("tag limit");
    assert_eq!(err.kind, CodegenErrorKind::Encode);
    assert!(err.to_string().contains("tag table is full"), "{err}");
}

#[test]
fn compile_errors_set_status_two() {
    let engine = Engine::new(CompileOptions {
        max_arguments: 0,
        ..CompileOptions::default()
    });
    let mut shell = Shell::new(engine, Environment::new(false), ShellConfig::default());
    let err = shell.run_line("echo hi").expect_err("argument limit");
    assert_eq!(err.kind, ShellErrorKind::Compile);
    assert_eq!(shell.last_status(), 2);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn every_line_compiles(line in arb_line()) {
        let engine = quiet_engine();
        let closure = engine.compile(&parse(line));
        prop_assert!(closure.is_ok(), "{line:?}: {:?}", closure.as_ref().err());
    }
}
