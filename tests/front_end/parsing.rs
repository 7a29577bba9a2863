//! Parsing of command lines into the typed tree.

use jish::parser::{
    parse_line, Builtin, Command, Invocation, ParseErrorKind, PipeStage, Redirect, Scope, Target,
    Word,
};

// ===========================================================================
// Helpers
// ===========================================================================

fn parse(input: &str) -> Scope {
    parse_line(input).unwrap_or_else(|err| panic!("{input:?} should parse: {err}"))
}

fn only(scope: &Scope) -> &Command {
    assert_eq!(scope.commands.len(), 1, "{scope:?}");
    &scope.commands[0]
}

fn pipe_width(stage: &PipeStage) -> usize {
    match stage {
        PipeStage::Invocation(_) => 1,
        PipeStage::Pipe(pipe) => pipe_width(&pipe.left) + pipe_width(&pipe.right),
    }
}

// ===========================================================================
// Shapes
// ===========================================================================

#[test]
fn separators_split_commands() {
    let scope = parse("a; b\nc");
    assert_eq!(
        scope.commands,
        vec![
            Command::Invocation(Invocation::program("a", &[])),
            Command::Invocation(Invocation::program("b", &[])),
            Command::Invocation(Invocation::program("c", &[])),
        ]
    );
}

#[test]
fn every_builtin_name_is_recognized() {
    for builtin in Builtin::ALL {
        let scope = parse(builtin.name());
        assert_eq!(
            *only(&scope),
            Command::Invocation(Invocation::builtin(builtin, &[])),
        );
    }
}

#[test]
fn long_pipelines_keep_every_stage() {
    let scope = parse("a | b | c | d | e");
    let Command::Pipe(pipe) = only(&scope) else {
        panic!("expected a pipe");
    };
    assert_eq!(pipe_width(&pipe.left) + pipe_width(&pipe.right), 5);
}

#[test]
fn operators_may_continue_on_next_line() {
    let scope = parse("a &&\nb ||\nc |\nd");
    assert!(matches!(only(&scope), Command::Or(_, _)));
}

#[test]
fn empty_if_arms_collapse_to_none() {
    let scope = parse("if a then else end");
    let Command::If(closure) = only(&scope) else {
        panic!("expected if");
    };
    assert!(closure.direct.is_none());
    assert!(closure.reverse.is_none());
}

#[test]
fn if_joins_and_or_chains() {
    let scope = parse("if a then b end && c");
    let Command::And(left, _) = only(&scope) else {
        panic!("expected and");
    };
    assert!(matches!(**left, Command::If(_)));
}

#[test]
fn detached_pipeline() {
    let scope = parse("a | b &");
    let Command::Detach(inner) = only(&scope) else {
        panic!("expected detach");
    };
    assert!(matches!(**inner, Command::Pipe(_)));
}

#[test]
fn ampersand_separates_commands() {
    let scope = parse("sleep 0 & true");
    assert_eq!(scope.commands.len(), 2);
    assert!(matches!(scope.commands[0], Command::Detach(_)));
    assert_eq!(
        scope.commands[1],
        Command::Invocation(Invocation::program("true", &[]))
    );

    let scope = parse("a && b & c & d");
    assert_eq!(scope.commands.len(), 3);
    let Command::Detach(first) = &scope.commands[0] else {
        panic!("expected detach");
    };
    assert!(matches!(**first, Command::And(_, _)));
    assert!(matches!(scope.commands[1], Command::Detach(_)));
    assert!(matches!(scope.commands[2], Command::Invocation(_)));

    let scope = parse("if true then a & b end");
    let Command::If(closure) = only(&scope) else {
        panic!("expected if");
    };
    let direct = closure.direct.as_ref().expect("direct arm");
    assert_eq!(direct.commands.len(), 2);
}

#[test]
fn quoted_keywords_are_words() {
    let scope = parse("echo 'if' \"end\"");
    assert_eq!(
        *only(&scope),
        Command::Invocation(Invocation::program("echo", &["if", "end"]))
    );
}

#[test]
fn substitution_in_redirect_target() {
    let scope = parse("cat > $(mktemp)");
    let Command::Invocation(invocation) = only(&scope) else {
        panic!("expected invocation");
    };
    let [Redirect::OutputReplace(Word::Substitution(inner))] = invocation.redirects.as_slice()
    else {
        panic!("expected one substitution redirect: {:?}", invocation.redirects);
    };
    assert_eq!(
        *only(inner),
        Command::Invocation(Invocation::program("mktemp", &[]))
    );
}

#[test]
fn nested_substitutions() {
    let scope = parse("echo $(basename $(pwd))");
    let Command::Invocation(invocation) = only(&scope) else {
        panic!("expected invocation");
    };
    let Word::Substitution(outer) = &invocation.arguments[0] else {
        panic!("expected substitution");
    };
    let Command::Invocation(inner) = only(outer) else {
        panic!("expected inner invocation");
    };
    assert_eq!(inner.target, Target::Program(Word::literal("basename")));
    assert!(matches!(inner.arguments[0], Word::Substitution(_)));
}

// ===========================================================================
// Errors
// ===========================================================================

#[test]
fn incomplete_inputs() {
    for input in ["if a", "if a then b else", "echo $(pwd", "a ||", "echo 'x"] {
        let err = parse_line(input).expect_err(input);
        assert!(err.is_incomplete(), "{input:?}: {err:?}");
    }
}

#[test]
fn malformed_inputs() {
    for input in ["| a", "a && && b", "then", "a > ;", "echo )"] {
        let err = parse_line(input).expect_err(input);
        assert!(!err.is_incomplete(), "{input:?}: {err:?}");
    }
}

#[test]
fn lexer_errors_surface_through_parser() {
    let err = parse_line("echo \"open").expect_err("should fail");
    assert!(matches!(err.kind, ParseErrorKind::Lex(_)));
}
