//! Tokenization of whole command lines.

use jish::lexer::{tokenize, LexErrorKind, TokenKind};

fn kinds(input: &str) -> Vec<TokenKind> {
    tokenize(input)
        .expect("tokenize should succeed")
        .into_iter()
        .map(|token| token.kind)
        .collect()
}

#[test]
fn operators_are_maximal_munch() {
    assert_eq!(
        kinds("a && b || c | d & e ; f >> g > h < i"),
        vec![
            TokenKind::Word,
            TokenKind::AndIf,
            TokenKind::Word,
            TokenKind::OrIf,
            TokenKind::Word,
            TokenKind::Pipe,
            TokenKind::Word,
            TokenKind::Amp,
            TokenKind::Word,
            TokenKind::Semi,
            TokenKind::Word,
            TokenKind::DGreat,
            TokenKind::Word,
            TokenKind::Great,
            TokenKind::Word,
            TokenKind::Less,
            TokenKind::Word,
        ]
    );
}

#[test]
fn substitution_brackets_split_words() {
    assert_eq!(
        kinds("echo $(pwd)x"),
        vec![
            TokenKind::Word,
            TokenKind::SubstOpen,
            TokenKind::Word,
            TokenKind::RParen,
            TokenKind::Word,
        ]
    );
}

#[test]
fn quotes_are_removed_and_marked() {
    let tokens = tokenize(r#"'a b' "c \"d\"" e\ f plain"#).expect("tokenize");
    let words: Vec<_> = tokens.iter().map(|t| (t.lexeme.as_str(), t.quoted)).collect();
    assert_eq!(
        words,
        vec![("a b", true), ("c \"d\"", true), ("e f", true), ("plain", false)]
    );
}

#[test]
fn quoted_operators_stay_words() {
    let tokens = tokenize("echo '&&' \"|\"").expect("tokenize");
    assert!(tokens.iter().all(|token| token.kind == TokenKind::Word));
    assert_eq!(tokens[1].lexeme, "&&");
}

#[test]
fn comments_run_to_end_of_line() {
    assert_eq!(
        kinds("ls # not | an operator\npwd"),
        vec![TokenKind::Word, TokenKind::Newline, TokenKind::Word]
    );
    let tokens = tokenize("a#b").expect("tokenize");
    assert_eq!(tokens[0].lexeme, "a#b");
}

#[test]
fn spans_cover_source_bytes() {
    let input = "cat  file";
    let tokens = tokenize(input).expect("tokenize");
    let second = &tokens[1];
    let range = second.span.start.as_usize()..second.span.end.as_usize();
    assert_eq!(&input[range], "file");
}

#[test]
fn unterminated_quotes_and_trailing_backslash_fail() {
    let cases = [
        ("echo 'open", LexErrorKind::UnterminatedSingleQuote),
        ("echo \"open", LexErrorKind::UnterminatedDoubleQuote),
        ("echo \\", LexErrorKind::TrailingBackslash),
    ];
    for (input, expected) in cases {
        let err = tokenize(input).expect_err(input);
        assert_eq!(err.kind, expected, "{input}");
    }
}
