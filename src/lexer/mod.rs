//! Command-line lexer.
//!
//! Splits one line of input into words and operators. Quote removal happens
//! here, so parser-visible words carry their final text plus a `quoted`
//! marker that keeps quoted keywords and builtin names literal.

pub mod error;
pub mod span;
pub mod token;

mod cursor;

use crate::lexer::cursor::Cursor;

pub use error::{LexError, LexErrorKind};
pub use span::{ByteOffset, Span};
pub use token::{Token, TokenKind};

/// Tokenizes a whole input string.
pub fn tokenize(input: &str) -> Result<Vec<Token>, LexError> {
    Lexer::new(input).collect()
}

/// Streaming lexer over one input string.
pub struct Lexer<'a> {
    cursor: Cursor<'a>,
    failed: bool,
}

impl<'a> Lexer<'a> {
    /// Creates a lexer for the provided input.
    pub fn new(input: &'a str) -> Self {
        Self {
            cursor: Cursor::new(input),
            failed: false,
        }
    }

    /// Scans the next token, or `None` at end of input.
    pub fn next_token(&mut self) -> Result<Option<Token>, LexError> {
        self.skip_blanks_and_comments();

        let start = self.cursor.position();
        let Some(byte) = self.cursor.peek() else {
            return Ok(None);
        };

        let operator = match (byte, self.cursor.peek_next()) {
            (b'&', Some(b'&')) => Some((TokenKind::AndIf, "&&")),
            (b'|', Some(b'|')) => Some((TokenKind::OrIf, "||")),
            (b'>', Some(b'>')) => Some((TokenKind::DGreat, ">>")),
            (b'$', Some(b'(')) => Some((TokenKind::SubstOpen, "$(")),
            (b'&', _) => Some((TokenKind::Amp, "&")),
            (b'|', _) => Some((TokenKind::Pipe, "|")),
            (b';', _) => Some((TokenKind::Semi, ";")),
            (b'\n', _) => Some((TokenKind::Newline, "\n")),
            (b'<', _) => Some((TokenKind::Less, "<")),
            (b'>', _) => Some((TokenKind::Great, ">")),
            (b')', _) => Some((TokenKind::RParen, ")")),
            _ => None,
        };

        if let Some((kind, text)) = operator {
            self.cursor.advance_by(text.len());
            return Ok(Some(Token::operator(
                kind,
                text,
                self.cursor.span_from(start),
            )));
        }

        self.scan_word(start).map(Some)
    }

    fn skip_blanks_and_comments(&mut self) {
        while let Some(byte) = self.cursor.peek() {
            match byte {
                b' ' | b'\t' | b'\r' => self.cursor.advance_by(1),
                b'\\' if self.cursor.peek_next() == Some(b'\n') => self.cursor.advance_by(2),
                b'#' => {
                    while let Some(next) = self.cursor.peek() {
                        if next == b'\n' {
                            break;
                        }
                        self.cursor.advance_by(1);
                    }
                }
                _ => break,
            }
        }
    }

    fn scan_word(&mut self, start: usize) -> Result<Token, LexError> {
        let mut text = Vec::new();
        let mut quoted = false;

        while let Some(byte) = self.cursor.peek() {
            match byte {
                b' ' | b'\t' | b'\r' | b'\n' | b'|' | b'&' | b';' | b'<' | b'>' | b')' => break,
                b'$' if self.cursor.peek_next() == Some(b'(') => break,
                b'\'' => {
                    quoted = true;
                    self.scan_single_quoted(&mut text)?;
                }
                b'"' => {
                    quoted = true;
                    self.scan_double_quoted(&mut text)?;
                }
                b'\\' => {
                    let escape_start = self.cursor.position();
                    self.cursor.advance_by(1);
                    match self.cursor.bump() {
                        Some(b'\n') => {}
                        Some(escaped) => {
                            quoted = true;
                            text.push(escaped);
                        }
                        None => {
                            return Err(LexError::new(
                                LexErrorKind::TrailingBackslash,
                                self.cursor.span_from(escape_start),
                            ));
                        }
                    }
                }
                other => {
                    text.push(other);
                    self.cursor.advance_by(1);
                }
            }
        }

        let lexeme = String::from_utf8_lossy(&text).into_owned();
        Ok(Token::word(lexeme, quoted, self.cursor.span_from(start)))
    }

    fn scan_single_quoted(&mut self, text: &mut Vec<u8>) -> Result<(), LexError> {
        let open = self.cursor.position();
        self.cursor.advance_by(1);
        loop {
            match self.cursor.bump() {
                Some(b'\'') => return Ok(()),
                Some(byte) => text.push(byte),
                None => {
                    return Err(LexError::new(
                        LexErrorKind::UnterminatedSingleQuote,
                        self.cursor.span_from(open),
                    ));
                }
            }
        }
    }

    fn scan_double_quoted(&mut self, text: &mut Vec<u8>) -> Result<(), LexError> {
        let open = self.cursor.position();
        self.cursor.advance_by(1);
        loop {
            match self.cursor.bump() {
                Some(b'"') => return Ok(()),
                Some(b'\\') => match self.cursor.peek() {
                    Some(escaped @ (b'"' | b'\\' | b'$')) => {
                        text.push(escaped);
                        self.cursor.advance_by(1);
                    }
                    Some(b'\n') => self.cursor.advance_by(1),
                    _ => text.push(b'\\'),
                },
                Some(byte) => text.push(byte),
                None => {
                    return Err(LexError::new(
                        LexErrorKind::UnterminatedDoubleQuote,
                        self.cursor.span_from(open),
                    ));
                }
            }
        }
    }
}

impl Iterator for Lexer<'_> {
    type Item = Result<Token, LexError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.next_token() {
            Ok(token) => token.map(Ok),
            Err(error) => {
                self.failed = true;
                Some(Err(error))
            }
        }
    }
}
