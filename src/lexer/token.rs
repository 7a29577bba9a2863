//! Token contracts for the lexer.

use crate::lexer::span::Span;

/// Token categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    /// A plain or quoted word.
    Word,
    /// `|`
    Pipe,
    /// `&&`
    AndIf,
    /// `||`
    OrIf,
    /// `&`
    Amp,
    /// `;`
    Semi,
    /// Line break.
    Newline,
    /// `<`
    Less,
    /// `>`
    Great,
    /// `>>`
    DGreat,
    /// `$(`
    SubstOpen,
    /// `)`
    RParen,
}

impl TokenKind {
    /// Returns a short label used in parser diagnostics.
    pub fn label(self) -> &'static str {
        match self {
            Self::Word => "word",
            Self::Pipe => "'|'",
            Self::AndIf => "'&&'",
            Self::OrIf => "'||'",
            Self::Amp => "'&'",
            Self::Semi => "';'",
            Self::Newline => "newline",
            Self::Less => "'<'",
            Self::Great => "'>'",
            Self::DGreat => "'>>'",
            Self::SubstOpen => "'$('",
            Self::RParen => "')'",
        }
    }

    /// Returns `true` for `;`, `&` and newline.
    pub fn is_separator(self) -> bool {
        matches!(self, Self::Semi | Self::Newline | Self::Amp)
    }
}

/// A lexical token with its text and source span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// Token category.
    pub kind: TokenKind,
    /// Word text after quote removal; operator text otherwise.
    pub lexeme: String,
    /// Whether any part of the word was quoted or escaped.
    pub quoted: bool,
    /// Byte-oriented source span.
    pub span: Span,
}

impl Token {
    /// Creates an operator token.
    pub fn operator(kind: TokenKind, lexeme: &str, span: Span) -> Self {
        Self {
            kind,
            lexeme: lexeme.to_string(),
            quoted: false,
            span,
        }
    }

    /// Creates a word token.
    pub fn word(lexeme: String, quoted: bool, span: Span) -> Self {
        Self {
            kind: TokenKind::Word,
            lexeme,
            quoted,
            span,
        }
    }

    /// Returns `true` when this token is the unquoted word `keyword`.
    pub fn is_keyword(&self, keyword: &str) -> bool {
        self.kind == TokenKind::Word && !self.quoted && self.lexeme == keyword
    }
}
