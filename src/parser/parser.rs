//! Recursive-descent parser producing the typed syntax tree.

use crate::lexer::{self, Token, TokenKind};
use crate::parser::ast::{
    Builtin, Command, IfClosure, Invocation, Pipe, PipeStage, Redirect, Scope, Target, Word,
};
use crate::parser::error::ParseError;

/// Parser behavior options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ParseOptions {
    /// Maximum nesting of `if` clauses and command substitutions.
    pub max_nesting: usize,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self { max_nesting: 64 }
    }
}

/// Where a scope stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stop {
    EndOfInput,
    RParen,
    Keywords(&'static [&'static str]),
}

const KEYWORDS: [&str; 4] = ["if", "then", "else", "end"];

/// Parses one input line (possibly multi-line) into a top-level scope.
pub fn parse_line(input: &str) -> Result<Scope, ParseError> {
    Parser::new(input, ParseOptions::default())?.parse()
}

/// Token-vector parser.
pub struct Parser {
    tokens: Vec<Token>,
    position: usize,
    depth: usize,
    options: ParseOptions,
}

impl Parser {
    /// Tokenizes `input` and prepares a parser over it.
    pub fn new(input: &str, options: ParseOptions) -> Result<Self, ParseError> {
        Ok(Self::from_tokens(lexer::tokenize(input)?, options))
    }

    /// Creates a parser over already scanned tokens.
    pub fn from_tokens(tokens: Vec<Token>, options: ParseOptions) -> Self {
        Self {
            tokens,
            position: 0,
            depth: 0,
            options,
        }
    }

    /// Parses the whole token stream as one top-level scope.
    pub fn parse(mut self) -> Result<Scope, ParseError> {
        self.parse_scope(Stop::EndOfInput)
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn bump(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.position).cloned();
        if token.is_some() {
            self.position += 1;
        }
        token
    }

    fn at_stop(&self, stop: Stop) -> bool {
        match (self.peek(), stop) {
            (None, _) => true,
            (Some(token), Stop::RParen) => token.kind == TokenKind::RParen,
            (Some(token), Stop::Keywords(words)) => {
                words.iter().any(|word| token.is_keyword(word))
            }
            (Some(_), Stop::EndOfInput) => false,
        }
    }

    fn stop_labels(stop: Stop) -> Vec<String> {
        match stop {
            Stop::EndOfInput => vec!["end of input".to_string()],
            Stop::RParen => vec!["')'".to_string()],
            Stop::Keywords(words) => words.iter().map(|word| format!("'{word}'")).collect(),
        }
    }

    fn skip_line_separators(&mut self) {
        while matches!(
            self.peek().map(|token| token.kind),
            Some(TokenKind::Semi | TokenKind::Newline)
        ) {
            self.position += 1;
        }
    }

    fn skip_newlines(&mut self) {
        while self.peek().map(|token| token.kind) == Some(TokenKind::Newline) {
            self.position += 1;
        }
    }

    fn enter(&mut self, token: &Token) -> Result<(), ParseError> {
        self.depth += 1;
        if self.depth > self.options.max_nesting {
            return Err(ParseError::nesting_too_deep(token.span));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    fn parse_scope(&mut self, stop: Stop) -> Result<Scope, ParseError> {
        let mut commands = Vec::new();
        loop {
            self.skip_line_separators();
            if self.at_stop(stop) {
                if self.peek().is_none() && stop != Stop::EndOfInput {
                    return Err(ParseError::unexpected_end_of_input(Self::stop_labels(stop)));
                }
                return Ok(Scope::new(commands));
            }

            let command = self.parse_and_or(stop)?;
            if self.peek().map(|token| token.kind) == Some(TokenKind::Amp) {
                // `&` separates as well as detaches.
                self.position += 1;
                commands.push(Command::Detach(Box::new(command)));
                continue;
            }
            commands.push(command);

            match self.peek() {
                None => {}
                Some(token) if token.kind.is_separator() => {}
                Some(_) if self.at_stop(stop) => {}
                Some(token) => {
                    let mut expected = vec!["';'".to_string(), "newline".to_string()];
                    expected.extend(Self::stop_labels(stop));
                    return Err(ParseError::unexpected_token(token, expected));
                }
            }
        }
    }

    fn parse_and_or(&mut self, stop: Stop) -> Result<Command, ParseError> {
        let mut left = self.parse_pipeline(stop)?;
        loop {
            let kind = self.peek().map(|token| token.kind);
            match kind {
                Some(TokenKind::AndIf) => {
                    self.position += 1;
                    self.skip_newlines();
                    let right = self.parse_pipeline(stop)?;
                    left = Command::And(Box::new(left), Box::new(right));
                }
                Some(TokenKind::OrIf) => {
                    self.position += 1;
                    self.skip_newlines();
                    let right = self.parse_pipeline(stop)?;
                    left = Command::Or(Box::new(left), Box::new(right));
                }
                _ => return Ok(left),
            }
        }
    }

    fn parse_pipeline(&mut self, stop: Stop) -> Result<Command, ParseError> {
        if self.peek().is_some_and(|token| token.is_keyword("if")) {
            let command = self.parse_if()?;
            if let Some(token) = self.peek().filter(|token| token.kind == TokenKind::Pipe) {
                return Err(ParseError::unexpected_token(token, ["'&&'", "'||'", "';'"]));
            }
            return Ok(command);
        }

        let first = self.parse_invocation(stop)?;
        if self.peek().map(|token| token.kind) != Some(TokenKind::Pipe) {
            return Ok(Command::Invocation(first));
        }
        Ok(Command::Pipe(self.parse_pipe_tail(first, stop)?))
    }

    /// Parses `| stage { | stage }` after `left`, nesting to the right.
    fn parse_pipe_tail(&mut self, left: Invocation, stop: Stop) -> Result<Pipe, ParseError> {
        self.position += 1;
        self.skip_newlines();
        if let Some(token) = self.peek().filter(|token| token.is_keyword("if")) {
            return Err(ParseError::unexpected_token(token, ["command"]));
        }
        let next = self.parse_invocation(stop)?;
        let right = if self.peek().map(|token| token.kind) == Some(TokenKind::Pipe) {
            PipeStage::Pipe(self.parse_pipe_tail(next, stop)?)
        } else {
            PipeStage::Invocation(next)
        };
        Ok(Pipe::new(PipeStage::Invocation(left), right))
    }

    fn parse_if(&mut self) -> Result<Command, ParseError> {
        let Some(if_token) = self.bump() else {
            return Err(ParseError::unexpected_end_of_input(["'if'"]));
        };
        self.enter(&if_token)?;

        let condition = self.parse_scope(Stop::Keywords(&["then"]))?;
        self.expect_keyword("then")?;
        let direct = self.parse_scope(Stop::Keywords(&["else", "end"]))?;

        let reverse = if self.peek().is_some_and(|token| token.is_keyword("else")) {
            self.position += 1;
            let reverse = self.parse_scope(Stop::Keywords(&["end"]))?;
            Some(reverse)
        } else {
            None
        };
        self.expect_keyword("end")?;
        self.leave();

        Ok(Command::If(Box::new(IfClosure {
            condition,
            direct: (!direct.is_empty()).then_some(direct),
            reverse: reverse.filter(|scope| !scope.is_empty()),
        })))
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<(), ParseError> {
        match self.peek() {
            Some(token) if token.is_keyword(keyword) => {
                self.position += 1;
                Ok(())
            }
            Some(token) => Err(ParseError::unexpected_token(token, [format!("'{keyword}'")])),
            None => Err(ParseError::unexpected_end_of_input([format!("'{keyword}'")])),
        }
    }

    fn parse_invocation(&mut self, stop: Stop) -> Result<Invocation, ParseError> {
        let target = match self.peek() {
            Some(token)
                if token.kind == TokenKind::Word
                    && !token.quoted
                    && KEYWORDS.contains(&token.lexeme.as_str()) =>
            {
                return Err(ParseError::unexpected_token(token, ["command"]));
            }
            Some(token) if token.kind == TokenKind::Word && !token.quoted => {
                match Builtin::from_name(&token.lexeme) {
                    Some(builtin) => {
                        self.position += 1;
                        Target::Builtin(builtin)
                    }
                    None => Target::Program(self.parse_word()?),
                }
            }
            Some(token) if matches!(token.kind, TokenKind::Word | TokenKind::SubstOpen) => {
                Target::Program(self.parse_word()?)
            }
            Some(token) => return Err(ParseError::unexpected_token(token, ["command"])),
            None => return Err(ParseError::unexpected_end_of_input(["command"])),
        };

        let mut invocation = Invocation {
            target,
            arguments: Vec::new(),
            redirects: Vec::new(),
        };

        loop {
            let Some(token) = self.peek() else {
                break;
            };
            match token.kind {
                TokenKind::Word if self.at_stop(stop) => break,
                TokenKind::Word | TokenKind::SubstOpen => {
                    let word = self.parse_word()?;
                    invocation.arguments.push(word);
                }
                TokenKind::Less => {
                    self.position += 1;
                    invocation.redirects.push(Redirect::Input(self.parse_word()?));
                }
                TokenKind::Great => {
                    self.position += 1;
                    invocation
                        .redirects
                        .push(Redirect::OutputReplace(self.parse_word()?));
                }
                TokenKind::DGreat => {
                    self.position += 1;
                    invocation
                        .redirects
                        .push(Redirect::OutputAppend(self.parse_word()?));
                }
                _ => break,
            }
        }

        Ok(invocation)
    }

    fn parse_word(&mut self) -> Result<Word, ParseError> {
        let Some(token) = self.bump() else {
            return Err(ParseError::unexpected_end_of_input(["word"]));
        };
        match token.kind {
            TokenKind::Word => Ok(Word::Literal(token.lexeme)),
            TokenKind::SubstOpen => {
                self.enter(&token)?;
                let scope = self.parse_scope(Stop::RParen)?;
                match self.bump() {
                    Some(close) if close.kind == TokenKind::RParen => {}
                    Some(other) => return Err(ParseError::unexpected_token(&other, ["')'"])),
                    None => return Err(ParseError::unexpected_end_of_input(["')'"])),
                }
                self.leave();
                Ok(Word::Substitution(scope))
            }
            _ => Err(ParseError::unexpected_token(&token, ["word"])),
        }
    }
}
