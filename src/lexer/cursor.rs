//! Byte cursor used by the scanner.

use crate::lexer::span::Span;

/// Byte-position cursor over input text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Cursor<'a> {
    input: &'a str,
    offset: usize,
}

impl<'a> Cursor<'a> {
    /// Creates a cursor at byte offset `0`.
    pub(crate) fn new(input: &'a str) -> Self {
        Self { input, offset: 0 }
    }

    /// Returns a span from `start` to the current position.
    pub(crate) fn span_from(&self, start: usize) -> Span {
        Span::from_range(start, self.offset)
    }

    /// Returns the raw position.
    pub(crate) fn position(&self) -> usize {
        self.offset
    }

    /// Returns the current byte.
    pub(crate) fn peek(&self) -> Option<u8> {
        self.input.as_bytes().get(self.offset).copied()
    }

    /// Returns the byte after the current one.
    pub(crate) fn peek_next(&self) -> Option<u8> {
        self.input.as_bytes().get(self.offset + 1).copied()
    }

    /// Consumes and returns the current byte.
    pub(crate) fn bump(&mut self) -> Option<u8> {
        let byte = self.peek()?;
        self.offset += 1;
        Some(byte)
    }

    /// Advances the cursor by `count` bytes, clamped to input length.
    pub(crate) fn advance_by(&mut self, count: usize) {
        self.offset = self.offset.saturating_add(count).min(self.input.len());
    }
}
