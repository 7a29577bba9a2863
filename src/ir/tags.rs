//! Tag allocation and once-tag interning.

use std::collections::HashMap;

use crate::ir::error::IrError;
use crate::ir::ids::Tag;

/// What a tag will resolve to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagKind {
    /// A code location (chain step or local label).
    Code,
    /// An interned, NUL-terminated string literal in the data section.
    Literal(String),
    /// A host-provided function, resolved through the symbol name table.
    Symbol(String),
}

/// Label table for one compilation.
///
/// Plain tags are fresh on every request. Once-tags are keyed by a string:
/// the same symbol name, or byte-equal literal content, always yields the
/// same tag within one table.
#[derive(Debug, Clone)]
pub struct TagTable {
    kinds: Vec<TagKind>,
    literals: HashMap<String, Tag>,
    symbols: HashMap<String, Tag>,
    limit: usize,
}

impl TagTable {
    /// Creates an empty table accepting at most `limit` tags.
    pub fn new(limit: usize) -> Self {
        Self {
            kinds: Vec::new(),
            literals: HashMap::new(),
            symbols: HashMap::new(),
            limit,
        }
    }

    fn push(&mut self, kind: TagKind) -> Result<Tag, IrError> {
        if self.kinds.len() >= self.limit {
            return Err(IrError::limit_exceeded(
                "tag table is full",
                format!("limit {}", self.limit),
            ));
        }
        let tag = Tag::new(self.kinds.len() as u32);
        self.kinds.push(kind);
        Ok(tag)
    }

    /// Allocates a fresh code tag.
    pub fn fresh(&mut self) -> Result<Tag, IrError> {
        self.push(TagKind::Code)
    }

    /// Returns the once-tag for a string literal.
    ///
    /// Literals are emitted NUL-terminated, so text containing NUL is rejected.
    pub fn literal(&mut self, text: &str) -> Result<Tag, IrError> {
        if let Some(tag) = self.literals.get(text) {
            return Ok(*tag);
        }
        if text.contains('\0') {
            return Err(IrError::invalid_literal(
                "word contains a NUL byte",
                format!("{text:?}"),
            ));
        }
        let tag = self.push(TagKind::Literal(text.to_string()))?;
        self.literals.insert(text.to_string(), tag);
        Ok(tag)
    }

    /// Returns the once-tag for an external symbol.
    pub fn symbol(&mut self, name: &str) -> Result<Tag, IrError> {
        if let Some(tag) = self.symbols.get(name) {
            return Ok(*tag);
        }
        let tag = self.push(TagKind::Symbol(name.to_string()))?;
        self.symbols.insert(name.to_string(), tag);
        Ok(tag)
    }

    /// Returns the kind of an allocated tag.
    pub fn kind(&self, tag: Tag) -> Option<&TagKind> {
        self.kinds.get(tag.index())
    }

    /// Returns the literal text behind a literal tag.
    pub fn literal_text(&self, tag: Tag) -> Option<&str> {
        match self.kind(tag) {
            Some(TagKind::Literal(text)) => Some(text),
            _ => None,
        }
    }

    /// Iterates literal tags in allocation order.
    pub fn literals(&self) -> impl Iterator<Item = (Tag, &str)> + '_ {
        self.kinds
            .iter()
            .enumerate()
            .filter_map(|(index, kind)| match kind {
                TagKind::Literal(text) => Some((Tag::new(index as u32), text.as_str())),
                _ => None,
            })
    }

    /// Iterates symbol tags in allocation order.
    pub fn symbols(&self) -> impl Iterator<Item = (Tag, &str)> + '_ {
        self.kinds
            .iter()
            .enumerate()
            .filter_map(|(index, kind)| match kind {
                TagKind::Symbol(name) => Some((Tag::new(index as u32), name.as_str())),
                _ => None,
            })
    }

    /// Returns the number of allocated tags.
    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    /// Returns `true` when no tag was allocated.
    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }
}
