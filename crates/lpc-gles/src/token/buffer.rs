//! Struct-of-arrays token storage.
//!
//! Token fields live in parallel primitive vectors and all token text lives in a
//! single character arena. The arena starts out as a copy of the source, so the
//! initial text range of every token equals its source span. Replacing a token's
//! text appends the new text to the arena and repoints the token; the original
//! source span is kept for diagnostics.

use alloc::{collections::BTreeMap, string::String, vec::Vec};
use core::ops::Range;

use super::{parse_float_literal, parse_int_literal, LiteralValue, Token, TokenKind};

const MIN_GROWTH: usize = 64;

/// Token stream storage.
#[derive(Debug, Clone)]
pub struct TokenBuffer {
    kinds: Vec<TokenKind>,
    span_starts: Vec<u32>,
    span_lens: Vec<u32>,
    text_starts: Vec<u32>,
    text_lens: Vec<u32>,
    lines: Vec<u32>,
    columns: Vec<u32>,
    arena: String,
    /// Text rendered immediately before the token at the key index
    insertions: BTreeMap<usize, String>,
}

impl TokenBuffer {
    /// Create a buffer whose arena holds `source`.
    pub fn with_source(source: &str) -> Self {
        // Rough estimate: one token per four bytes.
        let estimate = (source.len() / 4).max(MIN_GROWTH);
        let mut arena = String::with_capacity(source.len() + source.len() / 2);
        arena.push_str(source);
        Self {
            kinds: Vec::with_capacity(estimate),
            span_starts: Vec::with_capacity(estimate),
            span_lens: Vec::with_capacity(estimate),
            text_starts: Vec::with_capacity(estimate),
            text_lens: Vec::with_capacity(estimate),
            lines: Vec::with_capacity(estimate),
            columns: Vec::with_capacity(estimate),
            arena,
            insertions: BTreeMap::new(),
        }
    }

    fn grow(&mut self) {
        let additional = self.kinds.capacity().max(MIN_GROWTH);
        self.kinds.reserve(additional);
        self.span_starts.reserve(additional);
        self.span_lens.reserve(additional);
        self.text_starts.reserve(additional);
        self.text_lens.reserve(additional);
        self.lines.reserve(additional);
        self.columns.reserve(additional);
    }

    /// Append a token covering `start..end` of the source.
    pub fn push(&mut self, kind: TokenKind, start: usize, end: usize, line: u32, column: u32) {
        if self.kinds.len() == self.kinds.capacity() {
            self.grow();
        }
        let start = start as u32;
        let len = (end - start as usize) as u32;
        self.kinds.push(kind);
        self.span_starts.push(start);
        self.span_lens.push(len);
        self.text_starts.push(start);
        self.text_lens.push(len);
        self.lines.push(line);
        self.columns.push(column);
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.kinds.capacity()
    }

    pub fn kind(&self, index: usize) -> TokenKind {
        self.kinds[index]
    }

    /// Current text of a token (reflects replacements).
    pub fn text(&self, index: usize) -> &str {
        let start = self.text_starts[index] as usize;
        let len = self.text_lens[index] as usize;
        &self.arena[start..start + len]
    }

    /// Byte span of the token in the original source.
    pub fn span(&self, index: usize) -> Range<usize> {
        let start = self.span_starts[index] as usize;
        start..start + self.span_lens[index] as usize
    }

    pub fn line(&self, index: usize) -> u32 {
        self.lines[index]
    }

    pub fn column(&self, index: usize) -> u32 {
        self.columns[index]
    }

    /// Snapshot of one token.
    pub fn get(&self, index: usize) -> Token {
        Token {
            kind: self.kinds[index],
            start: self.span_starts[index],
            len: self.span_lens[index],
            line: self.lines[index],
            column: self.columns[index],
        }
    }

    /// Zero-copy view of one token.
    pub fn token_ref(&self, index: usize) -> TokenRef<'_> {
        TokenRef {
            buffer: self,
            index,
        }
    }

    /// Iterate views over all tokens.
    pub fn iter(&self) -> impl Iterator<Item = TokenRef<'_>> {
        (0..self.len()).map(move |index| self.token_ref(index))
    }

    /// Check whether a token is significant (non-trivia and not removed).
    pub fn is_significant(&self, index: usize) -> bool {
        !self.kinds[index].is_trivia()
    }

    /// Check whether the token's current text equals `text`.
    pub fn is(&self, index: usize, text: &str) -> bool {
        index < self.len() && self.text(index) == text
    }

    /// Replace the text of a token, copying the new text into the arena.
    pub fn replace(&mut self, index: usize, text: &str) {
        if self.text(index) == text {
            return;
        }
        let start = self.arena.len();
        self.arena.push_str(text);
        self.text_starts[index] = start as u32;
        self.text_lens[index] = text.len() as u32;
    }

    /// Replace the text and reclassify a token.
    pub fn replace_with_kind(&mut self, index: usize, kind: TokenKind, text: &str) {
        self.replace(index, text);
        self.kinds[index] = kind;
    }

    /// Remove a token: it renders as nothing and becomes trivia.
    pub fn remove(&mut self, index: usize) {
        self.text_lens[index] = 0;
        self.kinds[index] = TokenKind::Whitespace;
    }

    /// Remove every token in `range`.
    pub fn remove_range(&mut self, range: Range<usize>) {
        for index in range {
            self.remove(index);
        }
    }

    /// Check whether a token was removed by a rewrite.
    pub fn is_removed(&self, index: usize) -> bool {
        self.text_lens[index] == 0 && self.span_lens[index] != 0
    }

    /// Insert text that renders right before the token at `index`.
    ///
    /// Repeated insertions at the same index render in insertion order.
    pub fn insert_before(&mut self, index: usize, text: &str) {
        self.insertions
            .entry(index)
            .or_insert_with(String::new)
            .push_str(text);
    }

    /// Insert text that renders before the token at `index` and ahead of
    /// anything already inserted there.
    pub fn insert_front(&mut self, index: usize, text: &str) {
        self.insertions
            .entry(index)
            .or_insert_with(String::new)
            .insert_str(0, text);
    }

    /// Insert text that renders right after the token at `index`.
    pub fn insert_after(&mut self, index: usize, text: &str) {
        self.insert_before(index + 1, text);
    }

    /// Render the whole stream back to text.
    pub fn render(&self) -> String {
        self.render_range(0..self.len())
    }

    /// Render a token range, including insertions that precede each token.
    pub fn render_range(&self, range: Range<usize>) -> String {
        let mut out = String::with_capacity(self.arena.len());
        let end = range.end;
        for index in range {
            if let Some(inserted) = self.insertions.get(&index) {
                out.push_str(inserted);
            }
            out.push_str(self.text(index));
        }
        if end >= self.len() {
            // Text inserted past the last token.
            for (_, inserted) in self.insertions.range(self.len().max(end)..) {
                out.push_str(inserted);
            }
        }
        out
    }

    /// Render a range and clear any insertions it contained, so that the
    /// result can be placed into a single token without duplicating text.
    pub fn take_range_text(&mut self, range: Range<usize>) -> String {
        let text = self.render_range(range.clone());
        let keys: Vec<usize> = self.insertions.range(range).map(|(k, _)| *k).collect();
        for key in keys {
            self.insertions.remove(&key);
        }
        text
    }

    /// Decode the value of a literal token on demand.
    pub fn literal_value(&self, index: usize) -> Option<LiteralValue> {
        let text = self.text(index);
        match self.kinds[index] {
            TokenKind::IntLiteral => parse_int_literal(text).map(|v| LiteralValue::Int(v as i64)),
            TokenKind::UintLiteral => parse_int_literal(text).map(LiteralValue::Uint),
            TokenKind::FloatLiteral | TokenKind::DoubleLiteral => {
                parse_float_literal(text).map(LiteralValue::Float)
            }
            TokenKind::BoolLiteral => Some(LiteralValue::Bool(text == "true")),
            _ => None,
        }
    }

    /// Index of the last token whose line is `line`, if any.
    pub fn last_on_line(&self, line: u32) -> Option<usize> {
        let end = self.lines.partition_point(|&l| l <= line);
        if end == 0 || self.lines[end - 1] != line {
            None
        } else {
            Some(end - 1)
        }
    }
}

/// Zero-copy view of a single token in a [`TokenBuffer`].
#[derive(Debug, Clone, Copy)]
pub struct TokenRef<'a> {
    buffer: &'a TokenBuffer,
    index: usize,
}

impl<'a> TokenRef<'a> {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn kind(&self) -> TokenKind {
        self.buffer.kind(self.index)
    }

    /// Text borrowed straight out of the arena.
    pub fn text(&self) -> &'a str {
        self.buffer.text(self.index)
    }

    pub fn line(&self) -> u32 {
        self.buffer.line(self.index)
    }

    pub fn column(&self) -> u32 {
        self.buffer.column(self.index)
    }

    pub fn span(&self) -> Range<usize> {
        self.buffer.span(self.index)
    }

    pub fn literal_value(&self) -> Option<LiteralValue> {
        self.buffer.literal_value(self.index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> TokenBuffer {
        // "a = b;"
        let mut buf = TokenBuffer::with_source("a = b;");
        buf.push(TokenKind::Identifier, 0, 1, 1, 1);
        buf.push(TokenKind::Whitespace, 1, 2, 1, 2);
        buf.push(TokenKind::Operator, 2, 3, 1, 3);
        buf.push(TokenKind::Whitespace, 3, 4, 1, 4);
        buf.push(TokenKind::Identifier, 4, 5, 1, 5);
        buf.push(TokenKind::Punctuation, 5, 6, 1, 6);
        buf.push(TokenKind::EndOfInput, 6, 6, 1, 7);
        buf
    }

    #[test]
    fn test_render_roundtrip() {
        let buf = sample();
        assert_eq!(buf.render(), "a = b;");
        assert_eq!(buf.text(4), "b");
        assert_eq!(buf.span(4), 4..5);
    }

    #[test]
    fn test_replace_keeps_span() {
        let mut buf = sample();
        buf.replace(4, "texture2D");
        assert_eq!(buf.text(4), "texture2D");
        assert_eq!(buf.span(4), 4..5);
        assert_eq!(buf.render(), "a = texture2D;");
    }

    #[test]
    fn test_remove_and_insert() {
        let mut buf = sample();
        buf.remove(0);
        buf.insert_before(0, "gl_FragColor");
        assert!(buf.is_removed(0));
        assert!(!buf.is_significant(0));
        assert_eq!(buf.render(), "gl_FragColor = b;");
    }

    #[test]
    fn test_insert_front_precedes_earlier_insertions() {
        let mut buf = sample();
        buf.insert_before(0, "uniform ");
        buf.insert_front(0, "precision mediump float;\n");
        assert_eq!(buf.render(), "precision mediump float;\nuniform a = b;");
    }

    #[test]
    fn test_insert_after_last() {
        let mut buf = sample();
        buf.insert_after(6, "\n// end");
        assert_eq!(buf.render(), "a = b;\n// end");
    }

    #[test]
    fn test_take_range_text_clears_insertions() {
        let mut buf = sample();
        buf.insert_before(4, "(");
        let text = buf.take_range_text(4..5);
        assert_eq!(text, "(b");
        assert_eq!(buf.render(), "a = b;");
    }

    #[test]
    fn test_growth() {
        let source = "x".repeat(1000);
        let mut buf = TokenBuffer::with_source(&source);
        for i in 0..1000 {
            buf.push(TokenKind::Identifier, i, i + 1, 1, i as u32 + 1);
        }
        assert_eq!(buf.len(), 1000);
        assert!(buf.capacity() >= 1000);
    }

    #[test]
    fn test_last_on_line() {
        let mut buf = TokenBuffer::with_source("a\nb c");
        buf.push(TokenKind::Identifier, 0, 1, 1, 1);
        buf.push(TokenKind::Whitespace, 1, 2, 1, 2);
        buf.push(TokenKind::Identifier, 2, 3, 2, 1);
        buf.push(TokenKind::Whitespace, 3, 4, 2, 2);
        buf.push(TokenKind::Identifier, 4, 5, 2, 3);
        assert_eq!(buf.last_on_line(1), Some(1));
        assert_eq!(buf.last_on_line(2), Some(4));
        assert_eq!(buf.last_on_line(3), None);
    }
}
