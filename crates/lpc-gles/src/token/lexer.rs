//! Character-level tokenizer.
//!
//! Scans one byte at a time so that a `/` opening a comment, a `/` inside a
//! string literal and a `/` used as division are told apart in a single pass.
//! Problems are recorded as diagnostics and an error token is emitted so the
//! position always advances.

use alloc::format;

use super::{builtin_tables, TokenBuffer, TokenKind};
use crate::error::{Diagnostics, Phase};

/// Operators, longest first so the scanner can take the first prefix match.
const OPERATORS: &[&str] = &[
    "<<=", ">>=", "++", "--", "<<", ">>", "<=", ">=", "==", "!=", "&&", "||", "^^", "+=", "-=",
    "*=", "/=", "%=", "&=", "|=", "^=", "+", "-", "*", "/", "%", "<", ">", "=", "!", "~", "&",
    "|", "^", "?", ":",
];

const PUNCTUATION: &[u8] = b"()[]{};,.";

/// Fatal tokenizer failure: the scan cannot produce a usable stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenizeError {
    /// The scanner stopped advancing
    NoProgress { offset: usize },
    /// The stream exceeded the configured token limit
    TooManyTokens { limit: usize },
}

impl core::fmt::Display for TokenizeError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            TokenizeError::NoProgress { offset } => {
                write!(f, "tokenizer made no progress at byte {}", offset)
            }
            TokenizeError::TooManyTokens { limit } => {
                write!(f, "token stream exceeds the limit of {} tokens", limit)
            }
        }
    }
}

/// Tokenizer state over one source text.
pub struct Tokenizer<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
    line: u32,
    column: u32,
    /// True while only whitespace has been seen since the last newline
    at_line_start: bool,
    max_tokens: usize,
    buffer: TokenBuffer,
    diagnostics: Diagnostics,
}

impl<'a> Tokenizer<'a> {
    /// Create a tokenizer with no token limit.
    pub fn new(src: &'a str) -> Self {
        Self::with_limit(src, usize::MAX)
    }

    /// Create a tokenizer that fails once more than `max_tokens` are produced.
    pub fn with_limit(src: &'a str, max_tokens: usize) -> Self {
        Self {
            src,
            bytes: src.as_bytes(),
            pos: 0,
            line: 1,
            column: 1,
            at_line_start: true,
            max_tokens,
            buffer: TokenBuffer::with_source(src),
            diagnostics: Diagnostics::new(),
        }
    }

    /// Scan the whole input.
    ///
    /// The returned buffer always ends with an [`TokenKind::EndOfInput`] token.
    pub fn tokenize(mut self) -> Result<(TokenBuffer, Diagnostics), TokenizeError> {
        while self.pos < self.bytes.len() {
            let before = self.pos;
            self.scan_token();
            if self.pos <= before {
                return Err(TokenizeError::NoProgress { offset: before });
            }
            if self.buffer.len() > self.max_tokens {
                return Err(TokenizeError::TooManyTokens {
                    limit: self.max_tokens,
                });
            }
        }
        let (line, column) = (self.line, self.column);
        self.buffer
            .push(TokenKind::EndOfInput, self.pos, self.pos, line, column);
        Ok((self.buffer, self.diagnostics))
    }

    fn peek(&self, offset: usize) -> u8 {
        self.bytes.get(self.pos + offset).copied().unwrap_or(0)
    }

    /// Advance over `count` bytes, maintaining line and column.
    fn advance(&mut self, count: usize) {
        for _ in 0..count {
            if self.pos >= self.bytes.len() {
                break;
            }
            let byte = self.bytes[self.pos];
            self.pos += 1;
            if byte == b'\n' {
                self.line += 1;
                self.column = 1;
            } else if byte & 0xC0 != 0x80 {
                // Count characters, not UTF-8 continuation bytes.
                self.column += 1;
            }
        }
    }

    fn emit(&mut self, kind: TokenKind, start: usize, line: u32, column: u32) {
        self.buffer.push(kind, start, self.pos, line, column);
    }

    fn scan_token(&mut self) {
        let start = self.pos;
        let (line, column) = (self.line, self.column);
        let c = self.peek(0);

        if c == b'#' && self.at_line_start {
            self.scan_directive();
            self.emit(TokenKind::Directive, start, line, column);
            self.at_line_start = false;
            return;
        }

        if is_space(c) || (c == b'\\' && self.is_line_continuation()) {
            self.scan_whitespace();
            self.emit(TokenKind::Whitespace, start, line, column);
            return;
        }

        self.at_line_start = false;

        if c == b'/' && self.peek(1) == b'/' {
            self.scan_line_comment();
            self.emit(TokenKind::LineComment, start, line, column);
        } else if c == b'/' && self.peek(1) == b'*' {
            if self.scan_block_comment() {
                self.emit(TokenKind::BlockComment, start, line, column);
            } else {
                self.diagnostics
                    .error(Phase::Tokenize, line, column, "unterminated block comment");
                self.emit(TokenKind::Error, start, line, column);
            }
        } else if c == b'"' {
            if self.scan_string() {
                self.emit(TokenKind::StringLiteral, start, line, column);
            } else {
                self.diagnostics
                    .error(Phase::Tokenize, line, column, "unterminated string literal");
                self.emit(TokenKind::Error, start, line, column);
            }
        } else if c.is_ascii_digit() || (c == b'.' && self.peek(1).is_ascii_digit()) {
            let kind = self.scan_number();
            self.emit(kind, start, line, column);
        } else if is_ident_start(c) {
            while is_ident_continue(self.peek(0)) {
                self.advance(1);
            }
            let kind = builtin_tables().classify(&self.src[start..self.pos]);
            self.emit(kind, start, line, column);
        } else if PUNCTUATION.contains(&c) {
            self.advance(1);
            self.emit(TokenKind::Punctuation, start, line, column);
        } else if let Some(op) = self.match_operator() {
            self.advance(op.len());
            self.emit(TokenKind::Operator, start, line, column);
        } else {
            // Consume one whole character, however many bytes it takes.
            let ch = self.src[start..].chars().next().unwrap_or('\u{FFFD}');
            self.advance(ch.len_utf8().max(1));
            self.diagnostics.error(
                Phase::Tokenize,
                line,
                column,
                format!("unrecognized character '{}'", ch.escape_default()),
            );
            self.emit(TokenKind::Error, start, line, column);
        }
    }

    fn is_line_continuation(&self) -> bool {
        self.peek(1) == b'\n' || (self.peek(1) == b'\r' && self.peek(2) == b'\n')
    }

    fn scan_whitespace(&mut self) {
        loop {
            let c = self.peek(0);
            if c == b'\n' {
                self.at_line_start = true;
                self.advance(1);
            } else if is_space(c) {
                self.advance(1);
            } else if c == b'\\' && self.is_line_continuation() {
                let len = if self.peek(1) == b'\r' { 3 } else { 2 };
                self.advance(len);
            } else {
                break;
            }
        }
    }

    /// Capture a directive through the end of its logical line.
    ///
    /// Backslash-newline continues the directive, and a block comment that
    /// spans lines stays part of it.
    fn scan_directive(&mut self) {
        while self.pos < self.bytes.len() {
            let c = self.peek(0);
            if c == b'\n' {
                break;
            }
            if c == b'\\' && self.is_line_continuation() {
                let len = if self.peek(1) == b'\r' { 3 } else { 2 };
                self.advance(len);
            } else if c == b'/' && self.peek(1) == b'*' {
                if !self.scan_block_comment() {
                    let (line, column) = (self.line, self.column);
                    self.diagnostics.error(
                        Phase::Tokenize,
                        line,
                        column,
                        "unterminated block comment in directive",
                    );
                }
            } else if c == b'/' && self.peek(1) == b'/' {
                self.scan_line_comment();
            } else {
                self.advance(1);
            }
        }
    }

    fn scan_line_comment(&mut self) {
        while self.pos < self.bytes.len() {
            let c = self.peek(0);
            if c == b'\n' {
                break;
            }
            if c == b'\\' && self.is_line_continuation() {
                let len = if self.peek(1) == b'\r' { 3 } else { 2 };
                self.advance(len);
            } else {
                self.advance(1);
            }
        }
    }

    /// Returns false when the input ends before `*/`.
    fn scan_block_comment(&mut self) -> bool {
        self.advance(2);
        while self.pos < self.bytes.len() {
            if self.peek(0) == b'*' && self.peek(1) == b'/' {
                self.advance(2);
                return true;
            }
            self.advance(1);
        }
        false
    }

    /// Returns false when the line ends before the closing quote.
    fn scan_string(&mut self) -> bool {
        self.advance(1);
        while self.pos < self.bytes.len() {
            match self.peek(0) {
                b'"' => {
                    self.advance(1);
                    return true;
                }
                b'\\' => self.advance(2),
                b'\n' => return false,
                _ => self.advance(1),
            }
        }
        false
    }

    fn scan_digits(&mut self, pred: fn(u8) -> bool) {
        while pred(self.peek(0)) {
            self.advance(1);
        }
    }

    fn scan_number(&mut self) -> TokenKind {
        let c = self.peek(0);
        if c == b'0' && matches!(self.peek(1), b'x' | b'X') && self.peek(2).is_ascii_hexdigit() {
            self.advance(2);
            self.scan_digits(|b| b.is_ascii_hexdigit());
            return self.scan_int_suffix();
        }

        let mut is_float = false;
        self.scan_digits(|b| b.is_ascii_digit());
        if self.peek(0) == b'.' && !is_ident_start(self.peek(1)) {
            // `1.` and `1.5` are floats; `1.x` is not a valid number either way
            // but the dot must not swallow a swizzle.
            is_float = true;
            self.advance(1);
            self.scan_digits(|b| b.is_ascii_digit());
        }
        if matches!(self.peek(0), b'e' | b'E') {
            let sign = matches!(self.peek(1), b'+' | b'-');
            let digit_at = if sign { 2 } else { 1 };
            if self.peek(digit_at).is_ascii_digit() {
                is_float = true;
                self.advance(digit_at);
                self.scan_digits(|b| b.is_ascii_digit());
            }
        }

        if is_float {
            match (self.peek(0), self.peek(1)) {
                (b'l', b'f') | (b'L', b'F') => {
                    self.advance(2);
                    TokenKind::DoubleLiteral
                }
                (b'f', _) | (b'F', _) => {
                    self.advance(1);
                    TokenKind::FloatLiteral
                }
                _ => TokenKind::FloatLiteral,
            }
        } else {
            match self.peek(0) {
                b'f' | b'F' => {
                    // `1f` is a float in desktop GLSL.
                    self.advance(1);
                    TokenKind::FloatLiteral
                }
                _ => self.scan_int_suffix(),
            }
        }
    }

    fn scan_int_suffix(&mut self) -> TokenKind {
        if matches!(self.peek(0), b'u' | b'U') {
            self.advance(1);
            TokenKind::UintLiteral
        } else {
            TokenKind::IntLiteral
        }
    }

    fn match_operator(&self) -> Option<&'static str> {
        let rest = &self.bytes[self.pos..];
        OPERATORS
            .iter()
            .find(|op| rest.starts_with(op.as_bytes()))
            .copied()
    }
}

fn is_space(c: u8) -> bool {
    matches!(c, b' ' | b'\t' | b'\r' | b'\n' | 0x0B | 0x0C)
}

fn is_ident_start(c: u8) -> bool {
    c.is_ascii_alphabetic() || c == b'_'
}

fn is_ident_continue(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'_'
}

/// Tokenize a source text with no token limit.
pub fn tokenize(src: &str) -> Result<(TokenBuffer, Diagnostics), TokenizeError> {
    Tokenizer::new(src).tokenize()
}

#[cfg(test)]
mod tests {
    use alloc::{string::String, vec::Vec};

    use super::*;

    fn kinds(src: &str) -> Vec<(TokenKind, String)> {
        let (buf, _) = tokenize(src).unwrap();
        buf.iter()
            .filter(|t| t.kind() != TokenKind::Whitespace && t.kind() != TokenKind::EndOfInput)
            .map(|t| (t.kind(), String::from(t.text())))
            .collect()
    }

    #[test]
    fn test_covers_every_byte() {
        let src = "uniform vec4 c; // note\n/* block */ void main() { x = 1.0 / 2.0; }\n";
        let (buf, diags) = tokenize(src).unwrap();
        assert!(diags.is_empty());
        assert_eq!(buf.render(), src);
        assert_eq!(buf.kind(buf.len() - 1), TokenKind::EndOfInput);
    }

    #[test]
    fn test_slash_disambiguation() {
        let toks = kinds("a / b // c\n/* d */ \"e/f\"");
        assert_eq!(toks[1], (TokenKind::Operator, String::from("/")));
        assert_eq!(toks[3].0, TokenKind::LineComment);
        assert_eq!(toks[4].0, TokenKind::BlockComment);
        assert_eq!(toks[5], (TokenKind::StringLiteral, String::from("\"e/f\"")));
    }

    #[test]
    fn test_numbers() {
        let toks = kinds("1 2u 0x1F 0xFFu 017 1.5 .5 1e3 2.0f 3.0lf 1.0e-2");
        let expected = [
            TokenKind::IntLiteral,
            TokenKind::UintLiteral,
            TokenKind::IntLiteral,
            TokenKind::UintLiteral,
            TokenKind::IntLiteral,
            TokenKind::FloatLiteral,
            TokenKind::FloatLiteral,
            TokenKind::FloatLiteral,
            TokenKind::FloatLiteral,
            TokenKind::DoubleLiteral,
            TokenKind::FloatLiteral,
        ];
        let actual: Vec<TokenKind> = toks.iter().map(|(k, _)| *k).collect();
        assert_eq!(actual, expected);
        assert_eq!(toks[10].1, "1.0e-2");
    }

    #[test]
    fn test_swizzle_after_literal_call() {
        let toks = kinds("v.xy 1.0");
        assert_eq!(toks[0], (TokenKind::Identifier, String::from("v")));
        assert_eq!(toks[1], (TokenKind::Punctuation, String::from(".")));
        assert_eq!(toks[2], (TokenKind::Identifier, String::from("xy")));
        assert_eq!(toks[3], (TokenKind::FloatLiteral, String::from("1.0")));
    }

    #[test]
    fn test_identifier_classification() {
        let toks = kinds("highp vec4 texture gl_Position layout if foo false");
        let actual: Vec<TokenKind> = toks.iter().map(|(k, _)| *k).collect();
        assert_eq!(
            actual,
            [
                TokenKind::Precision,
                TokenKind::TypeKeyword,
                TokenKind::BuiltinFunction,
                TokenKind::BuiltinVariable,
                TokenKind::Qualifier,
                TokenKind::Keyword,
                TokenKind::Identifier,
                TokenKind::BoolLiteral,
            ]
        );
    }

    #[test]
    fn test_directive_only_at_line_start() {
        let toks = kinds("#version 300 es\n  #define A \\\n 1\nx # y");
        assert_eq!(toks[0], (TokenKind::Directive, String::from("#version 300 es")));
        assert_eq!(toks[1], (TokenKind::Directive, String::from("#define A \\\n 1")));
        assert_eq!(toks[2].0, TokenKind::Identifier);
        assert_eq!(toks[3].0, TokenKind::Error);
    }

    #[test]
    fn test_directive_with_block_comment() {
        let toks = kinds("#define A /* spans\n lines */ 1\nfoo");
        assert_eq!(toks[0].0, TokenKind::Directive);
        assert!(toks[0].1.ends_with("lines */ 1"));
        assert_eq!(toks[1], (TokenKind::Identifier, String::from("foo")));
    }

    #[test]
    fn test_operators_longest_match() {
        let toks = kinds("a <<= b >> c && d ^^ e");
        assert_eq!(toks[1].1, "<<=");
        assert_eq!(toks[3].1, ">>");
        assert_eq!(toks[5].1, "&&");
        assert_eq!(toks[7].1, "^^");
    }

    #[test]
    fn test_unterminated_block_comment() {
        let (buf, diags) = tokenize("a /* never closed").unwrap();
        assert_eq!(diags.error_count(), 1);
        assert!(buf.iter().any(|t| t.kind() == TokenKind::Error));
        assert_eq!(buf.render(), "a /* never closed");
    }

    #[test]
    fn test_unrecognized_character_recovers() {
        let (buf, diags) = tokenize("a @ b").unwrap();
        assert_eq!(diags.error_count(), 1);
        let idents = buf
            .iter()
            .filter(|t| t.kind() == TokenKind::Identifier)
            .count();
        assert_eq!(idents, 2);
    }

    #[test]
    fn test_line_and_column() {
        let (buf, _) = tokenize("a\n  bb").unwrap();
        let b = buf.iter().find(|t| t.text() == "bb").unwrap();
        assert_eq!(b.line(), 2);
        assert_eq!(b.column(), 3);
    }

    #[test]
    fn test_token_limit() {
        let result = Tokenizer::with_limit("a b c d e f", 3).tokenize();
        assert_eq!(result.unwrap_err(), TokenizeError::TooManyTokens { limit: 3 });
    }
}
