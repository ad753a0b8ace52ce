//! Tokens and tokenization.
//!
//! The tokenizer is the only component that looks at raw characters. It produces
//! a [`TokenBuffer`] that covers every byte of the input exactly once, trivia
//! included.

mod buffer;
mod cursor;
mod lexer;
mod tables;

pub use buffer::{TokenBuffer, TokenRef};
pub use cursor::{first_significant, matching_close, split_arguments, Significant};
pub use lexer::{tokenize, TokenizeError, Tokenizer};
pub use tables::{builtin_tables, BuiltinTables};

/// Token classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    /// Decimal, octal or hex integer without suffix
    IntLiteral,
    /// Integer with a `u`/`U` suffix
    UintLiteral,
    /// Float literal, optionally with `f`/`F` suffix
    FloatLiteral,
    /// Float literal with an `lf`/`LF` suffix
    DoubleLiteral,
    /// `true` / `false`
    BoolLiteral,
    /// Quoted string (only meaningful in directives)
    StringLiteral,
    Identifier,
    /// Built-in variable such as `gl_Position`
    BuiltinVariable,
    /// Built-in function such as `texture`
    BuiltinFunction,
    /// Type keyword such as `vec4` or `sampler2D`
    TypeKeyword,
    /// Storage, interpolation, memory and layout qualifiers
    Qualifier,
    /// `highp`, `mediump`, `lowp`, `precision`
    Precision,
    /// Any other keyword (`if`, `struct`, `return`, ...)
    Keyword,
    Operator,
    Punctuation,
    /// A whole preprocessor directive line, captured verbatim
    Directive,
    LineComment,
    BlockComment,
    Whitespace,
    EndOfInput,
    /// Unrecognized or unterminated input
    Error,
}

impl TokenKind {
    /// Trivia tokens carry no syntax for declaration analysis.
    pub fn is_trivia(self) -> bool {
        matches!(
            self,
            TokenKind::Whitespace
                | TokenKind::LineComment
                | TokenKind::BlockComment
                | TokenKind::Directive
                | TokenKind::EndOfInput
        )
    }

    pub fn is_literal(self) -> bool {
        matches!(
            self,
            TokenKind::IntLiteral
                | TokenKind::UintLiteral
                | TokenKind::FloatLiteral
                | TokenKind::DoubleLiteral
                | TokenKind::BoolLiteral
                | TokenKind::StringLiteral
        )
    }

    /// Identifiers in the broad sense: anything a name lookup could target.
    pub fn is_name(self) -> bool {
        matches!(
            self,
            TokenKind::Identifier | TokenKind::BuiltinVariable | TokenKind::BuiltinFunction
        )
    }
}

/// A copyable snapshot of one token's fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    /// Byte offset into the tokenized source
    pub start: u32,
    /// Byte length in the tokenized source
    pub len: u32,
    /// 1-based line
    pub line: u32,
    /// 1-based column
    pub column: u32,
}

impl Token {
    pub fn end(&self) -> u32 {
        self.start + self.len
    }
}

/// Decoded value of a literal token.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LiteralValue {
    Int(i64),
    Uint(u64),
    Float(f64),
    Bool(bool),
}

impl LiteralValue {
    /// Non-negative integer value that fits in `u32`.
    pub fn as_u32(self) -> Option<u32> {
        match self {
            LiteralValue::Int(v) => u32::try_from(v).ok(),
            LiteralValue::Uint(v) => u32::try_from(v).ok(),
            _ => None,
        }
    }
}

/// Decode an integer literal (decimal, octal or hex, optional `u` suffix).
pub fn parse_int_literal(text: &str) -> Option<u64> {
    let digits = text.trim_end_matches(['u', 'U']);
    if let Some(hex) = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        u64::from_str_radix(hex, 16).ok()
    } else if digits.len() > 1 && digits.starts_with('0') {
        u64::from_str_radix(&digits[1..], 8).ok()
    } else {
        digits.parse::<u64>().ok()
    }
}

/// Decode a float literal, ignoring any `f`/`lf` suffix.
pub fn parse_float_literal(text: &str) -> Option<f64> {
    let digits = text.trim_end_matches(['f', 'F', 'l', 'L']);
    digits.parse::<f64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_int_literal() {
        assert_eq!(parse_int_literal("42"), Some(42));
        assert_eq!(parse_int_literal("42u"), Some(42));
        assert_eq!(parse_int_literal("0x1F"), Some(31));
        assert_eq!(parse_int_literal("0XffU"), Some(255));
        assert_eq!(parse_int_literal("017"), Some(15));
        assert_eq!(parse_int_literal("0"), Some(0));
        assert_eq!(parse_int_literal("09"), None);
    }

    #[test]
    fn test_parse_float_literal() {
        assert_eq!(parse_float_literal("1.5"), Some(1.5));
        assert_eq!(parse_float_literal("2.0f"), Some(2.0));
        assert_eq!(parse_float_literal("1e3"), Some(1000.0));
        assert_eq!(parse_float_literal(".25LF"), Some(0.25));
    }

    #[test]
    fn test_trivia_kinds() {
        assert!(TokenKind::Whitespace.is_trivia());
        assert!(TokenKind::Directive.is_trivia());
        assert!(!TokenKind::Identifier.is_trivia());
        assert!(TokenKind::UintLiteral.is_literal());
    }
}
