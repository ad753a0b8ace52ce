//! Macro definitions and the `#define` body parser.

use alloc::{
    format,
    string::{String, ToString},
    vec::Vec,
};

use hashbrown::HashMap;

/// Name under which an anonymous `...` parameter is referenced.
pub const VA_ARGS: &str = "__VA_ARGS__";

/// How a replacement token takes part in expansion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MacroTokenKind {
    /// Copied as-is
    Text,
    /// Reference to the parameter at this position
    Param(usize),
    /// `#param`: the argument's spelling as a string literal
    Stringify(usize),
    /// Reference to the variadic arguments
    VaArgs,
}

/// One token of a macro replacement list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacroToken {
    pub kind: MacroTokenKind,
    pub text: String,
    /// Left operand of `##`: fuses with the following token
    pub paste_left: bool,
    /// Right operand of `##`: fuses with the preceding token
    pub paste_right: bool,
}

impl MacroToken {
    fn text(text: &str) -> Self {
        Self {
            kind: MacroTokenKind::Text,
            text: String::from(text),
            paste_left: false,
            paste_right: false,
        }
    }

    fn is_space(&self) -> bool {
        self.kind == MacroTokenKind::Text && self.text.chars().all(char::is_whitespace)
    }
}

/// A `#define`d macro.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacroDefinition {
    pub name: String,
    /// Named parameters; `None` for object-like macros
    pub params: Option<Vec<String>>,
    pub variadic: bool,
    /// Name the variadic arguments are referenced by
    pub va_name: Option<String>,
    pub body: Vec<MacroToken>,
    /// Replacement text as written, trimmed
    pub replacement: String,
    /// Predefined by the preprocessor; cannot be redefined or undefined
    pub builtin: bool,
}

impl MacroDefinition {
    /// Object-like macro with a plain replacement.
    pub fn object(name: &str, replacement: &str) -> Self {
        let body = tokenize_body(replacement, &[], None).unwrap_or_default();
        Self {
            name: String::from(name),
            params: None,
            variadic: false,
            va_name: None,
            body,
            replacement: String::from(replacement.trim()),
            builtin: false,
        }
    }

    /// Predefined object-like macro.
    pub fn builtin(name: &str, replacement: &str) -> Self {
        Self {
            builtin: true,
            ..Self::object(name, replacement)
        }
    }

    pub fn is_function_like(&self) -> bool {
        self.params.is_some()
    }

    /// Number of named (non-variadic) parameters.
    pub fn arity(&self) -> usize {
        self.params.as_ref().map_or(0, Vec::len)
    }
}

/// Why a `#define` could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DefineError {
    MissingName,
    BadParameterList(String),
    DuplicateParameter(String),
    PasteAtEdge,
}

impl core::fmt::Display for DefineError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            DefineError::MissingName => f.write_str("macro name missing in #define"),
            DefineError::BadParameterList(detail) => {
                write!(f, "malformed macro parameter list: {}", detail)
            }
            DefineError::DuplicateParameter(name) => {
                write!(f, "duplicate macro parameter '{}'", name)
            }
            DefineError::PasteAtEdge => {
                f.write_str("'##' cannot appear at either end of a macro replacement")
            }
        }
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Split off a leading identifier.
pub fn take_identifier(text: &str) -> Option<(&str, &str)> {
    let first = text.chars().next()?;
    if !is_ident_start(first) {
        return None;
    }
    let end = text
        .char_indices()
        .find(|&(_, c)| !is_ident_continue(c))
        .map_or(text.len(), |(i, _)| i);
    Some((&text[..end], &text[end..]))
}

/// Parse the text following `#define`.
pub fn parse_define(rest: &str) -> Result<MacroDefinition, DefineError> {
    let rest = rest.trim_start();
    let (name, after) = take_identifier(rest).ok_or(DefineError::MissingName)?;

    // Function-like only when `(` touches the name.
    if let Some(list) = after.strip_prefix('(') {
        let close = list
            .find(')')
            .ok_or_else(|| DefineError::BadParameterList(String::from("missing ')'")))?;
        let (params, va_name) = parse_params(&list[..close])?;
        let replacement = &list[close + 1..];
        let body = tokenize_body(replacement, &params, va_name.as_deref())?;
        Ok(MacroDefinition {
            name: String::from(name),
            params: Some(params),
            variadic: va_name.is_some(),
            va_name,
            body,
            replacement: String::from(replacement.trim()),
            builtin: false,
        })
    } else {
        let body = tokenize_body(after, &[], None)?;
        Ok(MacroDefinition {
            name: String::from(name),
            params: None,
            variadic: false,
            va_name: None,
            body,
            replacement: String::from(after.trim()),
            builtin: false,
        })
    }
}

fn parse_params(list: &str) -> Result<(Vec<String>, Option<String>), DefineError> {
    let mut params: Vec<String> = Vec::new();
    let mut va_name = None;
    if list.trim().is_empty() {
        return Ok((params, va_name));
    }
    let pieces: Vec<&str> = list.split(',').map(str::trim).collect();
    for (i, piece) in pieces.iter().enumerate() {
        let last = i + 1 == pieces.len();
        if *piece == "..." {
            if !last {
                return Err(DefineError::BadParameterList(String::from(
                    "'...' must be the last parameter",
                )));
            }
            va_name = Some(String::from(VA_ARGS));
        } else if let Some(named) = piece.strip_suffix("...") {
            let named = named.trim();
            if !last || take_identifier(named).map(|(_, r)| r.is_empty()) != Some(true) {
                return Err(DefineError::BadParameterList(format!(
                    "bad variadic parameter '{}'",
                    piece
                )));
            }
            va_name = Some(String::from(named));
        } else {
            match take_identifier(piece) {
                Some((ident, "")) => {
                    if params.iter().any(|p| p == ident) {
                        return Err(DefineError::DuplicateParameter(String::from(ident)));
                    }
                    params.push(String::from(ident));
                }
                _ => {
                    return Err(DefineError::BadParameterList(format!(
                        "unexpected '{}'",
                        piece
                    )))
                }
            }
        }
    }
    Ok((params, va_name))
}

/// Split replacement text into raw pieces: identifiers, numbers, strings,
/// `##`, `#`, whitespace runs and single characters.
fn raw_pieces(text: &str) -> Vec<&str> {
    let mut pieces = Vec::new();
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i] as char;
        let start = i;
        if c.is_ascii_whitespace() {
            while i < bytes.len() && bytes[i].is_ascii_whitespace() {
                i += 1;
            }
        } else if is_ident_start(c) {
            while i < bytes.len() && is_ident_continue(bytes[i] as char) {
                i += 1;
            }
        } else if c.is_ascii_digit()
            || (c == '.' && i + 1 < bytes.len() && bytes[i + 1].is_ascii_digit())
        {
            while i < bytes.len() && (is_ident_continue(bytes[i] as char) || bytes[i] == b'.') {
                i += 1;
            }
        } else if c == '"' {
            i += 1;
            while i < bytes.len() && bytes[i] != b'"' {
                if bytes[i] == b'\\' {
                    i += 1;
                }
                i += 1;
            }
            i = (i + 1).min(bytes.len());
        } else if c == '#' && i + 1 < bytes.len() && bytes[i + 1] == b'#' {
            i += 2;
        } else {
            i += c.len_utf8().max(1);
            while i < bytes.len() && !text.is_char_boundary(i) {
                i += 1;
            }
        }
        pieces.push(&text[start..i]);
    }
    pieces
}

fn param_kind(piece: &str, params: &[String], va_name: Option<&str>) -> Option<MacroTokenKind> {
    if let Some(pos) = params.iter().position(|p| p == piece) {
        Some(MacroTokenKind::Param(pos))
    } else if va_name == Some(piece) {
        Some(MacroTokenKind::VaArgs)
    } else {
        None
    }
}

/// Tokenize a replacement list, tagging parameters and operators.
pub fn tokenize_body(
    text: &str,
    params: &[String],
    va_name: Option<&str>,
) -> Result<Vec<MacroToken>, DefineError> {
    let function_like = !params.is_empty() || va_name.is_some();
    let pieces = raw_pieces(text.trim());
    let mut body: Vec<MacroToken> = Vec::new();
    let mut pending_paste = false;
    let mut i = 0;

    while i < pieces.len() {
        let piece = pieces[i];
        i += 1;

        if piece == "##" {
            while body.last().is_some_and(MacroToken::is_space) {
                body.pop();
            }
            match body.last_mut() {
                Some(left) => left.paste_left = true,
                None => return Err(DefineError::PasteAtEdge),
            }
            pending_paste = true;
            continue;
        }

        let mut token = if piece.chars().all(char::is_whitespace) {
            if pending_paste {
                continue;
            }
            MacroToken::text(" ")
        } else if piece == "#" && function_like {
            // `#` stringifies only when a parameter follows.
            let mut j = i;
            while j < pieces.len() && pieces[j].chars().all(char::is_whitespace) {
                j += 1;
            }
            match pieces.get(j).and_then(|p| param_kind(p, params, va_name)) {
                Some(MacroTokenKind::Param(pos)) => {
                    i = j + 1;
                    MacroToken {
                        kind: MacroTokenKind::Stringify(pos),
                        text: pieces[j].to_string(),
                        paste_left: false,
                        paste_right: false,
                    }
                }
                _ => MacroToken::text(piece),
            }
        } else if let Some(kind) = param_kind(piece, params, va_name) {
            MacroToken {
                kind,
                text: String::from(piece),
                paste_left: false,
                paste_right: false,
            }
        } else {
            MacroToken::text(piece)
        };

        if pending_paste {
            token.paste_right = true;
            pending_paste = false;
        }
        body.push(token);
    }

    if pending_paste {
        return Err(DefineError::PasteAtEdge);
    }
    Ok(body)
}

/// Defined macros, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct MacroTable {
    macros: HashMap<String, MacroDefinition>,
}

/// Result of a `#define` or `#undef` against the table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DefineOutcome {
    Defined,
    /// An existing user macro was replaced
    Redefined,
    /// A predefined macro cannot be changed
    BuiltinRejected,
}

/// Result of an `#undef`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UndefOutcome {
    Removed,
    NotDefined,
    BuiltinRejected,
}

impl MacroTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&MacroDefinition> {
        self.macros.get(name)
    }

    pub fn is_defined(&self, name: &str) -> bool {
        self.macros.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.macros.len()
    }

    pub fn is_empty(&self) -> bool {
        self.macros.is_empty()
    }

    /// Add or replace a definition. Redefinition always overwrites.
    pub fn define(&mut self, definition: MacroDefinition) -> DefineOutcome {
        match self.macros.get(&definition.name) {
            Some(existing) if existing.builtin && !definition.builtin => {
                DefineOutcome::BuiltinRejected
            }
            Some(_) => {
                self.macros.insert(definition.name.clone(), definition);
                DefineOutcome::Redefined
            }
            None => {
                self.macros.insert(definition.name.clone(), definition);
                DefineOutcome::Defined
            }
        }
    }

    /// Remove a definition.
    pub fn undefine(&mut self, name: &str) -> UndefOutcome {
        match self.macros.get(name) {
            Some(existing) if existing.builtin => UndefOutcome::BuiltinRejected,
            Some(_) => {
                self.macros.remove(name);
                UndefOutcome::Removed
            }
            None => UndefOutcome::NotDefined,
        }
    }

    /// Replace a predefined macro's value (e.g. `__VERSION__` after `#version`).
    pub fn set_builtin(&mut self, name: &str, replacement: &str) {
        self.macros
            .insert(String::from(name), MacroDefinition::builtin(name, replacement));
    }
}

/// Names reserved for the implementation.
pub fn is_reserved_name(name: &str) -> bool {
    name.starts_with("GL_") || name.contains("__")
}
