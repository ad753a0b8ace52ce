//! Token-level views of top-level statements.
//!
//! Rewrite stages work from these views rather than the symbol table so that
//! they also run in token-only mode.

use alloc::{format, string::String, vec::Vec};
use core::ops::Range;

use crate::{
    analyze::{parse_layout, LayoutQualifier, StorageQualifier},
    token::{Significant, TokenBuffer, TokenKind},
};

/// One top-level statement: a declaration ending in `;` or a function
/// definition ending in its closing brace.
#[derive(Debug, Clone)]
pub struct TopLevel {
    /// Significant token indices, terminator included
    pub tokens: Vec<usize>,
    pub is_function: bool,
}

/// Split the significant tokens of `buffer` into top-level statements.
pub fn top_level(buffer: &TokenBuffer) -> Vec<TopLevel> {
    let sig = Significant::new(buffer);
    let mut statements = Vec::new();
    let mut current: Vec<usize> = Vec::new();
    let mut depth = 0usize;
    let mut function_body = false;

    for token in sig.iter() {
        let punct = buffer.kind(token) == TokenKind::Punctuation;
        let text = buffer.text(token);
        if punct && depth == 0 && text == "{" {
            function_body = current.last().is_some_and(|&prev| buffer.is(prev, ")"));
        }
        current.push(token);
        if !punct {
            continue;
        }
        match text {
            "(" | "[" | "{" => depth += 1,
            ")" | "]" => depth = depth.saturating_sub(1),
            "}" => {
                depth = depth.saturating_sub(1);
                if depth == 0 && function_body {
                    statements.push(TopLevel {
                        tokens: core::mem::take(&mut current),
                        is_function: true,
                    });
                    function_body = false;
                }
            }
            ";" if depth == 0 => statements.push(TopLevel {
                tokens: core::mem::take(&mut current),
                is_function: false,
            }),
            _ => {}
        }
    }
    if !current.is_empty() {
        statements.push(TopLevel {
            tokens: current,
            is_function: false,
        });
    }
    statements
}

/// Qualifier prefix of a declaration. Positions index into
/// [`TopLevel::tokens`].
#[derive(Debug, Clone, Default)]
pub struct DeclHead {
    /// `layout` through its closing `)`, inclusive
    pub layouts: Vec<Range<usize>>,
    pub layout: Option<LayoutQualifier>,
    pub storage: Option<usize>,
    /// Every qualifier keyword other than `layout`
    pub qualifiers: Vec<usize>,
    /// First position after the qualifiers
    pub body: usize,
}

impl TopLevel {
    pub fn first(&self) -> usize {
        self.tokens[0]
    }

    pub fn last(&self) -> usize {
        self.tokens[self.tokens.len() - 1]
    }

    /// Token range covered by the statement.
    pub fn range(&self) -> Range<usize> {
        self.first()..self.last() + 1
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn text<'b>(&self, buffer: &'b TokenBuffer, pos: usize) -> &'b str {
        self.tokens.get(pos).map_or("", |&t| buffer.text(t))
    }

    pub fn kind(&self, buffer: &TokenBuffer, pos: usize) -> Option<TokenKind> {
        self.tokens.get(pos).map(|&t| buffer.kind(t))
    }

    fn is_punct(&self, buffer: &TokenBuffer, pos: usize, text: &str) -> bool {
        self.kind(buffer, pos) == Some(TokenKind::Punctuation) && self.text(buffer, pos) == text
    }

    /// Position of the bracket closing the one at `open`, within the statement.
    pub fn matching(&self, buffer: &TokenBuffer, open: usize) -> Option<usize> {
        let mut depth = 0usize;
        for pos in open..self.tokens.len() {
            if self.kind(buffer, pos) != Some(TokenKind::Punctuation) {
                continue;
            }
            match self.text(buffer, pos) {
                "(" | "[" | "{" => depth += 1,
                ")" | "]" | "}" => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        return Some(pos);
                    }
                }
                _ => {}
            }
        }
        None
    }

    /// Parse the qualifier prefix.
    pub fn head(&self, buffer: &TokenBuffer) -> DeclHead {
        let mut head = DeclHead::default();
        let mut pos = 0;
        while pos < self.tokens.len() {
            let text = self.text(buffer, pos);
            match self.kind(buffer, pos) {
                Some(TokenKind::Qualifier) if text == "layout" => {
                    let Some(close) = self
                        .is_punct(buffer, pos + 1, "(")
                        .then(|| self.matching(buffer, pos + 1))
                        .flatten()
                    else {
                        break;
                    };
                    let inner = self.join(buffer, pos + 2..close);
                    if let Some(layout) = parse_layout(&inner) {
                        match &mut head.layout {
                            Some(merged) => merged.merge(layout),
                            None => head.layout = Some(layout),
                        }
                    }
                    head.layouts.push(pos..close + 1);
                    pos = close + 1;
                }
                Some(TokenKind::Qualifier | TokenKind::Precision) if text != "precision" => {
                    if StorageQualifier::from_keyword(text).is_some() {
                        head.storage = Some(pos);
                    }
                    head.qualifiers.push(pos);
                    pos += 1;
                }
                _ => break,
            }
        }
        head.body = pos;
        head
    }

    pub fn storage<'b>(&self, buffer: &'b TokenBuffer, head: &DeclHead) -> Option<&'b str> {
        head.storage.map(|pos| self.text(buffer, pos))
    }

    /// Significant token texts in `range`, joined with single spaces.
    pub fn join(&self, buffer: &TokenBuffer, range: Range<usize>) -> String {
        let mut out = String::new();
        for pos in range {
            if !out.is_empty() {
                out.push(' ');
            }
            out.push_str(self.text(buffer, pos));
        }
        out
    }

    /// Positions of declared names, starting from the type at `type_pos`.
    ///
    /// Initializers are skipped. Returns an empty list for statements that are
    /// not plain variable declarations.
    pub fn declarators(&self, buffer: &TokenBuffer, type_pos: usize) -> Vec<usize> {
        let mut names = Vec::new();
        let mut pos = type_pos + 1;
        // Array dimensions on the type.
        while self.is_punct(buffer, pos, "[") {
            match self.matching(buffer, pos) {
                Some(close) => pos = close + 1,
                None => return names,
            }
        }
        loop {
            match self.kind(buffer, pos) {
                Some(TokenKind::Identifier | TokenKind::BuiltinVariable) => names.push(pos),
                _ => return names,
            }
            if self.is_punct(buffer, pos + 1, "(") {
                // Function header, not a variable.
                names.clear();
                return names;
            }
            pos += 1;
            let mut depth = 0usize;
            while pos < self.tokens.len() {
                let punct = self.kind(buffer, pos) == Some(TokenKind::Punctuation);
                let text = self.text(buffer, pos);
                if punct {
                    match text {
                        "(" | "[" | "{" => depth += 1,
                        ")" | "]" | "}" => depth = depth.saturating_sub(1),
                        "," | ";" if depth == 0 => break,
                        _ => {}
                    }
                }
                pos += 1;
            }
            if !self.is_punct(buffer, pos, ",") {
                return names;
            }
            pos += 1;
        }
    }

    /// Array dimensions written directly after the name at `name_pos`.
    pub fn name_dims(&self, buffer: &TokenBuffer, name_pos: usize) -> Vec<Option<u32>> {
        let mut dims = Vec::new();
        let mut pos = name_pos + 1;
        while self.is_punct(buffer, pos, "[") {
            let Some(close) = self.matching(buffer, pos) else {
                break;
            };
            let size = (close == pos + 2)
                .then(|| self.tokens[pos + 1])
                .and_then(|t| buffer.literal_value(t))
                .and_then(|v| v.as_u32());
            dims.push(size);
            pos = close + 1;
        }
        dims
    }
}

/// Remove tokens in `range`, plus one following same-line whitespace token.
pub fn remove_tidy(buffer: &mut TokenBuffer, range: Range<usize>) {
    let end = range.end;
    buffer.remove_range(range);
    if end < buffer.len()
        && buffer.kind(end) == TokenKind::Whitespace
        && !buffer.text(end).contains('\n')
    {
        buffer.remove(end);
    }
}

/// Remove a whole statement.
pub fn remove_statement(buffer: &mut TokenBuffer, statement: &TopLevel) {
    remove_tidy(buffer, statement.range());
}

/// Rewrite the layout at `layout` (positions into `statement.tokens`) keeping
/// only entries whose key satisfies `keep`. Returns the dropped entries.
///
/// The qualifier disappears entirely when nothing is kept.
pub fn filter_layout(
    buffer: &mut TokenBuffer,
    statement: &TopLevel,
    layout: Range<usize>,
    keep: impl Fn(&str) -> bool,
) -> Vec<String> {
    let open = layout.start + 1;
    let close = layout.end - 1;
    let mut kept: Vec<String> = Vec::new();
    let mut dropped: Vec<String> = Vec::new();

    let mut entry_start = open + 1;
    let mut pos = open + 1;
    while pos <= close {
        let at_end = pos == close;
        if at_end || statement.text(buffer, pos) == "," {
            if entry_start < pos {
                let entry = statement.join(buffer, entry_start..pos);
                let key = statement.text(buffer, entry_start);
                if keep(key) {
                    kept.push(entry);
                } else {
                    dropped.push(entry);
                }
            }
            entry_start = pos + 1;
        }
        pos += 1;
    }
    if dropped.is_empty() {
        return dropped;
    }

    let first = statement.tokens[layout.start];
    let last = statement.tokens[close];
    if kept.is_empty() {
        remove_tidy(buffer, first..last + 1);
    } else {
        buffer.remove_range(first..last + 1);
        buffer.insert_before(first, &format!("layout({})", kept.join(", ")));
    }
    dropped
}

/// Rename references to the file-scope variable `from`.
///
/// A parameter or local declaration named `from` shadows it until its block
/// closes. Member accesses such as `light.from` are left alone.
pub fn rename_global(buffer: &mut TokenBuffer, from: &str, to: &str) -> usize {
    let sig = Significant::new(buffer);
    let mut renames = Vec::new();
    let mut braces = 0usize;
    let mut parens = 0usize;
    // Brace depth of the block a shadowing declaration lives in.
    let mut shadow: Option<usize> = None;
    let mut parameter = false;
    let mut prev: Option<usize> = None;

    for token in sig.iter() {
        match (buffer.kind(token), buffer.text(token)) {
            (TokenKind::Punctuation, "{") => {
                braces += 1;
                if parameter && braces == 1 {
                    shadow = Some(1);
                }
                parameter = false;
            }
            (TokenKind::Punctuation, "}") => {
                braces = braces.saturating_sub(1);
                if shadow.is_some_and(|depth| braces < depth) {
                    shadow = None;
                }
            }
            (TokenKind::Punctuation, "(") => parens += 1,
            (TokenKind::Punctuation, ")") => parens = parens.saturating_sub(1),
            (TokenKind::Punctuation, ";") if braces == 0 => parameter = false,
            (TokenKind::Identifier, name) if name == from => {
                let member = prev.is_some_and(|p| buffer.is(p, "."));
                let declares = prev.is_some_and(|p| {
                    matches!(buffer.kind(p), TokenKind::TypeKeyword | TokenKind::Identifier)
                });
                if declares && braces == 0 {
                    parameter = parens > 0;
                } else if declares {
                    shadow.get_or_insert(braces);
                } else if !member && shadow.is_none() {
                    renames.push(token);
                }
            }
            _ => {}
        }
        prev = Some(token);
    }
    for &token in &renames {
        buffer.replace(token, to);
    }
    renames.len()
}

#[cfg(test)]
mod tests {
    use alloc::vec;

    use super::*;
    use crate::token::tokenize;

    #[test]
    fn test_top_level_split() {
        let (buf, _) = tokenize(
            "#version 300 es\nuniform Block { vec4 a; } b;\nvoid main() { if (x) { y; } }\nin vec2 uv;",
        )
        .unwrap();
        let statements = top_level(&buf);
        assert_eq!(statements.len(), 3);
        assert!(!statements[0].is_function);
        assert!(statements[1].is_function);
        assert_eq!(statements[2].text(&buf, 0), "in");
    }

    #[test]
    fn test_head_and_declarators() {
        let (buf, _) = tokenize(
            "layout(location = 1) flat out highp ivec2 ids[2], more = ivec2(1, 2);",
        )
        .unwrap();
        let statement = &top_level(&buf)[0];
        let head = statement.head(&buf);
        assert_eq!(head.layout.as_ref().unwrap().location, 1);
        assert_eq!(statement.storage(&buf, &head), Some("out"));
        assert_eq!(head.qualifiers.len(), 3);
        assert_eq!(statement.text(&buf, head.body), "ivec2");

        let names = statement.declarators(&buf, head.body);
        let names: Vec<&str> = names.iter().map(|&p| statement.text(&buf, p)).collect();
        assert_eq!(names, ["ids", "more"]);
        let ids = statement.declarators(&buf, head.body)[0];
        assert_eq!(statement.name_dims(&buf, ids), vec![Some(2)]);
    }

    #[test]
    fn test_function_header_has_no_declarators() {
        let (buf, _) = tokenize("vec4 f(vec2 p);").unwrap();
        let statement = &top_level(&buf)[0];
        assert!(statement.declarators(&buf, 0).is_empty());
    }

    #[test]
    fn test_filter_layout() {
        let (mut buf, _) = tokenize("layout(std140, binding = 2) uniform B { vec4 a; };").unwrap();
        let statement = top_level(&buf).remove(0);
        let head = statement.head(&buf);
        let dropped = filter_layout(&mut buf, &statement, head.layouts[0].clone(), |k| k != "binding");
        assert_eq!(dropped, ["binding = 2"]);
        assert_eq!(buf.render(), "layout(std140) uniform B { vec4 a; };");

        let (mut buf, _) = tokenize("layout(location = 0) uniform float x;").unwrap();
        let statement = top_level(&buf).remove(0);
        let head = statement.head(&buf);
        filter_layout(&mut buf, &statement, head.layouts[0].clone(), |_| false);
        assert_eq!(buf.render(), "uniform float x;");
    }

    #[test]
    fn test_rename_global_respects_shadowing() {
        let (mut buf, _) = tokenize(
            "void helper(out vec4 color) { color = vec4(1.0); }\nvoid tint(vec4 c) { vec4 color = c; color.a = 1.0; }\nvoid main() { helper(color); color.rgb = light.color; }",
        )
        .unwrap();
        assert_eq!(rename_global(&mut buf, "color", "gl_FragColor"), 2);
        let out = buf.render();
        assert!(out.contains("void helper(out vec4 color) { color = vec4(1.0); }"));
        assert!(out.contains("{ vec4 color = c; color.a = 1.0; }"));
        assert!(out.contains("helper(gl_FragColor); gl_FragColor.rgb = light.color;"));
    }

    #[test]
    fn test_rename_global_after_prototype() {
        let (mut buf, _) = tokenize("void f(vec4 color);\nvoid main() { color = vec4(0.0); }").unwrap();
        assert_eq!(rename_global(&mut buf, "color", "gl_FragColor"), 1);
        assert!(buf.render().contains("{ gl_FragColor = vec4(0.0); }"));
    }
}
