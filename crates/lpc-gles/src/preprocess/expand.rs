//! Recursive textual macro expansion.

use alloc::{format, string::String, vec::Vec};

use super::macros::{MacroDefinition, MacroTable, MacroTokenKind};
use crate::error::{Diagnostics, Phase};

/// Hard stop for runaway expansion chains that the per-name guard cannot see.
const MAX_EXPANSION_DEPTH: usize = 256;

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}

fn is_ident_continue(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// End of a string literal starting at `start`.
fn skip_string(bytes: &[u8], start: usize) -> usize {
    let mut i = start + 1;
    while i < bytes.len() && bytes[i] != b'"' {
        if bytes[i] == b'\\' {
            i += 1;
        }
        i += 1;
    }
    (i + 1).min(bytes.len())
}

/// End of a preprocessing number starting at `start`.
fn skip_number(bytes: &[u8], start: usize) -> usize {
    let mut i = start;
    while i < bytes.len() {
        let b = bytes[i];
        if is_ident_continue(b) || b == b'.' {
            i += 1;
        } else if matches!(b, b'+' | b'-') && matches!(bytes[i - 1], b'e' | b'E') {
            i += 1;
        } else {
            break;
        }
    }
    i
}

/// Find the `)` closing the `(` at `open`, skipping string literals.
pub fn find_closing_paren(text: &str, open: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut i = open;
    while i < bytes.len() {
        match bytes[i] {
            b'"' => {
                i = skip_string(bytes, i);
                continue;
            }
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// Split an argument list on commas outside nested parentheses.
pub fn split_top_level(args: &str) -> Vec<&str> {
    let bytes = args.as_bytes();
    let mut pieces = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'"' => {
                i = skip_string(bytes, i);
                continue;
            }
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' | b'}' => depth -= 1,
            b',' if depth == 0 => {
                pieces.push(&args[start..i]);
                start = i + 1;
            }
            _ => {}
        }
        i += 1;
    }
    pieces.push(&args[start..]);
    pieces
}

/// Net parenthesis depth of a line, ignoring strings.
pub fn paren_balance(text: &str) -> i32 {
    let bytes = text.as_bytes();
    let mut depth = 0;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'"' => {
                i = skip_string(bytes, i);
                continue;
            }
            b'(' => depth += 1,
            b')' => depth -= 1,
            _ => {}
        }
        i += 1;
    }
    depth
}

fn stringify(arg: &str) -> String {
    let mut out = String::with_capacity(arg.len() + 2);
    out.push('"');
    let mut last_space = false;
    for c in arg.trim().chars() {
        if c.is_whitespace() {
            if !last_space {
                out.push(' ');
            }
            last_space = true;
            continue;
        }
        last_space = false;
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

fn push_pasted(out: &mut String, text: &str) {
    let trimmed_len = out.trim_end().len();
    out.truncate(trimmed_len);
    out.push_str(text.trim());
}

/// Expands macros in lines of text against a macro table.
pub struct Expander<'a> {
    macros: &'a MacroTable,
    diagnostics: &'a mut Diagnostics,
    /// Names whose expansion is in progress
    expanding: Vec<String>,
    line: u32,
    source_number: u32,
}

impl<'a> Expander<'a> {
    pub fn new(macros: &'a MacroTable, diagnostics: &'a mut Diagnostics) -> Self {
        Self {
            macros,
            diagnostics,
            expanding: Vec::new(),
            line: 0,
            source_number: 0,
        }
    }

    /// Set the position reported by `__LINE__` and `__FILE__`.
    pub fn at(mut self, line: u32, source_number: u32) -> Self {
        self.line = line;
        self.source_number = source_number;
        self
    }

    /// Expand every macro in `text`.
    pub fn expand(&mut self, text: &str) -> String {
        self.expand_text(text)
    }

    fn expand_text(&mut self, text: &str) -> String {
        let bytes = text.as_bytes();
        let mut out = String::with_capacity(text.len());
        let mut i = 0;
        while i < bytes.len() {
            let b = bytes[i];
            if b == b'"' {
                let end = skip_string(bytes, i);
                out.push_str(&text[i..end]);
                i = end;
            } else if b.is_ascii_digit()
                || (b == b'.' && bytes.get(i + 1).is_some_and(u8::is_ascii_digit))
            {
                let end = skip_number(bytes, i);
                out.push_str(&text[i..end]);
                i = end;
            } else if is_ident_start(b) {
                let mut end = i + 1;
                while end < bytes.len() && is_ident_continue(bytes[end]) {
                    end += 1;
                }
                let name = &text[i..end];
                i = self.expand_identifier(text, name, end, &mut out);
            } else {
                let ch_len = text[i..].chars().next().map_or(1, char::len_utf8);
                out.push_str(&text[i..i + ch_len]);
                i += ch_len;
            }
        }
        out
    }

    /// Expand one identifier ending at `end`. Returns the position to resume
    /// scanning from.
    fn expand_identifier(
        &mut self,
        text: &str,
        name: &str,
        end: usize,
        out: &mut String,
    ) -> usize {
        match name {
            "__LINE__" => {
                out.push_str(&format!("{}", self.line));
                return end;
            }
            "__FILE__" => {
                out.push_str(&format!("{}", self.source_number));
                return end;
            }
            _ => {}
        }

        let macros = self.macros;
        let Some(definition) = macros.get(name) else {
            out.push_str(name);
            return end;
        };
        if self.expanding.iter().any(|n| n == name) {
            log::trace!("not re-expanding {} inside its own expansion", name);
            out.push_str(name);
            return end;
        }
        if self.expanding.len() >= MAX_EXPANSION_DEPTH {
            self.diagnostics.warning(
                Phase::Preprocess,
                self.line,
                0,
                format!("macro expansion of '{}' nested too deeply; left unexpanded", name),
            );
            out.push_str(name);
            return end;
        }

        if !definition.is_function_like() {
            let replaced = self.substitute(definition, &[]);
            out.push_str(&self.rescan(name, &replaced));
            return end;
        }

        // Function-like: needs an argument list, possibly after whitespace.
        let rest = &text[end..];
        let open = end + (rest.len() - rest.trim_start().len());
        if text.as_bytes().get(open) != Some(&b'(') {
            out.push_str(name);
            return end;
        }
        let Some(close) = find_closing_paren(text, open) else {
            self.diagnostics.error(
                Phase::Preprocess,
                self.line,
                0,
                format!("unterminated argument list invoking macro '{}'", name),
            );
            out.push_str(name);
            return end;
        };

        let inner = &text[open + 1..close];
        let mut args = split_top_level(inner);
        if args.len() == 1 && args[0].trim().is_empty() && definition.arity() == 0 {
            args.clear();
        }
        let arity = definition.arity();
        let count_ok = if definition.variadic {
            args.len() >= arity
        } else {
            args.len() == arity
        };
        if !count_ok {
            self.diagnostics.error(
                Phase::Preprocess,
                self.line,
                0,
                format!(
                    "macro '{}' expects {} argument{}, got {}",
                    name,
                    arity,
                    if arity == 1 { "" } else { "s" },
                    args.len()
                ),
            );
            out.push_str(&text[end - name.len()..=close]);
            return close + 1;
        }

        let replaced = self.substitute(definition, &args);
        out.push_str(&self.rescan(name, &replaced));
        close + 1
    }

    fn rescan(&mut self, name: &str, replaced: &str) -> String {
        log::trace!("expanding {} -> {}", name, replaced);
        self.expanding.push(String::from(name));
        let result = self.expand_text(replaced);
        self.expanding.pop();
        result
    }

    /// Build the replacement text with arguments substituted.
    fn substitute(&mut self, definition: &MacroDefinition, args: &[&str]) -> String {
        let arity = definition.arity();
        let mut out = String::new();
        for token in &definition.body {
            let raw_operand = token.paste_left || token.paste_right;
            let piece = match &token.kind {
                MacroTokenKind::Text => token.text.clone(),
                MacroTokenKind::Param(i) => {
                    let arg = args.get(*i).copied().unwrap_or("");
                    if raw_operand {
                        String::from(arg.trim())
                    } else {
                        String::from(self.expand_text(arg).trim())
                    }
                }
                MacroTokenKind::Stringify(i) => stringify(args.get(*i).copied().unwrap_or("")),
                MacroTokenKind::VaArgs => {
                    let rest = args.get(arity..).unwrap_or(&[]);
                    let joined: Vec<String> = rest
                        .iter()
                        .map(|a| {
                            if raw_operand {
                                String::from(a.trim())
                            } else {
                                String::from(self.expand_text(a).trim())
                            }
                        })
                        .collect();
                    joined.join(", ")
                }
            };
            if token.paste_right {
                push_pasted(&mut out, &piece);
            } else {
                out.push_str(&piece);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preprocess::macros::parse_define;

    fn table(defs: &[&str]) -> MacroTable {
        let mut table = MacroTable::new();
        for def in defs {
            table.define(parse_define(def).unwrap());
        }
        table
    }

    fn expand(defs: &[&str], text: &str) -> (String, Diagnostics) {
        let macros = table(defs);
        let mut diags = Diagnostics::new();
        let out = Expander::new(&macros, &mut diags).at(7, 0).expand(text);
        (out, diags)
    }

    #[test]
    fn test_function_like() {
        let (out, _) = expand(&["ADD(a,b) ((a)+(b))"], "x = ADD(1,2);");
        assert_eq!(out, "x = ((1)+(2));");
    }

    #[test]
    fn test_nested_commas_do_not_split() {
        let (out, _) = expand(&["FIRST(a, b) a"], "FIRST(f(1, 2), 3)");
        assert_eq!(out, "f(1, 2)");
    }

    #[test]
    fn test_arguments_pre_expanded() {
        let (out, _) = expand(&["ONE 1", "TWICE(x) (x + x)"], "TWICE(ONE)");
        assert_eq!(out, "(1 + 1)");
    }

    #[test]
    fn test_self_reference_left_unexpanded() {
        let (out, _) = expand(&["FOO FOO + 1"], "FOO");
        assert_eq!(out, "FOO + 1");
        let (out, _) = expand(&["A B", "B A"], "A");
        assert_eq!(out, "A");
    }

    #[test]
    fn test_stringify_and_paste() {
        let (out, _) = expand(
            &["STR(x) #x", "CAT(a, b) a ## b"],
            "STR(hello  world) CAT(tex, 2D)",
        );
        assert_eq!(out, "\"hello world\" tex2D");
    }

    #[test]
    fn test_paste_uses_raw_argument() {
        let (out, _) = expand(&["N 5", "CAT(a, b) a ## b"], "CAT(N, 1)");
        assert_eq!(out, "N1");
    }

    #[test]
    fn test_variadic() {
        let (out, _) = expand(&["CALL(f, ...) f(__VA_ARGS__)"], "CALL(g, 1, 2)");
        assert_eq!(out, "g(1, 2)");
    }

    #[test]
    fn test_function_like_without_parens() {
        let (out, _) = expand(&["F(x) x"], "float F = 1.0;");
        assert_eq!(out, "float F = 1.0;");
    }

    #[test]
    fn test_argument_count_mismatch() {
        let (out, diags) = expand(&["ADD(a,b) a+b"], "ADD(1)");
        assert_eq!(out, "ADD(1)");
        assert_eq!(diags.error_count(), 1);
    }

    #[test]
    fn test_strings_and_numbers_untouched() {
        let (out, _) = expand(&["f 2", "e 3"], "\"f\" 1.0f 1e5 f");
        assert_eq!(out, "\"f\" 1.0f 1e5 2");
    }

    #[test]
    fn test_line_and_file() {
        let (out, _) = expand(&[], "__LINE__ __FILE__");
        assert_eq!(out, "7 0");
    }

    #[test]
    fn test_zero_arg_function_like() {
        let (out, _) = expand(&["NOW() 42"], "NOW()");
        assert_eq!(out, "42");
    }
}
