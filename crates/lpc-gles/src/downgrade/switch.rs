//! `switch` to `if`/`else if` rewriting.
//!
//! ```text
//! switch (e) { case 1: case 2: a(); break; default: b(); }
//! ```
//! becomes
//! ```text
//! { int _sw0 = (e); if (_sw0 == 1 || _sw0 == 2) { a(); } else { b(); } }
//! ```
//! Fallthrough is expressed by repeating the statements of the following
//! cases. A `break` that is not the last statement of its case cannot be
//! expressed and is reported.

use alloc::{format, string::String, vec::Vec};
use core::ops::Range;

use super::StageContext;
use crate::{
    error::Phase,
    token::{matching_close, Significant, TokenBuffer, TokenKind},
};

#[derive(Debug, Default)]
struct Case {
    /// Label expressions; empty for `default`
    labels: Vec<String>,
    is_default: bool,
    body: Range<usize>,
    /// Ends in `break`, `return`, `continue` or `discard`
    terminated: bool,
}

/// Rewrite every `switch` in `buffer`. Returns the number rewritten.
pub(super) fn rewrite_switches(buffer: &mut TokenBuffer, ctx: &mut StageContext<'_>) -> usize {
    let switches: Vec<usize> = (0..buffer.len())
        .filter(|&i| buffer.kind(i) == TokenKind::Keyword && buffer.text(i) == "switch")
        .collect();
    let mut rewritten = 0;
    // Innermost first: a nested switch appears later in the stream.
    for &token in switches.iter().rev() {
        if rewrite(buffer, token, rewritten, ctx) {
            rewritten += 1;
        }
    }
    rewritten
}

fn rewrite(
    buffer: &mut TokenBuffer,
    token: usize,
    counter: usize,
    ctx: &mut StageContext<'_>,
) -> bool {
    let sig = Significant::new(buffer);
    let Some(open) = sig.next_after(token).filter(|&t| buffer.is(t, "(")) else {
        return false;
    };
    let Some(close) = matching_close(buffer, open) else {
        return false;
    };
    let Some(body_open) = sig.next_after(close).filter(|&t| buffer.is(t, "{")) else {
        return false;
    };
    let Some(body_close) = matching_close(buffer, body_open) else {
        return false;
    };

    let Some(mut cases) = parse_cases(buffer, body_open, body_close, ctx) else {
        ctx.error_at(
            Phase::Transform,
            buffer,
            token,
            "switch statement could not be rewritten",
        );
        return false;
    };
    strip_breaks(buffer, &mut cases, ctx);

    let temp = format!("_sw{}", counter);
    let selector = buffer.render_range(open..close + 1);
    let mut out = format!("{{ int {} = {}; ", temp, selector.trim());
    let mut branches = 0;
    for (i, case) in cases.iter().enumerate() {
        if case.is_default {
            continue;
        }
        let condition: Vec<String> = case
            .labels
            .iter()
            .map(|label| format!("{} == {}", temp, label))
            .collect();
        if branches > 0 {
            out.push_str(" else ");
        }
        out.push_str(&format!("if ({}) {{", condition.join(" || ")));
        out.push_str(&fallthrough_text(buffer, &cases, i));
        out.push('}');
        branches += 1;
    }
    if let Some(i) = cases.iter().position(|case| case.is_default) {
        if branches > 0 {
            out.push_str(" else ");
        }
        out.push('{');
        out.push_str(&fallthrough_text(buffer, &cases, i));
        out.push('}');
    }
    out.push_str(" }");

    ctx.warning_at(
        Phase::Transform,
        buffer,
        token,
        "switch statement rewritten as an if/else chain; performance may differ",
    );
    let range = token..body_close + 1;
    buffer.take_range_text(range.clone());
    buffer.remove_range(range);
    buffer.replace_with_kind(token, TokenKind::Keyword, &out);
    true
}

/// Statements of case `start` and of every case it falls through into.
fn fallthrough_text(buffer: &TokenBuffer, cases: &[Case], start: usize) -> String {
    let mut text = String::new();
    for case in &cases[start..] {
        text.push_str(&buffer.render_range(case.body.clone()));
        if case.terminated {
            break;
        }
    }
    text
}

fn parse_cases(
    buffer: &TokenBuffer,
    body_open: usize,
    body_close: usize,
    ctx: &mut StageContext<'_>,
) -> Option<Vec<Case>> {
    let mut cases: Vec<Case> = Vec::new();
    let mut has_statements = false;
    let mut depth = 0usize;
    let mut index = body_open + 1;
    while index < body_close {
        if !buffer.is_significant(index) {
            index += 1;
            continue;
        }
        let text = buffer.text(index);
        let kind = buffer.kind(index);
        let is_label =
            depth == 0 && kind == TokenKind::Keyword && (text == "case" || text == "default");
        if !is_label {
            if kind == TokenKind::Punctuation {
                match text {
                    "(" | "[" | "{" => depth += 1,
                    ")" | "]" | "}" => depth = depth.saturating_sub(1),
                    _ => {}
                }
            }
            has_statements = true;
            index += 1;
            continue;
        }

        let colon = (index + 1..body_close).find(|&i| buffer.is(i, ":"))?;
        let value = (text == "case").then(|| {
            let value = buffer.render_range(index + 1..colon);
            String::from(value.trim())
        });
        // Consecutive labels share one body.
        if cases.is_empty() || has_statements {
            if let Some(previous) = cases.last_mut() {
                previous.body.end = index;
            }
            cases.push(Case::default());
            has_statements = false;
        }
        let case = cases.last_mut()?;
        match value {
            Some(value) if value.is_empty() => {
                ctx.error_at(Phase::Transform, buffer, index, "case label without a value");
            }
            Some(value) => case.labels.push(value),
            None => case.is_default = true,
        }
        case.body = colon + 1..body_close;
        index = colon + 1;
    }
    Some(cases)
}

/// Remove the trailing `break` of each case and report any other `break`
/// that belongs to the switch.
fn strip_breaks(buffer: &mut TokenBuffer, cases: &mut [Case], ctx: &mut StageContext<'_>) {
    for case in cases.iter_mut() {
        let tokens: Vec<usize> = case
            .body
            .clone()
            .filter(|&i| buffer.is_significant(i))
            .collect();
        // Loops and nested switches own the breaks inside them.
        let mut loop_blocks: Vec<bool> = Vec::new();
        let mut parens = 0usize;
        let mut pending_loop = false;
        for (pos, &token) in tokens.iter().enumerate() {
            match (buffer.kind(token), buffer.text(token)) {
                (TokenKind::Keyword, "for" | "while" | "do" | "switch") => pending_loop = true,
                (TokenKind::Punctuation, "(") => parens += 1,
                (TokenKind::Punctuation, ")") => parens = parens.saturating_sub(1),
                (TokenKind::Punctuation, "{") => {
                    loop_blocks.push(pending_loop);
                    pending_loop = false;
                }
                (TokenKind::Punctuation, "}") => {
                    loop_blocks.pop();
                }
                (TokenKind::Punctuation, ";") if parens == 0 => pending_loop = false,
                (TokenKind::Keyword, "break") => {
                    if pending_loop || loop_blocks.contains(&true) {
                        continue;
                    }
                    if ends_case(buffer, &tokens, pos) {
                        case.terminated = true;
                    } else {
                        ctx.error_at(
                            Phase::Transform,
                            buffer,
                            token,
                            "'break' before the end of a case cannot be expressed without switch; it was removed",
                        );
                    }
                    buffer.remove(token);
                    if let Some(&semi) = tokens.get(pos + 1).filter(|&&t| buffer.is(t, ";")) {
                        buffer.remove(semi);
                    }
                }
                (TokenKind::Keyword, "return" | "continue" | "discard") => {
                    if ends_case(buffer, &tokens, pos) {
                        case.terminated = true;
                    }
                }
                _ => {}
            }
        }
    }
}

/// Whether the statement starting at `pos` is the last one of the case, with
/// only closing braces after it.
fn ends_case(buffer: &TokenBuffer, tokens: &[usize], pos: usize) -> bool {
    let mut parens = 0usize;
    for (offset, &token) in tokens[pos..].iter().enumerate() {
        match buffer.text(token) {
            "(" | "[" => parens += 1,
            ")" | "]" => parens = parens.saturating_sub(1),
            ";" if parens == 0 => {
                return tokens[pos + offset + 1..]
                    .iter()
                    .all(|&t| buffer.is(t, "}"));
            }
            _ => {}
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{pipeline::TranspileOptions, tier::ShaderStage, token::tokenize};

    fn run(src: &str) -> (String, StageContext<'static>) {
        static OPTIONS: spin::Lazy<TranspileOptions> = spin::Lazy::new(TranspileOptions::default);
        let (mut buffer, _) = tokenize(src).unwrap();
        let mut ctx = StageContext::new(ShaderStage::Fragment, &OPTIONS);
        rewrite_switches(&mut buffer, &mut ctx);
        (buffer.render(), ctx)
    }

    fn squash(text: &str) -> String {
        text.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn test_basic_switch() {
        let (out, ctx) = run(
            "void main() { switch (mode) { case 0: c = a; break; case 1: case 2: c = b; break; default: c = d; } }",
        );
        assert_eq!(
            squash(&out),
            "void main() { { int _sw0 = (mode); if (_sw0 == 0) { c = a; } else if (_sw0 == 1 || _sw0 == 2) { c = b; } else { c = d; } } }"
        );
        assert!(!ctx.diagnostics.has_errors());
        assert_eq!(ctx.diagnostics.warning_count(), 1);
    }

    #[test]
    fn test_fallthrough_repeats_statements() {
        let (out, _) = run("switch (i) { case 0: x += 1; case 1: x += 2; break; }");
        assert_eq!(
            squash(&out),
            "{ int _sw0 = (i); if (_sw0 == 0) { x += 1; x += 2; } else if (_sw0 == 1) { x += 2; } }"
        );
    }

    #[test]
    fn test_loop_break_is_kept() {
        let (out, ctx) = run(
            "switch (i) { case 0: for (int k = 0; k < 4; k++) { if (k == 2) break; } break; }",
        );
        assert!(squash(&out).contains("if (k == 2) break;"));
        assert!(!ctx.diagnostics.has_errors());
    }

    #[test]
    fn test_conditional_break_is_error() {
        let (_, ctx) = run("switch (i) { case 0: if (a) break; x = 1; break; }");
        assert_eq!(ctx.diagnostics.error_count(), 1);
    }

    #[test]
    fn test_nested_switch() {
        let (out, ctx) = run(
            "switch (a) { case 0: switch (b) { case 1: y = 1; break; } break; default: y = 2; }",
        );
        let out = squash(&out);
        assert!(out.contains("int _sw0 = (b);"));
        assert!(out.contains("int _sw1 = (a);"));
        assert!(!out.contains("switch"));
        assert_eq!(ctx.diagnostics.warning_count(), 2);
    }
}
