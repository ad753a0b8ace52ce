//! Last-resort line rewriting, used when the source cannot be tokenized.
//!
//! Only rewrites whose meaning is clear from a single line are applied: the
//! `#version` directive, `layout(...)` prefixes and the `in`/`out` storage
//! vocabulary. Sampling calls are left alone and reported.

use alloc::{
    format,
    string::{String, ToString},
    vec::Vec,
};

use crate::{
    bindings::{extract_bindings_from_lines, BindingTable},
    downgrade::StageContext,
    error::Phase,
    tier::{parse_version_directive, ShaderStage, Tier},
};

const INTERPOLATION: &[&str] = &["flat", "smooth", "noperspective", "centroid"];
const PRECISIONS: &[&str] = &["highp", "mediump", "lowp"];

/// Functions a tier-0 shader spells differently.
const SAMPLING: &[&str] = &[
    "texture",
    "textureProj",
    "textureLod",
    "textureProjLod",
    "textureGrad",
    "textureProjGrad",
    "textureOffset",
    "texelFetch",
    "textureSize",
];

/// Replace the first `#version` line with `tier`'s directive, or prepend one.
pub fn rewrite_version(source: &str, tier: Tier) -> String {
    let mut out = String::with_capacity(source.len() + 16);
    let mut replaced = false;
    for line in source.split_inclusive('\n') {
        if !replaced && parse_version_directive(line).is_some() {
            out.push_str(tier.version_directive());
            if line.ends_with('\n') {
                out.push('\n');
            }
            replaced = true;
        } else {
            out.push_str(line);
        }
    }
    if !replaced {
        out.insert_str(0, &format!("{}\n", tier.version_directive()));
    }
    out
}

/// A fragment `out` declaration that may become `gl_FragColor`.
struct FragmentOutput {
    line: usize,
    name: String,
    type_name: String,
}

/// Rewrite preprocessed `source` line by line.
pub fn transpile(
    source: &str,
    from: Tier,
    to: Tier,
    ctx: &mut StageContext<'_>,
) -> (String, BindingTable) {
    let bindings = extract_bindings_from_lines(source, ctx.stage, &mut ctx.diagnostics);
    let text = rewrite_version(source, to);
    if to != Tier::Es100 {
        if from != to {
            ctx.diagnostics.warning(
                Phase::Transform,
                0,
                0,
                format!("textual mode only rewrote the #version directive for {}", to),
            );
        }
        return (text, bindings);
    }

    let mut lines: Vec<String> = Vec::new();
    let mut outputs: Vec<FragmentOutput> = Vec::new();
    let mut has_float_precision = false;
    for (index, line) in text.split_inclusive('\n').enumerate() {
        let number = index as u32 + 1;
        let trimmed = line.trim_start();
        if trimmed.starts_with('#') {
            lines.push(line.to_string());
            continue;
        }
        if is_float_precision(trimmed) {
            has_float_precision = true;
        }
        report_sampling(trimmed, number, ctx);

        let Some(rest) = strip_layout(trimmed) else {
            lines.push(line.to_string());
            continue;
        };
        let had_layout = rest.len() != trimmed.len();
        let rest = rest.trim_start();
        // `layout(std140) uniform;` only sets defaults.
        if had_layout && rest.trim_end().trim_end_matches(';').split_whitespace().count() <= 1 {
            continue;
        }
        match rewrite_storage(rest, number, ctx) {
            Rewritten::Line(rewritten) => lines.push(rewritten),
            Rewritten::Unchanged if had_layout => lines.push(rest.to_string()),
            Rewritten::Unchanged => lines.push(line.to_string()),
            Rewritten::FragmentOutput(output) => {
                outputs.push(FragmentOutput {
                    line: lines.len(),
                    ..output
                });
                lines.push(rest.to_string());
            }
        }
    }

    let mut out = match outputs.as_slice() {
        [] => lines.concat(),
        [output] => {
            let replacement = format!("gl_FragColor{}", swizzle(&output.type_name));
            let kept: String = lines
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != output.line)
                .map(|(_, line)| line.as_str())
                .collect();
            replace_word(&kept, &output.name, &replacement)
        }
        [first, ..] => {
            ctx.diagnostics.error(
                Phase::Transform,
                first.line as u32 + 1,
                1,
                format!(
                    "{} fragment outputs cannot be rewritten in textual mode",
                    outputs.len()
                ),
            );
            lines.concat()
        }
    };

    if ctx.stage == ShaderStage::Fragment && !has_float_precision {
        let precision = format!(
            "precision {} float;\n",
            ctx.options.fragment_precision.keyword()
        );
        let at = out.find('\n').map_or(out.len(), |i| i + 1);
        out.insert_str(at, &precision);
    }
    (out, bindings)
}

enum Rewritten {
    Unchanged,
    Line(String),
    FragmentOutput(FragmentOutput),
}

/// Map the leading storage qualifier of a declaration to its tier-0 spelling.
fn rewrite_storage(line: &str, number: u32, ctx: &mut StageContext<'_>) -> Rewritten {
    let words: Vec<&str> = line.split_whitespace().collect();
    let qualifiers = words
        .iter()
        .take_while(|w| is_leading_qualifier(w))
        .count();
    let Some(storage) = words[..qualifiers]
        .iter()
        .position(|w| matches!(*w, "in" | "out"))
    else {
        return Rewritten::Unchanged;
    };

    let replacement = match (ctx.stage, words[storage]) {
        (ShaderStage::Vertex, "in") => "attribute",
        (ShaderStage::Vertex, "out") | (ShaderStage::Fragment, "in") => "varying",
        (ShaderStage::Fragment, "out") => {
            if let Some((type_name, name)) = declared_name(&words[qualifiers..]) {
                return Rewritten::FragmentOutput(FragmentOutput {
                    line: 0,
                    name,
                    type_name,
                });
            }
            return Rewritten::Unchanged;
        }
        _ => return Rewritten::Unchanged,
    };

    let mut kept: Vec<&str> = Vec::new();
    for (i, word) in words.iter().enumerate() {
        if i < qualifiers && INTERPOLATION.contains(word) {
            if *word != "smooth" {
                ctx.diagnostics.warning(
                    Phase::Transform,
                    number,
                    1,
                    format!("'{}' qualifier removed", word),
                );
            }
            continue;
        }
        kept.push(if i == storage { replacement } else { *word });
    }
    let ending = if line.ends_with('\n') { "\n" } else { "" };
    Rewritten::Line(format!("{}{}", kept.join(" "), ending))
}

fn is_leading_qualifier(word: &str) -> bool {
    matches!(word, "in" | "out" | "invariant")
        || INTERPOLATION.contains(&word)
        || PRECISIONS.contains(&word)
}

/// `(type, name)` of `type name;` or `type name[N];`.
fn declared_name(words: &[&str]) -> Option<(String, String)> {
    let type_name = words.first()?;
    let declarator = words.get(1)?.trim_end_matches(';');
    let name = declarator.split('[').next()?;
    if name.is_empty() {
        return None;
    }
    Some((type_name.to_string(), name.to_string()))
}

/// Text after a leading `layout(...)`, or the line itself without one.
fn strip_layout(line: &str) -> Option<&str> {
    let Some(rest) = line.strip_prefix("layout") else {
        return Some(line);
    };
    let rest = rest.trim_start().strip_prefix('(')?;
    let mut depth = 1usize;
    for (i, c) in rest.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&rest[i + 1..]);
                }
            }
            _ => {}
        }
    }
    None
}

fn is_float_precision(line: &str) -> bool {
    let mut words = line.split_whitespace();
    words.next() == Some("precision")
        && words.nth(1).map(|w| w.trim_end_matches(';')) == Some("float")
}

fn report_sampling(line: &str, number: u32, ctx: &mut StageContext<'_>) {
    for name in SAMPLING {
        if find_call(line, name).is_some() {
            ctx.diagnostics.error(
                Phase::Transform,
                number,
                1,
                format!("'{}' cannot be rewritten without type information", name),
            );
        }
    }
}

/// Offset of `name` used as a call in `line`.
fn find_call(line: &str, name: &str) -> Option<usize> {
    word_positions(line, name).find(|&at| line[at + name.len()..].trim_start().starts_with('('))
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Byte offsets where `word` occurs as a whole identifier.
fn word_positions<'a>(text: &'a str, word: &'a str) -> impl Iterator<Item = usize> + 'a {
    text.match_indices(word).map(|(at, _)| at).filter(move |&at| {
        let before = text[..at].chars().next_back();
        let after = text[at + word.len()..].chars().next();
        !before.is_some_and(is_ident_char) && !after.is_some_and(is_ident_char)
    })
}

fn replace_word(text: &str, from: &str, to: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for at in word_positions(text, from) {
        out.push_str(&text[last..at]);
        out.push_str(to);
        last = at + from.len();
    }
    out.push_str(&text[last..]);
    out
}

fn swizzle(type_name: &str) -> &'static str {
    match type_name {
        "float" => ".r",
        "vec2" => ".rg",
        "vec3" => ".rgb",
        _ => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::TranspileOptions;

    fn run(src: &str, stage: ShaderStage) -> (String, BindingTable, StageContext<'static>) {
        static OPTIONS: spin::Lazy<TranspileOptions> = spin::Lazy::new(TranspileOptions::default);
        let mut ctx = StageContext::new(stage, &OPTIONS);
        let (out, bindings) = transpile(src, Tier::Es300, Tier::Es100, &mut ctx);
        (out, bindings, ctx)
    }

    #[test]
    fn test_rewrite_version() {
        assert_eq!(
            rewrite_version("#version 300 es\nvoid main() {}\n", Tier::Es100),
            "#version 100\nvoid main() {}\n"
        );
        assert_eq!(
            rewrite_version("void main() {}", Tier::Es300),
            "#version 300 es\nvoid main() {}"
        );
    }

    #[test]
    fn test_vertex_storage() {
        let (out, bindings, ctx) = run(
            "#version 300 es\nlayout(location = 2) in vec3 position;\nflat out int id;\nout vec2 uv;\nvoid main() {}\n",
            ShaderStage::Vertex,
        );
        assert_eq!(
            out,
            "#version 100\nattribute vec3 position;\nvarying int id;\nvarying vec2 uv;\nvoid main() {}\n"
        );
        assert_eq!(bindings.attribute_location("position"), Some(2));
        assert!(ctx.diagnostics.contains_message("'flat' qualifier removed"));
    }

    #[test]
    fn test_single_fragment_output() {
        let (out, _, ctx) = run(
            "#version 300 es\nin vec2 uv;\nlayout(location = 0) out vec3 color;\nvoid main() { color = vec3(uv, 0.0); }\n",
            ShaderStage::Fragment,
        );
        assert_eq!(
            out,
            "#version 100\nprecision mediump float;\nvarying vec2 uv;\nvoid main() { gl_FragColor.rgb = vec3(uv, 0.0); }\n"
        );
        assert!(!ctx.diagnostics.has_errors());
    }

    #[test]
    fn test_sampling_is_reported() {
        let (out, _, ctx) = run(
            "#version 300 es\nprecision highp float;\nuniform sampler2D tex;\nout vec4 c;\nvoid main() { c = texture(tex, vec2(0.0)); }\n",
            ShaderStage::Fragment,
        );
        assert!(out.contains("texture(tex"));
        assert!(out.contains("precision highp float;"));
        assert!(ctx
            .diagnostics
            .contains_message("'texture' cannot be rewritten without type information"));
    }

    #[test]
    fn test_multiple_outputs_are_kept() {
        let (out, _, ctx) = run(
            "#version 300 es\nout vec4 a;\nout vec4 b;\nvoid main() {}\n",
            ShaderStage::Fragment,
        );
        assert!(out.contains("out vec4 a;"));
        assert_eq!(ctx.diagnostics.error_count(), 1);
    }

    #[test]
    fn test_higher_target_only_versions() {
        static OPTIONS: spin::Lazy<TranspileOptions> = spin::Lazy::new(TranspileOptions::default);
        let mut ctx = StageContext::new(ShaderStage::Fragment, &OPTIONS);
        let (out, _) = transpile(
            "#version 320 es\nsample in vec2 uv;\n",
            Tier::Es320,
            Tier::Es300,
            &mut ctx,
        );
        assert_eq!(out, "#version 300 es\nsample in vec2 uv;\n");
        assert_eq!(ctx.diagnostics.warning_count(), 1);
    }

    #[test]
    fn test_replace_word() {
        assert_eq!(replace_word("c = cc + c.x;", "c", "d"), "d = cc + d.x;");
    }
}
