//! GLSL ES 3.20 to 3.10.

use alloc::format;

use super::{
    find_calls, is_assigned, remove_statement_from,
    scan::{remove_statement, remove_tidy, top_level},
    tokens_named, StageContext,
};
use crate::{
    error::Phase,
    token::{split_arguments, TokenBuffer, TokenKind},
};

/// Tier-3 built-in inputs and the constant each read becomes.
const FALLBACK_READS: &[(&str, &str, TokenKind)] = &[
    ("gl_PrimitiveID", "0", TokenKind::IntLiteral),
    ("gl_Layer", "0", TokenKind::IntLiteral),
    ("gl_ViewportIndex", "0", TokenKind::IntLiteral),
    ("gl_SampleID", "0", TokenKind::IntLiteral),
    ("gl_SamplePosition", "vec2(0.5)", TokenKind::Identifier),
];

const INTERPOLATE_AT: &[&str] = &[
    "interpolateAtCentroid",
    "interpolateAtSample",
    "interpolateAtOffset",
];

pub(super) fn downgrade(buffer: &mut TokenBuffer, ctx: &mut StageContext<'_>) {
    remove_layer_writes(buffer, ctx);
    neutralize_reads(buffer, ctx);
    strip_qualifiers(buffer, ctx);
    remove_blend_support(buffer, ctx);
    unwrap_interpolation(buffer, ctx);
}

/// `gl_Layer = ...;` is only meaningful in geometry shaders.
fn remove_layer_writes(buffer: &mut TokenBuffer, ctx: &mut StageContext<'_>) {
    for token in tokens_named(buffer, TokenKind::BuiltinVariable, "gl_Layer") {
        if !is_assigned(buffer, token) {
            continue;
        }
        ctx.warning_at(
            Phase::Transform,
            buffer,
            token,
            "write to gl_Layer removed; layered rendering needs GLSL ES 3.20",
        );
        remove_statement_from(buffer, token);
    }
}

fn neutralize_reads(buffer: &mut TokenBuffer, ctx: &mut StageContext<'_>) {
    for &(name, value, kind) in FALLBACK_READS {
        for token in tokens_named(buffer, TokenKind::BuiltinVariable, name) {
            ctx.warning_at(
                Phase::Transform,
                buffer,
                token,
                format!("{} is not available below GLSL ES 3.20; read as {}", name, value),
            );
            buffer.replace_with_kind(token, kind, value);
        }
    }
}

fn strip_qualifiers(buffer: &mut TokenBuffer, ctx: &mut StageContext<'_>) {
    for index in 0..buffer.len() {
        if buffer.kind(index) != TokenKind::Qualifier {
            continue;
        }
        let word = buffer.text(index);
        if word != "precise" && word != "sample" {
            continue;
        }
        ctx.warning_at(
            Phase::Transform,
            buffer,
            index,
            format!("'{}' qualifier removed", word),
        );
        remove_tidy(buffer, index..index + 1);
    }
}

/// `layout(blend_support_*) out;`
fn remove_blend_support(buffer: &mut TokenBuffer, ctx: &mut StageContext<'_>) {
    for statement in top_level(buffer) {
        if statement.is_function {
            continue;
        }
        let head = statement.head(buffer);
        let qualifier_only = head.body + 1 == statement.len();
        let blend = head.layout.as_ref().is_some_and(|layout| {
            layout
                .other
                .iter()
                .any(|(key, _)| key.starts_with("blend_support"))
        });
        if qualifier_only && blend {
            ctx.warning_at(
                Phase::Transform,
                buffer,
                statement.first(),
                "advanced blend equation layout removed",
            );
            remove_statement(buffer, &statement);
        }
    }
}

/// `interpolateAt*(v, ...)` becomes `(v)`.
fn unwrap_interpolation(buffer: &mut TokenBuffer, ctx: &mut StageContext<'_>) {
    for call in find_calls(buffer, |name| INTERPOLATE_AT.contains(&name)) {
        if buffer.is_removed(call.name) {
            continue;
        }
        ctx.warning_at(
            Phase::Transform,
            buffer,
            call.name,
            format!(
                "{} replaced by the plain interpolated value",
                buffer.text(call.name)
            ),
        );
        let args = split_arguments(buffer, call.open, call.close);
        if let Some(extra) = args.get(1) {
            // From the comma after the first argument to the last argument.
            let start = extra.start - 1;
            buffer.take_range_text(start..call.close);
            buffer.remove_range(start..call.close);
        }
        buffer.remove(call.name);
    }
}

#[cfg(test)]
mod tests {
    use alloc::string::String;

    use super::*;
    use crate::{pipeline::TranspileOptions, tier::ShaderStage, token::tokenize};

    fn run(src: &str) -> (String, usize, usize) {
        static OPTIONS: spin::Lazy<TranspileOptions> = spin::Lazy::new(TranspileOptions::default);
        let (mut buffer, _) = tokenize(src).unwrap();
        let mut ctx = StageContext::new(ShaderStage::Fragment, &OPTIONS);
        downgrade(&mut buffer, &mut ctx);
        (
            buffer.render(),
            ctx.diagnostics.error_count(),
            ctx.diagnostics.warning_count(),
        )
    }

    #[test]
    fn test_builtin_reads_become_constants() {
        let (out, errors, warnings) =
            run("void main() { int p = gl_PrimitiveID; vec2 s = gl_SamplePosition; }");
        assert_eq!(out, "void main() { int p = 0; vec2 s = vec2(0.5); }");
        assert_eq!(errors, 0);
        assert_eq!(warnings, 2);
    }

    #[test]
    fn test_layer_write_removed() {
        let (out, _, warnings) = run("void main() { gl_Layer = 2; x = 1; }");
        assert_eq!(out, "void main() { x = 1; }");
        assert_eq!(warnings, 1);
    }

    #[test]
    fn test_qualifiers_and_blend_layout() {
        let (out, errors, warnings) =
            run("layout(blend_support_multiply) out;\nsample in vec2 uv;\nprecise out vec4 c;");
        assert_eq!(out, "\nin vec2 uv;\nout vec4 c;");
        assert_eq!(errors, 0);
        assert_eq!(warnings, 3);
    }

    #[test]
    fn test_interpolate_at() {
        let (out, _, warnings) = run(
            "void main() { vec2 a = interpolateAtOffset(uv, vec2(0.1, 0.2)); vec2 b = interpolateAtCentroid(uv); }",
        );
        assert_eq!(out, "void main() { vec2 a = (uv); vec2 b = (uv); }");
        assert_eq!(warnings, 2);
    }
}
