//! GLSL ES 3.00 to 1.00.
//!
//! The largest stage: storage vocabulary, fragment outputs, uniform blocks,
//! sampling calls, unsigned types and everything else GLSL ES 1.00 lacks.

use alloc::{
    format,
    string::{String, ToString},
    vec::Vec,
};

use super::{
    find_calls,
    scan::{remove_statement, remove_tidy, rename_global, top_level, TopLevel},
    switch, tokens_named, StageContext,
};
use crate::{
    analyze::{signed_equivalent, Precision, SamplerDim, TypeCategory, TypeInfo},
    bindings::LayoutStripper,
    error::Phase,
    extensions::{
        parse_extension_directive, tier0_rename, EXT_BLEND_FUNC_EXTENDED, EXT_DRAW_BUFFERS,
        EXT_FRAG_DEPTH, EXT_SHADOW_SAMPLERS, OES_STANDARD_DERIVATIVES, OES_TEXTURE_3D,
    },
    intrinsics::{SamplerLookup, SamplingTranslator},
    tier::ShaderStage,
    token::{matching_close, parse_int_literal, Significant, TokenBuffer, TokenKind},
};

const INTERPOLATION_QUALIFIERS: &[&str] = &["flat", "smooth", "noperspective", "centroid"];

const INTEGER_OPERATORS: &[&str] = &[
    "%", "&", "|", "^", "~", "<<", ">>", "%=", "&=", "|=", "^=", "<<=", ">>=",
];

const DERIVATIVES: &[&str] = &["dFdx", "dFdy", "fwidth"];

/// GLSL ES 3.00 built-ins with no GLSL ES 1.00 counterpart.
const UNAVAILABLE_FUNCTIONS: &[&str] = &[
    "roundEven",
    "trunc",
    "modf",
    "isnan",
    "isinf",
    "floatBitsToInt",
    "floatBitsToUint",
    "intBitsToFloat",
    "uintBitsToFloat",
    "packSnorm2x16",
    "unpackSnorm2x16",
    "packUnorm2x16",
    "unpackUnorm2x16",
    "packHalf2x16",
    "unpackHalf2x16",
    "outerProduct",
    "transpose",
    "determinant",
    "inverse",
    "sinh",
    "cosh",
    "tanh",
    "asinh",
    "acosh",
    "atanh",
];

pub(super) fn downgrade(
    buffer: &mut TokenBuffer,
    lookup: &dyn SamplerLookup,
    stripper: LayoutStripper,
    ctx: &mut StageContext<'_>,
) {
    remove_qualifier_only_layouts(buffer);
    flatten_blocks(buffer, ctx);
    if ctx.stage == ShaderStage::Fragment {
        collapse_outputs(buffer, ctx);
    }
    rewrite_storage(buffer, ctx);
    stripper.strip(buffer);
    SamplingTranslator::new(lookup).translate(buffer, ctx);
    fix_sampler_declarations(buffer, ctx);
    replace_index_reads(buffer, ctx);
    rename_frag_depth(buffer, ctx);
    demote_unsigned(buffer, ctx);
    report_integer_operators(buffer, ctx);
    check_functions(buffer, ctx);
    switch::rewrite_switches(buffer, ctx);
    ensure_precision(buffer, ctx);
    rename_extensions(buffer);
}

/// `layout(std140) uniform;` and friends only set defaults.
fn remove_qualifier_only_layouts(buffer: &mut TokenBuffer) {
    for statement in top_level(buffer) {
        if statement.is_function {
            continue;
        }
        let head = statement.head(buffer);
        if !head.layouts.is_empty() && head.body + 1 == statement.len() {
            remove_statement(buffer, &statement);
        }
    }
}

/// Uniform blocks and `in`/`out` interface blocks become one declaration per
/// member. Instance-qualified accesses are rewritten to the bare member name.
fn flatten_blocks(buffer: &mut TokenBuffer, ctx: &mut StageContext<'_>) {
    for statement in top_level(buffer) {
        if statement.is_function {
            continue;
        }
        let head = statement.head(buffer);
        let Some(storage) = statement.storage(buffer, &head) else {
            continue;
        };
        if statement.kind(buffer, head.body) != Some(TokenKind::Identifier)
            || statement.text(buffer, head.body + 1) != "{"
        {
            continue;
        }
        let block = statement.text(buffer, head.body).to_string();
        let qualifier = match (storage, ctx.stage) {
            ("uniform", _) => "uniform",
            ("in", ShaderStage::Vertex) | ("out", ShaderStage::Fragment) => {
                ctx.error_at(
                    Phase::Transform,
                    buffer,
                    statement.first(),
                    format!(
                        "{} block '{}' is not allowed in a {} shader",
                        storage,
                        block,
                        ctx.stage.name()
                    ),
                );
                continue;
            }
            ("in" | "out", _) => "varying",
            _ => continue,
        };
        let storage = storage.to_string();
        let open = head.body + 1;
        let Some(close) = statement.matching(buffer, open) else {
            continue;
        };
        let instance = (statement.kind(buffer, close + 1) == Some(TokenKind::Identifier))
            .then(|| statement.text(buffer, close + 1).to_string());
        let instance_array = instance.is_some() && statement.text(buffer, close + 2) == "[";

        let members = member_starts(buffer, &statement, open, close);
        ctx.warning_at(
            Phase::Transform,
            buffer,
            statement.first(),
            format!(
                "{} block '{}' flattened into {} individual {}(s)",
                storage,
                block,
                members.len(),
                qualifier
            ),
        );
        remove_tidy(buffer, statement.first()..statement.tokens[open] + 1);
        for pos in members {
            let first = statement.tokens[pos];
            buffer.insert_before(first, &format!("{} ", qualifier));
            if qualifier == "varying" {
                clean_varying_member(buffer, &statement, pos, close, ctx);
            }
        }
        buffer.remove_range(statement.tokens[close]..statement.last() + 1);

        if let Some(instance) = instance {
            if instance_array {
                ctx.error_at(
                    Phase::Transform,
                    buffer,
                    statement.tokens[close + 1],
                    format!(
                        "{} block array '{}' flattened; indexing into it was dropped",
                        storage, instance
                    ),
                );
            }
            strip_instance_prefix(buffer, &instance);
        }
    }
}

/// Interpolation qualifiers and integer types inside a flattened io block
/// member get the same treatment as a plain `in`/`out` declaration.
fn clean_varying_member(
    buffer: &mut TokenBuffer,
    statement: &TopLevel,
    start: usize,
    close: usize,
    ctx: &mut StageContext<'_>,
) {
    let mut pos = start;
    while pos < close {
        let token = statement.tokens[pos];
        match buffer.kind(token) {
            TokenKind::Qualifier if INTERPOLATION_QUALIFIERS.contains(&buffer.text(token)) => {
                ctx.warning_at(
                    Phase::Transform,
                    buffer,
                    token,
                    format!("'{}' qualifier removed from block member", buffer.text(token)),
                );
                remove_tidy(buffer, token..token + 1);
            }
            TokenKind::Qualifier | TokenKind::Precision => {}
            _ => break,
        }
        pos += 1;
    }
    let Some(&token) = statement.tokens.get(pos) else {
        return;
    };
    let type_name = buffer.text(token);
    if let Some(float) = TypeInfo::from_name(type_name).and_then(|ty| ty.float_equivalent()) {
        ctx.warning_at(
            Phase::Transform,
            buffer,
            token,
            format!("integer varying demoted from {} to {}", type_name, float),
        );
        buffer.replace(token, float);
    }
}

/// Positions of the first token of each member declaration.
fn member_starts(buffer: &TokenBuffer, statement: &TopLevel, open: usize, close: usize) -> Vec<usize> {
    let mut starts = Vec::new();
    let mut at_start = true;
    let mut depth = 0usize;
    for pos in open + 1..close {
        if at_start {
            starts.push(pos);
            at_start = false;
        }
        match statement.text(buffer, pos) {
            "(" | "[" | "{" => depth += 1,
            ")" | "]" | "}" => depth = depth.saturating_sub(1),
            ";" if depth == 0 => at_start = true,
            _ => {}
        }
    }
    starts
}

/// `inst.member` and `inst[i].member` become `member`.
fn strip_instance_prefix(buffer: &mut TokenBuffer, instance: &str) {
    let sig = Significant::new(buffer);
    for (k, token) in sig.iter().enumerate() {
        if buffer.kind(token) != TokenKind::Identifier || buffer.text(token) != instance {
            continue;
        }
        let mut next = sig.at(k + 1);
        if let Some(open) = next.filter(|&t| buffer.is(t, "[")) {
            next = matching_close(buffer, open).and_then(|close| sig.next_after(close));
        }
        if let Some(dot) = next.filter(|&t| buffer.is(t, ".")) {
            buffer.take_range_text(token..dot + 1);
            buffer.remove_range(token..dot + 1);
        }
    }
}

struct Output {
    name: String,
    ty: Option<TypeInfo>,
    location: i32,
    index: i32,
    array: bool,
    token: usize,
}

fn swizzle(ty: Option<&TypeInfo>) -> &'static str {
    match ty.map(|ty| (ty.category, ty.vector_len)) {
        Some((TypeCategory::Scalar, _)) => ".r",
        Some((TypeCategory::Vector, 2)) => ".rg",
        Some((TypeCategory::Vector, 3)) => ".rgb",
        _ => "",
    }
}

/// Fragment `out` variables become `gl_FragColor` or `gl_FragData[n]`.
fn collapse_outputs(buffer: &mut TokenBuffer, ctx: &mut StageContext<'_>) {
    let mut outputs = Vec::new();
    for statement in top_level(buffer) {
        if statement.is_function {
            continue;
        }
        let head = statement.head(buffer);
        if statement.storage(buffer, &head) != Some("out") {
            continue;
        }
        let names = statement.declarators(buffer, head.body);
        if names.is_empty() {
            continue;
        }
        let ty = TypeInfo::from_name(statement.text(buffer, head.body));
        let (location, index) = head
            .layout
            .as_ref()
            .map_or((-1, -1), |layout| (layout.location, layout.index));
        for (i, &pos) in names.iter().enumerate() {
            outputs.push(Output {
                name: statement.text(buffer, pos).to_string(),
                ty: ty.clone(),
                location: if location >= 0 { location.saturating_add(i as i32) } else { -1 },
                index,
                array: !statement.name_dims(buffer, pos).is_empty(),
                token: statement.tokens[pos],
            });
        }
        remove_statement(buffer, &statement);
    }
    if outputs.is_empty() {
        return;
    }

    let single = outputs.len() == 1 && !outputs[0].array && outputs[0].index <= 0;
    let mut frag_data = 0;
    for (order, output) in outputs.iter().enumerate() {
        if output.ty.as_ref().is_some_and(TypeInfo::is_integer) {
            ctx.error_at(
                Phase::Transform,
                buffer,
                output.token,
                format!(
                    "integer fragment output '{}' has no GLSL ES 1.00 equivalent",
                    output.name
                ),
            );
        }
        let target = if output.index == 1 {
            ctx.extensions.require(EXT_BLEND_FUNC_EXTENDED);
            if output.array {
                String::from("gl_SecondaryFragDataEXT")
            } else {
                String::from("gl_SecondaryFragColorEXT")
            }
        } else if single {
            String::from("gl_FragColor")
        } else if output.array {
            if output.location > 0 {
                ctx.error_at(
                    Phase::Transform,
                    buffer,
                    output.token,
                    format!(
                        "output array '{}' at location {} cannot be mapped onto gl_FragData",
                        output.name, output.location
                    ),
                );
            }
            frag_data += 1;
            String::from("gl_FragData")
        } else {
            frag_data += 1;
            let location = if output.location >= 0 {
                output.location as usize
            } else {
                order
            };
            format!("gl_FragData[{}]", location)
        };
        let replacement = if output.array {
            target
        } else {
            format!("{}{}", target, swizzle(output.ty.as_ref()))
        };
        log::debug!("fragment output {} -> {}", output.name, replacement);
        rename_global(buffer, &output.name, &replacement);
    }
    if frag_data > 0 {
        ctx.extensions.require(EXT_DRAW_BUFFERS);
        ctx.warning_at(
            Phase::Transform,
            buffer,
            outputs[0].token,
            format!(
                "{} fragment output(s) mapped to gl_FragData; requires {}",
                frag_data, EXT_DRAW_BUFFERS
            ),
        );
    }
}

/// `in`/`out` become `attribute`/`varying`.
fn rewrite_storage(buffer: &mut TokenBuffer, ctx: &mut StageContext<'_>) {
    let stage = ctx.stage;
    for statement in top_level(buffer) {
        if statement.is_function {
            continue;
        }
        let head = statement.head(buffer);
        let Some(storage) = head.storage else {
            continue;
        };
        let replacement = match (statement.text(buffer, storage), stage) {
            ("in", ShaderStage::Vertex) => "attribute",
            ("in", _) | ("out", ShaderStage::Vertex) => "varying",
            _ => continue,
        };
        let names: Vec<String> = statement
            .declarators(buffer, head.body)
            .into_iter()
            .map(|pos| statement.text(buffer, pos).to_string())
            .collect();
        let names = names.join("', '");
        buffer.replace(statement.tokens[storage], replacement);

        for &pos in &head.qualifiers {
            let word = statement.text(buffer, pos);
            if !INTERPOLATION_QUALIFIERS.contains(&word) {
                continue;
            }
            let token = statement.tokens[pos];
            ctx.warning_at(
                Phase::Transform,
                buffer,
                token,
                format!("'{}' qualifier removed from '{}'", word, names),
            );
            remove_tidy(buffer, token..token + 1);
        }

        let type_name = statement.text(buffer, head.body);
        let demoted = TypeInfo::from_name(type_name).and_then(|ty| ty.float_equivalent());
        if let Some(float) = demoted {
            let token = statement.tokens[head.body];
            ctx.warning_at(
                Phase::Transform,
                buffer,
                token,
                format!(
                    "integer {} '{}' demoted from {} to {}",
                    replacement, names, type_name, float
                ),
            );
            buffer.replace(token, float);
        }
    }
}

fn fix_sampler_declarations(buffer: &mut TokenBuffer, ctx: &mut StageContext<'_>) {
    for index in 0..buffer.len() {
        if buffer.kind(index) != TokenKind::TypeKeyword {
            continue;
        }
        let Some(mut ty) = TypeInfo::from_name(buffer.text(index)).filter(TypeInfo::is_sampler)
        else {
            continue;
        };
        if let Some(float) = ty.float_sampler_equivalent() {
            ctx.error_at(
                Phase::Texture,
                buffer,
                index,
                format!(
                    "integer sampler type {} replaced by {}; sampled values change",
                    ty.name, float
                ),
            );
            buffer.replace(index, &float);
            match TypeInfo::from_name(&float) {
                Some(float) => ty = float,
                None => continue,
            }
        }
        let placeholder = match (ty.sampler_dim(), ty.is_shadow()) {
            (Some(SamplerDim::D2 | SamplerDim::Cube | SamplerDim::External), false) => None,
            (Some(SamplerDim::D2), true) => {
                ctx.extensions.require(EXT_SHADOW_SAMPLERS);
                None
            }
            (Some(SamplerDim::D3), false) => {
                ctx.extensions.require(OES_TEXTURE_3D);
                None
            }
            (Some(SamplerDim::Cube), true) => Some("samplerCube"),
            _ => Some("sampler2D"),
        };
        if let Some(placeholder) = placeholder {
            ctx.error_at(
                Phase::Texture,
                buffer,
                index,
                format!(
                    "sampler type {} has no GLSL ES 1.00 equivalent; replaced by {}",
                    ty.name, placeholder
                ),
            );
            buffer.replace(index, placeholder);
        }
    }
}

fn replace_index_reads(buffer: &mut TokenBuffer, ctx: &mut StageContext<'_>) {
    for name in ["gl_VertexID", "gl_InstanceID"] {
        for token in tokens_named(buffer, TokenKind::BuiltinVariable, name) {
            ctx.error_at(
                Phase::Transform,
                buffer,
                token,
                format!("{} is not available in GLSL ES 1.00; read as 0", name),
            );
            buffer.replace_with_kind(token, TokenKind::IntLiteral, "0");
        }
    }
}

fn rename_frag_depth(buffer: &mut TokenBuffer, ctx: &mut StageContext<'_>) {
    let tokens = tokens_named(buffer, TokenKind::BuiltinVariable, "gl_FragDepth");
    let Some(&first) = tokens.first() else {
        return;
    };
    ctx.extensions.require(EXT_FRAG_DEPTH);
    ctx.warning_at(
        Phase::Transform,
        buffer,
        first,
        format!("gl_FragDepth renamed to gl_FragDepthEXT; requires {}", EXT_FRAG_DEPTH),
    );
    for token in tokens {
        buffer.replace(token, "gl_FragDepthEXT");
    }
}

/// `uint`/`uvecN` become `int`/`ivecN` and `u` literal suffixes go away.
fn demote_unsigned(buffer: &mut TokenBuffer, ctx: &mut StageContext<'_>) {
    let mut first = None;
    for index in 0..buffer.len() {
        match buffer.kind(index) {
            TokenKind::TypeKeyword => {
                if let Some(signed) = signed_equivalent(buffer.text(index)) {
                    buffer.replace(index, signed);
                    first.get_or_insert(index);
                }
            }
            TokenKind::UintLiteral => {
                let text = buffer.text(index);
                if parse_int_literal(text).is_some_and(|v| v > i32::MAX as u64) {
                    ctx.error_at(
                        Phase::Transform,
                        buffer,
                        index,
                        format!("unsigned literal {} does not fit in a signed int", text),
                    );
                }
                let signed = String::from(text.trim_end_matches(['u', 'U']));
                buffer.replace_with_kind(index, TokenKind::IntLiteral, &signed);
                first.get_or_insert(index);
            }
            _ => {}
        }
    }
    if let Some(first) = first {
        ctx.warning_at(
            Phase::Transform,
            buffer,
            first,
            "unsigned integer types replaced by signed equivalents",
        );
    }
}

fn report_integer_operators(buffer: &TokenBuffer, ctx: &mut StageContext<'_>) {
    for index in 0..buffer.len() {
        if buffer.kind(index) == TokenKind::Operator
            && INTEGER_OPERATORS.contains(&buffer.text(index))
        {
            ctx.error_at(
                Phase::Transform,
                buffer,
                index,
                format!(
                    "operator '{}' is not available in GLSL ES 1.00",
                    buffer.text(index)
                ),
            );
        }
    }
}

fn check_functions(buffer: &mut TokenBuffer, ctx: &mut StageContext<'_>) {
    let derivatives = find_calls(buffer, |name| DERIVATIVES.contains(&name));
    if let Some(call) = derivatives.first() {
        if ctx.stage == ShaderStage::Fragment {
            ctx.extensions.require(OES_STANDARD_DERIVATIVES);
        } else {
            ctx.error_at(
                Phase::Transform,
                buffer,
                call.name,
                "derivative functions are only available in fragment shaders",
            );
        }
    }

    // round(x) becomes floor((x) + 0.5); ties round up instead of either way.
    for call in find_calls(buffer, |name| name == "round") {
        ctx.warning_at(
            Phase::Transform,
            buffer,
            call.name,
            "round() approximated by floor(x + 0.5)",
        );
        buffer.replace(call.name, "floor");
        buffer.insert_after(call.open, "(");
        buffer.insert_before(call.close, ") + 0.5");
    }

    for call in find_calls(buffer, |name| UNAVAILABLE_FUNCTIONS.contains(&name)) {
        ctx.error_at(
            Phase::Transform,
            buffer,
            call.name,
            format!(
                "function '{}' is not available in GLSL ES 1.00",
                buffer.text(call.name)
            ),
        );
    }
}

/// Default precision statements, declared or requested.
fn ensure_precision(buffer: &TokenBuffer, ctx: &mut StageContext<'_>) {
    let sig = Significant::new(buffer);
    let mut float = false;
    let mut int = false;
    for (k, token) in sig.iter().enumerate() {
        if buffer.kind(token) != TokenKind::Precision || buffer.text(token) != "precision" {
            continue;
        }
        match sig.at(k + 2).map(|t| buffer.text(t)) {
            Some("float") => float = true,
            Some("int") => int = true,
            _ => {}
        }
    }

    let (float_precision, int_precision) = match ctx.stage {
        ShaderStage::Fragment => (ctx.options.fragment_precision, Precision::Mediump),
        _ => (Precision::Highp, Precision::Highp),
    };
    if !float {
        if ctx.stage == ShaderStage::Fragment && float_precision == Precision::Highp {
            ctx.prelude.extend(
                [
                    "#ifdef GL_FRAGMENT_PRECISION_HIGH",
                    "precision highp float;",
                    "#else",
                    "precision mediump float;",
                    "#endif",
                ]
                .map(String::from),
            );
        } else {
            ctx.prelude
                .push(format!("precision {} float;", float_precision.keyword()));
        }
    }
    if !int {
        ctx.prelude
            .push(format!("precision {} int;", int_precision.keyword()));
    }
}

fn rename_extensions(buffer: &mut TokenBuffer) {
    for index in 0..buffer.len() {
        if buffer.kind(index) != TokenKind::Directive {
            continue;
        }
        let Some((name, behavior)) = parse_extension_directive(buffer.text(index)) else {
            continue;
        };
        if let Some(renamed) = tier0_rename(name) {
            let text = format!("#extension {} : {}", renamed, behavior);
            buffer.replace(index, &text);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        bindings::extract_bindings,
        downgrade::finish,
        intrinsics::DeclaredSamplers,
        pipeline::TranspileOptions,
        tier::Tier,
        token::tokenize,
    };

    static OPTIONS: spin::Lazy<TranspileOptions> = spin::Lazy::new(TranspileOptions::default);

    fn run(src: &str, stage: ShaderStage) -> (String, StageContext<'static>) {
        let (mut buffer, _) = tokenize(src).unwrap();
        let mut ctx = StageContext::new(stage, &OPTIONS);
        let lookup = DeclaredSamplers::scan(&buffer);
        let (_, stripper) = extract_bindings(&buffer, stage, &mut ctx.diagnostics);
        downgrade(&mut buffer, &lookup, stripper, &mut ctx);
        finish(&mut buffer, Tier::Es100, &ctx);
        (buffer.render(), ctx)
    }

    #[test]
    fn test_minimal_fragment_shader() {
        let (out, ctx) = run(
            "#version 300 es\nin vec2 vUv; uniform sampler2D tex; out vec4 o;\nvoid main(){ o = texture(tex, vUv); }",
            ShaderStage::Fragment,
        );
        assert!(out.starts_with("#version 100\n"));
        assert!(out.contains("varying vec2 vUv;"));
        assert!(out.contains("precision mediump float;"));
        assert!(out.contains("gl_FragColor = texture2D(tex, vUv);"));
        assert!(!out.contains("in vec2"));
        assert!(!out.contains("out vec4"));
        assert!(!ctx.diagnostics.has_errors());
    }

    #[test]
    fn test_vertex_storage_and_layouts() {
        let (out, ctx) = run(
            "#version 300 es\nlayout(location = 0) in vec3 position;\nflat out ivec2 ids;\nvoid main() { gl_Position = vec4(position, 1.0); }",
            ShaderStage::Vertex,
        );
        assert!(out.contains("attribute vec3 position;"));
        assert!(out.contains("varying vec2 ids;"));
        assert!(!out.contains("layout"));
        assert!(!out.contains("flat"));
        assert!(out.contains("precision highp float;"));
        assert!(ctx.diagnostics.contains_message("'flat' qualifier removed from 'ids'"));
        assert!(ctx.diagnostics.contains_message("demoted from ivec2 to vec2"));
    }

    #[test]
    fn test_multiple_outputs_use_frag_data() {
        let (out, ctx) = run(
            "#version 300 es\nprecision mediump float;\nlayout(location = 0) out vec4 color;\nlayout(location = 1) out vec3 normal;\nvoid main() { color = vec4(1.0); normal = vec3(0.0); }",
            ShaderStage::Fragment,
        );
        assert!(out.contains("gl_FragData[0] = vec4(1.0);"));
        assert!(out.contains("gl_FragData[1].rgb = vec3(0.0);"));
        assert!(ctx.extensions.contains(EXT_DRAW_BUFFERS));
        assert!(out.contains("#extension GL_EXT_draw_buffers : require"));
        assert_eq!(ctx.diagnostics.error_count(), 0);
    }

    #[test]
    fn test_uniform_block_flattened() {
        let (out, ctx) = run(
            "#version 300 es\nlayout(std140) uniform Camera { mat4 view; highp vec3 eye; } cam;\nvoid main() { gl_Position = cam.view * vec4(cam.eye, 1.0); }",
            ShaderStage::Vertex,
        );
        assert!(out.contains("uniform mat4 view;"));
        assert!(out.contains("uniform highp vec3 eye;"));
        assert!(out.contains("gl_Position = view * vec4(eye, 1.0);"));
        assert!(!out.contains("Camera"));
        assert!(ctx.diagnostics.contains_message("uniform block 'Camera' flattened"));
    }

    #[test]
    fn test_prelude_precedes_flattened_members() {
        let (out, _) = run(
            "#version 300 es\nuniform Camera { mat4 view; highp vec3 eye; };\nvoid main() { gl_Position = view * vec4(eye, 1.0); }",
            ShaderStage::Vertex,
        );
        assert!(
            out.contains("precision highp float;\nprecision highp int;\nuniform mat4 view; uniform highp vec3 eye;"),
            "{}",
            out
        );
        assert!(!out.contains("uniform precision"));
    }

    #[test]
    fn test_io_block_flattened() {
        let (out, ctx) = run(
            "#version 300 es\nin vec2 p;\nout VData { flat ivec2 id; vec2 uv; } vo;\nvoid main() { vo.uv = p; vo.id = ivec2(1); gl_Position = vec4(p, 0.0, 1.0); }",
            ShaderStage::Vertex,
        );
        assert!(out.contains("varying vec2 id; varying vec2 uv;"), "{}", out);
        assert!(out.contains("uv = p; id = ivec2(1);"));
        assert!(!out.contains("VData"));
        assert!(!out.contains("vo."));
        assert!(ctx.diagnostics.contains_message("out block 'VData' flattened into 2 individual varying(s)"));
        assert!(ctx.diagnostics.contains_message("'flat' qualifier removed from block member"));
        assert!(ctx.diagnostics.contains_message("demoted from ivec2 to vec2"));
    }

    #[test]
    fn test_vertex_input_block_is_error() {
        let (_, ctx) = run(
            "#version 300 es\nin Attribs { vec3 position; } a;\nvoid main() { gl_Position = vec4(a.position, 1.0); }",
            ShaderStage::Vertex,
        );
        assert!(ctx.diagnostics.contains_message("in block 'Attribs' is not allowed in a vertex shader"));
    }

    #[test]
    fn test_shadowed_output_not_renamed() {
        let (out, _) = run(
            "#version 300 es\nprecision mediump float;\nout vec4 color;\nvoid helper(out vec4 color) { color = vec4(1.0); }\nvoid main() { helper(color); }",
            ShaderStage::Fragment,
        );
        assert!(out.contains("void helper(out vec4 color) { color = vec4(1.0); }"), "{}", out);
        assert!(out.contains("helper(gl_FragColor);"));
        assert!(!out.contains("out vec4 gl_FragColor"));
    }

    #[test]
    fn test_index_reads_and_unsigned() {
        let (out, ctx) = run(
            "#version 300 es\nvoid main() { uint i = 3u; float f = float(gl_VertexID) + float(i); gl_Position = vec4(f); }",
            ShaderStage::Vertex,
        );
        assert!(out.contains("int i = 3;"));
        assert!(out.contains("float(0)"));
        assert_eq!(ctx.diagnostics.error_count(), 1);
        assert!(ctx.diagnostics.contains_message("gl_VertexID is not available"));
    }

    #[test]
    fn test_sampler_declarations() {
        let (out, ctx) = run(
            "#version 300 es\nprecision mediump float;\nuniform sampler2DShadow depth;\nuniform isampler2D ids;\nuniform sampler2DArray layers;\nvoid main() {}",
            ShaderStage::Fragment,
        );
        assert!(out.contains("uniform sampler2D ids;"));
        assert!(out.contains("uniform sampler2D layers;"));
        assert!(ctx.extensions.contains(EXT_SHADOW_SAMPLERS));
        assert_eq!(ctx.diagnostics.error_count(), 2);
    }

    #[test]
    fn test_integer_operators_and_derivatives() {
        let (out, ctx) = run(
            "#version 300 es\nprecision mediump float;\nvoid main() { int a = 7 % 2; float w = fwidth(1.0); float r = round(w); }",
            ShaderStage::Fragment,
        );
        assert!(ctx.diagnostics.contains_message("operator '%' is not available"));
        assert!(ctx.extensions.contains(OES_STANDARD_DERIVATIVES));
        assert!(out.contains("floor((w) + 0.5)"));
    }

    #[test]
    fn test_frag_depth_and_switch() {
        let (out, ctx) = run(
            "#version 300 es\nprecision mediump float;\nuniform int mode;\nout vec4 c;\nvoid main() { switch (mode) { case 0: c = vec4(0.0); break; default: c = vec4(1.0); } gl_FragDepth = 0.5; }",
            ShaderStage::Fragment,
        );
        assert!(out.contains("gl_FragDepthEXT = 0.5;"));
        assert!(out.contains("#extension GL_EXT_frag_depth : require"));
        assert!(out.contains("if (_sw0 == 0)"));
        assert!(out.contains("gl_FragColor = vec4(0.0);"));
        assert!(!out.contains("switch"));
        assert!(!ctx.diagnostics.has_errors());
    }

    #[test]
    fn test_highp_fragment_precision_guard() {
        static HIGHP: spin::Lazy<TranspileOptions> = spin::Lazy::new(|| {
            TranspileOptions::default().with_fragment_precision(Precision::Highp)
        });
        let (buffer, _) = tokenize("#version 300 es\nvoid main() {}").unwrap();
        let mut ctx = StageContext::new(ShaderStage::Fragment, &HIGHP);
        ensure_precision(&buffer, &mut ctx);
        assert_eq!(ctx.prelude[0], "#ifdef GL_FRAGMENT_PRECISION_HIGH");
        assert_eq!(ctx.prelude[1], "precision highp float;");
        assert_eq!(ctx.prelude.last().map(String::as_str), Some("precision mediump int;"));
    }

    #[test]
    fn test_extension_rename() {
        let (out, _) = run(
            "#version 300 es\n#extension GL_OES_EGL_image_external_essl3 : require\nprecision mediump float;\nuniform samplerExternalOES cam;\nvoid main() { gl_FragColor = texture(cam, vec2(0.5)); }",
            ShaderStage::Fragment,
        );
        assert!(out.contains("#extension GL_OES_EGL_image_external : require"));
        assert!(out.contains("texture2D(cam, vec2(0.5))"));
    }
}
