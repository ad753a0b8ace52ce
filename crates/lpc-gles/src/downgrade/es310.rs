//! GLSL ES 3.10 to 3.00.

use alloc::{format, string::String, vec::Vec};

use super::{
    find_calls, remove_call_statement, replace_call,
    scan::{filter_layout, remove_statement, remove_tidy, top_level},
    tokens_named, StageContext,
};
use crate::{
    analyze::{MemoryQualifiers, TypeCategory, TypeInfo},
    error::Phase,
    tier::ShaderStage,
    token::{split_arguments, TokenBuffer, TokenKind},
};

const BARRIERS: &[&str] = &[
    "barrier",
    "memoryBarrier",
    "memoryBarrierAtomicCounter",
    "memoryBarrierBuffer",
    "memoryBarrierImage",
    "memoryBarrierShared",
    "groupMemoryBarrier",
];

const ATOMIC_COUNTER_CALLS: &[&str] = &[
    "atomicCounterIncrement",
    "atomicCounterDecrement",
    "atomicCounter",
];

const ATOMIC_MEMORY_CALLS: &[&str] = &[
    "atomicAdd",
    "atomicMin",
    "atomicMax",
    "atomicAnd",
    "atomicOr",
    "atomicXor",
    "atomicExchange",
    "atomicCompSwap",
];

/// GLSL ES 3.10 built-ins with no GLSL ES 3.00 counterpart.
const UNAVAILABLE_FUNCTIONS: &[&str] = &[
    "textureGather",
    "textureGatherOffset",
    "textureGatherOffsets",
    "bitfieldExtract",
    "bitfieldInsert",
    "bitfieldReverse",
    "bitCount",
    "findLSB",
    "findMSB",
    "uaddCarry",
    "usubBorrow",
    "umulExtended",
    "imulExtended",
    "frexp",
    "ldexp",
    "packUnorm4x8",
    "packSnorm4x8",
    "unpackUnorm4x8",
    "unpackSnorm4x8",
];

pub(super) fn downgrade(buffer: &mut TokenBuffer, ctx: &mut StageContext<'_>) {
    remove_workgroup_layouts(buffer, ctx);
    strip_shared(buffer, ctx);
    remove_barriers(buffer, ctx);
    replace_image_calls(buffer, ctx);
    replace_atomic_calls(buffer, ctx);
    remove_opaque_declarations(buffer, ctx);
    convert_storage_blocks(buffer, ctx);
    strip_unsupported_layout_keys(buffer, ctx);
    strip_memory_qualifiers(buffer, ctx);
    replace_helper_invocation(buffer, ctx);
    report_unavailable(buffer, ctx);
}

/// `layout(local_size_x = 8) in;`
fn remove_workgroup_layouts(buffer: &mut TokenBuffer, ctx: &mut StageContext<'_>) {
    for statement in top_level(buffer) {
        if statement.is_function {
            continue;
        }
        let head = statement.head(buffer);
        let workgroup = head
            .layout
            .as_ref()
            .is_some_and(|layout| layout.has_local_size());
        if workgroup && head.body + 1 == statement.len() {
            ctx.warning_at(
                Phase::Transform,
                buffer,
                statement.first(),
                "workgroup size declaration removed",
            );
            remove_statement(buffer, &statement);
        }
    }
}

fn strip_shared(buffer: &mut TokenBuffer, ctx: &mut StageContext<'_>) {
    for statement in top_level(buffer) {
        let head = statement.head(buffer);
        for &pos in &head.qualifiers {
            if statement.text(buffer, pos) != "shared" {
                continue;
            }
            let token = statement.tokens[pos];
            ctx.warning_at(
                Phase::Transform,
                buffer,
                token,
                "'shared' qualifier removed; the variable is no longer shared across invocations",
            );
            remove_tidy(buffer, token..token + 1);
        }
    }
}

fn remove_barriers(buffer: &mut TokenBuffer, ctx: &mut StageContext<'_>) {
    let calls = find_calls(buffer, |name| BARRIERS.contains(&name));
    if let Some(first) = calls.first() {
        ctx.warning_at(
            Phase::Transform,
            buffer,
            first.name,
            format!("{} barrier call(s) removed", calls.len()),
        );
    }
    for call in calls {
        remove_call_statement(buffer, call);
    }
}

fn replace_image_calls(buffer: &mut TokenBuffer, ctx: &mut StageContext<'_>) {
    for call in find_calls(buffer, |name| name.starts_with("image")) {
        if buffer.is_removed(call.name) {
            continue;
        }
        let name = String::from(buffer.text(call.name));
        let placeholder = match name.as_str() {
            "imageStore" => None,
            "imageLoad" => Some(("vec4(0.0)", TokenKind::Identifier)),
            "imageSize" => Some(("ivec2(0)", TokenKind::Identifier)),
            "imageSamples" => Some(("0", TokenKind::IntLiteral)),
            _ => Some(("0", TokenKind::IntLiteral)),
        };
        match placeholder {
            Some((text, kind)) => {
                ctx.error_at(
                    Phase::Transform,
                    buffer,
                    call.name,
                    format!("{} has no GLSL ES 3.00 equivalent; replaced by {}", name, text),
                );
                replace_call(buffer, call, kind, text);
            }
            None => {
                ctx.error_at(
                    Phase::Transform,
                    buffer,
                    call.name,
                    "imageStore has no GLSL ES 3.00 equivalent; the store was removed",
                );
                remove_call_statement(buffer, call);
            }
        }
    }
}

fn replace_atomic_calls(buffer: &mut TokenBuffer, ctx: &mut StageContext<'_>) {
    for call in find_calls(buffer, |name| ATOMIC_COUNTER_CALLS.contains(&name)) {
        if buffer.is_removed(call.name) {
            continue;
        }
        ctx.error_at(
            Phase::Transform,
            buffer,
            call.name,
            format!(
                "{} has no GLSL ES 3.00 equivalent; replaced by 0u",
                buffer.text(call.name)
            ),
        );
        replace_call(buffer, call, TokenKind::UintLiteral, "0u");
    }

    // atomicAdd(mem, v) reads `mem` without updating it.
    for call in find_calls(buffer, |name| ATOMIC_MEMORY_CALLS.contains(&name)) {
        if buffer.is_removed(call.name) {
            continue;
        }
        ctx.error_at(
            Phase::Transform,
            buffer,
            call.name,
            format!(
                "{} has no GLSL ES 3.00 equivalent; the memory is read without being updated",
                buffer.text(call.name)
            ),
        );
        let args = split_arguments(buffer, call.open, call.close);
        if let Some(second) = args.get(1) {
            let start = second.start - 1;
            buffer.take_range_text(start..call.close);
            buffer.remove_range(start..call.close);
        }
        buffer.remove(call.name);
    }
}

/// Image and atomic counter declarations.
fn remove_opaque_declarations(buffer: &mut TokenBuffer, ctx: &mut StageContext<'_>) {
    for statement in top_level(buffer) {
        if statement.is_function {
            continue;
        }
        let head = statement.head(buffer);
        let type_name = statement.text(buffer, head.body);
        let Some(ty) = TypeInfo::from_name(type_name) else {
            continue;
        };
        if !matches!(ty.category, TypeCategory::Image | TypeCategory::Atomic) {
            continue;
        }
        let names: Vec<&str> = statement
            .declarators(buffer, head.body)
            .into_iter()
            .map(|pos| statement.text(buffer, pos))
            .collect();
        let message = format!(
            "{} declaration of '{}' removed; GLSL ES 3.00 has no {}",
            type_name,
            names.join("', '"),
            if ty.category == TypeCategory::Image {
                "images"
            } else {
                "atomic counters"
            }
        );
        ctx.error_at(Phase::Transform, buffer, statement.first(), message);
        remove_statement(buffer, &statement);
    }
}

/// `buffer` blocks become `uniform` blocks; writes to them will not compile.
fn convert_storage_blocks(buffer: &mut TokenBuffer, ctx: &mut StageContext<'_>) {
    for statement in top_level(buffer) {
        if statement.is_function {
            continue;
        }
        let head = statement.head(buffer);
        let Some(storage) = head.storage else {
            continue;
        };
        if statement.text(buffer, storage) != "buffer" {
            continue;
        }
        let block = String::from(statement.text(buffer, head.body));
        ctx.error_at(
            Phase::Transform,
            buffer,
            statement.tokens[storage],
            format!(
                "shader storage block '{}' converted to a read-only uniform block",
                block
            ),
        );
        buffer.replace(statement.tokens[storage], "uniform");
        for layout in &head.layouts {
            for pos in layout.clone() {
                if statement.text(buffer, pos) == "std430" {
                    buffer.replace(statement.tokens[pos], "std140");
                }
            }
        }
    }
}

/// GLSL ES 3.00 has no `binding`, no uniform locations and no varying
/// locations.
fn strip_unsupported_layout_keys(buffer: &mut TokenBuffer, ctx: &mut StageContext<'_>) {
    let stage = ctx.stage;
    for statement in top_level(buffer) {
        if statement.is_function {
            continue;
        }
        let head = statement.head(buffer);
        let storage = statement.storage(buffer, &head).unwrap_or("");
        let drop_location = matches!(
            (storage, stage),
            ("uniform", _) | ("out", ShaderStage::Vertex) | ("in", ShaderStage::Fragment)
        );
        for layout in head.layouts.iter().rev() {
            let dropped = filter_layout(buffer, &statement, layout.clone(), |key| {
                key != "binding" && !(drop_location && key == "location")
            });
            for entry in dropped {
                ctx.warning_at(
                    Phase::Transform,
                    buffer,
                    statement.first(),
                    format!("layout qualifier '{}' removed", entry),
                );
            }
        }
    }
}

fn strip_memory_qualifiers(buffer: &mut TokenBuffer, ctx: &mut StageContext<'_>) {
    let mut removed = 0usize;
    for index in 0..buffer.len() {
        if buffer.kind(index) == TokenKind::Qualifier
            && MemoryQualifiers::from_keyword(buffer.text(index)).is_some()
        {
            remove_tidy(buffer, index..index + 1);
            removed += 1;
        }
    }
    if removed > 0 {
        ctx.diagnostics.warning(
            Phase::Transform,
            0,
            0,
            format!("{} memory qualifier(s) removed", removed),
        );
    }
}

fn replace_helper_invocation(buffer: &mut TokenBuffer, ctx: &mut StageContext<'_>) {
    for token in tokens_named(buffer, TokenKind::BuiltinVariable, "gl_HelperInvocation") {
        ctx.warning_at(
            Phase::Transform,
            buffer,
            token,
            "gl_HelperInvocation is not available in GLSL ES 3.00; read as false",
        );
        buffer.replace_with_kind(token, TokenKind::BoolLiteral, "false");
    }
}

fn report_unavailable(buffer: &mut TokenBuffer, ctx: &mut StageContext<'_>) {
    for call in find_calls(buffer, |name| UNAVAILABLE_FUNCTIONS.contains(&name)) {
        ctx.error_at(
            Phase::Transform,
            buffer,
            call.name,
            format!(
                "function '{}' is not available in GLSL ES 3.00",
                buffer.text(call.name)
            ),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::Diagnostics, pipeline::TranspileOptions, token::tokenize};

    fn run(src: &str, stage: ShaderStage) -> (String, Diagnostics) {
        static OPTIONS: spin::Lazy<TranspileOptions> = spin::Lazy::new(TranspileOptions::default);
        let (mut buffer, _) = tokenize(src).unwrap();
        let mut ctx = StageContext::new(stage, &OPTIONS);
        downgrade(&mut buffer, &mut ctx);
        (buffer.render(), ctx.diagnostics)
    }

    #[test]
    fn test_barriers_and_workgroup_removed() {
        let (out, diags) = run(
            "layout(local_size_x = 8) in;\nvoid main() { barrier(); memoryBarrierShared(); x = 1; }",
            ShaderStage::Fragment,
        );
        assert_eq!(out, "\nvoid main() { x = 1; }");
        assert!(!diags.has_errors());
    }

    #[test]
    fn test_image_calls_are_errors() {
        let (out, diags) = run(
            "layout(rgba8) readonly uniform highp image2D img;\nvoid main() { vec4 c = imageLoad(img, ivec2(0)); imageStore(img, ivec2(0), c); }",
            ShaderStage::Fragment,
        );
        assert_eq!(out, "\nvoid main() { vec4 c = vec4(0.0); }");
        assert_eq!(diags.error_count(), 3);
        assert!(diags.contains_message("imageLoad has no GLSL ES 3.00 equivalent"));
    }

    #[test]
    fn test_atomics() {
        let (out, diags) = run(
            "layout(binding = 0, offset = 0) uniform atomic_uint counter;\nvoid main() { uint n = atomicCounterIncrement(counter); uint m = atomicAdd(total, 1u); }",
            ShaderStage::Fragment,
        );
        assert_eq!(out, "\nvoid main() { uint n = 0u; uint m = (total); }");
        assert_eq!(diags.error_count(), 3);
    }

    #[test]
    fn test_storage_block_becomes_uniform() {
        let (out, diags) = run(
            "layout(std430, binding = 1) buffer Data { vec4 values[4]; };",
            ShaderStage::Vertex,
        );
        assert_eq!(out, "layout(std140) uniform Data { vec4 values[4]; };");
        assert_eq!(diags.error_count(), 1);
        assert!(diags.contains_message("layout qualifier 'binding = 1' removed"));
    }

    #[test]
    fn test_location_kept_only_where_allowed() {
        let (out, diags) = run(
            "layout(location = 0) in vec3 p;\nlayout(location = 1) out vec2 uv;\nlayout(location = 2) uniform float t;",
            ShaderStage::Vertex,
        );
        assert_eq!(out, "layout(location = 0) in vec3 p;\nout vec2 uv;\nuniform float t;");
        assert_eq!(diags.warning_count(), 2);
    }

    #[test]
    fn test_helper_invocation_and_shared() {
        let (out, diags) = run(
            "shared float cache[4];\nvoid main() { if (gl_HelperInvocation) discard; }",
            ShaderStage::Fragment,
        );
        assert_eq!(out, "float cache[4];\nvoid main() { if (false) discard; }");
        assert_eq!(diags.warning_count(), 2);
    }
}
