//! Type-aware translation of the generic sampling built-ins for tier 0.
//!
//! The replacement for every call is chosen from the declared type of the
//! sampler argument, never from the call text alone.

use alloc::{format, string::String, vec::Vec};
use core::ops::Range;

use hashbrown::HashMap;

use crate::{
    analyze::{SamplerDim, SymbolTable, TypeInfo},
    downgrade::StageContext,
    error::Phase,
    extensions::{EXT_SHADER_TEXTURE_LOD, EXT_SHADOW_SAMPLERS, OES_TEXTURE_3D},
    tier::ShaderStage,
    token::{
        first_significant, matching_close, split_arguments, Significant, TokenBuffer, TokenKind,
    },
};

/// Resolves the declared type of a sampler named at a given token.
pub trait SamplerLookup {
    fn sampler_type(&self, name: &str, token: usize) -> Option<TypeInfo>;
}

impl SamplerLookup for SymbolTable {
    fn sampler_type(&self, name: &str, token: usize) -> Option<TypeInfo> {
        self.lookup_at(name, token)
            .filter(|symbol| symbol.ty.is_sampler())
            .map(|symbol| symbol.ty.clone())
    }
}

/// Sampler declarations guessed from `<samplerType> <name>` token pairs.
///
/// Used when no symbol table is available; ignores scoping.
#[derive(Debug, Clone, Default)]
pub struct DeclaredSamplers {
    types: HashMap<String, TypeInfo>,
}

impl DeclaredSamplers {
    pub fn scan(buffer: &TokenBuffer) -> Self {
        let sig = Significant::new(buffer);
        let mut types = HashMap::new();
        for (k, token) in sig.iter().enumerate() {
            if buffer.kind(token) != TokenKind::TypeKeyword {
                continue;
            }
            let Some(ty) = TypeInfo::from_name(buffer.text(token)).filter(TypeInfo::is_sampler)
            else {
                continue;
            };
            if let Some(name) = sig.at(k + 1).filter(|&n| buffer.kind(n) == TokenKind::Identifier) {
                types.insert(String::from(buffer.text(name)), ty);
            }
        }
        Self { types }
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

impl SamplerLookup for DeclaredSamplers {
    fn sampler_type(&self, name: &str, _token: usize) -> Option<TypeInfo> {
        self.types.get(name).cloned()
    }
}

/// Generic sampling functions and the shape of their legacy counterparts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Family {
    Texture,
    Proj,
    Lod,
    ProjLod,
    Grad,
    ProjGrad,
    TexelFetch,
    Size,
    /// `*Offset` variants: translated as `base` with the offset dropped
    Offset(&'static Family),
    Gather,
}

fn family(name: &str) -> Option<Family> {
    Some(match name {
        "texture" => Family::Texture,
        "textureProj" => Family::Proj,
        "textureLod" => Family::Lod,
        "textureProjLod" => Family::ProjLod,
        "textureGrad" => Family::Grad,
        "textureProjGrad" => Family::ProjGrad,
        "texelFetch" => Family::TexelFetch,
        "textureSize" => Family::Size,
        "textureOffset" => Family::Offset(&Family::Texture),
        "textureProjOffset" => Family::Offset(&Family::Proj),
        "textureLodOffset" => Family::Offset(&Family::Lod),
        "textureProjLodOffset" => Family::Offset(&Family::ProjLod),
        "textureGradOffset" => Family::Offset(&Family::Grad),
        "textureProjGradOffset" => Family::Offset(&Family::ProjGrad),
        "texelFetchOffset" => Family::Offset(&Family::TexelFetch),
        "textureGather" | "textureGatherOffset" | "textureGatherOffsets" => Family::Gather,
        _ => return None,
    })
}

/// Check whether `name` is a generic sampling function this module rewrites.
pub fn is_generic_sampling(name: &str) -> bool {
    family(name).is_some()
}

/// Sampler shape as far as tier 0 cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    D2,
    Cube,
    D3,
    Shadow2D,
    External,
}

/// Legacy function name and required extension for a plain sampling call.
fn legacy_name(
    family: Family,
    shape: Shape,
    stage: ShaderStage,
) -> Result<(&'static str, Option<&'static str>), &'static str> {
    let fragment = stage == ShaderStage::Fragment;
    let lod_ext = fragment.then_some(EXT_SHADER_TEXTURE_LOD);
    Ok(match (family, shape) {
        (Family::Texture, Shape::D2 | Shape::External) => ("texture2D", None),
        (Family::Texture, Shape::Cube) => ("textureCube", None),
        (Family::Texture, Shape::D3) => ("texture3D", Some(OES_TEXTURE_3D)),
        (Family::Texture, Shape::Shadow2D) => ("shadow2DEXT", Some(EXT_SHADOW_SAMPLERS)),

        (Family::Proj, Shape::D2 | Shape::External) => ("texture2DProj", None),
        (Family::Proj, Shape::D3) => ("texture3DProj", Some(OES_TEXTURE_3D)),
        (Family::Proj, Shape::Shadow2D) => ("shadow2DProjEXT", Some(EXT_SHADOW_SAMPLERS)),
        (Family::Proj, Shape::Cube) => return Err("projective sampling of a cube map"),

        (Family::Lod, Shape::D2 | Shape::External) if fragment => ("texture2DLodEXT", lod_ext),
        (Family::Lod, Shape::D2 | Shape::External) => ("texture2DLod", None),
        (Family::Lod, Shape::Cube) if fragment => ("textureCubeLodEXT", lod_ext),
        (Family::Lod, Shape::Cube) => ("textureCubeLod", None),
        (Family::Lod, Shape::D3) => ("texture3DLod", Some(OES_TEXTURE_3D)),

        (Family::ProjLod, Shape::D2 | Shape::External) if fragment => {
            ("texture2DProjLodEXT", lod_ext)
        }
        (Family::ProjLod, Shape::D2 | Shape::External) => ("texture2DProjLod", None),
        (Family::ProjLod, Shape::D3) => ("texture3DProjLod", Some(OES_TEXTURE_3D)),

        (Family::Grad, Shape::D2 | Shape::External) => {
            ("texture2DGradEXT", Some(EXT_SHADER_TEXTURE_LOD))
        }
        (Family::Grad, Shape::Cube) => ("textureCubeGradEXT", Some(EXT_SHADER_TEXTURE_LOD)),
        (Family::ProjGrad, Shape::D2 | Shape::External) => {
            ("texture2DProjGradEXT", Some(EXT_SHADER_TEXTURE_LOD))
        }
        (Family::Grad | Family::ProjGrad, Shape::D3) => return Err("gradient sampling of a 3D texture"),

        (Family::Lod | Family::ProjLod | Family::Grad | Family::ProjGrad, Shape::Shadow2D) => {
            return Err("explicit-LOD sampling of a shadow sampler")
        }
        (Family::ProjLod | Family::ProjGrad, Shape::Cube) => {
            return Err("projective sampling of a cube map")
        }
        (Family::TexelFetch | Family::Size | Family::Offset(_) | Family::Gather, _) => {
            return Err("this sampling function")
        }
    })
}

/// Rewrites generic sampling calls in place.
pub struct SamplingTranslator<'l> {
    lookup: &'l dyn SamplerLookup,
}

struct Call {
    name: usize,
    open: usize,
    close: usize,
    args: Vec<Range<usize>>,
}

impl<'l> SamplingTranslator<'l> {
    pub fn new(lookup: &'l dyn SamplerLookup) -> Self {
        Self { lookup }
    }

    /// Translate every generic sampling call in `buffer`. Returns the number
    /// of calls rewritten.
    pub fn translate(&self, buffer: &mut TokenBuffer, ctx: &mut StageContext<'_>) -> usize {
        let sig = Significant::new(buffer);
        let mut translated = 0;
        for (k, name) in sig.iter().enumerate() {
            // Tokens removed by an earlier rewrite no longer qualify.
            if buffer.kind(name) != TokenKind::BuiltinFunction {
                continue;
            }
            let Some(family) = family(buffer.text(name)) else {
                continue;
            };
            let Some(open) = sig.at(k + 1).filter(|&open| buffer.is(open, "(")) else {
                continue;
            };
            let Some(close) = matching_close(buffer, open) else {
                ctx.error_at(Phase::Texture, buffer, name, "unterminated sampling call");
                continue;
            };
            let args = split_arguments(buffer, open, close);
            let call = Call {
                name,
                open,
                close,
                args,
            };
            self.translate_call(buffer, ctx, family, &call);
            translated += 1;
        }
        log::debug!("translated {} sampling calls", translated);
        translated
    }

    fn sampler_of(
        &self,
        buffer: &TokenBuffer,
        ctx: &mut StageContext<'_>,
        call: &Call,
    ) -> (Option<String>, Shape) {
        let function = String::from(buffer.text(call.name));
        let Some(first) = call.args.first().and_then(|arg| first_significant(buffer, arg.clone()))
        else {
            ctx.error_at(
                Phase::Texture,
                buffer,
                call.name,
                format!("'{}' called without a sampler argument", function),
            );
            return (None, Shape::D2);
        };
        let sampler = String::from(buffer.text(first));
        let Some(ty) = self.lookup.sampler_type(&sampler, first) else {
            ctx.warning_at(
                Phase::Texture,
                buffer,
                first,
                format!("could not resolve sampler '{}'; assuming sampler2D", sampler),
            );
            return (Some(sampler), Shape::D2);
        };

        if ty.is_integer() {
            ctx.error_at(
                Phase::Texture,
                buffer,
                first,
                format!(
                    "integer sampler '{}' ({}) is not supported in GLSL ES 1.00",
                    sampler, ty.name
                ),
            );
        }
        let shape = match (ty.sampler_dim(), ty.is_shadow()) {
            (Some(SamplerDim::D2), false) => Shape::D2,
            (Some(SamplerDim::D2), true) => Shape::Shadow2D,
            (Some(SamplerDim::Cube), false) => Shape::Cube,
            (Some(SamplerDim::D3), false) => Shape::D3,
            (Some(SamplerDim::External), _) => Shape::External,
            (dim, shadow) => {
                let dim = dim.map_or("unknown", SamplerDim::suffix);
                ctx.error_at(
                    Phase::Texture,
                    buffer,
                    first,
                    format!(
                        "sampler '{}' of type {} has no GLSL ES 1.00 equivalent (sampler{}{})",
                        sampler,
                        ty.name,
                        dim,
                        if shadow { "Shadow" } else { "" }
                    ),
                );
                Shape::D2
            }
        };
        (Some(sampler), shape)
    }

    fn translate_call(
        &self,
        buffer: &mut TokenBuffer,
        ctx: &mut StageContext<'_>,
        family: Family,
        call: &Call,
    ) {
        let (sampler, shape) = self.sampler_of(buffer, ctx, call);
        let function = String::from(buffer.text(call.name));
        match family {
            Family::TexelFetch => self.texel_fetch(buffer, ctx, call, sampler, shape),
            Family::Size => self.texture_size(buffer, ctx, call, sampler, shape),
            Family::Offset(base) => {
                ctx.error_at(
                    Phase::Texture,
                    buffer,
                    call.name,
                    format!("'{}' has no GLSL ES 1.00 equivalent; offset dropped", function),
                );
                self.drop_trailing_args(buffer, call, call.args.len().saturating_sub(1));
                match base {
                    Family::TexelFetch => self.texel_fetch(buffer, ctx, call, sampler, shape),
                    other => self.rename(buffer, ctx, call, *other, shape),
                }
            }
            Family::Gather => {
                ctx.error_at(
                    Phase::Texture,
                    buffer,
                    call.name,
                    format!("'{}' has no GLSL ES 1.00 equivalent; sampling one texel instead", function),
                );
                self.drop_trailing_args(buffer, call, 2);
                self.rename(buffer, ctx, call, Family::Texture, shape);
            }
            plain => self.rename(buffer, ctx, call, plain, shape),
        }
    }

    fn rename(
        &self,
        buffer: &mut TokenBuffer,
        ctx: &mut StageContext<'_>,
        call: &Call,
        family: Family,
        shape: Shape,
    ) {
        let function = String::from(buffer.text(call.name));
        match legacy_name(family, shape, ctx.stage) {
            Ok((name, extension)) => {
                if let Some(extension) = extension {
                    ctx.extensions.require(extension);
                }
                buffer.replace(call.name, name);
            }
            Err(what) => {
                ctx.error_at(
                    Phase::Texture,
                    buffer,
                    call.name,
                    format!("{} ('{}') has no GLSL ES 1.00 equivalent", what, function),
                );
                let placeholder = match shape {
                    Shape::Cube => "textureCube",
                    Shape::Shadow2D => "shadow2DEXT",
                    _ => "texture2D",
                };
                if shape == Shape::Shadow2D {
                    ctx.extensions.require(EXT_SHADOW_SAMPLERS);
                }
                buffer.replace(call.name, placeholder);
            }
        }
    }

    /// Remove every argument from index `keep` on, with its leading comma.
    fn drop_trailing_args(&self, buffer: &mut TokenBuffer, call: &Call, keep: usize) {
        if keep == 0 || keep >= call.args.len() {
            return;
        }
        // The comma sits right before the first dropped argument.
        let from = call.args[keep].start - 1;
        buffer.remove_range(from..call.close);
    }

    fn size_uniform(&self, ctx: &mut StageContext<'_>, sampler: &str) -> String {
        let name = format!("{}{}", sampler, ctx.options.texture_size_suffix);
        ctx.require_uniform(&name, "vec2", sampler);
        name
    }

    /// `texelFetch(s, P, lod)` becomes a normalized 2D sample at the texel
    /// center using an injected size uniform.
    fn texel_fetch(
        &self,
        buffer: &mut TokenBuffer,
        ctx: &mut StageContext<'_>,
        call: &Call,
        sampler: Option<String>,
        shape: Shape,
    ) {
        let sampler = sampler.unwrap_or_default();
        if shape != Shape::D2 || call.args.len() < 2 {
            ctx.error_at(
                Phase::Texture,
                buffer,
                call.name,
                format!("texelFetch on '{}' has no GLSL ES 1.00 equivalent", sampler),
            );
            buffer.replace(call.name, "texture2D");
            return;
        }
        let uniform = self.size_uniform(ctx, &sampler);
        ctx.warning_at(
            Phase::Texture,
            buffer,
            call.name,
            format!(
                "texelFetch on '{}' approximated by normalized sampling with uniform '{}'; precision may be lost",
                sampler, uniform
            ),
        );
        self.drop_trailing_args(buffer, call, 2);
        let coord = call.args[1].clone();
        let (Some(first), Some(last)) = (
            first_significant(buffer, coord.clone()),
            coord.clone().rev().find(|&i| buffer.is_significant(i)),
        ) else {
            return;
        };
        buffer.insert_before(first, "(vec2(");
        buffer.insert_after(last, &format!(") + 0.5) / {}", uniform));
        buffer.replace(call.name, "texture2D");
    }

    /// `textureSize(s, lod)` becomes `ivec2(<s>_TextureSize)`.
    fn texture_size(
        &self,
        buffer: &mut TokenBuffer,
        ctx: &mut StageContext<'_>,
        call: &Call,
        sampler: Option<String>,
        shape: Shape,
    ) {
        let sampler = sampler.unwrap_or_default();
        if !matches!(shape, Shape::D2 | Shape::Cube | Shape::Shadow2D) {
            ctx.error_at(
                Phase::Texture,
                buffer,
                call.name,
                format!("textureSize on '{}' has no GLSL ES 1.00 equivalent", sampler),
            );
        }
        let uniform = self.size_uniform(ctx, &sampler);
        ctx.warning_at(
            Phase::Texture,
            buffer,
            call.name,
            format!("textureSize on '{}' replaced by uniform '{}'", sampler, uniform),
        );
        buffer.replace_with_kind(call.name, TokenKind::TypeKeyword, "ivec2");
        buffer.remove_range(call.open + 1..call.close);
        buffer.insert_before(call.close, &uniform);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{analyze::analyze, pipeline::TranspileOptions, token::tokenize};

    fn translate(src: &str, stage: ShaderStage) -> (String, StageContext<'static>) {
        static OPTIONS: spin::Lazy<TranspileOptions> = spin::Lazy::new(TranspileOptions::default);
        let (mut buffer, _) = tokenize(src).unwrap();
        let analysis = analyze(&buffer, stage);
        let mut ctx = StageContext::new(stage, &OPTIONS);
        SamplingTranslator::new(&analysis.symbols).translate(&mut buffer, &mut ctx);
        (buffer.render(), ctx)
    }

    #[test]
    fn test_dispatch_by_declared_type() {
        let (out, ctx) = translate(
            "uniform sampler2D a; uniform samplerCube b; uniform sampler2DShadow c;\n\
             void main() { texture(a, uv); texture(b, dir); texture(c, ref); }",
            ShaderStage::Fragment,
        );
        assert!(out.contains("texture2D(a, uv)"), "{}", out);
        assert!(out.contains("textureCube(b, dir)"), "{}", out);
        assert!(out.contains("shadow2DEXT(c, ref)"), "{}", out);
        assert!(ctx.extensions.contains(EXT_SHADOW_SAMPLERS));
        assert!(!ctx.diagnostics.has_errors());
    }

    #[test]
    fn test_lod_depends_on_stage() {
        let src = "uniform sampler2D a; void main() { textureLod(a, uv, 0.0); }";
        let (frag, ctx) = translate(src, ShaderStage::Fragment);
        assert!(frag.contains("texture2DLodEXT(a, uv, 0.0)"));
        assert!(ctx.extensions.contains(EXT_SHADER_TEXTURE_LOD));

        let (vert, ctx) = translate(src, ShaderStage::Vertex);
        assert!(vert.contains("texture2DLod(a, uv, 0.0)"));
        assert!(ctx.extensions.is_empty());
    }

    #[test]
    fn test_parameter_sampler_resolved_in_function_scope() {
        let (out, ctx) = translate(
            "uniform sampler2D tex;\n\
             vec4 env(samplerCube tex, vec3 d) { return texture(tex, d); }\n\
             void main() { gl_FragColor = texture(tex, vec2(0.5)); }",
            ShaderStage::Fragment,
        );
        assert!(out.contains("return textureCube(tex, d);"), "{}", out);
        assert!(out.contains("gl_FragColor = texture2D(tex, vec2(0.5));"), "{}", out);
        assert!(!ctx.diagnostics.has_errors());
    }

    #[test]
    fn test_unresolved_sampler_warns() {
        let (out, ctx) = translate("void main() { texture(mystery, uv); }", ShaderStage::Fragment);
        assert!(out.contains("texture2D(mystery, uv)"));
        assert!(!ctx.diagnostics.has_errors());
        assert!(ctx.diagnostics.contains_message("could not resolve sampler 'mystery'"));
    }

    #[test]
    fn test_integer_and_array_samplers_are_errors() {
        let (out, ctx) = translate(
            "uniform isampler2D i; uniform sampler2DArray arr;\n\
             void main() { texture(i, uv); texture(arr, uvw); }",
            ShaderStage::Fragment,
        );
        assert!(out.contains("texture2D(i, uv)"));
        assert!(out.contains("texture2D(arr, uvw)"));
        assert_eq!(ctx.diagnostics.error_count(), 2);
        assert!(ctx.diagnostics.in_phase(Phase::Texture).count() >= 2);
    }

    #[test]
    fn test_3d_gradient_is_error() {
        let (out, ctx) = translate(
            "uniform sampler3D v; void main() { textureGrad(v, p, dx, dy); texture(v, p); }",
            ShaderStage::Fragment,
        );
        assert!(ctx.diagnostics.contains_message("gradient sampling of a 3D texture"));
        assert!(out.contains("texture3D(v, p)"));
        assert!(ctx.extensions.contains(OES_TEXTURE_3D));
    }

    #[test]
    fn test_texel_fetch_approximation() {
        let (out, ctx) = translate(
            "uniform sampler2D t; void main() { gl_FragColor = texelFetch(t, ivec2(3, 4), 0); }",
            ShaderStage::Fragment,
        );
        assert!(
            out.contains("texture2D(t, (vec2(ivec2(3, 4)) + 0.5) / t_TextureSize)"),
            "{}",
            out
        );
        assert!(!ctx.diagnostics.has_errors());
        assert_eq!(ctx.diagnostics.warning_count(), 1);
        assert_eq!(ctx.required_uniforms[0].name, "t_TextureSize");
    }

    #[test]
    fn test_texture_size() {
        let (out, ctx) = translate(
            "uniform sampler2D t; void main() { ivec2 s = textureSize(t, 0); }",
            ShaderStage::Fragment,
        );
        assert!(out.contains("ivec2 s = ivec2(t_TextureSize);"), "{}", out);
        assert_eq!(ctx.required_uniforms.len(), 1);
    }

    #[test]
    fn test_nested_calls_and_comments() {
        let (out, _) = translate(
            "uniform sampler2D a; uniform samplerCube b;\n\
             // texture(a, uv) in a comment\n\
             void main() { texture(b, texture(a, uv).xyz); }",
            ShaderStage::Fragment,
        );
        assert!(out.contains("// texture(a, uv) in a comment"));
        assert!(out.contains("textureCube(b, texture2D(a, uv).xyz)"), "{}", out);
    }

    #[test]
    fn test_offset_variant_drops_offset() {
        let (out, ctx) = translate(
            "uniform sampler2D a; void main() { textureOffset(a, uv, ivec2(1, 0)); }",
            ShaderStage::Fragment,
        );
        assert_eq!(out, "uniform sampler2D a; void main() { texture2D(a, uv); }");
        assert_eq!(ctx.diagnostics.error_count(), 1);
    }

    #[test]
    fn test_declared_samplers_guess() {
        let (buffer, _) = tokenize("uniform samplerCube env; uniform float x;").unwrap();
        let guesses = DeclaredSamplers::scan(&buffer);
        assert_eq!(guesses.len(), 1);
        let ty = guesses.sampler_type("env", 0).unwrap();
        assert_eq!(ty.sampler_dim(), Some(SamplerDim::Cube));
    }
}
