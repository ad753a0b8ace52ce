//! Sampling-function dispatch by declared sampler type.

use gles_test::GlesTest;
use lpc_gles::{PipelineMode, ShaderStage, Tier, TranspileOptions};

fn fragment(declarations: &str, body: &str) -> String {
    format!(
        "#version 300 es\nprecision mediump float;\n{}\nin vec2 uv;\nout vec4 color;\nvoid main() {{\n{}\n}}\n",
        declarations, body
    )
}

#[test]
fn test_same_call_different_samplers() {
    let source = fragment(
        "uniform sampler2D flat2d;\nuniform samplerCube cube;\nuniform sampler2DShadow shadow;",
        "color = texture(flat2d, uv) + texture(cube, vec3(uv, 1.0)) + vec4(texture(shadow, vec3(uv, 0.5)));",
    );
    let test = GlesTest::new(&source, ShaderStage::Fragment, Tier::Es100);
    test.assert_no_errors();
    test.assert_contains("texture2D(flat2d, uv)");
    test.assert_contains("textureCube(cube, vec3(uv, 1.0))");
    test.assert_contains("shadow2DEXT(shadow, vec3(uv, 0.5))");
    test.assert_extension("GL_EXT_shadow_samplers");
}

#[test]
fn test_lod_requires_extension_in_fragment_only() {
    let source = fragment(
        "uniform sampler2D tex;",
        "color = textureLod(tex, uv, 2.0);",
    );
    let test = GlesTest::new(&source, ShaderStage::Fragment, Tier::Es100);
    test.assert_contains("texture2DLodEXT(tex, uv, 2.0)");
    test.assert_extension("GL_EXT_shader_texture_lod");

    let vertex = "#version 300 es\nuniform sampler2D tex;\nin vec2 uv;\nout vec4 tint;\nvoid main() { tint = textureLod(tex, uv, 0.0); gl_Position = vec4(uv, 0.0, 1.0); }\n";
    let test = GlesTest::new(vertex, ShaderStage::Vertex, Tier::Es100);
    test.assert_no_errors();
    test.assert_contains("texture2DLod(tex, uv, 0.0)");
    assert!(test.output.extensions.is_empty(), "{:?}", test.output.extensions);
}

#[test]
fn test_parameter_shadows_global_sampler() {
    let source = fragment(
        "uniform sampler2D tex;\nuniform samplerCube env;\nvec4 look(samplerCube tex, vec3 d) { return texture(tex, d); }",
        "color = texture(tex, uv) + look(env, vec3(uv, 1.0));",
    );
    let test = GlesTest::new(&source, ShaderStage::Fragment, Tier::Es100);
    test.assert_mode(PipelineMode::Full);
    test.assert_contains("return textureCube(tex, d);");
    test.assert_contains("texture2D(tex, uv)");
}

#[test]
fn test_3d_sampler_requires_extension() {
    let source = fragment(
        "uniform highp sampler3D volume;",
        "color = texture(volume, vec3(uv, 0.25));",
    );
    let test = GlesTest::new(&source, ShaderStage::Fragment, Tier::Es100);
    test.assert_contains("texture3D(volume, vec3(uv, 0.25))");
    test.assert_extension("GL_OES_texture_3D");
}

#[test]
fn test_array_sampler_is_error() {
    let source = fragment(
        "uniform mediump sampler2DArray layers;",
        "color = texture(layers, vec3(uv, 1.0));",
    );
    let test = GlesTest::new(&source, ShaderStage::Fragment, Tier::Es100);
    test.assert_error_containing("layers");
    test.assert_not_contains("texture(layers");
}

#[test]
fn test_texel_fetch_injects_size_uniform() {
    let source = fragment(
        "uniform sampler2D data;",
        "color = texelFetch(data, ivec2(3, 4), 0);",
    );
    let test = GlesTest::new(&source, ShaderStage::Fragment, Tier::Es100);
    test.assert_no_errors();
    test.assert_contains("uniform vec2 data_TextureSize;");
    test.assert_contains("texture2D(data, (vec2(ivec2(3, 4)) + 0.5) / data_TextureSize)");
    assert_eq!(test.output.required_uniforms.len(), 1);
    assert_eq!(test.output.required_uniforms[0].sampler, "data");
}

#[test]
fn test_texture_size_suffix_option() {
    let source = fragment(
        "uniform sampler2D data;",
        "color = vec4(vec2(textureSize(data, 0)), 0.0, 1.0);",
    );
    let test = GlesTest::with_options(
        &source,
        ShaderStage::Fragment,
        Tier::Es100,
        TranspileOptions::default().with_texture_size_suffix("Size"),
    );
    test.assert_contains("uniform vec2 dataSize;");
    test.assert_contains("ivec2(dataSize)");
}

#[test]
fn test_token_only_mode_still_dispatches() {
    let source = fragment(
        "uniform samplerCube env;",
        "color = texture(env, vec3(uv, 1.0));",
    );
    let test = GlesTest::with_options(
        &source,
        ShaderStage::Fragment,
        Tier::Es100,
        TranspileOptions::default().with_force_mode(PipelineMode::TokenOnly),
    );
    test.assert_mode(PipelineMode::TokenOnly);
    test.assert_contains("textureCube(env, vec3(uv, 1.0))");
}
