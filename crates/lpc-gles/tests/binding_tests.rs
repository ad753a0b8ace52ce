//! Attribute and output binding extraction.

use gles_test::GlesTest;
use lpc_gles::{PipelineMode, ShaderStage, Tier, TranspileOptions};

#[test]
fn test_locations_survive_layout_removal() {
    let source = r#"#version 300 es
layout(location = 3) in vec4 a_color;
layout(location = 0) in mat3 a_basis;
in vec2 a_free;
void main() { gl_Position = vec4(a_basis * a_color.xyz, a_free.x); }
"#;
    let test = GlesTest::new(source, ShaderStage::Vertex, Tier::Es100);
    test.assert_no_errors();
    test.assert_not_contains("layout");
    test.assert_binding("a_color", 3);
    test.assert_binding("a_basis", 0);
    assert_eq!(test.output.bindings.attribute_location("a_free"), None);
    assert_eq!(test.output.bindings.attributes.len(), 2);
}

#[test]
fn test_overlapping_locations() {
    let source = r#"#version 300 es
layout(location = 0) in mat4 a_model;
layout(location = 2) in vec3 a_normal;
void main() { gl_Position = a_model * vec4(a_normal, 1.0); }
"#;
    let test = GlesTest::new(source, ShaderStage::Vertex, Tier::Es100);
    test.assert_error_containing("attribute 'a_normal' at location 2 overlaps attribute 'a_model'");
    test.assert_binding("a_model", 0);
    test.assert_binding("a_normal", 2);
}

#[test]
fn test_location_overflow_warns() {
    let source = r#"#version 300 es
layout(location = 15) in mat2 a_last;
void main() { gl_Position = vec4(a_last[0], a_last[1]); }
"#;
    let test = GlesTest::new(source, ShaderStage::Vertex, Tier::Es100);
    test.assert_no_errors();
    assert!(test.output.warnings().count() >= 1);
}

#[test]
fn test_fragment_outputs_map_to_frag_data() {
    let source = r#"#version 300 es
precision mediump float;
layout(location = 0) out vec4 albedo;
layout(location = 1) out vec4 normal;
void main() {
    albedo = vec4(1.0);
    normal = vec4(0.0, 0.0, 1.0, 0.0);
}
"#;
    let test = GlesTest::new(source, ShaderStage::Fragment, Tier::Es100);
    assert_eq!(test.output.bindings.output_location("albedo"), Some((0, 0)));
    assert_eq!(test.output.bindings.output_location("normal"), Some((1, 0)));
    test.assert_contains("gl_FragData[0] = vec4(1.0);");
    test.assert_contains("gl_FragData[1] = vec4(0.0, 0.0, 1.0, 0.0);");
    test.assert_extension("GL_EXT_draw_buffers");
}

#[test]
fn test_textual_mode_extracts_bindings() {
    let source = "#version 300 es\nlayout(location = 5) in vec3 a_position;\nvoid main() { gl_Position = vec4(a_position, 1.0); }\n";
    let test = GlesTest::with_options(
        source,
        ShaderStage::Vertex,
        Tier::Es100,
        TranspileOptions::default().with_force_mode(PipelineMode::Textual),
    );
    test.assert_mode(PipelineMode::Textual);
    test.assert_binding("a_position", 5);
    test.assert_contains("attribute vec3 a_position;");
    test.assert_not_contains("layout");
}
