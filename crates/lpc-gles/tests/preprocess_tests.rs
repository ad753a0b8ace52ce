//! Preprocessing through the full pipeline.

use gles_test::GlesTest;
use lpc_gles::{MemoryIncludes, ShaderStage, Tier, TranspileOptions, TranspileRequest};

const HEADER: &str = "#version 300 es\nprecision mediump float;\n";

#[test]
fn test_object_and_function_macros() {
    let source = format!(
        "{}#define SCALE 2.0\n#define MUL(a, b) ((a) * (b))\nuniform float x;\nout vec4 c;\nvoid main() {{ c = vec4(MUL(x, SCALE)); }}\n",
        HEADER
    );
    let test = GlesTest::new(&source, ShaderStage::Fragment, Tier::Es100);
    test.assert_no_errors();
    assert!(test.compact().contains("gl_FragColor=vec4(((x)*(2.0)));"), "{}", test.source());
}

#[test]
fn test_nested_arguments_split_on_top_level_commas() {
    let source = format!(
        "{}#define FIRST(a, b) a\nout vec4 c;\nvoid main() {{ c = FIRST(vec4(1.0, 2.0, 3.0, 4.0), 0.0); }}\n",
        HEADER
    );
    let test = GlesTest::new(&source, ShaderStage::Fragment, Tier::Es100);
    assert!(test.compact().contains("gl_FragColor=vec4(1.0,2.0,3.0,4.0);"), "{}", test.source());
}

#[test]
fn test_conditionals_with_predefined_macro() {
    let source = format!(
        "{}#if defined(FOO) && VALUE > 1\nconst float a = 1.0;\n#elif VALUE == 2\nconst float a = 2.0;\n#else\nconst float a = 3.0;\n#endif\nvoid main() {{}}\n",
        HEADER
    );
    let request =
        TranspileRequest::new(&source, ShaderStage::Fragment, Tier::Es100).with_macro("VALUE", "2");
    let test = GlesTest::run(&request, TranspileOptions::default(), MemoryIncludes::new());
    test.assert_contains("const float a = 2.0;");
    test.assert_not_contains("a = 1.0");
    test.assert_not_contains("a = 3.0");
}

#[test]
fn test_include_spliced() {
    let source = format!(
        "{}#include \"common.glsl\"\nout vec4 c;\nvoid main() {{ c = vec4(helper()); }}\n",
        HEADER
    );
    let includes = MemoryIncludes::new().with_file(
        "shaders/common.glsl",
        "float helper() { return 0.5; }\n",
    );
    let request = TranspileRequest::new(&source, ShaderStage::Fragment, Tier::Es100)
        .with_file_name("shaders/main.frag");
    let test = GlesTest::run(&request, TranspileOptions::default(), includes);
    test.assert_no_errors();
    test.assert_contains("float helper() { return 0.5; }");
    test.assert_contains("gl_FragColor = vec4(helper());");
}

#[test]
fn test_missing_include_is_reported() {
    let source = format!("{}#include \"nowhere.glsl\"\nvoid main() {{}}\n", HEADER);
    let test = GlesTest::new(&source, ShaderStage::Fragment, Tier::Es100);
    assert!(test.output.diagnostics.contains_message("nowhere.glsl"));
    test.assert_first_line("#version 100");
}
