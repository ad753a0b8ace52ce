//! The `transpile` subtest - downgrade a shader and filecheck the result
//!
//! Command: `test transpile <target> <stage>`, e.g. `test transpile es100 fragment`.

use crate::{expect::match_expectations, parser::parse_test_file};
use lpc_gles::{transpile, ShaderStage, Tier};

fn parse_tier(name: &str) -> Option<Tier> {
    Some(match name {
        "es100" => Tier::Es100,
        "es300" => Tier::Es300,
        "es310" => Tier::Es310,
        "es320" => Tier::Es320,
        _ => return None,
    })
}

fn parse_stage(name: &str) -> Option<ShaderStage> {
    Some(match name {
        "vertex" => ShaderStage::Vertex,
        "fragment" => ShaderStage::Fragment,
        "compute" => ShaderStage::Compute,
        "geometry" => ShaderStage::Geometry,
        "tess_control" => ShaderStage::TessControl,
        "tess_evaluation" => ShaderStage::TessEvaluation,
        _ => return None,
    })
}

/// Run tests from transpile test files
#[allow(dead_code)]
pub fn run_tests_from_file(content: &str) {
    let test_cases = parse_test_file(content);

    assert!(!test_cases.is_empty(), "No test cases found in test file");

    for case in test_cases {
        let args = case.command_args();
        assert_eq!(
            args.first().copied(),
            Some("transpile"),
            "Unexpected test command: {}",
            case.command
        );
        let target = args
            .get(1)
            .and_then(|name| parse_tier(name))
            .unwrap_or_else(|| panic!("Bad target tier in command: {}", case.command));
        let stage = args
            .get(2)
            .and_then(|name| parse_stage(name))
            .unwrap_or_else(|| panic!("Bad shader stage in command: {}", case.command));

        let output = transpile(&case.shader_text, stage, target).unwrap_or_else(|e| {
            panic!(
                "Transpile rejected the shader at line {}: {}\n\n{}",
                case.line, e, case.shader_text
            )
        });
        if let Err(message) =
            match_expectations(&output.source, &output.diagnostics, &case.expected_text)
        {
            panic!(
                "Transpile test at line {} failed!\n\n{}\n\nActual:\n{}\n\nOriginal shader:\n{}",
                case.line, message, output.source, case.shader_text
            );
        }
    }
}
