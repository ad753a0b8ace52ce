//! The `preprocess` subtest - run the macro preprocessor alone
//!
//! Command: `test preprocess [fragment|vertex]`.

use crate::{expect::match_expectations, parser::parse_test_file};
use lpc_gles::{preprocess, NoIncludes, PreprocessOptions, ShaderStage};

/// Run tests from preprocess test files
#[allow(dead_code)]
pub fn run_tests_from_file(content: &str) {
    let test_cases = parse_test_file(content);

    assert!(!test_cases.is_empty(), "No test cases found in test file");

    for case in test_cases {
        let args = case.command_args();
        assert_eq!(
            args.first().copied(),
            Some("preprocess"),
            "Unexpected test command: {}",
            case.command
        );
        let stage = match args.get(1).copied() {
            Some("vertex") => ShaderStage::Vertex,
            _ => ShaderStage::Fragment,
        };
        let options = PreprocessOptions {
            stage,
            ..PreprocessOptions::default()
        };
        let output = preprocess(&case.shader_text, "test.glsl", options, &mut NoIncludes);

        if let Err(message) =
            match_expectations(&output.text, &output.diagnostics, &case.expected_text)
        {
            panic!(
                "Preprocess test at line {} failed!\n\n{}\n\nActual:\n{}\n\nOriginal source:\n{}",
                case.line, message, output.text, case.shader_text
            );
        }
    }
}
