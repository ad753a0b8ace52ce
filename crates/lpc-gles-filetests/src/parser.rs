//! Test file parsing

use alloc::{string::String, vec::Vec};

/// A shader extracted from a test file
#[derive(Debug, Clone)]
pub struct TestCase {
    /// The shader source
    pub shader_text: String,
    /// Filecheck directives with the `;` prefix stripped
    pub expected_text: String,
    /// The test command line, e.g. `test transpile es100 fragment`
    pub command: String,
    /// 1-based line of the first shader line in the test file
    pub line: usize,
}

impl TestCase {
    /// Words of the command after `test`.
    pub fn command_args(&self) -> Vec<&str> {
        self.command.split_whitespace().skip(1).collect()
    }
}

/// Parse a test file into shaders and their expectations
pub fn parse_test_file(content: &str) -> Vec<TestCase> {
    let lines: Vec<&str> = content.lines().collect();
    let mut test_cases = Vec::new();
    let mut i = 0;

    // Parse test command from header
    let mut command = String::new();
    while i < lines.len() {
        let line = lines[i].trim();
        i += 1;
        if line.starts_with("test ") {
            command = String::from(line);
            break;
        }
    }

    while i < lines.len() {
        // Skip blank lines between cases
        if lines[i].trim().is_empty() {
            i += 1;
            continue;
        }

        let shader_start = i;
        while i < lines.len() && !lines[i].trim_start().starts_with(';') {
            i += 1;
        }
        let shader_end = i;

        let mut expected = Vec::new();
        while i < lines.len() && lines[i].trim_start().starts_with(';') {
            let trimmed = lines[i].trim();
            let directive = trimmed
                .strip_prefix("; ")
                .or_else(|| trimmed.strip_prefix(';'))
                .unwrap_or(trimmed);
            expected.push(directive);
            i += 1;
        }

        let mut shader_text = lines[shader_start..shader_end].join("\n");
        shader_text.push('\n');
        test_cases.push(TestCase {
            shader_text,
            expected_text: expected.join("\n"),
            command: command.clone(),
            line: shader_start + 1,
        });
    }

    test_cases
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cases() {
        let content = "test transpile es100 vertex\n\nvoid main() {}\n; check: main\n\n#version 300 es\nvoid main() {}\n;check: 100\n; not: es\n";
        let cases = parse_test_file(content);
        assert_eq!(cases.len(), 2);
        assert_eq!(cases[0].shader_text, "void main() {}\n");
        assert_eq!(cases[0].expected_text, "check: main");
        assert_eq!(cases[0].line, 3);
        assert_eq!(cases[1].expected_text, "check: 100\nnot: es");
        assert_eq!(cases[1].command_args(), ["transpile", "es100", "vertex"]);
    }
}
