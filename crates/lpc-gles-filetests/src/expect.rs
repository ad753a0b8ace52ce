//! Expectation matching for transpiler output
//!
//! The expectations under a shader mix filecheck directives, which are matched
//! against the emitted source only, with diagnostic expectations:
//!
//! - `error: <text>` / `warning: <text>`: some diagnostic of that severity has
//!   a message containing `<text>`
//! - `errors: <n>`: exactly `n` errors were reported

use alloc::{format, string::String, vec::Vec};

use filecheck::{Checker, CheckerBuilder, NO_VARIABLES};
use lpc_gles::{Diagnostics, Severity};

/// An expectation about the diagnostics of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiagnosticCheck {
    Contains { severity: Severity, text: String },
    ErrorCount(usize),
}

/// Expectations of one test case, split by what they are matched against.
#[derive(Debug, Clone, Default)]
pub struct Expectations {
    /// Filecheck directives for the emitted source
    pub directives: Vec<String>,
    pub diagnostics: Vec<DiagnosticCheck>,
}

/// Split expected text into filecheck directives and diagnostic checks
pub fn parse_expectations(expected_text: &str) -> Result<Expectations, String> {
    let mut expectations = Expectations::default();
    for line in expected_text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let Some((key, rest)) = trimmed.split_once(':') else {
            expectations.directives.push(String::from(trimmed));
            continue;
        };
        let rest = rest.trim();
        let check = match key {
            "error" => DiagnosticCheck::Contains {
                severity: Severity::Error,
                text: String::from(rest),
            },
            "warning" => DiagnosticCheck::Contains {
                severity: Severity::Warning,
                text: String::from(rest),
            },
            "errors" => DiagnosticCheck::ErrorCount(
                rest.parse()
                    .map_err(|_| format!("Bad error count in '{}'", trimmed))?,
            ),
            _ => {
                expectations.directives.push(String::from(trimmed));
                continue;
            }
        };
        expectations.diagnostics.push(check);
    }
    Ok(expectations)
}

/// Build a filechecker from source directives
pub fn build_filechecker(directives: &[String]) -> Result<Checker, String> {
    let mut builder = CheckerBuilder::new();
    for directive in directives {
        let recognized = builder
            .directive(directive)
            .map_err(|e| format!("Failed to parse filecheck directive '{}': {}", directive, e))?;
        if !recognized {
            return Err(format!("Unknown expectation '{}'", directive));
        }
    }
    Ok(builder.finish())
}

/// Match one run against the expected text: directives against `source`,
/// diagnostic checks against `diagnostics`
pub fn match_expectations(
    source: &str,
    diagnostics: &Diagnostics,
    expected_text: &str,
) -> Result<(), String> {
    let expectations = parse_expectations(expected_text)?;

    if !expectations.directives.is_empty() {
        let checker = build_filechecker(&expectations.directives)?;
        let matched = checker
            .check(source, NO_VARIABLES)
            .map_err(|e| format!("Filecheck error: {}", e))?;
        if !matched {
            let (_, explain) = checker
                .explain(source, NO_VARIABLES)
                .map_err(|e| format!("Failed to get filecheck explanation: {}", e))?;
            return Err(format!("Filecheck failed:\n{}", explain));
        }
    }

    for check in &expectations.diagnostics {
        let satisfied = match check {
            DiagnosticCheck::Contains { severity, text } => diagnostics
                .iter()
                .any(|d| d.severity == *severity && d.message.contains(text.as_str())),
            DiagnosticCheck::ErrorCount(count) => diagnostics.error_count() == *count,
        };
        if !satisfied {
            return Err(format!(
                "Diagnostic expectation {:?} not met; diagnostics:\n{}",
                check,
                list_diagnostics(diagnostics)
            ));
        }
    }
    Ok(())
}

fn list_diagnostics(diagnostics: &Diagnostics) -> String {
    if diagnostics.is_empty() {
        return String::from("  (none)\n");
    }
    diagnostics
        .iter()
        .map(|d| format!("  {}\n", d))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use lpc_gles::Phase;

    #[test]
    fn test_split_expectations() {
        let expectations =
            parse_expectations("check: gl_FragColor\nnextln: }\nerror: gl_VertexID\nwarning: precision\nerrors: 1")
                .unwrap();
        assert_eq!(expectations.directives, ["check: gl_FragColor", "nextln: }"]);
        assert_eq!(expectations.diagnostics.len(), 3);
        assert_eq!(expectations.diagnostics[2], DiagnosticCheck::ErrorCount(1));
    }

    #[test]
    fn test_diagnostics_checked_separately() {
        let mut diagnostics = Diagnostics::new();
        diagnostics.error(Phase::Transform, 3, 1, "gl_VertexID is not available");
        let source = "void main() {}\n";

        assert!(match_expectations(source, &diagnostics, "check: main\nerror: gl_VertexID\nerrors: 1").is_ok());
        assert!(match_expectations(source, &diagnostics, "warning: gl_VertexID").is_err());
        assert!(match_expectations(source, &diagnostics, "errors: 0").is_err());
        // Diagnostics are not part of the source.
        assert!(match_expectations(source, &diagnostics, "check: gl_VertexID").is_err());
    }

    #[test]
    fn test_unknown_expectation_rejected() {
        assert!(match_expectations("x", &Diagnostics::new(), "chek: x").is_err());
    }
}
