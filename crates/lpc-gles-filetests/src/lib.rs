//! File-based tests for the GLSL ES transpiler.
//!
//! Each `.glsl` file under `filetests/` starts with a command line such as
//! `test transpile es100 fragment` or `test preprocess`, followed by shaders.
//! Every shader is followed by `;`-prefixed expectations: filecheck
//! directives matched against the emitted source, and `error:`, `warning:`
//! and `errors:` lines matched against the diagnostics.

#![no_std]

extern crate alloc;

pub mod expect;
pub mod parser;

mod test_preprocess;
mod test_transpile;

pub use expect::{match_expectations, parse_expectations, DiagnosticCheck, Expectations};
pub use parser::{parse_test_file, TestCase};
