//! Diagnostics and error types for GLSL ES transpilation.
//!
//! Malformed shader input never surfaces as a Rust error: every stage records
//! [`Diagnostic`]s and keeps going. Only an invalid *request* (for example asking
//! to upgrade a shader) is reported through [`TranspileError`].

use alloc::{string::String, vec::Vec};
use core::fmt;

use crate::tier::{ShaderStage, Tier};

/// Pipeline phase that produced a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Phase {
    /// Macro preprocessing
    Preprocess,
    /// Lexical analysis
    Tokenize,
    /// Declaration-level semantic analysis
    Analyze,
    /// Version downgrade rewrites
    Transform,
    /// Sampling built-in translation
    Texture,
}

impl Phase {
    /// Get the name of this phase as printed in diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            Phase::Preprocess => "PREPROCESS",
            Phase::Tokenize => "TOKENIZE",
            Phase::Analyze => "ANALYZE",
            Phase::Transform => "TRANSFORM",
            Phase::Texture => "TEXTURE",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Severity of a diagnostic.
///
/// Errors mean the transpiled shader behaves differently from the original
/// ("should fix"); warnings are informational.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    Error,
    Warning,
}

/// A single positioned message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub phase: Phase,
    pub severity: Severity,
    /// 1-based line, 0 when unknown
    pub line: u32,
    /// 1-based column, 0 when unknown
    pub column: u32,
    pub message: String,
}

impl Diagnostic {
    /// Create an error diagnostic.
    pub fn error(phase: Phase, line: u32, column: u32, message: impl Into<String>) -> Self {
        Self {
            phase,
            severity: Severity::Error,
            line,
            column,
            message: message.into(),
        }
    }

    /// Create a warning diagnostic.
    pub fn warning(phase: Phase, line: u32, column: u32, message: impl Into<String>) -> Self {
        Self {
            phase,
            severity: Severity::Warning,
            line,
            column,
            message: message.into(),
        }
    }

    /// Check if this diagnostic is an error.
    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(
            f,
            "{}: {}:{}: {}: {}",
            kind, self.line, self.column, self.phase, self.message
        )
    }
}

/// Ordered collection of diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diagnostics {
    items: Vec<Diagnostic>,
}

impl Diagnostics {
    /// Create an empty collection.
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// Append a diagnostic.
    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.items.push(diagnostic);
    }

    /// Record an error.
    pub fn error(&mut self, phase: Phase, line: u32, column: u32, message: impl Into<String>) {
        self.push(Diagnostic::error(phase, line, column, message));
    }

    /// Record a warning.
    pub fn warning(&mut self, phase: Phase, line: u32, column: u32, message: impl Into<String>) {
        self.push(Diagnostic::warning(phase, line, column, message));
    }

    /// Move every diagnostic of `other` into this collection.
    pub fn extend(&mut self, other: Diagnostics) {
        self.items.extend(other.items);
    }

    /// Iterate in recording order.
    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter()
    }

    /// Iterate the errors ("should fix").
    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter().filter(|d| d.is_error())
    }

    /// Iterate the warnings ("informational").
    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter().filter(|d| !d.is_error())
    }

    /// Iterate the diagnostics produced by one phase.
    pub fn in_phase(&self, phase: Phase) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter().filter(move |d| d.phase == phase)
    }

    pub fn error_count(&self) -> usize {
        self.errors().count()
    }

    pub fn warning_count(&self) -> usize {
        self.warnings().count()
    }

    pub fn has_errors(&self) -> bool {
        self.items.iter().any(Diagnostic::is_error)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Check whether any diagnostic message contains `needle`.
    pub fn contains_message(&self, needle: &str) -> bool {
        self.items.iter().any(|d| d.message.contains(needle))
    }
}

impl IntoIterator for Diagnostics {
    type Item = Diagnostic;
    type IntoIter = alloc::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

/// Invalid transpilation request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TranspileError {
    /// The target tier is above the source tier
    #[error("cannot upgrade shader from {from} to {to}; only downgrades are supported")]
    Upgrade { from: Tier, to: Tier },
    /// The shader stage has no equivalent at the target tier
    #[error("{stage} shaders have no equivalent below {minimum}")]
    UnsupportedStage { stage: ShaderStage, minimum: Tier },
}

/// Result type for transpilation requests.
pub type TranspileResult<T> = Result<T, TranspileError>;
