//! Macro preprocessor.
//!
//! Works on text lines rather than tokens. Comments are removed and
//! backslash-continued lines are joined first; every physical input line still
//! produces exactly one output line (blank when inactive or consumed), so line
//! numbers reported downstream match the input. `#include` is the exception:
//! included text is spliced in between `#line` markers.

mod conditional;
mod expand;
mod expr;
mod include;
mod macros;

use alloc::{
    collections::BTreeSet,
    format,
    string::{String, ToString},
    vec::Vec,
};

pub use conditional::{ConditionalError, ConditionalKind, ConditionalStack, ConditionalState};
pub use expand::Expander;
pub use expr::{evaluate, parse_expression, EvalError, Expr};
#[cfg(feature = "std")]
pub use include::FsIncludeResolver;
pub use include::{IncludeResolver, MemoryIncludes, NoIncludes};
pub use macros::{
    parse_define, DefineError, DefineOutcome, MacroDefinition, MacroTable, MacroToken,
    MacroTokenKind, UndefOutcome,
};

use crate::{
    error::{Diagnostics, Phase},
    tier::{parse_version_directive, ShaderStage, VersionDirective},
};
use expand::paren_balance;
use include::parent_dir;
use macros::{is_reserved_name, take_identifier};

/// Upper bound on lines a single macro invocation may span.
const MAX_INVOCATION_LINES: usize = 64;

/// Preprocessor configuration for one run.
#[derive(Debug, Clone)]
pub struct PreprocessOptions {
    pub stage: ShaderStage,
    /// Value of `__VERSION__` until a `#version` directive says otherwise
    pub version: u32,
    pub max_include_depth: usize,
    /// Extra macros as `(name, replacement)`; the name may carry a parameter
    /// list such as `SQR(x)`
    pub predefined: Vec<(String, String)>,
}

impl Default for PreprocessOptions {
    fn default() -> Self {
        Self {
            stage: ShaderStage::Fragment,
            version: 100,
            max_include_depth: 32,
            predefined: Vec::new(),
        }
    }
}

/// An `#extension` directive seen while preprocessing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionDirective {
    pub name: String,
    pub behavior: String,
    pub line: u32,
}

/// Result of preprocessing.
#[derive(Debug, Clone)]
pub struct PreprocessOutput {
    pub text: String,
    pub diagnostics: Diagnostics,
    /// First `#version` directive, if any
    pub version: Option<VersionDirective>,
    pub extensions: Vec<ExtensionDirective>,
    /// Macro table as it stood at the end of the main file
    pub macros: MacroTable,
    /// Include paths in the order they were spliced in
    pub included: Vec<String>,
}

/// Split source into logical lines with comments removed.
///
/// Lines consumed by a backslash continuation or by a multi-line block comment
/// are emitted as blanks after the joined line, keeping the line count equal to
/// the physical line count.
pub fn logical_lines(source: &str) -> Vec<String> {
    let bytes = source.as_bytes();
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut pending_blank = 0usize;
    let mut i = 0;

    let continuation_len = |i: usize| -> usize {
        if bytes.get(i) != Some(&b'\\') {
            0
        } else if bytes.get(i + 1) == Some(&b'\n') {
            2
        } else if bytes.get(i + 1) == Some(&b'\r') && bytes.get(i + 2) == Some(&b'\n') {
            3
        } else {
            0
        }
    };

    while i < bytes.len() {
        let b = bytes[i];
        let cont = continuation_len(i);
        if cont > 0 {
            pending_blank += 1;
            i += cont;
        } else if b == b'/' && bytes.get(i + 1) == Some(&b'/') {
            i += 2;
            while i < bytes.len() && bytes[i] != b'\n' {
                let cont = continuation_len(i);
                if cont > 0 {
                    pending_blank += 1;
                    i += cont;
                } else {
                    i += 1;
                }
            }
        } else if b == b'/' && bytes.get(i + 1) == Some(&b'*') {
            i += 2;
            while i < bytes.len() && !(bytes[i] == b'*' && bytes.get(i + 1) == Some(&b'/')) {
                if bytes[i] == b'\n' {
                    pending_blank += 1;
                }
                i += 1;
            }
            i = (i + 2).min(bytes.len());
            current.push(' ');
        } else if b == b'"' {
            let start = i;
            i += 1;
            while i < bytes.len() && bytes[i] != b'"' && bytes[i] != b'\n' {
                i += if bytes[i] == b'\\' { 2 } else { 1 };
            }
            if bytes.get(i) == Some(&b'"') {
                i += 1;
            }
            let end = i.min(bytes.len());
            current.push_str(&source[start..end]);
            i = end;
        } else if b == b'\n' {
            if current.ends_with('\r') {
                current.pop();
            }
            lines.push(core::mem::take(&mut current));
            for _ in 0..pending_blank {
                lines.push(String::new());
            }
            pending_blank = 0;
            i += 1;
        } else {
            let len = source[i..].chars().next().map_or(1, char::len_utf8);
            current.push_str(&source[i..i + len]);
            i += len;
        }
    }
    lines.push(current);
    for _ in 0..pending_blank {
        lines.push(String::new());
    }
    lines
}

/// Split directive text after `#` into its name and the remainder.
fn split_directive(body: &str) -> (&str, &str) {
    let body = body.trim_start();
    match take_identifier(body) {
        Some((name, rest)) => (name, rest),
        None => ("", body),
    }
}

/// Replace `defined X` and `defined(X)` with 1 or 0.
fn replace_defined(text: &str, macros: &MacroTable) -> Result<String, String> {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(pos) = find_word(rest, "defined") {
        out.push_str(&rest[..pos]);
        let after = rest[pos + "defined".len()..].trim_start();
        let (name, remaining) = if let Some(inner) = after.strip_prefix('(') {
            let inner = inner.trim_start();
            let (name, tail) = take_identifier(inner)
                .ok_or_else(|| String::from("expected macro name after 'defined('"))?;
            let tail = tail
                .trim_start()
                .strip_prefix(')')
                .ok_or_else(|| String::from("missing ')' after 'defined(NAME'"))?;
            (name, tail)
        } else {
            take_identifier(after)
                .ok_or_else(|| String::from("expected macro name after 'defined'"))?
        };
        out.push_str(if macros.is_defined(name) { "1" } else { "0" });
        rest = remaining;
    }
    out.push_str(rest);
    Ok(out)
}

/// Byte offset of `word` as a whole identifier in `text`.
fn find_word(text: &str, word: &str) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut from = 0;
    while let Some(rel) = text[from..].find(word) {
        let pos = from + rel;
        let end = pos + word.len();
        let is_word = |b: u8| b.is_ascii_alphanumeric() || b == b'_';
        let before_ok = pos == 0 || !is_word(bytes[pos - 1]);
        let after_ok = end >= bytes.len() || !is_word(bytes[end]);
        if before_ok && after_ok {
            return Some(pos);
        }
        from = end;
    }
    None
}

/// Replace identifiers left after expansion: `true` is 1, anything else 0.
fn zero_identifiers(text: &str) -> String {
    let bytes = text.as_bytes();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if b.is_ascii_digit() {
            let start = i;
            while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                i += 1;
            }
            out.push_str(&text[start..i]);
        } else if b.is_ascii_alphabetic() || b == b'_' {
            let start = i;
            while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                i += 1;
            }
            out.push_str(if &text[start..i] == "true" { "1" } else { "0" });
        } else {
            let len = text[i..].chars().next().map_or(1, char::len_utf8);
            out.push_str(&text[i..i + len]);
            i += len;
        }
    }
    out
}

/// Parse `"path"` or `<path>`.
fn parse_include_path(rest: &str) -> Option<(&str, bool)> {
    let rest = rest.trim();
    if let Some(inner) = rest.strip_prefix('"') {
        let end = inner.find('"')?;
        Some((&inner[..end], false))
    } else if let Some(inner) = rest.strip_prefix('<') {
        let end = inner.find('>')?;
        Some((&inner[..end], true))
    } else {
        None
    }
}

/// Parse `name : behavior`.
fn parse_extension(rest: &str) -> Option<(&str, &str)> {
    let (name, behavior) = rest.split_once(':')?;
    let name = name.trim();
    let behavior = behavior.trim();
    let valid = take_identifier(name).is_some_and(|(_, r)| r.is_empty())
        && matches!(behavior, "require" | "enable" | "warn" | "disable");
    valid.then_some((name, behavior))
}

/// Per-file processing state.
struct FileState<'f> {
    file: &'f str,
    source_number: u32,
    depth: usize,
    /// Added to the physical line number by `#line`
    line_delta: i64,
}

impl FileState<'_> {
    fn line_number(&self, index: usize) -> u32 {
        (index as i64 + 1 + self.line_delta).max(0) as u32
    }
}

/// Line-oriented macro preprocessor for one shader.
pub struct Preprocessor<'r> {
    options: PreprocessOptions,
    macros: MacroTable,
    diagnostics: Diagnostics,
    resolver: &'r mut dyn IncludeResolver,
    included: BTreeSet<String>,
    included_order: Vec<String>,
    next_source_number: u32,
    version: Option<VersionDirective>,
    extensions: Vec<ExtensionDirective>,
}

impl<'r> Preprocessor<'r> {
    pub fn new(resolver: &'r mut dyn IncludeResolver, options: PreprocessOptions) -> Self {
        let mut macros = MacroTable::new();
        let mut diagnostics = Diagnostics::new();
        macros.define(MacroDefinition::builtin("GL_ES", "1"));
        macros.define(MacroDefinition::builtin(
            "__VERSION__",
            &options.version.to_string(),
        ));
        macros.define(MacroDefinition::builtin("__LINE__", "0"));
        macros.define(MacroDefinition::builtin("__FILE__", "0"));
        if options.stage == ShaderStage::Fragment {
            macros.define(MacroDefinition::builtin("GL_FRAGMENT_PRECISION_HIGH", "1"));
        }
        for (name, value) in &options.predefined {
            let text = if value.is_empty() {
                name.clone()
            } else {
                format!("{} {}", name, value)
            };
            match parse_define(&text) {
                Ok(definition) => {
                    if macros.define(definition) == DefineOutcome::BuiltinRejected {
                        diagnostics.warning(
                            Phase::Preprocess,
                            0,
                            0,
                            format!("predefined macro '{}' cannot override a built-in", name),
                        );
                    }
                }
                Err(err) => {
                    diagnostics.error(
                        Phase::Preprocess,
                        0,
                        0,
                        format!("invalid predefined macro '{}': {}", name, err),
                    );
                }
            }
        }
        Self {
            options,
            macros,
            diagnostics,
            resolver,
            included: BTreeSet::new(),
            included_order: Vec::new(),
            next_source_number: 1,
            version: None,
            extensions: Vec::new(),
        }
    }

    /// Preprocess the main file.
    pub fn run(mut self, source: &str, file_name: &str) -> PreprocessOutput {
        log::debug!("preprocessing {} ({} bytes)", file_name, source.len());
        self.included.insert(String::from(file_name));
        let mut out = Vec::new();
        let state = FileState {
            file: file_name,
            source_number: 0,
            depth: 0,
            line_delta: 0,
        };
        self.process(source, state, &mut out);
        PreprocessOutput {
            text: out.join("\n"),
            diagnostics: self.diagnostics,
            version: self.version,
            extensions: self.extensions,
            macros: self.macros,
            included: self.included_order,
        }
    }

    fn error(&mut self, line: u32, message: impl Into<String>) {
        self.diagnostics.error(Phase::Preprocess, line, 0, message);
    }

    fn warning(&mut self, line: u32, message: impl Into<String>) {
        self.diagnostics.warning(Phase::Preprocess, line, 0, message);
    }

    fn process(&mut self, source: &str, mut state: FileState<'_>, out: &mut Vec<String>) {
        let lines = logical_lines(source);
        let mut conditionals = ConditionalStack::new();
        let mut k = 0;

        while k < lines.len() {
            let line_no = state.line_number(k);
            let line = &lines[k];
            let trimmed = line.trim_start();

            if let Some(body) = trimmed.strip_prefix('#') {
                let (name, rest) = split_directive(body);
                let emitted = self.directive(
                    name,
                    rest,
                    line,
                    line_no,
                    k,
                    &mut state,
                    &mut conditionals,
                    out,
                );
                if !emitted {
                    out.push(String::new());
                }
                k += 1;
                continue;
            }

            if !conditionals.is_active() {
                out.push(String::new());
                k += 1;
                continue;
            }

            // Join the lines of an invocation whose arguments continue below.
            let mut text = line.clone();
            let mut consumed = 0;
            while consumed < MAX_INVOCATION_LINES {
                let next = k + consumed + 1;
                let Some(next_line) = lines.get(next) else {
                    break;
                };
                if next_line.trim_start().starts_with('#') || !self.needs_more(&text, next_line) {
                    break;
                }
                text.push(' ');
                text.push_str(next_line.trim());
                consumed += 1;
            }

            let expanded = Expander::new(&self.macros, &mut self.diagnostics)
                .at(line_no, state.source_number)
                .expand(&text);
            out.push(expanded);
            for _ in 0..consumed {
                out.push(String::new());
            }
            k += 1 + consumed;
        }

        for group in conditionals.open_groups() {
            self.diagnostics.error(
                Phase::Preprocess,
                group.line,
                0,
                format!("unterminated conditional directive in {}", state.file),
            );
        }
    }

    /// Whether `text` ends inside a function-like macro invocation that
    /// continues on `next_line`.
    fn needs_more(&self, text: &str, next_line: &str) -> bool {
        let bytes = text.as_bytes();
        let mut i = 0;
        while i < bytes.len() {
            let b = bytes[i];
            if b.is_ascii_digit() {
                while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'.') {
                    i += 1;
                }
                continue;
            }
            if !(b.is_ascii_alphabetic() || b == b'_') {
                i += 1;
                continue;
            }
            let start = i;
            while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                i += 1;
            }
            let is_function_macro = self
                .macros
                .get(&text[start..i])
                .is_some_and(MacroDefinition::is_function_like);
            if !is_function_macro {
                continue;
            }
            let rest = text[i..].trim_start();
            if rest.is_empty() {
                return next_line.trim_start().starts_with('(');
            }
            if rest.starts_with('(') && paren_balance(rest) > 0 {
                return true;
            }
        }
        false
    }

    /// Handle one directive. Returns true if it wrote its own output line(s).
    #[allow(clippy::too_many_arguments)]
    fn directive(
        &mut self,
        name: &str,
        rest: &str,
        line: &str,
        line_no: u32,
        index: usize,
        state: &mut FileState<'_>,
        conditionals: &mut ConditionalStack,
        out: &mut Vec<String>,
    ) -> bool {
        // Conditionals are tracked even inside inactive branches.
        match name {
            "if" => {
                let value = conditionals.is_active() && self.eval_condition(rest, line_no, state);
                conditionals.push(ConditionalKind::If, value, line_no);
                return false;
            }
            "ifdef" | "ifndef" => {
                let kind = if name == "ifdef" {
                    ConditionalKind::Ifdef
                } else {
                    ConditionalKind::Ifndef
                };
                let value = match take_identifier(rest.trim()) {
                    Some((macro_name, _)) => {
                        self.macros.is_defined(macro_name) == (kind == ConditionalKind::Ifdef)
                    }
                    None => {
                        if conditionals.is_active() {
                            self.error(line_no, format!("#{} requires a macro name", name));
                        }
                        false
                    }
                };
                conditionals.push(kind, value, line_no);
                return false;
            }
            "elif" => {
                let value =
                    conditionals.elif_needs_eval() && self.eval_condition(rest, line_no, state);
                if let Err(err) = conditionals.elif(value) {
                    self.error(line_no, err.to_string());
                }
                return false;
            }
            "else" => {
                if let Err(err) = conditionals.else_branch() {
                    self.error(line_no, err.to_string());
                }
                return false;
            }
            "endif" => {
                if let Err(err) = conditionals.endif() {
                    self.error(line_no, err.to_string());
                }
                return false;
            }
            _ => {}
        }

        if !conditionals.is_active() {
            return false;
        }

        match name {
            "define" => self.define(rest, line_no),
            "undef" => match take_identifier(rest.trim()) {
                Some((macro_name, _)) => {
                    if self.macros.undefine(macro_name) == UndefOutcome::BuiltinRejected {
                        self.warning(
                            line_no,
                            format!("cannot undefine built-in macro '{}'", macro_name),
                        );
                    }
                }
                None => self.error(line_no, "#undef requires a macro name"),
            },
            "include" => {
                self.include(rest, line_no, state, out);
                return true;
            }
            "error" => self.error(line_no, format!("#error {}", rest.trim())),
            "warning" => self.warning(line_no, format!("#warning {}", rest.trim())),
            "pragma" => {
                out.push(String::from(line.trim()));
                return true;
            }
            "line" => {
                let expanded = Expander::new(&self.macros, &mut self.diagnostics)
                    .at(line_no, state.source_number)
                    .expand(rest);
                let mut parts = expanded.split_whitespace();
                match parts.next().and_then(|n| n.parse::<i64>().ok()) {
                    Some(number) => {
                        // The line after the directive becomes `number`.
                        state.line_delta = number - (index as i64 + 2);
                        out.push(String::from(line.trim()));
                        return true;
                    }
                    None => self.error(line_no, "#line requires a line number"),
                }
            }
            "version" => {
                return self.version(line, line_no, state, out);
            }
            "extension" => match parse_extension(rest) {
                Some((ext, behavior)) => {
                    self.extensions.push(ExtensionDirective {
                        name: String::from(ext),
                        behavior: String::from(behavior),
                        line: line_no,
                    });
                    out.push(String::from(line.trim()));
                    return true;
                }
                None => self.error(
                    line_no,
                    format!("malformed #extension directive '{}'", rest.trim()),
                ),
            },
            "" if rest.trim().is_empty() => {}
            _ => self.error(
                line_no,
                format!("unknown preprocessor directive '#{}'", name),
            ),
        }
        false
    }

    fn define(&mut self, rest: &str, line_no: u32) {
        let definition = match parse_define(rest) {
            Ok(definition) => definition,
            Err(err) => {
                self.error(line_no, err.to_string());
                return;
            }
        };
        let macro_name = definition.name.clone();
        match self.macros.define(definition) {
            DefineOutcome::BuiltinRejected => {
                self.warning(
                    line_no,
                    format!("cannot redefine built-in macro '{}'", macro_name),
                );
            }
            outcome => {
                if is_reserved_name(&macro_name) {
                    self.warning(
                        line_no,
                        format!("macro name '{}' is reserved", macro_name),
                    );
                }
                if outcome == DefineOutcome::Redefined {
                    self.warning(line_no, format!("macro '{}' redefined", macro_name));
                }
            }
        }
    }

    fn version(
        &mut self,
        line: &str,
        line_no: u32,
        state: &FileState<'_>,
        out: &mut Vec<String>,
    ) -> bool {
        if state.depth > 0 {
            self.warning(line_no, "#version in an included file is ignored");
            return false;
        }
        let Some(directive) = parse_version_directive(line) else {
            self.error(line_no, format!("malformed #version directive '{}'", line.trim()));
            return false;
        };
        if self.version.is_some() {
            self.error(line_no, "duplicate #version directive");
            return false;
        }
        self.version = Some(directive);
        self.macros
            .set_builtin("__VERSION__", &directive.number.to_string());
        out.push(String::from(line.trim()));
        true
    }

    fn eval_condition(&mut self, expr: &str, line_no: u32, state: &FileState<'_>) -> bool {
        let substituted = match replace_defined(expr, &self.macros) {
            Ok(text) => text,
            Err(message) => {
                self.error(line_no, message);
                return false;
            }
        };
        let expanded = Expander::new(&self.macros, &mut self.diagnostics)
            .at(line_no, state.source_number)
            .expand(&substituted);
        match evaluate(&zero_identifiers(&expanded)) {
            Ok(value) => value != 0,
            Err(err) => {
                self.error(line_no, err.to_string());
                false
            }
        }
    }

    fn include(
        &mut self,
        rest: &str,
        line_no: u32,
        state: &FileState<'_>,
        out: &mut Vec<String>,
    ) {
        let Some((path, is_system)) = parse_include_path(rest) else {
            self.error(line_no, format!("malformed #include '{}'", rest.trim()));
            out.push(String::new());
            return;
        };
        if state.depth + 1 > self.options.max_include_depth {
            log::warn!("include depth limit reached at {}", path);
            self.error(
                line_no,
                format!(
                    "include depth limit of {} exceeded including '{}'",
                    self.options.max_include_depth, path
                ),
            );
            out.push(String::new());
            return;
        }
        let key = if is_system {
            String::from(path)
        } else {
            format!("{}{}", parent_dir(state.file), path)
        };
        if self.included.contains(&key) {
            log::warn!("skipping repeated include of {}", key);
            self.warning(line_no, format!("'{}' already included; skipped", path));
            out.push(String::new());
            return;
        }
        let Some(text) = self.resolver.resolve(path, state.file, is_system) else {
            self.error(line_no, format!("cannot resolve include '{}'", path));
            out.push(String::new());
            return;
        };

        self.included.insert(key.clone());
        self.included_order.push(key.clone());
        let number = self.next_source_number;
        self.next_source_number += 1;

        out.push(format!("#line 1 {}", number));
        let child = FileState {
            file: &key,
            source_number: number,
            depth: state.depth + 1,
            line_delta: 0,
        };
        self.process(&text, child, out);
        out.push(format!("#line {} {}", line_no + 1, state.source_number));
    }
}

/// Preprocess `source` in one call.
pub fn preprocess(
    source: &str,
    file_name: &str,
    options: PreprocessOptions,
    resolver: &mut dyn IncludeResolver,
) -> PreprocessOutput {
    Preprocessor::new(resolver, options).run(source, file_name)
}
