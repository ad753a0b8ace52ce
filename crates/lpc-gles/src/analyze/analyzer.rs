//! Top-level declaration scanner.
//!
//! Builds a [`SymbolTable`] from the significant tokens of a preprocessed
//! shader without building an expression tree. Function bodies are skipped as
//! balanced brace runs; only their parameters are recorded, in a function scope
//! covering the body tokens.

use alloc::{
    format,
    string::{String, ToString},
    vec::Vec,
};
use core::fmt;

use super::{
    qualifiers::{parse_layout, Precision, Qualifiers, StorageQualifier},
    symbols::{BlockInfo, ScopeKind, Symbol, SymbolId, SymbolKind, SymbolTable},
    types::TypeInfo,
};
use crate::{
    error::{Diagnostic, Diagnostics, Phase},
    preprocess::evaluate,
    tier::ShaderStage,
    token::{matching_close, split_arguments, Significant, TokenBuffer, TokenKind},
};

/// Recoverable declaration error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalyzeError {
    pub line: u32,
    pub column: u32,
    pub message: String,
}

impl fmt::Display for AnalyzeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}: {}", self.line, self.column, self.message)
    }
}

impl From<AnalyzeError> for Diagnostic {
    fn from(err: AnalyzeError) -> Self {
        Diagnostic::error(Phase::Analyze, err.line, err.column, err.message)
    }
}

/// Result of analyzing one shader.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub symbols: SymbolTable,
    pub diagnostics: Diagnostics,
    pub stage: ShaderStage,
}

impl Analysis {
    pub fn error_count(&self) -> usize {
        self.diagnostics.error_count()
    }

    /// Resolve the type of `name` as seen from token `token`.
    pub fn type_at(&self, name: &str, token: usize) -> Option<&TypeInfo> {
        self.symbols.lookup_at(name, token).map(|s| &s.ty)
    }
}

/// Analyze the top-level declarations of a token stream.
pub fn analyze(buffer: &TokenBuffer, stage: ShaderStage) -> Analysis {
    Analyzer::new(buffer, stage).run()
}

struct Analyzer<'a> {
    buffer: &'a TokenBuffer,
    sig: Significant,
    pos: usize,
    stage: ShaderStage,
    table: SymbolTable,
    errors: Vec<AnalyzeError>,
}

type Dims = Option<Vec<Option<u32>>>;

impl<'a> Analyzer<'a> {
    fn new(buffer: &'a TokenBuffer, stage: ShaderStage) -> Self {
        Self {
            buffer,
            sig: Significant::new(buffer),
            pos: 0,
            stage,
            table: SymbolTable::new(),
            errors: Vec::new(),
        }
    }

    fn run(mut self) -> Analysis {
        while self.pos < self.sig.len() {
            let start = self.pos;
            if let Err(err) = self.declaration() {
                log::debug!("analysis error: {}", err);
                self.errors.push(err);
                self.resync(start);
            }
            if self.pos <= start {
                self.pos = start + 1;
            }
        }

        let mut diagnostics = Diagnostics::new();
        for err in self.errors {
            diagnostics.push(err.into());
        }
        log::debug!(
            "analyzed {} symbols, {} errors",
            self.table.iter().count(),
            diagnostics.error_count()
        );
        Analysis {
            symbols: self.table,
            diagnostics,
            stage: self.stage,
        }
    }

    // Position helpers. `k` is always a position in the significant view.

    fn token(&self, k: usize) -> Option<usize> {
        self.sig.at(k)
    }

    fn text_at(&self, k: usize) -> &'a str {
        let buffer = self.buffer;
        self.token(k).map_or("", |t| buffer.text(t))
    }

    fn kind_at(&self, k: usize) -> Option<TokenKind> {
        self.token(k).map(|t| self.buffer.kind(t))
    }

    fn is_punct(&self, k: usize, text: &str) -> bool {
        self.kind_at(k) == Some(TokenKind::Punctuation) && self.text_at(k) == text
    }

    fn is_operator(&self, k: usize, text: &str) -> bool {
        self.kind_at(k) == Some(TokenKind::Operator) && self.text_at(k) == text
    }

    fn error(&self, k: usize, message: impl Into<String>) -> AnalyzeError {
        // Past the end, report at the last token.
        let token = self
            .token(k)
            .or_else(|| self.sig.len().checked_sub(1).and_then(|last| self.token(last)));
        let (line, column) = token.map_or((0, 0), |t| (self.buffer.line(t), self.buffer.column(t)));
        AnalyzeError {
            line,
            column,
            message: message.into(),
        }
    }

    /// Position of the bracket matching the one at `k`.
    fn matching(&self, k: usize) -> Result<usize, AnalyzeError> {
        self.token(k)
            .and_then(|open| matching_close(self.buffer, open))
            .and_then(|close| self.sig.position_of(close))
            .ok_or_else(|| self.error(k, format!("unterminated '{}'", self.text_at(k))))
    }

    /// Advance to the next `stop` token at bracket depth zero, not consuming it.
    fn skip_to_top_level(&mut self, stops: &[&str]) {
        while self.pos < self.sig.len() {
            let text = self.text_at(self.pos);
            if self.kind_at(self.pos) == Some(TokenKind::Punctuation) {
                if stops.contains(&text) {
                    return;
                }
                if matches!(text, "(" | "[" | "{") {
                    self.pos = self.matching(self.pos).map_or(self.sig.len(), |close| close + 1);
                    continue;
                }
            }
            self.pos += 1;
        }
    }

    /// Skip past the next top-level `;` or unmatched `}`.
    fn resync(&mut self, start: usize) {
        self.pos = self.pos.max(start);
        let mut depth = 0usize;
        while self.pos < self.sig.len() {
            let k = self.pos;
            self.pos += 1;
            if self.kind_at(k) != Some(TokenKind::Punctuation) {
                continue;
            }
            match self.text_at(k) {
                ";" if depth == 0 => return,
                "{" => depth += 1,
                "}" if depth == 0 => return,
                "}" => {
                    depth -= 1;
                    // A closed brace run ends the construct unless a
                    // declarator list follows it.
                    let next = self.text_at(self.pos);
                    let declarator_follows =
                        next == ";" || self.kind_at(self.pos) == Some(TokenKind::Identifier);
                    if depth == 0 && !declarator_follows {
                        return;
                    }
                }
                _ => {}
            }
        }
    }

    fn declaration(&mut self) -> Result<(), AnalyzeError> {
        let start = self.pos;
        match self.text_at(start) {
            ";" => {
                self.pos += 1;
                return Ok(());
            }
            "precision" => return self.precision_statement(),
            _ => {}
        }

        let qualifiers = self.qualifiers()?;
        let k = self.pos;
        if self.is_punct(k, ";") {
            self.qualifier_statement(&qualifiers);
            self.pos += 1;
            return Ok(());
        }
        if self.text_at(k) == "struct" {
            let ty = self.struct_definition()?;
            if self.is_punct(self.pos, ";") {
                self.pos += 1;
                return Ok(());
            }
            let dims = self.array_dims()?;
            return self.declarators(start, &qualifiers, ty, dims);
        }

        let text = self.text_at(k);
        match self.kind_at(k) {
            Some(TokenKind::TypeKeyword) => self.typed_declaration(start, qualifiers),
            Some(TokenKind::Identifier) if self.table.is_struct(text) => {
                self.typed_declaration(start, qualifiers)
            }
            Some(TokenKind::Identifier | TokenKind::BuiltinVariable)
                if self.is_punct(k + 1, "{") && is_block_storage(qualifiers.storage) =>
            {
                self.block(start, qualifiers)
            }
            Some(TokenKind::Identifier | TokenKind::BuiltinVariable)
                if qualifiers != Qualifiers::default()
                    && (self.is_punct(k + 1, ";") || self.is_punct(k + 1, ",")) =>
            {
                // Qualifier redeclaration such as `invariant gl_Position;`.
                self.skip_to_top_level(&[";"]);
                self.pos += 1;
                Ok(())
            }
            Some(TokenKind::Identifier)
                if matches!(
                    self.kind_at(k + 1),
                    Some(TokenKind::Identifier | TokenKind::BuiltinVariable)
                ) =>
            {
                Err(self.error(k, format!("unknown type '{}'", text)))
            }
            _ => Err(self.error(k, format!("unexpected '{}' at top level", text))),
        }
    }

    fn qualifiers(&mut self) -> Result<Qualifiers, AnalyzeError> {
        let mut qualifiers = Qualifiers::default();
        loop {
            let k = self.pos;
            let text = self.text_at(k);
            match self.kind_at(k) {
                Some(TokenKind::Qualifier) if text == "layout" => {
                    if !self.is_punct(k + 1, "(") {
                        return Err(self.error(k, "expected '(' after 'layout'"));
                    }
                    let close = self.matching(k + 1)?;
                    let inner = (k + 2..close)
                        .map(|p| self.text_at(p))
                        .collect::<Vec<_>>()
                        .join(" ");
                    let layout = parse_layout(&inner).ok_or_else(|| {
                        self.error(k, format!("malformed layout qualifier '{}'", inner))
                    })?;
                    qualifiers.merge_layout(layout);
                    self.pos = close + 1;
                }
                Some(TokenKind::Qualifier | TokenKind::Precision) if text != "precision" => {
                    qualifiers.apply_keyword(text);
                    self.pos += 1;
                }
                _ => return Ok(qualifiers),
            }
        }
    }

    fn qualifier_statement(&mut self, qualifiers: &Qualifiers) {
        if let Some(layout) = &qualifiers.layout {
            if layout.has_local_size() {
                let mut size = layout.local_size;
                for axis in &mut size {
                    if *axis < 0 {
                        *axis = 1;
                    }
                }
                self.table.set_workgroup_size(size);
            }
        }
    }

    fn precision_statement(&mut self) -> Result<(), AnalyzeError> {
        let k = self.pos;
        let precision = Precision::from_keyword(self.text_at(k + 1))
            .ok_or_else(|| self.error(k + 1, "expected precision qualifier"))?;
        let type_name = self.text_at(k + 2);
        if self.kind_at(k + 2) != Some(TokenKind::TypeKeyword) {
            return Err(self.error(k + 2, "expected type in precision statement"));
        }
        if !self.is_punct(k + 3, ";") {
            return Err(self.error(k + 3, "expected ';' after precision statement"));
        }
        self.table.set_default_precision(type_name, precision);
        self.pos = k + 4;
        Ok(())
    }

    /// Parse optional `[N]` suffixes at the current position.
    fn array_dims(&mut self) -> Result<Dims, AnalyzeError> {
        let mut dims = Vec::new();
        while self.is_punct(self.pos, "[") {
            let open = self.pos;
            let close = self.matching(open)?;
            let size = if close == open + 1 {
                None
            } else {
                let text = (open + 1..close)
                    .map(|p| self.text_at(p))
                    .collect::<Vec<_>>()
                    .join(" ");
                // Named constants are left unknown.
                evaluate(text.trim_end_matches(['u', 'U']))
                    .ok()
                    .filter(|&v| v > 0)
                    .and_then(|v| u32::try_from(v).ok())
            };
            dims.push(size);
            self.pos = close + 1;
        }
        Ok((!dims.is_empty()).then_some(dims))
    }

    fn kind_for(&self, qualifiers: &Qualifiers) -> SymbolKind {
        match qualifiers.storage {
            StorageQualifier::Uniform => SymbolKind::Uniform,
            StorageQualifier::Attribute => SymbolKind::Attribute,
            StorageQualifier::Varying | StorageQualifier::Out => SymbolKind::Varying,
            StorageQualifier::In if self.stage == ShaderStage::Vertex => SymbolKind::Attribute,
            StorageQualifier::In => SymbolKind::Varying,
            _ => SymbolKind::Variable,
        }
    }

    fn resolve_type_at(&self, k: usize) -> Result<TypeInfo, AnalyzeError> {
        let name = self.text_at(k);
        self.table
            .resolve_type(name)
            .ok_or_else(|| self.error(k, format!("unknown type '{}'", name)))
    }

    fn name_at(&self, k: usize) -> Result<&'a str, AnalyzeError> {
        match self.kind_at(k) {
            Some(TokenKind::Identifier | TokenKind::BuiltinVariable) => Ok(self.text_at(k)),
            _ => Err(self.error(k, format!("expected a name, found '{}'", self.text_at(k)))),
        }
    }

    fn new_symbol(&self, k: usize, kind: SymbolKind, ty: TypeInfo) -> Symbol {
        let mut symbol = Symbol::new(self.text_at(k), kind, ty);
        if let Some(token) = self.token(k) {
            symbol.line = self.buffer.line(token);
            symbol.name_token = Some(token);
        }
        symbol
    }

    fn typed_declaration(&mut self, start: usize, qualifiers: Qualifiers) -> Result<(), AnalyzeError> {
        let ty = self.resolve_type_at(self.pos)?;
        self.pos += 1;
        let type_dims = self.array_dims()?;
        if self.is_punct(self.pos + 1, "(") {
            return self.function(start, qualifiers, ty);
        }
        self.declarators(start, &qualifiers, ty, type_dims)
    }

    fn declarators(
        &mut self,
        start: usize,
        qualifiers: &Qualifiers,
        ty: TypeInfo,
        type_dims: Dims,
    ) -> Result<(), AnalyzeError> {
        let kind = self.kind_for(qualifiers);
        let mut ids: Vec<SymbolId> = Vec::new();
        loop {
            let k = self.pos;
            self.name_at(k)?;
            self.pos += 1;
            let dims = concat_dims(type_dims.clone(), self.array_dims()?);
            if self.is_operator(self.pos, "=") {
                self.skip_to_top_level(&[",", ";"]);
            }

            let mut symbol = self.new_symbol(k, kind, ty.clone());
            symbol.qualifiers = qualifiers.clone();
            symbol.array_dims = dims;
            match self.table.declare(symbol) {
                Ok(id) => ids.push(id),
                Err(err) => self.errors.push(self.error(k, err.to_string())),
            }

            match self.text_at(self.pos) {
                "," => self.pos += 1,
                ";" => break,
                other => {
                    return Err(self.error(self.pos, format!("expected ',' or ';', found '{}'", other)))
                }
            }
        }
        let decl = self.decl_range(start, self.pos);
        self.pos += 1;
        for id in ids {
            self.table.get_mut(id).decl = decl.clone();
        }
        Ok(())
    }

    fn decl_range(&self, start: usize, end: usize) -> core::ops::Range<usize> {
        let first = self.token(start).unwrap_or(0);
        let last = self.token(end).unwrap_or(first);
        first..last + 1
    }

    /// Parse `{ members }` at `open`; leaves the position after the `}`.
    fn members(&mut self, open: usize, kind: SymbolKind) -> Result<Vec<Symbol>, AnalyzeError> {
        let close = self.matching(open)?;
        let mut members = Vec::new();
        self.pos = open + 1;
        while self.pos < close {
            let member_start = self.pos;
            if let Err(err) = self.member_declaration(kind, &mut members) {
                self.errors.push(err);
                self.pos = member_start;
                self.skip_to_top_level(&[";"]);
                self.pos += 1;
            }
        }
        self.pos = close + 1;
        Ok(members)
    }

    fn member_declaration(
        &mut self,
        kind: SymbolKind,
        members: &mut Vec<Symbol>,
    ) -> Result<(), AnalyzeError> {
        let qualifiers = self.qualifiers()?;
        let ty = self.resolve_type_at(self.pos)?;
        self.pos += 1;
        let type_dims = self.array_dims()?;
        loop {
            let k = self.pos;
            self.name_at(k)?;
            self.pos += 1;
            let mut member = self.new_symbol(k, kind, ty.clone());
            member.qualifiers = qualifiers.clone();
            member.array_dims = concat_dims(type_dims.clone(), self.array_dims()?);
            members.push(member);
            match self.text_at(self.pos) {
                "," => self.pos += 1,
                ";" => {
                    self.pos += 1;
                    return Ok(());
                }
                other => {
                    return Err(self.error(self.pos, format!("expected ',' or ';', found '{}'", other)))
                }
            }
        }
    }

    /// Parse `struct [Name] { ... }`, leaving the position after the `}`.
    fn struct_definition(&mut self) -> Result<TypeInfo, AnalyzeError> {
        let k = self.pos;
        let (name, open) = if self.kind_at(k + 1) == Some(TokenKind::Identifier) {
            (Some(k + 1), k + 2)
        } else {
            (None, k + 1)
        };
        if !self.is_punct(open, "{") {
            return Err(self.error(open, "expected '{' in struct declaration"));
        }
        let members = self.members(open, SymbolKind::Variable)?;
        let Some(name) = name else {
            return Ok(TypeInfo::structure(""));
        };

        let member_ids = members
            .into_iter()
            .map(|m| self.table.add_detached(m))
            .collect();
        let ty = TypeInfo::structure(self.text_at(name));
        let mut symbol = self.new_symbol(name, SymbolKind::Struct, ty.clone());
        symbol.members = member_ids;
        symbol.decl = self.decl_range(k, self.pos.saturating_sub(1));
        if let Err(err) = self.table.register_struct(symbol) {
            self.errors.push(self.error(name, err.to_string()));
        }
        Ok(ty)
    }

    fn block(&mut self, start: usize, qualifiers: Qualifiers) -> Result<(), AnalyzeError> {
        let name = self.pos;
        let (kind, member_kind) = match qualifiers.storage {
            StorageQualifier::Uniform => (SymbolKind::UniformBlock, SymbolKind::Uniform),
            StorageQualifier::Buffer => (SymbolKind::StorageBlock, SymbolKind::Variable),
            _ => (SymbolKind::InterfaceBlock, self.kind_for(&qualifiers)),
        };
        let members = self.members(name + 1, member_kind)?;

        let instance = if self.kind_at(self.pos) == Some(TokenKind::Identifier) {
            self.pos += 1;
            Some(self.pos - 1)
        } else {
            None
        };
        let dims = self.array_dims()?;
        if !self.is_punct(self.pos, ";") {
            return Err(self.error(self.pos, "expected ';' after interface block"));
        }
        let decl = self.decl_range(start, self.pos);
        self.pos += 1;

        let block_name = self.text_at(name);
        let mut member_ids = Vec::with_capacity(members.len());
        for mut member in members {
            member.decl = decl.clone();
            if instance.is_some() {
                member_ids.push(self.table.add_detached(member));
                continue;
            }
            let token = member.name_token;
            match self.table.declare(member) {
                Ok(id) => member_ids.push(id),
                Err(err) => {
                    let at = token.and_then(|t| self.sig.position_of(t)).unwrap_or(name);
                    self.errors.push(self.error(at, err.to_string()));
                }
            }
        }

        let mut symbol = self.new_symbol(name, kind, TypeInfo::structure(block_name));
        symbol.qualifiers = qualifiers;
        symbol.members = member_ids;
        symbol.array_dims = dims;
        symbol.decl = decl;
        symbol.block = Some(BlockInfo {
            block_name: String::from(block_name),
            instance_name: instance.map(|k| String::from(self.text_at(k))),
        });
        if let Err(err) = self.table.declare_block(symbol) {
            self.errors.push(self.error(instance.unwrap_or(name), err.to_string()));
        }
        Ok(())
    }

    fn function(
        &mut self,
        start: usize,
        qualifiers: Qualifiers,
        return_type: TypeInfo,
    ) -> Result<(), AnalyzeError> {
        let name = self.pos;
        self.name_at(name)?;
        let open = name + 1;
        let close = self.matching(open)?;
        let params = self.parameters(open, close);
        self.pos = close + 1;

        let mut symbol = self.new_symbol(name, SymbolKind::Function, return_type);
        symbol.qualifiers = qualifiers;

        if self.is_punct(self.pos, ";") {
            symbol.decl = self.decl_range(start, self.pos);
            symbol.params = params.into_iter().map(|p| self.table.add_detached(p)).collect();
            self.table.declare_function(symbol);
            self.pos += 1;
            return Ok(());
        }
        if !self.is_punct(self.pos, "{") {
            return Err(self.error(self.pos, "expected '{' or ';' after function header"));
        }

        let body_open = self.pos;
        let body_close = self.matching(body_open)?;
        let body = self.decl_range(body_open, body_close);
        symbol.decl = self.decl_range(start, body_close);
        symbol.body = Some(body.clone());
        let function = self.table.declare_function(symbol);

        self.table.push_scope(ScopeKind::Function, Some(body));
        let mut param_ids = Vec::with_capacity(params.len());
        for param in params {
            let token = param.name_token;
            let id = if param.name.is_empty() {
                Ok(self.table.add_detached(param))
            } else {
                self.table.declare(param)
            };
            match id {
                Ok(id) => param_ids.push(id),
                Err(err) => {
                    let at = token.and_then(|t| self.sig.position_of(t)).unwrap_or(name);
                    self.errors.push(self.error(at, err.to_string()));
                }
            }
        }
        self.table.pop_scope();
        self.table.get_mut(function).params = param_ids;
        self.pos = body_close + 1;
        Ok(())
    }

    /// Parse the parameter list between `open` and `close`. Errors are
    /// recorded and the offending parameter is dropped.
    fn parameters(&mut self, open: usize, close: usize) -> Vec<Symbol> {
        let (Some(open_token), Some(close_token)) = (self.token(open), self.token(close)) else {
            return Vec::new();
        };
        let ranges = split_arguments(self.buffer, open_token, close_token);
        let mut params = Vec::with_capacity(ranges.len());
        for range in ranges {
            let positions: Vec<usize> = range
                .filter_map(|t| self.sig.position_of(t))
                .collect();
            if positions.len() == 1 && self.text_at(positions[0]) == "void" {
                continue;
            }
            match self.parameter(&positions) {
                Ok(param) => params.push(param),
                Err(err) => self.errors.push(err),
            }
        }
        params
    }

    fn parameter(&self, positions: &[usize]) -> Result<Symbol, AnalyzeError> {
        let mut qualifiers = Qualifiers::default();
        let mut i = 0;
        while let Some(&k) = positions.get(i) {
            let is_qualifier = matches!(
                self.kind_at(k),
                Some(TokenKind::Qualifier | TokenKind::Precision)
            );
            if !is_qualifier || !qualifiers.apply_keyword(self.text_at(k)) {
                break;
            }
            i += 1;
        }
        let Some(&type_pos) = positions.get(i) else {
            let at = positions.first().copied().unwrap_or(self.pos);
            return Err(self.error(at, "missing parameter type"));
        };
        let ty = self.resolve_type_at(type_pos)?;

        // Dimensions may follow the type or the name.
        let mut dims: Vec<Option<u32>> = Vec::new();
        let mut name_pos = None;
        for &k in &positions[i + 1..] {
            match self.kind_at(k) {
                Some(TokenKind::Identifier) if name_pos.is_none() => name_pos = Some(k),
                Some(TokenKind::IntLiteral | TokenKind::UintLiteral) => {
                    let size = self
                        .token(k)
                        .and_then(|t| self.buffer.literal_value(t))
                        .and_then(|v| v.as_u32());
                    if let Some(last) = dims.last_mut() {
                        *last = size;
                    }
                }
                Some(TokenKind::Punctuation) if self.text_at(k) == "[" => dims.push(None),
                _ => {}
            }
        }

        let mut param = match name_pos {
            Some(k) => self.new_symbol(k, SymbolKind::Parameter, ty),
            None => {
                let mut anonymous = Symbol::new("", SymbolKind::Parameter, ty);
                anonymous.line = self.token(type_pos).map_or(0, |t| self.buffer.line(t));
                anonymous
            }
        };
        param.qualifiers = qualifiers;
        param.array_dims = (!dims.is_empty()).then_some(dims);
        Ok(param)
    }
}

fn is_block_storage(storage: StorageQualifier) -> bool {
    matches!(
        storage,
        StorageQualifier::Uniform
            | StorageQualifier::Buffer
            | StorageQualifier::In
            | StorageQualifier::Out
    )
}

fn concat_dims(outer: Dims, inner: Dims) -> Dims {
    match (outer, inner) {
        (None, None) => None,
        (Some(dims), None) | (None, Some(dims)) => Some(dims),
        (Some(mut outer), Some(inner)) => {
            outer.extend(inner);
            Some(outer)
        }
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec;

    use super::*;
    use crate::{analyze::types::SamplerDim, token::tokenize};

    fn run(src: &str, stage: ShaderStage) -> Analysis {
        let (buffer, _) = tokenize(src).unwrap();
        analyze(&buffer, stage)
    }

    #[test]
    fn test_globals_and_kinds() {
        let analysis = run(
            "in vec3 position;\nuniform mat4 mvp, model;\nout vec2 uv[2];\nconst float k = 1.0;",
            ShaderStage::Vertex,
        );
        assert_eq!(analysis.error_count(), 0, "{:?}", analysis.diagnostics);
        let table = &analysis.symbols;
        assert_eq!(table.lookup("position").unwrap().kind, SymbolKind::Attribute);
        assert_eq!(table.lookup("model").unwrap().kind, SymbolKind::Uniform);
        let uv = table.lookup("uv").unwrap();
        assert_eq!(uv.kind, SymbolKind::Varying);
        assert_eq!(uv.array_dims, Some(vec![Some(2)]));
        assert_eq!(table.lookup("k").unwrap().kind, SymbolKind::Variable);
    }

    #[test]
    fn test_fragment_inputs_are_varyings() {
        let analysis = run("in vec2 vUv; out vec4 color;", ShaderStage::Fragment);
        assert_eq!(analysis.symbols.lookup("vUv").unwrap().kind, SymbolKind::Varying);
        assert_eq!(analysis.symbols.lookup("color").unwrap().kind, SymbolKind::Varying);
    }

    #[test]
    fn test_layout_and_interpolation() {
        let analysis = run(
            "layout(location = 3) flat out ivec2 ids;",
            ShaderStage::Vertex,
        );
        let ids = analysis.symbols.lookup("ids").unwrap();
        assert_eq!(ids.qualifiers.location(), 3);
        assert_eq!(
            ids.qualifiers.interpolation,
            Some(crate::analyze::qualifiers::Interpolation::Flat)
        );
        assert!(ids.ty.is_integer());
    }

    #[test]
    fn test_struct_registers_type() {
        let analysis = run(
            "struct Light { vec3 dir; float power[2]; };\nuniform Light lights[4];",
            ShaderStage::Fragment,
        );
        assert_eq!(analysis.error_count(), 0, "{:?}", analysis.diagnostics);
        let light = analysis.symbols.struct_symbol("Light").unwrap();
        assert_eq!(light.members.len(), 2);
        let lights = analysis.symbols.lookup("lights").unwrap();
        assert_eq!(lights.ty.name, "Light");
        assert_eq!(lights.array_len(), 4);
    }

    #[test]
    fn test_blocks() {
        let analysis = run(
            "layout(std140) uniform Globals { mat4 view; vec4 tint; } globals;\n\
             uniform Lights { vec4 color; };",
            ShaderStage::Fragment,
        );
        assert_eq!(analysis.error_count(), 0, "{:?}", analysis.diagnostics);
        let blocks: Vec<_> = analysis.symbols.blocks().collect();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].name, "globals");
        assert_eq!(blocks[0].members.len(), 2);
        assert_eq!(
            blocks[1].block.as_ref().unwrap().instance_name,
            None
        );
        // Anonymous block members are visible by name.
        assert_eq!(analysis.symbols.lookup("color").unwrap().kind, SymbolKind::Uniform);
        assert!(analysis.symbols.lookup("view").is_none());
    }

    #[test]
    fn test_function_parameters_scoped_to_body() {
        let src = "uniform sampler2D tex;\n\
                   vec4 shade(samplerCube tex, vec3 dir) { return texture(tex, dir); }\n\
                   void main() { gl_FragColor = texture(tex, vec2(0.0)); }";
        let (buffer, _) = tokenize(src).unwrap();
        let analysis = analyze(&buffer, ShaderStage::Fragment);
        assert_eq!(analysis.error_count(), 0, "{:?}", analysis.diagnostics);

        let uses: Vec<usize> = (0..buffer.len()).filter(|&i| buffer.is(i, "tex")).collect();
        assert_eq!(uses.len(), 4);
        let inner = analysis.type_at("tex", uses[2]).unwrap();
        assert_eq!(inner.sampler_dim(), Some(SamplerDim::Cube));
        let outer = analysis.type_at("tex", uses[3]).unwrap();
        assert_eq!(outer.sampler_dim(), Some(SamplerDim::D2));

        let shade = analysis.symbols.functions("shade");
        assert_eq!(shade.len(), 1);
        assert_eq!(analysis.symbols.get(shade[0]).params.len(), 2);
        let main = analysis.symbols.functions("main");
        assert!(analysis.symbols.get(main[0]).params.is_empty());
    }

    #[test]
    fn test_prototypes_and_void_params() {
        let analysis = run("float f(in float x, out int y[2]);\nvoid g(void);", ShaderStage::Vertex);
        assert_eq!(analysis.error_count(), 0, "{:?}", analysis.diagnostics);
        let f = analysis.symbols.get(analysis.symbols.functions("f")[0]);
        let y = analysis.symbols.get(f.params[1]);
        assert_eq!(y.array_dims, Some(vec![Some(2)]));
        assert!(analysis.symbols.get(analysis.symbols.functions("g")[0]).params.is_empty());
    }

    #[test]
    fn test_precision_and_workgroup() {
        let analysis = run(
            "precision highp float;\nlayout(local_size_x = 8, local_size_y = 8) in;",
            ShaderStage::Compute,
        );
        assert_eq!(analysis.error_count(), 0, "{:?}", analysis.diagnostics);
        assert_eq!(analysis.symbols.default_precision("float"), Some(Precision::Highp));
        assert_eq!(analysis.symbols.workgroup_size(), Some([8, 8, 1]));
    }

    #[test]
    fn test_unknown_type_resyncs() {
        let analysis = run(
            "uniform Foo bar;\nuniform vec4 ok;\nvoid main() { }",
            ShaderStage::Fragment,
        );
        assert_eq!(analysis.error_count(), 1);
        let diag = analysis.diagnostics.errors().next().unwrap();
        assert_eq!(diag.phase, Phase::Analyze);
        assert!(diag.message.contains("unknown type 'Foo'"));
        assert_eq!(diag.line, 1);
        assert!(analysis.symbols.lookup("ok").is_some());
        assert_eq!(analysis.symbols.functions("main").len(), 1);
    }

    #[test]
    fn test_garbage_resyncs_past_braces() {
        let analysis = run(
            "garbage { x y z }\nuniform float a;",
            ShaderStage::Fragment,
        );
        assert!(analysis.error_count() >= 1);
        assert!(analysis.symbols.lookup("a").is_some());
    }

    #[test]
    fn test_redeclaration_reported() {
        let analysis = run("uniform float a;\nuniform vec2 a;", ShaderStage::Fragment);
        assert_eq!(analysis.error_count(), 1);
        assert!(analysis.diagnostics.contains_message("already declared"));
    }

    #[test]
    fn test_invariant_redeclaration() {
        let analysis = run("invariant gl_Position;\nin vec4 p;", ShaderStage::Vertex);
        assert_eq!(analysis.error_count(), 0, "{:?}", analysis.diagnostics);
        assert!(analysis.symbols.lookup("p").is_some());
    }

    #[test]
    fn test_initializers_skipped() {
        let analysis = run(
            "const vec3 a = vec3(1.0, 2.0, 3.0), b = vec3(0.0);\nconst float c[2] = float[2](1.0, 2.0);",
            ShaderStage::Fragment,
        );
        assert_eq!(analysis.error_count(), 0, "{:?}", analysis.diagnostics);
        assert!(analysis.symbols.lookup("b").is_some());
        assert_eq!(analysis.symbols.lookup("c").unwrap().array_len(), 2);
    }
}
