//! Symbol table for declaration-level analysis.
//!
//! Symbols live in one arena and are referenced by [`SymbolId`]. Scopes form a
//! parent-linked tree stored in a second arena; popping a scope only moves the
//! cursor back to its parent, so function scopes stay available for
//! position-based lookups after analysis finishes.

use alloc::{string::String, vec::Vec};
use core::{fmt, ops::Range};

use hashbrown::HashMap;

use super::{
    qualifiers::{Precision, Qualifiers},
    types::TypeInfo,
};
use crate::token::builtin_tables;

pub type SymbolId = usize;
pub type ScopeId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SymbolKind {
    Variable,
    Parameter,
    Uniform,
    /// Vertex input
    Attribute,
    /// Stage interface variable other than a vertex input
    Varying,
    UniformBlock,
    StorageBlock,
    InterfaceBlock,
    Function,
    Struct,
}

impl SymbolKind {
    pub fn is_block(self) -> bool {
        matches!(
            self,
            SymbolKind::UniformBlock | SymbolKind::StorageBlock | SymbolKind::InterfaceBlock
        )
    }
}

/// Names attached to an interface block declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockInfo {
    pub block_name: String,
    pub instance_name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Symbol {
    pub name: String,
    pub kind: SymbolKind,
    pub builtin: bool,
    pub ty: TypeInfo,
    pub scope: ScopeId,
    pub qualifiers: Qualifiers,
    /// `None` for non-arrays; a `None` entry is an unsized or non-literal dimension
    pub array_dims: Option<Vec<Option<u32>>>,
    /// Parameter symbols of a function
    pub params: Vec<SymbolId>,
    /// Member symbols of a struct or block
    pub members: Vec<SymbolId>,
    pub block: Option<BlockInfo>,
    pub line: u32,
    pub name_token: Option<usize>,
    /// Token range of the whole declaration statement
    pub decl: Range<usize>,
    /// Token range of a function body, braces included
    pub body: Option<Range<usize>>,
}

impl Symbol {
    pub fn new(name: impl Into<String>, kind: SymbolKind, ty: TypeInfo) -> Self {
        Self {
            name: name.into(),
            kind,
            builtin: false,
            ty,
            scope: 0,
            qualifiers: Qualifiers::default(),
            array_dims: None,
            params: Vec::new(),
            members: Vec::new(),
            block: None,
            line: 0,
            name_token: None,
            decl: 0..0,
            body: None,
        }
    }

    pub fn is_array(&self) -> bool {
        self.array_dims.is_some()
    }

    /// Length of the outermost array dimension, 1 for non-arrays.
    pub fn array_len(&self) -> u32 {
        match &self.array_dims {
            Some(dims) => dims.first().copied().flatten().unwrap_or(1),
            None => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Global,
    File,
    Function,
    Block,
    LoopInit,
    Conditional,
}

#[derive(Debug, Clone)]
struct Scope {
    kind: ScopeKind,
    parent: Option<ScopeId>,
    symbols: HashMap<String, SymbolId>,
    functions: HashMap<String, Vec<SymbolId>>,
    /// Tokens covered by the scope, when known
    range: Option<Range<usize>>,
}

impl Scope {
    fn new(kind: ScopeKind, parent: Option<ScopeId>, range: Option<Range<usize>>) -> Self {
        Self {
            kind,
            parent,
            symbols: HashMap::new(),
            functions: HashMap::new(),
            range,
        }
    }

    fn is_persistent(&self) -> bool {
        matches!(self.kind, ScopeKind::Global | ScopeKind::File)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeclareError {
    AlreadyDeclared { name: String, line: u32 },
}

impl fmt::Display for DeclareError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeclareError::AlreadyDeclared { name, line } => {
                write!(f, "'{}' already declared on line {}", name, line)
            }
        }
    }
}

const GLOBAL_SCOPE: ScopeId = 0;
const FILE_SCOPE: ScopeId = 1;

/// Symbol table for one shader.
#[derive(Debug, Clone)]
pub struct SymbolTable {
    symbols: Vec<Symbol>,
    scopes: Vec<Scope>,
    current: ScopeId,
    /// Global and file scope names, file scope shadowing global
    cache: HashMap<String, SymbolId>,
    structs: HashMap<String, SymbolId>,
    blocks: Vec<SymbolId>,
    default_precisions: HashMap<String, Precision>,
    workgroup_size: Option<[i32; 3]>,
}

impl SymbolTable {
    /// Create a table with the global scope holding the built-in variables and
    /// an empty file scope as the current scope.
    pub fn new() -> Self {
        let mut table = Self {
            symbols: Vec::new(),
            scopes: Vec::new(),
            current: GLOBAL_SCOPE,
            cache: HashMap::new(),
            structs: HashMap::new(),
            blocks: Vec::new(),
            default_precisions: HashMap::new(),
            workgroup_size: None,
        };
        table.scopes.push(Scope::new(ScopeKind::Global, None, None));
        for (name, type_name) in builtin_tables().builtin_variables() {
            let Some(ty) = TypeInfo::from_name(type_name) else {
                continue;
            };
            let mut symbol = Symbol::new(name, SymbolKind::Variable, ty);
            symbol.builtin = true;
            // Cannot collide: built-in names are unique.
            let _ = table.declare(symbol);
        }
        table
            .scopes
            .push(Scope::new(ScopeKind::File, Some(GLOBAL_SCOPE), None));
        table.current = FILE_SCOPE;
        table
    }

    pub fn current_scope(&self) -> ScopeId {
        self.current
    }

    pub fn scope_kind(&self, scope: ScopeId) -> ScopeKind {
        self.scopes[scope].kind
    }

    /// Number of scopes between the current scope and the global scope.
    pub fn scope_depth(&self) -> usize {
        let mut depth = 0;
        let mut scope = self.current;
        while let Some(parent) = self.scopes[scope].parent {
            depth += 1;
            scope = parent;
        }
        depth
    }

    /// Open a child of the current scope covering `range` tokens, if known.
    pub fn push_scope(&mut self, kind: ScopeKind, range: Option<Range<usize>>) -> ScopeId {
        let id = self.scopes.len();
        self.scopes.push(Scope::new(kind, Some(self.current), range));
        self.current = id;
        id
    }

    /// Return to the parent scope. The global and file scopes are never popped.
    pub fn pop_scope(&mut self) {
        let scope = &self.scopes[self.current];
        if scope.is_persistent() {
            return;
        }
        if let Some(parent) = scope.parent {
            self.current = parent;
        }
    }

    /// Declare a symbol in the current scope.
    pub fn declare(&mut self, mut symbol: Symbol) -> Result<SymbolId, DeclareError> {
        let scope = self.current;
        if let Some(&existing) = self.scopes[scope].symbols.get(&symbol.name) {
            return Err(DeclareError::AlreadyDeclared {
                name: symbol.name,
                line: self.symbols[existing].line,
            });
        }
        let id = self.symbols.len();
        symbol.scope = scope;
        let name = symbol.name.clone();
        self.symbols.push(symbol);
        if self.scopes[scope].is_persistent() {
            self.cache.insert(name.clone(), id);
        }
        self.scopes[scope].symbols.insert(name, id);
        Ok(id)
    }

    /// Declare a function in the file scope. Overloads accumulate.
    pub fn declare_function(&mut self, mut symbol: Symbol) -> SymbolId {
        let id = self.symbols.len();
        symbol.scope = FILE_SCOPE;
        let name = symbol.name.clone();
        self.symbols.push(symbol);
        self.scopes[FILE_SCOPE]
            .functions
            .entry(name)
            .or_default()
            .push(id);
        id
    }

    /// Record an interface block. Only an instance name enters the scope;
    /// members of an anonymous block are declared separately by the caller.
    pub fn declare_block(&mut self, mut symbol: Symbol) -> Result<SymbolId, DeclareError> {
        let instance = symbol.block.as_ref().and_then(|b| b.instance_name.clone());
        let id = match instance {
            Some(instance) => {
                symbol.name = instance;
                self.declare(symbol)?
            }
            None => {
                let id = self.symbols.len();
                symbol.scope = self.current;
                self.symbols.push(symbol);
                id
            }
        };
        self.blocks.push(id);
        Ok(id)
    }

    /// Add a symbol that is not reachable by name, such as a struct member.
    pub fn add_detached(&mut self, mut symbol: Symbol) -> SymbolId {
        symbol.scope = self.current;
        self.symbols.push(symbol);
        self.symbols.len() - 1
    }

    /// Declare a struct and register its name as a type.
    pub fn register_struct(&mut self, symbol: Symbol) -> Result<SymbolId, DeclareError> {
        let name = symbol.name.clone();
        let id = self.declare(symbol)?;
        self.structs.insert(name, id);
        Ok(id)
    }

    pub fn struct_symbol(&self, name: &str) -> Option<&Symbol> {
        self.structs.get(name).map(|&id| &self.symbols[id])
    }

    pub fn is_struct(&self, name: &str) -> bool {
        self.structs.contains_key(name)
    }

    /// Resolve a type name to a built-in or a declared struct type.
    pub fn resolve_type(&self, name: &str) -> Option<TypeInfo> {
        TypeInfo::from_name(name).or_else(|| self.is_struct(name).then(|| TypeInfo::structure(name)))
    }

    fn lookup_from(&self, scope: ScopeId, name: &str) -> Option<&Symbol> {
        let mut cursor = Some(scope);
        while let Some(id) = cursor {
            let scope = &self.scopes[id];
            if scope.is_persistent() {
                break;
            }
            if let Some(&symbol) = scope.symbols.get(name) {
                return Some(&self.symbols[symbol]);
            }
            cursor = scope.parent;
        }
        self.cache.get(name).map(|&id| &self.symbols[id])
    }

    /// Look up a name from the current scope outward.
    pub fn lookup(&self, name: &str) -> Option<&Symbol> {
        self.lookup_from(self.current, name)
    }

    /// Look up a name as seen from the token at `token`.
    ///
    /// The innermost recorded scope whose token range contains `token` is the
    /// starting point; tokens outside every such scope see file scope.
    pub fn lookup_at(&self, name: &str, token: usize) -> Option<&Symbol> {
        let scope = self
            .scopes
            .iter()
            .enumerate()
            .filter_map(|(id, scope)| {
                let range = scope.range.as_ref()?;
                range.contains(&token).then_some((id, range.len()))
            })
            .min_by_key(|&(_, len)| len)
            .map_or(FILE_SCOPE, |(id, _)| id);
        self.lookup_from(scope, name)
    }

    /// All overloads of a user function.
    pub fn functions(&self, name: &str) -> &[SymbolId] {
        self.scopes[FILE_SCOPE]
            .functions
            .get(name)
            .map_or(&[], Vec::as_slice)
    }

    pub fn get(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id]
    }

    pub fn get_mut(&mut self, id: SymbolId) -> &mut Symbol {
        &mut self.symbols[id]
    }

    /// All user-declared symbols in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.iter().filter(|s| !s.builtin)
    }

    /// User-declared file-scope symbols of one kind.
    pub fn globals_of_kind(&self, kind: SymbolKind) -> impl Iterator<Item = &Symbol> {
        self.symbols
            .iter()
            .filter(move |s| !s.builtin && s.kind == kind && s.scope == FILE_SCOPE)
    }

    pub fn blocks(&self) -> impl Iterator<Item = &Symbol> {
        self.blocks.iter().map(|&id| &self.symbols[id])
    }

    pub fn set_default_precision(&mut self, type_name: &str, precision: Precision) {
        self.default_precisions
            .insert(String::from(type_name), precision);
    }

    pub fn default_precision(&self, type_name: &str) -> Option<Precision> {
        self.default_precisions.get(type_name).copied()
    }

    pub fn set_workgroup_size(&mut self, size: [i32; 3]) {
        self.workgroup_size = Some(size);
    }

    pub fn workgroup_size(&self) -> Option<[i32; 3]> {
        self.workgroup_size
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(name: &str, ty: &str) -> Symbol {
        Symbol::new(name, SymbolKind::Variable, TypeInfo::from_name(ty).unwrap())
    }

    #[test]
    fn test_builtins_visible_and_shadowable() {
        let mut table = SymbolTable::new();
        let frag = table.lookup("gl_FragCoord").unwrap();
        assert!(frag.builtin);
        assert_eq!(frag.ty.name, "vec4");

        table.declare(var("gl_FragCoord", "vec2")).unwrap();
        assert_eq!(table.lookup("gl_FragCoord").unwrap().ty.name, "vec2");
    }

    #[test]
    fn test_scoping() {
        let mut table = SymbolTable::new();
        table.declare(var("x", "int")).unwrap();
        table.push_scope(ScopeKind::Function, Some(10..20));
        table.declare(var("x", "float")).unwrap();
        table.declare(var("y", "bool")).unwrap();
        assert_eq!(table.lookup("x").unwrap().ty.name, "float");
        assert!(table.lookup("y").is_some());
        assert_eq!(table.scope_depth(), 2);

        table.pop_scope();
        assert_eq!(table.lookup("x").unwrap().ty.name, "int");
        assert!(table.lookup("y").is_none());

        // File scope stays put.
        table.pop_scope();
        table.pop_scope();
        assert_eq!(table.scope_kind(table.current_scope()), ScopeKind::File);
    }

    #[test]
    fn test_redeclaration_rejected() {
        let mut table = SymbolTable::new();
        let mut first = var("x", "int");
        first.line = 3;
        table.declare(first).unwrap();
        let err = table.declare(var("x", "float")).unwrap_err();
        assert_eq!(
            err,
            DeclareError::AlreadyDeclared {
                name: String::from("x"),
                line: 3
            }
        );
    }

    #[test]
    fn test_lookup_at_uses_enclosing_function() {
        let mut table = SymbolTable::new();
        table.declare(var("s", "sampler2D")).unwrap();
        table.push_scope(ScopeKind::Function, Some(10..20));
        table.declare(var("s", "samplerCube")).unwrap();
        table.pop_scope();

        assert_eq!(table.lookup_at("s", 15).unwrap().ty.name, "samplerCube");
        assert_eq!(table.lookup_at("s", 25).unwrap().ty.name, "sampler2D");
        assert_eq!(table.lookup("s").unwrap().ty.name, "sampler2D");
    }

    #[test]
    fn test_function_overloads_and_structs() {
        let mut table = SymbolTable::new();
        let void = TypeInfo::from_name("void").unwrap();
        table.declare_function(Symbol::new("f", SymbolKind::Function, void.clone()));
        table.declare_function(Symbol::new("f", SymbolKind::Function, void));
        assert_eq!(table.functions("f").len(), 2);
        assert!(table.functions("g").is_empty());

        let light = Symbol::new("Light", SymbolKind::Struct, TypeInfo::structure("Light"));
        table.register_struct(light).unwrap();
        let ty = table.resolve_type("Light").unwrap();
        assert!(!ty.builtin);
        assert!(table.resolve_type("Missing").is_none());
        assert!(table.resolve_type("mat3").is_some());
    }
}
