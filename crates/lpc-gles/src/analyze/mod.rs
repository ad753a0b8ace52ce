//! Declaration-level semantic analysis.

mod analyzer;
mod qualifiers;
mod symbols;
mod types;

pub use analyzer::{analyze, Analysis, AnalyzeError};
pub use qualifiers::{
    parse_layout, BlockLayout, Interpolation, LayoutQualifier, MemoryQualifiers, Precision,
    Qualifiers, StorageQualifier,
};
pub use symbols::{
    BlockInfo, DeclareError, ScopeId, ScopeKind, Symbol, SymbolId, SymbolKind, SymbolTable,
};
pub use types::{signed_equivalent, SamplerDim, ScalarBase, TypeCategory, TypeInfo};
