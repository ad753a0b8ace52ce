//! GLSL ES version-downgrade transpiler.
//!
//! Rewrites shaders written for a newer GLSL ES version so they compile on
//! drivers that only accept an older one:
//! - GLSL ES 3.20 -> 3.10 -> 3.00 -> 1.00, one tier boundary at a time
//! - macro preprocessing with `#include` support
//! - declaration-level analysis to pick the right legacy sampling functions
//! - explicit attribute and output locations extracted for the caller to bind
//!
//! Problems in the shader never abort a transpilation. They are reported as
//! diagnostics next to the best output the pipeline could produce.

#![no_std]

extern crate alloc;
#[cfg(feature = "std")]
extern crate std;

pub mod analyze;
mod bindings;
mod downgrade;
mod error;
mod extensions;
pub mod intrinsics;
mod pipeline;
pub mod preprocess;
mod textual;
mod tier;
pub mod token;

pub use bindings::{
    extract_bindings, extract_bindings_from_lines, AttributeBinding, BindingTable, LayoutStripper,
    OutputBinding, MAX_DRAW_BUFFERS, MAX_VERTEX_ATTRIBS,
};
pub use downgrade::RequiredUniform;
pub use error::{
    Diagnostic, Diagnostics, Phase, Severity, TranspileError, TranspileResult,
};
pub use extensions::{parse_extension_directive, ExtensionSet};
pub use pipeline::{
    transpile, Pipeline, PipelineMode, TranspileOptions, TranspileOutput, TranspileRequest,
};
#[cfg(feature = "std")]
pub use preprocess::FsIncludeResolver;
pub use preprocess::{preprocess, IncludeResolver, MemoryIncludes, NoIncludes, PreprocessOptions};
pub use tier::{detect_tier, parse_version_directive, ShaderStage, Tier, VersionDirective};
