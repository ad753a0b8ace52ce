//! Process-wide keyword and built-in tables.
//!
//! Built once on first use and never mutated afterwards; safe to read from any
//! number of concurrent pipelines.

use alloc::{format, string::String};

use hashbrown::{HashMap, HashSet};
use spin::Lazy;

use super::TokenKind;

const BOOL_LITERALS: &[&str] = &["true", "false"];

/// Built-in variables and their declared types.
const BUILTIN_VARIABLES: &[(&str, &str)] = &[
    ("gl_Position", "vec4"),
    ("gl_PointSize", "float"),
    ("gl_FragCoord", "vec4"),
    ("gl_FrontFacing", "bool"),
    ("gl_FragColor", "vec4"),
    ("gl_FragData", "vec4"),
    ("gl_PointCoord", "vec2"),
    ("gl_FragDepth", "float"),
    ("gl_FragDepthEXT", "float"),
    ("gl_VertexID", "int"),
    ("gl_InstanceID", "int"),
    ("gl_PrimitiveID", "int"),
    ("gl_PrimitiveIDIn", "int"),
    ("gl_Layer", "int"),
    ("gl_ViewportIndex", "int"),
    ("gl_SampleID", "int"),
    ("gl_SamplePosition", "vec2"),
    ("gl_SampleMaskIn", "int"),
    ("gl_SampleMask", "int"),
    ("gl_HelperInvocation", "bool"),
    ("gl_InvocationID", "int"),
    ("gl_PatchVerticesIn", "int"),
    ("gl_TessLevelOuter", "float"),
    ("gl_TessLevelInner", "float"),
    ("gl_TessCoord", "vec3"),
    ("gl_BoundingBox", "vec4"),
    ("gl_in", "gl_PerVertex"),
    ("gl_out", "gl_PerVertex"),
    ("gl_NumWorkGroups", "uvec3"),
    ("gl_WorkGroupSize", "uvec3"),
    ("gl_WorkGroupID", "uvec3"),
    ("gl_LocalInvocationID", "uvec3"),
    ("gl_GlobalInvocationID", "uvec3"),
    ("gl_LocalInvocationIndex", "uint"),
    ("gl_DepthRange", "gl_DepthRangeParameters"),
    ("gl_MaxVertexAttribs", "int"),
    ("gl_MaxVertexUniformVectors", "int"),
    ("gl_MaxVaryingVectors", "int"),
    ("gl_MaxVertexTextureImageUnits", "int"),
    ("gl_MaxCombinedTextureImageUnits", "int"),
    ("gl_MaxTextureImageUnits", "int"),
    ("gl_MaxFragmentUniformVectors", "int"),
    ("gl_MaxDrawBuffers", "int"),
];

const SAMPLING_FUNCTIONS: &[&str] = &[
    "texture",
    "textureProj",
    "textureLod",
    "textureOffset",
    "texelFetch",
    "texelFetchOffset",
    "textureProjOffset",
    "textureLodOffset",
    "textureProjLod",
    "textureProjLodOffset",
    "textureGrad",
    "textureGradOffset",
    "textureProjGrad",
    "textureProjGradOffset",
    "textureSize",
    "textureGather",
    "textureGatherOffset",
    "textureGatherOffsets",
    "texture2D",
    "texture2DProj",
    "texture2DLod",
    "texture2DProjLod",
    "texture2DLodEXT",
    "texture2DProjLodEXT",
    "texture2DGradEXT",
    "texture2DProjGradEXT",
    "textureCube",
    "textureCubeLod",
    "textureCubeLodEXT",
    "textureCubeGradEXT",
    "texture3D",
    "texture3DProj",
    "texture3DLod",
    "texture3DProjLod",
    "shadow2DEXT",
    "shadow2DProjEXT",
];

const GENERAL_FUNCTIONS: &[&str] = &[
    "radians", "degrees", "sin", "cos", "tan", "asin", "acos", "atan", "sinh", "cosh", "tanh",
    "asinh", "acosh", "atanh", "pow", "exp", "log", "exp2", "log2", "sqrt", "inversesqrt", "abs",
    "sign", "floor", "trunc", "round", "roundEven", "ceil", "fract", "mod", "modf", "min", "max",
    "clamp", "mix", "step", "smoothstep", "isnan", "isinf", "floatBitsToInt", "floatBitsToUint",
    "intBitsToFloat", "uintBitsToFloat", "fma", "frexp", "ldexp", "packSnorm2x16",
    "packUnorm2x16", "packHalf2x16", "unpackSnorm2x16", "unpackUnorm2x16", "unpackHalf2x16",
    "packUnorm4x8", "packSnorm4x8", "unpackUnorm4x8", "unpackSnorm4x8", "length", "distance",
    "dot", "cross", "normalize", "faceforward", "reflect", "refract", "matrixCompMult",
    "outerProduct", "transpose", "determinant", "inverse", "lessThan", "lessThanEqual",
    "greaterThan", "greaterThanEqual", "equal", "notEqual", "any", "all", "not", "uaddCarry",
    "usubBorrow", "umulExtended", "imulExtended", "bitfieldExtract", "bitfieldInsert",
    "bitfieldReverse", "bitCount", "findLSB", "findMSB", "dFdx", "dFdy", "fwidth",
    "interpolateAtCentroid", "interpolateAtSample", "interpolateAtOffset", "EmitVertex",
    "EndPrimitive", "barrier", "memoryBarrier", "memoryBarrierAtomicCounter",
    "memoryBarrierBuffer", "memoryBarrierImage", "memoryBarrierShared", "groupMemoryBarrier",
    "atomicCounterIncrement", "atomicCounterDecrement", "atomicCounter", "atomicAdd", "atomicMin",
    "atomicMax", "atomicAnd", "atomicOr", "atomicXor", "atomicExchange", "atomicCompSwap",
    "imageLoad", "imageStore", "imageSize", "imageSamples", "imageAtomicAdd", "imageAtomicMin",
    "imageAtomicMax", "imageAtomicAnd", "imageAtomicOr", "imageAtomicXor",
    "imageAtomicExchange", "imageAtomicCompSwap",
];

const SCALAR_AND_VECTOR_TYPES: &[&str] = &[
    "void", "bool", "int", "uint", "float", "double", "vec2", "vec3", "vec4", "ivec2", "ivec3",
    "ivec4", "uvec2", "uvec3", "uvec4", "bvec2", "bvec3", "bvec4", "dvec2", "dvec3", "dvec4",
    "atomic_uint", "samplerExternalOES",
];

/// Dimension suffixes shared by sampler and image type names.
const OPAQUE_DIMS: &[&str] = &[
    "1D",
    "2D",
    "3D",
    "Cube",
    "2DRect",
    "1DArray",
    "2DArray",
    "CubeArray",
    "Buffer",
    "2DMS",
    "2DMSArray",
];

const SHADOW_DIMS: &[&str] = &[
    "1D",
    "2D",
    "Cube",
    "2DRect",
    "1DArray",
    "2DArray",
    "CubeArray",
];

const QUALIFIERS: &[&str] = &[
    "const",
    "in",
    "out",
    "inout",
    "uniform",
    "buffer",
    "shared",
    "attribute",
    "varying",
    "centroid",
    "sample",
    "patch",
    "flat",
    "smooth",
    "noperspective",
    "invariant",
    "precise",
    "layout",
    "coherent",
    "volatile",
    "restrict",
    "readonly",
    "writeonly",
];

const PRECISIONS: &[&str] = &["highp", "mediump", "lowp", "precision"];

const KEYWORDS: &[&str] = &[
    "if", "else", "for", "while", "do", "switch", "case", "default", "break", "continue",
    "return", "discard", "struct",
];

/// Read-only keyword and built-in tables.
#[derive(Debug)]
pub struct BuiltinTables {
    bool_literals: HashSet<&'static str>,
    builtin_variables: HashMap<&'static str, &'static str>,
    builtin_functions: HashSet<&'static str>,
    sampling_functions: HashSet<&'static str>,
    types: HashSet<String>,
    qualifiers: HashSet<&'static str>,
    precisions: HashSet<&'static str>,
    keywords: HashSet<&'static str>,
}

impl BuiltinTables {
    fn build() -> Self {
        let mut types: HashSet<String> = SCALAR_AND_VECTOR_TYPES
            .iter()
            .map(|s| String::from(*s))
            .collect();
        for prefix in ["", "d"] {
            for cols in 2..=4 {
                types.insert(format!("{}mat{}", prefix, cols));
                for rows in 2..=4 {
                    types.insert(format!("{}mat{}x{}", prefix, cols, rows));
                }
            }
        }
        for prefix in ["", "i", "u"] {
            for dim in OPAQUE_DIMS {
                types.insert(format!("{}sampler{}", prefix, dim));
                types.insert(format!("{}image{}", prefix, dim));
            }
        }
        for dim in SHADOW_DIMS {
            types.insert(format!("sampler{}Shadow", dim));
        }

        let sampling_functions: HashSet<&'static str> =
            SAMPLING_FUNCTIONS.iter().copied().collect();
        let mut builtin_functions: HashSet<&'static str> =
            GENERAL_FUNCTIONS.iter().copied().collect();
        builtin_functions.extend(sampling_functions.iter().copied());

        Self {
            bool_literals: BOOL_LITERALS.iter().copied().collect(),
            builtin_variables: BUILTIN_VARIABLES.iter().copied().collect(),
            builtin_functions,
            sampling_functions,
            types,
            qualifiers: QUALIFIERS.iter().copied().collect(),
            precisions: PRECISIONS.iter().copied().collect(),
            keywords: KEYWORDS.iter().copied().collect(),
        }
    }

    /// Classify an identifier-shaped word.
    ///
    /// Priority: boolean literal, built-in variable, built-in function, type,
    /// qualifier, precision, keyword, plain identifier.
    pub fn classify(&self, word: &str) -> TokenKind {
        if self.bool_literals.contains(word) {
            TokenKind::BoolLiteral
        } else if self.builtin_variables.contains_key(word) {
            TokenKind::BuiltinVariable
        } else if self.builtin_functions.contains(word) {
            TokenKind::BuiltinFunction
        } else if self.types.contains(word) {
            TokenKind::TypeKeyword
        } else if self.qualifiers.contains(word) {
            TokenKind::Qualifier
        } else if self.precisions.contains(word) {
            TokenKind::Precision
        } else if self.keywords.contains(word) {
            TokenKind::Keyword
        } else {
            TokenKind::Identifier
        }
    }

    pub fn is_type(&self, word: &str) -> bool {
        self.types.contains(word)
    }

    pub fn is_builtin_function(&self, word: &str) -> bool {
        self.builtin_functions.contains(word)
    }

    pub fn is_sampling_function(&self, word: &str) -> bool {
        self.sampling_functions.contains(word)
    }

    /// Declared type of a built-in variable.
    pub fn builtin_variable_type(&self, name: &str) -> Option<&'static str> {
        self.builtin_variables.get(name).copied()
    }

    /// Iterate built-in variables with their types.
    pub fn builtin_variables(&self) -> impl Iterator<Item = (&'static str, &'static str)> + '_ {
        BUILTIN_VARIABLES.iter().copied()
    }

    /// Iterate built-in function names.
    pub fn builtin_functions(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.builtin_functions.iter().copied()
    }
}

static TABLES: Lazy<BuiltinTables> = Lazy::new(BuiltinTables::build);

/// Shared built-in tables, constructed on first access.
pub fn builtin_tables() -> &'static BuiltinTables {
    &TABLES
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_priority() {
        let tables = builtin_tables();
        assert_eq!(tables.classify("true"), TokenKind::BoolLiteral);
        assert_eq!(tables.classify("gl_Position"), TokenKind::BuiltinVariable);
        assert_eq!(tables.classify("texture"), TokenKind::BuiltinFunction);
        assert_eq!(tables.classify("sampler2DShadow"), TokenKind::TypeKeyword);
        assert_eq!(tables.classify("uniform"), TokenKind::Qualifier);
        assert_eq!(tables.classify("highp"), TokenKind::Precision);
        assert_eq!(tables.classify("switch"), TokenKind::Keyword);
        assert_eq!(tables.classify("vUv"), TokenKind::Identifier);
    }

    #[test]
    fn test_generated_types() {
        let tables = builtin_tables();
        assert!(tables.is_type("mat2x3"));
        assert!(tables.is_type("dmat4"));
        assert!(tables.is_type("usampler2DArray"));
        assert!(tables.is_type("iimage3D"));
        assert!(!tables.is_type("isampler2DShadow"));
    }

    #[test]
    fn test_builtin_variable_type() {
        let tables = builtin_tables();
        assert_eq!(tables.builtin_variable_type("gl_FragCoord"), Some("vec4"));
        assert_eq!(tables.builtin_variable_type("not_builtin"), None);
    }

    #[test]
    fn test_same_instance() {
        assert!(core::ptr::eq(builtin_tables(), builtin_tables()));
    }
}
