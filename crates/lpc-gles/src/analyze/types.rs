//! Type metadata.
//!
//! Only the facts stored in [`TypeInfo`] are kept; sampler dimensionality,
//! shadow-ness and integer-ness are derived from the type name on demand.

use alloc::string::String;
use core::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeCategory {
    Void,
    Scalar,
    Vector,
    Matrix,
    Sampler,
    Image,
    Atomic,
    Struct,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarBase {
    Bool,
    Int,
    Uint,
    Float,
    Double,
}

/// Dimensionality of a sampler or image type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SamplerDim {
    D1,
    D2,
    D3,
    Cube,
    Rect,
    D1Array,
    D2Array,
    CubeArray,
    D2Multisample,
    D2MultisampleArray,
    Buffer,
    External,
}

impl SamplerDim {
    fn from_suffix(suffix: &str) -> Option<Self> {
        Some(match suffix {
            "1D" => SamplerDim::D1,
            "2D" => SamplerDim::D2,
            "3D" => SamplerDim::D3,
            "Cube" => SamplerDim::Cube,
            "2DRect" => SamplerDim::Rect,
            "1DArray" => SamplerDim::D1Array,
            "2DArray" => SamplerDim::D2Array,
            "CubeArray" => SamplerDim::CubeArray,
            "2DMS" => SamplerDim::D2Multisample,
            "2DMSArray" => SamplerDim::D2MultisampleArray,
            "Buffer" => SamplerDim::Buffer,
            "ExternalOES" => SamplerDim::External,
            _ => return None,
        })
    }

    /// Suffix used in type names (`sampler<suffix>`).
    pub fn suffix(self) -> &'static str {
        match self {
            SamplerDim::D1 => "1D",
            SamplerDim::D2 => "2D",
            SamplerDim::D3 => "3D",
            SamplerDim::Cube => "Cube",
            SamplerDim::Rect => "2DRect",
            SamplerDim::D1Array => "1DArray",
            SamplerDim::D2Array => "2DArray",
            SamplerDim::CubeArray => "CubeArray",
            SamplerDim::D2Multisample => "2DMS",
            SamplerDim::D2MultisampleArray => "2DMSArray",
            SamplerDim::Buffer => "Buffer",
            SamplerDim::External => "ExternalOES",
        }
    }
}

impl fmt::Display for SamplerDim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

/// Resolved type of a declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeInfo {
    pub name: String,
    /// False for struct-backed types
    pub builtin: bool,
    pub category: TypeCategory,
    /// `None` for opaque, struct and void types
    pub base: Option<ScalarBase>,
    /// Component count for vectors; 1 for scalars
    pub vector_len: u8,
    pub columns: u8,
    pub rows: u8,
}

fn digit(c: u8) -> Option<u8> {
    matches!(c, b'2'..=b'4').then_some(c - b'0')
}

impl TypeInfo {
    fn builtin(name: &str, category: TypeCategory, base: Option<ScalarBase>) -> Self {
        Self {
            name: String::from(name),
            builtin: true,
            category,
            base,
            vector_len: 1,
            columns: 0,
            rows: 0,
        }
    }

    /// Type metadata for a built-in type name.
    pub fn from_name(name: &str) -> Option<Self> {
        let scalar = |base| Some(Self::builtin(name, TypeCategory::Scalar, Some(base)));
        match name {
            "void" => return Some(Self::builtin(name, TypeCategory::Void, None)),
            "bool" => return scalar(ScalarBase::Bool),
            "int" => return scalar(ScalarBase::Int),
            "uint" => return scalar(ScalarBase::Uint),
            "float" => return scalar(ScalarBase::Float),
            "double" => return scalar(ScalarBase::Double),
            "atomic_uint" => {
                return Some(Self::builtin(name, TypeCategory::Atomic, Some(ScalarBase::Uint)))
            }
            "samplerExternalOES" => {
                return Some(Self::builtin(name, TypeCategory::Sampler, None));
            }
            _ => {}
        }

        let bytes = name.as_bytes();
        // Vectors: [b|i|u|d]vecN
        if let Some(pos) = name.find("vec") {
            let base = match &name[..pos] {
                "" => ScalarBase::Float,
                "b" => ScalarBase::Bool,
                "i" => ScalarBase::Int,
                "u" => ScalarBase::Uint,
                "d" => ScalarBase::Double,
                _ => return None,
            };
            if bytes.len() != pos + 4 {
                return None;
            }
            let n = digit(bytes[pos + 3])?;
            let mut info = Self::builtin(name, TypeCategory::Vector, Some(base));
            info.vector_len = n;
            return Some(info);
        }

        // Matrices: [d]matN or [d]matCxR
        let (base, rest) = if let Some(rest) = name.strip_prefix("dmat") {
            (ScalarBase::Double, rest)
        } else if let Some(rest) = name.strip_prefix("mat") {
            (ScalarBase::Float, rest)
        } else {
            return Self::opaque(name);
        };
        let rb = rest.as_bytes();
        let (columns, rows) = match rb.len() {
            1 => {
                let n = digit(rb[0])?;
                (n, n)
            }
            3 if rb[1] == b'x' => (digit(rb[0])?, digit(rb[2])?),
            _ => return None,
        };
        let mut info = Self::builtin(name, TypeCategory::Matrix, Some(base));
        info.columns = columns;
        info.rows = rows;
        info.vector_len = rows;
        Some(info)
    }

    fn opaque(name: &str) -> Option<Self> {
        let unprefixed = name
            .strip_prefix('i')
            .or_else(|| name.strip_prefix('u'))
            .filter(|rest| rest.starts_with("sampler") || rest.starts_with("image"))
            .unwrap_or(name);
        let (category, dims) = if let Some(dims) = unprefixed.strip_prefix("sampler") {
            (TypeCategory::Sampler, dims.strip_suffix("Shadow").unwrap_or(dims))
        } else if let Some(dims) = unprefixed.strip_prefix("image") {
            (TypeCategory::Image, dims)
        } else {
            return None;
        };
        SamplerDim::from_suffix(dims)?;
        Some(Self::builtin(name, category, None))
    }

    /// Type metadata for a user struct.
    pub fn structure(name: &str) -> Self {
        Self {
            name: String::from(name),
            builtin: false,
            category: TypeCategory::Struct,
            base: None,
            vector_len: 0,
            columns: 0,
            rows: 0,
        }
    }

    pub fn is_opaque(&self) -> bool {
        matches!(
            self.category,
            TypeCategory::Sampler | TypeCategory::Image | TypeCategory::Atomic
        )
    }

    pub fn is_sampler(&self) -> bool {
        self.category == TypeCategory::Sampler
    }

    /// The `i` or `u` prefix of an integer sampler or image name.
    fn opaque_prefix(&self) -> Option<u8> {
        if !matches!(self.category, TypeCategory::Sampler | TypeCategory::Image) {
            return None;
        }
        let rest = self.name.get(1..)?;
        if rest.starts_with("sampler") || rest.starts_with("image") {
            self.name.as_bytes().first().copied()
        } else {
            None
        }
    }

    /// Name with any `i`/`u` prefix removed.
    fn opaque_stem(&self) -> &str {
        match self.opaque_prefix() {
            Some(_) => &self.name[1..],
            None => &self.name,
        }
    }

    /// Dimensionality of a sampler or image type.
    pub fn sampler_dim(&self) -> Option<SamplerDim> {
        let stem = self.opaque_stem();
        let dims = stem
            .strip_prefix("sampler")
            .or_else(|| stem.strip_prefix("image"))?;
        SamplerDim::from_suffix(dims.strip_suffix("Shadow").unwrap_or(dims))
    }

    pub fn is_shadow(&self) -> bool {
        self.category == TypeCategory::Sampler && self.name.ends_with("Shadow")
    }

    /// Integer scalars/vectors, and integer samplers/images.
    pub fn is_integer(&self) -> bool {
        match self.category {
            TypeCategory::Sampler | TypeCategory::Image => self.opaque_prefix().is_some(),
            _ => matches!(self.base, Some(ScalarBase::Int) | Some(ScalarBase::Uint)),
        }
    }

    pub fn is_unsigned(&self) -> bool {
        match self.category {
            TypeCategory::Sampler | TypeCategory::Image => self.opaque_prefix() == Some(b'u'),
            _ => self.base == Some(ScalarBase::Uint),
        }
    }

    /// Consecutive attribute locations one value of this type consumes.
    pub fn location_slots(&self) -> u32 {
        match self.category {
            TypeCategory::Matrix => {
                let per_column = if self.base == Some(ScalarBase::Double) && self.rows > 2 {
                    2
                } else {
                    1
                };
                self.columns as u32 * per_column
            }
            TypeCategory::Vector
                if self.base == Some(ScalarBase::Double) && self.vector_len > 2 =>
            {
                2
            }
            _ => 1,
        }
    }

    /// Floating-point type with the same shape, for integer demotion.
    pub fn float_equivalent(&self) -> Option<&'static str> {
        if !matches!(self.base, Some(ScalarBase::Int) | Some(ScalarBase::Uint)) {
            return None;
        }
        Some(match (self.category, self.vector_len) {
            (TypeCategory::Scalar, _) => "float",
            (TypeCategory::Vector, 2) => "vec2",
            (TypeCategory::Vector, 3) => "vec3",
            (TypeCategory::Vector, 4) => "vec4",
            _ => return None,
        })
    }

    /// Float sampler with the same dimensionality, for integer samplers.
    pub fn float_sampler_equivalent(&self) -> Option<String> {
        if !(self.is_sampler() && self.is_integer()) {
            return None;
        }
        Some(String::from(&self.name[1..]))
    }
}

/// Signed counterpart of an unsigned type name.
pub fn signed_equivalent(name: &str) -> Option<&'static str> {
    Some(match name {
        "uint" => "int",
        "uvec2" => "ivec2",
        "uvec3" => "ivec3",
        "uvec4" => "ivec4",
        _ => return None,
    })
}

impl fmt::Display for TypeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vectors_and_matrices() {
        let v = TypeInfo::from_name("ivec3").unwrap();
        assert_eq!(v.category, TypeCategory::Vector);
        assert_eq!(v.base, Some(ScalarBase::Int));
        assert_eq!(v.vector_len, 3);
        assert!(v.is_integer());

        let m = TypeInfo::from_name("mat3x4").unwrap();
        assert_eq!((m.columns, m.rows), (3, 4));
        assert_eq!(m.location_slots(), 3);
        assert_eq!(TypeInfo::from_name("mat4").unwrap().location_slots(), 4);
        assert_eq!(TypeInfo::from_name("dmat4").unwrap().location_slots(), 8);
        assert!(TypeInfo::from_name("vec5").is_none());
        assert!(TypeInfo::from_name("Light").is_none());
    }

    #[test]
    fn test_sampler_derivation() {
        let s = TypeInfo::from_name("sampler2DShadow").unwrap();
        assert_eq!(s.sampler_dim(), Some(SamplerDim::D2));
        assert!(s.is_shadow());
        assert!(!s.is_integer());

        let c = TypeInfo::from_name("samplerCube").unwrap();
        assert_eq!(c.sampler_dim(), Some(SamplerDim::Cube));

        let u = TypeInfo::from_name("usampler2DArray").unwrap();
        assert_eq!(u.sampler_dim(), Some(SamplerDim::D2Array));
        assert!(u.is_integer() && u.is_unsigned());
        assert_eq!(u.float_sampler_equivalent().as_deref(), Some("sampler2DArray"));

        let e = TypeInfo::from_name("samplerExternalOES").unwrap();
        assert_eq!(e.sampler_dim(), Some(SamplerDim::External));

        let img = TypeInfo::from_name("iimage2D").unwrap();
        assert_eq!(img.category, TypeCategory::Image);
        assert_eq!(img.sampler_dim(), Some(SamplerDim::D2));
        assert!(img.is_integer());

        let float_img = TypeInfo::from_name("image3D").unwrap();
        assert_eq!(float_img.sampler_dim(), Some(SamplerDim::D3));
        assert!(!float_img.is_integer());
    }

    #[test]
    fn test_equivalents() {
        assert_eq!(TypeInfo::from_name("ivec2").unwrap().float_equivalent(), Some("vec2"));
        assert_eq!(TypeInfo::from_name("uint").unwrap().float_equivalent(), Some("float"));
        assert_eq!(TypeInfo::from_name("vec2").unwrap().float_equivalent(), None);
        assert_eq!(signed_equivalent("uvec3"), Some("ivec3"));
        assert_eq!(signed_equivalent("vec3"), None);
    }

    #[test]
    fn test_struct() {
        let s = TypeInfo::structure("Light");
        assert!(!s.builtin);
        assert_eq!(s.category, TypeCategory::Struct);
        assert_eq!(s.sampler_dim(), None);
    }
}
