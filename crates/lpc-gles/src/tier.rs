//! Shading-language tiers and shader stages.
//!
//! The four tiers are ordered by capability, lowest first. Each tier is a strict
//! superset of every tier below it.

use core::fmt;

use nom::{
    bytes::complete::{tag, take_while1},
    character::complete::{char, space0, space1},
    combinator::{map_res, opt},
    sequence::preceded,
    IResult,
};

/// GLSL ES version tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Tier {
    /// Tier 0: GLSL ES 1.00
    Es100,
    /// Tier 1: GLSL ES 3.00
    Es300,
    /// Tier 2: GLSL ES 3.10
    Es310,
    /// Tier 3: GLSL ES 3.20
    Es320,
}

impl Tier {
    /// All tiers, lowest first.
    pub const ALL: [Tier; 4] = [Tier::Es100, Tier::Es300, Tier::Es310, Tier::Es320];

    /// Numeric tier index (0..=3).
    pub fn index(self) -> u8 {
        match self {
            Tier::Es100 => 0,
            Tier::Es300 => 1,
            Tier::Es310 => 2,
            Tier::Es320 => 3,
        }
    }

    /// Tier from its numeric index.
    pub fn from_index(index: u8) -> Option<Self> {
        Self::ALL.get(index as usize).copied()
    }

    /// The tier directly below this one.
    pub fn lower(self) -> Option<Self> {
        self.index().checked_sub(1).and_then(Self::from_index)
    }

    /// Version number as used by `__VERSION__`.
    pub fn version_number(self) -> u32 {
        match self {
            Tier::Es100 => 100,
            Tier::Es300 => 300,
            Tier::Es310 => 310,
            Tier::Es320 => 320,
        }
    }

    /// The exact `#version` directive text for this tier.
    pub fn version_directive(self) -> &'static str {
        match self {
            Tier::Es100 => "#version 100",
            Tier::Es300 => "#version 300 es",
            Tier::Es310 => "#version 310 es",
            Tier::Es320 => "#version 320 es",
        }
    }

    /// Map a version number (and profile) to a tier.
    ///
    /// ES versions map exactly; desktop versions are bucketed by the feature
    /// level they roughly correspond to.
    pub fn from_version(number: u32, profile: Option<&str>) -> Option<Self> {
        if profile == Some("es") {
            return match number {
                300 => Some(Tier::Es300),
                310 => Some(Tier::Es310),
                320 => Some(Tier::Es320),
                _ => None,
            };
        }
        match number {
            100 => Some(Tier::Es100),
            110..=120 => Some(Tier::Es100),
            130..=399 => Some(Tier::Es300),
            400..=429 => Some(Tier::Es310),
            430..=999 => Some(Tier::Es320),
            _ => None,
        }
    }

    /// Whether this tier has the generic `texture()` family of built-ins.
    pub fn has_generic_sampling(self) -> bool {
        self >= Tier::Es300
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::Es100 => f.write_str("GLSL ES 1.00"),
            Tier::Es300 => f.write_str("GLSL ES 3.00"),
            Tier::Es310 => f.write_str("GLSL ES 3.10"),
            Tier::Es320 => f.write_str("GLSL ES 3.20"),
        }
    }
}

/// Pipeline stage a shader is compiled for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
    Compute,
    Geometry,
    TessControl,
    TessEvaluation,
}

impl ShaderStage {
    /// Lowest tier in which this stage exists.
    pub fn minimum_tier(self) -> Tier {
        match self {
            ShaderStage::Vertex | ShaderStage::Fragment => Tier::Es100,
            ShaderStage::Compute => Tier::Es310,
            ShaderStage::Geometry | ShaderStage::TessControl | ShaderStage::TessEvaluation => {
                Tier::Es320
            }
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "vertex",
            ShaderStage::Fragment => "fragment",
            ShaderStage::Compute => "compute",
            ShaderStage::Geometry => "geometry",
            ShaderStage::TessControl => "tessellation control",
            ShaderStage::TessEvaluation => "tessellation evaluation",
        }
    }
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A parsed `#version` directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionDirective {
    pub number: u32,
    pub es: bool,
}

impl VersionDirective {
    /// Tier this directive selects.
    pub fn tier(&self) -> Option<Tier> {
        Tier::from_version(self.number, if self.es { Some("es") } else { None })
    }
}

fn version_number(input: &str) -> IResult<&str, u32> {
    map_res(take_while1(|c: char| c.is_ascii_digit()), |s: &str| {
        s.parse::<u32>()
    })(input)
}

fn profile(input: &str) -> IResult<&str, &str> {
    preceded(space1, take_while1(|c: char| c.is_ascii_alphabetic()))(input)
}

fn version_directive(input: &str) -> IResult<&str, VersionDirective> {
    let (input, _) = space0(input)?;
    let (input, _) = char('#')(input)?;
    let (input, _) = space0(input)?;
    let (input, _) = tag("version")(input)?;
    let (input, _) = space1(input)?;
    let (input, number) = version_number(input)?;
    let (input, profile) = opt(profile)(input)?;
    Ok((
        input,
        VersionDirective {
            number,
            es: profile == Some("es"),
        },
    ))
}

/// Parse a `#version` directive line.
///
/// Returns `None` if the line is not a well-formed version directive.
pub fn parse_version_directive(line: &str) -> Option<VersionDirective> {
    version_directive(line).ok().map(|(_, directive)| directive)
}

/// Detect the tier of a shader from its first `#version` directive.
///
/// Shaders without a version directive are GLSL ES 1.00.
pub fn detect_tier(source: &str) -> Option<Tier> {
    for line in source.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with('#') {
            if let Some(directive) = parse_version_directive(trimmed) {
                return directive.tier();
            }
        }
    }
    Some(Tier::Es100)
}
