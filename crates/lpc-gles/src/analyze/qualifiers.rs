//! Declaration qualifiers and `layout(...)` parsing.

use alloc::{string::String, vec::Vec};

use bitflags::bitflags;
use nom::{
    branch::alt,
    bytes::complete::take_while1,
    character::complete::{char, multispace0},
    combinator::{map, map_opt, opt, recognize},
    multi::separated_list0,
    sequence::{delimited, pair, preceded},
    IResult,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorageQualifier {
    #[default]
    None,
    Const,
    In,
    Out,
    InOut,
    Uniform,
    Buffer,
    Shared,
    Attribute,
    Varying,
}

impl StorageQualifier {
    pub fn from_keyword(word: &str) -> Option<Self> {
        Some(match word {
            "const" => StorageQualifier::Const,
            "in" => StorageQualifier::In,
            "out" => StorageQualifier::Out,
            "inout" => StorageQualifier::InOut,
            "uniform" => StorageQualifier::Uniform,
            "buffer" => StorageQualifier::Buffer,
            "shared" => StorageQualifier::Shared,
            "attribute" => StorageQualifier::Attribute,
            "varying" => StorageQualifier::Varying,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precision {
    Lowp,
    Mediump,
    Highp,
}

impl Precision {
    pub fn from_keyword(word: &str) -> Option<Self> {
        Some(match word {
            "lowp" => Precision::Lowp,
            "mediump" => Precision::Mediump,
            "highp" => Precision::Highp,
            _ => return None,
        })
    }

    pub fn keyword(self) -> &'static str {
        match self {
            Precision::Lowp => "lowp",
            Precision::Mediump => "mediump",
            Precision::Highp => "highp",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interpolation {
    Smooth,
    Flat,
    NoPerspective,
}

impl Interpolation {
    pub fn from_keyword(word: &str) -> Option<Self> {
        Some(match word {
            "smooth" => Interpolation::Smooth,
            "flat" => Interpolation::Flat,
            "noperspective" => Interpolation::NoPerspective,
            _ => return None,
        })
    }
}

bitflags! {
    /// Memory access qualifiers on images and buffer blocks.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct MemoryQualifiers: u8 {
        const COHERENT = 1 << 0;
        const VOLATILE = 1 << 1;
        const RESTRICT = 1 << 2;
        const READONLY = 1 << 3;
        const WRITEONLY = 1 << 4;
    }
}

impl MemoryQualifiers {
    pub fn from_keyword(word: &str) -> Option<Self> {
        Some(match word {
            "coherent" => MemoryQualifiers::COHERENT,
            "volatile" => MemoryQualifiers::VOLATILE,
            "restrict" => MemoryQualifiers::RESTRICT,
            "readonly" => MemoryQualifiers::READONLY,
            "writeonly" => MemoryQualifiers::WRITEONLY,
            _ => return None,
        })
    }
}

bitflags! {
    /// Value-less block layout keys.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct BlockLayout: u8 {
        const STD140 = 1 << 0;
        const STD430 = 1 << 1;
        const PACKED = 1 << 2;
        const SHARED = 1 << 3;
    }
}

/// Parsed `layout(...)` contents. Integer fields are -1 when unset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutQualifier {
    pub location: i32,
    pub binding: i32,
    pub set: i32,
    pub index: i32,
    pub offset: i32,
    pub local_size: [i32; 3],
    pub block: BlockLayout,
    /// Keys not recognized above, with their values if any
    pub other: Vec<(String, Option<i64>)>,
}

impl Default for LayoutQualifier {
    fn default() -> Self {
        Self {
            location: -1,
            binding: -1,
            set: -1,
            index: -1,
            offset: -1,
            local_size: [-1; 3],
            block: BlockLayout::empty(),
            other: Vec::new(),
        }
    }
}

impl LayoutQualifier {
    pub fn has_location(&self) -> bool {
        self.location >= 0
    }

    pub fn has_binding(&self) -> bool {
        self.binding >= 0
    }

    pub fn has_local_size(&self) -> bool {
        self.local_size.iter().any(|&v| v >= 0)
    }

    pub fn has_key(&self, key: &str) -> bool {
        self.other.iter().any(|(k, _)| k == key)
    }

    /// Merge a later layout into this one; set values in `other` win.
    pub fn merge(&mut self, other: LayoutQualifier) {
        let merge = |a: &mut i32, b: i32| {
            if b >= 0 {
                *a = b;
            }
        };
        merge(&mut self.location, other.location);
        merge(&mut self.binding, other.binding);
        merge(&mut self.set, other.set);
        merge(&mut self.index, other.index);
        merge(&mut self.offset, other.offset);
        for axis in 0..3 {
            merge(&mut self.local_size[axis], other.local_size[axis]);
        }
        self.block |= other.block;
        self.other.extend(other.other);
    }

    fn apply(&mut self, key: &str, value: Option<i64>) {
        let v = value.map_or(-1, |v| v as i32);
        match key {
            "location" => self.location = v,
            "binding" => self.binding = v,
            "set" => self.set = v,
            "index" => self.index = v,
            "offset" => self.offset = v,
            "local_size_x" => self.local_size[0] = v,
            "local_size_y" => self.local_size[1] = v,
            "local_size_z" => self.local_size[2] = v,
            "std140" => self.block |= BlockLayout::STD140,
            "std430" => self.block |= BlockLayout::STD430,
            "packed" => self.block |= BlockLayout::PACKED,
            "shared" => self.block |= BlockLayout::SHARED,
            _ => self.other.push((String::from(key), value)),
        }
    }
}

fn identifier(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        take_while1(|c: char| c.is_ascii_alphabetic() || c == '_'),
        opt(take_while1(|c: char| c.is_ascii_alphanumeric() || c == '_')),
    ))(input)
}

fn layout_int(input: &str) -> IResult<&str, i64> {
    let hex = map_opt(
        preceded(
            alt((nom::bytes::complete::tag("0x"), nom::bytes::complete::tag("0X"))),
            take_while1(|c: char| c.is_ascii_hexdigit()),
        ),
        |digits: &str| i64::from_str_radix(digits, 16).ok(),
    );
    let decimal = map_opt(take_while1(|c: char| c.is_ascii_digit()), |digits: &str| {
        digits.parse::<i64>().ok()
    });
    let (input, negative) = opt(char('-'))(input)?;
    let (input, value) = alt((hex, decimal))(input)?;
    let (input, _) = opt(alt((char('u'), char('U'))))(input)?;
    Ok((input, if negative.is_some() { -value } else { value }))
}

fn layout_entry(input: &str) -> IResult<&str, (&str, Option<i64>)> {
    let (input, key) = delimited(multispace0, identifier, multispace0)(input)?;
    let (input, value) = opt(preceded(
        pair(char('='), multispace0),
        map(pair(layout_int, multispace0), |(v, _)| v),
    ))(input)?;
    Ok((input, (key, value)))
}

fn layout_entries(input: &str) -> IResult<&str, Vec<(&str, Option<i64>)>> {
    separated_list0(char(','), layout_entry)(input)
}

/// Parse the text between the parentheses of `layout(...)`.
///
/// Returns `None` when the text is not a comma-separated list of `key` or
/// `key = integer` entries.
pub fn parse_layout(text: &str) -> Option<LayoutQualifier> {
    let (rest, entries) = layout_entries(text).ok()?;
    if !rest.trim().is_empty() {
        return None;
    }
    let mut layout = LayoutQualifier::default();
    for (key, value) in entries {
        layout.apply(key, value);
    }
    Some(layout)
}

/// Every qualifier that can precede a declaration's type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Qualifiers {
    pub storage: StorageQualifier,
    pub precision: Option<Precision>,
    pub interpolation: Option<Interpolation>,
    pub memory: MemoryQualifiers,
    pub invariant: bool,
    pub precise: bool,
    pub centroid: bool,
    pub sample: bool,
    pub patch: bool,
    pub layout: Option<LayoutQualifier>,
}

impl Qualifiers {
    /// Apply one qualifier keyword. Returns false if `word` is not one.
    pub fn apply_keyword(&mut self, word: &str) -> bool {
        if let Some(storage) = StorageQualifier::from_keyword(word) {
            // `centroid in` / `centroid out` keep the storage direction.
            self.storage = storage;
        } else if let Some(precision) = Precision::from_keyword(word) {
            self.precision = Some(precision);
        } else if let Some(interp) = Interpolation::from_keyword(word) {
            self.interpolation = Some(interp);
        } else if let Some(memory) = MemoryQualifiers::from_keyword(word) {
            self.memory |= memory;
        } else {
            match word {
                "invariant" => self.invariant = true,
                "precise" => self.precise = true,
                "centroid" => self.centroid = true,
                "sample" => self.sample = true,
                "patch" => self.patch = true,
                _ => return false,
            }
        }
        true
    }

    /// Merge a `layout(...)`; repeated layouts accumulate.
    pub fn merge_layout(&mut self, layout: LayoutQualifier) {
        match &mut self.layout {
            None => self.layout = Some(layout),
            Some(existing) => existing.merge(layout),
        }
    }

    pub fn location(&self) -> i32 {
        self.layout.as_ref().map_or(-1, |l| l.location)
    }

    pub fn binding(&self) -> i32 {
        self.layout.as_ref().map_or(-1, |l| l.binding)
    }

    pub fn set(&self) -> i32 {
        self.layout.as_ref().map_or(-1, |l| l.set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_layout_keys() {
        let layout = parse_layout("location = 2, index=1").unwrap();
        assert_eq!(layout.location, 2);
        assert_eq!(layout.index, 1);
        assert_eq!(layout.binding, -1);

        let block = parse_layout(" std140, binding = 3 , set=0").unwrap();
        assert!(block.block.contains(BlockLayout::STD140));
        assert_eq!(block.binding, 3);
        assert_eq!(block.set, 0);

        let compute = parse_layout("local_size_x = 8, local_size_y = 0x4").unwrap();
        assert_eq!(compute.local_size, [8, 4, -1]);
        assert!(compute.has_local_size());
    }

    #[test]
    fn test_parse_layout_unknown_keys() {
        let layout = parse_layout("blend_support_all_equations, max_vertices = 3").unwrap();
        assert!(layout.has_key("blend_support_all_equations"));
        assert_eq!(layout.other[1], (String::from("max_vertices"), Some(3)));
    }

    #[test]
    fn test_parse_layout_rejects_garbage() {
        assert!(parse_layout("location = = 1").is_none());
        assert!(parse_layout("location = x").is_none());
    }

    #[test]
    fn test_qualifier_keywords() {
        let mut q = Qualifiers::default();
        for word in ["flat", "centroid", "in", "highp", "readonly", "coherent"] {
            assert!(q.apply_keyword(word));
        }
        assert!(!q.apply_keyword("vec4"));
        assert_eq!(q.storage, StorageQualifier::In);
        assert_eq!(q.interpolation, Some(Interpolation::Flat));
        assert_eq!(q.precision, Some(Precision::Highp));
        assert!(q.centroid);
        assert!(q.memory.contains(MemoryQualifiers::READONLY | MemoryQualifiers::COHERENT));
    }

    #[test]
    fn test_merge_layout() {
        let mut q = Qualifiers::default();
        q.merge_layout(parse_layout("location = 1").unwrap());
        q.merge_layout(parse_layout("index = 1").unwrap());
        assert_eq!(q.location(), 1);
        assert_eq!(q.layout.as_ref().unwrap().index, 1);
    }
}
