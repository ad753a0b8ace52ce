//! Explicit attribute and fragment-output locations.
//!
//! Locations written as `layout(location = N)` have no tier-0 syntax. They are
//! extracted into a [`BindingTable`] that the graphics backend applies before
//! linking. Extraction hands out the only [`LayoutStripper`], so layouts can
//! never be stripped before their locations were recorded.

use alloc::{
    format,
    string::{String, ToString},
    vec::Vec,
};

use crate::{
    analyze::{parse_layout, TypeInfo},
    downgrade::scan::{remove_tidy, top_level},
    error::{Diagnostics, Phase},
    tier::ShaderStage,
    token::{Significant, TokenBuffer, TokenKind},
};

/// Typical number of vertex attribute slots.
pub const MAX_VERTEX_ATTRIBS: u32 = 16;
/// Typical number of fragment output slots.
pub const MAX_DRAW_BUFFERS: u32 = 8;

/// A vertex input with an explicit location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeBinding {
    pub name: String,
    pub location: u32,
    pub type_name: String,
    pub line: u32,
    /// Consecutive locations consumed, array length included
    pub slots: u32,
}

impl AttributeBinding {
    pub fn locations(&self) -> core::ops::Range<u32> {
        self.location..self.location.saturating_add(self.slots)
    }
}

/// A fragment output with an explicit location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputBinding {
    pub name: String,
    pub location: u32,
    /// Blend index for dual-source blending
    pub index: u32,
    pub type_name: String,
    pub line: u32,
    pub array_len: u32,
}

/// Locations the backend must bind before linking.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BindingTable {
    pub attributes: Vec<AttributeBinding>,
    pub outputs: Vec<OutputBinding>,
}

impl BindingTable {
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty() && self.outputs.is_empty()
    }

    /// Location of a vertex attribute. With conflicting declarations the
    /// first one wins.
    pub fn attribute_location(&self, name: &str) -> Option<u32> {
        self.attributes
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.location)
    }

    /// Location and blend index of a fragment output.
    pub fn output_location(&self, name: &str) -> Option<(u32, u32)> {
        self.outputs
            .iter()
            .find(|o| o.name == name)
            .map(|o| (o.location, o.index))
    }

    fn add_attribute(&mut self, binding: AttributeBinding, diagnostics: &mut Diagnostics) {
        for existing in &self.attributes {
            let a = existing.locations();
            let b = binding.locations();
            if a.start < b.end && b.start < a.end {
                diagnostics.error(
                    Phase::Transform,
                    binding.line,
                    1,
                    format!(
                        "attribute '{}' at location {} overlaps attribute '{}' (locations {}..{})",
                        binding.name,
                        binding.location,
                        existing.name,
                        a.start,
                        a.end.saturating_sub(1)
                    ),
                );
            }
        }
        if binding.locations().end > MAX_VERTEX_ATTRIBS {
            diagnostics.warning(
                Phase::Transform,
                binding.line,
                1,
                format!(
                    "attribute '{}' uses location {} beyond the typical limit of {} slots",
                    binding.name,
                    binding.locations().end.saturating_sub(1),
                    MAX_VERTEX_ATTRIBS
                ),
            );
        }
        self.attributes.push(binding);
    }

    fn add_output(&mut self, binding: OutputBinding, diagnostics: &mut Diagnostics) {
        let end = binding.location.saturating_add(binding.array_len);
        for existing in &self.outputs {
            let existing_end = existing.location.saturating_add(existing.array_len);
            let overlaps = existing.index == binding.index
                && existing.location < end
                && binding.location < existing_end;
            if overlaps {
                diagnostics.error(
                    Phase::Transform,
                    binding.line,
                    1,
                    format!(
                        "output '{}' at location {} (index {}) overlaps output '{}'",
                        binding.name, binding.location, binding.index, existing.name
                    ),
                );
            }
        }
        if end > MAX_DRAW_BUFFERS {
            diagnostics.warning(
                Phase::Transform,
                binding.line,
                1,
                format!(
                    "output '{}' uses location {} beyond the typical limit of {} draw buffers",
                    binding.name,
                    end.saturating_sub(1),
                    MAX_DRAW_BUFFERS
                ),
            );
        }
        self.outputs.push(binding);
    }
}

/// Proof that locations were extracted; the only way to strip layouts.
#[derive(Debug)]
pub struct LayoutStripper {
    _extracted: (),
}

impl LayoutStripper {
    /// Remove every `layout(...)` qualifier from `buffer`. Returns the number
    /// removed.
    pub fn strip(self, buffer: &mut TokenBuffer) -> usize {
        let sig = Significant::new(buffer);
        let mut stripped = 0;
        for (k, token) in sig.iter().enumerate() {
            if buffer.kind(token) != TokenKind::Qualifier || buffer.text(token) != "layout" {
                continue;
            }
            let Some(open) = sig.at(k + 1).filter(|&t| buffer.is(t, "(")) else {
                continue;
            };
            let Some(close) = crate::token::matching_close(buffer, open) else {
                continue;
            };
            remove_tidy(buffer, token..close + 1);
            stripped += 1;
        }
        log::debug!("stripped {} layout qualifiers", stripped);
        stripped
    }
}

/// Which declarations carry bindings in `stage`.
fn binding_storage(stage: ShaderStage) -> Option<&'static str> {
    match stage {
        ShaderStage::Vertex => Some("in"),
        ShaderStage::Fragment => Some("out"),
        _ => None,
    }
}

struct Candidate<'t> {
    storage: &'t str,
    location: i32,
    index: i32,
    type_name: &'t str,
    names: Vec<(&'t str, u32, u32)>,
}

fn record(
    table: &mut BindingTable,
    stage: ShaderStage,
    candidate: Candidate<'_>,
    diagnostics: &mut Diagnostics,
) {
    if Some(candidate.storage) != binding_storage(stage) || candidate.location < 0 {
        return;
    }
    let slots = TypeInfo::from_name(candidate.type_name).map_or(1, |ty| ty.location_slots());
    let mut location = candidate.location as u32;
    for (name, array_len, line) in candidate.names {
        if stage == ShaderStage::Vertex {
            let binding = AttributeBinding {
                name: name.to_string(),
                location,
                type_name: candidate.type_name.to_string(),
                line,
                slots: slots.saturating_mul(array_len),
            };
            location = location.saturating_add(binding.slots);
            table.add_attribute(binding, diagnostics);
        } else {
            let binding = OutputBinding {
                name: name.to_string(),
                location,
                index: candidate.index.max(0) as u32,
                type_name: candidate.type_name.to_string(),
                line,
                array_len,
            };
            location = location.saturating_add(array_len);
            table.add_output(binding, diagnostics);
        }
    }
}

/// Extract explicit locations from the untouched declarations in `buffer`.
pub fn extract_bindings(
    buffer: &TokenBuffer,
    stage: ShaderStage,
    diagnostics: &mut Diagnostics,
) -> (BindingTable, LayoutStripper) {
    let mut table = BindingTable::default();
    for statement in top_level(buffer) {
        if statement.is_function {
            continue;
        }
        let head = statement.head(buffer);
        let (Some(layout), Some(storage)) = (&head.layout, statement.storage(buffer, &head)) else {
            continue;
        };
        let names = statement
            .declarators(buffer, head.body)
            .into_iter()
            .map(|pos| {
                let len = statement
                    .name_dims(buffer, pos)
                    .first()
                    .copied()
                    .flatten()
                    .unwrap_or(1);
                (statement.text(buffer, pos), len, buffer.line(statement.tokens[pos]))
            })
            .collect();
        let candidate = Candidate {
            storage,
            location: layout.location,
            index: layout.index,
            type_name: statement.text(buffer, head.body),
            names,
        };
        record(&mut table, stage, candidate, diagnostics);
    }
    log::debug!(
        "extracted {} attribute and {} output bindings",
        table.attributes.len(),
        table.outputs.len()
    );
    (table, LayoutStripper { _extracted: () })
}

/// Line-based extraction for the textual fallback.
///
/// Recognizes one `layout(...) [qualifiers] in|out type name[N];` declaration
/// per line.
pub fn extract_bindings_from_lines(
    source: &str,
    stage: ShaderStage,
    diagnostics: &mut Diagnostics,
) -> BindingTable {
    let mut table = BindingTable::default();
    for (number, line) in source.lines().enumerate() {
        let Some(candidate) = parse_binding_line(line, number as u32 + 1) else {
            continue;
        };
        record(&mut table, stage, candidate, diagnostics);
    }
    table
}

fn parse_binding_line(line: &str, number: u32) -> Option<Candidate<'_>> {
    let rest = line.trim_start().strip_prefix("layout")?.trim_start();
    let rest = rest.strip_prefix('(')?;
    let close = rest.find(')')?;
    let layout = parse_layout(&rest[..close])?;
    let mut words = rest[close + 1..]
        .split(|c: char| c.is_whitespace() || c == ';')
        .filter(|w| !w.is_empty());
    let storage = words.find(|w| matches!(*w, "in" | "out"))?;
    let type_name = words.find(|w| !is_non_storage_qualifier(w))?;
    let declarator = words.next()?;
    let (name, dims) = match declarator.split_once('[') {
        Some((name, dims)) => (name, dims.trim_end_matches(']').parse::<u32>().ok()),
        None => (declarator, None),
    };
    Some(Candidate {
        storage,
        location: layout.location,
        index: layout.index,
        type_name,
        names: alloc::vec![(name, dims.unwrap_or(1), number)],
    })
}

fn is_non_storage_qualifier(word: &str) -> bool {
    matches!(
        word,
        "highp" | "mediump" | "lowp" | "flat" | "smooth" | "noperspective" | "centroid" | "invariant"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::tokenize;

    fn extract(src: &str, stage: ShaderStage) -> (BindingTable, Diagnostics, TokenBuffer) {
        let (buffer, _) = tokenize(src).unwrap();
        let mut diagnostics = Diagnostics::new();
        let (table, _) = extract_bindings(&buffer, stage, &mut diagnostics);
        (table, diagnostics, buffer)
    }

    #[test]
    fn test_attribute_bindings() {
        let (table, diags, _) = extract(
            "layout(location = 1) in vec2 uv;\nlayout(location = 0) in vec3 position;\nin float free;",
            ShaderStage::Vertex,
        );
        assert!(diags.is_empty());
        assert_eq!(table.attribute_location("position"), Some(0));
        assert_eq!(table.attribute_location("uv"), Some(1));
        assert_eq!(table.attribute_location("free"), None);
        assert_eq!(table.attributes[1].line, 2);
    }

    #[test]
    fn test_matrix_and_array_slots() {
        let (table, diags, _) = extract(
            "layout(location = 0) in mat4 model;\nlayout(location = 4) in vec4 weights[2];",
            ShaderStage::Vertex,
        );
        assert!(!diags.has_errors());
        assert_eq!(table.attributes[0].slots, 4);
        assert_eq!(table.attributes[1].slots, 2);
    }

    #[test]
    fn test_conflicts_keep_both() {
        let (table, diags, _) = extract(
            "layout(location = 0) in vec3 a;\nlayout(location = 0) in vec3 b;\nlayout(location = 2) in mat3 m;\nlayout(location = 3) in vec2 c;",
            ShaderStage::Vertex,
        );
        assert_eq!(diags.error_count(), 2);
        assert!(diags.contains_message("attribute 'b' at location 0 overlaps attribute 'a'"));
        assert!(diags.contains_message("attribute 'c' at location 3 overlaps attribute 'm'"));
        assert_eq!(table.attributes.len(), 4);
        assert_eq!(table.attribute_location("a"), Some(0));
        assert_eq!(table.attribute_location("b"), Some(0));
    }

    #[test]
    fn test_overflow_warns() {
        let (_, diags, _) = extract("layout(location = 15) in mat2 m;", ShaderStage::Vertex);
        assert!(!diags.has_errors());
        assert_eq!(diags.warning_count(), 1);

        let (_, diags, _) = extract("layout(location = 8) out vec4 c;", ShaderStage::Fragment);
        assert_eq!(diags.warning_count(), 1);
    }

    #[test]
    fn test_huge_arrays_saturate() {
        let (table, diags, _) = extract(
            "layout(location = 0) in mat4 m[2000000000];\nlayout(location = 1) in vec4 after;",
            ShaderStage::Vertex,
        );
        assert_eq!(table.attributes[0].slots, u32::MAX);
        assert!(diags.contains_message("beyond the typical limit of 16 slots"));
        assert!(diags.contains_message("attribute 'after' at location 1 overlaps attribute 'm'"));

        let (table, diags, _) = extract(
            "layout(location = 2147483647) out vec4 c[4294967295];",
            ShaderStage::Fragment,
        );
        assert_eq!(table.output_location("c"), Some((2147483647, 0)));
        assert!(diags.contains_message("beyond the typical limit of 8 draw buffers"));
    }

    #[test]
    fn test_outputs_with_index() {
        let (table, diags, _) = extract(
            "layout(location = 0) out vec4 color;\nlayout(location = 0, index = 1) out vec4 blend;\nlayout(location = 1) in vec2 uv;",
            ShaderStage::Fragment,
        );
        assert!(diags.is_empty());
        assert_eq!(table.output_location("color"), Some((0, 0)));
        assert_eq!(table.output_location("blend"), Some((0, 1)));
        assert!(table.attributes.is_empty());
    }

    #[test]
    fn test_strip_after_extract() {
        let (mut buffer, _) =
            tokenize("layout(location = 0) in vec3 p;\nlayout(std140) uniform B { vec4 x; };").unwrap();
        let mut diagnostics = Diagnostics::new();
        let (table, stripper) = extract_bindings(&buffer, ShaderStage::Vertex, &mut diagnostics);
        assert_eq!(stripper.strip(&mut buffer), 2);
        assert_eq!(buffer.render(), "in vec3 p;\nuniform B { vec4 x; };");
        assert_eq!(table.attribute_location("p"), Some(0));
    }

    #[test]
    fn test_line_parser() {
        let mut diagnostics = Diagnostics::new();
        let table = extract_bindings_from_lines(
            "#version 300 es\nlayout(location=2) in highp vec4 color;\nlayout (location = 3) in mat2 m[2];",
            ShaderStage::Vertex,
            &mut diagnostics,
        );
        assert_eq!(table.attribute_location("color"), Some(2));
        assert_eq!(table.attributes[1].slots, 4);
        assert_eq!(table.attributes[1].line, 3);
    }
}
