//! Extension requirements of the emitted shader.

use alloc::{string::String, vec::Vec};

pub const EXT_SHADOW_SAMPLERS: &str = "GL_EXT_shadow_samplers";
pub const OES_TEXTURE_3D: &str = "GL_OES_texture_3D";
pub const EXT_SHADER_TEXTURE_LOD: &str = "GL_EXT_shader_texture_lod";
pub const EXT_DRAW_BUFFERS: &str = "GL_EXT_draw_buffers";
pub const EXT_FRAG_DEPTH: &str = "GL_EXT_frag_depth";
pub const OES_STANDARD_DERIVATIVES: &str = "GL_OES_standard_derivatives";
pub const EXT_BLEND_FUNC_EXTENDED: &str = "GL_EXT_blend_func_extended";

/// Tier-0 names of extensions whose tier-1+ variant has a different name.
const TIER0_RENAMES: &[(&str, &str)] = &[
    ("GL_OES_EGL_image_external_essl3", "GL_OES_EGL_image_external"),
    ("GL_EXT_shader_framebuffer_fetch_non_coherent", "GL_EXT_shader_framebuffer_fetch"),
];

/// Tier-0 name for an extension, if it is renamed there.
pub fn tier0_rename(name: &str) -> Option<&'static str> {
    TIER0_RENAMES
        .iter()
        .find(|(from, _)| *from == name)
        .map(|(_, to)| *to)
}

/// Ordered set of extension names; first insertion wins the position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtensionSet {
    names: Vec<String>,
}

impl ExtensionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an extension. Returns true if it was not already present.
    pub fn require(&mut self, name: &str) -> bool {
        if self.contains(name) {
            return false;
        }
        log::debug!("extension required: {}", name);
        self.names.push(String::from(name));
        true
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl<'a> IntoIterator for &'a ExtensionSet {
    type Item = &'a str;
    type IntoIter = core::iter::Map<core::slice::Iter<'a, String>, fn(&String) -> &str>;

    fn into_iter(self) -> Self::IntoIter {
        self.names.iter().map(String::as_str)
    }
}

/// Parse `#extension NAME : behavior`, returning the name and behavior.
pub fn parse_extension_directive(text: &str) -> Option<(&str, &str)> {
    let rest = text.trim_start().strip_prefix('#')?.trim_start();
    let rest = rest.strip_prefix("extension")?;
    let (name, behavior) = rest.split_once(':')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some((name, behavior.trim()))
}
