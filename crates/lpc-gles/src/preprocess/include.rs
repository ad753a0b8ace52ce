//! `#include` resolution.

use alloc::{collections::BTreeMap, string::String};

/// Supplies the text of included files.
///
/// Resolution is synchronous. A resolver that needs cancellation or timeouts
/// must implement them itself.
pub trait IncludeResolver {
    /// Return the text of `path`, or `None` if it cannot be found.
    ///
    /// `current_file` names the file containing the directive; `is_system` is
    /// true for the `<path>` form.
    fn resolve(&mut self, path: &str, current_file: &str, is_system: bool) -> Option<String>;
}

/// Resolver that never finds anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoIncludes;

impl IncludeResolver for NoIncludes {
    fn resolve(&mut self, _path: &str, _current_file: &str, _is_system: bool) -> Option<String> {
        None
    }
}

impl<F> IncludeResolver for F
where
    F: FnMut(&str, &str, bool) -> Option<String>,
{
    fn resolve(&mut self, path: &str, current_file: &str, is_system: bool) -> Option<String> {
        self(path, current_file, is_system)
    }
}

/// In-memory resolver keyed by path.
///
/// Tries the path relative to the including file's directory first, then the
/// path as written.
#[derive(Debug, Default, Clone)]
pub struct MemoryIncludes {
    files: BTreeMap<String, String>,
}

impl MemoryIncludes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: &str, text: &str) -> Self {
        self.insert(path, text);
        self
    }

    pub fn insert(&mut self, path: &str, text: &str) {
        self.files.insert(String::from(path), String::from(text));
    }
}

/// Directory part of a slash-separated path, including the trailing slash.
pub(crate) fn parent_dir(file: &str) -> &str {
    match file.rfind('/') {
        Some(pos) => &file[..=pos],
        None => "",
    }
}

impl IncludeResolver for MemoryIncludes {
    fn resolve(&mut self, path: &str, current_file: &str, _is_system: bool) -> Option<String> {
        let mut relative = String::from(parent_dir(current_file));
        relative.push_str(path);
        self.files
            .get(&relative)
            .or_else(|| self.files.get(path))
            .cloned()
    }
}

#[cfg(feature = "std")]
mod fs {
    use std::{
        path::{Path, PathBuf},
        vec::Vec,
    };

    use super::{IncludeResolver, String};

    /// Filesystem resolver: the including file's directory first, then each
    /// search root in order.
    #[derive(Debug, Default, Clone)]
    pub struct FsIncludeResolver {
        search_roots: Vec<PathBuf>,
    }

    impl FsIncludeResolver {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
            self.search_roots.push(root.into());
            self
        }

        pub fn search_roots(&self) -> &[PathBuf] {
            &self.search_roots
        }
    }

    impl IncludeResolver for FsIncludeResolver {
        fn resolve(&mut self, path: &str, current_file: &str, is_system: bool) -> Option<String> {
            if !is_system {
                let base = Path::new(current_file).parent().unwrap_or(Path::new(""));
                let candidate = base.join(path);
                if let Ok(text) = std::fs::read_to_string(&candidate) {
                    log::debug!("resolved include {} to {}", path, candidate.display());
                    return Some(text);
                }
            }
            self.search_roots.iter().find_map(|root| {
                let candidate = root.join(path);
                std::fs::read_to_string(&candidate).ok()
            })
        }
    }
}

#[cfg(feature = "std")]
pub use fs::FsIncludeResolver;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_relative_first() {
        let mut includes = MemoryIncludes::new()
            .with_file("lib/common.glsl", "relative")
            .with_file("common.glsl", "root");
        assert_eq!(
            includes.resolve("common.glsl", "lib/main.frag", false),
            Some(String::from("relative"))
        );
        assert_eq!(
            includes.resolve("common.glsl", "main.frag", false),
            Some(String::from("root"))
        );
        assert_eq!(includes.resolve("missing.glsl", "main.frag", false), None);
    }

    #[test]
    fn test_closure_resolver() {
        let mut resolver = |path: &str, _: &str, system: bool| {
            if system {
                Some(String::from(path))
            } else {
                None
            }
        };
        assert_eq!(
            IncludeResolver::resolve(&mut resolver, "a", "b", true),
            Some(String::from("a"))
        );
        assert_eq!(NoIncludes.resolve("a", "b", false), None);
    }
}
