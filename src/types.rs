//! Shared types used across the planner, the cache and the pack adapter.
//!
//! [`Identifier`] is the key for every resource, tag and cache entry. It is
//! serialized in its textual `namespace:path` form so that declarative sources
//! and tag files stay human-readable.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

/// Immutable, cheaply clonable resource payload.
pub type Bytes = Arc<[u8]>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentifierError {
    #[error("identifier '{0}' has no namespace separator ':'")]
    MissingSeparator(String),
    #[error("identifier '{0}' has an empty namespace or path")]
    Empty(String),
    #[error("identifier '{0}' contains invalid character '{1}'")]
    InvalidCharacter(String, char),
    #[error("identifier '{0}' contains an empty, '.' or '..' path segment")]
    InvalidSegment(String),
}

/// A two-part `(namespace, path)` resource key.
///
/// Ordering compares the namespace first, then the path. This is not the
/// order of the textual forms: `a:x` sorts before `a.b:x` here, after it as
/// text.
///
/// Paths double as cache directory names, so `.` and `..` segments are
/// rejected at construction.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identifier {
    namespace: String,
    path: String,
}

impl Identifier {
    pub fn new(namespace: &str, path: &str) -> Result<Self, IdentifierError> {
        let text = format!("{namespace}:{path}");
        if namespace.is_empty() || path.is_empty() {
            return Err(IdentifierError::Empty(text));
        }
        if let Some(c) = namespace.chars().find(|c| !is_namespace_char(*c)) {
            return Err(IdentifierError::InvalidCharacter(text, c));
        }
        if let Some(c) = path.chars().find(|c| !is_path_char(*c)) {
            return Err(IdentifierError::InvalidCharacter(text, c));
        }
        if path
            .split('/')
            .any(|segment| segment.is_empty() || segment == "." || segment == "..")
        {
            return Err(IdentifierError::InvalidSegment(text));
        }
        Ok(Self {
            namespace: namespace.to_string(),
            path: path.to_string(),
        })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Same namespace, new path.
    pub fn with_path(&self, path: &str) -> Result<Self, IdentifierError> {
        Self::new(&self.namespace, path)
    }

    /// Wrap the path as `<prefix><path><suffix>`, e.g. `textures/` + path + `.png`.
    pub fn wrap(&self, prefix: &str, suffix: &str) -> Result<Self, IdentifierError> {
        Self::new(&self.namespace, &format!("{prefix}{}{suffix}", self.path))
    }
}

/// Whether `namespace` could start an identifier, e.g. a pack directory name.
pub fn is_valid_namespace(namespace: &str) -> bool {
    !namespace.is_empty() && namespace.chars().all(is_namespace_char)
}

fn is_namespace_char(c: char) -> bool {
    c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '_' | '.' | '-')
}

fn is_path_char(c: char) -> bool {
    is_namespace_char(c) || c == '/'
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.path)
    }
}

impl FromStr for Identifier {
    type Err = IdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (namespace, path) = s
            .split_once(':')
            .ok_or_else(|| IdentifierError::MissingSeparator(s.to_string()))?;
        Self::new(namespace, path)
    }
}

impl TryFrom<String> for Identifier {
    type Error = IdentifierError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Identifier> for String {
    fn from(id: Identifier) -> Self {
        id.to_string()
    }
}

/// Which half of the pack stack a resource lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackType {
    /// Client resources: textures and other imagery.
    Assets,
    /// Server data: tags and other structured files.
    Data,
}

impl PackType {
    pub const ALL: [PackType; 2] = [PackType::Assets, PackType::Data];

    /// Top-level directory name used by directory-backed packs and the cache.
    pub fn directory(self) -> &'static str {
        match self {
            PackType::Assets => "assets",
            PackType::Data => "data",
        }
    }
}

impl fmt::Display for PackType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.directory())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_namespace_and_path() {
        let id: Identifier = "mymod:block/stone".parse().unwrap();
        assert_eq!(id.namespace(), "mymod");
        assert_eq!(id.path(), "block/stone");
        assert_eq!(id.to_string(), "mymod:block/stone");
    }

    #[test]
    fn rejects_missing_separator() {
        assert!(matches!(
            "stone".parse::<Identifier>(),
            Err(IdentifierError::MissingSeparator(_))
        ));
    }

    #[test]
    fn rejects_uppercase_and_spaces() {
        assert!(matches!(
            "mymod:Stone".parse::<Identifier>(),
            Err(IdentifierError::InvalidCharacter(_, 'S'))
        ));
        assert!("my mod:stone".parse::<Identifier>().is_err());
    }

    #[test]
    fn rejects_traversal_segments() {
        for bad in ["a:../x", "a:x/./y", "a:x//y", "a:x/"] {
            assert!(
                matches!(bad.parse::<Identifier>(), Err(IdentifierError::InvalidSegment(_))),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn ordering_is_namespace_then_path() {
        let mut ids: Vec<Identifier> = ["b:a", "a:z", "a:b/c", "a:b"]
            .iter()
            .map(|s| s.parse().unwrap())
            .collect();
        ids.sort();
        let text: Vec<String> = ids.iter().map(|i| i.to_string()).collect();
        assert_eq!(text, vec!["a:b", "a:b/c", "a:z", "b:a"]);
    }

    #[test]
    fn ordering_differs_from_text_order() {
        let short: Identifier = "a:x".parse().unwrap();
        let dotted: Identifier = "a.b:x".parse().unwrap();
        assert!(short < dotted);
        assert!(dotted.to_string() < short.to_string());
    }

    #[test]
    fn wrap_builds_texture_location() {
        let id: Identifier = "mymod:block/ore".parse().unwrap();
        assert_eq!(
            id.wrap("textures/", ".png").unwrap().to_string(),
            "mymod:textures/block/ore.png"
        );
    }

    #[test]
    fn serde_uses_textual_form() {
        let id: Identifier = "mymod:item/gem".parse().unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"mymod:item/gem\"");
        let back: Identifier = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
        assert!(serde_json::from_str::<Identifier>("\"nope\"").is_err());
    }
}
