//! Cache keys: content kinds and per-bundle asset identities

use std::fmt;
use std::path::Path;

/// Stable tag naming the kind of content an object decodes to
///
/// Tags are stored verbatim inside bundle archives, so they must never change
/// once bundles have been built with them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AssetKind(&'static str);

impl AssetKind {
    /// UTF-8 text
    pub const TEXT: AssetKind = AssetKind("text");
    /// Raw bytes
    pub const BYTES: AssetKind = AssetKind("bytes");
    /// JSON document
    pub const JSON: AssetKind = AssetKind("json");
    /// Bundle manifest
    pub const MANIFEST: AssetKind = AssetKind("manifest");

    pub const fn new(tag: &'static str) -> Self {
        Self(tag)
    }

    pub const fn as_str(&self) -> &'static str {
        self.0
    }

    /// Kind assigned to a source file when it is packed into a bundle
    pub fn from_extension(extension: &str) -> Self {
        match extension.to_ascii_lowercase().as_str() {
            "txt" | "md" | "csv" | "xml" | "yaml" | "yml" => Self::TEXT,
            "json" => Self::JSON,
            _ => Self::BYTES,
        }
    }

    /// Kind for a file path, derived from its extension
    pub fn from_path(path: &Path) -> Self {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(Self::from_extension)
            .unwrap_or(Self::BYTES)
    }
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// Identity of a cached object within one bundle's namespace: `(kind, name)`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdentityKey {
    kind: AssetKind,
    name: String,
}

impl IdentityKey {
    pub fn new(kind: AssetKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }

    pub fn kind(&self) -> AssetKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_identity_key_equality() {
        let a = IdentityKey::new(AssetKind::TEXT, "logo");
        let b = IdentityKey::new(AssetKind::TEXT, "logo".to_string());
        let c = IdentityKey::new(AssetKind::BYTES, "logo");

        assert_eq!(a, b);
        assert_ne!(a, c);

        let mut set = HashSet::new();
        set.insert(a.clone());
        assert!(set.contains(&b));
        assert!(!set.contains(&c));
    }

    #[test]
    fn test_kind_from_extension() {
        assert_eq!(AssetKind::from_extension("TXT"), AssetKind::TEXT);
        assert_eq!(AssetKind::from_extension("json"), AssetKind::JSON);
        assert_eq!(AssetKind::from_extension("png"), AssetKind::BYTES);
        assert_eq!(AssetKind::from_path(Path::new("a/b/c")), AssetKind::BYTES);
    }

    #[test]
    fn test_key_display() {
        let key = IdentityKey::new(AssetKind::JSON, "config");
        assert_eq!(key.to_string(), "json:config");
    }
}
