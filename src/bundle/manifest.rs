//! Bundle manifest: which bundles exist and how they depend on each other

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::bundle::key::AssetKind;
use crate::bundle::source::Asset;
use crate::core::Result;

/// Name of the manifest object inside the manifest bundle
pub const MANIFEST_OBJECT_NAME: &str = "manifest";

/// Current manifest document version
pub const MANIFEST_VERSION: u32 = 1;

/// Answers dependency questions about bundle file names
pub trait ManifestProvider: Send + Sync {
    /// Dependencies declared directly by `bundle`
    fn direct_dependencies(&self, bundle: &str) -> Vec<String>;

    /// Transitive dependencies of `bundle`, depth-first, without duplicates
    fn all_dependencies(&self, bundle: &str) -> Vec<String> {
        let mut visited = HashSet::new();
        visited.insert(bundle.to_string());

        let mut result = Vec::new();
        let mut stack: Vec<String> = self.direct_dependencies(bundle).into_iter().rev().collect();

        while let Some(dep) = stack.pop() {
            if !visited.insert(dep.clone()) {
                continue;
            }
            for next in self.direct_dependencies(&dep).into_iter().rev() {
                if !visited.contains(&next) {
                    stack.push(next);
                }
            }
            result.push(dep);
        }

        result
    }

    /// Content hash recorded for `bundle`, empty when unknown
    fn bundle_hash(&self, bundle: &str) -> String;

    /// Whether the manifest knows `bundle`
    fn contains(&self, bundle: &str) -> bool;
}

/// One bundle's manifest entry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub hash: String,
    #[serde(default)]
    pub dependencies: Vec<String>,
}

/// JSON manifest written by the bundle builder
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleManifest {
    pub version: u32,
    pub bundles: BTreeMap<String, ManifestEntry>,
}

impl BundleManifest {
    pub fn new() -> Self {
        Self {
            version: MANIFEST_VERSION,
            bundles: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, bundle: impl Into<String>, hash: impl Into<String>, dependencies: Vec<String>) {
        self.bundles.insert(
            bundle.into(),
            ManifestEntry {
                hash: hash.into(),
                dependencies,
            },
        );
    }

    pub fn bundle_names(&self) -> impl Iterator<Item = &str> {
        self.bundles.keys().map(String::as_str)
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

impl ManifestProvider for BundleManifest {
    fn direct_dependencies(&self, bundle: &str) -> Vec<String> {
        self.bundles
            .get(bundle)
            .map(|entry| entry.dependencies.clone())
            .unwrap_or_default()
    }

    fn bundle_hash(&self, bundle: &str) -> String {
        self.bundles
            .get(bundle)
            .map(|entry| entry.hash.clone())
            .unwrap_or_default()
    }

    fn contains(&self, bundle: &str) -> bool {
        self.bundles.contains_key(bundle)
    }
}

impl Asset for BundleManifest {
    const KIND: AssetKind = AssetKind::MANIFEST;

    fn decode(bytes: &[u8]) -> Result<Self> {
        Self::from_json(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest() -> BundleManifest {
        let mut manifest = BundleManifest::new();
        manifest.insert("ui.bundle", "aa", vec!["shared.bundle".into(), "fonts.bundle".into()]);
        manifest.insert("shared.bundle", "bb", vec!["core.bundle".into()]);
        manifest.insert("fonts.bundle", "cc", vec!["core.bundle".into()]);
        manifest.insert("core.bundle", "dd", vec![]);
        manifest
    }

    #[test]
    fn test_all_dependencies_dedup_and_order() {
        let deps = manifest().all_dependencies("ui.bundle");
        assert_eq!(deps, vec!["shared.bundle", "core.bundle", "fonts.bundle"]);
    }

    #[test]
    fn test_all_dependencies_survives_cycles() {
        let mut manifest = BundleManifest::new();
        manifest.insert("a", "", vec!["b".into()]);
        manifest.insert("b", "", vec!["a".into()]);

        assert_eq!(manifest.all_dependencies("a"), vec!["b"]);
    }

    #[test]
    fn test_unknown_bundle() {
        let manifest = manifest();
        assert!(manifest.direct_dependencies("nope").is_empty());
        assert_eq!(manifest.bundle_hash("nope"), "");
        assert!(!manifest.contains("nope"));
        assert_eq!(manifest.bundle_hash("core.bundle"), "dd");
    }

    #[test]
    fn test_json_round_trip() {
        let manifest = manifest();
        let bytes = manifest.to_json().unwrap();
        let decoded = <BundleManifest as Asset>::decode(&bytes).unwrap();
        assert_eq!(decoded, manifest);
    }
}
