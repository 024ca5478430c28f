//! Dependency resolution backed by a lazily loaded manifest

use std::cell::OnceCell;
use std::sync::Arc;

use crate::bundle::manifest::ManifestProvider;
use crate::core::config::strip_extension;
use crate::core::Error;

/// Produces the manifest on first use, `None` when it is unavailable
pub type ManifestLoader = Box<dyn Fn() -> Option<Arc<dyn ManifestProvider>>>;

/// Resolves the transitive dependencies of bundles
///
/// The manifest is looked up at most once. When it cannot be obtained every
/// bundle is treated as having no dependencies.
pub struct DependencyGraph {
    manifest: OnceCell<Option<Arc<dyn ManifestProvider>>>,
    loader: Option<ManifestLoader>,
    /// Bundle file extension stripped from manifest names
    extension: Option<String>,
}

impl DependencyGraph {
    /// Graph over an already available manifest
    pub fn with_manifest(manifest: Arc<dyn ManifestProvider>) -> Self {
        Self {
            manifest: OnceCell::from(Some(manifest)),
            loader: None,
            extension: None,
        }
    }

    /// Graph that loads its manifest on the first query
    pub fn lazy(loader: ManifestLoader) -> Self {
        Self {
            manifest: OnceCell::new(),
            loader: Some(loader),
            extension: None,
        }
    }

    /// Graph without a manifest
    pub fn disabled() -> Self {
        Self {
            manifest: OnceCell::from(None),
            loader: None,
            extension: None,
        }
    }

    /// Strip `extension` (normalized `.ext` form) from resolved names
    pub fn with_extension(mut self, extension: Option<String>) -> Self {
        self.extension = extension;
        self
    }

    fn bundle_name(&self, file_name: &str) -> String {
        strip_extension(file_name, self.extension.as_deref())
    }

    /// The manifest, loading it if this is the first query
    pub fn manifest(&self) -> Option<&Arc<dyn ManifestProvider>> {
        self.manifest
            .get_or_init(|| self.loader.as_ref().and_then(|load| load()))
            .as_ref()
    }

    /// Whether a manifest lookup has already been attempted
    pub fn is_resolved(&self) -> bool {
        self.manifest.get().is_some()
    }

    /// Transitive dependencies of the bundle stored as `bundle_file`, as bundle names
    ///
    /// Dependencies missing from the manifest are logged and skipped.
    pub fn resolve_dependencies(&self, bundle_file: &str) -> Vec<String> {
        let Some(manifest) = self.manifest() else {
            return Vec::new();
        };

        let bundle = self.bundle_name(bundle_file);
        let mut resolved: Vec<String> = Vec::new();
        for dep in manifest.all_dependencies(bundle_file) {
            if dep.is_empty() || !manifest.contains(&dep) {
                log::error!(
                    "{}",
                    Error::MissingDependency {
                        bundle: bundle.clone(),
                        dependency: dep,
                    }
                );
                continue;
            }

            let name = self.bundle_name(&dep);
            if name != bundle && !resolved.contains(&name) {
                resolved.push(name);
            }
        }
        resolved
    }

    /// Content hash the manifest records for `bundle_file`
    pub fn bundle_hash(&self, bundle_file: &str) -> Option<String> {
        self.manifest()
            .map(|manifest| manifest.bundle_hash(bundle_file))
            .filter(|hash| !hash.is_empty())
    }
}

impl std::fmt::Debug for DependencyGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DependencyGraph")
            .field("resolved", &self.is_resolved())
            .field("has_manifest", &matches!(self.manifest.get(), Some(Some(_))))
            .finish()
    }
}
