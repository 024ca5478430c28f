//! Build settings, persisted as JSON next to the project

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::config::normalize_extension;
use crate::core::{ManagerConfig, Result};

/// Inputs and switches for one bundle build
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildSettings {
    /// Source asset directory; each top-level directory becomes a bundle
    pub asset_path: PathBuf,
    /// Directory the bundles and the manifest bundle are written to
    pub build_bundle_path: PathBuf,
    /// Directory the runtime loads bundles from, staged after a build
    pub load_bundle_path: Option<PathBuf>,
    pub bundle_extension: Option<String>,
    /// Derive bundles from the top-level directories of `asset_path`
    pub assign_bundle_names: bool,
    /// Explicit bundle assignments used when `assign_bundle_names` is off:
    /// bundle name -> files relative to `asset_path`
    pub bundles: BTreeMap<String, Vec<PathBuf>>,
    /// Declared `bundle -> [bundle]` edges
    pub dependencies: BTreeMap<String, Vec<String>>,
    pub clear_build_path: bool,
    pub clear_load_path: bool,
    pub copy_to_load_path: bool,
    /// Passed through to the runtime configuration
    pub fast_mode: bool,
}

impl Default for BuildSettings {
    fn default() -> Self {
        Self {
            asset_path: PathBuf::new(),
            build_bundle_path: PathBuf::new(),
            load_bundle_path: None,
            bundle_extension: Some(".bundle".to_string()),
            assign_bundle_names: true,
            bundles: BTreeMap::new(),
            dependencies: BTreeMap::new(),
            clear_build_path: true,
            clear_load_path: true,
            copy_to_load_path: true,
            fast_mode: false,
        }
    }
}

impl BuildSettings {
    pub fn new(asset_path: impl Into<PathBuf>, build_bundle_path: impl Into<PathBuf>) -> Self {
        Self {
            asset_path: asset_path.into(),
            build_bundle_path: build_bundle_path.into(),
            ..Default::default()
        }
    }

    pub fn with_load_path(mut self, load_bundle_path: impl Into<PathBuf>) -> Self {
        self.load_bundle_path = Some(load_bundle_path.into());
        self
    }

    pub fn with_dependency(mut self, bundle: impl Into<String>, dependency: impl Into<String>) -> Self {
        self.dependencies
            .entry(bundle.into())
            .or_default()
            .push(dependency.into());
        self
    }

    /// Asset and build paths must both be set
    pub fn is_valid(&self) -> bool {
        !is_blank(&self.asset_path) && !is_blank(&self.build_bundle_path)
    }

    /// Normalized `.ext` form of the bundle extension, `None` when blank
    pub fn extension(&self) -> Option<String> {
        normalize_extension(self.bundle_extension.as_deref()?)
    }

    /// The manifest bundle is named after the build directory
    pub fn manifest_bundle_name(&self) -> String {
        self.build_bundle_path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Runtime configuration that reads what this build produces
    ///
    /// Loads from the staged directory when one is configured, otherwise
    /// straight from the build output.
    pub fn manager_config(&self) -> ManagerConfig {
        let root = self
            .load_bundle_path
            .clone()
            .unwrap_or_else(|| self.build_bundle_path.clone());
        let mut config = ManagerConfig::new(root).with_manifest_bundle(self.manifest_bundle_name());
        config.bundle_extension = self.extension();
        config.fast_mode = self.fast_mode;
        config.dev_asset_root = Some(self.asset_path.clone());
        config
    }

    pub fn save_sync(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn load_sync(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

fn is_blank(path: &Path) -> bool {
    path.to_string_lossy().trim().is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_validity_requires_both_paths() {
        assert!(!BuildSettings::default().is_valid());
        assert!(!BuildSettings::new("assets", "  ").is_valid());
        assert!(BuildSettings::new("assets", "out/Android").is_valid());
    }

    #[test]
    fn test_manifest_name_is_build_dir_stem() {
        let settings = BuildSettings::new("assets", "out/Android");
        assert_eq!(settings.manifest_bundle_name(), "Android");

        let config = settings.manager_config();
        assert_eq!(config.manifest_path(), PathBuf::from("out/Android/Android"));
        assert_eq!(config.normalized_extension(), Some(".bundle".to_string()));
    }

    #[test]
    fn test_manager_config_prefers_load_path() {
        let settings = BuildSettings::new("assets", "out/bundles").with_load_path("game/data");
        assert_eq!(settings.manager_config().root, PathBuf::from("game/data"));
    }

    #[test]
    fn test_settings_persistence() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("build.json");

        let settings = BuildSettings::new("assets", "out/bundles").with_dependency("ui", "shared");
        settings.save_sync(&path).unwrap();

        let loaded = BuildSettings::load_sync(&path).unwrap();
        assert_eq!(loaded.asset_path, PathBuf::from("assets"));
        assert_eq!(loaded.dependencies["ui"], vec!["shared".to_string()]);
        assert!(loaded.assign_bundle_names);
    }

    #[test]
    fn test_blank_extension_is_none() {
        let mut settings = BuildSettings::new("a", "b");
        settings.bundle_extension = Some(" . ".to_string());
        assert_eq!(settings.extension(), None);
    }
}
