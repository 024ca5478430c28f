//! Runtime configuration for the resource manager

use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Default number of I/O threads for asynchronous loads
pub const DEFAULT_IO_THREADS: usize = 2;

/// Configuration for a [`ResourceManager`](crate::bundle::ResourceManager)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Directory bundles are loaded from
    pub root: PathBuf,
    /// Optional bundle file extension (e.g. `.bundle`)
    pub bundle_extension: Option<String>,
    /// Name of the manifest bundle, stored without extension
    pub manifest_bundle: String,
    /// Redirect asset lookups to the development asset index
    pub fast_mode: bool,
    /// Source asset directory used by fast mode
    pub dev_asset_root: Option<PathBuf>,
    /// Worker threads for asynchronous loads
    pub io_threads: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("bundles"),
            bundle_extension: None,
            manifest_bundle: "bundles".to_string(),
            fast_mode: false,
            dev_asset_root: None,
            io_threads: DEFAULT_IO_THREADS,
        }
    }
}

impl ManagerConfig {
    /// Create a configuration loading bundles from `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Default::default()
        }
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.bundle_extension = Some(extension.into());
        self
    }

    pub fn with_manifest_bundle(mut self, name: impl Into<String>) -> Self {
        self.manifest_bundle = name.into();
        self
    }

    pub fn with_fast_mode(mut self, dev_asset_root: impl Into<PathBuf>) -> Self {
        self.fast_mode = true;
        self.dev_asset_root = Some(dev_asset_root.into());
        self
    }

    /// Extension with surrounding dots trimmed, lower-cased and prefixed by a single `.`
    ///
    /// Returns `None` when no extension is configured or it is blank.
    pub fn normalized_extension(&self) -> Option<String> {
        normalize_extension(self.bundle_extension.as_deref()?)
    }

    /// File name for a bundle, appending the extension when requested and missing
    pub fn bundle_file_name(&self, bundle: &str, auto_extension: bool) -> String {
        if bundle.is_empty() {
            log::error!("Empty bundle name!");
            return String::new();
        }

        match self.normalized_extension() {
            Some(ext) if auto_extension && !bundle.ends_with(&ext) => format!("{bundle}{ext}"),
            _ => bundle.to_string(),
        }
    }

    /// Bundle name for a bundle file name, without the configured extension
    pub fn bundle_name(&self, file_name: &str) -> String {
        strip_extension(file_name, self.normalized_extension().as_deref())
    }

    /// Full path for a bundle under the load root
    pub fn bundle_path(&self, bundle: &str, auto_extension: bool) -> PathBuf {
        self.root.join(self.bundle_file_name(bundle, auto_extension))
    }

    /// Path of the manifest bundle (never carries the bundle extension)
    pub fn manifest_path(&self) -> PathBuf {
        self.bundle_path(&self.manifest_bundle, false)
    }

    /// Save to file (sync)
    pub fn save_sync(&self, path: &Path) -> Result<(), io::Error> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, json)
    }

    /// Load from file (sync)
    pub fn load_sync(path: &Path) -> Result<Self, io::Error> {
        let json = std::fs::read_to_string(path)?;
        serde_json::from_str(&json)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))
    }
}

/// Normalize a user supplied extension to `.ext` form
pub fn normalize_extension(extension: &str) -> Option<String> {
    let trimmed = extension.trim().trim_matches('.');
    if trimmed.trim().is_empty() {
        return None;
    }
    Some(format!(".{}", trimmed.to_lowercase()))
}

/// Remove `extension` (normalized `.ext` form) from the end of `file_name`, ignoring ASCII case
pub fn strip_extension(file_name: &str, extension: Option<&str>) -> String {
    match extension {
        Some(ext)
            if file_name.len() > ext.len()
                && file_name.to_ascii_lowercase().ends_with(&ext.to_ascii_lowercase()) =>
        {
            file_name[..file_name.len() - ext.len()].to_string()
        }
        _ => file_name.to_string(),
    }
}
