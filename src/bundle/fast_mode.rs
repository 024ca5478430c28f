//! Development asset index used in fast mode
//!
//! In fast mode no bundle is built or read. Each top-level directory of the
//! development asset root stands in for a bundle of the same (lower-cased)
//! name, and objects are decoded straight from the files below it.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::bundle::key::{AssetKind, IdentityKey};
use crate::bundle::manager::ResourceManager;
use crate::bundle::source::ObjectHandle;
use crate::core::{Error, Result};

/// Files never indexed
const IGNORED_EXTENSIONS: &[&str] = &["meta"];
const IGNORED_FILES: &[&str] = &[".DS_Store"];

/// One indexed source file
#[derive(Debug, Clone)]
pub struct DevAsset {
    /// Path relative to the bundle directory, `/` separated
    pub relative: String,
    pub path: PathBuf,
}

/// Source files grouped by the bundle they would be built into
#[derive(Debug, Default)]
pub struct DevAssetIndex {
    root: PathBuf,
    bundles: BTreeMap<String, Vec<DevAsset>>,
}

impl DevAssetIndex {
    /// Index every top-level directory of `root`
    pub fn scan(root: &Path) -> Result<Self> {
        let mut bundles = BTreeMap::new();

        for entry in std::fs::read_dir(root)? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_lowercase();

            let mut assets = Vec::new();
            collect_files(&path, &path, &mut assets)?;
            assets.sort_by(|a, b| a.relative.cmp(&b.relative));
            bundles.insert(name, assets);
        }

        log::info!("Indexed {} development bundles under {}", bundles.len(), root.display());

        Ok(Self {
            root: root.to_path_buf(),
            bundles,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn bundle_names(&self) -> impl Iterator<Item = &str> {
        self.bundles.keys().map(String::as_str)
    }

    /// Files of `bundle`, `None` when there is no such directory
    pub fn assets(&self, bundle: &str) -> Option<&[DevAsset]> {
        self.bundles.get(&bundle.to_lowercase()).map(Vec::as_slice)
    }

    /// Files of `bundle` that `name` may refer to, in path order
    pub fn find(&self, bundle: &str, name: &str) -> Option<Vec<&DevAsset>> {
        let assets = self.assets(bundle)?;
        Some(assets.iter().filter(|asset| matches(&asset.relative, name)).collect())
    }
}

/// Whether `relative` ends with `name`, with or without its extension, at a
/// path component boundary (ASCII case-insensitive)
pub fn matches(relative: &str, name: &str) -> bool {
    let relative = relative.to_ascii_lowercase();
    let name = name.to_ascii_lowercase().replace('\\', "/");
    if name.is_empty() {
        return false;
    }

    let without_extension = match relative.rfind('.') {
        Some(dot) if !relative[dot..].contains('/') => &relative[..dot],
        _ => relative.as_str(),
    };

    [relative.as_str(), without_extension].iter().any(|candidate| {
        candidate
            .strip_suffix(name.as_str())
            .is_some_and(|prefix| prefix.is_empty() || prefix.ends_with('/'))
    })
}

fn collect_files(dir: &Path, base: &Path, out: &mut Vec<DevAsset>) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            collect_files(&path, base, out)?;
            continue;
        }
        if is_ignored(&path) {
            continue;
        }

        let relative = path
            .strip_prefix(base)
            .unwrap_or(&path)
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        out.push(DevAsset { relative, path });
    }
    Ok(())
}

fn is_ignored(path: &Path) -> bool {
    let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
    if IGNORED_FILES.contains(&file_name) {
        return true;
    }
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| IGNORED_EXTENSIONS.iter().any(|ignored| ext.eq_ignore_ascii_case(ignored)))
}

impl ResourceManager {
    /// Decode an object straight from the development asset index
    ///
    /// The first matching file that decodes as `kind` wins. Nothing is cached.
    pub(super) fn load_dev_object(&self, bundle: &str, name: &str, kind: AssetKind) -> Option<ObjectHandle> {
        let Some(index) = &self.dev_index else {
            log::error!("Fast mode has no development asset index, cannot load {}", name);
            return None;
        };

        let Some(candidates) = index.find(bundle, name) else {
            log::error!(
                "{}",
                Error::MissingBundleFile {
                    bundle: bundle.to_string(),
                    path: index.root().join(bundle.to_lowercase()),
                }
            );
            return None;
        };

        for asset in candidates {
            let bytes = match std::fs::read(&asset.path) {
                Ok(bytes) => bytes,
                Err(e) => {
                    log::warn!("Cannot read {}: {}", asset.path.display(), e);
                    continue;
                }
            };
            match self.loader.decode(kind, &bytes) {
                Ok(object) => {
                    let key = IdentityKey::new(kind, name);
                    return Some(self.fixups.run(bundle, &key, object));
                }
                Err(e) => log::debug!("{} is not a {}: {}", asset.relative, kind, e),
            }
        }

        log::error!(
            "{}",
            Error::NullAsset {
                bundle: bundle.to_string(),
                asset: name.to_string(),
                kind: kind.as_str(),
            }
        );
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::manager::BundleState;
    use crate::bundle::test_support::{memory_manager_with, MemorySource};
    use tempfile::TempDir;

    fn dev_tree() -> TempDir {
        let temp_dir = TempDir::new().unwrap();
        let ui = temp_dir.path().join("UI");
        std::fs::create_dir_all(ui.join("text")).unwrap();
        std::fs::write(ui.join("text").join("Title.txt"), "Dev menu").unwrap();
        std::fs::write(ui.join("text").join("Title.txt.meta"), "guid: 1").unwrap();
        std::fs::write(ui.join(".DS_Store"), "").unwrap();
        std::fs::write(ui.join("layout.json"), r#"{"columns": 3}"#).unwrap();
        std::fs::write(temp_dir.path().join("loose.txt"), "not a bundle").unwrap();
        temp_dir
    }

    #[test]
    fn test_scan_groups_by_directory() {
        let temp_dir = dev_tree();
        let index = DevAssetIndex::scan(temp_dir.path()).unwrap();

        assert_eq!(index.bundle_names().collect::<Vec<_>>(), vec!["ui"]);
        let relative: Vec<_> = index.assets("UI").unwrap().iter().map(|a| a.relative.as_str()).collect();
        assert_eq!(relative, vec!["layout.json", "text/Title.txt"]);
    }

    #[test]
    fn test_name_matching() {
        assert!(matches("text/Title.txt", "title"));
        assert!(matches("text/Title.txt", "TITLE.TXT"));
        assert!(matches("text/Title.txt", "text/title"));
        assert!(!matches("text/Subtitle.txt", "title"));
        assert!(!matches("text/Title.txt", ""));
        assert!(!matches("text/Title.txt", "txt"));
    }

    #[test]
    fn test_fast_mode_reads_source_files() {
        crate::core::logging::init_for_tests();
        let temp_dir = dev_tree();
        let source = MemorySource::fixture();
        let root = temp_dir.path().to_path_buf();
        let mut manager = memory_manager_with(&source, move |config| {
            config.fast_mode = true;
            config.dev_asset_root = Some(root);
        });

        let title = manager.get::<String>("ui", "title").unwrap();
        assert_eq!(title.as_str(), "Dev menu");

        let layout = manager.get::<serde_json::Value>("ui", "layout").unwrap();
        assert_eq!(layout["columns"], 3);

        assert!(manager.get::<String>("ui", "missing").is_none());
        assert!(manager.get::<String>("hud", "title").is_none());

        assert_eq!(manager.bundle_state("ui"), BundleState::Unloaded);
        assert_eq!(manager.cached_asset_count("ui"), 0);
        assert_eq!(source.load_count("ui.bundle"), 0);
    }
}
