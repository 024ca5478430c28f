//! Which source files go into which bundle

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::bundle::fast_mode::DevAssetIndex;
use crate::core::{Error, Result};

/// One source file scheduled for packing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedAsset {
    /// Object name inside the bundle, `/` separated
    pub name: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Default)]
pub struct PlannedBundle {
    pub assets: Vec<PlannedAsset>,
    /// Direct dependencies, as bundle file names
    pub dependencies: Vec<String>,
}

/// Bundles keyed by file name
#[derive(Debug, Clone, Default)]
pub struct BundlePlan {
    pub bundles: BTreeMap<String, PlannedBundle>,
}

impl BundlePlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_asset(&mut self, bundle: &str, name: impl Into<String>, path: impl Into<PathBuf>) {
        self.bundles.entry(bundle.to_string()).or_default().assets.push(PlannedAsset {
            name: name.into(),
            path: path.into(),
        });
    }

    /// Record a direct dependency, ignoring duplicates
    pub fn add_dependency(&mut self, bundle: &str, dependency: &str) {
        let planned = self.bundles.entry(bundle.to_string()).or_default();
        if !planned.dependencies.iter().any(|d| d == dependency) {
            planned.dependencies.push(dependency.to_string());
        }
    }

    /// Apply declared edges, appending `extension` to names that lack it
    ///
    /// Edges from bundles that are not part of the plan are rejected, edges to
    /// unknown bundles are left for the builder to report.
    pub fn apply_dependencies(
        &mut self,
        declared: &BTreeMap<String, Vec<String>>,
        extension: Option<&str>,
    ) -> Result<()> {
        for (bundle, dependencies) in declared {
            let bundle = with_extension(bundle, extension);
            if !self.bundles.contains_key(&bundle) {
                return Err(Error::Build(format!(
                    "dependencies declared for unknown bundle {bundle}"
                )));
            }
            for dependency in dependencies {
                self.add_dependency(&bundle, &with_extension(dependency, extension));
            }
        }
        Ok(())
    }

    pub fn bundle_names(&self) -> impl Iterator<Item = &str> {
        self.bundles.keys().map(String::as_str)
    }

    pub fn get(&self, bundle: &str) -> Option<&PlannedBundle> {
        self.bundles.get(bundle)
    }

    pub fn len(&self) -> usize {
        self.bundles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bundles.is_empty()
    }
}

/// One bundle per top-level directory of `root`, named after the lower-cased
/// directory name plus `extension`
pub fn plan_from_directory(root: &Path, extension: Option<&str>) -> Result<BundlePlan> {
    let index = DevAssetIndex::scan(root)?;
    let mut plan = BundlePlan::new();

    for name in index.bundle_names() {
        let bundle = with_extension(name, extension);
        plan.bundles.entry(bundle.clone()).or_default();
        for asset in index.assets(name).unwrap_or_default() {
            plan.add_asset(&bundle, asset.relative.clone(), asset.path.clone());
        }
    }

    log::info!("Planned {} bundles from {}", plan.len(), root.display());
    Ok(plan)
}

/// Bundles from explicit `bundle -> [file]` assignments relative to `root`
///
/// Object names are the file paths as given, `/` separated.
pub fn plan_from_assignments(
    root: &Path,
    assignments: &BTreeMap<String, Vec<PathBuf>>,
    extension: Option<&str>,
) -> Result<BundlePlan> {
    let mut plan = BundlePlan::new();

    for (name, files) in assignments {
        let bundle = with_extension(&name.to_lowercase(), extension);
        plan.bundles.entry(bundle.clone()).or_default();
        for file in files {
            let path = root.join(file);
            if !path.is_file() {
                return Err(Error::Build(format!(
                    "{} assigned to {} does not exist",
                    path.display(),
                    bundle
                )));
            }
            let relative = file
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            plan.add_asset(&bundle, relative, path);
        }
    }

    Ok(plan)
}

fn with_extension(name: &str, extension: Option<&str>) -> String {
    match extension {
        Some(ext) if !name.to_ascii_lowercase().ends_with(&ext.to_ascii_lowercase()) => {
            format!("{name}{ext}")
        }
        _ => name.to_string(),
    }
}
