//! Packs a [`BundlePlan`] into bundle archives plus the manifest bundle

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use rayon::prelude::*;

use crate::build::plan::{BundlePlan, PlannedBundle};
use crate::build::records::BuildRecord;
use crate::build::staging::hash_bytes;
use crate::bundle::format::{compress_bundle, BundleData, ObjectEntry};
use crate::bundle::key::AssetKind;
use crate::bundle::manifest::{BundleManifest, ManifestProvider, MANIFEST_OBJECT_NAME};
use crate::core::{Error, Result};

/// What a build produced
#[derive(Debug, Clone)]
pub struct BuildOutput {
    pub manifest: BundleManifest,
    /// One record per bundle, manifest bundle excluded, sorted by name
    pub records: Vec<BuildRecord>,
}

/// Write every planned bundle and the manifest bundle `manifest_name` to `output_dir`
pub fn build_bundles(plan: &BundlePlan, output_dir: &Path, manifest_name: &str) -> Result<BuildOutput> {
    if manifest_name.is_empty() {
        return Err(Error::Build("manifest bundle name is empty".to_string()));
    }
    if plan.get(manifest_name).is_some() {
        return Err(Error::Build(format!(
            "bundle {manifest_name} collides with the manifest bundle"
        )));
    }
    validate_dependencies(plan)?;

    std::fs::create_dir_all(output_dir)?;

    let mut records = plan
        .bundles
        .par_iter()
        .map(|(name, planned)| write_bundle(name, planned, output_dir))
        .collect::<Result<Vec<_>>>()?;
    records.sort_by(|a, b| a.name.cmp(&b.name));

    let mut manifest = BundleManifest::new();
    for record in &records {
        let dependencies = plan
            .get(&record.name)
            .map(|planned| planned.dependencies.clone())
            .unwrap_or_default();
        manifest.insert(record.name.clone(), record.hash.clone(), dependencies);
    }
    for name in manifest.bundle_names() {
        log::debug!("{} -> {:?}", name, manifest.all_dependencies(name));
    }

    let manifest_bundle = BundleData::new(
        manifest_name,
        vec![ObjectEntry::new(MANIFEST_OBJECT_NAME, AssetKind::MANIFEST, manifest.to_json()?)],
    );
    std::fs::write(output_dir.join(manifest_name), compress_bundle(&manifest_bundle)?)?;

    log::info!(
        "Built {} bundles and manifest {} into {}",
        records.len(),
        manifest_name,
        output_dir.display()
    );

    Ok(BuildOutput { manifest, records })
}

fn write_bundle(name: &str, planned: &PlannedBundle, output_dir: &Path) -> Result<BuildRecord> {
    let mut objects = Vec::with_capacity(planned.assets.len());
    for asset in &planned.assets {
        let data = std::fs::read(&asset.path)?;
        objects.push(ObjectEntry::new(asset.name.clone(), AssetKind::from_path(&asset.path), data));
    }

    let bytes = compress_bundle(&BundleData::new(name, objects))?;
    std::fs::write(output_dir.join(name), &bytes)?;

    log::debug!("Wrote {} ({} objects, {} bytes)", name, planned.assets.len(), bytes.len());

    Ok(BuildRecord {
        name: name.to_string(),
        hash: hash_bytes(&bytes),
        size: bytes.len() as u64,
    })
}

/// Every dependency must be planned and the graph must be acyclic
fn validate_dependencies(plan: &BundlePlan) -> Result<()> {
    for (bundle, planned) in &plan.bundles {
        if let Some(missing) = planned.dependencies.iter().find(|d| plan.get(d).is_none()) {
            let error = Error::MissingDependency {
                bundle: bundle.clone(),
                dependency: missing.clone(),
            };
            log::error!("{}", error);
            return Err(error);
        }
    }

    let mut done = BTreeSet::new();
    for bundle in plan.bundle_names() {
        let mut path = Vec::new();
        visit(plan, bundle, &mut path, &mut done)?;
    }
    Ok(())
}

fn visit<'a>(
    plan: &'a BundlePlan,
    bundle: &'a str,
    path: &mut Vec<&'a str>,
    done: &mut BTreeSet<&'a str>,
) -> Result<()> {
    if done.contains(bundle) {
        return Ok(());
    }
    if let Some(start) = path.iter().position(|b| *b == bundle) {
        let mut cycle = path[start..].to_vec();
        cycle.push(bundle);
        return Err(Error::Build(format!("dependency cycle: {}", cycle.join(" -> "))));
    }

    path.push(bundle);
    if let Some(planned) = plan.get(bundle) {
        for dependency in &planned.dependencies {
            visit(plan, dependency, path, done)?;
        }
    }
    path.pop();
    done.insert(bundle);
    Ok(())
}

/// Dependency closure per bundle, as the runtime will resolve it
pub fn dependency_closure(manifest: &BundleManifest) -> BTreeMap<String, Vec<String>> {
    manifest
        .bundle_names()
        .map(|name| (name.to_string(), manifest.all_dependencies(name)))
        .collect()
}
