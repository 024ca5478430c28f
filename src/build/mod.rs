//! Build-side tooling: turn a source asset tree into bundles the runtime loads

pub mod settings;
pub mod plan;
pub mod builder;
pub mod records;
pub mod staging;

pub use settings::BuildSettings;
pub use plan::{plan_from_assignments, plan_from_directory, BundlePlan, PlannedAsset, PlannedBundle};
pub use builder::{build_bundles, dependency_closure, BuildOutput};
pub use records::{BuildRecord, BuildRecords, BUILD_RECORDS_FILE};
pub use staging::{clear_dir, copy_file, copy_folder, file_hash, hash_bytes};

use crate::bundle::manifest::BundleManifest;
use crate::core::{Error, Result};

/// Summary of one [`run_build`]
#[derive(Debug, Clone)]
pub struct BuildReport {
    pub version: u32,
    pub records: BuildRecords,
    /// Bundles that are new or changed since the previous build
    pub changed: Vec<String>,
    pub manifest: BundleManifest,
    /// Files copied to the load path, 0 when nothing was staged
    pub staged: usize,
}

/// Plan, build, record and stage according to `settings`
pub fn run_build(settings: &BuildSettings) -> Result<BuildReport> {
    if !settings.is_valid() {
        return Err(Error::Build(
            "asset_path and build_bundle_path must both be set".to_string(),
        ));
    }

    let extension = settings.extension();
    let mut plan = if settings.assign_bundle_names {
        plan_from_directory(&settings.asset_path, extension.as_deref())?
    } else {
        plan_from_assignments(&settings.asset_path, &settings.bundles, extension.as_deref())?
    };
    plan.apply_dependencies(&settings.dependencies, extension.as_deref())?;

    let output_dir = &settings.build_bundle_path;
    let previous = BuildRecords::load_previous(output_dir);
    if settings.clear_build_path {
        clear_dir(output_dir)?;
    }

    let output = build_bundles(&plan, output_dir, &settings.manifest_bundle_name())?;

    let version = BuildRecords::next_version(previous.as_ref());
    let records = BuildRecords::new(version, output.records);
    records.save_sync(&output_dir.join(BUILD_RECORDS_FILE))?;
    let changed = records.changed_since(previous.as_ref());

    log::info!(
        "Build {}: {} bundles, {} changed, {} bytes",
        version,
        records.records.len(),
        changed.len(),
        records.total_size()
    );

    let mut staged = 0;
    if let Some(load_path) = &settings.load_bundle_path {
        if settings.clear_load_path {
            clear_dir(load_path)?;
        }
        if settings.copy_to_load_path {
            staged = copy_folder(output_dir, load_path)?;
            log::info!("Staged {} files to {}", staged, load_path.display());
        }
    }

    Ok(BuildReport {
        version,
        records,
        changed,
        manifest: output.manifest,
        staged,
    })
}
