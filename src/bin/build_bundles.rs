//! Bundle builder binary: packs a source asset tree into bundles.
//!
//! Usage: cargo run --release --bin build_bundles -- [OPTIONS]
//!
//! Options:
//!   --settings <PATH>   Build settings JSON (default: bundle_settings.json)
//!   --jobs <N>          Max parallel bundle writes (default: rayon's choice)
//!   --init             Write default settings to --settings and exit
//!
//! Output structure:
//!   <build_bundle_path>/
//!     <bundle>.bundle         # One archive per top-level asset directory
//!     <build dir name>        # Manifest bundle
//!     build_records.json      # Hash and size of every bundle

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use bundlekit::build::{run_build, BuildSettings};

fn main() -> ExitCode {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info"),
    )
    .format_timestamp_millis()
    .init();

    let args: Vec<String> = std::env::args().collect();
    let settings_path = parse_str_arg(&args, "--settings")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("bundle_settings.json"));

    if args.iter().any(|a| a == "--init") {
        let settings = BuildSettings::new("assets", "build/bundles");
        return match settings.save_sync(&settings_path) {
            Ok(()) => {
                println!("Wrote default settings to {}", settings_path.display());
                ExitCode::SUCCESS
            }
            Err(e) => {
                log::error!("Cannot write {}: {}", settings_path.display(), e);
                ExitCode::FAILURE
            }
        };
    }

    if let Some(jobs) = parse_usize_arg(&args, "--jobs") {
        if let Err(e) = rayon::ThreadPoolBuilder::new().num_threads(jobs).build_global() {
            log::warn!("Failed to configure thread pool: {}", e);
        }
    }

    let settings = match BuildSettings::load_sync(&settings_path) {
        Ok(settings) => settings,
        Err(e) => {
            log::error!("Cannot read build settings {}: {}", settings_path.display(), e);
            return ExitCode::FAILURE;
        }
    };

    println!("=== Bundle Builder ===");
    println!("Assets: {}", settings.asset_path.display());
    println!("Output: {}", settings.build_bundle_path.display());
    if let Some(load_path) = &settings.load_bundle_path {
        println!("Stage:  {}", load_path.display());
    }
    println!();

    let start = Instant::now();
    let report = match run_build(&settings) {
        Ok(report) => report,
        Err(e) => {
            log::error!("Build failed: {}", e);
            return ExitCode::FAILURE;
        }
    };

    for record in &report.records.records {
        let marker = if report.changed.contains(&record.name) { "*" } else { " " };
        println!(
            "{} {:<32} {:>10} bytes  {}",
            marker,
            record.name,
            record.size,
            record.hash.get(..12).unwrap_or(&record.hash)
        );
    }

    println!();
    println!("=== Build {} Complete ===", report.version);
    println!("Bundles: {} ({} changed)", report.records.records.len(), report.changed.len());
    println!("Size:    {:.1} KB", report.records.total_size() as f64 / 1024.0);
    println!("Staged:  {} files", report.staged);
    println!("Time:    {:.2}s", start.elapsed().as_secs_f64());

    ExitCode::SUCCESS
}

fn parse_usize_arg(args: &[String], flag: &str) -> Option<usize> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
}

fn parse_str_arg(args: &[String], flag: &str) -> Option<String> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .cloned()
}
