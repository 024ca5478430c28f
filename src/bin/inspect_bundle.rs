//! Bundle inspector: loads a bundle through the resource manager and prints
//! what the runtime sees.
//!
//! Usage: cargo run --bin inspect_bundle -- --bundle <NAME> [OPTIONS]
//!
//! Options:
//!   --root <DIR>         Bundle load directory (default: bundles)
//!   --bundle <NAME>      Bundle to load, with or without extension
//!   --extension <EXT>    Bundle file extension (default: none)
//!   --manifest <NAME>    Manifest bundle name (default: bundles)
//!   --object <NAME>      Also load one object and print it as text

use std::process::ExitCode;

use bundlekit::{AssetKind, ManagerConfig, ResourceManager};

fn main() -> ExitCode {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info"),
    )
    .format_timestamp_millis()
    .init();

    let args: Vec<String> = std::env::args().collect();
    let Some(bundle) = parse_str_arg(&args, "--bundle") else {
        eprintln!("Usage: inspect_bundle --bundle <NAME> [--root <DIR>] [--extension <EXT>] [--manifest <NAME>]");
        return ExitCode::FAILURE;
    };
    let root = parse_str_arg(&args, "--root").unwrap_or_else(|| "bundles".to_string());

    let mut config = ManagerConfig::new(root);
    if let Some(extension) = parse_str_arg(&args, "--extension") {
        config = config.with_extension(extension);
    }
    if let Some(manifest) = parse_str_arg(&args, "--manifest") {
        config = config.with_manifest_bundle(manifest);
    }
    let bundle = config.bundle_name(&bundle);

    let mut manager = match ResourceManager::open(config) {
        Ok(manager) => manager,
        Err(e) => {
            log::error!("Failed to start resource manager: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let Some(handle) = manager.load_bundle(&bundle) else {
        log::error!("Bundle {} could not be loaded", bundle);
        manager.shutdown();
        return ExitCode::FAILURE;
    };

    println!("=== {} ===", handle.name());
    println!("Hash:         {}", manager.bundle_hash(&bundle).unwrap_or_else(|| "-".to_string()));
    println!("Dependencies: {}", list(&manager.dependencies(&bundle)));
    println!("Loaded:       {}", list(&manager.loaded_bundles()));
    for dependency in manager.dependencies(&bundle) {
        println!("  {} <- {}", dependency, list(&manager.referrers(&dependency)));
    }
    println!();
    println!("Objects ({}):", handle.len());
    for object in handle.objects() {
        println!("  {:<40} {:<10} {:>10} bytes", object.name, object.kind, object.data.len());
    }

    if let Some(name) = parse_str_arg(&args, "--object") {
        println!();
        match manager.get_object(&bundle, &name, AssetKind::TEXT) {
            Some(object) => match object.downcast_ref::<String>() {
                Some(text) => println!("{}:\n{}", name, text),
                None => println!("{} is not text", name),
            },
            None => println!("{} not found as text", name),
        }
    }

    manager.shutdown();
    ExitCode::SUCCESS
}

fn list(names: &[String]) -> String {
    if names.is_empty() {
        "-".to_string()
    } else {
        names.join(", ")
    }
}

fn parse_str_arg(args: &[String], flag: &str) -> Option<String> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .cloned()
}
