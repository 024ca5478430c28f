//! Error types for bundlekit
//!
//! Runtime lookups never hand these back to callers: they are built at the
//! point of detection, logged, and the operation terminates with a cached
//! `None`. Build tooling, configuration and archive I/O return them through
//! [`Result`](crate::core::Result).

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for the crate
#[derive(Debug, Error)]
pub enum Error {
    #[error("manifest bundle `{name}` could not be loaded: {reason}")]
    MissingManifest { name: String, reason: String },

    #[error("bundle `{bundle}` is unavailable ({path}): missing file or null handle")]
    MissingBundleFile { bundle: String, path: PathBuf },

    #[error("bundle `{bundle}` declares dependency `{dependency}` which does not exist")]
    MissingDependency { bundle: String, dependency: String },

    #[error("could not issue load request for `{asset}` from `{bundle}`")]
    NullAssetLoadRequest { bundle: String, asset: String },

    #[error("asset `{asset}` ({kind}) not found in bundle `{bundle}`")]
    NullAsset {
        bundle: String,
        asset: String,
        kind: &'static str,
    },

    #[error("asset `{asset}` from `{bundle}` cannot be produced as `{requested}`")]
    TypeMismatch {
        bundle: String,
        asset: String,
        requested: String,
    },

    #[error("pending loads of `{bundle}` are already being drained, request ignored")]
    ReentrantDrainRejected { bundle: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Archive error: {0}")]
    Archive(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Build error: {0}")]
    Build(String),
}
