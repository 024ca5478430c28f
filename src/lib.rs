//! Bundlekit - dependency-aware, reference-counted asset bundle cache
//!
//! Bundles are loaded through a [`ResourceManager`](bundle::ResourceManager),
//! which pulls in their dependencies, shares concurrent loads and unloads
//! bundles once nothing refers to them. The [`build`] module produces the
//! bundle files and manifest it reads.

pub mod core;
pub mod bundle;
pub mod build;

pub use crate::core::{Error, ManagerConfig, Result};
pub use bundle::{
    Asset, AssetKind, BundleHandle, BundleState, Collaborators, IdentityKey, ObjectHandle,
    ResourceManager,
};
pub use build::{run_build, BuildSettings};
