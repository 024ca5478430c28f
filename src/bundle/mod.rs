//! Runtime bundle cache: dependency-aware, reference-counted, load-coalescing

pub mod key;
pub mod format;
pub mod manifest;
pub mod graph;
pub mod source;
pub mod worker;
pub mod coalescer;
pub mod fast_mode;
pub mod fixup;
pub mod manager;
mod cache;
mod assets;

#[cfg(test)]
pub(crate) mod test_support;

pub use key::{AssetKind, IdentityKey};
pub use format::{
    Bundle, BundleData, BundleHandle, ObjectEntry,
    compress_bundle, decompress_bundle,
    serialize_bundle, deserialize_bundle,
    BUNDLE_FORMAT_VERSION,
};
pub use manifest::{BundleManifest, ManifestEntry, ManifestProvider, MANIFEST_OBJECT_NAME};
pub use graph::DependencyGraph;
pub use source::{
    Asset, BundleSource, DecoderRegistry, FileBundleSource,
    LoadFuture, ObjectHandle, ObjectLoader,
};
pub use coalescer::LoadCoalescer;
pub use fast_mode::DevAssetIndex;
pub use fixup::{FixupPass, ObjectFixup};
pub use manager::{
    BundleCallback, BundleState, Collaborators, LoadStats, ObjectCallback,
    ResourceManager, SHADER_BUNDLE_NAME,
};
