//! Host collaborator seams: where bundle bytes come from and how objects are decoded
//!
//! The manager never touches the filesystem or a decoder directly. It goes
//! through a [`BundleSource`] to obtain bundle handles and an [`ObjectLoader`]
//! to turn an entry inside a bundle into a live object.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

use crate::bundle::format::{decompress_bundle, Bundle, BundleHandle};
use crate::bundle::key::AssetKind;
use crate::bundle::manifest::BundleManifest;
use crate::core::{Error, Result};

/// Type-erased handle to a decoded object
pub type ObjectHandle = Arc<dyn Any + Send + Sync>;

/// Boxed future returned by asynchronous collaborator operations
pub type LoadFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// A content type that can be decoded from a bundle entry
pub trait Asset: Any + Send + Sync + Sized {
    /// Kind tag entries of this type are stored under
    const KIND: AssetKind;

    fn decode(bytes: &[u8]) -> Result<Self>;
}

impl Asset for String {
    const KIND: AssetKind = AssetKind::TEXT;

    fn decode(bytes: &[u8]) -> Result<Self> {
        String::from_utf8(bytes.to_vec()).map_err(|e| Error::Decode(e.to_string()))
    }
}

impl Asset for Vec<u8> {
    const KIND: AssetKind = AssetKind::BYTES;

    fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(bytes.to_vec())
    }
}

impl Asset for serde_json::Value {
    const KIND: AssetKind = AssetKind::JSON;

    fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Provides bundle handles for paths
pub trait BundleSource: Send + Sync + 'static {
    /// Load a bundle synchronously, `None` when it is missing or unreadable
    fn load_from_path(&self, path: &Path) -> Option<BundleHandle>;

    /// Load a bundle on the I/O runtime
    fn load_from_path_async(self: Arc<Self>, path: PathBuf) -> LoadFuture<Option<BundleHandle>> {
        Box::pin(async move {
            tokio::task::spawn_blocking(move || self.load_from_path(&path))
                .await
                .ok()
                .flatten()
        })
    }

    /// Release a bundle, optionally destroying every object loaded from it
    fn unload(&self, bundle: &BundleHandle, unload_all_loaded_objects: bool) {
        log::debug!(
            "Unloaded bundle {} (unload objects: {})",
            bundle.name(),
            unload_all_loaded_objects
        );
    }
}

/// Reads compressed bundle archives from disk
#[derive(Debug, Default, Clone, Copy)]
pub struct FileBundleSource;

impl FileBundleSource {
    fn decode(path: &Path, bytes: &[u8]) -> Option<BundleHandle> {
        match decompress_bundle(bytes) {
            Ok(data) => Some(Arc::new(Bundle::from_data(data))),
            Err(e) => {
                log::error!("Failed to decode bundle {}: {}", path.display(), e);
                None
            }
        }
    }
}

impl BundleSource for FileBundleSource {
    fn load_from_path(&self, path: &Path) -> Option<BundleHandle> {
        match std::fs::read(path) {
            Ok(bytes) => Self::decode(path, &bytes),
            Err(e) => {
                log::debug!("Cannot read bundle {}: {}", path.display(), e);
                None
            }
        }
    }

    fn load_from_path_async(self: Arc<Self>, path: PathBuf) -> LoadFuture<Option<BundleHandle>> {
        Box::pin(async move {
            match tokio::fs::read(&path).await {
                Ok(bytes) => Self::decode(&path, &bytes),
                Err(e) => {
                    log::debug!("Cannot read bundle {}: {}", path.display(), e);
                    None
                }
            }
        })
    }
}

/// Turns bundle entries into live objects
pub trait ObjectLoader: Send + Sync + 'static {
    /// Whether objects of `kind` can be produced at all
    fn supports(&self, kind: AssetKind) -> bool;

    /// Decode raw entry bytes
    fn decode(&self, kind: AssetKind, bytes: &[u8]) -> Result<ObjectHandle>;

    /// Load an object out of an already resolved bundle
    fn load_object(&self, bundle: &BundleHandle, name: &str, kind: AssetKind) -> Option<ObjectHandle> {
        let entry = bundle.find(name, kind)?;
        match self.decode(kind, &entry.data) {
            Ok(object) => Some(object),
            Err(e) => {
                log::error!("Failed to decode {}:{} from {}: {}", kind, name, bundle.name(), e);
                None
            }
        }
    }

    fn load_object_async(
        self: Arc<Self>,
        bundle: BundleHandle,
        name: String,
        kind: AssetKind,
    ) -> LoadFuture<Option<ObjectHandle>> {
        Box::pin(async move {
            tokio::task::spawn_blocking(move || self.load_object(&bundle, &name, kind))
                .await
                .ok()
                .flatten()
        })
    }

    /// Return an object's memory to the host
    fn unload_object(&self, _object: &ObjectHandle) {}
}

type DecodeFn = fn(&[u8]) -> Result<ObjectHandle>;

fn decode_erased<T: Asset>(bytes: &[u8]) -> Result<ObjectHandle> {
    Ok(Arc::new(T::decode(bytes)?))
}

/// Default [`ObjectLoader`]: one decoder per kind tag
#[derive(Clone)]
pub struct DecoderRegistry {
    decoders: HashMap<AssetKind, DecodeFn>,
}

impl DecoderRegistry {
    /// Registry without any decoders
    pub fn empty() -> Self {
        Self {
            decoders: HashMap::new(),
        }
    }

    /// Registry with text, bytes, JSON and manifest decoders
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register::<String>();
        registry.register::<Vec<u8>>();
        registry.register::<serde_json::Value>();
        registry.register::<BundleManifest>();
        registry
    }

    /// Register `T` as the decoder for `T::KIND`
    pub fn register<T: Asset>(&mut self) -> &mut Self {
        if self.decoders.insert(T::KIND, decode_erased::<T>).is_some() {
            log::warn!("Replaced decoder for kind {}", T::KIND);
        }
        self
    }

    pub fn kinds(&self) -> impl Iterator<Item = AssetKind> + '_ {
        self.decoders.keys().copied()
    }
}

impl Default for DecoderRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl std::fmt::Debug for DecoderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<_> = self.kinds().map(|k| k.as_str()).collect();
        kinds.sort_unstable();
        f.debug_struct("DecoderRegistry").field("kinds", &kinds).finish()
    }
}

impl ObjectLoader for DecoderRegistry {
    fn supports(&self, kind: AssetKind) -> bool {
        self.decoders.contains_key(&kind)
    }

    fn decode(&self, kind: AssetKind, bytes: &[u8]) -> Result<ObjectHandle> {
        let decode = self
            .decoders
            .get(&kind)
            .ok_or_else(|| Error::Decode(format!("no decoder registered for kind {kind}")))?;
        decode(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::format::{compress_bundle, BundleData, ObjectEntry};
    use tempfile::TempDir;

    fn write_bundle(dir: &Path, file: &str) -> PathBuf {
        let data = BundleData::new(
            file,
            vec![ObjectEntry::new("readme.txt", AssetKind::TEXT, b"hi".to_vec())],
        );
        let path = dir.join(file);
        std::fs::write(&path, compress_bundle(&data).unwrap()).unwrap();
        path
    }

    #[test]
    fn test_file_source_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_bundle(temp_dir.path(), "ui.bundle");

        let bundle = FileBundleSource.load_from_path(&path).expect("bundle should load");
        assert_eq!(bundle.name(), "ui.bundle");
        assert!(FileBundleSource.load_from_path(&temp_dir.path().join("nope")).is_none());
    }

    #[test]
    fn test_file_source_async_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_bundle(temp_dir.path(), "ui.bundle");

        let runtime = tokio::runtime::Runtime::new().unwrap();
        let source = Arc::new(FileBundleSource);
        let bundle = runtime.block_on(source.load_from_path_async(path));
        assert!(bundle.is_some());
    }

    #[test]
    fn test_registry_decodes_builtins() {
        let registry = DecoderRegistry::with_builtins();
        let bundle: BundleHandle = Arc::new(Bundle::new(
            "b",
            vec![
                ObjectEntry::new("a.txt", AssetKind::TEXT, b"text".to_vec()),
                ObjectEntry::new("c.json", AssetKind::JSON, br#"{"x": 1}"#.to_vec()),
            ],
        ));

        let text = registry.load_object(&bundle, "a", AssetKind::TEXT).unwrap();
        assert_eq!(text.downcast_ref::<String>().map(String::as_str), Some("text"));

        let json = registry.load_object(&bundle, "c", AssetKind::JSON).unwrap();
        let value = json.downcast_ref::<serde_json::Value>().unwrap();
        assert_eq!(value["x"], 1);

        assert!(registry.load_object(&bundle, "a", AssetKind::JSON).is_none());
    }

    #[test]
    fn test_registry_decode_failure_is_none() {
        let registry = DecoderRegistry::with_builtins();
        let bundle: BundleHandle = Arc::new(Bundle::new(
            "b",
            vec![ObjectEntry::new("bad.txt", AssetKind::TEXT, vec![0xff, 0xfe])],
        ));
        assert!(registry.load_object(&bundle, "bad", AssetKind::TEXT).is_none());
    }

    #[test]
    fn test_registry_supports() {
        let mut registry = DecoderRegistry::empty();
        assert!(!registry.supports(AssetKind::TEXT));
        registry.register::<String>();
        assert!(registry.supports(AssetKind::TEXT));
        assert!(!registry.supports(AssetKind::new("texture")));
    }
}
