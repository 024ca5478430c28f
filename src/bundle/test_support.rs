//! In-memory collaborators for manager tests

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::bundle::format::{Bundle, BundleHandle, ObjectEntry};
use crate::bundle::key::AssetKind;
use crate::bundle::manager::{Collaborators, ResourceManager};
use crate::bundle::manifest::BundleManifest;
use crate::bundle::source::{BundleSource, DecoderRegistry, ObjectHandle, ObjectLoader};
use crate::core::{ManagerConfig, Result};

/// Bundle source serving prebuilt bundles and recording every call
#[derive(Default)]
pub(crate) struct MemorySource {
    bundles: HashMap<String, BundleHandle>,
    manifest: BundleManifest,
    loads: Mutex<HashMap<String, usize>>,
    unloaded: Mutex<Vec<String>>,
}

impl MemorySource {
    /// `ui` and `hud` depend on `shared`; `shaders` stands alone
    pub(crate) fn fixture() -> Arc<Self> {
        let mut source = Self {
            manifest: BundleManifest::new(),
            ..Default::default()
        };
        source.add(
            "ui.bundle",
            vec!["shared.bundle"],
            vec![ObjectEntry::new("text/title.txt", AssetKind::TEXT, b"Main menu".to_vec())],
        );
        source.add(
            "hud.bundle",
            vec!["shared.bundle"],
            vec![ObjectEntry::new("ammo.txt", AssetKind::TEXT, b"30".to_vec())],
        );
        source.add(
            "shared.bundle",
            vec![],
            vec![ObjectEntry::new("palette.json", AssetKind::JSON, br#"{"accent":"red"}"#.to_vec())],
        );
        source.add(
            "shaders.bundle",
            vec![],
            vec![ObjectEntry::new("lit.shader", AssetKind::TEXT, b"lit shader".to_vec())],
        );
        Arc::new(source)
    }

    fn add(&mut self, file: &str, dependencies: Vec<&str>, objects: Vec<ObjectEntry>) {
        self.manifest.insert(
            file,
            format!("hash-{file}"),
            dependencies.into_iter().map(String::from).collect(),
        );
        self.bundles.insert(file.to_string(), Arc::new(Bundle::new(file, objects)));
    }

    pub(crate) fn manifest(&self) -> Arc<BundleManifest> {
        Arc::new(self.manifest.clone())
    }

    /// Times `file` was requested from this source
    pub(crate) fn load_count(&self, file: &str) -> usize {
        self.loads.lock().unwrap().get(file).copied().unwrap_or(0)
    }

    /// Names of unloaded bundles, in call order
    pub(crate) fn unloaded(&self) -> Vec<String> {
        self.unloaded.lock().unwrap().clone()
    }
}

impl BundleSource for MemorySource {
    fn load_from_path(&self, path: &Path) -> Option<BundleHandle> {
        let file = path.file_name()?.to_string_lossy().into_owned();
        *self.loads.lock().unwrap().entry(file.clone()).or_default() += 1;
        self.bundles.get(&file).cloned()
    }

    fn unload(&self, bundle: &BundleHandle, _unload_all_loaded_objects: bool) {
        self.unloaded.lock().unwrap().push(bundle.name().to_string());
    }
}

/// Built-in decoders plus load and unload counters
pub(crate) struct CountingLoader {
    registry: DecoderRegistry,
    loads: AtomicUsize,
    unloads: AtomicUsize,
}

impl CountingLoader {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            registry: DecoderRegistry::with_builtins(),
            loads: AtomicUsize::new(0),
            unloads: AtomicUsize::new(0),
        })
    }

    pub(crate) fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub(crate) fn unloads(&self) -> usize {
        self.unloads.load(Ordering::SeqCst)
    }
}

impl ObjectLoader for CountingLoader {
    fn supports(&self, kind: AssetKind) -> bool {
        self.registry.supports(kind)
    }

    fn decode(&self, kind: AssetKind, bytes: &[u8]) -> Result<ObjectHandle> {
        self.registry.decode(kind, bytes)
    }

    fn load_object(&self, bundle: &BundleHandle, name: &str, kind: AssetKind) -> Option<ObjectHandle> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.registry.load_object(bundle, name, kind)
    }

    fn unload_object(&self, _object: &ObjectHandle) {
        self.unloads.fetch_add(1, Ordering::SeqCst);
    }
}

fn test_config() -> ManagerConfig {
    ManagerConfig::new("/virtual/bundles").with_extension(".bundle")
}

pub(crate) fn memory_manager(source: &Arc<MemorySource>) -> ResourceManager {
    memory_manager_with(source, |_| {})
}

pub(crate) fn memory_manager_with(
    source: &Arc<MemorySource>,
    configure: impl FnOnce(&mut ManagerConfig),
) -> ResourceManager {
    let mut config = test_config();
    configure(&mut config);
    let collaborators = Collaborators::file_backed()
        .with_source(source.clone())
        .with_manifest(source.manifest());
    ResourceManager::create(config, collaborators).expect("manager creation failed")
}

pub(crate) fn memory_manager_with_loader(
    source: &Arc<MemorySource>,
    loader: &Arc<CountingLoader>,
) -> ResourceManager {
    let collaborators = Collaborators::file_backed()
        .with_source(source.clone())
        .with_loader(loader.clone())
        .with_manifest(source.manifest());
    ResourceManager::create(test_config(), collaborators).expect("manager creation failed")
}
