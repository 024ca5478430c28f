//! The resource manager: owner of every bundle, asset and in-flight load
//!
//! One manager is created per process with [`ResourceManager::create`] and
//! driven from a single thread. Asynchronous loads run on the I/O worker;
//! their completions are applied, and subscriber callbacks invoked, when the
//! owning thread calls [`ResourceManager::update`] or when a synchronous call
//! force-resolves them.
//!
//! Bundle caching and reference counting live in `cache.rs`, asset caching in
//! `assets.rs`; both extend this type.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use std::sync::Arc;

use crate::bundle::coalescer::LoadCoalescer;
use crate::bundle::fast_mode::DevAssetIndex;
use crate::bundle::fixup::{FixupPass, ObjectFixup};
use crate::bundle::format::BundleHandle;
use crate::bundle::graph::{DependencyGraph, ManifestLoader};
use crate::bundle::key::{AssetKind, IdentityKey};
use crate::bundle::manifest::{BundleManifest, ManifestProvider, MANIFEST_OBJECT_NAME};
use crate::bundle::source::{Asset, BundleSource, DecoderRegistry, FileBundleSource, ObjectHandle, ObjectLoader};
use crate::bundle::worker::{Completion, IoWorker, OpId, Payload};
use crate::core::{Error, ManagerConfig, Result};

/// Name of the bundle shaders are looked up in
pub const SHADER_BUNDLE_NAME: &str = "shaders";

/// Continuation invoked when a bundle load finishes
pub type BundleCallback = Box<dyn FnOnce(&mut ResourceManager, Option<BundleHandle>)>;

/// Continuation invoked when an object load finishes
pub type ObjectCallback = Box<dyn FnOnce(&mut ResourceManager, Option<ObjectHandle>)>;

/// An object's key across all bundles
pub(super) type AssetKey = (String, IdentityKey);

/// Lifecycle state of a bundle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BundleState {
    Unloaded,
    Loading,
    Loaded,
}

/// Counters for load activity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadStats {
    /// Bundle loads issued to the source
    pub bundle_loads: u64,
    /// Object loads issued to the loader
    pub asset_loads: u64,
    /// Lookups answered from the asset cache
    pub cache_hits: u64,
    /// Requests attached to an already running load
    pub coalesced: u64,
    /// In-flight operations waited on synchronously
    pub force_resolves: u64,
}

/// A bundle in the `Loaded` state
#[derive(Debug)]
pub(super) struct LoadedBundle {
    /// `None` when the load failed
    pub handle: Option<BundleHandle>,
    /// Dependencies recorded at load time
    pub dependencies: Vec<String>,
    /// Bundles keeping this one alive
    pub referrers: HashSet<String>,
    /// Requested by its own name, never auto-unloaded
    pub explicit: bool,
}

/// Host collaborators the manager delegates to
#[derive(Clone)]
pub struct Collaborators {
    pub source: Arc<dyn BundleSource>,
    pub loader: Arc<dyn ObjectLoader>,
    /// Manifest to use instead of loading the manifest bundle
    pub manifest: Option<Arc<dyn ManifestProvider>>,
}

impl Collaborators {
    /// Bundles read from disk, objects decoded by the built-in registry
    pub fn file_backed() -> Self {
        Self {
            source: Arc::new(FileBundleSource),
            loader: Arc::new(DecoderRegistry::with_builtins()),
            manifest: None,
        }
    }

    pub fn with_source(mut self, source: Arc<dyn BundleSource>) -> Self {
        self.source = source;
        self
    }

    pub fn with_loader(mut self, loader: Arc<dyn ObjectLoader>) -> Self {
        self.loader = loader;
        self
    }

    pub fn with_manifest(mut self, manifest: Arc<dyn ManifestProvider>) -> Self {
        self.manifest = Some(manifest);
        self
    }
}

impl Default for Collaborators {
    fn default() -> Self {
        Self::file_backed()
    }
}

/// Dependency-aware, reference-counted bundle and asset cache
pub struct ResourceManager {
    pub(super) config: ManagerConfig,
    pub(super) source: Arc<dyn BundleSource>,
    pub(super) loader: Arc<dyn ObjectLoader>,
    pub(super) graph: DependencyGraph,
    pub(super) worker: IoWorker,
    pub(super) bundles: HashMap<String, LoadedBundle>,
    /// In-flight bundle loads, with the referrers gathered while loading
    pub(super) bundle_loads: LoadCoalescer<String, BundleCallback, HashSet<String>>,
    pub(super) assets: HashMap<String, HashMap<IdentityKey, Option<ObjectHandle>>>,
    pub(super) asset_loads: LoadCoalescer<AssetKey, ObjectCallback>,
    /// Set while pending asset loads are being drained
    pub(super) draining: bool,
    pub(super) drain_scratch: Vec<AssetKey>,
    pub(super) dev_index: Option<DevAssetIndex>,
    pub(super) fixups: FixupPass,
    pub(super) stats: LoadStats,
    shut_down: bool,
}

impl ResourceManager {
    /// Create a manager with explicit collaborators
    pub fn create(config: ManagerConfig, collaborators: Collaborators) -> Result<Self> {
        let worker = IoWorker::new(config.io_threads)?;

        let Collaborators {
            source,
            loader,
            manifest,
        } = collaborators;

        let graph = if config.fast_mode {
            DependencyGraph::disabled()
        } else {
            match manifest {
                Some(manifest) => DependencyGraph::with_manifest(manifest),
                None => DependencyGraph::lazy(manifest_loader(&config, Arc::clone(&source))),
            }
            .with_extension(config.normalized_extension())
        };

        let dev_index = if config.fast_mode {
            match &config.dev_asset_root {
                Some(root) => Some(DevAssetIndex::scan(root)?),
                None => {
                    log::warn!("Fast mode enabled without a development asset root");
                    None
                }
            }
        } else {
            None
        };

        log::info!(
            "Resource manager ready (root: {}, extension: {}, fast mode: {})",
            config.root.display(),
            config.normalized_extension().as_deref().unwrap_or("none"),
            config.fast_mode
        );

        Ok(Self {
            config,
            source,
            loader,
            graph,
            worker,
            bundles: HashMap::new(),
            bundle_loads: LoadCoalescer::new(),
            assets: HashMap::new(),
            asset_loads: LoadCoalescer::new(),
            draining: false,
            drain_scratch: Vec::new(),
            dev_index,
            fixups: FixupPass::new(),
            stats: LoadStats::default(),
            shut_down: false,
        })
    }

    /// Create a manager reading bundles from disk
    pub fn open(config: ManagerConfig) -> Result<Self> {
        Self::create(config, Collaborators::file_backed())
    }

    /// Apply every finished asynchronous load (non-blocking)
    ///
    /// Returns the number of completions processed.
    pub fn update(&mut self) -> usize {
        let mut processed = 0;
        while let Some(completion) = self.worker.try_next() {
            self.process_completion(completion);
            processed += 1;
        }
        processed
    }

    /// Block until no load is in flight, including loads started by callbacks
    pub fn finish_pending(&mut self) -> usize {
        let mut processed = self.update();
        while let Some(op) = self
            .bundle_loads
            .ops()
            .into_iter()
            .chain(self.asset_loads.ops())
            .min()
        {
            self.force_resolve(op);
            processed += 1;
        }
        processed
    }

    /// Drain pending loads, unload every bundle and stop the I/O worker
    ///
    /// Asynchronous requests made afterwards complete with `None`.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }

        self.finish_pending();

        let mut names: Vec<String> = self.bundles.keys().cloned().collect();
        names.sort();
        for name in names {
            self.unload_record(&name, true);
        }
        self.assets.clear();

        self.worker.shutdown();
        self.shut_down = true;
        log::info!("Resource manager shut down ({:?})", self.stats);
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    /// Wait for one operation and apply its result
    pub(super) fn force_resolve(&mut self, op: OpId) {
        self.stats.force_resolves += 1;
        match self.worker.wait_for(op) {
            Some(completion) => self.process_completion(completion),
            None => {
                // the worker no longer knows the operation: fail it so waiters are released
                log::error!("Lost track of {}, completing it as failed", op);
                if self.bundle_loads.ops().contains(&op) {
                    self.complete_bundle_load(op, None);
                } else {
                    self.complete_asset_load(op, None);
                }
            }
        }
    }

    fn process_completion(&mut self, completion: Completion) {
        match completion.payload {
            Payload::Bundle(handle) => self.complete_bundle_load(completion.op, handle),
            Payload::Object(object) => self.complete_asset_load(completion.op, object),
        }
    }

    /// Register a hook run on every successfully loaded object
    pub fn add_fixup(&mut self, fixup: impl ObjectFixup + 'static) {
        self.fixups.register(fixup);
    }

    /// Rescan the development asset directory used by fast mode
    pub fn refresh_dev_index(&mut self) -> Result<()> {
        if let Some(root) = &self.config.dev_asset_root {
            self.dev_index = Some(DevAssetIndex::scan(root)?);
        }
        Ok(())
    }

    // Shader helpers

    pub fn load_shader_bundle(&mut self) -> Option<BundleHandle> {
        self.load_bundle(SHADER_BUNDLE_NAME)
    }

    pub fn load_shader_bundle_async(
        &mut self,
        on_complete: impl FnOnce(&mut ResourceManager, Option<BundleHandle>) + 'static,
    ) {
        self.load_bundle_async(SHADER_BUNDLE_NAME, on_complete);
    }

    /// Look a shader up in the shader bundle, asking the host when it is not there
    pub fn find_shader<T: Asset>(
        &mut self,
        name: &str,
        fallback: impl FnOnce(&str) -> Option<Arc<T>>,
    ) -> Option<Arc<T>> {
        match self.get::<T>(SHADER_BUNDLE_NAME, name) {
            Some(shader) => Some(shader),
            None => {
                log::debug!("Shader {} not in bundle, using host lookup", name);
                fallback(name)
            }
        }
    }

    // Introspection

    pub fn bundle_state(&self, bundle: &str) -> BundleState {
        if self.bundles.contains_key(bundle) {
            BundleState::Loaded
        } else if self.bundle_loads.is_loading(&bundle.to_string()) {
            BundleState::Loading
        } else {
            BundleState::Unloaded
        }
    }

    /// Referrers keeping `bundle` alive, sorted
    pub fn referrers(&self, bundle: &str) -> Vec<String> {
        let set = match self.bundles.get(bundle) {
            Some(record) => Some(&record.referrers),
            None => self.bundle_loads.meta(&bundle.to_string()),
        };
        let mut referrers: Vec<String> = set.into_iter().flatten().cloned().collect();
        referrers.sort();
        referrers
    }

    pub fn is_explicit(&self, bundle: &str) -> bool {
        self.bundles.get(bundle).is_some_and(|record| record.explicit)
    }

    /// Names of loaded bundles, sorted
    pub fn loaded_bundles(&self) -> Vec<String> {
        let mut names: Vec<String> = self.bundles.keys().cloned().collect();
        names.sort();
        names
    }

    /// Dependencies recorded for a loaded bundle
    pub fn dependencies(&self, bundle: &str) -> Vec<String> {
        self.bundles
            .get(bundle)
            .map(|record| record.dependencies.clone())
            .unwrap_or_default()
    }

    /// Cached entries for `bundle`, failure sentinels included
    pub fn cached_asset_count(&self, bundle: &str) -> usize {
        self.assets.get(bundle).map_or(0, HashMap::len)
    }

    pub fn is_asset_cached(&self, bundle: &str, name: &str, kind: AssetKind) -> bool {
        self.assets
            .get(bundle)
            .is_some_and(|objects| objects.contains_key(&IdentityKey::new(kind, name)))
    }

    /// Operations submitted to the worker and not applied yet
    pub fn pending_operations(&self) -> usize {
        self.worker.pending_count()
    }

    pub fn is_draining(&self) -> bool {
        self.draining
    }

    pub fn stats(&self) -> &LoadStats {
        &self.stats
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Content hash the manifest records for `bundle`
    pub fn bundle_hash(&self, bundle: &str) -> Option<String> {
        self.graph.bundle_hash(&self.config.bundle_file_name(bundle, true))
    }
}

/// Loads the manifest bundle through `source` and decodes its manifest object
fn manifest_loader(config: &ManagerConfig, source: Arc<dyn BundleSource>) -> ManifestLoader {
    let path = config.manifest_path();
    let name = config.manifest_bundle.clone();

    Box::new(move || {
        let Some(bundle) = source.load_from_path(&path) else {
            log::error!(
                "{}",
                Error::MissingManifest {
                    name: name.clone(),
                    reason: format!("no bundle at {}", path.display()),
                }
            );
            return None;
        };

        let decoded = match bundle.find(MANIFEST_OBJECT_NAME, AssetKind::MANIFEST) {
            Some(entry) => BundleManifest::decode(&entry.data).map_err(|e| e.to_string()),
            None => Err(format!("no `{MANIFEST_OBJECT_NAME}` object")),
        };
        source.unload(&bundle, false);

        match decoded {
            Ok(manifest) => {
                log::info!("Loaded manifest {} ({} bundles)", name, manifest.bundles.len());
                Some(Arc::new(manifest) as Arc<dyn ManifestProvider>)
            }
            Err(reason) => {
                log::error!("{}", Error::MissingManifest { name: name.clone(), reason });
                None
            }
        }
    })
}

/// Fires a continuation once a fixed number of loads have signalled
pub(super) struct JoinCounter {
    remaining: Cell<usize>,
    bundle: String,
    on_complete: RefCell<Option<BundleCallback>>,
}

impl JoinCounter {
    pub(super) fn new(bundle: &str, count: usize, on_complete: BundleCallback) -> Self {
        Self {
            remaining: Cell::new(count),
            bundle: bundle.to_string(),
            on_complete: RefCell::new(Some(on_complete)),
        }
    }

    /// Continuation that counts one load as finished
    pub(super) fn subscriber(self: &Rc<Self>) -> BundleCallback {
        let join = Rc::clone(self);
        Box::new(move |manager: &mut ResourceManager, _: Option<BundleHandle>| join.signal(manager))
    }

    /// Count one load as finished, running the continuation on the last one
    pub(super) fn signal(&self, manager: &mut ResourceManager) {
        let remaining = self.remaining.get().saturating_sub(1);
        self.remaining.set(remaining);
        if remaining > 0 {
            return;
        }

        let on_complete = self.on_complete.borrow_mut().take();
        if let Some(on_complete) = on_complete {
            let handle = manager.bundle_handle(&self.bundle);
            on_complete(manager, handle);
        }
    }
}
