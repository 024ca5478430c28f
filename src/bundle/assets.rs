//! Per-bundle asset cache
//!
//! Objects are cached per bundle under their [`IdentityKey`]. A failed load
//! is cached as `None`, so asking again never retries until the entry is
//! cleared or the bundle unloads.

use std::sync::Arc;

use crate::bundle::format::BundleHandle;
use crate::bundle::key::{AssetKind, IdentityKey};
use crate::bundle::manager::{AssetKey, ObjectCallback, ResourceManager};
use crate::bundle::source::{Asset, ObjectHandle};
use crate::bundle::worker::{OpId, OpKind, Payload};
use crate::core::Error;

impl ResourceManager {
    /// Load an object synchronously
    ///
    /// Loads the owning bundle (and its dependencies) when needed and blocks on
    /// an in-flight load of the same object. Returns `None` when the bundle or
    /// object is unavailable.
    pub fn get_object(&mut self, bundle: &str, name: &str, kind: AssetKind) -> Option<ObjectHandle> {
        if !self.check_request(bundle, name, kind) {
            return None;
        }
        if self.config.fast_mode {
            return self.load_dev_object(bundle, name, kind);
        }

        let bundle = self.config.bundle_name(bundle);
        let key = IdentityKey::new(kind, name);
        if let Some(cached) = self.cached(&bundle, &key) {
            self.stats.cache_hits += 1;
            return cached;
        }

        let asset_key = (bundle.clone(), key.clone());
        if self.asset_loads.is_loading(&asset_key) {
            self.force_resolve_asset(&asset_key);
            return self.cached(&bundle, &key).flatten();
        }

        let handle = self.acquire(&bundle, &bundle);

        // acquiring may have completed an async load of this object
        if let Some(cached) = self.cached(&bundle, &key) {
            return cached;
        }

        let object = match handle {
            Some(handle) => {
                self.stats.asset_loads += 1;
                let object = self.loader.load_object(&handle, name, kind);
                self.finish_object(&bundle, &key, object)
            }
            None => {
                self.log_null_request(&bundle, name);
                None
            }
        };
        self.store_asset(&bundle, key, object.clone());
        object
    }

    /// Load an object without blocking
    ///
    /// Concurrent requests for the same object share one load; callbacks run
    /// in request order.
    pub fn get_object_async(
        &mut self,
        bundle: &str,
        name: &str,
        kind: AssetKind,
        on_complete: impl FnOnce(&mut ResourceManager, Option<ObjectHandle>) + 'static,
    ) {
        self.request_object(bundle, name, kind, Box::new(on_complete));
    }

    fn request_object(&mut self, bundle: &str, name: &str, kind: AssetKind, on_complete: ObjectCallback) {
        if !self.check_request(bundle, name, kind) {
            on_complete(self, None);
            return;
        }
        if self.config.fast_mode {
            let object = self.load_dev_object(bundle, name, kind);
            on_complete(self, object);
            return;
        }

        let bundle = self.config.bundle_name(bundle);
        let key = IdentityKey::new(kind, name);
        if let Some(cached) = self.cached(&bundle, &key) {
            self.stats.cache_hits += 1;
            on_complete(self, cached);
            return;
        }

        let asset_key = (bundle.clone(), key);
        if self.asset_loads.is_loading(&asset_key) {
            self.stats.coalesced += 1;
            if let Err(on_complete) = self.asset_loads.subscribe(&asset_key, on_complete) {
                on_complete(self, None);
            }
            return;
        }

        if self.bundles.contains_key(&bundle) {
            self.acquire(&bundle, &bundle);
            self.start_asset_load(asset_key, on_complete);
        } else {
            self.acquire_async_internal(
                &bundle,
                &bundle,
                Box::new(move |manager: &mut ResourceManager, _: Option<BundleHandle>| {
                    manager.start_asset_load(asset_key, on_complete)
                }),
            );
        }
    }

    /// Start loading an object of a loaded bundle, or join/answer from cache
    fn start_asset_load(&mut self, asset_key: AssetKey, on_complete: ObjectCallback) {
        let (bundle, key) = &asset_key;
        if let Some(cached) = self.cached(bundle, key) {
            on_complete(self, cached);
            return;
        }
        if self.asset_loads.is_loading(&asset_key) {
            self.stats.coalesced += 1;
            if let Err(on_complete) = self.asset_loads.subscribe(&asset_key, on_complete) {
                on_complete(self, None);
            }
            return;
        }

        let Some(handle) = self.bundle_handle(bundle) else {
            self.log_null_request(bundle, key.name());
            self.store_asset(bundle, key.clone(), None);
            on_complete(self, None);
            return;
        };

        let loader = Arc::clone(&self.loader);
        let name = key.name().to_string();
        let kind = key.kind();
        let op = self.worker.submit(
            OpKind::Object,
            Box::pin(async move { Payload::Object(loader.load_object_async(handle, name, kind).await) }),
        );
        self.stats.asset_loads += 1;
        log::debug!("Loading {} from {} ({})", key, bundle, op);

        self.asset_loads.start(asset_key.clone(), op, ());
        if let Err(on_complete) = self.asset_loads.subscribe(&asset_key, on_complete) {
            on_complete(self, None);
        }
    }

    /// Cache a finished object load and notify its subscribers in order
    pub(super) fn complete_asset_load(&mut self, op: OpId, object: Option<ObjectHandle>) {
        let Some(((bundle, key), flight)) = self.asset_loads.complete(op) else {
            return;
        };

        let object = self.finish_object(&bundle, &key, object);
        self.store_asset(&bundle, key, object.clone());

        for subscriber in flight.subscribers {
            subscriber(self, object.clone());
        }
    }

    pub(super) fn force_resolve_asset(&mut self, asset_key: &AssetKey) {
        if let Some(op) = self.asset_loads.op_of(asset_key) {
            self.force_resolve(op);
        }
    }

    /// Typed [`get_object`](Self::get_object)
    pub fn get<T: Asset>(&mut self, bundle: &str, name: &str) -> Option<Arc<T>> {
        let object = self.get_object(bundle, name, T::KIND)?;
        downcast::<T>(bundle, name, object)
    }

    /// Typed [`get_object_async`](Self::get_object_async)
    pub fn get_async<T: Asset>(
        &mut self,
        bundle: &str,
        name: &str,
        on_complete: impl FnOnce(&mut ResourceManager, Option<Arc<T>>) + 'static,
    ) {
        let (bundle_name, asset_name) = (bundle.to_string(), name.to_string());
        self.request_object(
            bundle,
            name,
            T::KIND,
            Box::new(move |manager: &mut ResourceManager, object: Option<ObjectHandle>| {
                let typed = object.and_then(|object| downcast::<T>(&bundle_name, &asset_name, object));
                on_complete(manager, typed)
            }),
        );
    }

    /// Drop a cached object and return its memory to the host
    pub fn unload_object(&mut self, bundle: &str, name: &str, kind: AssetKind) -> bool {
        match self.remove_asset(bundle, name, kind) {
            Some(object) => {
                if let Some(object) = object {
                    self.loader.unload_object(&object);
                }
                true
            }
            None => false,
        }
    }

    /// Forget a cached object without releasing it
    pub fn clear_object(&mut self, bundle: &str, name: &str, kind: AssetKind) -> bool {
        self.remove_asset(bundle, name, kind).is_some()
    }

    pub fn unload<T: Asset>(&mut self, bundle: &str, name: &str) -> bool {
        self.unload_object(bundle, name, T::KIND)
    }

    pub fn clear<T: Asset>(&mut self, bundle: &str, name: &str) -> bool {
        self.clear_object(bundle, name, T::KIND)
    }

    /// Unload every cached object of `bundle`
    ///
    /// Returns `false` without touching the cache when pending loads are
    /// already being drained.
    pub fn unload_all_assets(&mut self, bundle: &str) -> bool {
        let bundle = self.config.bundle_name(bundle);
        if !self.drain_asset_loads(&bundle) {
            return false;
        }
        if let Some(objects) = self.assets.remove(&bundle) {
            for object in objects.into_values().flatten() {
                self.loader.unload_object(&object);
            }
        }
        true
    }

    /// Forget every cached object of `bundle`
    ///
    /// Returns `false` without touching the cache when pending loads are
    /// already being drained.
    pub fn clear_all_assets(&mut self, bundle: &str) -> bool {
        let bundle = self.config.bundle_name(bundle);
        if !self.drain_asset_loads(&bundle) {
            return false;
        }
        if let Some(objects) = self.assets.remove(&bundle) {
            log::debug!("Cleared {} cached assets of {}", objects.len(), bundle);
        }
        true
    }

    fn remove_asset(&mut self, bundle: &str, name: &str, kind: AssetKind) -> Option<Option<ObjectHandle>> {
        let bundle = self.config.bundle_name(bundle);
        let key = IdentityKey::new(kind, name);
        let asset_key = (bundle.clone(), key.clone());
        if self.asset_loads.is_loading(&asset_key) {
            self.force_resolve_asset(&asset_key);
        }
        self.assets.get_mut(&bundle)?.remove(&key)
    }

    /// Complete every pending load of `bundle`'s objects
    fn drain_asset_loads(&mut self, bundle: &str) -> bool {
        if self.draining {
            log::warn!(
                "{}",
                Error::ReentrantDrainRejected {
                    bundle: bundle.to_string(),
                }
            );
            return false;
        }
        self.draining = true;

        let mut scratch = std::mem::take(&mut self.drain_scratch);
        scratch.extend(self.asset_loads.keys_where(|(owner, _)| owner == bundle));
        for asset_key in &scratch {
            self.force_resolve_asset(asset_key);
        }
        scratch.clear();
        self.drain_scratch = scratch;

        self.draining = false;
        true
    }

    fn check_request(&self, bundle: &str, name: &str, kind: AssetKind) -> bool {
        if !self.loader.supports(kind) {
            log::error!(
                "{}",
                Error::TypeMismatch {
                    bundle: bundle.to_string(),
                    asset: name.to_string(),
                    requested: kind.to_string(),
                }
            );
            return false;
        }
        if bundle.is_empty() || name.is_empty() {
            self.log_null_request(bundle, name);
            return false;
        }
        true
    }

    /// Apply fixups to a loaded object, logging a missing one
    fn finish_object(&self, bundle: &str, key: &IdentityKey, object: Option<ObjectHandle>) -> Option<ObjectHandle> {
        match object {
            Some(object) => Some(self.fixups.run(bundle, key, object)),
            None => {
                log::error!(
                    "{}",
                    Error::NullAsset {
                        bundle: bundle.to_string(),
                        asset: key.name().to_string(),
                        kind: key.kind().as_str(),
                    }
                );
                None
            }
        }
    }

    pub(super) fn cached(&self, bundle: &str, key: &IdentityKey) -> Option<Option<ObjectHandle>> {
        self.assets.get(bundle)?.get(key).cloned()
    }

    /// Cache an object, only while its bundle is loaded
    fn store_asset(&mut self, bundle: &str, key: IdentityKey, object: Option<ObjectHandle>) {
        if !self.bundles.contains_key(bundle) {
            log::debug!("Not caching {} from {}, bundle is not loaded", key, bundle);
            return;
        }
        self.assets.entry(bundle.to_string()).or_default().insert(key, object);
    }

    fn log_null_request(&self, bundle: &str, name: &str) {
        log::error!(
            "{}",
            Error::NullAssetLoadRequest {
                bundle: bundle.to_string(),
                asset: name.to_string(),
            }
        );
    }
}

fn downcast<T: Asset>(bundle: &str, name: &str, object: ObjectHandle) -> Option<Arc<T>> {
    match object.downcast::<T>() {
        Ok(typed) => Some(typed),
        Err(_) => {
            log::error!(
                "{}",
                Error::TypeMismatch {
                    bundle: bundle.to_string(),
                    asset: name.to_string(),
                    requested: std::any::type_name::<T>().to_string(),
                }
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::manager::BundleState;
    use crate::bundle::test_support::{memory_manager, memory_manager_with_loader, CountingLoader, MemorySource};
    use crate::core::Result;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    #[test]
    fn test_get_caches_object() {
        let source = MemorySource::fixture();
        let loader = CountingLoader::new();
        let mut manager = memory_manager_with_loader(&source, &loader);

        let first = manager.get::<String>("ui", "title").unwrap();
        let second = manager.get::<String>("ui", "title").unwrap();

        assert_eq!(first.as_str(), "Main menu");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(loader.loads(), 1);
        assert_eq!(manager.stats().cache_hits, 1);
        assert!(manager.is_explicit("ui"));
        assert_eq!(manager.bundle_state("shared"), BundleState::Loaded);
    }

    #[test]
    fn test_missing_asset_is_cached_failure() {
        crate::core::logging::init_for_tests();
        let source = MemorySource::fixture();
        let loader = CountingLoader::new();
        let mut manager = memory_manager_with_loader(&source, &loader);

        assert!(manager.get::<String>("ui", "missing").is_none());
        assert!(manager.is_asset_cached("ui", "missing", AssetKind::TEXT));
        assert!(manager.get::<String>("ui", "missing").is_none());
        assert_eq!(loader.loads(), 1);
    }

    #[test]
    fn test_missing_bundle_asset_is_cached_failure() {
        let source = MemorySource::fixture();
        let loader = CountingLoader::new();
        let mut manager = memory_manager_with_loader(&source, &loader);

        assert!(manager.get::<String>("ghost", "anything").is_none());
        assert!(manager.get::<String>("ghost", "anything").is_none());
        assert_eq!(source.load_count("ghost.bundle"), 1);
        assert_eq!(loader.loads(), 0);
        assert_eq!(manager.cached_asset_count("ghost"), 1);
    }

    #[test]
    fn test_concurrent_async_gets_share_one_load() {
        let source = MemorySource::fixture();
        let loader = CountingLoader::new();
        let mut manager = memory_manager_with_loader(&source, &loader);

        let results = Rc::new(RefCell::new(Vec::new()));
        for i in 0..4 {
            let results = results.clone();
            manager.get_async::<String>("ui", "title", move |_, title| {
                results.borrow_mut().push((i, title));
            });
        }
        manager.finish_pending();

        let results = results.borrow();
        assert_eq!(results.iter().map(|(i, _)| *i).collect::<Vec<_>>(), vec![0, 1, 2, 3]);
        let first = results[0].1.clone().unwrap();
        assert!(results.iter().all(|(_, t)| t.as_ref().is_some_and(|t| Arc::ptr_eq(t, &first))));
        assert_eq!(loader.loads(), 1);
        assert_eq!(source.load_count("ui.bundle"), 1);
    }

    #[test]
    fn test_sync_get_joins_async_load() {
        let source = MemorySource::fixture();
        let loader = CountingLoader::new();
        let mut manager = memory_manager_with_loader(&source, &loader);
        manager.load_bundle("ui");

        let from_async = Rc::new(RefCell::new(None));
        let slot = from_async.clone();
        manager.get_async::<String>("ui", "title", move |_, title| {
            *slot.borrow_mut() = title;
        });

        let from_sync = manager.get::<String>("ui", "title").unwrap();
        let from_async = from_async.borrow().clone().unwrap();
        assert!(Arc::ptr_eq(&from_sync, &from_async));
        assert_eq!(loader.loads(), 1);
    }

    #[test]
    fn test_release_drops_cached_assets() {
        let source = MemorySource::fixture();
        let loader = CountingLoader::new();
        let mut manager = memory_manager_with_loader(&source, &loader);

        manager.get::<String>("ui", "title");
        assert_eq!(manager.cached_asset_count("ui"), 1);

        assert!(manager.release("ui", true));
        assert_eq!(manager.cached_asset_count("ui"), 0);

        assert!(manager.get::<String>("ui", "title").is_some());
        assert_eq!(loader.loads(), 2);
        assert_eq!(source.load_count("ui.bundle"), 2);
    }

    #[test]
    fn test_unsupported_kind_short_circuits() {
        crate::core::logging::init_for_tests();
        let source = MemorySource::fixture();
        let mut manager = memory_manager(&source);

        assert!(manager.get_object("ui", "title", AssetKind::new("texture")).is_none());
        assert_eq!(manager.bundle_state("ui"), BundleState::Unloaded);
        assert_eq!(source.load_count("ui.bundle"), 0);
    }

    #[derive(Debug)]
    struct Headline(String);

    impl Asset for Headline {
        const KIND: AssetKind = AssetKind::TEXT;

        fn decode(bytes: &[u8]) -> Result<Self> {
            Ok(Headline(String::from_utf8_lossy(bytes).into_owned()))
        }
    }

    #[test]
    fn test_typed_get_reports_type_mismatch() {
        let source = MemorySource::fixture();
        let mut manager = memory_manager(&source);

        // text entries decode to String with the built-in registry
        assert!(manager.get::<Headline>("ui", "title").is_none());
        assert!(manager.get::<String>("ui", "title").is_some());
    }

    #[test]
    fn test_empty_name_is_rejected() {
        let source = MemorySource::fixture();
        let mut manager = memory_manager(&source);

        assert!(manager.get::<String>("ui", "").is_none());
        let answered = Rc::new(Cell::new(false));
        let flag = answered.clone();
        manager.get_async::<String>("", "title", move |_, title| flag.set(title.is_none()));
        assert!(answered.get());
        assert_eq!(manager.bundle_state("ui"), BundleState::Unloaded);
    }

    #[test]
    fn test_unload_releases_object_but_clear_does_not() {
        let source = MemorySource::fixture();
        let loader = CountingLoader::new();
        let mut manager = memory_manager_with_loader(&source, &loader);

        manager.get::<String>("ui", "title");
        assert!(manager.clear::<String>("ui", "title"));
        assert_eq!(loader.unloads(), 0);
        assert!(!manager.clear::<String>("ui", "title"));

        manager.get::<String>("ui", "title");
        assert!(manager.unload::<String>("ui", "title"));
        assert_eq!(loader.unloads(), 1);
        assert_eq!(loader.loads(), 2);
    }

    #[test]
    fn test_unload_all_assets_releases_every_object() {
        let source = MemorySource::fixture();
        let loader = CountingLoader::new();
        let mut manager = memory_manager_with_loader(&source, &loader);

        manager.get::<String>("ui", "title");
        manager.get::<String>("ui", "missing");
        assert_eq!(manager.cached_asset_count("ui"), 2);

        assert!(manager.unload_all_assets("ui"));
        assert_eq!(manager.cached_asset_count("ui"), 0);
        assert_eq!(loader.unloads(), 1);
        assert_eq!(manager.bundle_state("ui"), BundleState::Loaded);
    }

    #[test]
    fn test_clear_all_forces_pending_loads() {
        let source = MemorySource::fixture();
        let mut manager = memory_manager(&source);
        manager.load_bundle("ui");

        let fired = Rc::new(Cell::new(false));
        let flag = fired.clone();
        manager.get_async::<String>("ui", "title", move |_, _| flag.set(true));
        assert_eq!(manager.pending_operations(), 1);

        assert!(manager.clear_all_assets("ui"));
        assert!(fired.get());
        assert_eq!(manager.cached_asset_count("ui"), 0);
        assert_eq!(manager.pending_operations(), 0);
    }

    #[test]
    fn test_reentrant_drain_is_rejected() {
        crate::core::logging::init_for_tests();
        let source = MemorySource::fixture();
        let mut manager = memory_manager(&source);
        manager.load_bundle("ui");

        let nested = Rc::new(Cell::new(None));
        let slot = nested.clone();
        manager.get_async::<String>("ui", "title", move |manager, _| {
            assert!(manager.is_draining());
            slot.set(Some(manager.clear_all_assets("ui")));
        });

        assert!(manager.clear_all_assets("ui"));
        assert_eq!(nested.get(), Some(false));
        assert!(!manager.is_draining());
        assert_eq!(manager.cached_asset_count("ui"), 0);

        // released guard accepts the next drain
        assert!(manager.clear_all_assets("ui"));
    }

    #[test]
    fn test_release_aborts_while_draining() {
        let source = MemorySource::fixture();
        let mut manager = memory_manager(&source);
        manager.load_bundle("ui");

        let released = Rc::new(Cell::new(None));
        let slot = released.clone();
        manager.get_async::<String>("ui", "title", move |manager, _| {
            slot.set(Some(manager.release("ui", false)));
        });

        assert!(manager.unload_all_assets("ui"));
        assert_eq!(released.get(), Some(false));
        assert_eq!(manager.bundle_state("ui"), BundleState::Loaded);
    }

    #[test]
    fn test_fixups_run_on_loaded_objects() {
        let source = MemorySource::fixture();
        let mut manager = memory_manager(&source);

        let runs = Rc::new(Cell::new(0));
        let counter = runs.clone();
        manager.add_fixup(move |_: &str, key: &IdentityKey, object: ObjectHandle| -> ObjectHandle {
            counter.set(counter.get() + 1);
            if key.kind() == AssetKind::TEXT {
                if let Some(text) = object.downcast_ref::<String>() {
                    return Arc::new(text.to_uppercase());
                }
            }
            object
        });

        assert_eq!(manager.get::<String>("ui", "title").unwrap().as_str(), "MAIN MENU");
        assert!(manager.get::<String>("ui", "missing").is_none());
        manager.get::<String>("ui", "title");
        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn test_async_get_for_missing_bundle() {
        let source = MemorySource::fixture();
        let mut manager = memory_manager(&source);

        let result = Rc::new(Cell::new(None));
        let slot = result.clone();
        manager.get_async::<String>("ghost", "title", move |_, title| slot.set(Some(title.is_none())));
        manager.finish_pending();

        assert_eq!(result.get(), Some(true));
        assert_eq!(manager.cached_asset_count("ghost"), 1);
    }
}
