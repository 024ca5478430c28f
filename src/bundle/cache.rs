//! Reference-counted bundle cache
//!
//! A loaded bundle stays alive while some other bundle refers to it or while
//! it is explicit (requested by its own name). Releasing a bundle drops its
//! reference on every dependency recorded at load time, and a dependency left
//! without referrers unloads in turn.

use std::collections::HashSet;
use std::rc::Rc;
use std::sync::Arc;

use crate::bundle::format::BundleHandle;
use crate::bundle::manager::{BundleCallback, JoinCounter, LoadedBundle, ResourceManager};
use crate::bundle::worker::{OpId, OpKind, Payload};
use crate::core::Error;

impl ResourceManager {
    /// Load a bundle on its own behalf, pinning it until released
    pub fn load_bundle(&mut self, bundle: &str) -> Option<BundleHandle> {
        self.acquire(bundle, bundle)
    }

    /// Load a bundle kept alive by `referrer`
    ///
    /// Dependencies are loaded first, each referred to by `bundle`. When the
    /// bundle is already loading the call blocks until that load finishes.
    /// Returns `None` in fast mode and when the bundle could not be loaded.
    pub fn acquire(&mut self, bundle: &str, referrer: &str) -> Option<BundleHandle> {
        if self.config.fast_mode {
            return None;
        }
        let bundle = self.config.bundle_name(bundle);
        if bundle.is_empty() {
            log::error!("Cannot load a bundle without a name");
            return None;
        }

        if self.bundles.contains_key(&bundle) {
            self.finish_loading_dependencies(&bundle);
        } else {
            // dependencies first, joining any that are already in flight
            let dependencies = self.resolve_dependencies(&bundle);
            for dependency in &dependencies {
                self.acquire_dependency(dependency, &bundle);
            }

            if self.bundle_loads.is_loading(&bundle) {
                self.force_resolve_bundle(&bundle);
            }
            if !self.bundles.contains_key(&bundle) {
                let handle = self.load_bundle_file(&bundle);
                self.insert_loaded(&bundle, handle, dependencies, HashSet::new());
            }
        }

        self.add_reference(&bundle, referrer);
        self.bundle_handle(&bundle)
    }

    /// Load one dependency without descending into its own dependencies
    fn acquire_dependency(&mut self, dependency: &str, referrer: &str) {
        if self.bundles.contains_key(dependency) {
            self.add_reference(dependency, referrer);
            return;
        }

        let key = dependency.to_string();
        if let Some(referrers) = self.bundle_loads.meta_mut(&key) {
            referrers.insert(referrer.to_string());
            self.force_resolve_bundle(dependency);
            return;
        }

        let dependencies = self.resolve_dependencies(dependency);
        let handle = self.load_bundle_file(dependency);
        let referrers = HashSet::from([referrer.to_string()]);
        self.insert_loaded(dependency, handle, dependencies, referrers);
    }

    /// Load a bundle on its own behalf without blocking
    ///
    /// `on_complete` runs once the bundle and every dependency are loaded.
    pub fn load_bundle_async(
        &mut self,
        bundle: &str,
        on_complete: impl FnOnce(&mut ResourceManager, Option<BundleHandle>) + 'static,
    ) {
        self.acquire_async(bundle, bundle, Box::new(on_complete));
    }

    /// Asynchronous [`acquire`](Self::acquire)
    ///
    /// The bundle and all of its not yet loaded dependencies load concurrently.
    /// Loads already in flight are joined rather than restarted.
    pub fn acquire_async(&mut self, bundle: &str, referrer: &str, on_complete: BundleCallback) {
        if self.config.fast_mode {
            on_complete(self, None);
            return;
        }
        let bundle = self.config.bundle_name(bundle);
        if bundle.is_empty() {
            log::error!("Cannot load a bundle without a name");
            on_complete(self, None);
            return;
        }

        if self.bundles.contains_key(&bundle) {
            self.add_reference(&bundle, referrer);
            let handle = self.bundle_handle(&bundle);
            on_complete(self, handle);
            return;
        }

        self.acquire_async_internal(&bundle, referrer, on_complete);
    }

    /// Start or join the loads `bundle` needs, gating `on_complete` on all of them
    pub(super) fn acquire_async_internal(
        &mut self,
        bundle: &str,
        referrer: &str,
        on_complete: BundleCallback,
    ) {
        let dependencies = self.resolve_dependencies(bundle);
        let unresolved = dependencies
            .iter()
            .filter(|dep| !self.bundles.contains_key(dep.as_str()))
            .count();
        let join = Rc::new(JoinCounter::new(bundle, unresolved + 1, on_complete));

        for dependency in &dependencies {
            if self.bundles.contains_key(dependency) {
                self.add_reference(dependency, bundle);
                continue;
            }
            self.start_or_join_bundle(dependency, bundle, join.subscriber());
        }

        if self.bundles.contains_key(bundle) {
            self.add_reference(bundle, referrer);
            join.signal(self);
        } else {
            self.start_or_join_bundle(bundle, referrer, join.subscriber());
        }
    }

    /// Attach to `bundle`'s in-flight load, starting it when none is running
    fn start_or_join_bundle(&mut self, bundle: &str, referrer: &str, subscriber: BundleCallback) {
        let key = bundle.to_string();
        if let Some(referrers) = self.bundle_loads.meta_mut(&key) {
            referrers.insert(referrer.to_string());
            self.stats.coalesced += 1;
        } else {
            self.start_bundle_load(bundle, HashSet::from([referrer.to_string()]));
        }

        if let Err(subscriber) = self.bundle_loads.subscribe(&key, subscriber) {
            let handle = self.bundle_handle(bundle);
            subscriber(self, handle);
        }
    }

    fn start_bundle_load(&mut self, bundle: &str, referrers: HashSet<String>) -> OpId {
        let path = self.config.bundle_path(bundle, true);
        let source = Arc::clone(&self.source);
        let op = self.worker.submit(
            OpKind::Bundle,
            Box::pin(async move { Payload::Bundle(source.load_from_path_async(path).await) }),
        );
        self.bundle_loads.start(bundle.to_string(), op, referrers);
        self.stats.bundle_loads += 1;
        log::debug!("Loading bundle {} ({})", bundle, op);
        op
    }

    /// Turn a finished load into a `Loaded` record and notify its subscribers
    pub(super) fn complete_bundle_load(&mut self, op: OpId, handle: Option<BundleHandle>) {
        let Some((bundle, flight)) = self.bundle_loads.complete(op) else {
            return;
        };

        if self.bundles.contains_key(&bundle) {
            for referrer in &flight.meta {
                self.add_reference(&bundle, referrer);
            }
        } else {
            if handle.is_none() {
                self.log_missing_bundle(&bundle);
            }
            let dependencies = self.resolve_dependencies(&bundle);
            self.insert_loaded(&bundle, handle, dependencies, flight.meta);
        }

        for subscriber in flight.subscribers {
            let handle = self.bundle_handle(&bundle);
            subscriber(self, handle);
        }
    }

    pub(super) fn force_resolve_bundle(&mut self, bundle: &str) {
        if let Some(op) = self.bundle_loads.op_of(&bundle.to_string()) {
            self.force_resolve(op);
        }
    }

    /// Wait for every recorded dependency of a loaded bundle that is still in flight
    fn finish_loading_dependencies(&mut self, bundle: &str) {
        let dependencies = self
            .bundles
            .get(bundle)
            .map(|record| record.dependencies.clone())
            .unwrap_or_default();
        for dependency in &dependencies {
            if self.bundle_loads.is_loading(dependency) {
                self.force_resolve_bundle(dependency);
            }
        }
    }

    /// Release a bundle by name
    ///
    /// Waits for a pending load of the bundle, drops its cached assets, then
    /// unloads it and releases its dependencies. Returns `false` when the
    /// bundle was not loaded or its pending asset loads are being drained.
    #[doc(alias = "unload_bundle")]
    pub fn release(&mut self, bundle: &str, unload_all_loaded_objects: bool) -> bool {
        let bundle = self.config.bundle_name(bundle);
        if self.bundle_loads.is_loading(&bundle) {
            self.force_resolve_bundle(&bundle);
        }
        if !self.bundles.contains_key(&bundle) {
            log::debug!("Release of {} ignored, not loaded", bundle);
            return false;
        }

        if !self.clear_all_assets(&bundle) {
            log::warn!("Release of {} aborted", bundle);
            return false;
        }

        self.unload_record(&bundle, unload_all_loaded_objects);
        true
    }

    /// Remove a loaded bundle, then drop its reference on each dependency
    pub(super) fn unload_record(&mut self, bundle: &str, unload_all_loaded_objects: bool) {
        // an in-flight dependency would otherwise land with this bundle as a dead referrer
        self.finish_loading_dependencies(bundle);

        let Some(record) = self.bundles.remove(bundle) else {
            return;
        };

        if let Some(handle) = &record.handle {
            self.source.unload(handle, unload_all_loaded_objects);
        }
        self.assets.remove(bundle);
        log::info!("Unloaded bundle {}", bundle);

        for dependency in &record.dependencies {
            self.remove_reference(dependency, bundle, unload_all_loaded_objects);
        }
    }

    fn insert_loaded(
        &mut self,
        bundle: &str,
        handle: Option<BundleHandle>,
        dependencies: Vec<String>,
        mut referrers: HashSet<String>,
    ) {
        let explicit = referrers.remove(bundle);
        log::info!(
            "Loaded bundle {} ({} dependencies{})",
            bundle,
            dependencies.len(),
            if handle.is_none() { ", null" } else { "" }
        );
        self.bundles.insert(
            bundle.to_string(),
            LoadedBundle {
                handle,
                dependencies,
                referrers,
                explicit: false,
            },
        );
        if explicit {
            self.mark_explicit(bundle);
        }
    }

    fn add_reference(&mut self, bundle: &str, referrer: &str) {
        if referrer == bundle {
            self.mark_explicit(bundle);
            return;
        }
        if let Some(record) = self.bundles.get_mut(bundle) {
            if !record.explicit {
                record.referrers.insert(referrer.to_string());
            }
        }
    }

    /// Pin a bundle and make it refer to its own dependencies
    fn mark_explicit(&mut self, bundle: &str) {
        let Some(record) = self.bundles.get_mut(bundle) else {
            return;
        };
        if record.explicit {
            return;
        }
        record.explicit = true;
        record.referrers.clear();

        let dependencies = record.dependencies.clone();
        for dependency in &dependencies {
            if self.bundles.contains_key(dependency) {
                self.add_reference(dependency, bundle);
            } else if let Some(referrers) = self.bundle_loads.meta_mut(dependency) {
                referrers.insert(bundle.to_string());
            }
        }
    }

    fn remove_reference(&mut self, bundle: &str, referrer: &str, unload_all_loaded_objects: bool) {
        let Some(record) = self.bundles.get_mut(bundle) else {
            return;
        };
        if record.explicit {
            return;
        }
        record.referrers.remove(referrer);
        if record.referrers.is_empty() {
            self.unload_record(bundle, unload_all_loaded_objects);
        }
    }

    /// Handle of a loaded bundle
    pub fn bundle_handle(&self, bundle: &str) -> Option<BundleHandle> {
        self.bundles.get(bundle).and_then(|record| record.handle.clone())
    }

    pub(super) fn resolve_dependencies(&self, bundle: &str) -> Vec<String> {
        let file_name = self.config.bundle_file_name(bundle, true);
        self.graph.resolve_dependencies(&file_name)
    }

    fn load_bundle_file(&mut self, bundle: &str) -> Option<BundleHandle> {
        let path = self.config.bundle_path(bundle, true);
        self.stats.bundle_loads += 1;
        let handle = self.source.load_from_path(&path);
        if handle.is_none() {
            self.log_missing_bundle(bundle);
        }
        handle
    }

    fn log_missing_bundle(&self, bundle: &str) {
        log::error!(
            "{}",
            Error::MissingBundleFile {
                bundle: bundle.to_string(),
                path: self.config.bundle_path(bundle, true),
            }
        );
    }
}
