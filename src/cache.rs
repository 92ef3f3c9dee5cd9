// Copyright (c) 2023 Alibaba Cloud
//
// SPDX-License-Identifier: Apache-2.0
//

//! The spec cache: discovery, conflict resolution and injection.
//!
//! A [`Cache`] scans a priority-ordered list of directories for spec
//! files, indexes their devices by qualified name, and injects container
//! edits into runtime configurations on request. Refreshes swap complete
//! snapshots, so concurrent readers always observe a consistent state.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock, Weak};

use lazy_static::lazy_static;

use crate::container_edits;
use crate::device::Device;
use crate::error::{Error, Result};
use crate::parser;
use crate::producer::SpecProducer;
use crate::runtime::RuntimeConfig;
use crate::spec::Spec;
use crate::spec_dirs::{self, DEFAULT_SPEC_DIRS};
use crate::specs;
use crate::watch::Watch;

/// Per-path load errors recorded by the latest refresh.
pub type ErrorMap = HashMap<PathBuf, Vec<Arc<Error>>>;

#[derive(Default)]
struct CacheState {
    /// kind → specs declaring that kind, in load order
    specs: HashMap<String, Vec<Arc<Spec>>>,
    /// qualified device name → device, after conflict resolution
    devices: HashMap<String, Device>,
    errors: ErrorMap,
}

/// Configures and constructs a [`Cache`].
#[derive(Debug, Clone, Default)]
pub struct CacheBuilder {
    spec_dirs: Vec<PathBuf>,
    auto_refresh: bool,
}

impl CacheBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the priority-ordered search path. Later entries have higher
    /// precedence. When unset, [`DEFAULT_SPEC_DIRS`] is used.
    pub fn spec_dirs<I, P>(mut self, dirs: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.spec_dirs = dirs.into_iter().map(Into::into).collect();
        self
    }

    /// Enables filesystem watching: spec file changes trigger refreshes
    /// without explicit [`Cache::refresh`] calls.
    pub fn auto_refresh(mut self, enabled: bool) -> Self {
        self.auto_refresh = enabled;
        self
    }

    /// Builds the cache and performs an initial refresh.
    ///
    /// Per-file load failures never fail construction; they are recorded
    /// and available through [`Cache::errors`].
    pub fn build(self) -> Arc<Cache> {
        let spec_dirs = if self.spec_dirs.is_empty() {
            DEFAULT_SPEC_DIRS.iter().map(PathBuf::from).collect()
        } else {
            self.spec_dirs
        };

        let cache = Arc::new_cyclic(|weak: &Weak<Cache>| Cache {
            spec_dirs,
            auto_refresh: self.auto_refresh,
            state: RwLock::new(CacheState::default()),
            refresh_lock: Mutex::new(()),
            watch: Mutex::new(Watch::Off),
            self_ref: weak.clone(),
        });

        if cache.auto_refresh {
            let watch = Watch::start(Arc::downgrade(&cache), &cache.spec_dirs);
            *cache.watch.lock().unwrap() = watch;
        }
        if let Err(e) = cache.refresh() {
            warn!(sl!(), "initial refresh reported errors"; "error" => e.to_string());
        }

        cache
    }
}

/// Cache of specs loaded from the configured spec directories.
pub struct Cache {
    spec_dirs: Vec<PathBuf>,
    auto_refresh: bool,
    state: RwLock<CacheState>,
    refresh_lock: Mutex<()>,
    watch: Mutex<Watch>,
    self_ref: Weak<Cache>,
}

impl Cache {
    /// Builds a cache over the default spec directories.
    pub fn new_cache() -> Arc<Cache> {
        CacheBuilder::new().build()
    }

    /// Rescans the spec directories and replaces the cache content with
    /// the result.
    ///
    /// Per-file failures are collected into the returned error and the
    /// per-path error map, but the successfully loaded subset is always
    /// published. Concurrent readers observe either the previous or the
    /// new snapshot, never a mix.
    pub fn refresh(&self) -> Result<()> {
        // serialize refreshes; readers keep using the current snapshot
        let _guard = self.refresh_lock.lock().unwrap();

        if self.auto_refresh {
            let mut watch = self.watch.lock().unwrap();
            if watch.is_degraded() {
                *watch = Watch::start(self.self_ref.clone(), &self.spec_dirs);
            }
            watch.update(&self.spec_dirs);
        }

        fn collect_error(
            result: &mut Vec<Arc<Error>>,
            errors: &mut ErrorMap,
            error: Error,
            paths: &[&Path],
        ) {
            let error = Arc::new(error);
            result.push(error.clone());
            for path in paths {
                errors
                    .entry(path.to_path_buf())
                    .or_default()
                    .push(error.clone());
            }
        }

        let mut specs: HashMap<String, Vec<Arc<Spec>>> = HashMap::new();
        let mut devices: HashMap<String, Device> = HashMap::new();
        let mut conflicts: HashSet<String> = HashSet::new();
        let mut errors: ErrorMap = HashMap::new();
        let mut result: Vec<Arc<Error>> = Vec::new();

        spec_dirs::scan_spec_dirs(&self.spec_dirs, &mut |path, loaded| {
            let spec = match loaded {
                Ok(spec) => Arc::new(spec),
                Err(e) => {
                    collect_error(&mut result, &mut errors, e, &[path]);
                    return;
                }
            };

            specs
                .entry(spec.kind().to_string())
                .or_default()
                .push(spec.clone());

            for (index, raw_device) in spec.raw().devices.iter().enumerate() {
                let qualified =
                    parser::qualified_name(spec.vendor(), spec.class(), &raw_device.name);
                let device = Device::new(spec.clone(), index);

                if let Some(other) = devices.get(&qualified) {
                    let (new_prio, old_prio) =
                        (device.spec().priority(), other.spec().priority());
                    if new_prio < old_prio {
                        continue;
                    }
                    if new_prio == old_prio {
                        let (new_path, old_path) =
                            (device.spec().path(), other.spec().path());
                        collect_error(
                            &mut result,
                            &mut errors,
                            Error::Conflict {
                                name: qualified.clone(),
                                path: new_path.to_path_buf(),
                                other_path: old_path.to_path_buf(),
                            },
                            &[new_path, old_path],
                        );
                        conflicts.insert(qualified);
                        continue;
                    }
                }
                devices.insert(qualified, device);
            }
        });

        for name in &conflicts {
            devices.remove(name);
        }

        {
            let mut state = self.state.write().unwrap();
            state.specs = specs;
            state.devices = devices;
            state.errors = errors;
        }

        if result.is_empty() {
            Ok(())
        } else {
            Err(Error::Multi(result))
        }
    }

    /// Resolves a fully qualified device name against the current
    /// snapshot.
    pub fn device(&self, name: &str) -> Option<Device> {
        self.state.read().unwrap().devices.get(name).cloned()
    }

    /// The qualified names of all cached devices, sorted.
    pub fn list_devices(&self) -> Vec<String> {
        let state = self.state.read().unwrap();
        let mut devices: Vec<String> = state.devices.keys().cloned().collect();
        devices.sort();
        devices
    }

    /// The vendors of all cached specs, sorted and unique.
    pub fn list_vendors(&self) -> Vec<String> {
        let state = self.state.read().unwrap();
        let mut vendors: Vec<String> = state
            .specs
            .keys()
            .map(|kind| parser::parse_qualifier(kind).0)
            .collect();
        vendors.sort();
        vendors.dedup();
        vendors
    }

    /// The device classes of all cached specs, sorted and unique.
    pub fn list_classes(&self) -> Vec<String> {
        let state = self.state.read().unwrap();
        let mut classes: Vec<String> = state
            .specs
            .keys()
            .map(|kind| parser::parse_qualifier(kind).1)
            .collect();
        classes.sort();
        classes.dedup();
        classes
    }

    /// The cached specs of the given vendor.
    pub fn vendor_specs(&self, vendor: &str) -> Vec<Arc<Spec>> {
        let state = self.state.read().unwrap();
        let mut specs = Vec::new();
        for (kind, kind_specs) in &state.specs {
            if parser::parse_qualifier(kind).0 == vendor {
                specs.extend(kind_specs.iter().cloned());
            }
        }
        specs
    }

    /// Per-path errors recorded by the latest refresh.
    pub fn errors(&self) -> ErrorMap {
        self.state.read().unwrap().errors.clone()
    }

    /// The configured spec directories; a directory's priority is its
    /// index.
    pub fn spec_dirs(&self) -> &[PathBuf] {
        &self.spec_dirs
    }

    /// Resolves the named devices and applies their container edits to
    /// the configuration.
    ///
    /// Spec-level edits of a spec are applied once, the first time any of
    /// its devices is selected; device-level edits follow in request
    /// order. Injection is transactional: when any name fails to
    /// resolve, [`Error::NotFound`] carries the unresolved names and the
    /// configuration is left untouched.
    pub fn inject_devices(
        &self,
        config: &mut dyn RuntimeConfig,
        devices: &[String],
    ) -> Result<()> {
        let mut unresolved = Vec::new();
        let mut edits = specs::ContainerEdits::default();
        let mut seen_specs = HashSet::new();

        {
            let state = self.state.read().unwrap();
            for name in devices {
                let device = match state.devices.get(name) {
                    Some(device) => device,
                    None => {
                        unresolved.push(name.clone());
                        continue;
                    }
                };
                if seen_specs.insert(device.spec_id()) {
                    container_edits::append(&mut edits, device.spec().edits());
                }
                container_edits::append(&mut edits, device.edits());
            }
        }

        if !unresolved.is_empty() {
            return Err(Error::NotFound { unresolved });
        }

        container_edits::apply(&edits, config)
    }

    /// Parses device injection requests from the annotations and injects
    /// the requested devices.
    pub fn inject_from_annotations(
        &self,
        config: &mut dyn RuntimeConfig,
        annotations: &HashMap<String, String>,
    ) -> Result<()> {
        let (_keys, devices) = crate::annotations::parse_annotations(annotations)?;
        self.inject_devices(config, &devices)
    }

    /// Validates and writes a spec into the highest-priority spec
    /// directory under the given file name. An empty declared version is
    /// replaced with the minimum revision the content requires.
    ///
    /// The next refresh picks the file up; with auto-refresh enabled
    /// that happens automatically.
    pub fn write_spec(&self, raw: &specs::Spec, name: &str) -> Result<()> {
        let dir = self.highest_priority_dir()?;
        SpecProducer::new()
            .detect_minimum_version(raw.version.is_empty())
            .save_to(raw, dir.join(name))
            .map(|_| ())
    }

    /// Removes the named spec file from the highest-priority spec
    /// directory. Removing an absent file is not an error.
    pub fn remove_spec(&self, name: &str) -> Result<()> {
        let dir = self.highest_priority_dir()?;
        let mut path = dir.join(name);
        if crate::spec::format_for_path(&path).is_none() {
            let mut os_name = path.into_os_string();
            os_name.push(crate::spec::DEFAULT_SPEC_EXT);
            path = PathBuf::from(os_name);
        }
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::io(format!("failed to remove Spec {:?}", path), e)),
        }
    }

    fn highest_priority_dir(&self) -> Result<&PathBuf> {
        self.spec_dirs.last().ok_or_else(|| Error::Io {
            context: "no spec directories configured".to_string(),
            error: "empty search path".to_string(),
        })
    }
}

lazy_static! {
    static ref DEFAULT_CACHE: Mutex<Option<Arc<Cache>>> = Mutex::new(None);
}

/// Returns the process-wide default cache, creating it over the default
/// spec directories with auto-refresh enabled on first use.
///
/// The instance lives until process exit. Callers needing different
/// directories or refresh behavior should construct their own cache with
/// [`CacheBuilder`] and pass it around explicitly.
pub fn default_cache() -> Arc<Cache> {
    let mut guard = DEFAULT_CACHE.lock().unwrap();
    if let Some(cache) = guard.as_ref() {
        return cache.clone();
    }
    let cache = CacheBuilder::new().auto_refresh(true).build();
    *guard = Some(cache.clone());
    cache
}
