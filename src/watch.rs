// Copyright (c) 2023 Alibaba Cloud
//
// SPDX-License-Identifier: Apache-2.0
//

//! Filesystem watching for cache auto-refresh.
//!
//! The watcher state is an explicit variant: either events drive
//! refreshes, or watching failed (for instance on `EMFILE`) and the
//! cache keeps serving its last snapshot. A degraded watcher is re-armed
//! on the next explicit refresh.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::Weak;
use std::thread;
use std::time::Duration;

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use crate::cache::Cache;
use crate::spec_dirs::is_spec_file;

/// Window within which rapid successive filesystem events are folded
/// into a single refresh.
const COALESCE_WINDOW: Duration = Duration::from_millis(10);

pub(crate) enum Watch {
    /// Auto-refresh is disabled.
    Off,
    /// Filesystem events trigger refreshes.
    Active {
        watcher: RecommendedWatcher,
        watched: HashSet<PathBuf>,
    },
    /// The watcher could not be created; the cache serves its last
    /// snapshot until a refresh manages to re-arm it.
    Degraded,
}

impl Watch {
    /// Creates a watcher over the given spec directories, backed by a
    /// thread that refreshes the cache on relevant events. Returns
    /// [`Watch::Degraded`] when the platform watcher cannot be created.
    pub(crate) fn start(cache: Weak<Cache>, dirs: &[PathBuf]) -> Watch {
        let (tx, rx) = std::sync::mpsc::channel();
        let watcher = RecommendedWatcher::new(
            move |event: notify::Result<Event>| {
                let _ = tx.send(event);
            },
            Config::default(),
        );
        let watcher = match watcher {
            Ok(watcher) => watcher,
            Err(e) => {
                warn!(sl!(), "failed to create filesystem watcher, auto-refresh degraded";
                    "error" => e.to_string());
                return Watch::Degraded;
            }
        };

        if let Err(e) = thread::Builder::new()
            .name("cdi-watch".to_string())
            .spawn(move || Self::run(cache, rx))
        {
            warn!(sl!(), "failed to spawn watcher thread, auto-refresh degraded";
                "error" => e.to_string());
            return Watch::Degraded;
        }

        let mut watch = Watch::Active {
            watcher,
            watched: HashSet::new(),
        };
        watch.update(dirs);
        watch
    }

    /// Subscribes to any configured directories not watched yet. Spec
    /// directories may be created after the cache; calling this from
    /// every refresh picks them up.
    pub(crate) fn update(&mut self, dirs: &[PathBuf]) {
        let (watcher, watched) = match self {
            Watch::Active { watcher, watched } => (watcher, watched),
            _ => return,
        };
        for dir in dirs {
            if watched.contains(dir) || !dir.is_dir() {
                continue;
            }
            match watcher.watch(dir, RecursiveMode::NonRecursive) {
                Ok(()) => {
                    debug!(sl!(), "watching spec dir"; "dir" => dir.display().to_string());
                    watched.insert(dir.clone());
                }
                Err(e) => {
                    warn!(sl!(), "failed to watch spec dir";
                        "dir" => dir.display().to_string(), "error" => e.to_string());
                }
            }
        }
    }

    pub(crate) fn is_degraded(&self) -> bool {
        matches!(self, Watch::Degraded)
    }

    fn run(cache: Weak<Cache>, rx: Receiver<notify::Result<Event>>) {
        loop {
            let event = match rx.recv() {
                Ok(event) => event,
                // watcher gone, cache is shutting down
                Err(_) => return,
            };
            if !Self::is_relevant(&event) {
                continue;
            }
            // fold bursts of events into one refresh
            loop {
                match rx.recv_timeout(COALESCE_WINDOW) {
                    Ok(_) => continue,
                    Err(RecvTimeoutError::Timeout) => break,
                    Err(RecvTimeoutError::Disconnected) => return,
                }
            }
            let cache = match cache.upgrade() {
                Some(cache) => cache,
                None => return,
            };
            if let Err(e) = cache.refresh() {
                debug!(sl!(), "auto-refresh reported errors"; "error" => e.to_string());
            }
        }
    }

    fn is_relevant(event: &notify::Result<Event>) -> bool {
        let event = match event {
            Ok(event) => event,
            Err(_) => return false,
        };
        match event.kind {
            EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_) => {}
            _ => return false,
        }
        event.paths.iter().any(|p| is_spec_file(Path::new(p)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relevant_events() {
        use notify::event::{CreateKind, ModifyKind, RemoveKind};

        let create = Event::new(EventKind::Create(CreateKind::File))
            .add_path(PathBuf::from("/etc/cdi/vendor.yaml"));
        assert!(Watch::is_relevant(&Ok(create)));

        let temp = Event::new(EventKind::Modify(ModifyKind::Any))
            .add_path(PathBuf::from("/etc/cdi/.vendor.yaml"));
        assert!(!Watch::is_relevant(&Ok(temp)));

        let other = Event::new(EventKind::Remove(RemoveKind::File))
            .add_path(PathBuf::from("/etc/cdi/README.md"));
        assert!(!Watch::is_relevant(&Ok(other)));
    }

    #[test]
    fn test_degraded_is_inert() {
        crate::test_utils::setup_logging();
        let mut watch = Watch::Degraded;
        watch.update(&[PathBuf::from("/etc/cdi")]);
        assert!(watch.is_degraded());
    }
}
