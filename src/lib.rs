// Copyright (c) 2023 Alibaba Cloud
//
// SPDX-License-Identifier: Apache-2.0
//

//! Container Device Interface support for container runtimes.
//!
//! Vendors publish spec files describing, per named device, the edits a
//! runtime must apply to a container configuration so the container can
//! use the device. This crate discovers, validates and caches those
//! specs, resolves fully qualified device names like
//! `vendor.com/gpu=gpu0`, and applies the matching container edits.
//!
//! ```no_run
//! use cdi::cache::CacheBuilder;
//! use cdi::runtime::MemoryConfig;
//!
//! let cache = CacheBuilder::new().auto_refresh(true).build();
//! let mut config = MemoryConfig::default();
//! cache.inject_devices(&mut config, &["vendor.com/gpu=gpu0".to_string()])?;
//! # Ok::<(), cdi::Error>(())
//! ```

#[macro_use]
extern crate slog;

// Convenience macro to obtain the scoped logger
#[macro_export]
macro_rules! sl {
    () => {
        slog_scope::logger()
    };
}

pub mod annotations;
pub mod cache;
pub mod container_edits;
pub mod device;
pub mod error;
pub mod parser;
pub mod producer;
pub mod runtime;
pub mod spec;
mod spec_dirs;
pub mod specs;
pub mod validate;
pub mod version;
mod watch;

#[cfg(test)]
mod test_utils;

pub use annotations::{
    annotation_key, annotation_value, parse_annotations, update_annotations, ANNOTATION_PREFIX,
};
pub use cache::{default_cache, Cache, CacheBuilder};
pub use device::Device;
pub use error::{Error, Result};
pub use parser::{is_qualified_name, parse_qualified_name, qualified_name};
pub use spec_dirs::{DEFAULT_DYNAMIC_DIR, DEFAULT_SPEC_DIRS, DEFAULT_STATIC_DIR};
pub use version::{Version, CURRENT_VERSION, EARLIEST_VERSION};
