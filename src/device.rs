// Copyright (c) 2023 Alibaba Cloud
//
// SPDX-License-Identifier: Apache-2.0
//

//! Handles to devices resolved from the cache.

use std::collections::HashMap;
use std::sync::Arc;

use crate::parser;
use crate::spec::Spec;
use crate::specs;

/// A device of a cached spec.
///
/// A handle is a cheap clone of shared snapshot state. It stays valid
/// across refreshes of the cache it came from, but reflects the snapshot
/// it was resolved from; re-resolve to observe newer state.
#[derive(Debug, Clone)]
pub struct Device {
    spec: Arc<Spec>,
    index: usize,
}

impl Device {
    pub(crate) fn new(spec: Arc<Spec>, index: usize) -> Device {
        Device { spec, index }
    }

    /// The spec this device is defined in.
    pub fn spec(&self) -> &Spec {
        &self.spec
    }

    /// Identity of the owning spec within a snapshot, used to apply
    /// spec-level edits exactly once per spec.
    pub(crate) fn spec_id(&self) -> usize {
        Arc::as_ptr(&self.spec) as usize
    }

    fn raw(&self) -> &specs::Device {
        self.spec.device_at(self.index)
    }

    /// The name of the device, unique within its spec.
    pub fn name(&self) -> &str {
        &self.raw().name
    }

    /// The fully qualified `vendor/class=name` of this device.
    pub fn qualified_name(&self) -> String {
        parser::qualified_name(self.spec.vendor(), self.spec.class(), self.name())
    }

    /// The annotations attached to this device.
    pub fn annotations(&self) -> &HashMap<String, String> {
        &self.raw().annotations
    }

    /// The container edits selecting this device applies.
    pub fn edits(&self) -> &specs::ContainerEdits {
        &self.raw().container_edits
    }
}
