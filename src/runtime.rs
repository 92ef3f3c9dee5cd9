// Copyright (c) 2023 Alibaba Cloud
//
// SPDX-License-Identifier: Apache-2.0
//

//! Abstract view of the container runtime configuration.
//!
//! Container edits only touch a small subset of the runtime's low-level
//! configuration: the process environment, the Linux device list and its
//! parallel device-cgroup allow list, mounts, lifecycle hooks, additional
//! group IDs, and the IntelRdt block. [`RuntimeConfig`] exposes exactly
//! that subset. Adapters for concrete runtime-spec libraries live outside
//! this crate; [`MemoryConfig`] is a plain in-memory implementation.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::specs;

/// A device node entry in the runtime's Linux device list.
#[derive(Debug, Clone, Eq, PartialEq, Default, Serialize, Deserialize)]
pub struct DeviceEntry {
    pub path: String,
    #[serde(default, rename = "type", skip_serializing_if = "String::is_empty")]
    pub r#type: String,
    pub major: i64,
    pub minor: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_mode: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gid: Option<u32>,
}

/// An allow rule in the runtime's device-cgroup list.
#[derive(Debug, Clone, Eq, PartialEq, Default, Serialize, Deserialize)]
pub struct DeviceRule {
    pub allow: bool,
    #[serde(default, rename = "type", skip_serializing_if = "String::is_empty")]
    pub r#type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub major: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minor: Option<i64>,
    pub access: String,
}

/// A mount entry in the runtime configuration.
#[derive(Debug, Clone, Eq, PartialEq, Default, Serialize, Deserialize)]
pub struct MountEntry {
    pub source: String,
    pub destination: String,
    #[serde(default, rename = "type", skip_serializing_if = "String::is_empty")]
    pub r#type: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
}

/// A hook entry in one of the runtime's lifecycle hook lists.
#[derive(Debug, Clone, Eq, PartialEq, Default, Serialize, Deserialize)]
pub struct HookEntry {
    pub path: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<i64>,
}

/// The lifecycle points a runtime invokes hooks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookKind {
    Prestart,
    CreateRuntime,
    CreateContainer,
    StartContainer,
    Poststart,
    Poststop,
}

impl HookKind {
    pub const ALL: [HookKind; 6] = [
        HookKind::Prestart,
        HookKind::CreateRuntime,
        HookKind::CreateContainer,
        HookKind::StartContainer,
        HookKind::Poststart,
        HookKind::Poststop,
    ];

    /// Maps a persisted hook name to its lifecycle point. Unknown names
    /// come back as `None` so callers can decide between rejecting and
    /// ignoring them.
    pub fn parse(name: &str) -> Option<HookKind> {
        match name {
            "prestart" => Some(HookKind::Prestart),
            "createRuntime" => Some(HookKind::CreateRuntime),
            "createContainer" => Some(HookKind::CreateContainer),
            "startContainer" => Some(HookKind::StartContainer),
            "poststart" => Some(HookKind::Poststart),
            "poststop" => Some(HookKind::Poststop),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HookKind::Prestart => "prestart",
            HookKind::CreateRuntime => "createRuntime",
            HookKind::CreateContainer => "createContainer",
            HookKind::StartContainer => "startContainer",
            HookKind::Poststart => "poststart",
            HookKind::Poststop => "poststop",
        }
    }
}

/// Writable subset of a container runtime configuration.
///
/// The composer drives all of its modifications through this trait, so
/// any runtime-spec representation with these lists can receive edits.
pub trait RuntimeConfig {
    /// The ordered process environment, `NAME=VALUE` entries.
    fn env_mut(&mut self) -> &mut Vec<String>;
    /// Appends a node to the runtime's Linux device list.
    fn add_device(&mut self, device: DeviceEntry);
    /// Appends an allow rule to the device-cgroup list.
    fn add_device_rule(&mut self, rule: DeviceRule);
    /// Appends a mount entry.
    fn add_mount(&mut self, mount: MountEntry);
    /// Appends a hook to the list for the given lifecycle point.
    fn add_hook(&mut self, kind: HookKind, hook: HookEntry);
    /// The supplementary group IDs of the container process.
    fn additional_gids_mut(&mut self) -> &mut Vec<u32>;
    /// Replaces the IntelRdt block.
    fn set_intel_rdt(&mut self, intel_rdt: specs::IntelRdt);
}

/// The per-lifecycle-point hook lists of a runtime configuration.
#[derive(Debug, Clone, Eq, PartialEq, Default, Serialize, Deserialize)]
pub struct HookLists {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub prestart: Vec<HookEntry>,
    #[serde(
        default,
        rename = "createRuntime",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub create_runtime: Vec<HookEntry>,
    #[serde(
        default,
        rename = "createContainer",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub create_container: Vec<HookEntry>,
    #[serde(
        default,
        rename = "startContainer",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub start_container: Vec<HookEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub poststart: Vec<HookEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub poststop: Vec<HookEntry>,
}

impl HookLists {
    pub fn list_mut(&mut self, kind: HookKind) -> &mut Vec<HookEntry> {
        match kind {
            HookKind::Prestart => &mut self.prestart,
            HookKind::CreateRuntime => &mut self.create_runtime,
            HookKind::CreateContainer => &mut self.create_container,
            HookKind::StartContainer => &mut self.start_container,
            HookKind::Poststart => &mut self.poststart,
            HookKind::Poststop => &mut self.poststop,
        }
    }
}

/// In-memory runtime configuration.
///
/// Mirrors the lists an OCI runtime-spec adapter would edit. Useful for
/// inspecting the effect of an injection without a concrete runtime-spec
/// dependency, and as the reference implementation for adapters.
#[derive(Debug, Clone, Eq, PartialEq, Default, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub devices: Vec<DeviceEntry>,
    #[serde(
        default,
        rename = "deviceRules",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub device_rules: Vec<DeviceRule>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mounts: Vec<MountEntry>,
    #[serde(default, skip_serializing_if = "is_empty_hooks")]
    pub hooks: HookLists,
    #[serde(
        default,
        rename = "additionalGIDs",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub additional_gids: Vec<u32>,
    #[serde(
        default,
        rename = "intelRdt",
        skip_serializing_if = "Option::is_none"
    )]
    pub intel_rdt: Option<specs::IntelRdt>,
    /// Freeform annotations, as carried by container metadata.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub annotations: HashMap<String, String>,
}

fn is_empty_hooks(hooks: &HookLists) -> bool {
    *hooks == HookLists::default()
}

impl RuntimeConfig for MemoryConfig {
    fn env_mut(&mut self) -> &mut Vec<String> {
        &mut self.env
    }

    fn add_device(&mut self, device: DeviceEntry) {
        self.devices.push(device);
    }

    fn add_device_rule(&mut self, rule: DeviceRule) {
        self.device_rules.push(rule);
    }

    fn add_mount(&mut self, mount: MountEntry) {
        self.mounts.push(mount);
    }

    fn add_hook(&mut self, kind: HookKind, hook: HookEntry) {
        self.hooks.list_mut(kind).push(hook);
    }

    fn additional_gids_mut(&mut self) -> &mut Vec<u32> {
        &mut self.additional_gids
    }

    fn set_intel_rdt(&mut self, intel_rdt: specs::IntelRdt) {
        self.intel_rdt = Some(intel_rdt);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hook_kind_roundtrip() {
        for kind in HookKind::ALL.iter() {
            assert_eq!(HookKind::parse(kind.as_str()), Some(*kind));
        }
        assert_eq!(HookKind::parse("precreate"), None);
        assert_eq!(HookKind::parse(""), None);
    }

    #[test]
    fn test_memory_config_lists() {
        let mut config = MemoryConfig::default();
        config.add_hook(
            HookKind::CreateRuntime,
            HookEntry {
                path: "/bin/hook".to_string(),
                ..Default::default()
            },
        );
        config.add_device(DeviceEntry {
            path: "/dev/dev1".to_string(),
            r#type: "b".to_string(),
            major: 10,
            minor: 1,
            ..Default::default()
        });
        assert_eq!(config.hooks.create_runtime.len(), 1);
        assert_eq!(config.devices.len(), 1);
        assert!(config.hooks.prestart.is_empty());
    }
}
