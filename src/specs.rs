// Copyright (c) 2023 Alibaba Cloud
//
// SPDX-License-Identifier: Apache-2.0
//

//! Wire format of spec files.
//!
//! These types mirror the persisted JSON/YAML layout of a spec document.
//! Optional fields are omitted when empty on serialization.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_false(b: &bool) -> bool {
    !b
}

/// Spec is the base configuration for CDI.
#[derive(Debug, Clone, Eq, PartialEq, Default, Serialize, Deserialize)]
pub struct Spec {
    #[serde(rename = "cdiVersion")]
    pub version: String,
    pub kind: String,
    /// Annotations add meta information per spec. These are CDI-specific
    /// and do not affect container metadata.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub annotations: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub devices: Vec<Device>,
    #[serde(
        default,
        rename = "containerEdits",
        skip_serializing_if = "ContainerEdits::is_empty"
    )]
    pub container_edits: ContainerEdits,
}

/// Device is a "Device" a container runtime can add to a container.
#[derive(Debug, Clone, Eq, PartialEq, Default, Serialize, Deserialize)]
pub struct Device {
    pub name: String,
    /// Annotations add meta information per device. These are CDI-specific
    /// and do not affect container metadata.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub annotations: HashMap<String, String>,
    #[serde(rename = "containerEdits")]
    pub container_edits: ContainerEdits,
}

/// ContainerEdits are edits a container runtime must make to the OCI spec
/// to expose the device.
#[derive(Debug, Clone, Eq, PartialEq, Default, Serialize, Deserialize)]
pub struct ContainerEdits {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<String>,
    #[serde(
        default,
        rename = "deviceNodes",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub device_nodes: Vec<DeviceNode>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hooks: Vec<Hook>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mounts: Vec<Mount>,
    #[serde(
        default,
        rename = "intelRdt",
        skip_serializing_if = "Option::is_none"
    )]
    pub intel_rdt: Option<IntelRdt>,
    #[serde(
        default,
        rename = "additionalGIDs",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub additional_gids: Vec<u32>,
}

impl ContainerEdits {
    /// True when no edit of any category is present.
    pub fn is_empty(&self) -> bool {
        self.env.is_empty()
            && self.device_nodes.is_empty()
            && self.hooks.is_empty()
            && self.mounts.is_empty()
            && self.intel_rdt.is_none()
            && self.additional_gids.is_empty()
    }
}

/// DeviceNode represents a device node that needs to be added to the OCI
/// spec.
#[derive(Debug, Clone, Eq, PartialEq, Default, Serialize, Deserialize)]
pub struct DeviceNode {
    pub path: String,
    #[serde(
        default,
        rename = "hostPath",
        skip_serializing_if = "String::is_empty"
    )]
    pub host_path: String,
    #[serde(default, rename = "type", skip_serializing_if = "String::is_empty")]
    pub r#type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub major: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minor: Option<i64>,
    #[serde(
        default,
        rename = "fileMode",
        skip_serializing_if = "Option::is_none"
    )]
    pub file_mode: Option<u32>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub permissions: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gid: Option<u32>,
}

/// Mount represents a mount that needs to be added to the OCI spec.
#[derive(Debug, Clone, Eq, PartialEq, Default, Serialize, Deserialize)]
pub struct Mount {
    #[serde(rename = "hostPath")]
    pub host_path: String,
    #[serde(rename = "containerPath")]
    pub container_path: String,
    #[serde(default, rename = "type", skip_serializing_if = "String::is_empty")]
    pub r#type: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
}

/// Hook represents a hook that needs to be added to the OCI spec.
#[derive(Debug, Clone, Eq, PartialEq, Default, Serialize, Deserialize)]
pub struct Hook {
    #[serde(rename = "hookName")]
    pub hook_name: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<i64>,
}

/// IntelRdt describes the Linux IntelRdt parameters to set in the OCI
/// spec.
#[derive(Debug, Clone, Eq, PartialEq, Default, Serialize, Deserialize)]
pub struct IntelRdt {
    #[serde(default, rename = "closID", skip_serializing_if = "String::is_empty")]
    pub clos_id: String,
    #[serde(
        default,
        rename = "l3CacheSchema",
        skip_serializing_if = "String::is_empty"
    )]
    pub l3_cache_schema: String,
    #[serde(
        default,
        rename = "memBwSchema",
        skip_serializing_if = "String::is_empty"
    )]
    pub mem_bw_schema: String,
    #[serde(default, rename = "enableCMT", skip_serializing_if = "is_false")]
    pub enable_cmt: bool,
    #[serde(default, rename = "enableMBM", skip_serializing_if = "is_false")]
    pub enable_mbm: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_camel_case_field_names() {
        let spec = Spec {
            version: "0.6.0".to_string(),
            kind: "vendor.com/class".to_string(),
            devices: vec![Device {
                name: "dev1".to_string(),
                container_edits: ContainerEdits {
                    device_nodes: vec![DeviceNode {
                        path: "/dev/dev1".to_string(),
                        host_path: "/host/dev/dev1".to_string(),
                        r#type: "b".to_string(),
                        major: Some(10),
                        minor: Some(1),
                        ..Default::default()
                    }],
                    ..Default::default()
                },
                ..Default::default()
            }],
            ..Default::default()
        };
        let data = serde_json::to_string(&spec).unwrap();
        assert!(data.contains("\"cdiVersion\""));
        assert!(data.contains("\"containerEdits\""));
        assert!(data.contains("\"deviceNodes\""));
        assert!(data.contains("\"hostPath\""));
        assert!(data.contains("\"type\""));
        // optional empty collections are omitted
        assert!(!data.contains("\"env\""));
        assert!(!data.contains("\"mounts\""));
        assert!(!data.contains("\"annotations\""));
    }

    #[test]
    fn test_empty_edits() {
        assert!(ContainerEdits::default().is_empty());
        let edits = ContainerEdits {
            additional_gids: vec![5],
            ..Default::default()
        };
        assert!(!edits.is_empty());
        let edits = ContainerEdits {
            intel_rdt: Some(IntelRdt::default()),
            ..Default::default()
        };
        assert!(!edits.is_empty());
    }
}
