// Copyright (c) 2023 Alibaba Cloud
//
// SPDX-License-Identifier: Apache-2.0
//

//! Validation and application of container edits.
//!
//! Edits are applied to a [`RuntimeConfig`] in a fixed order: environment,
//! device nodes with their derived device-cgroup rules, mounts, hooks,
//! additional GIDs, IntelRdt. Application is all-or-nothing: device nodes
//! are completed from the host before the configuration is touched, so a
//! failed completion leaves the configuration unchanged.

use std::path::Path;

use nix::sys::stat::{self, SFlag};

use crate::error::{Error, Result};
use crate::runtime::{
    DeviceEntry, DeviceRule, HookEntry, HookKind, MountEntry, RuntimeConfig,
};
use crate::specs::{ContainerEdits, DeviceNode, Hook, IntelRdt, Mount};

/// Access granted by a derived device-cgroup rule when the node carries
/// no explicit permissions.
const DEFAULT_DEVICE_ACCESS: &str = "rwm";

/// Applies the edits to a runtime configuration, in order.
pub fn apply(edits: &ContainerEdits, config: &mut dyn RuntimeConfig) -> Result<()> {
    // Complete device nodes from the host up front; a stat failure must
    // leave the configuration untouched.
    let mut completed = Vec::with_capacity(edits.device_nodes.len());
    for node in &edits.device_nodes {
        completed.push((node, complete_device_node(node)?));
    }

    for entry in &edits.env {
        insert_env(config.env_mut(), entry);
    }

    for (node, device) in completed {
        let access = if node.permissions.is_empty() {
            DEFAULT_DEVICE_ACCESS.to_string()
        } else {
            node.permissions.clone()
        };
        let rule = DeviceRule {
            allow: true,
            r#type: device.r#type.clone(),
            major: Some(device.major),
            minor: Some(device.minor),
            access,
        };
        config.add_device(device);
        config.add_device_rule(rule);
    }

    for mount in &edits.mounts {
        config.add_mount(MountEntry {
            source: mount.host_path.clone(),
            destination: mount.container_path.clone(),
            r#type: mount.r#type.clone(),
            options: mount.options.clone(),
        });
    }

    for hook in &edits.hooks {
        match HookKind::parse(&hook.hook_name) {
            Some(kind) => config.add_hook(
                kind,
                HookEntry {
                    path: hook.path.clone(),
                    args: hook.args.clone(),
                    env: hook.env.clone(),
                    timeout: hook.timeout,
                },
            ),
            // Unknown hook names are ignored for forward compatibility.
            None => {}
        }
    }

    if !edits.additional_gids.is_empty() {
        let gids = config.additional_gids_mut();
        for gid in &edits.additional_gids {
            if *gid == 0 {
                continue;
            }
            if !gids.contains(gid) {
                gids.push(*gid);
            }
        }
    }

    if let Some(intel_rdt) = &edits.intel_rdt {
        config.set_intel_rdt(intel_rdt.clone());
    }

    Ok(())
}

/// Merges edits from `other` into `base`, preserving list order.
///
/// Additional GIDs are concatenated verbatim; de-duplication is an
/// apply-time concern.
pub fn append(base: &mut ContainerEdits, other: &ContainerEdits) {
    base.env.extend_from_slice(&other.env);
    base.device_nodes.extend_from_slice(&other.device_nodes);
    base.hooks.extend_from_slice(&other.hooks);
    base.mounts.extend_from_slice(&other.mounts);
    base.additional_gids.extend_from_slice(&other.additional_gids);
    if other.intel_rdt.is_some() {
        base.intel_rdt = other.intel_rdt.clone();
    }
}

/// Checks that every edit in the collection is well formed.
pub fn validate(edits: &ContainerEdits) -> Result<()> {
    validate_env(&edits.env)
        .map_err(|e| Error::Validation(format!("invalid container edits: {}", e)))?;
    for node in &edits.device_nodes {
        validate_device_node(node)?;
    }
    for hook in &edits.hooks {
        validate_hook(hook)?;
    }
    for mount in &edits.mounts {
        validate_mount(mount)?;
    }
    if let Some(intel_rdt) = &edits.intel_rdt {
        validate_intel_rdt(intel_rdt)?;
    }
    Ok(())
}

fn validate_env(env: &[String]) -> std::result::Result<(), String> {
    for entry in env {
        match entry.find('=') {
            Some(idx) if idx > 0 => {}
            _ => return Err(format!("invalid environment variable {:?}", entry)),
        }
    }
    Ok(())
}

fn validate_device_node(node: &DeviceNode) -> Result<()> {
    if node.path.is_empty() {
        return Err(Error::Validation(
            "invalid (empty) device path".to_string(),
        ));
    }
    if !matches!(node.r#type.as_str(), "" | "b" | "c" | "u" | "p") {
        return Err(Error::Validation(format!(
            "device {:?}: invalid type {:?}",
            node.path, node.r#type
        )));
    }
    for bit in node.permissions.chars() {
        if bit != 'r' && bit != 'w' && bit != 'm' {
            return Err(Error::Validation(format!(
                "device {:?}: invalid permissions {:?}",
                node.path, node.permissions
            )));
        }
    }
    Ok(())
}

fn validate_hook(hook: &Hook) -> Result<()> {
    if HookKind::parse(&hook.hook_name).is_none() {
        return Err(Error::Validation(format!(
            "invalid hook name {:?}",
            hook.hook_name
        )));
    }
    if hook.path.is_empty() {
        return Err(Error::Validation(format!(
            "invalid hook {:?} with empty path",
            hook.hook_name
        )));
    }
    validate_env(&hook.env)
        .map_err(|e| Error::Validation(format!("invalid hook {:?}: {}", hook.hook_name, e)))
}

fn validate_mount(mount: &Mount) -> Result<()> {
    if mount.host_path.is_empty() {
        return Err(Error::Validation(
            "invalid mount, empty host path".to_string(),
        ));
    }
    if mount.container_path.is_empty() {
        return Err(Error::Validation(
            "invalid mount, empty container path".to_string(),
        ));
    }
    Ok(())
}

fn validate_intel_rdt(intel_rdt: &IntelRdt) -> Result<()> {
    // closID must be usable as a directory name under the resctrl
    // filesystem.
    let clos_id = &intel_rdt.clos_id;
    if clos_id.len() >= 4096
        || clos_id == "."
        || clos_id == ".."
        || clos_id.contains('/')
        || clos_id.contains('\n')
    {
        return Err(Error::Validation("invalid closID".to_string()));
    }
    Ok(())
}

/// Appends `entry` to the environment, replacing an existing binding of
/// the same name if one is present.
fn insert_env(env: &mut Vec<String>, entry: &str) {
    let name = entry.split('=').next().unwrap_or(entry);
    for existing in env.iter_mut() {
        if existing.split('=').next() == Some(name) {
            *existing = entry.to_string();
            return;
        }
    }
    env.push(entry.to_string());
}

/// Builds the runtime device entry for a node, filling in type, major,
/// minor and file mode from the host inode when the node leaves them
/// unspecified.
///
/// A completion failure is surfaced only when the node names an explicit
/// host path; otherwise the missing pieces are left for the runtime to
/// resolve.
fn complete_device_node(node: &DeviceNode) -> Result<DeviceEntry> {
    let mut device = DeviceEntry {
        path: node.path.clone(),
        r#type: node.r#type.clone(),
        major: node.major.unwrap_or(0),
        minor: node.minor.unwrap_or(0),
        file_mode: node.file_mode,
        uid: node.uid,
        gid: node.gid,
    };

    if !device.r#type.is_empty() && (device.major != 0 || device.r#type == "p") {
        return Ok(device);
    }

    let host_path = if node.host_path.is_empty() {
        node.path.as_str()
    } else {
        node.host_path.as_str()
    };

    let info = match host_device_info(host_path) {
        Ok(info) => info,
        Err(e) => {
            if node.host_path.is_empty() {
                // No explicit host path; let the runtime fill in the rest.
                return Ok(device);
            }
            return Err(Error::Apply(format!(
                "failed to stat CDI host device {:?}: {}",
                host_path, e
            )));
        }
    };

    if device.r#type.is_empty() {
        device.r#type = info.r#type;
    } else if device.r#type != info.r#type {
        return Err(Error::Apply(format!(
            "CDI device ({:?}, {:?}), host type mismatch ({}, {})",
            node.path, host_path, device.r#type, info.r#type
        )));
    }
    if device.major == 0 && device.r#type != "p" {
        device.major = info.major;
        device.minor = info.minor;
    }
    if device.file_mode.is_none() {
        device.file_mode = Some(info.file_mode);
    }

    Ok(device)
}

struct HostDeviceInfo {
    r#type: String,
    major: i64,
    minor: i64,
    file_mode: u32,
}

fn host_device_info(path: &str) -> std::result::Result<HostDeviceInfo, String> {
    let st = stat::stat(Path::new(path)).map_err(|e| e.to_string())?;
    let fmt = SFlag::from_bits_truncate(st.st_mode & SFlag::S_IFMT.bits());
    let r#type = if fmt == SFlag::S_IFBLK {
        "b"
    } else if fmt == SFlag::S_IFCHR {
        "c"
    } else if fmt == SFlag::S_IFIFO {
        "p"
    } else {
        return Err(format!("{:?} is not a device node", path));
    };
    Ok(HostDeviceInfo {
        r#type: r#type.to_string(),
        major: stat::major(st.st_rdev) as i64,
        minor: stat::minor(st.st_rdev) as i64,
        file_mode: st.st_mode & 0o7777,
    })
}
