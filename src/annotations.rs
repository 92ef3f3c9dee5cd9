// Copyright (c) 2023 Alibaba Cloud
//
// SPDX-License-Identifier: Apache-2.0
//

//! The annotation convention orchestrators use to request devices.
//!
//! A request is stored under a key `cdi.k8s.io/<plugin>_<deviceID>`,
//! where `<plugin>` identifies the requesting device plugin (by
//! convention `vendor.class`) and `<deviceID>` makes the key unique
//! among allocations by the same plugin. The value is a comma-separated
//! list of fully qualified device names.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::parser;

/// Prefix of container annotation keys carrying device requests.
pub const ANNOTATION_PREFIX: &str = "cdi.k8s.io/";

// The name part of an annotation key is bounded like a Kubernetes label.
const MAX_NAME_LEN: usize = 63;

/// Returns a unique annotation key for a device allocation by a plugin.
///
/// `device_id` is normalized by replacing `/` with `_` so IDs carrying
/// paths produce well-formed keys.
pub fn annotation_key(plugin_name: &str, device_id: &str) -> Result<String> {
    if plugin_name.is_empty() {
        return Err(Error::Annotation(
            "invalid plugin name, empty".to_string(),
        ));
    }
    if device_id.is_empty() {
        return Err(Error::Annotation("invalid deviceID, empty".to_string()));
    }

    let name = format!("{}_{}", plugin_name, device_id.replace('/', "_"));
    if name.len() > MAX_NAME_LEN {
        return Err(Error::Annotation(format!(
            "invalid plugin+deviceID {:?}, too long",
            name
        )));
    }

    let first = name.chars().next().unwrap();
    if !first.is_ascii_alphanumeric() {
        return Err(Error::Annotation(format!(
            "invalid name {:?}, first character '{}' should be alphanumeric",
            name, first
        )));
    }
    let last = name.chars().last().unwrap();
    if !last.is_ascii_alphanumeric() {
        return Err(Error::Annotation(format!(
            "invalid name {:?}, last character '{}' should be alphanumeric",
            name, last
        )));
    }
    for c in name.chars() {
        if !c.is_ascii_alphanumeric() && c != '_' && c != '-' && c != '.' {
            return Err(Error::Annotation(format!(
                "invalid character '{}' in name {:?}",
                c, name
            )));
        }
    }

    Ok(format!("{}{}", ANNOTATION_PREFIX, name))
}

/// Returns an annotation value for the given devices. Every entry must
/// be a fully qualified device name and the list must not be empty.
pub fn annotation_value(devices: &[String]) -> Result<String> {
    if devices.is_empty() {
        return Err(Error::Annotation(
            "invalid annotation value, empty device list".to_string(),
        ));
    }
    for device in devices {
        parser::parse_qualified_name(device)
            .map_err(|e| Error::Annotation(e.to_string()))?;
    }
    Ok(devices.join(","))
}

/// Adds a plugin-specific device injection request to the annotations.
///
/// On any error the annotations are left intact. Overwriting an existing
/// request key is rejected as a conflicting request.
pub fn update_annotations(
    annotations: &mut HashMap<String, String>,
    plugin_name: &str,
    device_id: &str,
    devices: &[String],
) -> Result<()> {
    let key = annotation_key(plugin_name, device_id)
        .map_err(|e| Error::Annotation(format!("CDI annotation failed: {}", e)))?;
    if annotations.contains_key(&key) {
        return Err(Error::Annotation(format!(
            "CDI annotation failed, key {:?} used",
            key
        )));
    }
    let value = annotation_value(devices)
        .map_err(|e| Error::Annotation(format!("CDI annotation failed: {}", e)))?;
    annotations.insert(key, value);
    Ok(())
}

/// Extracts device injection requests from the annotations.
///
/// Returns the request keys found and the devices they name. Every
/// device must be fully qualified; any that is not fails the whole
/// parse.
pub fn parse_annotations(
    annotations: &HashMap<String, String>,
) -> Result<(Vec<String>, Vec<String>)> {
    let mut keys = Vec::new();
    let mut devices = Vec::new();

    for (key, value) in annotations {
        if !key.starts_with(ANNOTATION_PREFIX) {
            continue;
        }
        for device in value.split(',') {
            if !parser::is_qualified_name(device) {
                return Err(Error::Annotation(format!(
                    "invalid CDI device name {:?}",
                    device
                )));
            }
            devices.push(device.to_string());
        }
        keys.push(key.clone());
    }

    Ok((keys, devices))
}
