// Copyright (c) 2023 Alibaba Cloud
//
// SPDX-License-Identifier: Apache-2.0
//

//! Structural and semantic validation of specs.
//!
//! [`DefaultValidator`] implements the checks every spec must pass before
//! it enters the cache or reaches disk. Alternative validators, such as a
//! JSON-schema based one, can be plugged in wherever a [`SpecValidator`]
//! is accepted.

use std::collections::{HashMap, HashSet};

use crate::container_edits;
use crate::error::{Error, Result};
use crate::parser;
use crate::specs;
use crate::version;

/// Total size of annotations, keys and values included, allowed on a
/// single spec or device.
const TOTAL_ANNOTATION_SIZE_LIMIT: usize = 256 * 1024;

/// Longest allowed name part of an annotation key.
const MAX_KEY_NAME_LEN: usize = 63;

/// Longest allowed prefix part of an annotation key.
const MAX_KEY_PREFIX_LEN: usize = 253;

/// Validation strategy for specs.
pub trait SpecValidator: Send + Sync {
    /// Checks a raw spec document.
    fn validate_spec(&self, spec: &specs::Spec) -> Result<()>;

    /// Checks a single device. `kind` is optional context used to
    /// qualify annotation errors.
    fn validate_device(&self, device: &specs::Device, kind: &str) -> Result<()>;
}

/// The built-in semantic validator.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultValidator;

impl SpecValidator for DefaultValidator {
    fn validate_spec(&self, spec: &specs::Spec) -> Result<()> {
        version::validate_version(spec)?;
        parser::validate_kind(&spec.kind)?;
        validate_spec_annotations(&spec.kind, &spec.annotations)?;
        container_edits::validate(&spec.container_edits)?;

        let mut seen = HashSet::new();
        for device in &spec.devices {
            if !seen.insert(device.name.as_str()) {
                return Err(Error::Validation(format!(
                    "invalid spec, multiple device {:?}",
                    device.name
                )));
            }
            self.validate_device(device, &spec.kind).map_err(|e| {
                Error::Validation(format!("invalid device {:?}: {}", device.name, e))
            })?;
        }
        if seen.is_empty() {
            return Err(Error::Validation("invalid spec, no devices".to_string()));
        }

        Ok(())
    }

    fn validate_device(&self, device: &specs::Device, kind: &str) -> Result<()> {
        parser::validate_device_name(&device.name)?;

        let name = if kind.is_empty() {
            device.name.clone()
        } else {
            format!("{}={}", kind, device.name)
        };
        validate_spec_annotations(&name, &device.annotations)?;

        if device.container_edits.is_empty() {
            return Err(Error::Validation(
                "invalid device, empty device edits".to_string(),
            ));
        }
        container_edits::validate(&device.container_edits)
    }
}

/// Checks the annotations attached to a spec or device: keys must be
/// well-formed qualified names and the total size is bounded.
pub fn validate_spec_annotations(
    name: &str,
    annotations: &HashMap<String, String>,
) -> Result<()> {
    let path = if name.is_empty() {
        "annotations".to_string()
    } else {
        format!("{}.annotations", name)
    };

    let mut total = 0;
    for (key, value) in annotations {
        validate_annotation_key(key)
            .map_err(|e| Error::Validation(format!("{}: {}", path, e)))?;
        total += key.len() + value.len();
    }
    if total > TOTAL_ANNOTATION_SIZE_LIMIT {
        return Err(Error::Validation(format!(
            "{}: annotations size {} exceeds the limit of {}",
            path, total, TOTAL_ANNOTATION_SIZE_LIMIT
        )));
    }
    Ok(())
}

fn validate_annotation_key(key: &str) -> std::result::Result<(), String> {
    let lowered = key.to_ascii_lowercase();
    let mut parts = lowered.splitn(3, '/');
    let (prefix, name) = match (parts.next(), parts.next(), parts.next()) {
        (Some(name), None, None) => ("", name),
        (Some(prefix), Some(name), None) => (prefix, name),
        _ => {
            return Err(format!(
                "annotation key {:?} has more than one '/'",
                key
            ))
        }
    };

    if !prefix.is_empty() {
        if prefix.len() > MAX_KEY_PREFIX_LEN {
            return Err(format!(
                "annotation key prefix {:?} longer than {} characters",
                prefix, MAX_KEY_PREFIX_LEN
            ));
        }
        if !is_dns_subdomain(prefix) {
            return Err(format!(
                "annotation key {:?} has an invalid prefix",
                key
            ));
        }
    }

    if name.is_empty() {
        return Err(format!("annotation key {:?} has an empty name", key));
    }
    if name.len() > MAX_KEY_NAME_LEN {
        return Err(format!(
            "annotation key name {:?} longer than {} characters",
            name, MAX_KEY_NAME_LEN
        ));
    }
    let first = name.chars().next().unwrap();
    let last = name.chars().last().unwrap();
    if !first.is_ascii_alphanumeric() || !last.is_ascii_alphanumeric() {
        return Err(format!(
            "annotation key name {:?} must start and end with a letter or digit",
            name
        ));
    }
    for c in name.chars() {
        if !c.is_ascii_alphanumeric() && c != '-' && c != '_' && c != '.' {
            return Err(format!(
                "invalid character '{}' in annotation key {:?}",
                c, key
            ));
        }
    }
    Ok(())
}

fn is_dns_subdomain(prefix: &str) -> bool {
    !prefix.is_empty()
        && prefix.split('.').all(|label| {
            !label.is_empty()
                && label.len() <= 63
                && label.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
                && label.chars().next().unwrap().is_ascii_alphanumeric()
                && label.chars().last().unwrap().is_ascii_alphanumeric()
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::specs::{ContainerEdits, Device, DeviceNode, Hook, IntelRdt, Spec};

    fn minimal_spec() -> Spec {
        Spec {
            version: "0.3.0".to_string(),
            kind: "vendor.com/device".to_string(),
            devices: vec![Device {
                name: "dev1".to_string(),
                container_edits: ContainerEdits {
                    device_nodes: vec![DeviceNode {
                        path: "/dev/dev1".to_string(),
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
        }
    }

    #[test]
    fn test_valid_spec() {
        assert!(DefaultValidator.validate_spec(&minimal_spec()).is_ok());
    }

    #[test]
    fn test_invalid_version() {
        let mut spec = minimal_spec();
        spec.version = "0.0.42".to_string();
        assert!(DefaultValidator.validate_spec(&spec).is_err());
        spec.version = String::new();
        assert!(DefaultValidator.validate_spec(&spec).is_err());
    }

    #[test]
    fn test_invalid_kind() {
        for kind in ["deviceless", "vendor.com/", "/device", "0vendor/device"] {
            let mut spec = minimal_spec();
            spec.kind = kind.to_string();
            assert!(
                DefaultValidator.validate_spec(&spec).is_err(),
                "kind {:?} expected to fail",
                kind
            );
        }
    }

    #[test]
    fn test_no_devices() {
        let mut spec = minimal_spec();
        spec.devices.clear();
        assert!(DefaultValidator.validate_spec(&spec).is_err());
    }

    #[test]
    fn test_duplicate_devices() {
        let mut spec = minimal_spec();
        let dup = spec.devices[0].clone();
        spec.devices.push(dup);
        let err = DefaultValidator.validate_spec(&spec).unwrap_err();
        assert!(err.to_string().contains("multiple device"));
    }

    #[test]
    fn test_device_with_empty_edits() {
        let mut spec = minimal_spec();
        spec.devices[0].container_edits = ContainerEdits::default();
        let err = DefaultValidator.validate_spec(&spec).unwrap_err();
        assert!(err.to_string().contains("invalid device"));
    }

    #[test]
    fn test_device_with_bad_hook() {
        let mut spec = minimal_spec();
        spec.devices[0].container_edits.hooks = vec![Hook {
            hook_name: "preCreate".to_string(),
            path: "/bin/hook".to_string(),
            ..Default::default()
        }];
        assert!(DefaultValidator.validate_spec(&spec).is_err());
    }

    #[test]
    fn test_spec_level_edits_validated() {
        let mut spec = minimal_spec();
        spec.container_edits.intel_rdt = Some(IntelRdt {
            clos_id: "no/slash".to_string(),
            ..Default::default()
        });
        assert!(DefaultValidator.validate_spec(&spec).is_err());
    }

    #[test]
    fn test_annotation_keys() {
        let mut annotations = HashMap::new();
        annotations.insert("cdi.k8s.io/vendor_dev".to_string(), "v".to_string());
        annotations.insert("plain-key".to_string(), "v".to_string());
        assert!(validate_spec_annotations("", &annotations).is_ok());

        let mut annotations = HashMap::new();
        annotations.insert("a/b/c".to_string(), "v".to_string());
        assert!(validate_spec_annotations("", &annotations).is_err());

        let mut annotations = HashMap::new();
        annotations.insert(format!("{}x", "n".repeat(MAX_KEY_NAME_LEN)), "v".to_string());
        assert!(validate_spec_annotations("", &annotations).is_err());

        let mut annotations = HashMap::new();
        annotations.insert("-leading.dash/key".to_string(), "v".to_string());
        assert!(validate_spec_annotations("", &annotations).is_err());
    }

    #[test]
    fn test_annotation_size_limit() {
        let mut annotations = HashMap::new();
        annotations.insert(
            "vendor.com/blob".to_string(),
            "x".repeat(TOTAL_ANNOTATION_SIZE_LIMIT),
        );
        let err = validate_spec_annotations("vendor.com/device", &annotations).unwrap_err();
        assert!(err.to_string().contains("exceeds the limit"));
    }
}
