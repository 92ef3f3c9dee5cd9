// Copyright (c) 2023 Alibaba Cloud
//
// SPDX-License-Identifier: Apache-2.0
//

//! In-memory representation of a spec file.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::parser;
use crate::producer::{SpecFormat, SpecProducer};
use crate::specs;
use crate::validate::{DefaultValidator, SpecValidator};
use crate::version::Version;

/// Extension appended to spec paths that carry none.
pub(crate) const DEFAULT_SPEC_EXT: &str = ".yaml";

/// A spec document together with the runtime attributes it gets when it
/// is loaded: its source path and the priority of the directory it came
/// from. Higher priorities win conflicts.
#[derive(Debug, Clone)]
pub struct Spec {
    raw: specs::Spec,
    vendor: String,
    class: String,
    version: Version,
    path: PathBuf,
    priority: usize,
    device_index: HashMap<String, usize>,
}

impl Spec {
    /// Wraps and validates a raw spec document.
    pub fn new(raw: specs::Spec, path: impl Into<PathBuf>, priority: usize) -> Result<Spec> {
        Self::with_validator(raw, path, priority, &DefaultValidator)
    }

    /// Wraps a raw spec document, validating it with the given strategy.
    pub fn with_validator(
        raw: specs::Spec,
        path: impl Into<PathBuf>,
        priority: usize,
        validator: &dyn SpecValidator,
    ) -> Result<Spec> {
        validator.validate_spec(&raw)?;

        let mut path = path.into();
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("json") => {}
            _ => {
                let mut name = path.as_os_str().to_os_string();
                name.push(DEFAULT_SPEC_EXT);
                path = PathBuf::from(name);
            }
        }

        let (vendor, class) = parser::parse_qualifier(&raw.kind);
        let version = raw.version.parse()?;
        let device_index = raw
            .devices
            .iter()
            .enumerate()
            .map(|(i, d)| (d.name.clone(), i))
            .collect();

        Ok(Spec {
            raw,
            vendor,
            class,
            version,
            path,
            priority,
            device_index,
        })
    }

    /// Reads, parses and validates a spec file.
    pub fn read(path: impl AsRef<Path>, priority: usize) -> Result<Spec> {
        let path = path.as_ref();
        let data = fs::read(path)
            .map_err(|e| Error::io(format!("failed to read CDI Spec {:?}", path), e))?;
        let raw = parse_spec(&data)
            .map_err(|e| Error::Parse(format!("failed to parse CDI Spec {:?}: {}", path, e)))?;
        Spec::new(raw, path, priority)
    }

    /// The vendor of this spec.
    pub fn vendor(&self) -> &str {
        &self.vendor
    }

    /// The device class of this spec.
    pub fn class(&self) -> &str {
        &self.class
    }

    /// The full `vendor/class` kind.
    pub fn kind(&self) -> &str {
        &self.raw.kind
    }

    /// The schema revision this spec declares.
    pub fn version(&self) -> Version {
        self.version
    }

    /// The source path of this spec.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The priority of this spec, derived from the position of its
    /// directory in the search order.
    pub fn priority(&self) -> usize {
        self.priority
    }

    /// The raw document this spec wraps.
    pub fn raw(&self) -> &specs::Spec {
        &self.raw
    }

    /// Spec-level container edits, applied whenever any device of this
    /// spec is selected.
    pub fn edits(&self) -> &specs::ContainerEdits {
        &self.raw.container_edits
    }

    /// Looks up a device of this spec by (unqualified) name.
    pub fn device(&self, name: &str) -> Option<&specs::Device> {
        self.device_index.get(name).map(|i| &self.raw.devices[*i])
    }

    pub(crate) fn device_at(&self, index: usize) -> &specs::Device {
        &self.raw.devices[index]
    }

    /// The devices of this spec, in declaration order.
    pub fn devices(&self) -> impl Iterator<Item = &specs::Device> {
        self.raw.devices.iter()
    }

    /// Writes this spec to its path, inferring the format from the
    /// extension.
    pub fn write(&self, overwrite: bool) -> Result<()> {
        SpecProducer::new()
            .overwrite(overwrite)
            .save_to(&self.raw, &self.path)
            .map(|_| ())
    }
}

/// Parses raw bytes into a spec document. Content starting with `{` is
/// treated as JSON, anything else as YAML.
pub fn parse_spec(data: &[u8]) -> Result<specs::Spec> {
    let text = std::str::from_utf8(data)
        .map_err(|e| Error::Parse(format!("spec is not valid UTF-8: {}", e)))?;
    if text.trim_start().starts_with('{') {
        serde_json::from_str(text).map_err(|e| Error::Parse(e.to_string()))
    } else {
        serde_yaml::from_str(text).map_err(|e| Error::Parse(e.to_string()))
    }
}

/// Returns the spec format matching a path extension, if any.
pub(crate) fn format_for_path(path: &Path) -> Option<SpecFormat> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => Some(SpecFormat::Json),
        Some("yaml") => Some(SpecFormat::Yaml),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::specs::{ContainerEdits, Device, DeviceNode};

    fn raw_spec() -> specs::Spec {
        specs::Spec {
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
    fn test_new_spec_getters() {
        let spec = Spec::new(raw_spec(), "/etc/cdi/vendor.yaml", 0).unwrap();
        assert_eq!(spec.vendor(), "vendor.com");
        assert_eq!(spec.class(), "device");
        assert_eq!(spec.kind(), "vendor.com/device");
        assert_eq!(spec.version(), Version::V030);
        assert_eq!(spec.priority(), 0);
        assert_eq!(spec.path(), Path::new("/etc/cdi/vendor.yaml"));
        assert!(spec.device("dev1").is_some());
        assert!(spec.device("dev2").is_none());
    }

    #[test]
    fn test_default_extension_appended() {
        let spec = Spec::new(raw_spec(), "/etc/cdi/vendor", 1).unwrap();
        assert_eq!(spec.path(), Path::new("/etc/cdi/vendor.yaml"));
    }

    #[test]
    fn test_invalid_spec_rejected() {
        let mut raw = raw_spec();
        raw.devices.clear();
        assert!(Spec::new(raw, "/etc/cdi/vendor.yaml", 0).is_err());
    }

    #[test]
    fn test_parse_spec_sniffing() {
        let json = r#"{
            "cdiVersion": "0.3.0",
            "kind": "vendor.com/device",
            "devices": [{
                "name": "dev1",
                "containerEdits": { "env": ["FOO=bar"] }
            }]
        }"#;
        let spec = parse_spec(json.as_bytes()).unwrap();
        assert_eq!(spec.kind, "vendor.com/device");

        let yaml = r#"
cdiVersion: "0.3.0"
kind: vendor.com/device
devices:
  - name: dev1
    containerEdits:
      env:
        - FOO=bar
"#;
        let spec = parse_spec(yaml.as_bytes()).unwrap();
        assert_eq!(spec.devices[0].container_edits.env[0], "FOO=bar");

        assert!(parse_spec(b"{ not json").is_err());
        assert!(parse_spec(b"\t<xml/>").is_err());
    }
}
