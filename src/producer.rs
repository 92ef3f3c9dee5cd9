// Copyright (c) 2023 Alibaba Cloud
//
// SPDX-License-Identifier: Apache-2.0
//

//! Serialization of specs to disk.
//!
//! [`SpecProducer`] validates a spec document and writes it atomically:
//! the content goes to a temporary file in the target directory which is
//! then renamed over the destination, so readers never observe a partial
//! spec.

use std::fs;
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::parser;
use crate::spec::format_for_path;
use crate::specs;
use crate::validate::{DefaultValidator, SpecValidator};
use crate::version;

/// Default permission bits of produced spec files.
const DEFAULT_SPEC_MODE: u32 = 0o600;

/// Encoding used when reading or writing a spec file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecFormat {
    Json,
    Yaml,
}

impl SpecFormat {
    /// The filename extension of this format, without the dot.
    pub fn extension(&self) -> &'static str {
        match self {
            SpecFormat::Json => "json",
            SpecFormat::Yaml => "yaml",
        }
    }

    fn marshal(&self, raw: &specs::Spec) -> Result<Vec<u8>> {
        match self {
            SpecFormat::Yaml => {
                let data = serde_yaml::to_string(raw)
                    .map_err(|e| Error::Parse(format!("failed to marshal Spec file: {}", e)))?;
                let mut out = b"---\n".to_vec();
                out.extend_from_slice(data.as_bytes());
                Ok(out)
            }
            SpecFormat::Json => serde_json::to_vec(raw)
                .map_err(|e| Error::Parse(format!("failed to marshal Spec file: {}", e))),
        }
    }
}

/// Writes spec documents to disk.
pub struct SpecProducer {
    format: SpecFormat,
    overwrite: bool,
    permissions: u32,
    fsync: bool,
    detect_minimum_version: bool,
    validator: Box<dyn SpecValidator>,
}

impl Default for SpecProducer {
    fn default() -> Self {
        SpecProducer {
            format: SpecFormat::Yaml,
            overwrite: true,
            permissions: DEFAULT_SPEC_MODE,
            fsync: false,
            detect_minimum_version: false,
            validator: Box::new(DefaultValidator),
        }
    }
}

impl SpecProducer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the encoding used when the target path carries no extension.
    pub fn format(mut self, format: SpecFormat) -> Self {
        self.format = format;
        self
    }

    /// Controls whether an existing file may be replaced. Defaults to
    /// true.
    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Sets the permission bits of produced files. Defaults to `0600`.
    pub fn permissions(mut self, mode: u32) -> Self {
        self.permissions = mode;
        self
    }

    /// Requests an fsync of the temporary file before it is renamed into
    /// place.
    pub fn fsync(mut self, fsync: bool) -> Self {
        self.fsync = fsync;
        self
    }

    /// Overwrites the declared schema revision with the minimum revision
    /// the spec content requires.
    pub fn detect_minimum_version(mut self, detect: bool) -> Self {
        self.detect_minimum_version = detect;
        self
    }

    /// Replaces the validation strategy applied before writing.
    pub fn validator(mut self, validator: Box<dyn SpecValidator>) -> Self {
        self.validator = validator;
        self
    }

    /// Validates `raw` and writes it to `path`, appending the configured
    /// default extension when the path carries none. Returns the path
    /// written to.
    pub fn save_to(&self, raw: &specs::Spec, path: impl AsRef<Path>) -> Result<PathBuf> {
        let (path, format) = self.normalize_filename(path.as_ref());

        let mut raw = raw.clone();
        if self.detect_minimum_version {
            raw.version = version::minimum_required_version(&raw).as_str().to_string();
        }
        self.validator.validate_spec(&raw)?;

        let data = format.marshal(&raw)?;

        if !self.overwrite && path.exists() {
            return Err(Error::Io {
                context: format!("failed to write Spec file {:?}", path),
                error: "file exists".to_string(),
            });
        }
        self.write_atomic(&path, &data)?;

        Ok(path)
    }

    fn normalize_filename(&self, path: &Path) -> (PathBuf, SpecFormat) {
        match format_for_path(path) {
            Some(format) => (path.to_path_buf(), format),
            None => {
                let mut name = path.as_os_str().to_os_string();
                name.push(".");
                name.push(self.format.extension());
                (PathBuf::from(name), self.format)
            }
        }
    }

    fn write_atomic(&self, path: &Path, data: &[u8]) -> Result<()> {
        let dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)
            .map_err(|e| Error::io(format!("failed to create Spec dir {:?}", dir), e))?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir)
            .map_err(|e| Error::io(format!("failed to create temporary file in {:?}", dir), e))?;
        tmp.write_all(data)
            .map_err(|e| Error::io(format!("failed to write Spec file {:?}", path), e))?;
        tmp.as_file()
            .set_permissions(fs::Permissions::from_mode(self.permissions))
            .map_err(|e| Error::io(format!("failed to set permissions on {:?}", path), e))?;
        if self.fsync {
            tmp.as_file()
                .sync_all()
                .map_err(|e| Error::io(format!("failed to sync Spec file {:?}", path), e))?;
        }
        tmp.persist(path)
            .map_err(|e| Error::io(format!("failed to write Spec file {:?}", path), e.error))?;
        Ok(())
    }
}

/// Generates a vendor+class scoped spec file name, without an extension.
///
/// The same vendor/class combination always produces the same name; use
/// [`generate_transient_spec_name`] when several files per combination
/// are needed.
pub fn generate_spec_name(vendor: &str, class: &str) -> String {
    format!("{}-{}", vendor, class)
}

/// Generates a vendor+class scoped spec file name for a spec whose
/// lifecycle is tied to an external entity, identified by
/// `transient_id`. Slashes in the ID are replaced so container IDs and
/// similar path-like values are usable directly.
pub fn generate_transient_spec_name(vendor: &str, class: &str, transient_id: &str) -> String {
    let transient_id = transient_id.replace('/', "_");
    let transient_id = transient_id.trim();
    let base = generate_spec_name(vendor, class);
    if transient_id.is_empty() {
        base
    } else {
        format!("{}_{}", base, transient_id)
    }
}

/// Generates a name for the given spec from its vendor and class.
pub fn generate_name_for_spec(raw: &specs::Spec) -> Result<String> {
    generate_name_for_transient_spec(raw, "")
}

/// Generates a transient name for the given spec from its vendor and
/// class.
pub fn generate_name_for_transient_spec(
    raw: &specs::Spec,
    transient_id: &str,
) -> Result<String> {
    let (vendor, class) = parser::parse_qualifier(&raw.kind);
    if vendor.is_empty() {
        return Err(Error::Validation(format!(
            "invalid vendor/class {:?} in Spec",
            raw.kind
        )));
    }
    Ok(generate_transient_spec_name(&vendor, &class, transient_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::{parse_spec, Spec};
    use crate::specs::{ContainerEdits, Device, DeviceNode};
    use std::os::unix::fs::MetadataExt;

    fn raw_spec() -> specs::Spec {
        specs::Spec {
            version: "0.5.0".to_string(),
            kind: "vendor.com/device".to_string(),
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
        }
    }

    #[test]
    fn test_save_yaml_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let raw = raw_spec();
        let path = SpecProducer::new()
            .save_to(&raw, dir.path().join("vendor.com-device"))
            .unwrap();
        assert_eq!(path.extension().unwrap(), "yaml");

        let data = fs::read(&path).unwrap();
        assert!(data.starts_with(b"---\n"));

        // a produced spec reads back with an equal in-memory form
        let reread = Spec::read(&path, 0).unwrap();
        assert_eq!(reread.raw(), &raw);
    }

    #[test]
    fn test_save_json() {
        let dir = tempfile::tempdir().unwrap();
        let raw = raw_spec();
        let path = SpecProducer::new()
            .save_to(&raw, dir.path().join("vendor.com-device.json"))
            .unwrap();
        let parsed = parse_spec(&fs::read(&path).unwrap()).unwrap();
        assert_eq!(parsed, raw);
    }

    #[test]
    fn test_save_rejects_invalid_spec() {
        let dir = tempfile::tempdir().unwrap();
        let mut raw = raw_spec();
        raw.devices.clear();
        assert!(SpecProducer::new()
            .save_to(&raw, dir.path().join("vendor.yaml"))
            .is_err());
    }

    #[test]
    fn test_save_no_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let raw = raw_spec();
        let producer = SpecProducer::new().overwrite(false);
        let path = producer.save_to(&raw, dir.path().join("vendor")).unwrap();
        let err = producer.save_to(&raw, &path).unwrap_err();
        assert!(err.to_string().contains("file exists"));

        // the default replaces the file
        SpecProducer::new().save_to(&raw, &path).unwrap();
    }

    #[test]
    fn test_save_permissions() {
        let dir = tempfile::tempdir().unwrap();
        let path = SpecProducer::new()
            .save_to(&raw_spec(), dir.path().join("vendor"))
            .unwrap();
        let mode = fs::metadata(&path).unwrap().mode();
        assert_eq!(mode & 0o777, 0o600);

        let path = SpecProducer::new()
            .permissions(0o644)
            .save_to(&raw_spec(), dir.path().join("vendor-readable"))
            .unwrap();
        let mode = fs::metadata(&path).unwrap().mode();
        assert_eq!(mode & 0o777, 0o644);
    }

    #[test]
    fn test_detect_minimum_version() {
        let dir = tempfile::tempdir().unwrap();
        // host_path on a device node requires 0.5.0
        let mut raw = raw_spec();
        raw.version = "0.8.0".to_string();
        let path = SpecProducer::new()
            .detect_minimum_version(true)
            .save_to(&raw, dir.path().join("vendor.yaml"))
            .unwrap();
        let reread = Spec::read(&path, 0).unwrap();
        assert_eq!(reread.raw().version, "0.5.0");
    }

    #[test]
    fn test_spec_names() {
        assert_eq!(generate_spec_name("vendor.com", "class"), "vendor.com-class");
        assert_eq!(
            generate_transient_spec_name("vendor.com", "class", "some/container/id"),
            "vendor.com-class_some_container_id"
        );
        assert_eq!(
            generate_transient_spec_name("vendor.com", "class", ""),
            "vendor.com-class"
        );
        let raw = raw_spec();
        assert_eq!(
            generate_name_for_spec(&raw).unwrap(),
            "vendor.com-device"
        );
        let mut bad = raw;
        bad.kind = "not-a-kind".to_string();
        assert!(generate_name_for_spec(&bad).is_err());
    }
}
