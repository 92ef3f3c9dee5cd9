// Copyright (c) 2023 Alibaba Cloud
//
// SPDX-License-Identifier: Apache-2.0
//

//! Released revisions of the spec schema and detection of the minimum
//! revision a given spec requires.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::parser;
use crate::specs;

/// A released revision of the spec schema, in increasing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Version {
    V010,
    V020,
    V030,
    V040,
    V050,
    V060,
    V070,
    V080,
}

/// The current revision of the spec schema.
pub const CURRENT_VERSION: Version = Version::V080;

/// The earliest revision this crate fully supports. Earlier revisions
/// still load, but may carry features absent from later checks.
pub const EARLIEST_VERSION: Version = Version::V030;

impl Version {
    /// All released revisions, oldest first.
    pub const ALL: [Version; 8] = [
        Version::V010,
        Version::V020,
        Version::V030,
        Version::V040,
        Version::V050,
        Version::V060,
        Version::V070,
        Version::V080,
    ];

    /// The version string without a leading `v`, as persisted in spec
    /// files.
    pub fn as_str(&self) -> &'static str {
        match self {
            Version::V010 => "0.1.0",
            Version::V020 => "0.2.0",
            Version::V030 => "0.3.0",
            Version::V040 => "0.4.0",
            Version::V050 => "0.5.0",
            Version::V060 => "0.6.0",
            Version::V070 => "0.7.0",
            Version::V080 => "0.8.0",
        }
    }

    /// Whether `version` names a released schema revision. A leading `v`
    /// is accepted.
    pub fn is_valid(version: &str) -> bool {
        version.parse::<Version>().is_ok()
    }
}

impl FromStr for Version {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.strip_prefix('v').unwrap_or(s);
        Version::ALL
            .iter()
            .find(|v| v.as_str() == trimmed)
            .copied()
            .ok_or_else(|| Error::Version(s.to_string()))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Checks that a spec declares a recognized schema revision.
pub fn validate_version(spec: &specs::Spec) -> Result<Version> {
    spec.version.parse()
}

/// Determines the minimum schema revision required by the content of the
/// given spec.
///
/// Requirement probes are consulted newest first, so detection stops as
/// soon as the highest matching revision is found.
pub fn minimum_required_version(spec: &specs::Spec) -> Version {
    type RequiredProbe = fn(&specs::Spec) -> bool;
    const PROBES: [(Version, RequiredProbe); 5] = [
        (Version::V080, requires_v080),
        (Version::V070, requires_v070),
        (Version::V060, requires_v060),
        (Version::V050, requires_v050),
        (Version::V040, requires_v040),
    ];

    for (version, required) in PROBES.iter() {
        if required(spec) {
            return *version;
        }
    }
    EARLIEST_VERSION
}

fn all_edits(spec: &specs::Spec) -> impl Iterator<Item = &specs::ContainerEdits> {
    spec.devices
        .iter()
        .map(|d| &d.container_edits)
        .chain(std::iter::once(&spec.container_edits))
}

// The v0.8.0 revision carried no persisted schema additions.
fn requires_v080(_spec: &specs::Spec) -> bool {
    false
}

// IntelRdt and additional GIDs were added in v0.7.0, at both the spec
// and the device level.
fn requires_v070(spec: &specs::Spec) -> bool {
    all_edits(spec).any(|e| e.intel_rdt.is_some() || !e.additional_gids.is_empty())
}

// v0.6.0 added annotations at the spec and device level, and dots in
// the class part of the kind.
fn requires_v060(spec: &specs::Spec) -> bool {
    if !spec.annotations.is_empty() {
        return true;
    }
    if spec.devices.iter().any(|d| !d.annotations.is_empty()) {
        return true;
    }
    let (vendor, class) = parser::parse_qualifier(&spec.kind);
    !vendor.is_empty() && class.contains('.')
}

// v0.5.0 allowed device names starting with a non-letter and added the
// hostPath field on device nodes.
fn requires_v050(spec: &specs::Spec) -> bool {
    for device in &spec.devices {
        if let Some(first) = device.name.chars().next() {
            if !first.is_ascii_alphabetic() {
                return true;
            }
        }
    }
    all_edits(spec).any(|e| e.device_nodes.iter().any(|dn| !dn.host_path.is_empty()))
}

// The mount type field was added in v0.4.0.
fn requires_v040(spec: &specs::Spec) -> bool {
    all_edits(spec).any(|e| e.mounts.iter().any(|m| !m.r#type.is_empty()))
}
