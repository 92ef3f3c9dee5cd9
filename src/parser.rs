// Copyright (c) 2023 Alibaba Cloud
//
// SPDX-License-Identifier: Apache-2.0
//

//! Syntax of qualified device names.
//!
//! A qualified device name has the form `<vendor>/<class>=<name>`, for
//! example `nvidia.com/gpu=gpu0`. Vendor and class names may contain
//! letters, digits and `.`, `-`, `_`; device names additionally allow
//! `:`.

use crate::error::{Error, Result};

/// Returns the qualified name for a device of the given vendor and class.
///
/// No validation is performed on the pieces; use [`parse_qualified_name`]
/// on the result to verify it.
pub fn qualified_name(vendor: &str, class: &str, name: &str) -> String {
    format!("{}/{}={}", vendor, class, name)
}

/// Tests whether a device reference is a fully qualified device name.
pub fn is_qualified_name(device: &str) -> bool {
    parse_qualified_name(device).is_ok()
}

/// Splits a qualified name into vendor, class, and device name.
///
/// If the reference fails to split, or any of the pieces fails syntax
/// validation, an error describing the reason is returned. The verbatim
/// input remains available to callers through [`parse_device`], which
/// reports it in the device-name position.
pub fn parse_qualified_name(device: &str) -> Result<(String, String, String)> {
    let (vendor, class, name) = parse_device(device);

    if vendor.is_empty() {
        return Err(Error::Parse(format!(
            "unqualified device {:?}, missing vendor",
            device
        )));
    }
    if class.is_empty() {
        return Err(Error::Parse(format!(
            "unqualified device {:?}, missing class",
            device
        )));
    }
    if name.is_empty() {
        return Err(Error::Parse(format!(
            "unqualified device {:?}, missing device name",
            device
        )));
    }

    validate_vendor_name(&vendor)
        .map_err(|e| Error::Parse(format!("invalid device {:?}: {}", device, e)))?;
    validate_class_name(&class)
        .map_err(|e| Error::Parse(format!("invalid device {:?}: {}", device, e)))?;
    validate_device_name(&name)
        .map_err(|e| Error::Parse(format!("invalid device {:?}: {}", device, e)))?;

    Ok((vendor, class, name))
}

/// Tries to split a device reference into vendor, class, and name.
///
/// For unqualified references the vendor and class come back empty and
/// the name carries the verbatim input.
pub fn parse_device(device: &str) -> (String, String, String) {
    if device.is_empty() || device.starts_with('/') {
        return (String::new(), String::new(), device.to_string());
    }

    let (qualifier, name) = match device.split_once('=') {
        Some((q, n)) if !q.is_empty() && !n.is_empty() => (q, n),
        _ => return (String::new(), String::new(), device.to_string()),
    };

    let (vendor, class) = parse_qualifier(qualifier);
    if vendor.is_empty() {
        return (String::new(), String::new(), device.to_string());
    }

    (vendor, class.to_string(), name.to_string())
}

/// Splits a device qualifier `<vendor>/<class>` into vendor and class.
///
/// If parsing fails, an empty vendor and the class set to the verbatim
/// input is returned.
pub fn parse_qualifier(kind: &str) -> (String, String) {
    match kind.split_once('/') {
        Some((vendor, class)) if !vendor.is_empty() && !class.is_empty() => {
            (vendor.to_string(), class.to_string())
        }
        _ => (String::new(), kind.to_string()),
    }
}

/// Checks the validity of a `<vendor>/<class>` kind.
pub fn validate_kind(kind: &str) -> Result<()> {
    let (vendor, class) = match kind.split_once('/') {
        Some((v, c)) if !v.is_empty() && !c.is_empty() => (v, c),
        _ => {
            return Err(Error::Validation(format!(
                "kind {:?} is not a vendor/class",
                kind
            )))
        }
    };
    validate_vendor_name(vendor)?;
    validate_class_name(class)
}

/// Checks the validity of a vendor name.
///
/// A vendor name may contain letters, digits, and `_`, `-`, `.`; it must
/// start with a letter and end with a letter or digit.
pub fn validate_vendor_name(vendor: &str) -> Result<()> {
    validate_vendor_or_class_name(vendor)
        .map(|_| ())
        .map_err(|e| Error::Validation(format!("invalid vendor. {}", e)))
}

/// Checks the validity of a class name, using the same rules as vendors.
pub fn validate_class_name(class: &str) -> Result<()> {
    validate_vendor_or_class_name(class)
        .map(|_| ())
        .map_err(|e| Error::Validation(format!("invalid class. {}", e)))
}

fn validate_vendor_or_class_name(name: &str) -> std::result::Result<String, String> {
    let mut chars = name.chars();
    let first = match chars.next() {
        Some(c) => c,
        None => return Err("empty name".to_string()),
    };
    if !first.is_ascii_alphabetic() {
        return Err(format!("{:?}, should start with letter", name));
    }
    let last = name.chars().last().unwrap();
    if !last.is_ascii_alphanumeric() {
        return Err(format!("{:?}, should end with a letter or digit", name));
    }
    for c in chars {
        if !c.is_ascii_alphanumeric() && c != '_' && c != '-' && c != '.' {
            return Err(format!("invalid character '{}' in name {:?}", c, name));
        }
    }
    Ok(name.to_string())
}

/// Checks the validity of a device name.
///
/// A device name may contain letters, digits, and `_`, `-`, `.`, `:`; it
/// must start and end with a letter or digit.
pub fn validate_device_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let first = match chars.next() {
        Some(c) => c,
        None => {
            return Err(Error::Validation(
                "invalid (empty) device name".to_string(),
            ))
        }
    };
    if !first.is_ascii_alphanumeric() {
        return Err(Error::Validation(format!(
            "invalid name {:?}, should start with a letter or digit",
            name
        )));
    }
    let last = name.chars().last().unwrap();
    if !last.is_ascii_alphanumeric() {
        return Err(Error::Validation(format!(
            "invalid name {:?}, should end with a letter or digit",
            name
        )));
    }
    for c in chars {
        if !c.is_ascii_alphanumeric() && c != '_' && c != '-' && c != '.' && c != ':' {
            return Err(Error::Validation(format!(
                "invalid character '{}' in device name {:?}",
                c, name
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qualified_name_roundtrip() {
        let cases = vec![
            ("vendor.com", "class", "dev"),
            ("vendor.com", "class", "dev:0"),
            ("vendor.com", "class", "0"),
            ("v", "c", "d"),
            ("nvidia.com", "gpu", "gpu-0_b.c"),
            ("some-vendor.org", "sub.class", "1:2:3"),
        ];
        for (vendor, class, name) in cases {
            let device = qualified_name(vendor, class, name);
            let (v, c, n) = parse_qualified_name(&device).unwrap();
            assert_eq!((v.as_str(), c.as_str(), n.as_str()), (vendor, class, name));
            assert!(is_qualified_name(&device));
        }
    }

    #[test]
    fn test_parse_unqualified() {
        let cases = vec![
            "",
            "/dev/null",
            "vendor.com/class",
            "vendor.com=dev",
            "=dev",
            "vendor.com/class=",
        ];
        for device in cases {
            let (vendor, class, name) = parse_device(device);
            assert_eq!(vendor, "");
            assert_eq!(class, "");
            assert_eq!(name, device, "verbatim input expected for {:?}", device);
            assert!(parse_qualified_name(device).is_err());
        }
    }

    #[test]
    fn test_parse_invalid_names() {
        let cases = vec![
            // vendor must start with a letter
            "0vendor.com/class=dev",
            "-vendor/class=dev",
            // vendor and class must end with a letter or digit
            "vendor./class=dev",
            "vendor.com/class-=dev",
            // no colons in vendor or class
            "ven:dor/class=dev",
            "vendor.com/cla:ss=dev",
            // bad characters
            "vendor.com/cl+ass=dev",
            "vendor.com/class=de+v",
            // device name must start and end with a letter or digit
            "vendor.com/class=-dev",
            "vendor.com/class=dev-",
        ];
        for device in cases {
            assert!(
                parse_qualified_name(device).is_err(),
                "{:?} expected to fail",
                device
            );
        }
    }

    #[test]
    fn test_parse_qualifier() {
        assert_eq!(
            parse_qualifier("vendor.com/class"),
            ("vendor.com".to_string(), "class".to_string())
        );
        // class keeps the remainder after the first slash
        assert_eq!(
            parse_qualifier("vendor.com/class/extra"),
            ("vendor.com".to_string(), "class/extra".to_string())
        );
        assert_eq!(
            parse_qualifier("unqualified"),
            ("".to_string(), "unqualified".to_string())
        );
        assert_eq!(parse_qualifier("/class"), ("".to_string(), "/class".to_string()));
    }

    #[test]
    fn test_validate_kind() {
        assert!(validate_kind("vendor.com/class").is_ok());
        assert!(validate_kind("vendor.com/sub.class").is_ok());
        assert!(validate_kind("vendor.com").is_err());
        assert!(validate_kind("vendor.com/").is_err());
        assert!(validate_kind("/class").is_err());
        assert!(validate_kind("0vendor/class").is_err());
    }
}
