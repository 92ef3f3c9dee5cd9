// Copyright (c) 2023 Alibaba Cloud
//
// SPDX-License-Identifier: Apache-2.0
//

//! Discovery of spec files across the configured directories.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::spec::Spec;

/// Directory for static spec files, installed by vendor packages.
pub const DEFAULT_STATIC_DIR: &str = "/etc/cdi";

/// Directory for dynamically generated spec files.
pub const DEFAULT_DYNAMIC_DIR: &str = "/var/run/cdi";

/// The default search path, in increasing order of precedence.
pub const DEFAULT_SPEC_DIRS: [&str; 2] = [DEFAULT_STATIC_DIR, DEFAULT_DYNAMIC_DIR];

/// True for files a scan should consider: a `.json` or `.yaml` extension
/// and not an editor temporary.
pub(crate) fn is_spec_file(path: &Path) -> bool {
    match path.extension().and_then(|e| e.to_str()) {
        Some("json") | Some("yaml") => {}
        _ => return false,
    }
    match path.file_name().and_then(|n| n.to_str()) {
        Some(name) => !name.starts_with('.') && !name.starts_with('#'),
        None => false,
    }
}

/// Walks the given directories in priority order (priority = index) and
/// invokes `visit` with the outcome of loading every spec file found.
/// Missing directories are skipped; other enumeration failures are
/// reported through `visit` keyed by the directory itself.
pub(crate) fn scan_spec_dirs<F>(dirs: &[PathBuf], visit: &mut F)
where
    F: FnMut(&Path, Result<Spec>),
{
    for (priority, dir) in dirs.iter().enumerate() {
        scan_dir(dir, priority, visit);
    }
}

fn scan_dir<F>(dir: &Path, priority: usize, visit: &mut F)
where
    F: FnMut(&Path, Result<Spec>),
{
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return,
        Err(e) => {
            visit(
                dir,
                Err(Error::io(format!("failed to read spec dir {:?}", dir), e)),
            );
            return;
        }
    };

    let mut paths: Vec<PathBuf> = Vec::new();
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                visit(
                    dir,
                    Err(Error::io(format!("failed to read spec dir {:?}", dir), e)),
                );
                continue;
            }
        };
        paths.push(entry.path());
    }
    // deterministic load order within a directory
    paths.sort();

    for path in paths {
        if path.is_dir() {
            scan_dir(&path, priority, visit);
            continue;
        }
        if !is_spec_file(&path) {
            continue;
        }
        visit(&path, Spec::read(&path, priority));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(dir: &Path, name: &str, data: &str) -> PathBuf {
        let path = dir.join(name);
        let mut f = fs::File::create(&path).unwrap();
        f.write_all(data.as_bytes()).unwrap();
        path
    }

    fn spec_yaml(kind: &str, device: &str) -> String {
        format!(
            "cdiVersion: \"0.3.0\"\nkind: {}\ndevices:\n  - name: {}\n    containerEdits:\n      env:\n        - VENDOR_VAR=1\n",
            kind, device
        )
    }

    #[test]
    fn test_is_spec_file() {
        assert!(is_spec_file(Path::new("/etc/cdi/vendor.yaml")));
        assert!(is_spec_file(Path::new("/etc/cdi/vendor.json")));
        assert!(!is_spec_file(Path::new("/etc/cdi/vendor.txt")));
        assert!(!is_spec_file(Path::new("/etc/cdi/vendor")));
        assert!(!is_spec_file(Path::new("/etc/cdi/.vendor.yaml")));
        assert!(!is_spec_file(Path::new("/etc/cdi/#vendor.yaml#")));
    }

    #[test]
    fn test_scan_priority_and_filtering() {
        let etc = tempfile::tempdir().unwrap();
        let run = tempfile::tempdir().unwrap();
        write_file(etc.path(), "vendor1.yaml", &spec_yaml("vendor1.com/device", "dev1"));
        write_file(run.path(), "vendor2.yaml", &spec_yaml("vendor2.com/device", "dev1"));
        write_file(run.path(), ".hidden.yaml", &spec_yaml("vendor3.com/device", "dev1"));
        write_file(run.path(), "#editor.yaml", &spec_yaml("vendor4.com/device", "dev1"));
        write_file(run.path(), "notes.txt", "not a spec");
        write_file(run.path(), "broken.yaml", "not: [valid");

        let dirs = vec![etc.path().to_path_buf(), run.path().to_path_buf()];
        let mut loaded = Vec::new();
        let mut failed = Vec::new();
        scan_spec_dirs(&dirs, &mut |path, result| match result {
            Ok(spec) => loaded.push((path.to_path_buf(), spec.priority())),
            Err(_) => failed.push(path.to_path_buf()),
        });

        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].1, 0);
        assert_eq!(loaded[1].1, 1);
        assert_eq!(failed, vec![run.path().join("broken.yaml")]);
    }

    #[test]
    fn test_scan_missing_dir_skipped() {
        let dirs = vec![PathBuf::from("/no/such/dir")];
        let mut visited = 0;
        scan_spec_dirs(&dirs, &mut |_path, _result| visited += 1);
        assert_eq!(visited, 0);
    }
}
