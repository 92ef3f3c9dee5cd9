// Copyright (c) 2023 Alibaba Cloud
//
// SPDX-License-Identifier: Apache-2.0
//

use std::path::PathBuf;
use std::sync::Arc;

/// Errors reported by the CDI registry and injector.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed JSON/YAML content or an unparsable device reference.
    #[error("{0}")]
    Parse(String),

    /// A spec violated a structural or semantic constraint.
    #[error("{0}")]
    Validation(String),

    /// The spec declares a schema revision this crate does not know.
    #[error("invalid version {0:?}")]
    Version(String),

    /// Two equal-priority specs declare the same qualified device name.
    #[error("conflicting device {name:?} (specs {path:?}, {other_path:?})")]
    Conflict {
        name: String,
        path: PathBuf,
        other_path: PathBuf,
    },

    /// An injection request named devices unknown to the cache.
    #[error("unresolvable CDI devices {}", .unresolved.join(", "))]
    NotFound { unresolved: Vec<String> },

    /// Directory enumeration, file read or watcher failure.
    #[error("{context}: {error}")]
    Io { context: String, error: String },

    /// Container edits could not be applied to the runtime configuration.
    #[error("{0}")]
    Apply(String),

    /// Malformed annotation key or value in the device request protocol.
    #[error("{0}")]
    Annotation(String),

    /// A collection of per-file errors from a single refresh.
    #[error("{}", join_errors(.0))]
    Multi(Vec<Arc<Error>>),
}

impl Error {
    pub(crate) fn io(context: impl Into<String>, error: std::io::Error) -> Self {
        Error::Io {
            context: context.into(),
            error: error.to_string(),
        }
    }
}

fn join_errors(errors: &[Arc<Error>]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Specialized `Result` for CDI operations.
pub type Result<T> = std::result::Result<T, Error>;
