// Copyright (c) 2023 Alibaba Cloud
//
// SPDX-License-Identifier: Apache-2.0
//

//! Shared helpers for unit tests.

use std::sync::Once;

static LOGGING: Once = Once::new();

/// Installs a discarding global logger so code paths that log can run
/// under the test harness. Safe to call from any number of tests.
pub(crate) fn setup_logging() {
    LOGGING.call_once(|| {
        let guard = slog_scope::set_global_logger(slog::Logger::root(slog::Discard, o!()));
        guard.cancel_reset();
    });
}
