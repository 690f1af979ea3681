// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Kernel configuration.
//!
//! Plain data with serde support so an embedding application can load it
//! from whatever configuration source it already uses; the kernel itself
//! does not read files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::auth::Strategy;
use crate::session::validator::DEFAULT_VALIDATION_INTERVAL;
use crate::session::DEFAULT_SESSION_TIMEOUT;

/// Tunables for a [`SecurityKernel`](crate::kernel::SecurityKernel).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    /// Idle timeout applied to newly created sessions. `None` means new
    /// sessions never expire.
    pub session_timeout: Option<Duration>,

    /// Interval between background validation scans.
    pub validation_interval: Duration,

    /// Whether the background validator starts with the kernel.
    pub validation_enabled: bool,

    /// How long stopped/expired sessions are retained for late reads
    /// before the validator sweeps them. Zero disables retention.
    pub terminal_session_retention: Duration,

    /// Whether the kernel's cache manager hands out live caches. When
    /// `false` every cache is a no-op and all lookups go to the realms.
    pub caching_enabled: bool,

    /// How per-realm authentication outcomes aggregate.
    pub strategy: Strategy,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            session_timeout: Some(DEFAULT_SESSION_TIMEOUT),
            validation_interval: DEFAULT_VALIDATION_INTERVAL,
            validation_enabled: true,
            terminal_session_retention: Duration::from_secs(10 * 60),
            caching_enabled: true,
            strategy: Strategy::FirstSuccess,
        }
    }
}
