// SPDX-FileCopyrightText: 2026 Larder Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Base lifecycle trait for adapters owned by the process root.

use async_trait::async_trait;

use crate::error::LarderError;
use crate::types::{AdapterType, HealthStatus};

/// Identity, health, and shutdown hooks shared by long-lived adapters.
///
/// The process root creates each adapter once and calls [`shutdown`] when
/// the orchestrator stops.
///
/// [`shutdown`]: PluginAdapter::shutdown
#[async_trait]
pub trait PluginAdapter: Send + Sync + 'static {
    /// Human-readable name of this adapter instance.
    fn name(&self) -> &str;

    /// Semantic version of this adapter.
    fn version(&self) -> semver::Version;

    /// Which seam this adapter plugs into.
    fn adapter_type(&self) -> AdapterType;

    /// Performs a health check and returns the adapter's current status.
    async fn health_check(&self) -> Result<HealthStatus, LarderError>;

    /// Releases held resources (connection pools, background tasks).
    async fn shutdown(&self) -> Result<(), LarderError>;
}
