// SPDX-FileCopyrightText: 2026 Larder Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Multi-model routing for Larder.
//!
//! - [`ComplexityClassifier`]: heuristic, monotonic complexity levels
//! - [`ModelRegistry`]: the model table, swapped atomically on admin changes
//! - [`ConcurrencyGovernor`]: per-model in-flight limits
//! - [`HybridClient`]: classify, select, throttle, and call in one place

pub mod classifier;
pub mod governor;
pub mod hybrid;
pub mod recording;
pub mod registry;
pub mod selector;
pub mod stats;
pub mod stream;

pub use classifier::{ComplexityAssessment, ComplexityClassifier};
pub use governor::{ConcurrencyGovernor, ModelPermit};
pub use hybrid::{
    CompletionOptions, CompletionOutcome, HybridClient, HybridSettings, MaintenanceReport,
    ModelStatus,
};
pub use registry::{ModelConfig, ModelRegistry};
pub use selector::{SelectionDecision, SelectionReason};
pub use stats::{ModelStats, SelectionMetric};
pub use stream::CompletionStream;
