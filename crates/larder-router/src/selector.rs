// SPDX-FileCopyrightText: 2026 Larder Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Model selection for a complexity level.
//!
//! Walks the enabled models that support the level in priority order and
//! reserves a slot on the first one that has capacity. A saturated model
//! is skipped. When every candidate is saturated the top candidate is
//! returned without a slot and the caller queues on it.

use std::fmt;

use larder_core::ComplexityLevel;
use serde::Serialize;
use tracing::{debug, warn};

use crate::governor::{ConcurrencyGovernor, ModelPermit};
use crate::registry::ModelRegistry;

/// Why a model was chosen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SelectionReason {
    /// The caller named the model.
    ExplicitOverride,
    /// Highest-preference candidate for the level with a free slot.
    ComplexityMatch { skipped: Vec<String> },
    /// Every candidate was saturated; the call waits on the top one.
    AllSaturated,
    /// No enabled model supports the level.
    Fallback,
}

impl fmt::Display for SelectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExplicitOverride => write!(f, "explicit override"),
            Self::ComplexityMatch { skipped } if skipped.is_empty() => {
                write!(f, "complexity match")
            }
            Self::ComplexityMatch { skipped } => {
                write!(f, "complexity match (skipped saturated: {})", skipped.join(", "))
            }
            Self::AllSaturated => write!(f, "all candidates saturated; queued on top candidate"),
            Self::Fallback => write!(f, "fallback: no model supports level"),
        }
    }
}

impl SelectionReason {
    /// Low-cardinality label for metrics.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::ExplicitOverride => "explicit_override",
            Self::ComplexityMatch { .. } => "complexity_match",
            Self::AllSaturated => "all_saturated",
            Self::Fallback => "fallback",
        }
    }
}

/// The model chosen for a call and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SelectionDecision {
    pub model: String,
    pub level: Option<ComplexityLevel>,
    pub reason: SelectionReason,
}

/// A decision plus the slot reserved for it, if one was free.
#[derive(Debug)]
pub struct Selection {
    pub decision: SelectionDecision,
    pub permit: Option<ModelPermit>,
}

/// Picks a model for `level` from one registry snapshot.
pub fn select(
    registry: &ModelRegistry,
    governor: &ConcurrencyGovernor,
    level: ComplexityLevel,
) -> Selection {
    let mut skipped = Vec::new();
    let mut top = None;

    for model in registry.candidates(level) {
        if top.is_none() {
            top = Some(model.name.clone());
        }
        match governor.try_acquire(&model.name) {
            Ok(permit) => {
                debug!(model = %model.name, %level, skipped = skipped.len(), "model selected");
                return Selection {
                    decision: SelectionDecision {
                        model: model.name.clone(),
                        level: Some(level),
                        reason: SelectionReason::ComplexityMatch { skipped },
                    },
                    permit: Some(permit),
                };
            }
            Err(_) => skipped.push(model.name.clone()),
        }
    }

    if let Some(model) = top {
        debug!(model = %model, %level, "all candidates saturated");
        return Selection {
            decision: SelectionDecision {
                model,
                level: Some(level),
                reason: SelectionReason::AllSaturated,
            },
            permit: None,
        };
    }

    let fallback = registry.default_model();
    warn!(model = %fallback.name, %level, "no enabled model supports level, using default");
    Selection {
        decision: SelectionDecision {
            model: fallback.name.clone(),
            level: Some(level),
            reason: SelectionReason::Fallback,
        },
        permit: governor.try_acquire(&fallback.name).ok(),
    }
}

/// A caller-pinned model, bypassing complexity filtering.
pub fn explicit(governor: &ConcurrencyGovernor, model: &str) -> Selection {
    Selection {
        decision: SelectionDecision {
            model: model.to_string(),
            level: None,
            reason: SelectionReason::ExplicitOverride,
        },
        permit: governor.try_acquire(model).ok(),
    }
}
