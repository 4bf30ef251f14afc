// SPDX-FileCopyrightText: 2026 Larder Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-model concurrency limits.
//!
//! Each model owns a semaphore sized to its concurrency limit. A call holds
//! a [`ModelPermit`] for its whole duration; dropping the permit (normal
//! return, error, cancellation, or a dropped stream) frees the slot.

use std::collections::HashMap;
use std::sync::Arc;

use larder_core::LarderError;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::recording;
use crate::registry::ModelRegistry;

struct Slots {
    limit: usize,
    semaphore: Arc<Semaphore>,
}

/// Bounds in-flight calls per model.
///
/// The set of models is fixed at construction; enabling or disabling a
/// model in the registry does not change its slots.
pub struct ConcurrencyGovernor {
    slots: HashMap<String, Slots>,
}

impl ConcurrencyGovernor {
    pub fn new(registry: &ModelRegistry) -> Self {
        let slots = registry
            .models()
            .iter()
            .map(|model| {
                recording::set_slots_available(&model.name, model.concurrency_limit);
                (
                    model.name.clone(),
                    Slots {
                        limit: model.concurrency_limit,
                        semaphore: Arc::new(Semaphore::new(model.concurrency_limit)),
                    },
                )
            })
            .collect();
        Self { slots }
    }

    fn slots(&self, model: &str) -> Result<&Slots, LarderError> {
        self.slots
            .get(model)
            .ok_or_else(|| LarderError::UnknownModel(model.to_string()))
    }

    /// Takes a slot only if one is free right now.
    pub fn try_acquire(&self, model: &str) -> Result<ModelPermit, LarderError> {
        let slots = self.slots(model)?;
        match slots.semaphore.clone().try_acquire_owned() {
            Ok(permit) => Ok(ModelPermit::new(model, permit, slots.semaphore.clone())),
            Err(TryAcquireError::NoPermits) => Err(LarderError::CapacitySaturated {
                model: model.to_string(),
            }),
            Err(TryAcquireError::Closed) => Err(LarderError::Internal(format!(
                "slot pool for {model} is closed"
            ))),
        }
    }

    /// Waits for a slot, giving up if `cancel` fires first.
    pub async fn acquire(
        &self,
        model: &str,
        cancel: &CancellationToken,
    ) -> Result<ModelPermit, LarderError> {
        let slots = self.slots(model)?;
        debug!(model, available = slots.semaphore.available_permits(), "waiting for model slot");
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(LarderError::Cancelled),
            permit = slots.semaphore.clone().acquire_owned() => {
                let permit = permit.map_err(|_| {
                    LarderError::Internal(format!("slot pool for {model} is closed"))
                })?;
                Ok(ModelPermit::new(model, permit, slots.semaphore.clone()))
            }
        }
    }

    /// Free slots for `model`, or zero for an unknown model.
    pub fn available(&self, model: &str) -> usize {
        self.slots
            .get(model)
            .map(|s| s.semaphore.available_permits())
            .unwrap_or(0)
    }

    pub fn limit(&self, model: &str) -> Option<usize> {
        self.slots.get(model).map(|s| s.limit)
    }

    /// Calls currently holding a slot for `model`.
    pub fn in_flight(&self, model: &str) -> usize {
        self.slots
            .get(model)
            .map(|s| s.limit - s.semaphore.available_permits())
            .unwrap_or(0)
    }
}

/// A held concurrency slot. Released on drop.
pub struct ModelPermit {
    model: String,
    semaphore: Arc<Semaphore>,
    permit: Option<OwnedSemaphorePermit>,
}

impl ModelPermit {
    fn new(model: &str, permit: OwnedSemaphorePermit, semaphore: Arc<Semaphore>) -> Self {
        recording::set_slots_available(model, semaphore.available_permits());
        Self {
            model: model.to_string(),
            semaphore,
            permit: Some(permit),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

impl std::fmt::Debug for ModelPermit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelPermit")
            .field("model", &self.model)
            .finish()
    }
}

impl Drop for ModelPermit {
    fn drop(&mut self) {
        drop(self.permit.take());
        recording::set_slots_available(&self.model, self.semaphore.available_permits());
    }
}
