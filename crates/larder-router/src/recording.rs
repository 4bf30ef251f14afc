// SPDX-FileCopyrightText: 2026 Larder Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Metric registration and recording helpers.
//!
//! Uses the metrics-rs facade; without an installed recorder every call is
//! a no-op.

use metrics::{describe_counter, describe_gauge, describe_histogram};

/// Registers all Larder metric descriptions. Call once at startup.
pub fn register_metrics() {
    describe_counter!(
        "larder_model_requests_total",
        "Backend calls per model, labelled by outcome"
    );
    describe_histogram!(
        "larder_model_latency_seconds",
        "Backend call latency in seconds"
    );
    describe_counter!(
        "larder_selection_total",
        "Model selections by complexity level and reason"
    );
    describe_counter!(
        "larder_fallback_transitions_total",
        "Fallback chain state transitions"
    );
    describe_gauge!(
        "larder_model_slots_available",
        "Free concurrency slots per model"
    );
}

pub fn record_request(model: &str, outcome: &'static str) {
    metrics::counter!(
        "larder_model_requests_total",
        "model" => model.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_latency(model: &str, seconds: f64) {
    metrics::histogram!("larder_model_latency_seconds", "model" => model.to_string())
        .record(seconds);
}

pub fn record_selection(level: &str, reason: &'static str) {
    metrics::counter!(
        "larder_selection_total",
        "level" => level.to_string(),
        "reason" => reason
    )
    .increment(1);
}

pub fn record_fallback_transition(from: &str, to: &str) {
    metrics::counter!(
        "larder_fallback_transitions_total",
        "from" => from.to_string(),
        "to" => to.to_string()
    )
    .increment(1);
}

pub fn set_slots_available(model: &str, available: usize) {
    metrics::gauge!("larder_model_slots_available", "model" => model.to_string())
        .set(available as f64);
}
