// SPDX-FileCopyrightText: 2026 Larder Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-model usage statistics and the bounded selection log.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use larder_core::ComplexityLevel;
use serde::Serialize;

/// Running counters for one model.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ModelStats {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub total_tokens: u64,
    /// Mean latency of successful calls, in seconds.
    pub average_latency: f64,
    pub last_error: Option<String>,
    pub last_used: Option<DateTime<Utc>>,
}

impl ModelStats {
    /// Fraction of finished calls that succeeded; 1.0 before any call.
    pub fn success_rate(&self) -> f64 {
        let finished = self.successful_requests + self.failed_requests;
        if finished == 0 {
            1.0
        } else {
            self.successful_requests as f64 / finished as f64
        }
    }
}

/// One model selection, kept for diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectionMetric {
    pub query_length: usize,
    pub score: Option<f32>,
    pub level: Option<ComplexityLevel>,
    pub model: String,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

/// Thread-safe statistics shared by every call path, streams included.
pub struct StatsBook {
    models: DashMap<String, ModelStats>,
    selections: Mutex<VecDeque<SelectionMetric>>,
    capacity: usize,
}

impl StatsBook {
    pub fn new(selection_log_capacity: usize) -> Self {
        let capacity = selection_log_capacity.max(1);
        Self {
            models: DashMap::new(),
            selections: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    pub fn record_start(&self, model: &str) {
        let mut stats = self.models.entry(model.to_string()).or_default();
        stats.total_requests += 1;
        stats.last_used = Some(Utc::now());
    }

    pub fn record_success(&self, model: &str, latency: Duration, tokens: u64) {
        let mut stats = self.models.entry(model.to_string()).or_default();
        stats.successful_requests += 1;
        stats.total_tokens += tokens;
        let n = stats.successful_requests as f64;
        stats.average_latency += (latency.as_secs_f64() - stats.average_latency) / n;
    }

    pub fn record_failure(&self, model: &str, error: &str) {
        let mut stats = self.models.entry(model.to_string()).or_default();
        stats.failed_requests += 1;
        stats.last_error = Some(error.to_string());
    }

    pub fn model(&self, model: &str) -> ModelStats {
        self.models
            .get(model)
            .map(|s| s.value().clone())
            .unwrap_or_default()
    }

    /// Appends to the selection log, evicting the oldest entry when full.
    pub fn record_selection(&self, metric: SelectionMetric) {
        let mut log = self.selections.lock().unwrap_or_else(PoisonError::into_inner);
        while log.len() >= self.capacity {
            log.pop_front();
        }
        log.push_back(metric);
    }

    /// The retained selections, oldest first.
    pub fn selections(&self) -> Vec<SelectionMetric> {
        let log = self.selections.lock().unwrap_or_else(PoisonError::into_inner);
        log.iter().cloned().collect()
    }

    /// Drops entries beyond the capacity. Returns how many were removed.
    pub fn trim(&self) -> usize {
        let mut log = self.selections.lock().unwrap_or_else(PoisonError::into_inner);
        let excess = log.len().saturating_sub(self.capacity);
        log.drain(..excess);
        excess
    }

    pub fn totals(&self) -> (u64, u64) {
        self.models.iter().fold((0, 0), |(requests, tokens), entry| {
            (requests + entry.total_requests, tokens + entry.total_tokens)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metric(model: &str) -> SelectionMetric {
        SelectionMetric {
            query_length: 3,
            score: Some(0.1),
            level: Some(ComplexityLevel::Simple),
            model: model.to_string(),
            reason: "complexity match".to_string(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn counters_track_outcomes() {
        let book = StatsBook::new(10);
        book.record_start("m");
        book.record_success("m", Duration::from_millis(100), 12);
        book.record_start("m");
        book.record_success("m", Duration::from_millis(300), 8);
        book.record_start("m");
        book.record_failure("m", "boom");

        let stats = book.model("m");
        assert_eq!(stats.total_requests, 3);
        assert_eq!(stats.successful_requests, 2);
        assert_eq!(stats.failed_requests, 1);
        assert_eq!(stats.total_tokens, 20);
        assert!((stats.average_latency - 0.2).abs() < 1e-9);
        assert_eq!(stats.last_error.as_deref(), Some("boom"));
        assert!(stats.last_used.is_some());
        assert!((stats.success_rate() - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn unknown_model_has_empty_stats() {
        let book = StatsBook::new(10);
        assert_eq!(book.model("x"), ModelStats::default());
        assert_eq!(book.model("x").success_rate(), 1.0);
    }

    #[test]
    fn selection_log_is_bounded() {
        let book = StatsBook::new(3);
        for i in 0..5 {
            book.record_selection(metric(&format!("m{i}")));
        }
        let models: Vec<String> = book.selections().into_iter().map(|m| m.model).collect();
        assert_eq!(models, vec!["m2", "m3", "m4"]);
        assert_eq!(book.trim(), 0);
    }

    #[test]
    fn totals_sum_over_models() {
        let book = StatsBook::new(3);
        book.record_start("a");
        book.record_success("a", Duration::ZERO, 5);
        book.record_start("b");
        book.record_success("b", Duration::ZERO, 7);
        assert_eq!(book.totals(), (2, 12));
    }
}
