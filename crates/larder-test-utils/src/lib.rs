// SPDX-FileCopyrightText: 2026 Larder Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Larder integration tests.
//!
//! Provides mock adapters and test harness infrastructure for fast,
//! deterministic tests without a running model server.
//!
//! # Components
//!
//! - [`MockBackend`] - Scripted model backend with call and concurrency tracking
//! - [`RecordingAlertSink`] - Alert sink that keeps every alert
//! - [`TestHarness`] - Orchestrator wired over the mocks

pub mod harness;
pub mod mock_alerts;
pub mod mock_backend;

pub use harness::{LARGE_MODEL, SMALL_MODEL, TEST_SESSION, TestHarness, TestHarnessBuilder};
pub use mock_alerts::{RecordedAlert, RecordingAlertSink};
pub use mock_backend::{CallKind, MockBackend, MockReply, RecordedCall};
