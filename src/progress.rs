// Copyright 2026 Reelscan Contributors
// SPDX-License-Identifier: Apache-2.0

//! Progress event types and broadcast channel for live scan telemetry.
//!
//! The orchestrator emits `ScanEvent`s while a run is in flight, which flow
//! through a `tokio::sync::broadcast` channel to all subscribers (progress
//! bar, log tail). When no subscriber exists, events are silently dropped.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// A progress event emitted during a scan run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanEvent {
    /// The run ID this event belongs to.
    pub run_id: String,
    /// Monotonically increasing sequence number.
    pub seq: u64,
    /// The kind of progress event.
    pub event: ScanEventKind,
}

/// The specific kind of progress event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ScanEventKind {
    /// A run has been admitted and workers are spinning up.
    RunStarted {
        target_count: usize,
        catalog_size: usize,
    },
    /// One target entered its work unit.
    TargetStarted { name: String, url: String },
    /// One target reached its terminal record.
    TargetFinished {
        name: String,
        url: String,
        access_status: String,
        entities: usize,
        risk: String,
        completed: usize,
        total: usize,
        elapsed_ms: u64,
    },
    /// The whole run finished and the document is complete.
    RunFinished { records: usize, elapsed_ms: u64 },
    /// A non-fatal warning occurred.
    Warning { message: String },
}

/// Sender handle for emitting scan events.
///
/// Backed by a `tokio::sync::broadcast` channel so multiple listeners can
/// subscribe independently. When no listeners exist, `send()` returns an error
/// which we silently ignore (zero cost when nobody's watching).
pub type ProgressSender = tokio::sync::broadcast::Sender<ScanEvent>;

/// Receiver handle for consuming scan events.
pub type ProgressReceiver = tokio::sync::broadcast::Receiver<ScanEvent>;

/// Create a new progress broadcast channel with a bounded buffer.
///
/// A buffer of 256 events covers typical runs (two run events plus two
/// per target).
pub fn channel() -> (ProgressSender, ProgressReceiver) {
    tokio::sync::broadcast::channel(256)
}

/// Convenience helper: emit a scan event, silently ignoring send errors
/// (which occur when no receivers are listening). The sequence counter is
/// atomic so concurrent work units can share it.
pub fn emit(
    tx: &Option<ProgressSender>,
    run_id: &str,
    seq: &AtomicU64,
    event: ScanEventKind,
) {
    if let Some(ref sender) = tx {
        let _ = sender.send(ScanEvent {
            run_id: run_id.to_string(),
            seq: seq.fetch_add(1, Ordering::Relaxed) + 1,
            event,
        });
    }
}
