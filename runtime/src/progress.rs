// Copyright 2026 PlaceRank Contributors
// SPDX-License-Identifier: Apache-2.0

//! Progress event types and broadcast channel for live sweep telemetry.
//!
//! The scheduler emits `ProgressEvent`s while it runs, which flow through a
//! `tokio::sync::broadcast` channel to all subscribers (progress bar, SSE
//! clients). When no subscriber exists, events are silently dropped.

use placerank::{Hit, MapVariant};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A progress event emitted during a sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// The sweep this event belongs to.
    pub sweep_id: String,
    /// Monotonically increasing sequence number.
    pub seq: u64,
    /// The kind of progress event.
    pub event: ProgressEventKind,
}

/// The specific kind of progress event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ProgressEventKind {
    SweepStarted {
        business_id: String,
        business_name: String,
        /// `None` for an unbounded generator.
        remaining: Option<usize>,
        resumed_hits: usize,
    },
    /// Keywords dropped by the location filter.
    Filtered {
        skipped: usize,
        total_skipped: usize,
        sample: Vec<String>,
    },
    /// One keyword evaluated, successful or not.
    CandidateChecked {
        checked: u64,
        keyword: String,
        rank: Option<u8>,
        map_variant: Option<MapVariant>,
        load_failed: bool,
        new_hit: bool,
        hit_count: usize,
        current_hits: usize,
        legacy_hits: usize,
        target_reached: bool,
        remaining: Option<usize>,
    },
    /// The serial retry pass is starting.
    RetryPass { queued: usize },
    CheckpointSaved { path: PathBuf, hits: usize },
    SweepFinished {
        checked: u64,
        hits: Vec<Hit>,
        remaining: usize,
        stopped: bool,
        skipped: bool,
        target_reached: bool,
        elapsed_ms: u64,
    },
    /// A non-fatal warning occurred.
    Warning { message: String },
}

/// Sender handle for emitting progress events.
///
/// When no listeners exist, `send()` returns an error which is ignored.
pub type ProgressSender = tokio::sync::broadcast::Sender<ProgressEvent>;

/// Receiver handle for consuming progress events.
pub type ProgressReceiver = tokio::sync::broadcast::Receiver<ProgressEvent>;

/// Create a new progress broadcast channel with a bounded buffer.
pub fn channel() -> (ProgressSender, ProgressReceiver) {
    tokio::sync::broadcast::channel(256)
}

/// Emit a progress event, silently ignoring send errors (which occur when
/// no receivers are listening).
pub fn emit(tx: &Option<ProgressSender>, sweep_id: &str, seq: &mut u64, event: ProgressEventKind) {
    if let Some(ref sender) = tx {
        *seq += 1;
        let _ = sender.send(ProgressEvent {
            sweep_id: sweep_id.to_string(),
            seq: *seq,
            event,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_json_diff::assert_json_eq;
    use serde_json::json;

    #[test]
    fn test_candidate_checked_shape() {
        let event = ProgressEvent {
            sweep_id: "sw-1".to_string(),
            seq: 3,
            event: ProgressEventKind::CandidateChecked {
                checked: 12,
                keyword: "광안리 칼국수".to_string(),
                rank: Some(2),
                map_variant: Some(MapVariant::Current),
                load_failed: false,
                new_hit: true,
                hit_count: 4,
                current_hits: 3,
                legacy_hits: 1,
                target_reached: false,
                remaining: Some(88),
            },
        };
        assert_json_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({
                "sweep_id": "sw-1",
                "seq": 3,
                "event": {
                    "type": "CandidateChecked",
                    "checked": 12,
                    "keyword": "광안리 칼국수",
                    "rank": 2,
                    "map_variant": "current",
                    "load_failed": false,
                    "new_hit": true,
                    "hit_count": 4,
                    "current_hits": 3,
                    "legacy_hits": 1,
                    "target_reached": false,
                    "remaining": 88
                }
            })
        );
    }

    #[test]
    fn test_roundtrip_keeps_tag() {
        let event = ProgressEvent {
            sweep_id: "sw-2".to_string(),
            seq: 1,
            event: ProgressEventKind::RetryPass { queued: 7 },
        };
        let text = serde_json::to_string(&event).unwrap();
        assert!(text.contains("\"type\":\"RetryPass\""));
        let back: ProgressEvent = serde_json::from_str(&text).unwrap();
        assert!(matches!(back.event, ProgressEventKind::RetryPass { queued: 7 }));
    }

    #[test]
    fn test_emit_without_receivers() {
        let (tx, rx) = channel();
        drop(rx);
        let mut seq = 0;
        emit(&Some(tx), "test", &mut seq, ProgressEventKind::Warning { message: "x".into() });
        assert_eq!(seq, 1);
    }

    #[test]
    fn test_emit_none_sender() {
        let mut seq = 0;
        emit(&None, "test", &mut seq, ProgressEventKind::Warning { message: "x".into() });
        assert_eq!(seq, 0);
    }
}
