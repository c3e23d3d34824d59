// Copyright 2026 PlaceRank Contributors
// SPDX-License-Identifier: Apache-2.0

//! Cooperative pause/resume/stop/skip token for a running sweep.
//!
//! Signals are polled between concurrency windows and between retries;
//! an in-flight fetch always completes.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ControlState {
    pub paused: bool,
    pub stop: bool,
    pub skip: bool,
}

impl ControlState {
    /// Stop or skip was requested.
    pub fn ends_sweep(&self) -> bool {
        self.stop || self.skip
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlAction {
    Pause,
    Resume,
    Stop,
    Skip,
}

/// Shared handle; clones control the same sweep.
#[derive(Clone)]
pub struct SweepControl {
    tx: Arc<watch::Sender<ControlState>>,
}

impl Default for SweepControl {
    fn default() -> Self {
        Self::new()
    }
}

impl SweepControl {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(ControlState::default());
        Self { tx: Arc::new(tx) }
    }

    pub fn apply(&self, action: ControlAction) {
        tracing::info!(?action, "sweep control");
        self.tx.send_modify(|s| match action {
            ControlAction::Pause => s.paused = true,
            ControlAction::Resume => s.paused = false,
            ControlAction::Stop => s.stop = true,
            ControlAction::Skip => s.skip = true,
        });
    }

    pub fn stop(&self) {
        self.apply(ControlAction::Stop);
    }

    pub fn snapshot(&self) -> ControlState {
        *self.tx.borrow()
    }

    /// Clear a skip so the next profile of a batch can run.
    pub fn reset_skip(&self) {
        self.tx.send_modify(|s| s.skip = false);
    }

    /// Block while paused. Returns early on stop or skip.
    pub async fn wait_while_paused(&self) {
        let mut rx = self.tx.subscribe();
        let _ = rx.wait_for(|s| !s.paused || s.ends_sweep()).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_resume_releases_waiter() {
        let control = SweepControl::new();
        control.apply(ControlAction::Pause);

        let waiter = control.clone();
        let handle = tokio::spawn(async move { waiter.wait_while_paused().await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!handle.is_finished());

        control.apply(ControlAction::Resume);
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_stop_releases_paused_waiter() {
        let control = SweepControl::new();
        control.apply(ControlAction::Pause);
        control.stop();
        tokio::time::timeout(Duration::from_secs(1), control.wait_while_paused())
            .await
            .unwrap();
        assert!(control.snapshot().ends_sweep());
    }

    #[test]
    fn test_reset_skip_keeps_stop() {
        let control = SweepControl::new();
        control.apply(ControlAction::Skip);
        control.stop();
        control.reset_skip();
        let s = control.snapshot();
        assert!(!s.skip);
        assert!(s.stop);
    }

    #[test]
    fn test_action_serde() {
        let a: ControlAction = serde_json::from_str("\"pause\"").unwrap();
        assert_eq!(a, ControlAction::Pause);
    }
}
