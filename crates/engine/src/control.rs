// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-scan control: the {running, paused, cancelled} state machine with
//! a checkpoint barrier and a cancellation token.
//!
//! Workers call [`ScanControl::checkpoint`] at safe pre-emption points.
//! The barrier is a watch channel: every transition is broadcast, each
//! waiter re-reads the state on wake, so a resumed worker can never
//! return true after a cancel, and dropping a receiver can never leak a
//! waiter.

use kestrel_core::{ScanId, ScanStatus};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// In-memory run state of one scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlState {
    Running,
    Paused,
    Cancelled,
}

kestrel_core::simple_display! {
    ControlState {
        Running => "running",
        Paused => "paused",
        Cancelled => "cancelled",
    }
}

impl ControlState {
    /// State a control starts in for a scan persisted with `status`.
    pub fn for_status(status: ScanStatus) -> ControlState {
        match status {
            ScanStatus::Paused => ControlState::Paused,
            s if s.is_terminal() => ControlState::Cancelled,
            _ => ControlState::Running,
        }
    }
}

/// Control record for one active or paused scan.
#[derive(Debug)]
pub struct ScanControl {
    scan_id: ScanId,
    state: watch::Sender<ControlState>,
    cancel: CancellationToken,
}

impl ScanControl {
    pub fn new(scan_id: ScanId, initial: ControlState) -> Self {
        let (state, _) = watch::channel(initial);
        let cancel = CancellationToken::new();
        if initial == ControlState::Cancelled {
            cancel.cancel();
        }
        Self { scan_id, state, cancel }
    }

    pub fn scan_id(&self) -> ScanId {
        self.scan_id
    }

    pub fn state(&self) -> ControlState {
        *self.state.borrow()
    }

    pub fn is_running(&self) -> bool {
        self.state() == ControlState::Running
    }

    pub fn is_paused(&self) -> bool {
        self.state() == ControlState::Paused
    }

    pub fn is_cancelled(&self) -> bool {
        self.state() == ControlState::Cancelled
    }

    /// Cancellation signal for network calls that outlive a checkpoint.
    /// Triggered exactly once, on entry to cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// running → paused. Ignored when cancelled.
    pub fn set_paused(&self) -> bool {
        self.state.send_if_modified(|s| match *s {
            ControlState::Running => {
                *s = ControlState::Paused;
                true
            }
            _ => false,
        })
    }

    /// paused → running, waking every checkpoint waiter. Ignored when cancelled.
    pub fn set_running(&self) -> bool {
        self.state.send_if_modified(|s| match *s {
            ControlState::Paused => {
                *s = ControlState::Running;
                true
            }
            _ => false,
        })
    }

    /// running/paused → cancelled. Terminal: wakes every waiter and fires
    /// the cancellation token.
    pub fn set_cancelled(&self) -> bool {
        let changed = self.state.send_if_modified(|s| {
            if *s == ControlState::Cancelled {
                false
            } else {
                *s = ControlState::Cancelled;
                true
            }
        });
        if changed {
            self.cancel.cancel();
        }
        changed
    }

    /// Cooperative yield point.
    ///
    /// Returns true immediately while running, false immediately when
    /// cancelled, and blocks while paused until one of the two holds.
    pub async fn checkpoint(&self) -> bool {
        let mut rx = self.state.subscribe();
        loop {
            match *rx.borrow_and_update() {
                ControlState::Running => return true,
                ControlState::Cancelled => return false,
                ControlState::Paused => {}
            }
            if rx.changed().await.is_err() {
                // Control dropped while we waited: treat as cancelled.
                return false;
            }
        }
    }

    /// [`checkpoint`](Self::checkpoint) that additionally observes an
    /// external token; returns false as soon as either side cancels.
    pub async fn checkpoint_with_cancel(&self, external: &CancellationToken) -> bool {
        if external.is_cancelled() {
            return false;
        }
        tokio::select! {
            _ = external.cancelled() => false,
            resumed = self.checkpoint() => resumed,
        }
    }
}

#[cfg(test)]
#[path = "control_tests.rs"]
mod tests;
