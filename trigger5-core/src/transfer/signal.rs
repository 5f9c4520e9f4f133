//! Single-slot completion signal for the transfer pipeline.
//!
//! ```text
//!  Idle ──► Sending ──► Completed(status) ──► Idle
//!              │                                ▲
//!              └──────── (abandoned) ───────────┘
//! ```
//!
//! The slot starts out `Idle`, which waiters treat the same as a
//! completed transfer. Completion is published at most once per frame:
//! a late completion for a frame that is no longer the one in the slot
//! is ignored.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::error::Trigger5Error;

// ── TransferStatus ───────────────────────────────────────────────

/// Terminal outcome of one bulk transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferStatus {
    /// The transport accepted every byte.
    Completed { bytes: usize },
    /// The deadline expired and the transfer was cancelled.
    TimedOut,
    /// The device was detached while the transfer was in flight.
    Cancelled,
    /// The transport reported an error.
    Failed(String),
}

impl TransferStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

// ── SlotPhase ────────────────────────────────────────────────────

/// Phase of the device update slot.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SlotPhase {
    #[default]
    Idle,
    Sending { frame: u64 },
    Completed { frame: u64, status: TransferStatus },
}

impl std::fmt::Display for SlotPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Sending { frame } => write!(f, "Sending({frame})"),
            Self::Completed { frame, .. } => write!(f, "Completed({frame})"),
        }
    }
}

impl SlotPhase {
    pub fn is_sending(&self) -> bool {
        matches!(self, Self::Sending { .. })
    }
}

// ── CompletionSignal ─────────────────────────────────────────────

/// Shared handle to the slot. Clones observe the same slot.
#[derive(Debug, Clone)]
pub struct CompletionSignal {
    tx: Arc<watch::Sender<SlotPhase>>,
}

impl Default for CompletionSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl CompletionSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(SlotPhase::Idle);
        Self { tx: Arc::new(tx) }
    }

    pub fn phase(&self) -> SlotPhase {
        self.tx.borrow().clone()
    }

    /// Whether a transfer is still outstanding.
    pub fn is_pending(&self) -> bool {
        self.tx.borrow().is_sending()
    }

    /// Transition to `Sending`.
    ///
    /// Valid from: `Idle`, `Completed`.
    pub fn begin(&self, frame: u64) -> Result<(), Trigger5Error> {
        let mut started = false;
        self.tx.send_if_modified(|phase| {
            if phase.is_sending() {
                return false;
            }
            *phase = SlotPhase::Sending { frame };
            started = true;
            true
        });
        if started {
            Ok(())
        } else {
            Err(Trigger5Error::transport(
                "bulk submit",
                "previous transfer still in flight",
            ))
        }
    }

    /// Replace a stuck `Sending` phase with a new frame. The stuck
    /// transfer's completion will be ignored.
    pub fn abandon_and_begin(&self, frame: u64) -> Option<u64> {
        let previous = match &*self.tx.borrow() {
            SlotPhase::Sending { frame } => Some(*frame),
            _ => None,
        };
        self.tx.send_replace(SlotPhase::Sending { frame });
        previous
    }

    /// Publish the outcome of `frame`.
    ///
    /// Returns `false` if `frame` is not the transfer in the slot; the
    /// status is then dropped.
    pub fn complete(&self, frame: u64, status: TransferStatus) -> bool {
        self.tx.send_if_modified(|phase| match phase {
            SlotPhase::Sending { frame: current } if *current == frame => {
                *phase = SlotPhase::Completed { frame, status };
                true
            }
            _ => false,
        })
    }

    /// Consume a `Completed` phase, returning the slot to `Idle`.
    pub fn acknowledge(&self) -> Option<(u64, TransferStatus)> {
        let mut taken = None;
        self.tx.send_if_modified(|phase| {
            if let SlotPhase::Completed { frame, status } = phase {
                taken = Some((*frame, status.clone()));
                *phase = SlotPhase::Idle;
                true
            } else {
                false
            }
        });
        taken
    }

    /// Wait until no transfer is outstanding, for at most `timeout`.
    ///
    /// Returns `false` if the wait budget ran out.
    pub async fn wait(&self, timeout: Duration) -> bool {
        let mut rx = self.tx.subscribe();
        matches!(
            tokio::time::timeout(timeout, rx.wait_for(|p| !p.is_sending())).await,
            Ok(Ok(_))
        )
    }
}

// ── Tests ────────────────────────────────────────────────────────
