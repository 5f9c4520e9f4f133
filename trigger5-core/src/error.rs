//! Domain-specific error types for the Trigger 5 device core.
//!
//! All fallible operations return `Result<T, Trigger5Error>`.
//! Per-frame transfer outcomes are not errors; see
//! [`TransferStatus`](crate::transfer::TransferStatus).

use std::time::Duration;
use thiserror::Error;

/// The canonical error type for the device core.
#[derive(Debug, Error)]
pub enum Trigger5Error {
    // ── Transport Errors ─────────────────────────────────────────
    /// A control or bulk transfer was rejected by the USB layer.
    #[error("transport error during {context}: {message}")]
    Transport {
        context: &'static str,
        message: String,
    },

    /// The device answered a control request with fewer bytes than needed.
    #[error("short response: expected {expected} bytes, got {actual}")]
    ShortResponse { expected: usize, actual: usize },

    /// An operation exceeded its deadline.
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    // ── Mode Errors ──────────────────────────────────────────────
    /// The device reported an empty mode catalog.
    #[error("device reported no modes")]
    NoModesAvailable,

    /// No catalog entry matches the requested timing.
    #[error("no device mode for {width}x{height}@{refresh_hz}")]
    NoMatchingMode {
        width: u16,
        height: u16,
        refresh_hz: u32,
    },

    /// The clock synthesizer cannot get close enough to the pixel clock.
    #[error("pixel clock out of range: {ppm} ppm error")]
    ClockOutOfRange { ppm: u64 },

    // ── Frame Errors ─────────────────────────────────────────────
    /// The transfer buffer could not be sized for the frame.
    #[error("cannot allocate {len} byte transfer buffer")]
    AllocationFailure { len: usize },

    /// The surface is not in the packed 32-bit RGB layout.
    #[error("unsupported pixel format")]
    UnsupportedFormat,

    /// The surface buffer is shorter than its geometry implies.
    #[error("surface too small: need {needed} bytes, have {actual}")]
    SurfaceTooSmall { needed: usize, actual: usize },

    /// A bulk header did not parse.
    #[error("invalid header: {0}")]
    InvalidHeader(&'static str),

    // ── Lifecycle Errors ─────────────────────────────────────────
    /// The device was detached; no further operations are accepted.
    #[error("device detached")]
    Detached,

    /// The operation was cancelled before it completed.
    #[error("operation cancelled")]
    Cancelled,
}

impl Trigger5Error {
    /// Shorthand for a [`Trigger5Error::Transport`] error.
    pub fn transport(context: &'static str, message: impl Into<String>) -> Self {
        Trigger5Error::Transport {
            context,
            message: message.into(),
        }
    }

    /// Whether the error means the device rejected the requested timing.
    pub fn is_mode_rejection(&self) -> bool {
        matches!(
            self,
            Trigger5Error::NoModesAvailable
                | Trigger5Error::NoMatchingMode { .. }
                | Trigger5Error::ClockOutOfRange { .. }
        )
    }
}

impl From<std::io::Error> for Trigger5Error {
    fn from(e: std::io::Error) -> Self {
        Trigger5Error::transport("io", e.to_string())
    }
}
