//! # trigger5-core
//!
//! Device core for Trigger 5 USB display adapters.
//!
//! This crate contains:
//! - **Mode**: the device `ModeCatalog`, `DisplayTiming` and the SET_MODE `ModeRequest`
//! - **Clock**: the exhaustive PLL search in `ClockSearchSpace::synthesize`
//! - **Frame**: `FrameHeader` and the full-frame RGB888 `FrameEncoder`
//! - **Transfer**: `TransferPipeline`, one in-flight bulk frame under a deadline
//! - **Device**: `Trigger5Device`, tying the above to a `UsbTransport`
//! - **Error**: `Trigger5Error`, a `thiserror`-based error enum

pub mod clock;
pub mod connector;
pub mod device;
pub mod error;
pub mod frame;
pub mod mode;
pub mod protocol;
pub mod transfer;
pub mod transport;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use clock::{
    ClockFit, ClockParameters, ClockSearchSpace, MAX_ERROR_PPM, REFERENCE_HZ, synthesize,
};
pub use connector::{ConnectorStatus, ConnectorType};
pub use device::{ActiveMode, DeviceConfig, ModeSelection, Trigger5Device, select_mode};
pub use error::Trigger5Error;
pub use frame::{
    EncodedFrame, FrameEncoder, FrameHeader, FrameSource, FrameSurface, PixelFormat, Rect,
};
pub use mode::{DeviceMode, DisplayTiming, MatchPolicy, ModeCatalog, ModeRequest, SyncFlags};
pub use transfer::{PipelineConfig, PipelineStats, TransferHandle, TransferPipeline, TransferStatus};
pub use transport::{
    BulkBehavior, ControlRequest, Direction, SimEvent, SimulatedAdapter, UsbTransport,
};
