//! USB transport seam.
//!
//! The core never talks to a USB stack directly. The owner supplies an
//! implementation of [`UsbTransport`]; [`sim::SimulatedAdapter`] is the
//! in-crate implementation used by the tool and the tests.

pub mod sim;

use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::Trigger5Error;
use crate::protocol::{REQUEST_TYPE_VENDOR_IN, REQUEST_TYPE_VENDOR_OUT};

pub use sim::{BulkBehavior, SimEvent, SimulatedAdapter};

// ── Direction ────────────────────────────────────────────────────

/// Data stage direction of a control transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Device-to-host.
    In,
    /// Host-to-device.
    Out,
}

// ── ControlRequest ───────────────────────────────────────────────

/// Setup packet of a vendor control transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ControlRequest {
    pub direction: Direction,
    pub request: u8,
    pub value: u16,
    pub index: u16,
}

impl ControlRequest {
    /// A device-to-host vendor request.
    pub const fn vendor_in(request: u8, value: u16, index: u16) -> Self {
        Self {
            direction: Direction::In,
            request,
            value,
            index,
        }
    }

    /// A host-to-device vendor request.
    pub const fn vendor_out(request: u8, value: u16, index: u16) -> Self {
        Self {
            direction: Direction::Out,
            request,
            value,
            index,
        }
    }

    /// The bmRequestType byte for this request.
    pub const fn request_type(&self) -> u8 {
        match self.direction {
            Direction::In => REQUEST_TYPE_VENDOR_IN,
            Direction::Out => REQUEST_TYPE_VENDOR_OUT,
        }
    }
}

// ── UsbTransport ─────────────────────────────────────────────────

/// Control and bulk primitives the core needs from the USB layer.
///
/// Implementations must be safe to share between the mode-change path
/// and the background transfer task.
#[async_trait]
pub trait UsbTransport: Send + Sync {
    /// Issue an IN control transfer and return up to `length` bytes.
    async fn control_in(
        &self,
        request: ControlRequest,
        length: usize,
    ) -> Result<Vec<u8>, Trigger5Error>;

    /// Issue an OUT control transfer carrying `data`.
    async fn control_out(&self, request: ControlRequest, data: &[u8])
    -> Result<(), Trigger5Error>;

    /// Deliver `data` to a bulk OUT endpoint.
    ///
    /// `cancel` fires when the caller's deadline expires or the device
    /// is detached. Implementations should abort the transfer as soon as
    /// practical; the caller stops polling the future either way.
    async fn bulk_out(
        &self,
        endpoint: u8,
        data: &[u8],
        cancel: CancellationToken,
    ) -> Result<usize, Trigger5Error>;

    /// Number of interfaces in the active configuration.
    ///
    /// Adapters with an audio function expose more than one and drive
    /// an HDMI connector.
    fn interface_count(&self) -> u8 {
        1
    }
}

// ── Bounded control transfers ────────────────────────────────────

/// Deadline of one control transfer.
pub const CONTROL_TIMEOUT: Duration = Duration::from_secs(5);

/// [`UsbTransport::control_in`] bounded by [`CONTROL_TIMEOUT`].
pub async fn read_control(
    transport: &dyn UsbTransport,
    request: ControlRequest,
    length: usize,
) -> Result<Vec<u8>, Trigger5Error> {
    tokio::time::timeout(CONTROL_TIMEOUT, transport.control_in(request, length))
        .await
        .map_err(|_| Trigger5Error::Timeout(CONTROL_TIMEOUT))?
}

/// [`UsbTransport::control_out`] bounded by [`CONTROL_TIMEOUT`].
pub async fn write_control(
    transport: &dyn UsbTransport,
    request: ControlRequest,
    data: &[u8],
) -> Result<(), Trigger5Error> {
    tokio::time::timeout(CONTROL_TIMEOUT, transport.control_out(request, data))
        .await
        .map_err(|_| Trigger5Error::Timeout(CONTROL_TIMEOUT))?
}
