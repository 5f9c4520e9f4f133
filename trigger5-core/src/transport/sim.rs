//! In-process adapter that answers the vendor protocol.
//!
//! [`SimulatedAdapter`] keeps a mode catalog, an EDID, a connector state
//! and a register file, and records every call it sees so tests can
//! assert on ordering. Bulk transfers complete after a configurable
//! latency, never complete, or fail.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use super::{ControlRequest, Direction, UsbTransport};
use crate::error::Trigger5Error;
use crate::frame::FrameHeader;
use crate::mode::{DeviceMode, ModeCatalog, ModeRequest, PRESETS};
use crate::protocol::{
    EDID_BLOCK_LEN, EDID_EXTENSION_COUNT_OFFSET, REQUEST_GET_EDID, REQUEST_GET_MODE,
    REQUEST_GET_STATUS, REQUEST_LATCH_REGISTER, REQUEST_MODE_STATUS, REQUEST_READ_REGISTER,
    REQUEST_SET_MODE, REQUEST_WRITE_REGISTER, STATUS_LEN,
};

// ── BulkBehavior ─────────────────────────────────────────────────

/// How the simulated bulk endpoint treats a transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BulkBehavior {
    /// Accept every byte after `latency`.
    Complete { latency: Duration },
    /// Hold the transfer until it is cancelled.
    NeverComplete,
    /// Reject the transfer immediately.
    Fail(String),
}

impl Default for BulkBehavior {
    fn default() -> Self {
        Self::Complete {
            latency: Duration::ZERO,
        }
    }
}

// ── SimEvent ─────────────────────────────────────────────────────

/// One recorded call, in the order the adapter saw it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimEvent {
    ControlIn {
        request: ControlRequest,
        length: usize,
    },
    ControlOut {
        request: ControlRequest,
        data: Vec<u8>,
    },
    /// A bulk transfer was handed to the endpoint. Only the frame header
    /// is kept.
    BulkStarted {
        endpoint: u8,
        len: usize,
        header: Vec<u8>,
    },
    BulkFinished {
        endpoint: u8,
        len: usize,
        ok: bool,
    },
    /// A bulk transfer was abandoned before it finished.
    BulkCancelled { endpoint: u8 },
}

impl SimEvent {
    pub fn is_bulk_started(&self) -> bool {
        matches!(self, Self::BulkStarted { .. })
    }

    /// Frame counter of a started bulk transfer, if its header parses.
    pub fn frame_counter(&self) -> Option<u16> {
        match self {
            Self::BulkStarted { header, .. } => FrameHeader::decode(header).ok().map(|h| h.counter),
            _ => None,
        }
    }
}

// ── SimulatedAdapter ─────────────────────────────────────────────

#[derive(Debug)]
struct SimState {
    catalog: Vec<u8>,
    edid: Vec<u8>,
    connected: bool,
    bulk: BulkBehavior,
    failing_request: Option<u8>,
    register: [u8; 4],
    events: Vec<SimEvent>,
}

/// A fake Trigger 5 adapter.
#[derive(Debug)]
pub struct SimulatedAdapter {
    state: Mutex<SimState>,
    interfaces: u8,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl Default for SimulatedAdapter {
    fn default() -> Self {
        Self::new(standard_catalog())
    }
}

impl SimulatedAdapter {
    /// An adapter reporting `catalog`, with a VGA connector and a
    /// monitor attached.
    pub fn new(catalog: ModeCatalog) -> Self {
        Self::from_catalog_reply(catalog.encode())
    }

    /// An adapter answering GET_MODE with raw `reply` bytes.
    pub fn from_catalog_reply(reply: Vec<u8>) -> Self {
        Self {
            state: Mutex::new(SimState {
                catalog: reply,
                edid: default_edid(),
                connected: true,
                bulk: BulkBehavior::default(),
                failing_request: None,
                register: [0; 4],
                events: Vec::new(),
            }),
            interfaces: 1,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Expose `count` interfaces. More than one makes the connector HDMI.
    pub fn with_interfaces(mut self, count: u8) -> Self {
        self.interfaces = count;
        self
    }

    pub fn with_bulk(self, behavior: BulkBehavior) -> Self {
        self.set_bulk(behavior);
        self
    }

    pub fn set_bulk(&self, behavior: BulkBehavior) {
        self.lock().bulk = behavior;
    }

    pub fn set_connected(&self, connected: bool) {
        self.lock().connected = connected;
    }

    /// Replace the EDID. `edid` is served in 128-byte blocks.
    pub fn set_edid(&self, edid: Vec<u8>) {
        self.lock().edid = edid;
    }

    /// Make every control transfer with `request` fail. `None` clears it.
    pub fn fail_control(&self, request: Option<u8>) {
        self.lock().failing_request = request;
    }

    /// Snapshot of the recorded calls.
    pub fn events(&self) -> Vec<SimEvent> {
        self.lock().events.clone()
    }

    pub fn clear_events(&self) {
        self.lock().events.clear();
    }

    /// Bulk transfers currently inside the endpoint.
    pub fn bulk_in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Highest number of bulk transfers ever inside the endpoint at once.
    pub fn max_bulk_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_failure(state: &SimState, request: ControlRequest) -> Result<(), Trigger5Error> {
        if state.failing_request == Some(request.request) {
            return Err(Trigger5Error::transport(
                "control transfer",
                format!("request 0x{:02x} stalled", request.request),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl UsbTransport for SimulatedAdapter {
    async fn control_in(
        &self,
        request: ControlRequest,
        length: usize,
    ) -> Result<Vec<u8>, Trigger5Error> {
        let mut state = self.lock();
        state.events.push(SimEvent::ControlIn { request, length });
        Self::check_failure(&state, request)?;
        if request.direction != Direction::In {
            return Err(Trigger5Error::transport("control in", "OUT request on IN pipe"));
        }

        let mut reply = match request.request {
            REQUEST_GET_MODE => state.catalog.clone(),
            REQUEST_GET_STATUS => {
                let mut status = vec![0u8; STATUS_LEN];
                status[1] = u8::from(state.connected);
                status
            }
            REQUEST_GET_EDID => {
                let start = usize::from(request.value) * EDID_BLOCK_LEN;
                match state.edid.get(start..start + EDID_BLOCK_LEN) {
                    Some(block) => block.to_vec(),
                    None => {
                        return Err(Trigger5Error::transport(
                            "GET_EDID",
                            format!("no EDID block {}", request.value),
                        ));
                    }
                }
            }
            REQUEST_MODE_STATUS => vec![0x01],
            REQUEST_READ_REGISTER => state.register.to_vec(),
            other => {
                return Err(Trigger5Error::transport(
                    "control in",
                    format!("unknown request 0x{other:02x}"),
                ));
            }
        };
        reply.truncate(length);
        trace!(request = request.request, len = reply.len(), "sim control in");
        Ok(reply)
    }

    async fn control_out(
        &self,
        request: ControlRequest,
        data: &[u8],
    ) -> Result<(), Trigger5Error> {
        let mut state = self.lock();
        state.events.push(SimEvent::ControlOut {
            request,
            data: data.to_vec(),
        });
        Self::check_failure(&state, request)?;
        if request.direction != Direction::Out {
            return Err(Trigger5Error::transport("control out", "IN request on OUT pipe"));
        }

        match request.request {
            REQUEST_SET_MODE if data.len() != ModeRequest::SIZE => Err(Trigger5Error::transport(
                "SET_MODE",
                format!("expected {} byte payload, got {}", ModeRequest::SIZE, data.len()),
            )),
            REQUEST_SET_MODE | REQUEST_LATCH_REGISTER => Ok(()),
            REQUEST_WRITE_REGISTER => {
                let n = data.len().min(state.register.len());
                state.register[..n].copy_from_slice(&data[..n]);
                Ok(())
            }
            other => Err(Trigger5Error::transport(
                "control out",
                format!("unknown request 0x{other:02x}"),
            )),
        }
    }

    async fn bulk_out(
        &self,
        endpoint: u8,
        data: &[u8],
        cancel: CancellationToken,
    ) -> Result<usize, Trigger5Error> {
        let behavior = {
            let mut state = self.lock();
            state.events.push(SimEvent::BulkStarted {
                endpoint,
                len: data.len(),
                header: data[..data.len().min(FrameHeader::SIZE)].to_vec(),
            });
            state.bulk.clone()
        };
        let mut guard = InFlight::enter(self, endpoint);

        let result = match behavior {
            BulkBehavior::Complete { latency } => {
                tokio::select! {
                    _ = tokio::time::sleep(latency) => Ok(data.len()),
                    _ = cancel.cancelled() => return Err(Trigger5Error::Cancelled),
                }
            }
            BulkBehavior::NeverComplete => {
                cancel.cancelled().await;
                return Err(Trigger5Error::Cancelled);
            }
            BulkBehavior::Fail(message) => Err(Trigger5Error::transport("bulk out", message)),
        };

        guard.finish(data.len(), result.is_ok());
        result
    }

    fn interface_count(&self) -> u8 {
        self.interfaces
    }
}

/// Tracks one bulk transfer inside the endpoint. Dropped without
/// [`InFlight::finish`] means the transfer was abandoned.
struct InFlight<'a> {
    adapter: &'a SimulatedAdapter,
    endpoint: u8,
    finished: bool,
}

impl<'a> InFlight<'a> {
    fn enter(adapter: &'a SimulatedAdapter, endpoint: u8) -> Self {
        let now = adapter.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        adapter.max_in_flight.fetch_max(now, Ordering::SeqCst);
        Self {
            adapter,
            endpoint,
            finished: false,
        }
    }

    fn finish(&mut self, len: usize, ok: bool) {
        self.finished = true;
        self.adapter.lock().events.push(SimEvent::BulkFinished {
            endpoint: self.endpoint,
            len,
            ok,
        });
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.adapter.in_flight.fetch_sub(1, Ordering::SeqCst);
        if !self.finished {
            self.adapter.lock().events.push(SimEvent::BulkCancelled {
                endpoint: self.endpoint,
            });
        }
    }
}

// ── Fixtures ─────────────────────────────────────────────────────

/// A catalog with one entry per built-in timing preset, numbered from 1.
pub fn standard_catalog() -> ModeCatalog {
    ModeCatalog::from_modes(
        PRESETS
            .iter()
            .enumerate()
            .map(|(i, (_, t))| DeviceMode::from_timing(i as u8 + 1, t)),
    )
}

/// A single EDID block with a valid header and checksum and no
/// extensions.
pub fn default_edid() -> Vec<u8> {
    let mut edid = vec![0u8; EDID_BLOCK_LEN];
    edid[..8].copy_from_slice(&[0x00, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x00]);
    // EDID 1.3
    edid[18] = 1;
    edid[19] = 3;
    edid[EDID_EXTENSION_COUNT_OFFSET] = 0;
    let sum = edid[..EDID_BLOCK_LEN - 1]
        .iter()
        .fold(0u8, |acc, b| acc.wrapping_add(*b));
    edid[EDID_BLOCK_LEN - 1] = 0u8.wrapping_sub(sum);
    edid
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{STATUS_INDEX, STATUS_VALUE};

    #[tokio::test]
    async fn serves_catalog_reply() {
        let sim = SimulatedAdapter::default();
        let reply = sim
            .control_in(ControlRequest::vendor_in(REQUEST_GET_MODE, 0, 0), 420)
            .await
            .unwrap();
        let catalog = ModeCatalog::decode(&reply).unwrap();
        assert_eq!(catalog, standard_catalog());
        assert_eq!(catalog.len(), PRESETS.len());
    }

    #[tokio::test]
    async fn status_reflects_connection() {
        let sim = SimulatedAdapter::default();
        let req = ControlRequest::vendor_in(REQUEST_GET_STATUS, STATUS_VALUE, STATUS_INDEX);
        assert_eq!(sim.control_in(req, 2).await.unwrap(), vec![0, 1]);
        sim.set_connected(false);
        assert_eq!(sim.control_in(req, 2).await.unwrap(), vec![0, 0]);
    }

    #[tokio::test]
    async fn rejects_wrong_set_mode_length() {
        let sim = SimulatedAdapter::default();
        let err = sim
            .control_out(ControlRequest::vendor_out(REQUEST_SET_MODE, 1, 0), &[0; 10])
            .await
            .unwrap_err();
        assert!(matches!(err, Trigger5Error::Transport { .. }));
    }

    #[tokio::test]
    async fn injected_failure_is_recorded() {
        let sim = SimulatedAdapter::default();
        sim.fail_control(Some(REQUEST_GET_MODE));
        assert!(
            sim.control_in(ControlRequest::vendor_in(REQUEST_GET_MODE, 0, 0), 420)
                .await
                .is_err()
        );
        assert_eq!(sim.events().len(), 1);
    }

    #[tokio::test]
    async fn bulk_completes_and_records() {
        let sim = SimulatedAdapter::default();
        let n = sim
            .bulk_out(1, &[0xFB, 0x14, 0, 0], CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(n, 4);
        let events = sim.events();
        assert!(events[0].is_bulk_started());
        assert_eq!(
            events[1],
            SimEvent::BulkFinished {
                endpoint: 1,
                len: 4,
                ok: true
            }
        );
        assert_eq!(sim.bulk_in_flight(), 0);
        assert_eq!(sim.max_bulk_in_flight(), 1);
    }

    #[tokio::test]
    async fn never_complete_waits_for_cancel() {
        let sim = SimulatedAdapter::default().with_bulk(BulkBehavior::NeverComplete);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = sim.bulk_out(1, &[0; 8], cancel).await.unwrap_err();
        assert!(matches!(err, Trigger5Error::Cancelled));
        assert_eq!(sim.events()[1], SimEvent::BulkCancelled { endpoint: 1 });
    }

    #[test]
    fn default_edid_checksums_to_zero() {
        let edid = default_edid();
        assert_eq!(edid.len(), 128);
        assert_eq!(edid.iter().fold(0u8, |a, b| a.wrapping_add(*b)), 0);
    }
}
