//! The attached adapter.
//!
//! [`Trigger5Device`] owns everything that belongs to one adapter: the
//! catalog read at attach, the active mode, the frame counter and the
//! transfer pipeline. Mode changes and frame submissions both go through
//! one async mutex, so they never interleave on the shared command
//! channel.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::clock::{ClockFit, ClockSearchSpace, MAX_ERROR_PPM};
use crate::connector::{self, ConnectorStatus, ConnectorType};
use crate::error::Trigger5Error;
use crate::frame::{FrameEncoder, FrameSource, FrameSurface, Rect, encoded_len};
use crate::mode::catalog::CATALOG_LEN;
use crate::mode::{DisplayTiming, MatchPolicy, ModeCatalog, ModeRequest, SizeBounds};
use crate::protocol::{
    BULK_OUT_ENDPOINT, MODE_STATUS_AFTER_SET, OUTPUT_CONTROL_ENABLE, REGISTER_OUTPUT_CONTROL,
    REQUEST_GET_MODE, REQUEST_LATCH_REGISTER, REQUEST_MODE_STATUS, REQUEST_READ_REGISTER,
    REQUEST_SET_MODE, REQUEST_WRITE_REGISTER,
};
use crate::transfer::{
    DEFAULT_COMPLETION_WAIT, DEFAULT_DEADLINE, PipelineConfig, PipelineStats, TransferHandle,
    TransferPipeline,
};
use crate::transport::{ControlRequest, UsbTransport, read_control, write_control};

// ── DeviceConfig ─────────────────────────────────────────────────

/// Tunables of one device instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceConfig {
    /// What to do when the catalog has no exact match.
    pub match_policy: MatchPolicy,
    /// Deadline of one bulk transfer.
    pub bulk_deadline: Duration,
    /// How long a frame waits for its predecessor.
    pub completion_wait: Duration,
    pub bulk_endpoint: u8,
    /// Largest pixel clock error a mode may have.
    pub max_clock_error_ppm: u64,
    pub search_space: ClockSearchSpace,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            match_policy: MatchPolicy::default(),
            bulk_deadline: DEFAULT_DEADLINE,
            completion_wait: DEFAULT_COMPLETION_WAIT,
            bulk_endpoint: BULK_OUT_ENDPOINT,
            max_clock_error_ppm: MAX_ERROR_PPM,
            search_space: ClockSearchSpace::default(),
        }
    }
}

impl DeviceConfig {
    fn pipeline(&self) -> PipelineConfig {
        PipelineConfig {
            endpoint: self.bulk_endpoint,
            deadline: self.bulk_deadline,
            completion_wait: self.completion_wait,
        }
    }
}

// ── ModeSelection ────────────────────────────────────────────────

/// A validated timing: the base mode identifier and the PLL fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ModeSelection {
    pub mode_id: u8,
    pub clock: ClockFit,
}

/// Resolve `timing` against `catalog` and fit its pixel clock.
///
/// Runs a full synthesizer search.
pub fn select_mode(
    catalog: &ModeCatalog,
    config: &DeviceConfig,
    timing: &DisplayTiming,
) -> Result<ModeSelection, Trigger5Error> {
    let mode_id = catalog.find(
        timing.hdisplay,
        timing.vdisplay,
        timing.refresh_hz(),
        config.match_policy,
    )?;
    let clock = config.search_space.synthesize(timing.clock_khz);
    if !clock.is_within(config.max_clock_error_ppm) {
        return Err(Trigger5Error::ClockOutOfRange {
            ppm: clock.error_ppm(),
        });
    }
    Ok(ModeSelection { mode_id, clock })
}

/// The timing currently programmed into the adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveMode {
    pub timing: DisplayTiming,
    pub selection: ModeSelection,
}

// ── Trigger5Device ───────────────────────────────────────────────

struct DeviceState {
    active: Option<ActiveMode>,
    encoder: FrameEncoder,
    pipeline: TransferPipeline,
}

pub struct Trigger5Device {
    transport: Arc<dyn UsbTransport>,
    catalog: ModeCatalog,
    config: DeviceConfig,
    connector: ConnectorType,
    detached: AtomicBool,
    state: Mutex<DeviceState>,
}

impl Trigger5Device {
    /// Read the mode catalog and set up the device.
    ///
    /// An empty catalog is accepted; every mode request then fails with
    /// [`Trigger5Error::NoModesAvailable`].
    pub async fn attach(
        transport: Arc<dyn UsbTransport>,
        config: DeviceConfig,
    ) -> Result<Self, Trigger5Error> {
        let reply = read_control(
            &*transport,
            ControlRequest::vendor_in(REQUEST_GET_MODE, 0, 0),
            CATALOG_LEN,
        )
        .await?;
        let catalog = ModeCatalog::decode(&reply)?;
        let connector = ConnectorType::for_interface_count(transport.interface_count());

        if catalog.is_empty() {
            warn!("adapter reported an empty mode catalog");
        }
        info!(modes = catalog.len(), ?connector, "adapter attached");

        let pipeline = TransferPipeline::new(Arc::clone(&transport), config.pipeline());
        Ok(Self {
            transport,
            catalog,
            config,
            connector,
            detached: AtomicBool::new(false),
            state: Mutex::new(DeviceState {
                active: None,
                encoder: FrameEncoder::new(),
                pipeline,
            }),
        })
    }

    pub fn catalog(&self) -> &ModeCatalog {
        &self.catalog
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    pub fn connector_type(&self) -> ConnectorType {
        self.connector
    }

    /// Display size limits derived from the catalog.
    pub fn size_bounds(&self) -> Option<SizeBounds> {
        self.catalog.size_bounds()
    }

    pub fn is_detached(&self) -> bool {
        self.detached.load(Ordering::SeqCst)
    }

    fn ensure_attached(&self) -> Result<(), Trigger5Error> {
        if self.is_detached() {
            Err(Trigger5Error::Detached)
        } else {
            Ok(())
        }
    }

    /// Check whether `timing` can be driven, without touching the device.
    pub fn mode_valid(&self, timing: &DisplayTiming) -> Result<ModeSelection, Trigger5Error> {
        select_mode(&self.catalog, &self.config, timing)
    }

    /// Program `timing` into the adapter.
    ///
    /// Does nothing if `timing` is already active. Waits for the
    /// outstanding frame before touching the command channel. On any
    /// failure the previous mode stays recorded as active.
    pub async fn set_mode(&self, timing: &DisplayTiming) -> Result<ActiveMode, Trigger5Error> {
        self.ensure_attached()?;

        let mut state = self.state.lock().await;
        self.ensure_attached()?;
        if let Some(active) = state.active.filter(|a| a.timing == *timing) {
            debug!(mode = active.selection.mode_id, "timing unchanged, skipping mode set");
            return Ok(active);
        }

        let catalog = self.catalog.clone();
        let config = self.config;
        let requested = *timing;
        let selection =
            tokio::task::spawn_blocking(move || select_mode(&catalog, &config, &requested))
                .await
                .map_err(|_| Trigger5Error::Cancelled)??;

        if !state.pipeline.wait_idle(self.config.completion_wait).await {
            warn!("frame still in flight before mode change");
        }

        let request = ModeRequest::new(timing, selection.clock.params);
        self.write_mode(selection.mode_id, &request)
            .await
            .inspect_err(|e| warn!(error = %e, mode = selection.mode_id, "mode change failed"))?;

        info!(
            mode = selection.mode_id,
            pll = %selection.clock.params,
            target_khz = timing.clock_khz,
            achieved_khz = selection.clock.achieved_khz(),
            error_ppm = selection.clock.error_ppm(),
            "mode set to {timing}"
        );
        let active = ActiveMode {
            timing: *timing,
            selection,
        };
        state.active = Some(active);
        Ok(active)
    }

    /// The control sequence that switches the output to a new timing.
    async fn write_mode(&self, mode_id: u8, request: &ModeRequest) -> Result<(), Trigger5Error> {
        let t = &*self.transport;
        let register = REGISTER_OUTPUT_CONTROL;

        read_control(t, ControlRequest::vendor_in(REQUEST_MODE_STATUS, 0, 0), 1).await?;
        write_control(
            t,
            ControlRequest::vendor_out(REQUEST_SET_MODE, u16::from(mode_id), 0),
            &request.encode(),
        )
        .await?;
        read_control(
            t,
            ControlRequest::vendor_in(REQUEST_MODE_STATUS, MODE_STATUS_AFTER_SET, 0),
            1,
        )
        .await?;
        read_control(t, ControlRequest::vendor_in(REQUEST_READ_REGISTER, 0, register), 4).await?;
        write_control(
            t,
            ControlRequest::vendor_out(REQUEST_WRITE_REGISTER, 0, register),
            &OUTPUT_CONTROL_ENABLE,
        )
        .await?;
        write_control(
            t,
            ControlRequest::vendor_out(REQUEST_LATCH_REGISTER, 0, register),
            &OUTPUT_CONTROL_ENABLE,
        )
        .await?;
        Ok(())
    }

    /// Send `surface` to the adapter.
    ///
    /// `damage` of `None` or any non-empty rectangle sends the whole
    /// surface; an empty rectangle sends nothing and returns `None`.
    /// The returned handle resolves once the bulk transfer ends.
    pub async fn submit_frame(
        &self,
        surface: &FrameSurface,
        damage: Option<Rect>,
    ) -> Result<Option<TransferHandle>, Trigger5Error> {
        self.ensure_attached()?;
        if damage.is_some_and(|r| r.is_empty()) {
            return Ok(None);
        }
        surface.validate()?;

        let mut state = self.state.lock().await;
        self.ensure_attached()?;
        let DeviceState {
            encoder, pipeline, ..
        } = &mut *state;

        let (header, handle) = pipeline
            .submit_with(encoded_len(surface), |buf| encoder.encode_next(surface, buf))
            .await?;
        debug!(
            counter = header.counter,
            width = header.width,
            height = header.height,
            "frame queued"
        );
        Ok(Some(handle))
    }

    /// Pull the current frame from `source` and submit it.
    pub async fn present(
        &self,
        source: &mut dyn FrameSource,
        damage: Option<Rect>,
    ) -> Result<Option<TransferHandle>, Trigger5Error> {
        self.ensure_attached()?;
        if damage.is_some_and(|r| r.is_empty()) {
            return Ok(None);
        }
        let surface = source.current_frame()?;
        self.submit_frame(&surface, damage).await
    }

    pub async fn active_mode(&self) -> Option<ActiveMode> {
        self.state.lock().await.active
    }

    /// Frames encoded since attach.
    pub async fn frames_submitted(&self) -> u64 {
        self.state.lock().await.encoder.frames_encoded()
    }

    pub async fn stats(&self) -> PipelineStats {
        self.state.lock().await.pipeline.stats()
    }

    /// Whether a monitor is attached. A detached device reports
    /// disconnected.
    pub async fn detect(&self) -> ConnectorStatus {
        if self.is_detached() {
            return ConnectorStatus::Disconnected;
        }
        connector::detect(&*self.transport).await
    }

    pub async fn read_edid(&self) -> Result<Vec<u8>, Trigger5Error> {
        self.ensure_attached()?;
        connector::read_edid(&*self.transport).await
    }

    /// Cancel the in-flight transfer, wait for every transfer task and
    /// release all buffers. Later operations fail with
    /// [`Trigger5Error::Detached`].
    pub async fn detach(&self) {
        if self.detached.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut state = self.state.lock().await;
        state.pipeline.shutdown().await;
        state.active = None;
        info!(frames = state.encoder.frames_encoded(), "adapter detached");
    }
}

impl std::fmt::Debug for Trigger5Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Trigger5Device")
            .field("connector", &self.connector)
            .field("modes", &self.catalog.len())
            .field("detached", &self.is_detached())
            .finish_non_exhaustive()
    }
}

// ── Tests ────────────────────────────────────────────────────────
