//! Integration tests: the full device over the simulated adapter, with
//! ordering checked against the adapter's call log.

use std::sync::Arc;
use std::time::Duration;

use tokio_test::{assert_pending, assert_ready_eq, task};
use trigger5_core::protocol::{
    OUTPUT_CONTROL_ENABLE, REGISTER_OUTPUT_CONTROL, REQUEST_LATCH_REGISTER, REQUEST_MODE_STATUS,
    REQUEST_READ_REGISTER, REQUEST_SET_MODE, REQUEST_WRITE_REGISTER,
};
use trigger5_core::transport::sim::standard_catalog;
use trigger5_core::{
    BulkBehavior, DeviceConfig, DeviceMode, DisplayTiming, FrameHeader, FrameSurface, MatchPolicy,
    ModeCatalog, ModeRequest, SimEvent, SimulatedAdapter, Trigger5Device, Trigger5Error,
    TransferStatus,
};

// ── Helpers ──────────────────────────────────────────────────────

async fn attach_with(sim: &Arc<SimulatedAdapter>, config: DeviceConfig) -> Trigger5Device {
    Trigger5Device::attach(sim.clone(), config).await.unwrap()
}

async fn attach(sim: &Arc<SimulatedAdapter>) -> Trigger5Device {
    attach_with(sim, DeviceConfig::default()).await
}

fn bulk_counters(events: &[SimEvent]) -> Vec<u16> {
    events.iter().filter_map(SimEvent::frame_counter).collect()
}

// ── Mode change ──────────────────────────────────────────────────

#[tokio::test]
async fn mode_change_issues_control_sequence() {
    let sim = Arc::new(SimulatedAdapter::default());
    let dev = attach(&sim).await;
    sim.clear_events();

    let timing = DisplayTiming::preset("1920x1080@60").unwrap();
    let active = dev.set_mode(&timing).await.unwrap();
    assert_eq!(active.selection.mode_id, 8);

    let events = sim.events();
    assert_eq!(events.len(), 6);

    let SimEvent::ControlIn { request, length: 1 } = &events[0] else {
        panic!("unexpected {:?}", events[0]);
    };
    assert_eq!((request.request, request.value), (REQUEST_MODE_STATUS, 0));

    let SimEvent::ControlOut { request, data } = &events[1] else {
        panic!("unexpected {:?}", events[1]);
    };
    assert_eq!(request.request, REQUEST_SET_MODE);
    assert_eq!(request.value, 8);
    let sent = ModeRequest::decode(data).unwrap();
    assert_eq!(sent, ModeRequest::new(&timing, active.selection.clock.params));
    assert_eq!(sent.width, 1920);
    assert_eq!(sent.line_total, 2199);

    let SimEvent::ControlIn { request, .. } = &events[2] else {
        panic!("unexpected {:?}", events[2]);
    };
    assert_eq!((request.request, request.value), (REQUEST_MODE_STATUS, 0x0201));

    let SimEvent::ControlIn { request, length: 4 } = &events[3] else {
        panic!("unexpected {:?}", events[3]);
    };
    assert_eq!(
        (request.request, request.index),
        (REQUEST_READ_REGISTER, REGISTER_OUTPUT_CONTROL)
    );

    let writes = [REQUEST_WRITE_REGISTER, REQUEST_LATCH_REGISTER];
    for (event, expected) in events[4..].iter().zip(writes) {
        let SimEvent::ControlOut { request, data } = event else {
            panic!("unexpected {event:?}");
        };
        assert_eq!(request.request, expected);
        assert_eq!(request.index, REGISTER_OUTPUT_CONTROL);
        assert_eq!(data.as_slice(), OUTPUT_CONTROL_ENABLE);
    }
}

#[tokio::test]
async fn strict_policy_rejects_unlisted_refresh() {
    let catalog = ModeCatalog::from_modes([DeviceMode {
        hz: 60,
        clock_mhz: 25,
        bpp: 32,
        mode_number: 3,
        height: 480,
        width: 640,
    }]);
    let sim = Arc::new(SimulatedAdapter::new(catalog));
    let dev = attach(&sim).await;
    sim.clear_events();

    // 640x480 at 75 Hz (VESA).
    let mut t = DisplayTiming::preset("640x480@60").unwrap();
    t.clock_khz = 31_500;
    t.htotal = 840;
    t.vtotal = 500;
    assert_eq!(t.refresh_hz(), 75);

    let err = dev.set_mode(&t).await.unwrap_err();
    assert!(matches!(
        err,
        Trigger5Error::NoMatchingMode { width: 640, height: 480, refresh_hz: 75 }
    ));
    assert!(sim.events().is_empty());
}

#[tokio::test]
async fn fallback_policy_uses_last_entry() {
    let sim = Arc::new(SimulatedAdapter::new(standard_catalog()));
    let config = DeviceConfig {
        match_policy: MatchPolicy::FallbackToLast,
        ..DeviceConfig::default()
    };
    let dev = attach_with(&sim, config).await;

    let mut t = DisplayTiming::preset("640x480@60").unwrap();
    t.clock_khz = 31_500;
    t.htotal = 840;
    t.vtotal = 500;

    let active = dev.set_mode(&t).await.unwrap();
    let last = standard_catalog().modes().last().unwrap().mode_number;
    assert_eq!(active.selection.mode_id, last);
}

#[tokio::test]
async fn empty_catalog_rejects_every_mode() {
    let sim = Arc::new(SimulatedAdapter::new(ModeCatalog::default()));
    let dev = attach(&sim).await;
    let err = dev
        .set_mode(&DisplayTiming::preset("800x600@60").unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, Trigger5Error::NoModesAvailable));
}

// ── Frame streaming ──────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn frames_are_delivered_in_order() {
    let sim = Arc::new(SimulatedAdapter::default().with_bulk(BulkBehavior::Complete {
        latency: Duration::from_millis(16),
    }));
    let dev = attach(&sim).await;
    sim.clear_events();

    let surface = FrameSurface::xrgb8888(16, 8);
    let mut handles = Vec::new();
    for _ in 0..5 {
        handles.push(dev.submit_frame(&surface, None).await.unwrap().unwrap());
    }
    for h in handles {
        assert!(h.await.is_success());
    }

    // Every transfer finishes before the next one starts.
    let events = sim.events();
    for pair in events.chunks(2) {
        assert!(pair[0].is_bulk_started());
        assert!(matches!(pair[1], SimEvent::BulkFinished { ok: true, .. }));
    }
    assert_eq!(bulk_counters(&events), [0, 1, 2, 3, 4]);
    assert_eq!(sim.max_bulk_in_flight(), 1);

    let stats = dev.stats().await;
    assert_eq!(stats.completed, 5);
    assert_eq!(stats.bytes_sent, 5 * (20 + 16 * 8 * 3));
    assert_eq!(stats.reallocations, 1);
}

#[tokio::test]
async fn frame_counter_wraps_at_4096() {
    let sim = Arc::new(SimulatedAdapter::default());
    let dev = attach(&sim).await;
    let surface = FrameSurface::xrgb8888(1, 1);

    for _ in 0..4097 {
        let handle = dev.submit_frame(&surface, None).await.unwrap().unwrap();
        handle.await;
    }

    let counters = bulk_counters(&sim.events());
    assert_eq!(counters.len(), 4097);
    assert_eq!(counters[4095], 4095);
    assert_eq!(counters[4096], counters[0]);
    assert_eq!(dev.frames_submitted().await, 4097);
}

#[tokio::test(start_paused = true)]
async fn stuck_transfer_times_out_and_pipeline_recovers() {
    let sim = Arc::new(SimulatedAdapter::default().with_bulk(BulkBehavior::NeverComplete));
    let dev = attach(&sim).await;
    let surface = FrameSurface::xrgb8888(4, 4);

    let start = tokio::time::Instant::now();
    let handle = dev.submit_frame(&surface, None).await.unwrap().unwrap();
    assert_eq!(handle.await, TransferStatus::TimedOut);
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_secs(5) && elapsed < Duration::from_millis(5_100));
    assert_eq!(sim.bulk_in_flight(), 0);

    sim.set_bulk(BulkBehavior::default());
    let handle = dev.submit_frame(&surface, None).await.unwrap().unwrap();
    assert!(handle.await.is_success());

    let stats = dev.stats().await;
    assert_eq!((stats.timed_out, stats.completed), (1, 1));
}

#[tokio::test(start_paused = true)]
async fn handle_resolves_only_after_transfer() {
    let sim = Arc::new(SimulatedAdapter::default().with_bulk(BulkBehavior::Complete {
        latency: Duration::from_millis(50),
    }));
    let dev = attach(&sim).await;
    let surface = FrameSurface::xrgb8888(2, 2);

    let handle = dev.submit_frame(&surface, None).await.unwrap().unwrap();
    let mut handle = task::spawn(handle);
    assert_pending!(handle.poll());

    tokio::time::sleep(Duration::from_millis(60)).await;
    assert!(handle.is_woken());
    assert_ready_eq!(handle.poll(), TransferStatus::Completed { bytes: 20 + 12 });
}

#[tokio::test(start_paused = true)]
async fn mode_change_waits_for_in_flight_frame() {
    let sim = Arc::new(SimulatedAdapter::default().with_bulk(BulkBehavior::Complete {
        latency: Duration::from_millis(200),
    }));
    let dev = attach(&sim).await;
    sim.clear_events();

    let surface = FrameSurface::xrgb8888(8, 8);
    let handle = dev.submit_frame(&surface, None).await.unwrap().unwrap();
    dev.set_mode(&DisplayTiming::preset("1024x768@60").unwrap())
        .await
        .unwrap();
    assert!(handle.await.is_success());

    let events = sim.events();
    let finished = events
        .iter()
        .position(|e| matches!(e, SimEvent::BulkFinished { .. }))
        .unwrap();
    let first_control = events
        .iter()
        .position(|e| matches!(e, SimEvent::ControlIn { .. } | SimEvent::ControlOut { .. }))
        .unwrap();
    assert!(finished < first_control);
}

#[tokio::test]
async fn detach_cancels_and_releases() {
    let sim = Arc::new(SimulatedAdapter::default().with_bulk(BulkBehavior::NeverComplete));
    let dev = attach(&sim).await;
    let surface = FrameSurface::xrgb8888(4, 4);

    let handle = dev.submit_frame(&surface, None).await.unwrap().unwrap();
    while sim.bulk_in_flight() == 0 {
        tokio::task::yield_now().await;
    }
    dev.detach().await;

    assert_eq!(sim.bulk_in_flight(), 0);
    assert_eq!(handle.await, TransferStatus::Cancelled);
    assert!(sim
        .events()
        .iter()
        .any(|e| matches!(e, SimEvent::BulkCancelled { .. })));
    assert!(matches!(
        dev.submit_frame(&surface, None).await,
        Err(Trigger5Error::Detached)
    ));
}

#[tokio::test]
async fn detach_before_transfer_starts_never_reaches_transport() {
    let sim = Arc::new(SimulatedAdapter::default().with_bulk(BulkBehavior::NeverComplete));
    let dev = attach(&sim).await;
    sim.clear_events();
    let surface = FrameSurface::xrgb8888(4, 4);

    let handle = dev.submit_frame(&surface, None).await.unwrap().unwrap();
    dev.detach().await;

    assert_eq!(handle.await, TransferStatus::Cancelled);
    assert_eq!(sim.max_bulk_in_flight(), 0);
    assert!(!sim.events().iter().any(SimEvent::is_bulk_started));
}

#[tokio::test]
async fn transmitted_header_checksums_to_zero() {
    let sim = Arc::new(SimulatedAdapter::default());
    let dev = attach(&sim).await;
    sim.clear_events();
    let mut surface = FrameSurface::xrgb8888(3, 2);
    surface.fill(0x00_12_34_56);

    dev.submit_frame(&surface, None).await.unwrap().unwrap().await;

    let events = sim.events();
    let SimEvent::BulkStarted { header, len, .. } = &events[0] else {
        panic!("unexpected {:?}", events[0]);
    };
    assert_eq!(*len, FrameHeader::SIZE + 18);
    assert_eq!(header.iter().fold(0u8, |a, b| a.wrapping_add(*b)), 0);
    let decoded = FrameHeader::decode(header).unwrap();
    assert_eq!(decoded.payload_length, 18);
    assert_eq!(decoded.tag, 0);
}
