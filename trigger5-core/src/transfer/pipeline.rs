//! Bulk transfer pipeline with a single in-flight frame.
//!
//! Each submission waits (bounded) for the previous frame's completion,
//! fills the transfer buffer, and hands it to a background task that
//! drives the bulk OUT transfer under a deadline. The buffer comes back
//! through a recycle channel once the transfer ends.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::Trigger5Error;
use crate::protocol::BULK_OUT_ENDPOINT;
use crate::transfer::buffer::TransferBuffer;
use crate::transfer::signal::{CompletionSignal, TransferStatus};
use crate::transport::UsbTransport;

/// Deadline after which an in-flight bulk transfer is cancelled.
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(5);

/// How long a submission waits for the previous frame.
pub const DEFAULT_COMPLETION_WAIT: Duration = Duration::from_secs(1);

// ── PipelineConfig ───────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineConfig {
    pub endpoint: u8,
    pub deadline: Duration,
    pub completion_wait: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            endpoint: BULK_OUT_ENDPOINT,
            deadline: DEFAULT_DEADLINE,
            completion_wait: DEFAULT_COMPLETION_WAIT,
        }
    }
}

// ── Statistics ───────────────────────────────────────────────────

/// Snapshot of pipeline counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    pub submitted: u64,
    pub completed: u64,
    pub timed_out: u64,
    pub failed: u64,
    pub cancelled: u64,
    /// Submissions that gave up waiting on a stuck predecessor.
    pub abandoned: u64,
    pub bytes_sent: u64,
    pub reallocations: u64,
}

#[derive(Debug, Default)]
struct Counters {
    submitted: AtomicU64,
    completed: AtomicU64,
    timed_out: AtomicU64,
    failed: AtomicU64,
    cancelled: AtomicU64,
    abandoned: AtomicU64,
    bytes_sent: AtomicU64,
    reallocations: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn record(&self, status: &TransferStatus) {
        match status {
            TransferStatus::Completed { bytes } => {
                Self::bump(&self.completed);
                self.bytes_sent.fetch_add(*bytes as u64, Ordering::Relaxed);
            }
            TransferStatus::TimedOut => Self::bump(&self.timed_out),
            TransferStatus::Cancelled => Self::bump(&self.cancelled),
            TransferStatus::Failed(_) => Self::bump(&self.failed),
        }
    }

    fn snapshot(&self) -> PipelineStats {
        let get = |c: &AtomicU64| c.load(Ordering::Relaxed);
        PipelineStats {
            submitted: get(&self.submitted),
            completed: get(&self.completed),
            timed_out: get(&self.timed_out),
            failed: get(&self.failed),
            cancelled: get(&self.cancelled),
            abandoned: get(&self.abandoned),
            bytes_sent: get(&self.bytes_sent),
            reallocations: get(&self.reallocations),
        }
    }
}

// ── TransferHandle ───────────────────────────────────────────────

/// Resolves to the terminal status of one submitted frame.
///
/// Dropping the handle does not cancel the transfer.
#[derive(Debug)]
pub struct TransferHandle {
    frame: u64,
    rx: oneshot::Receiver<TransferStatus>,
}

impl TransferHandle {
    /// Pipeline-local sequence number of the frame.
    pub fn frame(&self) -> u64 {
        self.frame
    }
}

impl Future for TransferHandle {
    type Output = TransferStatus;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|r| r.unwrap_or(TransferStatus::Cancelled))
    }
}

// ── TransferPipeline ─────────────────────────────────────────────

pub struct TransferPipeline {
    transport: Arc<dyn UsbTransport>,
    config: PipelineConfig,
    signal: CompletionSignal,
    /// `None` while the buffer is lent to a transfer task.
    buffer: Option<TransferBuffer>,
    recycle_tx: mpsc::UnboundedSender<TransferBuffer>,
    recycle_rx: mpsc::UnboundedReceiver<TransferBuffer>,
    tasks: JoinSet<()>,
    shutdown: CancellationToken,
    counters: Arc<Counters>,
    next_frame: u64,
    closed: bool,
}

impl TransferPipeline {
    pub fn new(transport: Arc<dyn UsbTransport>, config: PipelineConfig) -> Self {
        let (recycle_tx, recycle_rx) = mpsc::unbounded_channel();
        Self {
            transport,
            config,
            signal: CompletionSignal::new(),
            buffer: Some(TransferBuffer::new()),
            recycle_tx,
            recycle_rx,
            tasks: JoinSet::new(),
            shutdown: CancellationToken::new(),
            counters: Arc::new(Counters::default()),
            next_frame: 0,
            closed: false,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Whether a transfer is outstanding.
    pub fn is_busy(&self) -> bool {
        self.signal.is_pending()
    }

    pub fn stats(&self) -> PipelineStats {
        self.counters.snapshot()
    }

    /// Length of the buffer currently held by the pipeline, 0 if it is
    /// lent out or released.
    pub fn buffer_len(&self) -> usize {
        self.buffer.as_ref().map_or(0, TransferBuffer::len)
    }

    /// Wait up to `timeout` for the outstanding transfer to finish.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        self.signal.wait(timeout).await
    }

    /// Submit one frame of `len` bytes, written by `fill` into the
    /// transfer buffer.
    ///
    /// Waits up to the configured completion wait for the previous frame
    /// first. If it is still stuck after that, it is abandoned: its
    /// deadline still cancels it, but its completion is ignored.
    /// If `fill` fails nothing is sent and the buffer is kept.
    pub async fn submit_with<T, F>(
        &mut self,
        len: usize,
        fill: F,
    ) -> Result<(T, TransferHandle), Trigger5Error>
    where
        F: FnOnce(&mut [u8]) -> Result<T, Trigger5Error>,
    {
        if self.closed {
            return Err(Trigger5Error::Detached);
        }
        while self.tasks.try_join_next().is_some() {}

        let abandoned = !self.signal.wait(self.config.completion_wait).await;
        if abandoned {
            warn!(
                wait = ?self.config.completion_wait,
                "previous transfer still in flight, submitting anyway"
            );
            Counters::bump(&self.counters.abandoned);
        }
        self.signal.acknowledge();

        while let Ok(returned) = self.recycle_rx.try_recv() {
            self.buffer = Some(returned);
        }
        let mut buffer = self.buffer.take().unwrap_or_default();

        match buffer.ensure_len(len) {
            Ok(true) => Counters::bump(&self.counters.reallocations),
            Ok(false) => {}
            Err(e) => {
                self.buffer = Some(buffer);
                return Err(e);
            }
        }
        let value = match fill(buffer.as_mut_slice()) {
            Ok(v) => v,
            Err(e) => {
                self.buffer = Some(buffer);
                return Err(e);
            }
        };

        let frame = self.next_frame;
        self.next_frame += 1;
        if abandoned {
            self.signal.abandon_and_begin(frame);
        } else if let Err(e) = self.signal.begin(frame) {
            self.buffer = Some(buffer);
            return Err(e);
        }
        Counters::bump(&self.counters.submitted);
        debug!(frame, len, "submitting bulk transfer");

        let (done_tx, done_rx) = oneshot::channel();
        let job = TransferJob {
            transport: Arc::clone(&self.transport),
            endpoint: self.config.endpoint,
            deadline: self.config.deadline,
            frame,
            buffer,
            signal: self.signal.clone(),
            shutdown: self.shutdown.clone(),
            counters: Arc::clone(&self.counters),
            recycle_tx: self.recycle_tx.clone(),
        };
        self.tasks.spawn(job.run(done_tx));

        Ok((value, TransferHandle { frame, rx: done_rx }))
    }

    /// Submit a ready-made frame.
    pub async fn submit(&mut self, data: &[u8]) -> Result<TransferHandle, Trigger5Error> {
        let ((), handle) = self
            .submit_with(data.len(), |buf| {
                buf.copy_from_slice(data);
                Ok(())
            })
            .await?;
        Ok(handle)
    }

    /// Cancel every outstanding transfer, wait for the tasks to exit and
    /// release all buffers. Later submissions fail with `Detached`.
    pub async fn shutdown(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.shutdown.cancel();
        while self.tasks.join_next().await.is_some() {}

        self.buffer = None;
        self.recycle_rx.close();
        while self.recycle_rx.try_recv().is_ok() {}
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Drop for TransferPipeline {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

// ── TransferJob ──────────────────────────────────────────────────

/// Everything a background transfer task owns.
struct TransferJob {
    transport: Arc<dyn UsbTransport>,
    endpoint: u8,
    deadline: Duration,
    frame: u64,
    buffer: TransferBuffer,
    signal: CompletionSignal,
    shutdown: CancellationToken,
    counters: Arc<Counters>,
    recycle_tx: mpsc::UnboundedSender<TransferBuffer>,
}

impl TransferJob {
    async fn run(self, done: oneshot::Sender<TransferStatus>) {
        let cancel = self.shutdown.child_token();
        let transfer = self
            .transport
            .bulk_out(self.endpoint, self.buffer.as_slice(), cancel.clone());

        let status = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => TransferStatus::Cancelled,
            result = transfer => {
                match result {
                    Ok(bytes) => TransferStatus::Completed { bytes },
                    Err(Trigger5Error::Cancelled) => TransferStatus::Cancelled,
                    Err(e) => {
                        warn!(frame = self.frame, error = %e, "bulk transfer failed");
                        TransferStatus::Failed(e.to_string())
                    }
                }
            }
            _ = tokio::time::sleep(self.deadline) => {
                warn!(
                    frame = self.frame,
                    deadline = ?self.deadline,
                    "bulk transfer timed out, cancelling"
                );
                TransferStatus::TimedOut
            }
        };
        cancel.cancel();

        self.counters.record(&status);
        if !self.shutdown.is_cancelled() {
            let _ = self.recycle_tx.send(self.buffer);
        }
        if !self.signal.complete(self.frame, status.clone()) {
            debug!(frame = self.frame, "late completion of abandoned transfer ignored");
        }
        let _ = done.send(status);
    }
}

// ── Tests ────────────────────────────────────────────────────────
