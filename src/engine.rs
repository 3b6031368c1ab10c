//! Port Engine
//!
//! Orchestrates one port's Serial Reader, Accumulator, Transport Client,
//! Durable Buffer, Retry Loop, and Retention Sweeper. Cyclic references
//! between the engine and its workers (spec.md §9) are avoided by message
//! passing and shared `Arc`/`Mutex` state rather than ownership cycles: the
//! workers hold clones of the `Status`, `Buffer`, and `TransportClient`
//! handles, never a handle back to the `PortEngine` itself.

use crate::accumulator::Accumulator;
use crate::buffer::Buffer;
use crate::config::PortConfig;
use crate::constants::{
    ACCUMULATOR_CHECK_PERIOD_MS, LIVENESS_PROBE_INTERVAL_SECS, RETENTION_MAX_AGE_SECS,
    RETENTION_SWEEP_INTERVAL_SECS, RETRY_TIMER_INTERVAL_SECS, WORKER_SHUTDOWN_DEADLINE_MS,
};
use crate::error::{ForwarderError, Result};
use crate::serial::{self, SerialReader, SerialReaderControl};
use crate::status::{Status, StatusSnapshot, TransportState};
use crate::transport::TransportClient;
use chrono::{Duration as ChronoDuration, Utc};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Names of `worker_tasks`, in the order `start_internal` spawns them —
/// used to attribute a `ShutdownTimeout` to the worker that missed its
/// deadline.
const WORKER_NAMES: [&str; 3] = ["transport", "retry", "retention"];

pub struct PortEngine {
    config: PortConfig,
    status: Arc<Status>,
    buffer: Arc<Buffer>,
    running: Arc<AtomicBool>,
    shutdown: Arc<AtomicBool>,
    reader_control: Option<SerialReaderControl>,
    accumulator_task: Option<JoinHandle<Accumulator>>,
    worker_tasks: Vec<JoinHandle<()>>,
    transport: Option<Arc<Mutex<TransportClient>>>,
}

impl PortEngine {
    pub async fn new(config: PortConfig, buffer_dir: &Path) -> Result<Self> {
        let db_path = buffer_dir.join(format!("buffer_{}.db", config.name));
        let buffer = Arc::new(Buffer::open(&config.name, &db_path, config.buffer_size).await?);
        let status = Status::new(config.name.clone());

        Ok(Self {
            config,
            status,
            buffer,
            running: Arc::new(AtomicBool::new(false)),
            shutdown: Arc::new(AtomicBool::new(false)),
            reader_control: None,
            accumulator_task: None,
            worker_tasks: Vec::new(),
            transport: None,
        })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Idempotent: reports "already running" rather than double-spawning
    pub async fn start(&mut self) -> Result<()> {
        let (reader, reader_control) = serial::spawn(self.config.clone());
        let transport = TransportClient::new(&self.config);
        self.start_internal(reader, Some(reader_control), transport).await
    }

    /// Start against an already-built serial reader and transport instead of
    /// opening real hardware and connecting for real. This is the seam
    /// integration tests use to drive `accumulator_task`/`transport_task`/
    /// `retry_task` end-to-end — feeding bytes through a plain channel in
    /// place of the reader thread and a transport pointed at a loopback
    /// socket in place of the real remote endpoint — mirroring the
    /// teacher's own swap of a mock transport in for hardware I/O. Since
    /// there is no reader thread, shutdown step 2 (closing the serial
    /// handle) is a no-op; the caller controls the reader's lifetime by
    /// dropping (or keeping) the channel's sending half.
    pub async fn start_with(&mut self, reader: SerialReader, transport: TransportClient) -> Result<()> {
        self.start_internal(reader, None, transport).await
    }

    async fn start_internal(
        &mut self,
        reader: SerialReader,
        reader_control: Option<SerialReaderControl>,
        transport: TransportClient,
    ) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            info!(port = %self.config.name, "engine already running");
            return Ok(());
        }

        self.shutdown.store(false, Ordering::SeqCst);

        let pending = self.buffer.load_pending().await?;
        self.reader_control = reader_control;

        let transport = Arc::new(Mutex::new(transport));
        self.transport = Some(transport.clone());

        self.accumulator_task = Some(tokio::spawn(accumulator_task(
            reader,
            pending,
            self.config.clone(),
            self.buffer.clone(),
            transport.clone(),
            self.status.clone(),
            self.shutdown.clone(),
        )));

        self.worker_tasks = vec![
            tokio::spawn(transport_task(
                transport.clone(),
                self.config.clone(),
                self.buffer.clone(),
                self.status.clone(),
                self.shutdown.clone(),
            )),
            tokio::spawn(retry_task(
                transport.clone(),
                self.buffer.clone(),
                self.status.clone(),
                self.shutdown.clone(),
                self.config.name.clone(),
            )),
            tokio::spawn(retention_task(
                self.buffer.clone(),
                self.shutdown.clone(),
                self.config.name.clone(),
            )),
        ];

        info!(port = %self.config.name, "engine started");
        Ok(())
    }

    /// Follows spec.md §4.6's shutdown ordering exactly: cancel, close the
    /// serial handle, join workers, then flush/persist/close.
    pub async fn stop(&mut self) -> Result<()> {
        if !self.running.swap(false, Ordering::SeqCst) {
            return Ok(());
        }

        // 1. Signal cancellation.
        self.shutdown.store(true, Ordering::SeqCst);

        // 2. Close the serial handle promptly to unblock reads.
        if let Some(mut control) = self.reader_control.take() {
            control.stop();
        }

        // 3. Join workers with a per-worker deadline.
        let deadline = Duration::from_millis(WORKER_SHUTDOWN_DEADLINE_MS);
        let mut accumulator = None;
        if let Some(task) = self.accumulator_task.take() {
            match tokio::time::timeout(deadline, task).await {
                Ok(Ok(acc)) => accumulator = Some(acc),
                Ok(Err(e)) => error!(port = %self.config.name, error = %e, "accumulator task panicked"),
                Err(_) => {
                    let err = ForwarderError::ShutdownTimeout {
                        port: self.config.name.clone(),
                        worker: "accumulator",
                    };
                    warn!(port = %self.config.name, "{}", err);
                }
            }
        }
        for (worker, task) in WORKER_NAMES.iter().zip(self.worker_tasks.drain(..)) {
            if tokio::time::timeout(deadline, task).await.is_err() {
                let err = ForwarderError::ShutdownTimeout {
                    port: self.config.name.clone(),
                    worker,
                };
                warn!(port = %self.config.name, "{}", err);
            }
        }

        // 4. Flush the residual accumulator (final emission attempt).
        if let Some(mut acc) = accumulator {
            if let Some(bytes) = acc.flush() {
                if let Some(transport) = &self.transport {
                    if let Err(e) = emit(bytes, &self.buffer, transport, &self.status, &self.config.name).await {
                        error!(port = %self.config.name, error = %e, "final flush failed to persist");
                    }
                }
            }
        }

        // 5. Persist the pending-accumulator record (cleared: step 4 drained it).
        if let Err(e) = self.buffer.clear_pending().await {
            error!(port = %self.config.name, error = %e, "failed to clear pending-accumulator record");
        }

        // 6. Persist the buffer state.
        if let Err(e) = self.buffer.checkpoint().await {
            error!(port = %self.config.name, error = %e, "buffer checkpoint failed");
        }

        // 7. Close the transport and the durable store.
        if let Some(transport) = self.transport.take() {
            transport.lock().await.close().await;
        }
        self.buffer.close().await;

        info!(port = %self.config.name, "engine stopped");
        Ok(())
    }

    pub async fn status(&self) -> Result<StatusSnapshot> {
        let buffered_count = self.buffer.count_unsent().await?;
        Ok(self.status.snapshot(buffered_count))
    }
}

/// Insert the emitted message and opportunistically attempt delivery
async fn emit(
    bytes: Vec<u8>,
    buffer: &Buffer,
    transport: &Arc<Mutex<TransportClient>>,
    status: &Status,
    port_name: &str,
) -> Result<()> {
    let id = buffer.insert(&bytes).await?;
    status.record_buffered();

    if status.transport_state() == TransportState::Connected {
        let send_result = transport.lock().await.send(&bytes).await;
        match send_result {
            Ok(()) => {
                buffer.mark_sent(&[id], Utc::now()).await?;
                status.record_sent(1);
            }
            Err(e) => {
                warn!(port = %port_name, error = %e, "transport write failed, message remains unsent");
                status.set_last_error(e.to_string());
                status.set_transport_state(TransportState::Disconnected);
            }
        }
    }

    Ok(())
}

/// Ordered flush of all unsent messages; stops at the first failure,
/// preserving order (spec.md §4.5). Returns `true` if a failure occurred.
async fn flush(
    transport: &Arc<Mutex<TransportClient>>,
    buffer: &Buffer,
    status: &Status,
    port_name: &str,
) -> Result<bool> {
    let unsent = buffer.enumerate_unsent().await?;
    if unsent.is_empty() {
        return Ok(false);
    }

    let mut sent_ids = Vec::with_capacity(unsent.len());
    let mut broke = false;
    {
        let mut client = transport.lock().await;
        for msg in &unsent {
            match client.send(&msg.data).await {
                Ok(()) => sent_ids.push(msg.id),
                Err(e) => {
                    warn!(port = %port_name, error = %e, message_id = msg.id, "flush stopped at first failure");
                    status.set_last_error(e.to_string());
                    broke = true;
                    break;
                }
            }
        }
    }

    if !sent_ids.is_empty() {
        buffer.mark_sent(&sent_ids, Utc::now()).await?;
        status.record_sent(sent_ids.len() as u64);
    }

    Ok(broke)
}

/// Single cooperative task draining the Serial Reader and running the
/// idle-check timer (spec.md §9 permits merging these). Returns the final
/// `Accumulator` so the caller can finish the shutdown sequence.
async fn accumulator_task(
    mut reader: SerialReader,
    pending: Option<Vec<u8>>,
    config: PortConfig,
    buffer: Arc<Buffer>,
    transport: Arc<Mutex<TransportClient>>,
    status: Arc<Status>,
    shutdown: Arc<AtomicBool>,
) -> Accumulator {
    let mut accumulator = Accumulator::new(Duration::from_secs(config.send_delay));
    if let Some(bytes) = pending {
        accumulator.restore(bytes);
    }

    let mut ticker = tokio::time::interval(Duration::from_millis(ACCUMULATOR_CHECK_PERIOD_MS));

    loop {
        if shutdown.load(Ordering::Relaxed) {
            break;
        }

        tokio::select! {
            chunk = reader.recv() => {
                match chunk {
                    Some(bytes) => {
                        status.set_serial_connected(reader.is_connected());
                        accumulator.push(&bytes);
                    }
                    None => break,
                }
            }
            _ = ticker.tick() => {
                status.set_serial_connected(reader.is_connected());

                if let Some(bytes) = accumulator.try_emit() {
                    if let Err(e) = emit(bytes, &buffer, &transport, &status, &config.name).await {
                        error!(port = %config.name, error = %e, "failed to persist emitted message");
                    }
                }

                if let Some(bytes) = accumulator.mirror_if_due() {
                    if let Err(e) = buffer.put_pending(&bytes).await {
                        error!(port = %config.name, error = %e, "failed to mirror pending accumulator");
                    }
                }
            }
        }
    }

    accumulator
}

/// Owns the Direct-TCP/HTTP-relay connection lifecycle: reconnect loop
/// while disconnected, liveness probe while connected, triggers a flush on
/// every successful (re)connect.
async fn transport_task(
    transport: Arc<Mutex<TransportClient>>,
    config: PortConfig,
    buffer: Arc<Buffer>,
    status: Arc<Status>,
    shutdown: Arc<AtomicBool>,
) {
    status.set_transport_state(TransportState::Connecting);
    let mut connect_ticker = tokio::time::interval(Duration::from_secs(config.reconnect_interval));
    let mut probe_ticker = tokio::time::interval(Duration::from_secs(LIVENESS_PROBE_INTERVAL_SECS));

    loop {
        if shutdown.load(Ordering::Relaxed) {
            break;
        }

        if status.transport_state() == TransportState::Connected {
            probe_ticker.tick().await;
            if shutdown.load(Ordering::Relaxed) {
                break;
            }
            let alive = transport.lock().await.is_alive().await;
            if !alive {
                warn!(port = %config.name, "liveness probe detected disconnect");
                status.set_transport_state(TransportState::Disconnected);
            }
        } else {
            connect_ticker.tick().await;
            if shutdown.load(Ordering::Relaxed) {
                break;
            }
            status.set_transport_state(TransportState::Connecting);
            let endpoint = transport.lock().await.endpoint();
            match transport.lock().await.connect().await {
                Ok(()) => {
                    info!(port = %config.name, %endpoint, "transport connected");
                    status.set_transport_state(TransportState::Connected);
                    match flush(&transport, &buffer, &status, &config.name).await {
                        Ok(true) => status.set_transport_state(TransportState::Disconnected),
                        Ok(false) => {}
                        Err(e) => error!(port = %config.name, error = %e, "post-connect flush failed"),
                    }
                }
                Err(e) => {
                    status.set_last_error(e.to_string());
                    warn!(port = %config.name, error = %e, "transport connect failed, retrying");
                    status.set_transport_state(TransportState::Disconnected);
                }
            }
        }
    }
}

/// Periodic safety-net flush independent of transport-state transitions
async fn retry_task(
    transport: Arc<Mutex<TransportClient>>,
    buffer: Arc<Buffer>,
    status: Arc<Status>,
    shutdown: Arc<AtomicBool>,
    port_name: String,
) {
    let mut ticker = tokio::time::interval(Duration::from_secs(RETRY_TIMER_INTERVAL_SECS));
    ticker.tick().await;

    loop {
        if shutdown.load(Ordering::Relaxed) {
            break;
        }
        ticker.tick().await;
        if shutdown.load(Ordering::Relaxed) {
            break;
        }

        if status.transport_state() != TransportState::Connected {
            continue;
        }

        match flush(&transport, &buffer, &status, &port_name).await {
            Ok(true) => status.set_transport_state(TransportState::Disconnected),
            Ok(false) => {}
            Err(e) => error!(port = %port_name, error = %e, "retry flush failed"),
        }
    }
}

async fn retention_task(buffer: Arc<Buffer>, shutdown: Arc<AtomicBool>, port_name: String) {
    let mut ticker = tokio::time::interval(Duration::from_secs(RETENTION_SWEEP_INTERVAL_SECS));

    loop {
        if shutdown.load(Ordering::Relaxed) {
            break;
        }
        ticker.tick().await;
        if shutdown.load(Ordering::Relaxed) {
            break;
        }

        let cutoff = Utc::now() - ChronoDuration::seconds(RETENTION_MAX_AGE_SECS);
        match buffer.purge_old_sent(cutoff).await {
            Ok(0) => {}
            Ok(n) => info!(port = %port_name, count = n, "retention sweep removed messages"),
            Err(e) => error!(port = %port_name, error = %e, "retention sweep failed"),
        }
    }
}
