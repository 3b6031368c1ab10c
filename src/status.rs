//! Status snapshot types shared between the engine and its supervisor
//!
//! Read-only view exported by each port engine; consumed by the (out-of-scope)
//! HTTP dashboard. See spec.md §3.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Transport connection state, observable in the status snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Disconnected,
    Connecting,
    Connected,
}

impl TransportState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        }
    }
}

/// Read-only snapshot of one port engine's state
#[derive(Debug, Clone)]
pub struct StatusSnapshot {
    pub port_name: String,
    pub serial_connected: bool,
    pub transport_state: TransportState,
    pub buffered_count: u64,
    pub messages_sent: u64,
    pub messages_buffered: u64,
    pub last_error: Option<String>,
    pub start_time: DateTime<Utc>,
}

/// Thread-safe counters and connection flags backing a [`StatusSnapshot`]
///
/// Mirrors the teacher's `Stats` (lock-free atomics for hot counters); the
/// few fields that aren't plain integers (transport state, last error) use a
/// `parking_lot::RwLock` sized to a single small struct, never held across I/O.
pub struct Status {
    port_name: String,
    serial_connected: AtomicBool,
    transport_state: RwLock<TransportState>,
    messages_sent: AtomicU64,
    messages_buffered: AtomicU64,
    last_error: RwLock<Option<String>>,
    start_time: DateTime<Utc>,
}

impl Status {
    pub fn new(port_name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            port_name: port_name.into(),
            serial_connected: AtomicBool::new(false),
            transport_state: RwLock::new(TransportState::Disconnected),
            messages_sent: AtomicU64::new(0),
            messages_buffered: AtomicU64::new(0),
            last_error: RwLock::new(None),
            start_time: Utc::now(),
        })
    }

    pub fn set_serial_connected(&self, connected: bool) {
        self.serial_connected.store(connected, Ordering::Relaxed);
    }

    pub fn set_transport_state(&self, state: TransportState) {
        *self.transport_state.write() = state;
    }

    pub fn transport_state(&self) -> TransportState {
        *self.transport_state.read()
    }

    pub fn record_sent(&self, count: u64) {
        self.messages_sent.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_buffered(&self) {
        self.messages_buffered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_last_error(&self, message: impl Into<String>) {
        *self.last_error.write() = Some(message.into());
    }

    pub fn snapshot(&self, buffered_count: u64) -> StatusSnapshot {
        StatusSnapshot {
            port_name: self.port_name.clone(),
            serial_connected: self.serial_connected.load(Ordering::Relaxed),
            transport_state: self.transport_state(),
            buffered_count,
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            messages_buffered: self.messages_buffered.load(Ordering::Relaxed),
            last_error: self.last_error.read().clone(),
            start_time: self.start_time,
        }
    }
}
