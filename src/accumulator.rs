//! Accumulator
//!
//! Groups serial bytes into idle-delimited messages. Holds a growing byte
//! vector and the timestamp of the last input; a message is ready once the
//! device has been quiet for `send_delay`. Collapses the Reader-forwarding
//! and idle-check concerns into data owned by a single task (spec.md §9
//! permits merging the Accumulator Timer and Reader into one cooperative
//! task "if it preserves the `send_delay` timing within ±`check_period`"),
//! so the byte vector needs no mutex — only `engine.rs`'s port task ever
//! touches it.

use crate::constants::PENDING_MIRROR_INTERVAL_SECS;
use std::time::{Duration, Instant};

pub struct Accumulator {
    buffer: Vec<u8>,
    last_input_time: Option<Instant>,
    last_mirror_time: Instant,
    send_delay: Duration,
}

impl Accumulator {
    pub fn new(send_delay: Duration) -> Self {
        Self {
            buffer: Vec::new(),
            last_input_time: None,
            last_mirror_time: Instant::now(),
            send_delay,
        }
    }

    /// Seed the accumulator from a recovered pending-accumulator record
    pub fn restore(&mut self, bytes: Vec<u8>) {
        if bytes.is_empty() {
            return;
        }
        self.buffer = bytes;
        self.last_input_time = Some(Instant::now());
    }

    pub fn push(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
        self.last_input_time = Some(Instant::now());
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Take ownership of the accumulated bytes if the device has been idle
    /// for at least `send_delay` since the last input
    pub fn try_emit(&mut self) -> Option<Vec<u8>> {
        let idle_since = self.last_input_time?;
        if self.buffer.is_empty() || idle_since.elapsed() < self.send_delay {
            return None;
        }
        self.last_input_time = None;
        Some(std::mem::take(&mut self.buffer))
    }

    /// Returns a snapshot to mirror to the pending-accumulator record if at
    /// least 2 seconds have elapsed since the last mirror and there is
    /// something to mirror
    pub fn mirror_if_due(&mut self) -> Option<Vec<u8>> {
        if self.buffer.is_empty() {
            return None;
        }
        if self.last_mirror_time.elapsed() < Duration::from_secs(PENDING_MIRROR_INTERVAL_SECS) {
            return None;
        }
        self.last_mirror_time = Instant::now();
        Some(self.buffer.clone())
    }

    /// Unconditional final emission on orderly shutdown
    pub fn flush(&mut self) -> Option<Vec<u8>> {
        if self.buffer.is_empty() {
            return None;
        }
        self.last_input_time = None;
        Some(std::mem::take(&mut self.buffer))
    }
}
