//! Serial Reader
//!
//! Keeps a serial device open and streams newly available bytes out over a
//! channel. Follows the teacher's reader-thread-bridged-via-mpsc pattern
//! (`transport/serial.rs`): the `serialport` crate is blocking, so reading
//! happens on a dedicated OS thread and is bridged to the async world with
//! `tokio::sync::mpsc`. Unlike the teacher's fixed-baud USB CDC transport,
//! every serial parameter here is configurable per port, and disconnection
//! is detected by a true read error rather than a run of zero-byte reads —
//! a zero-byte read is simply "no new data" (spec.md §4.1).

use crate::config::PortConfig;
use crate::constants::{CHANNEL_CAPACITY, SERIAL_READ_BUFFER_SIZE};
use crate::error::{ForwarderError, Result};
use bytes::Bytes;
use serialport::{DataBits, Parity, SerialPort, StopBits};
use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

fn data_bits(bytesize: u8) -> DataBits {
    match bytesize {
        5 => DataBits::Five,
        6 => DataBits::Six,
        7 => DataBits::Seven,
        _ => DataBits::Eight,
    }
}

fn parity(c: char) -> Parity {
    match c {
        'E' => Parity::Even,
        'O' => Parity::Odd,
        _ => Parity::None,
    }
}

fn stop_bits(n: f32) -> StopBits {
    if n >= 2.0 {
        StopBits::Two
    } else {
        StopBits::One
    }
}

fn open(config: &PortConfig) -> Result<Box<dyn SerialPort>> {
    serialport::new(&config.serial_port, config.serial_baudrate)
        .data_bits(data_bits(config.serial_bytesize))
        .parity(parity(config.serial_parity))
        .stop_bits(stop_bits(config.serial_stopbits))
        .timeout(Duration::from_millis(config.serial_timeout))
        .flow_control(if config.serial_rtscts {
            serialport::FlowControl::Hardware
        } else if config.serial_xonxoff {
            serialport::FlowControl::Software
        } else {
            serialport::FlowControl::None
        })
        .open()
        .map_err(|e| ForwarderError::SerialOpen {
            port: config.serial_port.clone(),
            source: std::io::Error::other(e.to_string()),
        })
}

/// Receiving half: forwards chunks read from the device. Owned by whichever
/// task drains the Accumulator.
pub struct SerialReader {
    rx: mpsc::Receiver<Bytes>,
    connected: Arc<AtomicBool>,
}

impl SerialReader {
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.rx.recv().await
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    /// Build a receiving half around an already-open channel instead of a
    /// real reader thread — the seam `PortEngine::start_with` uses to drive
    /// the accumulator/transport pipeline from test-supplied bytes without
    /// serial hardware.
    pub fn from_channel(rx: mpsc::Receiver<Bytes>, connected: Arc<AtomicBool>) -> Self {
        Self { rx, connected }
    }
}

/// Control half: lets the engine stop the reader thread promptly on
/// shutdown (spec.md §4.6, step 2) independent of whoever holds the
/// receiving half.
pub struct SerialReaderControl {
    shutdown: Arc<AtomicBool>,
    handle: Option<std::thread::JoinHandle<()>>,
}

impl SerialReaderControl {
    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Spawn the reader thread, returning the receiving and control halves
pub fn spawn(config: PortConfig) -> (SerialReader, SerialReaderControl) {
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    let shutdown = Arc::new(AtomicBool::new(false));
    let connected = Arc::new(AtomicBool::new(false));

    let thread_shutdown = shutdown.clone();
    let thread_connected = connected.clone();
    let port_name = config.name.clone();

    let handle = std::thread::spawn(move || {
        reader_loop(config, tx, thread_shutdown, thread_connected, port_name);
    });

    (
        SerialReader { rx, connected },
        SerialReaderControl {
            shutdown,
            handle: Some(handle),
        },
    )
}

fn reader_loop(
    config: PortConfig,
    tx: mpsc::Sender<Bytes>,
    shutdown: Arc<AtomicBool>,
    connected: Arc<AtomicBool>,
    port_name: String,
) {
    let mut buf = [0u8; SERIAL_READ_BUFFER_SIZE];

    while !shutdown.load(Ordering::Relaxed) {
        let mut port = match open(&config) {
            Ok(p) => {
                connected.store(true, Ordering::Relaxed);
                debug!(port = %port_name, "serial device opened");
                p
            }
            Err(e) => {
                warn!(port = %port_name, error = %e, "serial open failed, retrying");
                connected.store(false, Ordering::Relaxed);
                sleep_with_cancellation(&shutdown, Duration::from_secs(config.reconnect_interval));
                continue;
            }
        };

        loop {
            if shutdown.load(Ordering::Relaxed) {
                return;
            }

            match port.read(&mut buf) {
                Ok(0) => {
                    // No new data; not a disconnect signal.
                }
                Ok(n) => {
                    if tx.blocking_send(Bytes::copy_from_slice(&buf[..n])).is_err() {
                        return;
                    }
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::TimedOut => {
                    // Normal read-timeout poll; device is still present.
                }
                Err(e) => {
                    warn!(port = %port_name, error = %e, "serial read error, reopening");
                    break;
                }
            }
        }

        connected.store(false, Ordering::Relaxed);
        sleep_with_cancellation(&shutdown, Duration::from_secs(config.reconnect_interval));
    }
}

fn sleep_with_cancellation(shutdown: &Arc<AtomicBool>, total: Duration) {
    const POLL: Duration = Duration::from_millis(100);
    let mut remaining = total;
    while remaining > Duration::ZERO && !shutdown.load(Ordering::Relaxed) {
        let step = remaining.min(POLL);
        std::thread::sleep(step);
        remaining = remaining.saturating_sub(step);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_bits_maps_documented_domain() {
        assert!(matches!(data_bits(5), DataBits::Five));
        assert!(matches!(data_bits(6), DataBits::Six));
        assert!(matches!(data_bits(7), DataBits::Seven));
        assert!(matches!(data_bits(8), DataBits::Eight));
    }

    #[test]
    fn parity_maps_documented_domain() {
        assert!(matches!(parity('N'), Parity::None));
        assert!(matches!(parity('E'), Parity::Even));
        assert!(matches!(parity('O'), Parity::Odd));
    }

    #[test]
    fn stop_bits_rounds_to_nearest_supported_value() {
        assert!(matches!(stop_bits(1.0), StopBits::One));
        assert!(matches!(stop_bits(1.5), StopBits::One));
        assert!(matches!(stop_bits(2.0), StopBits::Two));
    }

    #[test]
    fn open_unreadable_port_surfaces_serial_open_error() {
        let config = PortConfig {
            name: "test".into(),
            serial_port: "/dev/nonexistent-forwarder-test-port".into(),
            serial_baudrate: 9600,
            serial_bytesize: 8,
            serial_parity: 'N',
            serial_stopbits: 1.0,
            serial_timeout: 100,
            serial_xonxoff: false,
            serial_rtscts: false,
            tcp_host: "localhost".into(),
            tcp_port: 1,
            http_url: None,
            buffer_size: 10,
            reconnect_interval: 1,
            send_delay: 1,
        };

        assert!(matches!(
            open(&config),
            Err(ForwarderError::SerialOpen { .. })
        ));
    }
}
