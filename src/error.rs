//! Centralized error types for the forwarder
//!
//! All forwarder errors are represented by the `ForwarderError` enum.
//! Use `Result<T>` as shorthand for `std::result::Result<T, ForwarderError>`.

use std::fmt;
use std::path::PathBuf;

/// All forwarder errors
#[derive(Debug)]
pub enum ForwarderError {
    // === Config ===
    /// Invalid or unreadable configuration document; fatal at startup
    Config { reason: String },

    // === Serial ===
    /// Failed to open the serial device
    SerialOpen {
        port: String,
        source: std::io::Error,
    },
    /// Transient error while reading the serial device
    SerialRead {
        port: String,
        source: std::io::Error,
    },

    // === Transport ===
    /// Failed to establish the remote connection (TCP connect, or first HTTP request)
    TransportConnect { endpoint: String, reason: String },
    /// Failed to write a message to an established transport
    TransportWrite { endpoint: String, reason: String },
    /// Transport acknowledged the request but the response violated the protocol
    /// (wrong status, malformed body, length mismatch)
    TransportProtocol { endpoint: String, reason: String },

    // === Durable store ===
    /// A durable-store write failed; the caller must treat the message as still volatile
    Persist { port: String, reason: String },

    // === Lifecycle ===
    /// A worker did not stop within its shutdown deadline
    ShutdownTimeout { port: String, worker: &'static str },

    // === I/O ===
    /// Generic I/O failure outside the above categories (e.g. buffer directory creation)
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl std::error::Error for ForwarderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::SerialOpen { source, .. }
            | Self::SerialRead { source, .. }
            | Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl fmt::Display for ForwarderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config { reason } => write!(f, "invalid configuration: {}", reason),
            Self::SerialOpen { port, source } => {
                write!(f, "cannot open serial port {}: {}", port, source)
            }
            Self::SerialRead { port, source } => {
                write!(f, "serial read error on {}: {}", port, source)
            }
            Self::TransportConnect { endpoint, reason } => {
                write!(f, "cannot connect to {}: {}", endpoint, reason)
            }
            Self::TransportWrite { endpoint, reason } => {
                write!(f, "write to {} failed: {}", endpoint, reason)
            }
            Self::TransportProtocol { endpoint, reason } => {
                write!(f, "protocol error from {}: {}", endpoint, reason)
            }
            Self::Persist { port, reason } => {
                write!(f, "[{}] durable store write failed: {}", port, reason)
            }
            Self::ShutdownTimeout { port, worker } => {
                write!(f, "[{}] {} did not stop within its deadline", port, worker)
            }
            Self::Io { path, source } => {
                write!(f, "I/O error on {}: {}", path.display(), source)
            }
        }
    }
}

/// Alias for Result with ForwarderError
pub type Result<T> = std::result::Result<T, ForwarderError>;
