//! Serial-to-network forwarding daemon library
//!
//! Exposes the engine/buffer/transport pipeline so the `forwarder-daemon`
//! binary and the integration test suite share the same implementation.

pub mod accumulator;
pub mod buffer;
pub mod cli;
pub mod config;
pub mod constants;
pub mod engine;
pub mod error;
pub mod logging;
pub mod serial;
pub mod status;
pub mod supervisor;
pub mod transport;
