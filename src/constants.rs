//! Application-wide constants
//!
//! Centralized constants to avoid duplication and ensure consistency.

// =============================================================================
// Durability defaults
// =============================================================================

/// Default in-memory/on-disk buffer capacity per port, in messages
pub const DEFAULT_BUFFER_SIZE: usize = 10_000;

/// Default delay between serial/transport reconnect attempts (seconds)
pub const DEFAULT_RECONNECT_INTERVAL_SECS: u64 = 5;

/// Default idle threshold that closes an accumulated message (seconds)
pub const DEFAULT_SEND_DELAY_SECS: u64 = 5;

/// Retention window for sent messages (seconds) — 30 days
pub const RETENTION_MAX_AGE_SECS: i64 = 30 * 24 * 60 * 60;

// =============================================================================
// Timing - Accumulator
// =============================================================================

/// How often the idle timer checks the accumulator (milliseconds, spec caps at 500ms)
pub const ACCUMULATOR_CHECK_PERIOD_MS: u64 = 100;

/// How often the in-flight accumulator is mirrored to the pending-accumulator record (seconds)
pub const PENDING_MIRROR_INTERVAL_SECS: u64 = 2;

// =============================================================================
// Timing - Retry & Retention
// =============================================================================

/// Interval between retry-timer flush attempts, independent of transport state (seconds)
pub const RETRY_TIMER_INTERVAL_SECS: u64 = 30;

/// Interval between retention sweeps (seconds)
pub const RETENTION_SWEEP_INTERVAL_SECS: u64 = 3600;

/// Interval of the Direct-TCP liveness probe (seconds)
pub const LIVENESS_PROBE_INTERVAL_SECS: u64 = 1;

// =============================================================================
// Timing - Transport
// =============================================================================

/// Connect timeout for the Direct-TCP variant (seconds)
pub const TCP_CONNECT_TIMEOUT_SECS: u64 = 5;

/// Request timeout for the HTTP-relay variant (seconds)
pub const HTTP_REQUEST_TIMEOUT_SECS: u64 = 10;

/// TCP keepalive idle time before probing (seconds)
pub const TCP_KEEPALIVE_IDLE_SECS: u64 = 1;

/// TCP keepalive probe interval (seconds). `TCP_KEEPINTVL` is a whole-second
/// kernel option; a sub-second value truncates to zero and `setsockopt`
/// rejects it with `EINVAL`.
pub const TCP_KEEPALIVE_INTERVAL_SECS: u64 = 1;

// =============================================================================
// Lifecycle
// =============================================================================

/// Per-worker join deadline during engine stop (milliseconds)
pub const WORKER_SHUTDOWN_DEADLINE_MS: u64 = 3_000;

/// Supervisor-wide shutdown deadline across all engines (milliseconds)
pub const SUPERVISOR_SHUTDOWN_DEADLINE_MS: u64 = 10_000;

// =============================================================================
// Buffers
// =============================================================================

/// Serial read buffer size
pub const SERIAL_READ_BUFFER_SIZE: usize = 4096;

/// Channel capacity between the serial reader thread and the accumulator task
pub const CHANNEL_CAPACITY: usize = 256;
