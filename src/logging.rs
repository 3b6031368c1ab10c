//! Tracing initialization
//!
//! A `tracing-subscriber` registry with a compact `fmt` layer and an
//! `EnvFilter` driven by `-v`/`--verbose` and `RUST_LOG`. Replaces the
//! teacher's broadcast-to-TUI logging stack (out of scope for a headless
//! daemon) while keeping the same `tracing` foundation.

use tracing_subscriber::EnvFilter;

pub fn init(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
