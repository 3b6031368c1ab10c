//! Supervisor
//!
//! Loads the configuration document, instantiates one Port Engine per
//! configured port, and starts them as a group. Holds an explicit owned
//! handle rather than a process-wide global (spec.md §9's redesign note on
//! the original's global "current supervisor" reference shared with the
//! excluded HTTP layer) — `main.rs` owns the single instance and wires
//! signal handling to it directly.

use crate::config::Config;
use crate::constants::SUPERVISOR_SHUTDOWN_DEADLINE_MS;
use crate::engine::PortEngine;
use crate::error::Result;
use crate::status::StatusSnapshot;
use std::path::Path;
use std::time::Duration;
use tracing::{error, warn};

pub struct Supervisor {
    engines: Vec<PortEngine>,
}

impl Supervisor {
    pub async fn new(config: Config, buffer_dir: &Path) -> Result<Self> {
        let mut engines = Vec::with_capacity(config.ports.len());
        for port_config in config.ports {
            engines.push(PortEngine::new(port_config, buffer_dir).await?);
        }
        Ok(Self { engines })
    }

    pub async fn start(&mut self) -> Result<()> {
        for engine in &mut self.engines {
            engine.start().await?;
        }
        Ok(())
    }

    /// Fans out `stop()` to all engines concurrently with a bounded
    /// supervisor-wide join deadline; timeouts are logged, not propagated.
    pub async fn stop(&mut self) {
        let deadline = Duration::from_millis(SUPERVISOR_SHUTDOWN_DEADLINE_MS);
        let names: Vec<String> = self.engines.iter().map(|e| e.name().to_string()).collect();

        let joined = tokio::time::timeout(
            deadline,
            futures_util::future::join_all(self.engines.iter_mut().map(|e| e.stop())),
        )
        .await;

        match joined {
            Ok(results) => {
                for (name, result) in names.iter().zip(results) {
                    if let Err(e) = result {
                        error!(port = %name, error = %e, "engine reported an error while stopping");
                    }
                }
            }
            Err(_) => warn!("supervisor-wide shutdown deadline elapsed before all engines stopped"),
        }
    }

    pub async fn status(&self) -> Result<Vec<StatusSnapshot>> {
        let mut snapshots = Vec::with_capacity(self.engines.len());
        for engine in &self.engines {
            snapshots.push(engine.status().await?);
        }
        Ok(snapshots)
    }
}
