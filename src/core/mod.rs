//! Proxy-core supervision: the external mihomo process and its control API.

pub mod control;
pub mod process;

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::config::{mihomo, CoreConfig};
use crate::source::Route;
pub use control::{ControlClient, GroupState};
pub use process::{CoreProcess, HealthPolicy};

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("proxy core binary not found at {}", .path.display())]
    BinaryNotFound { path: PathBuf },

    #[error("failed to spawn {}: {source}", .binary.display())]
    Spawn {
        binary: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("proxy core on api port {api_port} not healthy after {waited:?}")]
    StartTimeout { api_port: u16, waited: Duration },

    #[error("failed to switch to {route} (status {}): {detail}", status_text(.status))]
    SwitchFailed {
        route: String,
        status: Option<u16>,
        detail: String,
    },

    #[error("control api {stage} failed: {source}")]
    Control {
        stage: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to write config {}: {detail}", .path.display())]
    ConfigWrite { path: PathBuf, detail: String },
}

fn status_text(status: &Option<u16>) -> String {
    status.map_or_else(|| "none".to_string(), |s| s.to_string())
}

/// Everything one worker owns exclusively for the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerSlot {
    /// 1-based worker id.
    pub id: usize,
    pub port: u16,
    pub api_port: u16,
    pub config_path: PathBuf,
}

/// A running proxy core as seen by a worker.
#[async_trait::async_trait]
pub trait ProxyCore: Send + Sync {
    /// Launch and wait until healthy.
    async fn start(&mut self) -> Result<(), CoreError>;

    /// Tear down. Idempotent, and a no-op if never started.
    async fn stop(&mut self);

    /// Select `route` as the active member of the route group.
    async fn switch_to(&self, route: &str) -> Result<(), CoreError>;

    /// Name of the currently selected route.
    async fn active_route(&self) -> Result<String, CoreError>;

    /// Local proxy endpoint that probes are sent through, if any.
    fn proxy_url(&self) -> Option<String>;
}

/// Builds the core for a slot, writing whatever on-disk artifacts it needs
/// at `slot.config_path`.
pub trait CoreLauncher: Send + Sync {
    type Core: ProxyCore + 'static;

    fn prepare(&self, slot: &WorkerSlot, routes: &[Route]) -> Result<Self::Core, CoreError>;
}

// ---------------------------------------------------------------------------
// mihomo
// ---------------------------------------------------------------------------

/// mihomo process plus its control client.
pub struct MihomoCore {
    process: CoreProcess,
    control: ControlClient,
    port: u16,
}

impl MihomoCore {
    pub fn new(cfg: &CoreConfig, slot: &WorkerSlot) -> Result<Self, CoreError> {
        let process = CoreProcess::new(
            &cfg.binary,
            &cfg.fallback_binary,
            &slot.config_path,
            slot.api_port,
            HealthPolicy::from(cfg),
        );
        let control = ControlClient::new(
            slot.api_port,
            &cfg.group,
            Duration::from_secs(cfg.switch_timeout_secs),
        )?;
        Ok(Self {
            process,
            control,
            port: slot.port,
        })
    }
}

#[async_trait::async_trait]
impl ProxyCore for MihomoCore {
    async fn start(&mut self) -> Result<(), CoreError> {
        self.process.start().await
    }

    async fn stop(&mut self) {
        self.process.stop().await
    }

    async fn switch_to(&self, route: &str) -> Result<(), CoreError> {
        self.control.switch_to(route).await
    }

    async fn active_route(&self) -> Result<String, CoreError> {
        Ok(self.control.group_state().await?.now)
    }

    fn proxy_url(&self) -> Option<String> {
        Some(format!("http://127.0.0.1:{}", self.port))
    }
}

/// Writes the worker's mihomo config and builds a [`MihomoCore`] for it.
pub struct MihomoLauncher {
    cfg: CoreConfig,
}

impl MihomoLauncher {
    pub fn new(cfg: CoreConfig) -> Self {
        Self { cfg }
    }
}

impl CoreLauncher for MihomoLauncher {
    type Core = MihomoCore;

    fn prepare(&self, slot: &WorkerSlot, routes: &[Route]) -> Result<MihomoCore, CoreError> {
        mihomo::write_config(routes, &slot.config_path, &self.cfg.group, slot.port, slot.api_port)?;
        MihomoCore::new(&self.cfg, slot)
    }
}
