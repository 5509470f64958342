//! TOML tuning for a clashprobe run.
//!
//! Every section is optional: a partial file only overrides the keys it
//! names, and command-line flags are applied on top of whatever is loaded.

pub mod mihomo;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::probes::Endpoints;

/// Environment variable naming a default tuning file.
pub const CONFIG_ENV: &str = "CLASHPROBE_CONFIG";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Root configuration for a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub fleet: FleetConfig,
    #[serde(default)]
    pub core: CoreConfig,
    #[serde(default)]
    pub probe: ProbeConfig,
    #[serde(default)]
    pub endpoints: Endpoints,
    #[serde(default)]
    pub source: SourceConfig,
}

impl Settings {
    /// Load configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let settings: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        info!(path = %path.display(), "loaded tuning configuration");
        Ok(settings)
    }

    /// Resolve the tuning file: an explicit path must load, the
    /// `CLASHPROBE_CONFIG` fallback only warns, and with neither the
    /// compiled-in defaults are used.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }

        if let Ok(env_path) = std::env::var(CONFIG_ENV) {
            let path = Path::new(&env_path);
            match Self::load(path) {
                Ok(settings) => return Ok(settings),
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "CLASHPROBE_CONFIG set but file could not be loaded, using defaults"
                    );
                }
            }
        }

        debug!("no tuning file given, using compiled-in defaults");
        Ok(Self::default())
    }
}

// ---------------------------------------------------------------------------
// Fleet
// ---------------------------------------------------------------------------

/// Worker pool layout and pacing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetConfig {
    /// Number of workers, each bound to its own proxy-core process.
    pub workers: usize,
    /// Data (mixed) port of worker 0.
    pub base_port: u16,
    /// Data port distance between consecutive workers.
    pub port_stride: u16,
    /// Control-API port of worker 0.
    pub base_api_port: u16,
    /// Control-API port distance between consecutive workers.
    pub api_port_stride: u16,
    /// Directory holding the per-worker generated config files.
    pub work_dir: PathBuf,
    /// Wait after a successful switch before probing.
    pub settle_ms: u64,
    /// Query the active route after settling and warn on mismatch.
    pub verify_switch: bool,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            workers: 5,
            base_port: 7890,
            port_stride: 10,
            base_api_port: 9090,
            api_port_stride: 1,
            work_dir: PathBuf::from("."),
            settle_ms: 500,
            verify_switch: false,
        }
    }
}

impl FleetConfig {
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

// ---------------------------------------------------------------------------
// Core
// ---------------------------------------------------------------------------

/// External proxy-core binary and its control plane.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Configured path of the mihomo executable.
    pub binary: PathBuf,
    /// Name looked up in the working directory when `binary` is missing.
    pub fallback_binary: PathBuf,
    /// Delay between health polls of the control endpoint.
    pub health_interval_ms: u64,
    /// Health polls before giving up on a starting process.
    pub health_attempts: u32,
    /// Timeout of a single health poll.
    pub health_timeout_ms: u64,
    /// Timeout of the route switch call.
    pub switch_timeout_secs: u64,
    /// Name of the single-choice selector group.
    pub group: String,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("mihomo.exe"),
            fallback_binary: PathBuf::from("mihomo.exe"),
            health_interval_ms: 500,
            health_attempts: 20,
            health_timeout_ms: 1_000,
            switch_timeout_secs: 5,
            group: "GLOBAL".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Probe
// ---------------------------------------------------------------------------

/// Per-call timeout and retry policy of the probe battery.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    pub timeout_secs: u64,
    /// Extra attempts after the first for API-style services.
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            max_retries: 2,
            retry_delay_ms: 500,
        }
    }
}

// ---------------------------------------------------------------------------
// Source
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Timeout for fetching a remote subscription.
    pub timeout_secs: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self { timeout_secs: 30 }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
