//! Lifecycle of one external mihomo process: spawn, health wait, kill.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use super::CoreError;
use crate::config::CoreConfig;

/// How long to wait for the control endpoint to come up.
#[derive(Debug, Clone, Copy)]
pub struct HealthPolicy {
    pub interval: Duration,
    pub attempts: u32,
    pub request_timeout: Duration,
}

impl Default for HealthPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(500),
            attempts: 20,
            request_timeout: Duration::from_secs(1),
        }
    }
}

impl HealthPolicy {
    /// Upper bound on the time spent polling, clamped at `Duration::MAX`.
    pub fn budget(&self) -> Duration {
        self.interval.saturating_mul(self.attempts)
    }
}

impl From<&CoreConfig> for HealthPolicy {
    fn from(cfg: &CoreConfig) -> Self {
        Self {
            interval: Duration::from_millis(cfg.health_interval_ms),
            attempts: cfg.health_attempts,
            request_timeout: Duration::from_millis(cfg.health_timeout_ms),
        }
    }
}

/// Supervisor for a single proxy-core process.
pub struct CoreProcess {
    binary: PathBuf,
    fallback_binary: PathBuf,
    config_path: PathBuf,
    api_port: u16,
    health: HealthPolicy,
    child: Option<Child>,
}

impl CoreProcess {
    pub fn new(
        binary: impl Into<PathBuf>,
        fallback_binary: impl Into<PathBuf>,
        config_path: impl Into<PathBuf>,
        api_port: u16,
        health: HealthPolicy,
    ) -> Self {
        Self {
            binary: binary.into(),
            fallback_binary: fallback_binary.into(),
            config_path: config_path.into(),
            api_port,
            health,
            child: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.child.is_some()
    }

    /// Launch the process and block until its control endpoint answers.
    ///
    /// Any HTTP response counts as healthy, whatever its status.
    pub async fn start(&mut self) -> Result<(), CoreError> {
        let binary = self.resolve_binary()?;
        let config = absolute(&self.config_path).map_err(|e| CoreError::Spawn {
            binary: binary.clone(),
            source: e,
        })?;
        let home = config
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        debug!(binary = %binary.display(), config = %config.display(), "spawning proxy core");
        let child = Command::new(&binary)
            .arg("-f")
            .arg(&config)
            .arg("-d")
            .arg(&home)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| CoreError::Spawn {
                binary: binary.clone(),
                source: e,
            })?;
        self.child = Some(child);

        if self.wait_healthy().await {
            info!(api_port = self.api_port, "proxy core is healthy");
            Ok(())
        } else {
            Err(CoreError::StartTimeout {
                api_port: self.api_port,
                waited: self.health.budget(),
            })
        }
    }

    /// Kill the process if one is running. Safe to call repeatedly.
    pub async fn stop(&mut self) {
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.kill().await {
                warn!(api_port = self.api_port, error = %e, "failed to kill proxy core");
            } else {
                debug!(api_port = self.api_port, "proxy core stopped");
            }
        }
    }

    fn resolve_binary(&self) -> Result<PathBuf, CoreError> {
        let chosen = if self.binary.exists() {
            &self.binary
        } else if self.fallback_binary.exists() {
            warn!(
                configured = %self.binary.display(),
                fallback = %self.fallback_binary.display(),
                "configured binary missing, using fallback"
            );
            &self.fallback_binary
        } else {
            return Err(CoreError::BinaryNotFound {
                path: self.binary.clone(),
            });
        };
        Ok(absolute(chosen).unwrap_or_else(|_| chosen.clone()))
    }

    async fn wait_healthy(&self) -> bool {
        let client = match reqwest::Client::builder()
            .no_proxy()
            .timeout(self.health.request_timeout)
            .build()
        {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "failed to build health check client");
                return false;
            }
        };
        let url = format!("http://127.0.0.1:{}", self.api_port);

        for attempt in 1..=self.health.attempts {
            if client.get(&url).send().await.is_ok() {
                debug!(attempt, "control endpoint reachable");
                return true;
            }
            tokio::time::sleep(self.health.interval).await;
        }
        false
    }
}

fn absolute(path: &Path) -> std::io::Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}
