//! Fleet orchestration: start one proxy core per worker, feed every route
//! through a shared queue, fan results into the aggregator, and tear the
//! fleet down on every exit path.

pub mod aggregator;
pub mod worker;

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::{FleetConfig, ProbeConfig, Settings};
use crate::core::{CoreError, CoreLauncher, ProxyCore, WorkerSlot};
use crate::models::{NodeTestResult, TestReport};
use crate::probes::{Endpoints, ProbeBattery, ProbeError};
use crate::source::Route;

pub use aggregator::Aggregator;
pub use worker::{JobQueue, Worker, WorkerEvent};

#[derive(Debug, Error)]
pub enum FleetError {
    #[error("no supported routes to test")]
    NoRoutes,

    #[error("worker count must be at least 1")]
    NoWorkers,

    #[error("port layout overflows for worker {worker}")]
    PortRange { worker: usize },

    #[error("worker {worker} would reuse port {port}")]
    PortOverlap { worker: usize, port: u16 },

    #[error("worker {worker} failed to start: {source}")]
    Startup {
        worker: usize,
        #[source]
        source: CoreError,
    },

    #[error("worker {worker} could not build its probe client: {source}")]
    Battery {
        worker: usize,
        #[source]
        source: ProbeError,
    },
}

/// Lay out non-overlapping ports and config files for `cfg.workers` workers.
///
/// Each core binds its data port, the SOCKS port right above it, and its
/// control port. No port may be claimed twice across the fleet.
pub fn allocate_slots(cfg: &FleetConfig) -> Result<Vec<WorkerSlot>, FleetError> {
    let slots = (0..cfg.workers)
        .map(|i| {
            let id = i + 1;
            let offset = |base: u16, stride: u16| -> Option<u16> {
                let i = u16::try_from(i).ok()?;
                base.checked_add(stride.checked_mul(i)?)
            };
            let port = offset(cfg.base_port, cfg.port_stride)
                .ok_or(FleetError::PortRange { worker: id })?;
            let api_port = offset(cfg.base_api_port, cfg.api_port_stride)
                .ok_or(FleetError::PortRange { worker: id })?;
            Ok(WorkerSlot {
                id,
                port,
                api_port,
                config_path: cfg.work_dir.join(format!("temp_worker_{id}.yaml")),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut claimed = HashSet::new();
    for slot in &slots {
        let socks = slot
            .port
            .checked_add(1)
            .ok_or(FleetError::PortRange { worker: slot.id })?;
        for port in [slot.port, socks, slot.api_port] {
            if !claimed.insert(port) {
                return Err(FleetError::PortOverlap {
                    worker: slot.id,
                    port,
                });
            }
        }
    }

    Ok(slots)
}

// ---------------------------------------------------------------------------
// Cleanup guards
// ---------------------------------------------------------------------------

/// Generated config files, removed when the guard goes out of scope.
#[derive(Default)]
struct ConfigFiles(Vec<PathBuf>);

impl ConfigFiles {
    fn track(&mut self, path: PathBuf) {
        self.0.push(path);
    }

    fn remove_all(&mut self) {
        for path in self.0.drain(..) {
            match std::fs::remove_file(&path) {
                Ok(()) => debug!(path = %path.display(), "removed worker config"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(path = %path.display(), error = %e, "failed to remove worker config"),
            }
        }
    }
}

impl Drop for ConfigFiles {
    fn drop(&mut self) {
        self.remove_all();
    }
}

/// Spawned worker tasks, aborted if the run is dropped before they finish.
/// An aborted task drops its core, which kills the process.
struct WorkerTasks<C>(Vec<JoinHandle<Worker<C>>>);

impl<C> Drop for WorkerTasks<C> {
    fn drop(&mut self) {
        for handle in &self.0 {
            handle.abort();
        }
    }
}

// ---------------------------------------------------------------------------
// Fleet
// ---------------------------------------------------------------------------

pub struct Fleet<L> {
    launcher: L,
    cfg: FleetConfig,
    probe: ProbeConfig,
    endpoints: Arc<Endpoints>,
}

impl<L> Fleet<L>
where
    L: CoreLauncher,
{
    pub fn new(launcher: L, settings: &Settings) -> Self {
        Self {
            launcher,
            cfg: settings.fleet.clone(),
            probe: settings.probe.clone(),
            endpoints: Arc::new(settings.endpoints.clone()),
        }
    }

    /// Test every route once. `on_result` sees each result as it arrives,
    /// with the running tested count and the route total.
    ///
    /// Any worker failing to start aborts the run after the already started
    /// cores are stopped. Config files are removed on every path.
    pub async fn run<F>(
        &self,
        routes: &[Route],
        source: &str,
        mut on_result: F,
    ) -> Result<TestReport, FleetError>
    where
        F: FnMut(usize, usize, &NodeTestResult),
    {
        if routes.is_empty() {
            return Err(FleetError::NoRoutes);
        }
        if self.cfg.workers == 0 {
            return Err(FleetError::NoWorkers);
        }

        let slots = allocate_slots(&self.cfg)?;
        let mut files = ConfigFiles::default();
        let workers = self.start_workers(slots, routes, &mut files).await?;
        info!(workers = workers.len(), routes = routes.len(), "fleet ready");

        let total = routes.len();
        let (job_tx, job_rx) = mpsc::channel(total);
        for route in routes {
            if job_tx.send(Arc::new(route.clone())).await.is_err() {
                break;
            }
        }
        drop(job_tx);
        let jobs: JobQueue = Arc::new(Mutex::new(job_rx));

        let (result_tx, mut result_rx) = mpsc::channel(total);
        let mut tasks = WorkerTasks(
            workers
                .into_iter()
                .map(|w| tokio::spawn(w.run(jobs.clone(), result_tx.clone())))
                .collect(),
        );
        // The channel closes once the last worker drops its sender.
        drop(result_tx);

        let mut aggregator = Aggregator::new(source, total);
        while let Some(event) = result_rx.recv().await {
            if let Some((done, result)) = aggregator.record(event) {
                on_result(done, total, result);
            }
        }

        for handle in tasks.0.drain(..) {
            match handle.await {
                Ok(mut worker) => worker.core.stop().await,
                Err(e) => error!(error = %e, "worker task did not finish cleanly"),
            }
        }
        files.remove_all();

        let report = aggregator.finish();
        info!(
            tested = report.tested_nodes,
            success = report.success_nodes,
            skipped = report.skipped.len(),
            "fleet finished"
        );
        Ok(report)
    }

    async fn start_workers(
        &self,
        slots: Vec<WorkerSlot>,
        routes: &[Route],
        files: &mut ConfigFiles,
    ) -> Result<Vec<Worker<L::Core>>, FleetError> {
        let mut started: Vec<Worker<L::Core>> = Vec::with_capacity(slots.len());

        for slot in slots {
            let id = slot.id;
            files.track(slot.config_path.clone());

            match self.start_one(slot, routes).await {
                Ok(worker) => {
                    info!(
                        worker = id,
                        port = worker.slot.port,
                        api_port = worker.slot.api_port,
                        "worker started"
                    );
                    started.push(worker);
                }
                Err(e) => {
                    error!(worker = id, error = %e, "worker failed to start, tearing down fleet");
                    for worker in &mut started {
                        worker.core.stop().await;
                    }
                    return Err(e);
                }
            }
        }

        Ok(started)
    }

    async fn start_one(&self, slot: WorkerSlot, routes: &[Route]) -> Result<Worker<L::Core>, FleetError> {
        let id = slot.id;
        let mut core = self
            .launcher
            .prepare(&slot, routes)
            .map_err(|source| FleetError::Startup { worker: id, source })?;

        if let Err(source) = core.start().await {
            core.stop().await;
            return Err(FleetError::Startup { worker: id, source });
        }

        let battery = match ProbeBattery::new(core.proxy_url(), self.endpoints.clone(), &self.probe) {
            Ok(b) => b,
            Err(source) => {
                core.stop().await;
                return Err(FleetError::Battery { worker: id, source });
            }
        };

        Ok(Worker::new(
            slot,
            core,
            battery,
            self.cfg.settle(),
            self.cfg.verify_switch,
        ))
    }
}
