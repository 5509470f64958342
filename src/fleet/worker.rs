//! One worker: a proxy core bound to a probe battery, draining the shared
//! job queue until it closes.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use crate::core::{ProxyCore, WorkerSlot};
use crate::models::{NodeTestResult, SkippedRoute};
use crate::probes::ProbeBattery;
use crate::source::Route;

/// Shared single-producer, multi-consumer job source.
pub type JobQueue = Arc<Mutex<mpsc::Receiver<Arc<Route>>>>;

/// What a worker emits for each route it claims.
#[derive(Debug)]
pub enum WorkerEvent {
    Tested(NodeTestResult),
    /// The core refused the switch; the route was not probed.
    Skipped(SkippedRoute),
}

pub struct Worker<C> {
    pub slot: WorkerSlot,
    pub core: C,
    battery: ProbeBattery,
    settle: Duration,
    verify_switch: bool,
}

impl<C: ProxyCore> Worker<C> {
    pub fn new(
        slot: WorkerSlot,
        core: C,
        battery: ProbeBattery,
        settle: Duration,
        verify_switch: bool,
    ) -> Self {
        Self {
            slot,
            core,
            battery,
            settle,
            verify_switch,
        }
    }

    /// Drain `jobs`, sending one event per claimed route. Hands the worker
    /// back so the caller can stop its core.
    pub async fn run(self, jobs: JobQueue, results: mpsc::Sender<WorkerEvent>) -> Self {
        let worker = self.slot.id;
        let mut claimed = 0usize;

        loop {
            // Guard is dropped at the end of the statement, before probing.
            let next = jobs.lock().await.recv().await;
            let Some(route) = next else { break };
            claimed += 1;

            let event = self.test_route(&route).await;
            if results.send(event).await.is_err() {
                warn!(worker, "result channel closed, stopping early");
                break;
            }
        }

        info!(worker, claimed, "job queue drained");
        self
    }

    /// Switch, settle, probe.
    pub async fn test_route(&self, route: &Route) -> WorkerEvent {
        let worker = self.slot.id;

        if let Err(e) = self.core.switch_to(&route.name).await {
            warn!(worker, route = %route.name, error = %e, "route switch failed, skipping");
            return WorkerEvent::Skipped(SkippedRoute {
                node_name: route.name.clone(),
                error: e.to_string(),
            });
        }

        tokio::time::sleep(self.settle).await;

        if self.verify_switch {
            match self.core.active_route().await {
                Ok(active) if active != route.name => {
                    warn!(worker, route = %route.name, %active, "core reports a different active route");
                }
                Ok(_) => {}
                Err(e) => warn!(worker, route = %route.name, error = %e, "could not verify active route"),
            }
        }

        debug!(worker, route = %route.name, "probing");
        WorkerEvent::Tested(self.battery.run(route).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProbeConfig;
    use crate::core::CoreError;
    use crate::probes::Endpoints;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Refuses every switch and counts how often it was asked.
    struct RefusingCore {
        switches: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl ProxyCore for RefusingCore {
        async fn start(&mut self) -> Result<(), CoreError> {
            Ok(())
        }

        async fn stop(&mut self) {}

        async fn switch_to(&self, route: &str) -> Result<(), CoreError> {
            self.switches.fetch_add(1, Ordering::SeqCst);
            Err(CoreError::SwitchFailed {
                route: route.to_string(),
                status: Some(400),
                detail: "proxy not exist".to_string(),
            })
        }

        async fn active_route(&self) -> Result<String, CoreError> {
            Ok(String::new())
        }

        fn proxy_url(&self) -> Option<String> {
            None
        }
    }

    fn worker() -> Worker<RefusingCore> {
        let slot = WorkerSlot {
            id: 1,
            port: 7890,
            api_port: 9090,
            config_path: PathBuf::from("temp_worker_1.yaml"),
        };
        let battery =
            ProbeBattery::new(None, Arc::new(Endpoints::default()), &ProbeConfig::default()).unwrap();
        Worker::new(
            slot,
            RefusingCore {
                switches: AtomicUsize::new(0),
            },
            battery,
            Duration::ZERO,
            false,
        )
    }

    fn routes() -> Vec<Route> {
        crate::source::parse(
            b"proxies:\n  - {name: a, type: trojan, server: h, port: 1, password: p}\n  - {name: b, type: trojan, server: h, port: 2, password: p}\n",
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_failed_switch_is_skipped_without_probing() {
        let route = routes().remove(0);
        match worker().test_route(&route).await {
            WorkerEvent::Skipped(s) => {
                assert_eq!(s.node_name, "a");
                assert!(s.error.contains("proxy not exist"));
            }
            WorkerEvent::Tested(_) => panic!("route should have been skipped"),
        }
    }

    #[tokio::test]
    async fn test_run_drains_queue_and_returns_worker() {
        let (job_tx, job_rx) = mpsc::channel(2);
        for route in routes() {
            job_tx.send(Arc::new(route)).await.unwrap();
        }
        drop(job_tx);

        let (result_tx, mut result_rx) = mpsc::channel(2);
        let jobs: JobQueue = Arc::new(Mutex::new(job_rx));
        let worker = worker().run(jobs, result_tx).await;

        assert_eq!(worker.core.switches.load(Ordering::SeqCst), 2);
        let mut skipped = 0;
        while let Some(event) = result_rx.recv().await {
            assert!(matches!(event, WorkerEvent::Skipped(_)));
            skipped += 1;
        }
        assert_eq!(skipped, 2);
    }
}
