//! clashprobe -- route reachability tester driving a fleet of mihomo cores.
//!
//! This crate loads a route subscription, starts one proxy core per worker,
//! switches each core through the routes via its control API and runs a
//! battery of service probes through it, then reports and persists results.

pub mod config;
pub mod core;
pub mod fleet;
pub mod models;
pub mod probes;
pub mod report;
pub mod source;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;

use crate::config::Settings;
use crate::core::MihomoLauncher;
use crate::fleet::Fleet;
use crate::models::TestReport;
use crate::report::Saved;

/// Command-line level options. `None` leaves the tuning value in place.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Subscription URL or local file path.
    pub source: String,
    /// Directory for the detailed JSON report.
    pub output: PathBuf,
    /// Path of the condensed tag map; disabled when `None`.
    pub map_output: Option<PathBuf>,
    pub mihomo: Option<PathBuf>,
    pub workers: Option<usize>,
    /// Explicit TOML tuning file.
    pub config: Option<PathBuf>,
}

impl RunOptions {
    /// Layer the flags over the tuning file.
    pub fn settings(&self) -> Result<Settings> {
        let mut settings = Settings::resolve(self.config.as_deref())?;
        if let Some(binary) = &self.mihomo {
            settings.core.binary = binary.clone();
        }
        if let Some(workers) = self.workers {
            settings.fleet.workers = workers;
        }
        Ok(settings)
    }
}

/// Load routes, test them all, print and persist the report.
///
/// Returns `Err` for startup failures and for a tag map that could not be
/// written; everything else, including routes that failed every probe, is
/// a successful run.
pub async fn run(opts: &RunOptions) -> Result<TestReport> {
    let settings = opts.settings()?;

    println!("{}", report::console::banner());

    let raw = source::load(&opts.source, Duration::from_secs(settings.source.timeout_secs))
        .await
        .context("failed to load route source")?;
    let routes = source::parse(&raw).context("failed to parse route source")?;
    info!(routes = routes.len(), workers = settings.fleet.workers, "routes loaded");

    let fleet = Fleet::new(MihomoLauncher::new(settings.core.clone()), &settings);
    let report = fleet
        .run(&routes, &opts.source, |done, total, result| {
            println!("{}", report::console::progress_line(done, total, result));
        })
        .await
        .context("fleet run aborted")?;

    publish(&report, &opts.output, opts.map_output.as_deref())?;

    Ok(report)
}

/// Print the full report and persist the artifacts of a finished run.
///
/// An unwritable detailed report is only logged. An unwritable tag map is an
/// `Err`, which `main` turns into a non-zero exit status.
pub fn publish(report: &TestReport, output: &Path, map_output: Option<&Path>) -> Result<Saved> {
    println!("{}", report::console::full_report(report));

    let saved = report::persist(report, output, map_output).context("failed to save tag map")?;
    if let Some(path) = &saved.report {
        println!("Detailed report: {}", path.display());
    }
    if let Some(path) = &saved.tag_map {
        println!("Tag map: {}", path.display());
    }

    Ok(saved)
}
