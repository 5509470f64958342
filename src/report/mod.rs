//! Run output: console text and the persisted JSON artifacts.

pub mod console;
pub mod json;

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{error, warn};

use crate::models::TestReport;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to create directory {}: {source}", .path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Paths of the artifacts that were written.
#[derive(Debug, Default)]
pub struct Saved {
    pub report: Option<PathBuf>,
    pub tag_map: Option<PathBuf>,
}

/// Persist both artifacts. A failed detailed report is only logged; a failed
/// tag map is returned, since schedulers watch the exit code for it.
pub fn persist(
    report: &TestReport,
    output_dir: &Path,
    tag_map: Option<&Path>,
) -> Result<Saved, ReportError> {
    let mut saved = Saved::default();

    match json::save_report(report, output_dir) {
        Ok(path) => saved.report = Some(path),
        Err(e) => warn!(error = %e, "detailed report not saved"),
    }

    if let Some(path) = tag_map {
        if let Err(e) = json::save_tag_map(report, path) {
            error!(error = %e, "tag map not saved");
            return Err(e);
        }
        saved.tag_map = Some(path.to_path_buf());
    }

    Ok(saved)
}
