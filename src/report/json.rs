//! JSON artifacts: the detailed run report and the condensed tag map.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::ReportError;
use crate::models::{ApiService, ServiceTest, StreamService, StreamTest, TestReport};
use crate::probes::streaming::YOUTUBE_PREMIUM;

/// Condensed per-route record consumed by subscription managers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeTagData {
    pub update_time: DateTime<Local>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub openai: Option<ServiceTest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gemini: Option<ServiceTest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claude: Option<ServiceTest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub netflix: Option<StreamTagData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disney: Option<StreamTagData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub youtube: Option<StreamTagData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<StreamTagData>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamTagData {
    pub available: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    /// Netflix catalog tier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    /// YouTube premium marker seen.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub premium: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StreamTagData {
    fn condense(service: StreamService, test: &StreamTest) -> Self {
        let details = test.details.as_deref();
        Self {
            available: test.available,
            region: test.region.clone(),
            result: match service {
                StreamService::Netflix => test.details.clone(),
                _ => None,
            },
            premium: service == StreamService::Youtube && details == Some(YOUTUBE_PREMIUM),
            error: test.error.clone(),
        }
    }
}

/// Build the tag map keyed by route name.
pub fn tag_map(report: &TestReport, now: DateTime<Local>) -> BTreeMap<String, NodeTagData> {
    report
        .results
        .iter()
        .map(|result| {
            let api = |s: ApiService| result.tests.get(&s).cloned();
            let stream = |s: StreamService| {
                result
                    .stream_tests
                    .get(&s)
                    .map(|t| StreamTagData::condense(s, t))
            };
            let data = NodeTagData {
                update_time: now,
                openai: api(ApiService::OpenAi),
                gemini: api(ApiService::Gemini),
                claude: api(ApiService::Claude),
                netflix: stream(StreamService::Netflix),
                disney: stream(StreamService::Disney),
                youtube: stream(StreamService::Youtube),
                max: stream(StreamService::Max),
            };
            (result.node_name.clone(), data)
        })
        .collect()
}

fn create_dir(dir: &Path) -> Result<(), ReportError> {
    if dir.as_os_str().is_empty() {
        return Ok(());
    }
    std::fs::create_dir_all(dir).map_err(|source| ReportError::CreateDir {
        path: dir.to_path_buf(),
        source,
    })
}

fn write(path: &Path, data: &[u8]) -> Result<(), ReportError> {
    std::fs::write(path, data).map_err(|source| ReportError::Write {
        path: path.to_path_buf(),
        source,
    })
}

/// Write the full report to `<dir>/test_result_<YYYYmmdd_HHMMSS>.json`.
pub fn save_report(report: &TestReport, dir: &Path) -> Result<PathBuf, ReportError> {
    create_dir(dir)?;
    let path = dir.join(format!(
        "test_result_{}.json",
        report.test_time.format("%Y%m%d_%H%M%S")
    ));
    let data = serde_json::to_vec_pretty(report)?;
    write(&path, &data)?;
    info!(path = %path.display(), "detailed report saved");
    Ok(path)
}

/// Write the tag map to `path`, creating its parent directory first.
pub fn save_tag_map(report: &TestReport, path: &Path) -> Result<(), ReportError> {
    if let Some(parent) = path.parent() {
        create_dir(parent)?;
    }
    let data = serde_json::to_vec_pretty(&tag_map(report, Local::now()))?;
    write(path, &data)?;
    info!(path = %path.display(), routes = report.results.len(), "tag map saved");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NodeTestResult;

    fn report() -> TestReport {
        let tests = ApiService::ALL
            .iter()
            .map(|s| {
                let mut t = ServiceTest::new(*s);
                t.attempts = 1;
                (*s, t)
            })
            .collect();
        let mut stream_tests: BTreeMap<_, _> = StreamService::ALL
            .iter()
            .map(|s| (*s, StreamTest::new(*s)))
            .collect();
        let nf = stream_tests.get_mut(&StreamService::Netflix).unwrap();
        nf.available = true;
        nf.details = Some("Originals Only".to_string());
        let yt = stream_tests.get_mut(&StreamService::Youtube).unwrap();
        yt.available = true;
        yt.details = Some(YOUTUBE_PREMIUM.to_string());

        let mut report = TestReport::new("sub.yaml", 1);
        report.results.push(NodeTestResult {
            node_name: "sg-01".to_string(),
            node_type: "vmess".to_string(),
            server: "h".to_string(),
            tests,
            stream_tests,
            total_time_ms: 5,
        });
        report.tested_nodes = 1;
        report
    }

    #[test]
    fn test_tag_map_condenses_streaming() {
        let map = tag_map(&report(), Local::now());
        let node = &map["sg-01"];

        assert_eq!(node.openai.as_ref().unwrap().attempts, 1);
        let nf = node.netflix.as_ref().unwrap();
        assert_eq!(nf.result.as_deref(), Some("Originals Only"));
        assert!(!nf.premium);
        let yt = node.youtube.as_ref().unwrap();
        assert!(yt.premium);
        assert_eq!(yt.result, None);

        let json = serde_json::to_value(&map).unwrap();
        assert!(json["sg-01"]["update_time"].is_string());
        assert!(json["sg-01"]["disney"].get("premium").is_none());
    }

    #[test]
    fn test_save_report_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("result");
        let report = report();

        let path = save_report(&report, &out).unwrap();
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("test_result_") && name.ends_with(".json"));

        let back: TestReport = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(back.results, report.results);
    }

    #[test]
    fn test_save_tag_map_creates_parent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/tags.json");
        save_tag_map(&report(), &path).unwrap();
        assert!(path.exists());
    }
}
