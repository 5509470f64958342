//! Persisting run artifacts.

use clashprobe::models::{ApiService, NodeTestResult, ServiceTest, StreamService, StreamTest, TestReport};
use clashprobe::report::{self, ReportError};

fn report() -> TestReport {
    let mut report = TestReport::new("https://sub.example.com/link", 1);
    report.results.push(NodeTestResult {
        node_name: "hk-01".to_string(),
        node_type: "hysteria2".to_string(),
        server: "hk.example.com".to_string(),
        tests: ApiService::ALL
            .iter()
            .map(|s| {
                let mut t = ServiceTest::new(*s);
                t.attempts = 1;
                (*s, t)
            })
            .collect(),
        stream_tests: StreamService::ALL
            .iter()
            .map(|s| (*s, StreamTest::new(*s)))
            .collect(),
        total_time_ms: 42,
    });
    report.tested_nodes = 1;
    report
}

#[test]
fn test_tag_map_failure_is_an_error_but_report_is_kept() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("result");
    // The tag map's parent is a regular file, so its directory cannot be created.
    let blocker = dir.path().join("blocker");
    std::fs::write(&blocker, "").unwrap();
    let map_path = blocker.join("tags.json");

    let err = report::persist(&report(), &output, Some(map_path.as_path())).unwrap_err();
    assert!(matches!(err, ReportError::CreateDir { .. }));

    let written: Vec<_> = std::fs::read_dir(&output).unwrap().collect();
    assert_eq!(written.len(), 1);
}

#[test]
fn test_detailed_report_failure_is_advisory() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("blocker");
    std::fs::write(&blocker, "").unwrap();
    let map_path = dir.path().join("tags.json");

    let saved = report::persist(&report(), &blocker, Some(map_path.as_path())).unwrap();
    assert!(saved.report.is_none());
    assert_eq!(saved.tag_map.as_deref(), Some(map_path.as_path()));

    let map: serde_json::Value = serde_json::from_slice(&std::fs::read(&map_path).unwrap()).unwrap();
    assert_eq!(map["hk-01"]["openai"]["attempts"], 1);
    assert_eq!(map["hk-01"]["netflix"]["available"], false);
}

#[test]
fn test_tag_map_is_optional() {
    let dir = tempfile::tempdir().unwrap();
    let saved = report::persist(&report(), dir.path(), None).unwrap();
    assert!(saved.report.is_some());
    assert!(saved.tag_map.is_none());
}

#[test]
fn test_finished_run_fails_when_tag_map_cannot_be_written() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("result");
    let blocker = dir.path().join("blocker");
    std::fs::write(&blocker, "").unwrap();
    let map_path = blocker.join("nested").join("tags.json");

    let err = clashprobe::publish(&report(), &output, Some(map_path.as_path())).unwrap_err();
    assert!(format!("{err:#}").contains("failed to save tag map"));
    assert!(err.downcast_ref::<ReportError>().is_some());

    let names: Vec<String> = std::fs::read_dir(&output)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names.len(), 1);
    assert!(names[0].starts_with("test_result_") && names[0].ends_with(".json"));
}

#[test]
fn test_finished_run_succeeds_without_detailed_report() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("blocker");
    std::fs::write(&blocker, "").unwrap();
    let map_path = dir.path().join("tags.json");

    let saved = clashprobe::publish(&report(), &blocker, Some(map_path.as_path())).unwrap();
    assert!(saved.report.is_none());
    assert!(map_path.exists());
}
