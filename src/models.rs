//! Result records shared by the probe battery, the fleet and the reporters.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// API-style services, probed with retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiService {
    OpenAi,
    Gemini,
    Claude,
}

impl ApiService {
    pub const ALL: [ApiService; 3] = [ApiService::OpenAi, ApiService::Gemini, ApiService::Claude];

    pub fn key(&self) -> &'static str {
        match self {
            ApiService::OpenAi => "openai",
            ApiService::Gemini => "gemini",
            ApiService::Claude => "claude",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ApiService::OpenAi => "OpenAI",
            ApiService::Gemini => "Gemini",
            ApiService::Claude => "Claude",
        }
    }
}

/// Streaming services, probed once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamService {
    Netflix,
    Disney,
    Youtube,
    Max,
}

impl StreamService {
    pub const ALL: [StreamService; 4] = [
        StreamService::Netflix,
        StreamService::Disney,
        StreamService::Youtube,
        StreamService::Max,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            StreamService::Netflix => "netflix",
            StreamService::Disney => "disney",
            StreamService::Youtube => "youtube",
            StreamService::Max => "max",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            StreamService::Netflix => "Netflix",
            StreamService::Disney => "Disney+",
            StreamService::Youtube => "Youtube",
            StreamService::Max => "HBO Max",
        }
    }
}

/// Outcome of one API-style service on one route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceTest {
    pub service: ApiService,
    pub available: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    pub response_time_ms: u64,
    /// Last error seen. Kept even when a later attempt succeeded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub attempts: u32,
}

impl ServiceTest {
    pub fn new(service: ApiService) -> Self {
        Self {
            service,
            available: false,
            country: None,
            status_code: None,
            response_time_ms: 0,
            error: None,
            attempts: 0,
        }
    }
}

/// Outcome of one streaming service on one route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamTest {
    pub service: StreamService,
    pub available: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    /// Service specific tag, e.g. catalog tier or premium marker.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    pub response_time_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StreamTest {
    pub fn new(service: StreamService) -> Self {
        Self {
            service,
            available: false,
            region: None,
            details: None,
            response_time_ms: 0,
            error: None,
        }
    }
}

/// Everything measured for one route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeTestResult {
    pub node_name: String,
    pub node_type: String,
    pub server: String,
    pub tests: BTreeMap<ApiService, ServiceTest>,
    pub stream_tests: BTreeMap<StreamService, StreamTest>,
    pub total_time_ms: u64,
}

impl NodeTestResult {
    /// At least one API-style service answered. Streaming never counts.
    pub fn is_success(&self) -> bool {
        self.tests.values().any(|t| t.available)
    }
}

/// A route dropped because the core refused to switch to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedRoute {
    pub node_name: String,
    pub error: String,
}

/// Tally for one service across a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceSummary {
    #[serde(rename = "available_count")]
    pub available: usize,
    #[serde(rename = "unavailable_count")]
    pub unavailable: usize,
    /// Distinct, non-empty countries or regions seen on available results.
    pub countries: BTreeSet<String>,
}

impl ServiceSummary {
    fn record(&mut self, available: bool, place: Option<&str>) {
        if !available {
            self.unavailable += 1;
            return;
        }
        self.available += 1;
        if let Some(p) = place.map(str::trim).filter(|p| !p.is_empty()) {
            self.countries.insert(p.to_string());
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestSummary {
    pub openai: ServiceSummary,
    pub gemini: ServiceSummary,
    pub claude: ServiceSummary,
    pub streaming: BTreeMap<StreamService, ServiceSummary>,
}

impl TestSummary {
    /// One pass over a finished result set. Pure, so recomputing over the
    /// same results always yields the same summary.
    pub fn compute(results: &[NodeTestResult]) -> Self {
        let mut summary = Self {
            streaming: StreamService::ALL
                .iter()
                .map(|s| (*s, ServiceSummary::default()))
                .collect(),
            ..Self::default()
        };

        for result in results {
            for (service, test) in &result.tests {
                summary
                    .api_mut(*service)
                    .record(test.available, test.country.as_deref());
            }
            for (service, test) in &result.stream_tests {
                summary
                    .streaming
                    .entry(*service)
                    .or_default()
                    .record(test.available, test.region.as_deref());
            }
        }

        summary
    }

    pub fn api(&self, service: ApiService) -> &ServiceSummary {
        match service {
            ApiService::OpenAi => &self.openai,
            ApiService::Gemini => &self.gemini,
            ApiService::Claude => &self.claude,
        }
    }

    fn api_mut(&mut self, service: ApiService) -> &mut ServiceSummary {
        match service {
            ApiService::OpenAi => &mut self.openai,
            ApiService::Gemini => &mut self.gemini,
            ApiService::Claude => &mut self.claude,
        }
    }
}

/// Run-level report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestReport {
    pub test_time: DateTime<Local>,
    pub source: String,
    pub total_nodes: usize,
    pub tested_nodes: usize,
    pub success_nodes: usize,
    /// Arrival order, not input order.
    pub results: Vec<NodeTestResult>,
    #[serde(default)]
    pub skipped: Vec<SkippedRoute>,
    pub summary: TestSummary,
}

impl TestReport {
    pub fn new(source: &str, total_nodes: usize) -> Self {
        Self {
            test_time: Local::now(),
            source: source.to_string(),
            total_nodes,
            tested_nodes: 0,
            success_nodes: 0,
            results: Vec::with_capacity(total_nodes),
            skipped: Vec::new(),
            summary: TestSummary::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(name: &str, api: &[(ApiService, bool, Option<&str>)]) -> NodeTestResult {
        let tests = ApiService::ALL
            .iter()
            .map(|s| {
                let mut t = ServiceTest::new(*s);
                t.attempts = 1;
                if let Some((_, ok, country)) = api.iter().find(|(svc, _, _)| svc == s) {
                    t.available = *ok;
                    t.country = country.map(str::to_string);
                }
                (*s, t)
            })
            .collect();
        let stream_tests = StreamService::ALL
            .iter()
            .map(|s| (*s, StreamTest::new(*s)))
            .collect();
        NodeTestResult {
            node_name: name.to_string(),
            node_type: "ss".to_string(),
            server: "example.com".to_string(),
            tests,
            stream_tests,
            total_time_ms: 10,
        }
    }

    #[test]
    fn test_success_ignores_streaming() {
        let mut r = result("a", &[]);
        for t in r.stream_tests.values_mut() {
            t.available = true;
        }
        assert!(!r.is_success());

        let r = result("b", &[(ApiService::Claude, true, None)]);
        assert!(r.is_success());
    }

    #[test]
    fn test_summary_dedups_and_drops_empty() {
        let results = vec![
            result("a", &[(ApiService::OpenAi, true, Some("US"))]),
            result("b", &[(ApiService::OpenAi, true, Some("US"))]),
            result("c", &[(ApiService::OpenAi, true, Some(""))]),
            result("d", &[(ApiService::OpenAi, true, Some("JP"))]),
            result("e", &[(ApiService::OpenAi, false, Some("SG"))]),
        ];
        let summary = TestSummary::compute(&results);

        let openai = summary.api(ApiService::OpenAi);
        assert_eq!(openai.available, 4);
        assert_eq!(openai.unavailable, 1);
        assert_eq!(
            openai.countries.iter().map(String::as_str).collect::<Vec<_>>(),
            vec!["JP", "US"]
        );

        let gemini = summary.api(ApiService::Gemini);
        assert_eq!(gemini.available, 0);
        assert_eq!(gemini.unavailable, 5);
        assert!(gemini.countries.is_empty());

        assert_eq!(summary.streaming[&StreamService::Max].unavailable, 5);
    }

    #[test]
    fn test_summary_is_idempotent() {
        let results = vec![
            result("a", &[(ApiService::Gemini, true, Some("DE"))]),
            result("b", &[(ApiService::Claude, true, Some("FR"))]),
        ];
        assert_eq!(TestSummary::compute(&results), TestSummary::compute(&results));
    }

    #[test]
    fn test_summary_covers_every_service_when_empty() {
        let summary = TestSummary::compute(&[]);
        for service in ApiService::ALL {
            assert_eq!(summary.api(service), &ServiceSummary::default());
        }
        assert_eq!(summary.streaming.len(), StreamService::ALL.len());
    }

    #[test]
    fn test_json_keys() {
        let r = result("a", &[(ApiService::OpenAi, true, Some("US"))]);
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["tests"]["openai"]["country"], "US");
        assert_eq!(json["tests"]["openai"]["attempts"], 1);
        assert!(json["tests"]["gemini"].get("country").is_none());
        assert!(json["stream_tests"]["netflix"].is_object());
        assert_eq!(json["total_time_ms"], 10);

        let summary = TestSummary::compute(std::slice::from_ref(&r));
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["openai"]["available_count"], 1);
        assert_eq!(json["openai"]["countries"][0], "US");
        assert_eq!(json["streaming"]["disney"]["unavailable_count"], 1);
    }
}
