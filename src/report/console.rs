//! Human-readable console output.

use crate::models::{ApiService, NodeTestResult, ServiceSummary, StreamService, TestReport};

const RULE_WIDTH: usize = 80;
const NAME_WIDTH: usize = 20;

pub fn banner() -> String {
    let rule = "=".repeat(RULE_WIDTH);
    format!(
        "{rule}\n  clashprobe {}  route reachability tester\n{rule}",
        env!("CARGO_PKG_VERSION")
    )
}

fn mark(available: bool) -> &'static str {
    if available {
        "✅"
    } else {
        "❌"
    }
}

/// Truncate to `width` characters, never splitting a code point.
fn clip(name: &str, width: usize) -> String {
    name.chars().take(width).collect()
}

/// One line per finished route, printed as results arrive.
pub fn progress_line(done: usize, total: usize, result: &NodeTestResult) -> String {
    let api = |s: ApiService| result.tests.get(&s).is_some_and(|t| t.available);
    let stream = |s: StreamService| result.stream_tests.get(&s).is_some_and(|t| t.available);

    format!(
        "[{done:>3}/{total}] {} {:<width$} (Chat:{} NF:{} D+:{})",
        mark(result.is_success()),
        clip(&result.node_name, NAME_WIDTH),
        mark(api(ApiService::OpenAi)),
        mark(stream(StreamService::Netflix)),
        mark(stream(StreamService::Disney)),
        width = NAME_WIDTH,
    )
}

fn place(value: Option<&str>) -> String {
    value.map(|v| format!(" [{v}]")).unwrap_or_default()
}

fn countries(summary: &ServiceSummary) -> String {
    if summary.countries.is_empty() {
        "-".to_string()
    } else {
        summary.countries.iter().cloned().collect::<Vec<_>>().join(", ")
    }
}

/// Full report: every route's seven service lines, then the summary.
pub fn full_report(report: &TestReport) -> String {
    let rule = "=".repeat(RULE_WIDTH);
    let thin = "-".repeat(RULE_WIDTH);
    let mut out = Vec::new();

    out.push(rule.clone());
    out.push(format!(
        "Test report  {}  source: {}",
        report.test_time.format("%Y-%m-%d %H:%M:%S"),
        report.source
    ));
    out.push(rule.clone());

    for result in &report.results {
        out.push(format!(
            "{} ({}, {})  {} ms",
            result.node_name, result.node_type, result.server, result.total_time_ms
        ));
        out.push("  [AI Services]".to_string());
        for (service, test) in &result.tests {
            let mut line = format!(
                "    {} {:<8}{}",
                mark(test.available),
                service.display_name(),
                place(test.country.as_deref())
            );
            if test.attempts > 1 {
                line.push_str(&format!(" (attempts: {})", test.attempts));
            }
            if !test.available {
                if let Some(e) = &test.error {
                    line.push_str(&format!(" {e}"));
                }
            }
            out.push(line);
        }
        out.push("  [Streaming]".to_string());
        for (service, test) in &result.stream_tests {
            let mut line = format!(
                "    {} {:<8}{}",
                mark(test.available),
                service.display_name(),
                place(test.region.as_deref())
            );
            if let Some(d) = &test.details {
                line.push_str(&format!(" {d}"));
            }
            if let Some(e) = &test.error {
                line.push_str(&format!(" {e}"));
            }
            out.push(line);
        }
        out.push(thin.clone());
    }

    if !report.skipped.is_empty() {
        out.push("Skipped (route switch failed):".to_string());
        for s in &report.skipped {
            out.push(format!("  {}: {}", s.node_name, s.error));
        }
        out.push(thin.clone());
    }

    out.push("Summary".to_string());
    out.push(format!(
        "  routes: {}  tested: {}  success: {}",
        report.total_nodes, report.tested_nodes, report.success_nodes
    ));
    for service in ApiService::ALL {
        let s = report.summary.api(service);
        out.push(format!(
            "  {:<8} {:>4} ok {:>4} failed  {}",
            service.display_name(),
            s.available,
            s.unavailable,
            countries(s)
        ));
    }
    for (service, s) in &report.summary.streaming {
        out.push(format!(
            "  {:<8} {:>4} ok {:>4} failed  {}",
            service.display_name(),
            s.available,
            s.unavailable,
            countries(s)
        ));
    }
    out.push(rule);

    out.join("\n")
}
