//! Folds worker events into a [`TestReport`].

use crate::models::{NodeTestResult, TestReport, TestSummary};

use super::worker::WorkerEvent;

pub struct Aggregator {
    report: TestReport,
}

impl Aggregator {
    pub fn new(source: &str, total_nodes: usize) -> Self {
        Self {
            report: TestReport::new(source, total_nodes),
        }
    }

    /// Record one event in arrival order. For a tested route, returns the
    /// running tested count and the stored result so the caller can report
    /// progress on it.
    pub fn record(&mut self, event: WorkerEvent) -> Option<(usize, &NodeTestResult)> {
        match event {
            WorkerEvent::Tested(result) => {
                self.report.tested_nodes += 1;
                if result.is_success() {
                    self.report.success_nodes += 1;
                }
                self.report.results.push(result);
                let tested = self.report.tested_nodes;
                self.report.results.last().map(|r| (tested, r))
            }
            WorkerEvent::Skipped(skipped) => {
                self.report.skipped.push(skipped);
                None
            }
        }
    }

    /// Close the report: the summary is computed once, over the final set.
    pub fn finish(mut self) -> TestReport {
        self.report.summary = TestSummary::compute(&self.report.results);
        self.report
    }
}
