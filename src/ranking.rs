//! Ordering of coverage results and assembly of the final ranking.

use crate::coverage::CoverageReport;
use crate::model::{CoverageResult, SkippedRecord};

/// Sorts by score, highest first; equal scores by ascending tower id.
pub fn rank(mut results: Vec<CoverageResult>) -> Vec<CoverageResult> {
    results.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.asset_id.cmp(&b.asset_id))
    });
    results
}

/// Ranked rows plus every record that was left out along the way.
#[derive(Debug, Clone, PartialEq)]
pub struct Ranking {
    pub rows: Vec<CoverageResult>,
    /// Load-time skips followed by skips from the coverage run.
    pub skipped: Vec<SkippedRecord>,
    pub cells_processed: usize,
    pub facilities_processed: usize,
}

impl Ranking {
    pub fn new(report: CoverageReport, mut load_skips: Vec<SkippedRecord>) -> Self {
        load_skips.extend(report.skipped);
        Self {
            rows: rank(report.results),
            skipped: load_skips,
            cells_processed: report.cells_processed,
            facilities_processed: report.facilities_processed,
        }
    }

    /// One-line run summary.
    pub fn summary(&self) -> String {
        format!(
            "Ranked {} failed towers from {} population cells and {} facilities ({} records skipped)",
            self.rows.len(),
            self.cells_processed,
            self.facilities_processed,
            self.skipped.len()
        )
    }
}
