//! CSV artefacts: the ranking table and the skipped-record report.

use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::model::{CoverageResult, FacilityType, SkippedRecord};

pub const RANKING_HEADER: [&str; 9] = [
    "tower_id",
    "lat",
    "lng",
    "unweighted_population",
    "weighted_population",
    "hospital",
    "police",
    "fire_station",
    "score",
];

/// Writes the ranking: coordinates to 6 decimals, population and score to 2.
pub fn write_ranking_csv<W: Write>(writer: W, rows: &[CoverageResult]) -> Result<()> {
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(RANKING_HEADER)?;
    for row in rows {
        csv.write_record([
            row.asset_id.clone(),
            format!("{:.6}", row.location.latitude),
            format!("{:.6}", row.location.longitude),
            format!("{:.2}", row.unweighted_population),
            format!("{:.2}", row.weighted_population),
            row.facility_count(FacilityType::Hospital).to_string(),
            row.facility_count(FacilityType::Police).to_string(),
            row.facility_count(FacilityType::FireStation).to_string(),
            format!("{:.2}", row.score),
        ])?;
    }
    csv.flush()?;
    Ok(())
}

pub fn write_skipped_csv<W: Write>(writer: W, skipped: &[SkippedRecord]) -> Result<()> {
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(["kind", "record", "reason"])?;
    for record in skipped {
        let kind = record.kind.to_string();
        csv.write_record([kind.as_str(), record.record.as_str(), record.reason.as_str()])?;
    }
    csv.flush()?;
    Ok(())
}

/// `ranking.csv` -> `ranking.skipped.csv`, next to the ranking.
pub fn skipped_path(output: &Path) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "ranking".to_string());
    output.with_file_name(format!("{}.skipped.csv", stem))
}
