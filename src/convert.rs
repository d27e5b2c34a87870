//! `convert-wkt`: rewrites the geometry column of a CSV from a projected grid to WGS84.

use std::io::{Read, Write};

use crate::error::Result;
use crate::input::{csv_reader, record_id, Columns, CELL_ID_COLUMNS, WKT_COLUMNS};
use crate::logger;
use crate::model::{RecordKind, SkippedRecord};
use crate::wkt::{reproject_wkt, CoordinateSource};

/// Outcome of one conversion.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversionSummary {
    pub converted: usize,
    pub skipped: Vec<SkippedRecord>,
}

/// Copies `reader` to `writer` with the WKT column reprojected.
///
/// Every other column passes through untouched. Rows whose geometry does
/// not parse or falls outside the grid are left out and reported.
pub fn convert_wkt_csv<R: Read, W: Write>(
    reader: R,
    writer: W,
    source: &CoordinateSource,
) -> Result<ConversionSummary> {
    let mut reader = csv_reader(reader);
    let headers = reader.headers()?.clone();
    let columns = Columns::new(&headers);
    let wkt = columns.require(WKT_COLUMNS, "geometry")?;
    let id = columns.find(CELL_ID_COLUMNS);

    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(&headers)?;

    let mut summary = ConversionSummary::default();
    for (i, row) in reader.records().enumerate() {
        let line = i + 2;
        let row = match row {
            Ok(row) => row,
            Err(e) if e.is_io_error() => return Err(e.into()),
            Err(e) => {
                summary.skip(&format!("row {}", line), e);
                continue;
            }
        };
        let record = record_id(&row, id, line);
        match reproject_wkt(row.get(wkt).unwrap_or(""), source) {
            Ok(converted) => {
                let fields: Vec<&str> = row
                    .iter()
                    .enumerate()
                    .map(|(j, value)| if j == wkt { converted.as_str() } else { value })
                    .collect();
                csv.write_record(&fields)?;
                summary.converted += 1;
            }
            Err(e) => summary.skip(&record, e),
        }
    }
    csv.flush()?;
    Ok(summary)
}

impl ConversionSummary {
    fn skip(&mut self, record: &str, reason: impl std::fmt::Display) {
        let skipped = SkippedRecord::new(RecordKind::Population, record, reason);
        logger::warn(&format!("Skipping '{}': {}", skipped.record, skipped.reason));
        self.skipped.push(skipped);
    }
}
