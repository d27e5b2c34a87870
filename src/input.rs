//! CSV loaders for towers, failed-tower lists, population cells and facilities.
//!
//! Column names are matched case-insensitively against a short list of
//! aliases seen in the source datasets. A missing required column aborts the
//! load; a bad value on one row skips that row and records why.

use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::{ReaderBuilder, StringRecord, Trim};

use crate::config::CoordinateSystem;
use crate::error::{CoverageError, Result};
use crate::logger;
use crate::model::{
    Asset, AssetStatus, Facility, FacilityType, GeoPoint, PopulationCell, RecordKind,
    SkippedRecord,
};
use crate::wkt::{parse_multipolygon, CoordinateSource};

pub const ASSET_ID_COLUMNS: &[&str] = &["id", "tower_id", "sitename"];
pub const LATITUDE_COLUMNS: &[&str] = &["lat", "latitude", "antlat"];
pub const LONGITUDE_COLUMNS: &[&str] = &["lng", "lon", "longitude", "antlng"];
pub const EASTING_COLUMNS: &[&str] = &["x", "centroid_x", "easting"];
pub const NORTHING_COLUMNS: &[&str] = &["y", "centroid_y", "northing"];
pub const STATUS_COLUMNS: &[&str] = &["status"];
pub const CELL_ID_COLUMNS: &[&str] = &["id", "grid_id", "gridid"];
pub const POPULATION_COLUMNS: &[&str] = &["population", "popest2023", "erp_2022", "value"];
pub const WKT_COLUMNS: &[&str] = &["wkt", "geometry"];
pub const FAILED_ID_COLUMNS: &[&str] = &["tower_id", "id", "sitename"];
pub const FACILITY_ID_COLUMNS: &[&str] = &["id", "name"];
pub const FACILITY_TYPE_COLUMNS: &[&str] = &["type", "facility_type", "facility_t"];

/// Records read from one input, plus the rows that were dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct Loaded<T> {
    pub records: Vec<T>,
    pub skipped: Vec<SkippedRecord>,
}

impl<T> Loaded<T> {
    fn new() -> Self {
        Self {
            records: Vec::new(),
            skipped: Vec::new(),
        }
    }

    pub(crate) fn skip(&mut self, kind: RecordKind, record: &str, reason: impl std::fmt::Display) {
        let skipped = SkippedRecord::new(kind, record, reason);
        logger::warn(&format!(
            "Skipping {} '{}': {}",
            skipped.kind, skipped.record, skipped.reason
        ));
        self.skipped.push(skipped);
    }
}

/// How population rows carry their geometry and head count.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PopulationFormat {
    pub coordinates: CoordinateSystem,
    /// Overrides the population column aliases.
    pub population_column: Option<String>,
}

/// Opens an input file, reporting a missing file by name.
pub fn open(path: &Path) -> Result<File> {
    File::open(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            CoverageError::FileNotFound(path.display().to_string())
        } else {
            CoverageError::Io(e)
        }
    })
}

/// Column lookup over a header row.
pub(crate) struct Columns {
    pub(crate) names: Vec<String>,
}

impl Columns {
    pub(crate) fn new(headers: &StringRecord) -> Self {
        Self {
            names: headers
                .iter()
                .map(|h| h.trim_start_matches('\u{feff}').trim().to_ascii_lowercase())
                .collect(),
        }
    }

    pub(crate) fn find(&self, aliases: &[&str]) -> Option<usize> {
        aliases.iter().find_map(|alias| {
            let alias = alias.to_ascii_lowercase();
            self.names.iter().position(|name| *name == alias)
        })
    }

    pub(crate) fn require(&self, aliases: &[&str], what: &str) -> Result<usize> {
        self.find(aliases).ok_or_else(|| {
            CoverageError::MissingColumn(format!(
                "{} (expected one of: {})",
                what,
                aliases.join(", ")
            ))
        })
    }
}

/// Where a row's point location comes from.
enum PointColumns {
    Geodetic { lat: usize, lng: usize },
    Projected { x: usize, y: usize, source: CoordinateSource },
}

impl PointColumns {
    fn find(columns: &Columns, coordinates: CoordinateSystem) -> Option<Self> {
        match coordinates {
            CoordinateSystem::Wgs84 => Some(PointColumns::Geodetic {
                lat: columns.find(LATITUDE_COLUMNS)?,
                lng: columns.find(LONGITUDE_COLUMNS)?,
            }),
            CoordinateSystem::Nztm2000 => Some(PointColumns::Projected {
                x: columns.find(EASTING_COLUMNS)?,
                y: columns.find(NORTHING_COLUMNS)?,
                source: coordinates.source(),
            }),
        }
    }

    fn require(columns: &Columns, coordinates: CoordinateSystem) -> Result<Self> {
        Self::find(columns, coordinates).ok_or_else(|| {
            let expected = match coordinates {
                CoordinateSystem::Wgs84 => "latitude/longitude",
                CoordinateSystem::Nztm2000 => "NZTM2000 x/y",
            };
            CoverageError::MissingColumn(format!("{} point columns", expected))
        })
    }

    fn read(&self, row: &StringRecord, record: &str) -> Result<GeoPoint> {
        match self {
            PointColumns::Geodetic { lat, lng } => GeoPoint::new(
                number(row, *lat, record, "latitude")?,
                number(row, *lng, record, "longitude")?,
            ),
            PointColumns::Projected { x, y, source } => source.to_geodetic(
                number(row, *x, record, "x")?,
                number(row, *y, record, "y")?,
            ),
        }
    }
}

pub(crate) fn csv_reader<R: Read>(reader: R) -> csv::Reader<R> {
    ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .from_reader(reader)
}

pub(crate) fn field<'r>(row: &'r StringRecord, index: usize) -> &'r str {
    row.get(index).unwrap_or("")
}

fn number(row: &StringRecord, index: usize, record: &str, name: &str) -> Result<f64> {
    field(row, index)
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| CoverageError::MissingAttribute {
            record: record.to_string(),
            field: name.to_string(),
        })
}

pub(crate) fn record_id(row: &StringRecord, index: Option<usize>, line: usize) -> String {
    index
        .map(|i| field(row, i))
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("row {}", line))
}

/// Iterates data rows; malformed CSV rows are skipped, I/O failures abort.
fn for_each_row<R: Read, T>(
    reader: &mut csv::Reader<R>,
    loaded: &mut Loaded<T>,
    kind: RecordKind,
    mut handle: impl FnMut(&StringRecord, usize, &mut Loaded<T>),
) -> Result<()> {
    for (i, row) in reader.records().enumerate() {
        // Header is line 1.
        let line = i + 2;
        match row {
            Ok(row) => handle(&row, line, loaded),
            Err(e) if e.is_io_error() => return Err(e.into()),
            Err(e) => loaded.skip(kind, &format!("row {}", line), e),
        }
    }
    Ok(())
}

/// Reads towers: id, latitude, longitude and an optional `UP`/`DOWN` status (default `UP`).
pub fn load_assets<R: Read>(reader: R) -> Result<Loaded<Asset>> {
    let mut reader = csv_reader(reader);
    let columns = Columns::new(reader.headers()?);
    let id = columns.require(ASSET_ID_COLUMNS, "tower id")?;
    let point = PointColumns::require(&columns, CoordinateSystem::Wgs84)?;
    let status = columns.find(STATUS_COLUMNS);

    let mut loaded = Loaded::new();
    for_each_row(&mut reader, &mut loaded, RecordKind::Asset, |row, line, loaded| {
        let record = record_id(row, Some(id), line);
        let parsed = point.read(row, &record).and_then(|location| {
            let status = match status.map(|s| field(row, s)).filter(|s| !s.is_empty()) {
                None => AssetStatus::Up,
                Some(text) => AssetStatus::parse(text).ok_or_else(|| {
                    CoverageError::InvalidAttribute {
                        record: record.clone(),
                        field: "status".to_string(),
                        value: text.to_string(),
                    }
                })?,
            };
            Ok(Asset::new(record.clone(), location, status))
        });
        match parsed {
            Ok(asset) => loaded.records.push(asset),
            Err(e) => loaded.skip(RecordKind::Asset, &record, e),
        }
    })?;
    Ok(loaded)
}

/// Reads a list of failed tower ids from a single id column.
pub fn load_failed_ids<R: Read>(reader: R) -> Result<Loaded<String>> {
    let mut reader = csv_reader(reader);
    let columns = Columns::new(reader.headers()?);
    let id = columns.require(FAILED_ID_COLUMNS, "failed tower id")?;

    let mut loaded = Loaded::new();
    for_each_row(&mut reader, &mut loaded, RecordKind::FailedList, |row, line, loaded| {
        match field(row, id) {
            "" => loaded.skip(RecordKind::FailedList, &format!("row {}", line), "blank tower id"),
            value => loaded.records.push(value.to_string()),
        }
    })?;
    Ok(loaded)
}

/// Marks the listed towers `DOWN` and every other tower `UP`.
///
/// Returns the listed ids that match no tower, each once, in list order.
pub fn apply_failed_list(assets: &mut [Asset], failed: &[String]) -> Vec<String> {
    let listed: HashSet<&str> = failed.iter().map(String::as_str).collect();
    for asset in assets.iter_mut() {
        asset.status = if listed.contains(asset.id.as_str()) {
            AssetStatus::Down
        } else {
            AssetStatus::Up
        };
    }

    let known: HashSet<&str> = assets.iter().map(|a| a.id.as_str()).collect();
    let mut reported = HashSet::new();
    let unknown: Vec<String> = failed
        .iter()
        .filter(|id| !known.contains(id.as_str()) && reported.insert(id.as_str()))
        .cloned()
        .collect();
    for id in &unknown {
        logger::warn(&format!("Failed tower '{}' is not in the tower list", id));
    }
    unknown
}

/// Reads population cells as WKT polygons or as point rows.
///
/// A `WKT`/`geometry` column takes precedence over point columns.
pub fn load_population<R: Read>(reader: R, format: &PopulationFormat) -> Result<Loaded<PopulationCell>> {
    let mut reader = csv_reader(reader);
    let columns = Columns::new(reader.headers()?);
    let id = columns.find(CELL_ID_COLUMNS);
    let population = match &format.population_column {
        Some(name) => columns.require(&[name.as_str()], "population")?,
        None => columns.require(POPULATION_COLUMNS, "population")?,
    };
    let population_name = columns.names[population].clone();

    enum Geometry {
        Wkt(usize, CoordinateSource),
        Point(PointColumns),
    }
    let geometry = match columns.find(WKT_COLUMNS) {
        Some(wkt) => Geometry::Wkt(wkt, format.coordinates.source()),
        None => Geometry::Point(PointColumns::require(&columns, format.coordinates)?),
    };

    let mut loaded = Loaded::new();
    for_each_row(&mut reader, &mut loaded, RecordKind::Population, |row, line, loaded| {
        let record = record_id(row, id, line);
        let parsed = number(row, population, &record, &population_name).and_then(|count| {
            if count < 0.0 {
                return Err(CoverageError::InvalidAttribute {
                    record: record.clone(),
                    field: population_name.clone(),
                    value: field(row, population).to_string(),
                });
            }
            match &geometry {
                Geometry::Wkt(column, source) => {
                    let shape = parse_multipolygon(field(row, *column), source)?;
                    Ok(PopulationCell::polygon(record.clone(), shape, count))
                }
                Geometry::Point(point) => Ok(PopulationCell::point(
                    record.clone(),
                    point.read(row, &record)?,
                    count,
                )),
            }
        });
        match parsed {
            Ok(cell) => loaded.records.push(cell),
            Err(e) => loaded.skip(RecordKind::Population, &record, e),
        }
    })?;
    Ok(loaded)
}

/// Reads facilities and classifies their free-text type.
pub fn load_facilities<R: Read>(reader: R, coordinates: CoordinateSystem) -> Result<Loaded<Facility>> {
    let mut reader = csv_reader(reader);
    let columns = Columns::new(reader.headers()?);
    let id = columns.find(FACILITY_ID_COLUMNS);
    let kind = columns.require(FACILITY_TYPE_COLUMNS, "facility type")?;
    let point = PointColumns::require(&columns, coordinates)?;

    let mut loaded = Loaded::new();
    for_each_row(&mut reader, &mut loaded, RecordKind::Facility, |row, line, loaded| {
        let record = record_id(row, id, line);
        let text = field(row, kind);
        let parsed = FacilityType::classify(text)
            .ok_or_else(|| CoverageError::InvalidAttribute {
                record: record.clone(),
                field: "facility type".to_string(),
                value: text.to_string(),
            })
            .and_then(|kind| {
                Ok(Facility {
                    id: record.clone(),
                    location: point.read(row, &record)?,
                    kind,
                })
            });
        match parsed {
            Ok(facility) => loaded.records.push(facility),
            Err(e) => loaded.skip(RecordKind::Facility, &record, e),
        }
    })?;
    Ok(loaded)
}
