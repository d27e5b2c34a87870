//! Core records shared by the loaders, the coverage engine and the writers.

use std::collections::BTreeMap;
use std::fmt;

use geo::MultiPolygon;

use crate::error::{CoverageError, Result};

/// WGS84 position in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    /// Creates a point, rejecting out-of-range or non-finite values.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self> {
        let valid = latitude.is_finite()
            && longitude.is_finite()
            && (-90.0..=90.0).contains(&latitude)
            && (-180.0..=180.0).contains(&longitude);
        if !valid {
            return Err(CoverageError::InvalidCoordinate {
                latitude,
                longitude,
            });
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }

    /// Re-checks the range invariant for points built with a struct literal.
    pub fn validate(&self) -> Result<()> {
        GeoPoint::new(self.latitude, self.longitude).map(|_| ())
    }
}

/// Operational state of an asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetStatus {
    Up,
    Down,
}

impl AssetStatus {
    /// Parses `UP`/`DOWN` case-insensitively.
    pub fn parse(text: &str) -> Option<Self> {
        match text.trim().to_ascii_uppercase().as_str() {
            "UP" => Some(AssetStatus::Up),
            "DOWN" => Some(AssetStatus::Down),
            _ => None,
        }
    }
}

/// A cell tower.
#[derive(Debug, Clone, PartialEq)]
pub struct Asset {
    pub id: String,
    pub location: GeoPoint,
    pub status: AssetStatus,
}

impl Asset {
    pub fn new(id: impl Into<String>, location: GeoPoint, status: AssetStatus) -> Self {
        Self {
            id: id.into(),
            location,
            status,
        }
    }

    pub fn is_down(&self) -> bool {
        self.status == AssetStatus::Down
    }
}

/// Spatial representation of a population cell.
///
/// Polygon coordinates are WGS84 degrees with x = longitude, y = latitude.
#[derive(Debug, Clone, PartialEq)]
pub enum CellGeometry {
    Point(GeoPoint),
    Polygon(MultiPolygon<f64>),
}

/// A unit of population attributed to at most one asset per run.
#[derive(Debug, Clone, PartialEq)]
pub struct PopulationCell {
    pub id: String,
    pub geometry: CellGeometry,
    pub population: f64,
}

impl PopulationCell {
    pub fn point(id: impl Into<String>, location: GeoPoint, population: f64) -> Self {
        Self {
            id: id.into(),
            geometry: CellGeometry::Point(location),
            population,
        }
    }

    pub fn polygon(id: impl Into<String>, shape: MultiPolygon<f64>, population: f64) -> Self {
        Self {
            id: id.into(),
            geometry: CellGeometry::Polygon(shape),
            population,
        }
    }
}

/// Facility categories counted by the ranking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FacilityType {
    Hospital,
    Police,
    FireStation,
}

impl FacilityType {
    pub const ALL: [FacilityType; 3] = [
        FacilityType::Hospital,
        FacilityType::Police,
        FacilityType::FireStation,
    ];

    /// Classifies a free-text facility type by keyword.
    pub fn classify(text: &str) -> Option<Self> {
        let text = text.trim().to_lowercase();
        if text.contains("police") {
            Some(FacilityType::Police)
        } else if text.contains("fire") {
            Some(FacilityType::FireStation)
        } else if text.contains("hospital") {
            Some(FacilityType::Hospital)
        } else {
            None
        }
    }

    /// Column name used in the ranking output.
    pub fn column(&self) -> &'static str {
        match self {
            FacilityType::Hospital => "hospital",
            FacilityType::Police => "police",
            FacilityType::FireStation => "fire_station",
        }
    }
}

impl fmt::Display for FacilityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

/// A point of interest (hospital, police, fire station).
#[derive(Debug, Clone, PartialEq)]
pub struct Facility {
    pub id: String,
    pub location: GeoPoint,
    pub kind: FacilityType,
}

/// One row of the ranking. Built once per run and never mutated afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct CoverageResult {
    pub asset_id: String,
    pub location: GeoPoint,
    pub unweighted_population: f64,
    pub weighted_population: f64,
    pub facility_counts: BTreeMap<FacilityType, u32>,
    pub score: f64,
}

impl CoverageResult {
    pub fn facility_count(&self, kind: FacilityType) -> u32 {
        self.facility_counts.get(&kind).copied().unwrap_or(0)
    }
}

/// Which input collection a skipped record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Asset,
    Population,
    Facility,
    FailedList,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RecordKind::Asset => "asset",
            RecordKind::Population => "population",
            RecordKind::Facility => "facility",
            RecordKind::FailedList => "failed_list",
        };
        f.write_str(name)
    }
}

/// A record that was dropped from the run, with the reason.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedRecord {
    pub kind: RecordKind,
    pub record: String,
    pub reason: String,
}

impl SkippedRecord {
    pub fn new(kind: RecordKind, record: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self {
            kind,
            record: record.into(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geopoint_accepts_bounds() {
        assert!(GeoPoint::new(90.0, 180.0).is_ok());
        assert!(GeoPoint::new(-90.0, -180.0).is_ok());
    }

    #[test]
    fn test_geopoint_rejects_out_of_range() {
        let err = GeoPoint::new(90.0001, 0.0).unwrap_err();
        assert!(matches!(err, CoverageError::InvalidCoordinate { .. }));
        assert!(GeoPoint::new(0.0, -180.5).is_err());
        assert!(GeoPoint::new(f64::NAN, 0.0).is_err());
    }

    #[test]
    fn test_asset_status_parse() {
        assert_eq!(AssetStatus::parse("down"), Some(AssetStatus::Down));
        assert_eq!(AssetStatus::parse(" UP "), Some(AssetStatus::Up));
        assert_eq!(AssetStatus::parse("failed"), None);
    }

    #[test]
    fn test_facility_classification() {
        assert_eq!(
            FacilityType::classify("Police Station"),
            Some(FacilityType::Police)
        );
        assert_eq!(
            FacilityType::classify("Volunteer Fire Brigade"),
            Some(FacilityType::FireStation)
        );
        assert_eq!(
            FacilityType::classify("HOSPITAL"),
            Some(FacilityType::Hospital)
        );
        assert_eq!(FacilityType::classify("school"), None);
    }

    #[test]
    fn test_missing_facility_count_is_zero() {
        let result = CoverageResult {
            asset_id: "T1".to_string(),
            location: GeoPoint::new(-36.8, 174.7).unwrap(),
            unweighted_population: 0.0,
            weighted_population: 0.0,
            facility_counts: BTreeMap::new(),
            score: 0.0,
        };
        assert_eq!(result.facility_count(FacilityType::Police), 0);
    }
}
