//! GeoJSON population layers in, ranked tower layer out.

use std::io::Write;
use std::path::Path;

use geojson::feature::Id;
use geojson::{Feature, FeatureCollection, GeoJson, Geometry, JsonObject, JsonValue, Value};

use crate::error::{CoverageError, Result};
use crate::input::{self, Loaded, PopulationFormat, CELL_ID_COLUMNS, POPULATION_COLUMNS};
use crate::model::{CoverageResult, FacilityType, PopulationCell, RecordKind};
use crate::wkt::{build_multipolygon, CoordinateSource, RawRing};

/// Reads a population layer from a GeoJSON file.
pub fn load_population(path: &Path, format: &PopulationFormat) -> Result<Loaded<PopulationCell>> {
    let mut content = String::new();
    std::io::Read::read_to_string(&mut input::open(path)?, &mut content)?;
    read_population(&content, format)
}

/// Reads population cells from GeoJSON features.
///
/// Polygon and MultiPolygon features become polygon cells, Point features
/// become point cells. Coordinates are read in `format.coordinates`.
pub fn read_population(content: &str, format: &PopulationFormat) -> Result<Loaded<PopulationCell>> {
    let geojson: GeoJson = content
        .parse()
        .map_err(|e| CoverageError::GeojsonParse(format!("{}", e)))?;

    let features = match geojson {
        GeoJson::FeatureCollection(collection) => collection.features,
        GeoJson::Feature(feature) => vec![feature],
        GeoJson::Geometry(_) => {
            return Err(CoverageError::GeojsonParse(
                "population layer needs features with a population property".to_string(),
            ))
        }
    };

    let source = format.coordinates.source();
    let population_keys: Vec<&str> = match &format.population_column {
        Some(name) => vec![name.as_str()],
        None => POPULATION_COLUMNS.to_vec(),
    };

    let mut loaded = Loaded {
        records: Vec::with_capacity(features.len()),
        skipped: Vec::new(),
    };
    for (i, feature) in features.iter().enumerate() {
        let record = feature_id(feature, i);
        match read_cell(feature, &record, &population_keys, &source) {
            Ok(cell) => loaded.records.push(cell),
            Err(e) => loaded.skip(RecordKind::Population, &record, e),
        }
    }
    Ok(loaded)
}

fn property<'f>(feature: &'f Feature, keys: &[&str]) -> Option<&'f JsonValue> {
    let properties = feature.properties.as_ref()?;
    keys.iter().find_map(|key| {
        properties
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(key))
            .map(|(_, value)| value)
    })
}

fn feature_id(feature: &Feature, index: usize) -> String {
    match property(feature, CELL_ID_COLUMNS) {
        Some(JsonValue::String(s)) if !s.is_empty() => return s.clone(),
        Some(JsonValue::Number(n)) => return n.to_string(),
        _ => {}
    }
    match &feature.id {
        Some(Id::String(s)) => s.clone(),
        Some(Id::Number(n)) => n.to_string(),
        None => format!("feature {}", index),
    }
}

fn read_cell(
    feature: &Feature,
    record: &str,
    population_keys: &[&str],
    source: &CoordinateSource,
) -> Result<PopulationCell> {
    let missing = || CoverageError::MissingAttribute {
        record: record.to_string(),
        field: population_keys.join("|"),
    };
    let population = match property(feature, population_keys) {
        Some(JsonValue::Number(n)) => n.as_f64().ok_or_else(missing)?,
        Some(JsonValue::String(s)) => s.trim().parse::<f64>().map_err(|_| missing())?,
        _ => return Err(missing()),
    };
    if !population.is_finite() || population < 0.0 {
        return Err(CoverageError::InvalidAttribute {
            record: record.to_string(),
            field: "population".to_string(),
            value: population.to_string(),
        });
    }

    let geometry = feature
        .geometry
        .as_ref()
        .ok_or_else(|| CoverageError::MalformedGeometry("feature has no geometry".to_string()))?;
    match &geometry.value {
        Value::Point(position) => {
            let (x, y) = position_xy(position)?;
            Ok(PopulationCell::point(record, source.to_geodetic(x, y)?, population))
        }
        Value::Polygon(rings) => {
            let shape = build_multipolygon(&[raw_rings(rings)?], source)?;
            Ok(PopulationCell::polygon(record, shape, population))
        }
        Value::MultiPolygon(polygons) => {
            let polygons = polygons
                .iter()
                .map(|rings| raw_rings(rings))
                .collect::<Result<Vec<_>>>()?;
            let shape = build_multipolygon(&polygons, source)?;
            Ok(PopulationCell::polygon(record, shape, population))
        }
        _ => Err(CoverageError::MalformedGeometry(
            "expected Polygon, MultiPolygon or Point geometry".to_string(),
        )),
    }
}

fn position_xy(position: &[f64]) -> Result<(f64, f64)> {
    match position {
        [x, y, ..] => Ok((*x, *y)),
        _ => Err(CoverageError::MalformedGeometry(
            "position needs two coordinates".to_string(),
        )),
    }
}

fn raw_rings(rings: &[Vec<Vec<f64>>]) -> Result<Vec<RawRing>> {
    rings
        .iter()
        .map(|ring| ring.iter().map(|p| position_xy(p)).collect())
        .collect()
}

fn rounded(value: f64) -> JsonValue {
    JsonValue::from((value * 100.0).round() / 100.0)
}

/// Ranked towers as a point layer, one feature per row, in ranking order.
pub fn ranking_to_geojson(rows: &[CoverageResult]) -> FeatureCollection {
    let features = rows
        .iter()
        .enumerate()
        .map(|(i, row)| {
            let mut properties = JsonObject::new();
            properties.insert("rank".to_string(), JsonValue::from(i + 1));
            properties.insert("tower_id".to_string(), JsonValue::from(row.asset_id.clone()));
            properties.insert(
                "unweighted_population".to_string(),
                rounded(row.unweighted_population),
            );
            properties.insert(
                "weighted_population".to_string(),
                rounded(row.weighted_population),
            );
            for kind in FacilityType::ALL {
                properties.insert(
                    kind.column().to_string(),
                    JsonValue::from(row.facility_count(kind)),
                );
            }
            properties.insert("score".to_string(), rounded(row.score));

            Feature {
                bbox: None,
                geometry: Some(Geometry::new(Value::Point(vec![
                    row.location.longitude,
                    row.location.latitude,
                ]))),
                id: Some(Id::String(row.asset_id.clone())),
                properties: Some(properties),
                foreign_members: None,
            }
        })
        .collect();

    FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}

pub fn write_ranking_geojson<W: Write>(writer: W, rows: &[CoverageResult]) -> Result<()> {
    let geojson = GeoJson::FeatureCollection(ranking_to_geojson(rows));
    serde_json::to_writer_pretty(writer, &geojson)?;
    Ok(())
}
