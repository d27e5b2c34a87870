//! WKT polygon parsing and re-serialisation.
//!
//! Text is tokenised by the `wkt` crate. Only the shapes population grids
//! are delivered in are accepted: `MULTIPOLYGON` and `POLYGON`, with any
//! number of holes. Rings are checked as written, before any closing is
//! applied. Parsing is all-or-nothing: one bad ring rejects the whole record.

use geo::{Coord, LineString, MultiPolygon, Polygon};
use ::wkt::Wkt;

use crate::error::{CoverageError, Result};
use crate::model::GeoPoint;
use crate::projection::TransverseMercator;

/// Decimal places written for degrees (about 1 mm at the equator).
pub const COORDINATE_DECIMALS: usize = 8;

/// How the `x y` pairs of a WKT string are to be read.
#[derive(Debug, Clone, PartialEq)]
pub enum CoordinateSource {
    /// `x` is longitude, `y` is latitude, WGS84 degrees.
    Geodetic,
    /// `x` is easting, `y` is northing on the given grid.
    Projected(TransverseMercator),
}

impl CoordinateSource {
    /// Converts one vertex to WGS84.
    pub fn to_geodetic(&self, x: f64, y: f64) -> Result<GeoPoint> {
        match self {
            CoordinateSource::Geodetic => GeoPoint::new(y, x),
            CoordinateSource::Projected(tm) => tm.inverse(x, y),
        }
    }
}

/// Raw ring of `(x, y)` pairs, closing vertex included.
pub type RawRing = Vec<(f64, f64)>;

/// Parses WKT into polygons, each a list of raw rings (exterior first).
pub fn parse_rings(text: &str) -> Result<Vec<Vec<RawRing>>> {
    let geometry: Wkt<f64> = text
        .trim()
        .parse()
        .map_err(|e| malformed(&format!("invalid WKT: {}", e)))?;
    let polygons = match geometry {
        Wkt::MultiPolygon(multi) => multi.0,
        Wkt::Polygon(polygon) => vec![polygon],
        _ => return Err(malformed("expected MULTIPOLYGON or POLYGON")),
    };

    let polygons: Vec<Vec<RawRing>> = polygons
        .into_iter()
        .map(|polygon| {
            polygon
                .0
                .into_iter()
                .map(|ring| ring.0.into_iter().map(|c| (c.x, c.y)).collect())
                .collect()
        })
        .collect();
    if polygons.is_empty() || polygons.iter().any(|rings| rings.is_empty()) {
        return Err(malformed("polygon has no rings"));
    }
    for ring in polygons.iter().flatten() {
        validate_ring(ring)?;
    }
    Ok(polygons)
}

/// Parses WKT and converts every vertex to WGS84, as a flat list of rings.
pub fn parse_polygon_wkt(text: &str, source: &CoordinateSource) -> Result<Vec<Vec<GeoPoint>>> {
    let polygons = parse_rings(text)?;
    polygons
        .iter()
        .flatten()
        .map(|ring| convert_ring(ring, source))
        .collect()
}

/// Parses WKT into a WGS84 `MultiPolygon` (x = longitude, y = latitude).
pub fn parse_multipolygon(text: &str, source: &CoordinateSource) -> Result<MultiPolygon<f64>> {
    build_multipolygon(&parse_rings(text)?, source)
}

/// Validates raw polygons (exterior ring first) and converts them to WGS84.
pub fn build_multipolygon(
    polygons: &[Vec<RawRing>],
    source: &CoordinateSource,
) -> Result<MultiPolygon<f64>> {
    if polygons.is_empty() || polygons.iter().any(|rings| rings.is_empty()) {
        return Err(malformed("polygon has no rings"));
    }
    for ring in polygons.iter().flatten() {
        validate_ring(ring)?;
    }
    let mut out = Vec::with_capacity(polygons.len());
    for rings in polygons {
        let mut converted = rings
            .iter()
            .map(|ring| convert_ring(ring, source).map(|points| ring_to_linestring(&points)))
            .collect::<Result<Vec<_>>>()?;
        let exterior = converted.remove(0);
        out.push(Polygon::new(exterior, converted));
    }
    Ok(MultiPolygon::new(out))
}

/// Writes rings as one polygon: the first ring is the exterior, the rest holes.
pub fn format_polygon_wkt(rings: &[Vec<GeoPoint>]) -> String {
    let rings: Vec<String> = rings.iter().map(|ring| format_ring(ring)).collect();
    format!("MULTIPOLYGON ((({})))", rings.join("), ("))
}

/// Writes a WGS84 `MultiPolygon` as WKT, preserving polygon grouping.
pub fn format_multipolygon_wkt(multipolygon: &MultiPolygon<f64>) -> String {
    let polygons: Vec<String> = multipolygon
        .iter()
        .map(|polygon| {
            let rings: Vec<String> = std::iter::once(polygon.exterior())
                .chain(polygon.interiors())
                .map(|ring| {
                    let points: Vec<GeoPoint> = ring
                        .coords()
                        .map(|c| GeoPoint {
                            latitude: c.y,
                            longitude: c.x,
                        })
                        .collect();
                    format_ring(&points)
                })
                .collect();
            format!("(({}))", rings.join("), ("))
        })
        .collect();
    format!("MULTIPOLYGON ({})", polygons.join(", "))
}

/// Converts a WKT string from one coordinate source to WGS84 WKT.
pub fn reproject_wkt(text: &str, source: &CoordinateSource) -> Result<String> {
    Ok(format_multipolygon_wkt(&parse_multipolygon(text, source)?))
}

fn format_ring(ring: &[GeoPoint]) -> String {
    ring.iter()
        .map(|p| {
            format!(
                "{:.prec$} {:.prec$}",
                p.longitude,
                p.latitude,
                prec = COORDINATE_DECIMALS
            )
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn convert_ring(ring: &RawRing, source: &CoordinateSource) -> Result<Vec<GeoPoint>> {
    ring.iter().map(|&(x, y)| source.to_geodetic(x, y)).collect()
}

fn ring_to_linestring(points: &[GeoPoint]) -> LineString<f64> {
    LineString::from(
        points
            .iter()
            .map(|p| Coord {
                x: p.longitude,
                y: p.latitude,
            })
            .collect::<Vec<_>>(),
    )
}

fn validate_ring(ring: &[(f64, f64)]) -> Result<()> {
    let (first, last) = match (ring.first(), ring.last()) {
        (Some(first), Some(last)) => (first, last),
        _ => return Err(malformed("empty ring")),
    };
    if let Some((x, y)) = ring.iter().find(|(x, y)| !(x.is_finite() && y.is_finite())) {
        return Err(malformed(&format!("non-finite coordinate '{} {}'", x, y)));
    }
    if first != last {
        return Err(malformed("ring is not closed"));
    }
    let mut distinct: Vec<(f64, f64)> = ring[..ring.len() - 1].to_vec();
    distinct.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.total_cmp(&b.1)));
    distinct.dedup();
    if distinct.len() < 3 {
        return Err(malformed(&format!(
            "ring needs at least 3 distinct vertices, got {}",
            distinct.len()
        )));
    }
    Ok(())
}

fn malformed(msg: &str) -> CoverageError {
    CoverageError::MalformedGeometry(msg.to_string())
}
