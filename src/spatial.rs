//! Planar frames, cell sites, point index and radius queries.
//!
//! Each tower measures distances as straight lines in the Transverse
//! Mercator frame of its own UTM zone. This is a flat-earth approximation:
//! over a 5 km radius its error is dominated by the frame's scale factor,
//! which stays within [`FLAT_EARTH_RELATIVE_ERROR_BOUND`] anywhere inside a
//! zone. Candidate lookups run on geocentric positions instead, so one index
//! serves towers in every zone.

use geo::{Centroid, Coord, CoordsIter, LineString, MultiPolygon, Polygon};
use rstar::primitives::GeomWithData;
use rstar::RTree;

pub mod disc;

use crate::error::{CoverageError, Result};
use crate::logger;
use crate::model::{CellGeometry, GeoPoint, PopulationCell};
use crate::projection::{zone_for_longitude, Ellipsoid, Hemisphere, TransverseMercator};
pub use disc::{
    exclusive_overlap_fraction, overlap_fraction, Disc, BOUNDARY_TOLERANCE_M, DEFAULT_SEGMENTS,
    MIN_SEGMENTS,
};

/// Upper bound on `|planar - geodesic| / geodesic` for short baselines inside one zone.
pub const FLAT_EARTH_RELATIVE_ERROR_BOUND: f64 = 1e-3;

/// The UTM frame one tower measures its distances in.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanarFrame {
    projection: TransverseMercator,
    zone: u8,
    hemisphere: Hemisphere,
}

impl PlanarFrame {
    /// Frame in the UTM zone and hemisphere of `reference`.
    pub fn centred_on(reference: &GeoPoint) -> Result<Self> {
        reference.validate()?;
        let zone = zone_for_longitude(reference.longitude)?;
        let hemisphere = Hemisphere::of_latitude(reference.latitude);
        Ok(Self {
            projection: TransverseMercator::utm(zone, hemisphere)?,
            zone,
            hemisphere,
        })
    }

    pub fn zone(&self) -> u8 {
        self.zone
    }

    pub fn hemisphere(&self) -> Hemisphere {
        self.hemisphere
    }

    /// Projects a point to frame metres.
    pub fn project(&self, point: &GeoPoint) -> Result<Coord<f64>> {
        let (x, y) = self.projection.forward(point)?;
        Ok(Coord { x, y })
    }

    /// Projects a WGS84 shape (x = longitude, y = latitude) to frame metres.
    pub fn project_shape(&self, shape: &MultiPolygon<f64>) -> Result<MultiPolygon<f64>> {
        let project_ring = |ring: &LineString<f64>| -> Result<LineString<f64>> {
            ring.coords()
                .map(|c| self.project(&GeoPoint::new(c.y, c.x)?))
                .collect::<Result<Vec<_>>>()
                .map(LineString::from)
        };

        let polygons = shape
            .iter()
            .map(|polygon| {
                let exterior = project_ring(polygon.exterior())?;
                let interiors = polygon
                    .interiors()
                    .iter()
                    .map(project_ring)
                    .collect::<Result<Vec<_>>>()?;
                Ok(Polygon::new(exterior, interiors))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(MultiPolygon::new(polygons))
    }

    /// Projects a population cell: its representative point and, for polygons, its planar shape.
    pub fn project_cell(&self, cell: &PopulationCell) -> Result<PlanarCell> {
        match &cell.geometry {
            CellGeometry::Point(point) => Ok(PlanarCell {
                representative: self.project(point)?,
                shape: None,
            }),
            CellGeometry::Polygon(shape) => {
                let planar = self.project_shape(shape)?;
                let centroid = planar.centroid().ok_or_else(|| {
                    CoverageError::MalformedGeometry(format!("cell '{}' has no centroid", cell.id))
                })?;
                Ok(PlanarCell {
                    representative: centroid.0,
                    shape: Some(planar),
                })
            }
        }
    }

    /// Flat-earth distance in metres.
    pub fn distance(&self, a: &GeoPoint, b: &GeoPoint) -> Result<f64> {
        let (pa, pb) = (self.project(a)?, self.project(b)?);
        Ok((pa.x - pb.x).hypot(pa.y - pb.y))
    }
}

/// A population cell in frame metres.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanarCell {
    /// The point itself, or the planar centroid of a polygon.
    pub representative: Coord<f64>,
    pub shape: Option<MultiPolygon<f64>>,
}

impl PlanarCell {
    /// Share of the cell inside `disc`: 1 or 0 for points, clipped area for polygons.
    pub fn overlap(&self, disc: &Disc, prior: &[Disc], segments: usize) -> f64 {
        match &self.shape {
            Some(shape) => exclusive_overlap_fraction(shape, disc, prior, segments),
            None if disc.contains(self.representative)
                && !prior.iter().any(|p| p.contains(self.representative)) =>
            {
                1.0
            }
            None => 0.0,
        }
    }
}

/// Straight-line distance through the ellipsoid between two surface points.
///
/// Never longer than the distance along the surface.
pub fn chord_distance(a: &GeoPoint, b: &GeoPoint) -> f64 {
    chord(geocentric(a), geocentric(b))
}

fn geocentric(point: &GeoPoint) -> [f64; 3] {
    Ellipsoid::WGS84.geocentric(point)
}

fn chord(a: [f64; 3], b: [f64; 3]) -> f64 {
    ((a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2) + (a[2] - b[2]).powi(2)).sqrt()
}

/// Where a cell sits on the ellipsoid, for candidate lookups.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellSite {
    /// The point itself, or the centroid of a polygon in longitude/latitude.
    pub anchor: GeoPoint,
    /// Largest straight-line distance in metres from the anchor to a vertex.
    pub extent: f64,
}

impl CellSite {
    /// Validates every coordinate of the cell and locates it.
    pub fn of(cell: &PopulationCell) -> Result<Self> {
        match &cell.geometry {
            CellGeometry::Point(point) => {
                point.validate()?;
                Ok(Self {
                    anchor: *point,
                    extent: 0.0,
                })
            }
            CellGeometry::Polygon(shape) => {
                let centroid = shape.centroid().ok_or_else(|| {
                    CoverageError::MalformedGeometry(format!("cell '{}' has no centroid", cell.id))
                })?;
                let anchor = GeoPoint::new(centroid.y(), centroid.x())?;
                let origin = geocentric(&anchor);
                let mut extent: f64 = 0.0;
                for c in shape.coords_iter() {
                    let vertex = geocentric(&GeoPoint::new(c.y, c.x)?);
                    extent = extent.max(chord(origin, vertex));
                }
                Ok(Self { anchor, extent })
            }
        }
    }
}

/// R-tree over geocentric positions tagged with their position in the source slice.
pub struct PointIndex {
    tree: RTree<GeomWithData<[f64; 3], usize>>,
}

impl PointIndex {
    pub fn new(points: &[GeoPoint]) -> Self {
        let entries = points
            .iter()
            .enumerate()
            .map(|(i, p)| GeomWithData::new(geocentric(p), i))
            .collect();
        Self {
            tree: RTree::bulk_load(entries),
        }
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    /// Indices of the points within `reach` metres of `center` in a straight
    /// line, ascending. Every point within `reach` along the surface is included.
    pub fn near(&self, center: &GeoPoint, reach: f64) -> Vec<usize> {
        let mut hits: Vec<usize> = self
            .tree
            .locate_within_distance(geocentric(center), reach * reach)
            .map(|entry| entry.data)
            .collect();
        hits.sort_unstable();
        hits
    }
}

/// Cells whose representative point lies within `radius_m` of `center`, with
/// the share of each cell inside the disc.
///
/// Distances are measured in the UTM frame of `center`. Cells that cannot be
/// projected are left out.
pub fn within_radius<'a>(
    center: &GeoPoint,
    radius_m: f64,
    cells: &'a [PopulationCell],
) -> Result<Vec<(&'a PopulationCell, f64)>> {
    if !radius_m.is_finite() || radius_m < 0.0 {
        return Err(CoverageError::InvalidConfig(format!(
            "radius must be a finite, non-negative number of metres, got {}",
            radius_m
        )));
    }
    let frame = PlanarFrame::centred_on(center)?;
    let disc = Disc::new(frame.project(center)?, radius_m);

    let mut matches = Vec::new();
    for cell in cells {
        let planar = match frame.project_cell(cell) {
            Ok(planar) => planar,
            Err(e) if e.is_record_level() => {
                logger::debug(&format!("Leaving out cell '{}': {}", cell.id, e));
                continue;
            }
            Err(e) => return Err(e),
        };
        if disc.contains(planar.representative) {
            matches.push((cell, planar.overlap(&disc, &[], DEFAULT_SEGMENTS)));
        }
    }
    Ok(matches)
}
