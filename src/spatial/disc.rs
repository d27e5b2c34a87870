//! Closed planar discs and polygon clipping against them.
//!
//! Coordinates are metres in a [`super::PlanarFrame`]. Area overlaps use a
//! regular polygon scaled so that its area equals the analytic `pi * r^2`,
//! which keeps whole-disc areas exact and partial overlaps within a few
//! metres of the true boundary.

use std::f64::consts::PI;

use geo::{Area, BooleanOps, BoundingRect, Coord, LineString, MultiPolygon, Polygon, Rect};

/// Slack added to the radius when testing membership, absorbing projection round-off.
pub const BOUNDARY_TOLERANCE_M: f64 = 1e-6;

/// Polygon vertex count used when none is configured.
pub const DEFAULT_SEGMENTS: usize = 128;

/// Smallest accepted vertex count.
pub const MIN_SEGMENTS: usize = 64;

/// A closed disc `{p : |p - center| <= radius}`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Disc {
    pub center: Coord<f64>,
    pub radius: f64,
}

impl Disc {
    pub fn new(center: Coord<f64>, radius: f64) -> Self {
        Self { center, radius }
    }

    /// Euclidean distance from the centre.
    pub fn distance_to(&self, point: Coord<f64>) -> f64 {
        (point.x - self.center.x).hypot(point.y - self.center.y)
    }

    /// Closed membership test: points exactly on the boundary are inside.
    pub fn contains(&self, point: Coord<f64>) -> bool {
        self.distance_to(point) <= self.radius + BOUNDARY_TOLERANCE_M
    }

    /// Regular polygon with the same area as the disc.
    ///
    /// `segments` below [`MIN_SEGMENTS`] is raised to the minimum.
    pub fn polygon(&self, segments: usize) -> Polygon<f64> {
        let n = segments.max(MIN_SEGMENTS);
        let step = 2.0 * PI / n as f64;
        let circumradius = self.radius * (2.0 * PI / (n as f64 * step.sin())).sqrt();

        let mut ring: Vec<Coord<f64>> = (0..n)
            .map(|i| {
                let angle = i as f64 * step;
                Coord {
                    x: self.center.x + circumradius * angle.cos(),
                    y: self.center.y + circumradius * angle.sin(),
                }
            })
            .collect();
        ring.push(ring[0]);
        Polygon::new(LineString::from(ring), vec![])
    }

    fn multipolygon(&self, segments: usize) -> MultiPolygon<f64> {
        MultiPolygon::new(vec![self.polygon(segments)])
    }

    /// Largest distance from the centre to any point of the approximating polygon.
    fn outer_radius(&self, segments: usize) -> f64 {
        let n = segments.max(MIN_SEGMENTS) as f64;
        self.radius * (2.0 * PI / (n * (2.0 * PI / n).sin())).sqrt()
    }

    /// Distance from the centre to the nearest edge of the approximating polygon.
    fn inner_radius(&self, segments: usize) -> f64 {
        let n = segments.max(MIN_SEGMENTS) as f64;
        self.outer_radius(segments) * (PI / n).cos()
    }

    fn misses(&self, rect: &Rect<f64>, segments: usize) -> bool {
        let dx = (rect.min().x - self.center.x)
            .max(0.0)
            .max(self.center.x - rect.max().x);
        let dy = (rect.min().y - self.center.y)
            .max(0.0)
            .max(self.center.y - rect.max().y);
        dx.hypot(dy) > self.outer_radius(segments)
    }

    fn covers(&self, rect: &Rect<f64>, segments: usize) -> bool {
        let inner = self.inner_radius(segments);
        let (min, max) = (rect.min(), rect.max());
        [min, max, Coord { x: min.x, y: max.y }, Coord { x: max.x, y: min.y }]
            .iter()
            .all(|corner| self.distance_to(*corner) <= inner)
    }
}

/// `area(cell ∩ disc) / area(cell)`, in `[0, 1]`.
///
/// Degenerate cells with no area overlap nothing.
pub fn overlap_fraction(cell: &MultiPolygon<f64>, disc: &Disc, segments: usize) -> f64 {
    exclusive_overlap_fraction(cell, disc, &[], segments)
}

/// `area(cell ∩ disc \ (prior_1 ∪ prior_2 ∪ ...)) / area(cell)`, in `[0, 1]`.
pub fn exclusive_overlap_fraction(
    cell: &MultiPolygon<f64>,
    disc: &Disc,
    prior: &[Disc],
    segments: usize,
) -> f64 {
    let cell_area = cell.unsigned_area();
    let bounds = match cell.bounding_rect() {
        Some(bounds) if cell_area > 0.0 => bounds,
        _ => return 0.0,
    };
    if disc.misses(&bounds, segments) {
        return 0.0;
    }

    let blockers: Vec<&Disc> = prior
        .iter()
        .filter(|p| !p.misses(&bounds, segments))
        .collect();
    if blockers.is_empty() && disc.covers(&bounds, segments) {
        return 1.0;
    }
    if blockers.iter().any(|p| p.covers(&bounds, segments)) {
        return 0.0;
    }

    let mut region = if disc.covers(&bounds, segments) {
        cell.clone()
    } else {
        cell.intersection(&disc.multipolygon(segments))
    };
    for blocker in blockers {
        if region.0.is_empty() {
            break;
        }
        region = region.difference(&blocker.multipolygon(segments));
    }

    (region.unsigned_area() / cell_area).clamp(0.0, 1.0)
}
