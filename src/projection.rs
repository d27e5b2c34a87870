//! Ellipsoidal Transverse Mercator projection engine.
//!
//! A single engine serves both the NZGD2000 / NZTM2000 survey grid
//! (EPSG:2193) and the 60 UTM zones. All angles cross the public API in
//! degrees; everything below it works in radians.

pub mod krueger;

use crate::error::{CoverageError, Result};
use crate::model::GeoPoint;
use krueger::KruegerSeries;

/// Reference ellipsoid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ellipsoid {
    /// Semi-major axis in meters.
    pub a: f64,
    /// Flattening.
    pub f: f64,
}

impl Ellipsoid {
    pub const WGS84: Ellipsoid = Ellipsoid {
        a: 6_378_137.0,
        f: 1.0 / 298.257_223_563,
    };

    /// Ellipsoid of NZGD2000.
    pub const GRS80: Ellipsoid = Ellipsoid {
        a: 6_378_137.0,
        f: 1.0 / 298.257_222_101,
    };

    /// First eccentricity `e = sqrt(f(2 - f))`.
    pub fn eccentricity(&self) -> f64 {
        (self.f * (2.0 - self.f)).sqrt()
    }

    /// Earth-centred Cartesian position of a surface point, in meters.
    pub fn geocentric(&self, point: &GeoPoint) -> [f64; 3] {
        let e2 = self.f * (2.0 - self.f);
        let (sin_phi, cos_phi) = point.latitude.to_radians().sin_cos();
        let (sin_lam, cos_lam) = point.longitude.to_radians().sin_cos();
        let n = self.a / (1.0 - e2 * sin_phi * sin_phi).sqrt();
        [
            n * cos_phi * cos_lam,
            n * cos_phi * sin_lam,
            n * (1.0 - e2) * sin_phi,
        ]
    }
}

/// Northern or southern UTM hemisphere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Hemisphere {
    North,
    South,
}

impl Hemisphere {
    pub fn of_latitude(latitude: f64) -> Self {
        if latitude < 0.0 {
            Hemisphere::South
        } else {
            Hemisphere::North
        }
    }
}

pub const UTM_SCALE_FACTOR: f64 = 0.9996;
pub const UTM_FALSE_EASTING: f64 = 500_000.0;
pub const UTM_FALSE_NORTHING_SOUTH: f64 = 10_000_000.0;

pub const NZTM_CENTRAL_MERIDIAN: f64 = 173.0;
pub const NZTM_FALSE_EASTING: f64 = 1_600_000.0;
pub const NZTM_FALSE_NORTHING: f64 = 10_000_000.0;

/// Defining parameters of a Transverse Mercator grid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TmParams {
    pub ellipsoid: Ellipsoid,
    /// Longitude of the central meridian in degrees.
    pub central_meridian: f64,
    /// Latitude of the false origin in degrees.
    pub origin_latitude: f64,
    pub scale_factor: f64,
    pub false_easting: f64,
    pub false_northing: f64,
}

impl TmParams {
    /// UTM parameters for a zone on the WGS84 ellipsoid.
    pub fn utm(zone: u8, hemisphere: Hemisphere) -> Result<Self> {
        if !(1..=60).contains(&zone) {
            return Err(CoverageError::UnsupportedZone(zone as i32));
        }
        Ok(Self {
            ellipsoid: Ellipsoid::WGS84,
            central_meridian: central_meridian(zone),
            origin_latitude: 0.0,
            scale_factor: UTM_SCALE_FACTOR,
            false_easting: UTM_FALSE_EASTING,
            false_northing: match hemisphere {
                Hemisphere::North => 0.0,
                Hemisphere::South => UTM_FALSE_NORTHING_SOUTH,
            },
        })
    }

    /// New Zealand Transverse Mercator 2000 (EPSG:2193).
    pub fn nztm2000() -> Self {
        Self {
            ellipsoid: Ellipsoid::GRS80,
            central_meridian: NZTM_CENTRAL_MERIDIAN,
            origin_latitude: 0.0,
            scale_factor: UTM_SCALE_FACTOR,
            false_easting: NZTM_FALSE_EASTING,
            false_northing: NZTM_FALSE_NORTHING,
        }
    }

    /// Rejects parameter sets the series cannot be evaluated with.
    pub fn validate(&self) -> Result<()> {
        let Ellipsoid { a, f } = self.ellipsoid;
        if !(a.is_finite() && a > 0.0) {
            return Err(CoverageError::InvalidProjection(format!(
                "semi-major axis must be positive, got {}",
                a
            )));
        }
        if !(f.is_finite() && (0.0..1.0).contains(&f)) {
            return Err(CoverageError::InvalidProjection(format!(
                "flattening must be in [0, 1), got {}",
                f
            )));
        }
        if !(self.scale_factor.is_finite() && self.scale_factor > 0.0) {
            return Err(CoverageError::InvalidProjection(format!(
                "scale factor must be positive, got {}",
                self.scale_factor
            )));
        }
        if !(self.central_meridian.is_finite() && self.central_meridian.abs() <= 180.0) {
            return Err(CoverageError::InvalidProjection(format!(
                "central meridian out of range: {}",
                self.central_meridian
            )));
        }
        if !(self.origin_latitude.is_finite() && self.origin_latitude.abs() < 90.0) {
            return Err(CoverageError::InvalidProjection(format!(
                "origin latitude out of range: {}",
                self.origin_latitude
            )));
        }
        if !(self.false_easting.is_finite() && self.false_northing.is_finite()) {
            return Err(CoverageError::InvalidProjection(
                "false easting/northing must be finite".to_string(),
            ));
        }
        Ok(())
    }
}

/// A Transverse Mercator grid with its series precomputed.
#[derive(Debug, Clone)]
pub struct TransverseMercator {
    params: TmParams,
    series: KruegerSeries,
    eccentricity: f64,
    /// `xi` of the false origin, subtracted from every northing.
    origin_xi: f64,
}

impl PartialEq for TransverseMercator {
    fn eq(&self, other: &Self) -> bool {
        self.params == other.params
    }
}

impl TransverseMercator {
    /// Builds a projection after validating its parameters.
    pub fn new(params: TmParams) -> Result<Self> {
        params.validate()?;
        let series = KruegerSeries::new(params.ellipsoid.a, params.ellipsoid.f);
        let eccentricity = params.ellipsoid.eccentricity();
        let origin_xi = if params.origin_latitude == 0.0 {
            0.0
        } else {
            let tau = params.origin_latitude.to_radians().tan();
            let xi_p = krueger::conformal_tau(tau, eccentricity).atan();
            series.forward(xi_p, 0.0).0
        };
        Ok(Self {
            params,
            series,
            eccentricity,
            origin_xi,
        })
    }

    pub fn utm(zone: u8, hemisphere: Hemisphere) -> Result<Self> {
        Self::new(TmParams::utm(zone, hemisphere)?)
    }

    pub fn nztm2000() -> Self {
        let params = TmParams::nztm2000();
        let series = KruegerSeries::new(params.ellipsoid.a, params.ellipsoid.f);
        Self {
            eccentricity: params.ellipsoid.eccentricity(),
            params,
            series,
            origin_xi: 0.0,
        }
    }

    pub fn params(&self) -> &TmParams {
        &self.params
    }

    fn radius(&self) -> f64 {
        self.params.scale_factor * self.series.rectifying_radius
    }

    /// Geodetic to grid: returns `(easting, northing)` in meters.
    pub fn forward(&self, point: &GeoPoint) -> Result<(f64, f64)> {
        point.validate()?;
        let lam = wrap_longitude(point.longitude - self.params.central_meridian).to_radians();
        let tau = point.latitude.to_radians().tan();
        let tau_p = krueger::conformal_tau(tau, self.eccentricity);

        let (sin_lam, cos_lam) = lam.sin_cos();
        let xi_p = tau_p.atan2(cos_lam);
        let eta_p = (sin_lam / tau_p.hypot(cos_lam)).asinh();
        let (xi, eta) = self.series.forward(xi_p, eta_p);

        let easting = self.params.false_easting + self.radius() * eta;
        let northing = self.params.false_northing + self.radius() * (xi - self.origin_xi);
        Ok((easting, northing))
    }

    /// Grid to geodetic.
    pub fn inverse(&self, easting: f64, northing: f64) -> Result<GeoPoint> {
        if !(easting.is_finite() && northing.is_finite()) {
            return Err(CoverageError::InvalidCoordinate {
                latitude: northing,
                longitude: easting,
            });
        }
        let xi = (northing - self.params.false_northing) / self.radius() + self.origin_xi;
        let eta = (easting - self.params.false_easting) / self.radius();
        let (xi_p, eta_p) = self.series.inverse(xi, eta);

        let sinh_eta = eta_p.sinh();
        let cos_xi = xi_p.cos().max(0.0);
        let r = sinh_eta.hypot(cos_xi);

        let (latitude, lam) = if r == 0.0 {
            (90.0_f64.copysign(xi_p), 0.0)
        } else {
            let tau_p = xi_p.sin() / r;
            let tau = krueger::geodetic_tau(tau_p, self.eccentricity);
            (tau.atan().to_degrees(), sinh_eta.atan2(cos_xi).to_degrees())
        };

        let longitude = wrap_longitude(self.params.central_meridian + lam);
        GeoPoint::new(latitude, longitude)
    }
}

/// A point in a UTM zone. Produced by [`to_projected`], never edited.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectedPoint {
    pub easting: f64,
    pub northing: f64,
    pub zone: u8,
    pub hemisphere: Hemisphere,
}

/// Central meridian of a UTM zone in degrees.
pub fn central_meridian(zone: u8) -> f64 {
    zone as f64 * 6.0 - 183.0
}

/// UTM zone containing a longitude. The 180th meridian belongs to zone 60.
pub fn zone_for_longitude(longitude: f64) -> Result<u8> {
    if !longitude.is_finite() || longitude.abs() > 180.0 {
        return Err(CoverageError::InvalidCoordinate {
            latitude: f64::NAN,
            longitude,
        });
    }
    let zone = ((longitude + 180.0) / 6.0).floor() as i32 + 1;
    Ok(zone.min(60) as u8)
}

/// Projects a WGS84 point into UTM, in its own zone unless one is given.
pub fn to_projected(point: &GeoPoint, target_zone: Option<i32>) -> Result<ProjectedPoint> {
    point.validate()?;
    let zone = match target_zone {
        Some(zone) if (1..=60).contains(&zone) => zone as u8,
        Some(zone) => return Err(CoverageError::UnsupportedZone(zone)),
        None => zone_for_longitude(point.longitude)?,
    };
    let hemisphere = Hemisphere::of_latitude(point.latitude);
    let (easting, northing) = TransverseMercator::utm(zone, hemisphere)?.forward(point)?;
    Ok(ProjectedPoint {
        easting,
        northing,
        zone,
        hemisphere,
    })
}

/// Converts grid coordinates back to WGS84 using the source grid's parameters.
///
/// The point's zone and hemisphere are ignored; `source` fully defines the grid.
pub fn to_geodetic(point: &ProjectedPoint, source: &TransverseMercator) -> Result<GeoPoint> {
    source.inverse(point.easting, point.northing)
}

/// Converts a UTM point back to WGS84 using its own zone and hemisphere.
pub fn to_geodetic_utm(point: &ProjectedPoint) -> Result<GeoPoint> {
    let source = TransverseMercator::utm(point.zone, point.hemisphere)?;
    to_geodetic(point, &source)
}

fn wrap_longitude(degrees: f64) -> f64 {
    if degrees > 180.0 {
        degrees - 360.0
    } else if degrees < -180.0 {
        degrees + 360.0
    } else {
        degrees
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pt(lat: f64, lon: f64) -> GeoPoint {
        GeoPoint::new(lat, lon).unwrap()
    }

    #[test]
    fn test_zone_for_longitude() {
        assert_eq!(zone_for_longitude(-180.0).unwrap(), 1);
        assert_eq!(zone_for_longitude(0.0).unwrap(), 31);
        assert_eq!(zone_for_longitude(174.7633).unwrap(), 60);
        assert_eq!(zone_for_longitude(180.0).unwrap(), 60);
        assert_eq!(zone_for_longitude(-177.5).unwrap(), 1);
        assert!(zone_for_longitude(181.0).is_err());
    }

    #[test]
    fn test_geocentric_axes() {
        let wgs84 = Ellipsoid::WGS84;
        let [x, y, z] = wgs84.geocentric(&pt(0.0, 0.0));
        assert!((x - wgs84.a).abs() < 1e-6 && y.abs() < 1e-6 && z.abs() < 1e-6);

        let [x, y, z] = wgs84.geocentric(&pt(90.0, 45.0));
        let b = wgs84.a * (1.0 - wgs84.f);
        assert!(x.abs() < 1e-6 && y.abs() < 1e-6);
        assert!((z - b).abs() < 1e-6, "{}", z);
    }

    #[test]
    fn test_central_meridian() {
        assert_eq!(central_meridian(1), -177.0);
        assert_eq!(central_meridian(31), 3.0);
        assert_eq!(central_meridian(60), 177.0);
    }

    #[test]
    fn test_origin_of_utm_zone() {
        let p = to_projected(&pt(0.0, 3.0), None).unwrap();
        assert_eq!(p.zone, 31);
        assert!((p.easting - 500_000.0).abs() < 1e-6);
        assert!(p.northing.abs() < 1e-6);
    }

    #[test]
    fn test_southern_false_northing() {
        let p = to_projected(&pt(-1e-9, 3.0), None).unwrap();
        assert_eq!(p.hemisphere, Hemisphere::South);
        assert!((p.northing - 10_000_000.0).abs() < 1e-3);
    }

    #[test]
    fn test_pole_northing_is_scaled_quarter_meridian() {
        let tm = TransverseMercator::utm(31, Hemisphere::North).unwrap();
        let (e, n) = tm.forward(&pt(90.0, 3.0)).unwrap();
        assert!((e - 500_000.0).abs() < 1e-6);
        assert!((n - 0.9996 * 10_001_965.729).abs() < 0.01);
    }

    #[test]
    fn test_nztm_false_origin() {
        let tm = TransverseMercator::nztm2000();
        let (e, n) = tm.forward(&pt(0.0, 173.0)).unwrap();
        assert!((e - 1_600_000.0).abs() < 1e-6);
        assert!((n - 10_000_000.0).abs() < 1e-6);
    }

    #[test]
    fn test_nztm_auckland_in_expected_range() {
        let tm = TransverseMercator::nztm2000();
        let (e, n) = tm.forward(&pt(-36.8485, 174.7633)).unwrap();
        assert!(e > 1_750_000.0 && e < 1_765_000.0, "easting {}", e);
        assert!(n > 5_910_000.0 && n < 5_930_000.0, "northing {}", n);
    }

    #[test]
    fn test_nztm_inverse_roundtrip() {
        let tm = TransverseMercator::nztm2000();
        let original = pt(-41.2865, 174.7762);
        let (e, n) = tm.forward(&original).unwrap();
        let back = tm.inverse(e, n).unwrap();
        assert!((back.latitude - original.latitude).abs() < 1e-9);
        assert!((back.longitude - original.longitude).abs() < 1e-9);
    }

    #[test]
    fn test_roundtrip_every_zone_within_a_centimeter() {
        // 1e-7 degrees is roughly 1 cm.
        for zone in 1..=60u8 {
            let cm = central_meridian(zone);
            for lat in [-80.0, -45.5, -36.8485, -0.5, 0.0, 12.25, 51.5, 84.0] {
                for offset in [-2.999, -1.0, 0.0, 1.7, 2.999] {
                    let original = pt(lat, cm + offset);
                    let projected = to_projected(&original, None).unwrap();
                    assert_eq!(projected.zone, zone);
                    let back = to_geodetic_utm(&projected).unwrap();
                    assert!(
                        (back.latitude - lat).abs() < 1e-7
                            && (back.longitude - original.longitude).abs() < 1e-7,
                        "zone {} lat {} lon {} -> {:?}",
                        zone,
                        lat,
                        original.longitude,
                        back
                    );
                }
            }
        }
    }

    #[test]
    fn test_explicit_zone_out_of_range() {
        let err = to_projected(&pt(-36.8, 174.7), Some(61)).unwrap_err();
        assert!(matches!(err, CoverageError::UnsupportedZone(61)));
        let err = to_projected(&pt(-36.8, 174.7), Some(0)).unwrap_err();
        assert!(matches!(err, CoverageError::UnsupportedZone(0)));
    }

    #[test]
    fn test_explicit_zone_outside_point_zone() {
        // Auckland projected into zone 59 lies east of that zone's band.
        let p = to_projected(&pt(-36.8485, 174.7633), Some(59)).unwrap();
        assert_eq!(p.zone, 59);
        assert!(p.easting > 700_000.0);
        let back = to_geodetic_utm(&p).unwrap();
        assert!((back.longitude - 174.7633).abs() < 1e-7);
    }

    #[test]
    fn test_invalid_coordinate_rejected() {
        let bad = GeoPoint {
            latitude: 95.0,
            longitude: 0.0,
        };
        assert!(matches!(
            to_projected(&bad, None),
            Err(CoverageError::InvalidCoordinate { .. })
        ));
    }

    #[test]
    fn test_invalid_params_rejected() {
        let mut params = TmParams::nztm2000();
        params.scale_factor = 0.0;
        assert!(matches!(
            TransverseMercator::new(params),
            Err(CoverageError::InvalidProjection(_))
        ));
    }

    #[test]
    fn test_origin_latitude_offsets_northing() {
        let params = TmParams {
            origin_latitude: -41.0,
            false_northing: 800_000.0,
            ..TmParams::nztm2000()
        };
        let tm = TransverseMercator::new(params).unwrap();
        let (_, n) = tm.forward(&pt(-41.0, 173.0)).unwrap();
        assert!((n - 800_000.0).abs() < 1e-6);
        let back = tm.inverse(1_650_000.0, 760_000.0).unwrap();
        let (e2, n2) = tm.forward(&back).unwrap();
        assert!((e2 - 1_650_000.0).abs() < 1e-6);
        assert!((n2 - 760_000.0).abs() < 1e-6);
    }
}
