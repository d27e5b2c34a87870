//! Exclusive coverage of population and facilities by failed towers.
//!
//! Every tower measures in the UTM frame of its own position. Candidate
//! discovery runs in parallel: a geocentric R-tree query per tower, then an
//! exact check in that tower's frame. A single sequential pass then walks the
//! towers in priority order and hands each cell to the first tower that
//! reaches it, which is the same assignment a strictly sequential loop makes.
//! Weighted fractions are computed in parallel afterwards, against each
//! owner's disc minus the discs of every tower ahead of it in the order.
//!
//! In weighted mode a polygon cell whose representative point lies outside
//! every disc can still overlap one. Such fringe cells go to the first tower
//! in the order whose exclusive share of the cell is above the threshold.

use std::collections::{BTreeMap, HashSet};

use rayon::prelude::*;

use crate::config::{CoverageConfig, CoverageMode, Weights};
use crate::error::{CoverageError, Result};
use crate::logger;
use crate::model::{
    Asset, CellGeometry, CoverageResult, Facility, FacilityType, GeoPoint, PopulationCell,
    RecordKind, SkippedRecord,
};
use crate::projection::Hemisphere;
use crate::spatial::{chord_distance, CellSite, Disc, PlanarFrame, PointIndex};

/// Candidate lookups reach this far past the radius, covering frame scale
/// factors and the gap between a polygon's planar and geodetic centroids.
const REACH_SLACK: f64 = 1.01;

/// Which tower a population cell was attributed to, and the share of it counted.
#[derive(Debug, Clone, PartialEq)]
pub struct CellAssignment {
    pub cell_id: String,
    pub asset_id: String,
    pub fraction: f64,
}

/// Everything one run produces. Owned by the caller; nothing is cached between runs.
#[derive(Debug, Clone, PartialEq)]
pub struct CoverageReport {
    /// One entry per failed tower, in claim priority order.
    pub results: Vec<CoverageResult>,
    /// Cells attributed to failed towers, in claim priority order.
    pub assignments: Vec<CellAssignment>,
    pub skipped: Vec<SkippedRecord>,
    pub cells_processed: usize,
    pub facilities_processed: usize,
    /// UTM zones and hemispheres the towers measured in, ascending by zone.
    pub frames: Vec<(u8, Hemisphere)>,
}

impl CoverageReport {
    pub fn skipped_count(&self) -> usize {
        self.skipped.len()
    }

    pub fn result(&self, asset_id: &str) -> Option<&CoverageResult> {
        self.results.iter().find(|r| r.asset_id == asset_id)
    }
}

/// Admissible cells and facilities with the indexes over them.
struct Layers<'a> {
    cells: &'a [PopulationCell],
    /// Input position and site of every admissible cell.
    sites: Vec<(usize, CellSite)>,
    cell_index: PointIndex,
    facilities: &'a [Facility],
    /// Input positions of the admissible facilities.
    facility_sites: Vec<usize>,
    facility_index: PointIndex,
    /// Widest polygon cell; zero when fringe cells are not looked for.
    fringe_extent: f64,
}

struct Claimant<'a> {
    asset: &'a Asset,
    frame: PlanarFrame,
    /// The coverage disc in `frame`.
    disc: Disc,
    /// Live towers claim ahead of failed ones and their claims are discarded.
    live: bool,
}

/// What one claimant reaches, before priority is applied.
struct Survey {
    /// Cells whose representative point is inside the disc.
    cells: Vec<usize>,
    facilities: Vec<usize>,
    /// Polygon cells overlapping the disc only past their representative
    /// point, with the exclusive share counted.
    fringe: Vec<(usize, f64)>,
    /// Earlier discs that can overlap this one, in this claimant's frame.
    prior: Vec<Disc>,
}

impl<'a> Claimant<'a> {
    fn new(asset: &'a Asset, radius: f64, live: bool) -> Result<Self> {
        let frame = PlanarFrame::centred_on(&asset.location)?;
        let disc = Disc::new(frame.project(&asset.location)?, radius);
        Ok(Self {
            asset,
            frame,
            disc,
            live,
        })
    }

    fn reach(&self) -> f64 {
        self.disc.radius * REACH_SLACK + 1.0
    }

    fn survey(
        &self,
        earlier: &[Claimant],
        layers: &Layers,
        config: &CoverageConfig,
    ) -> Result<Survey> {
        let prior = self.prior_discs(earlier)?;
        let reach = self.reach();
        let origin = &self.asset.location;

        let mut cells = Vec::new();
        let mut fringe = Vec::new();
        for c in layers.cell_index.near(origin, reach + layers.fringe_extent) {
            let (input_index, site) = &layers.sites[c];
            let cell = &layers.cells[*input_index];
            let distance = chord_distance(origin, &site.anchor);
            let fringe_candidate = config.mode == CoverageMode::Weighted
                && matches!(cell.geometry, CellGeometry::Polygon(_))
                && distance <= reach + site.extent;
            if distance > reach && !fringe_candidate {
                continue;
            }

            let planar = self.frame.project_cell(cell)?;
            if self.disc.contains(planar.representative) {
                cells.push(c);
            } else if fringe_candidate {
                let share = planar.overlap(&self.disc, &prior, config.disc_segments);
                let counted = counted_fraction(share, config.min_overlap_fraction);
                if counted > 0.0 {
                    fringe.push((c, counted));
                }
            }
        }

        let mut facilities = Vec::new();
        for f in layers.facility_index.near(origin, reach) {
            let facility = &layers.facilities[layers.facility_sites[f]];
            if self.disc.contains(self.frame.project(&facility.location)?) {
                facilities.push(f);
            }
        }

        Ok(Survey {
            cells,
            facilities,
            fringe,
            prior,
        })
    }

    fn prior_discs(&self, earlier: &[Claimant]) -> Result<Vec<Disc>> {
        let mut prior = Vec::new();
        for other in earlier {
            let apart = (other.disc.radius + self.disc.radius) * REACH_SLACK;
            if chord_distance(&self.asset.location, &other.asset.location) <= apart {
                let center = self.frame.project(&other.asset.location)?;
                prior.push(Disc::new(center, other.disc.radius));
            }
        }
        Ok(prior)
    }
}

/// Computes exclusive coverage for every `DOWN` asset.
///
/// Records with bad coordinates, geometry or population are skipped and
/// reported. The run fails only when the configuration is invalid or nothing
/// admissible is left to work with.
pub fn compute_coverage(
    assets: &[Asset],
    cells: &[PopulationCell],
    facilities: &[Facility],
    config: &CoverageConfig,
) -> Result<CoverageReport> {
    config.validate()?;
    let mut skipped = Vec::new();

    let admissible = admissible_assets(assets, &mut skipped);
    let down: Vec<&Asset> = admissible.iter().copied().filter(|a| a.is_down()).collect();
    if down.is_empty() {
        return Err(CoverageError::EmptyInput("failed (DOWN) towers"));
    }

    let sites = locate_cells(cells, &mut skipped)?;
    if sites.is_empty() {
        return Err(CoverageError::EmptyInput("population cells"));
    }
    let facility_sites = locate_facilities(facilities, &mut skipped);

    let mut claimants = Vec::new();
    if config.subtract_live_coverage {
        let mut live: Vec<&Asset> = admissible.iter().copied().filter(|a| !a.is_down()).collect();
        live.sort_by(|a, b| a.id.cmp(&b.id));
        for asset in live {
            claimants.push(Claimant::new(asset, config.radius_m, true)?);
        }
    }
    for asset in priority_order(&down, config.priority.as_deref()) {
        claimants.push(Claimant::new(asset, config.radius_m, false)?);
    }

    let mut frames: Vec<(u8, Hemisphere)> = claimants
        .iter()
        .map(|c| (c.frame.zone(), c.frame.hemisphere()))
        .collect();
    frames.sort_by_key(|&(zone, hemisphere)| (zone, hemisphere == Hemisphere::North));
    frames.dedup();
    logger::info(&format!(
        "Measuring {} failed towers in {} UTM zone(s)",
        down.len(),
        frames.len()
    ));

    let anchors: Vec<GeoPoint> = sites.iter().map(|(_, site)| site.anchor).collect();
    let facility_points: Vec<GeoPoint> =
        facility_sites.iter().map(|&i| facilities[i].location).collect();
    let fringe_extent = match config.mode {
        CoverageMode::Weighted => sites.iter().map(|(_, site)| site.extent).fold(0.0, f64::max),
        CoverageMode::Unweighted => 0.0,
    };
    let layers = Layers {
        cells,
        cell_index: PointIndex::new(&anchors),
        sites,
        facilities,
        facility_index: PointIndex::new(&facility_points),
        facility_sites,
        fringe_extent,
    };

    // Phase 1: what each claimant reaches, independent of the others.
    let surveys: Vec<Survey> = claimants
        .par_iter()
        .enumerate()
        .map(|(k, claimant)| claimant.survey(&claimants[..k], &layers, config))
        .collect::<Result<_>>()?;

    // Phase 2: first claimant in priority order wins.
    let cell_claims = resolve_claims(surveys.iter().map(|s| &s.cells), layers.sites.len());
    let fringe_claims = resolve_fringe(&surveys, &cell_claims, layers.sites.len());
    let facility_claims =
        resolve_claims(surveys.iter().map(|s| &s.facilities), layers.facility_sites.len());

    let live_cells: usize = claimants
        .iter()
        .enumerate()
        .filter(|(_, c)| c.live)
        .map(|(k, _)| cell_claims[k].len() + fringe_claims[k].len())
        .sum();
    if live_cells > 0 {
        logger::info(&format!(
            "{} cells are still served by live towers and were excluded",
            live_cells
        ));
    }
    let fringe_cells: usize = fringe_claims.iter().map(Vec::len).sum();
    if fringe_cells > 0 {
        logger::debug(&format!(
            "{} cells were reached only past their representative point",
            fringe_cells
        ));
    }

    // Phase 3: per-tower sums, independent again.
    let bar = logger::progress(down.len() as u64, "Scoring failed towers");
    let outcomes: Vec<Option<(CoverageResult, Vec<CellAssignment>)>> = claimants
        .par_iter()
        .enumerate()
        .map(|(k, claimant)| -> Result<Option<(CoverageResult, Vec<CellAssignment>)>> {
            if claimant.live {
                return Ok(None);
            }
            let claims = Claims {
                cells: &cell_claims[k],
                fringe: &fringe_claims[k],
                facilities: &facility_claims[k],
            };
            let outcome = summarise(claimant, &surveys[k].prior, &claims, &layers, config)?;
            bar.inc(1);
            Ok(Some(outcome))
        })
        .collect::<Result<_>>()?;
    bar.finish_and_clear();

    let mut results = Vec::with_capacity(down.len());
    let mut assignments = Vec::new();
    for (result, claimed) in outcomes.into_iter().flatten() {
        logger::debug(&format!(
            "Tower {}: {:.2} people ({:.2} weighted), {} hospital, {} police, {} fire, score {:.2}",
            result.asset_id,
            result.unweighted_population,
            result.weighted_population,
            result.facility_count(FacilityType::Hospital),
            result.facility_count(FacilityType::Police),
            result.facility_count(FacilityType::FireStation),
            result.score
        ));
        results.push(result);
        assignments.extend(claimed);
    }

    Ok(CoverageReport {
        results,
        assignments,
        skipped,
        cells_processed: layers.sites.len(),
        facilities_processed: layers.facility_sites.len(),
        frames,
    })
}

/// Claim order: listed ids first as given, then the rest ascending by id.
///
/// Unknown ids are ignored with a warning; a repeated id keeps its first position.
pub fn priority_order<'a>(assets: &[&'a Asset], priority: Option<&[String]>) -> Vec<&'a Asset> {
    let mut by_id: BTreeMap<&str, &'a Asset> = assets.iter().map(|a| (a.id.as_str(), *a)).collect();
    let mut ordered = Vec::with_capacity(by_id.len());
    let mut placed: HashSet<&str> = HashSet::new();

    for id in priority.unwrap_or_default() {
        if let Some(asset) = by_id.remove(id.as_str()) {
            placed.insert(asset.id.as_str());
            ordered.push(asset);
        } else if !placed.contains(id.as_str()) {
            logger::warn(&format!(
                "Priority list names '{}', which is not a failed tower; ignored",
                id
            ));
        }
    }
    ordered.extend(by_id.into_values());
    ordered
}

/// Weighted sum of facility counts and population.
pub fn score(
    weights: &Weights,
    weighted_population: f64,
    facility_counts: &BTreeMap<FacilityType, u32>,
) -> f64 {
    let facilities: f64 = FacilityType::ALL
        .iter()
        .map(|kind| {
            facility_counts.get(kind).copied().unwrap_or(0) as f64 * weights.for_facility(*kind)
        })
        .sum();
    facilities + weighted_population * weights.population_scale
}

fn record_skip(skipped: &mut Vec<SkippedRecord>, record: SkippedRecord) {
    logger::warn(&format!(
        "Skipping {} '{}': {}",
        record.kind, record.record, record.reason
    ));
    skipped.push(record);
}

fn admissible_assets<'a>(assets: &'a [Asset], skipped: &mut Vec<SkippedRecord>) -> Vec<&'a Asset> {
    let mut seen = HashSet::new();
    let mut admissible = Vec::with_capacity(assets.len());
    for asset in assets {
        if let Err(e) = asset.location.validate() {
            record_skip(skipped, SkippedRecord::new(RecordKind::Asset, &asset.id, e));
        } else if !seen.insert(asset.id.as_str()) {
            record_skip(
                skipped,
                SkippedRecord::new(RecordKind::Asset, &asset.id, "duplicate tower id"),
            );
        } else {
            admissible.push(asset);
        }
    }
    admissible
}

fn locate_cells(
    cells: &[PopulationCell],
    skipped: &mut Vec<SkippedRecord>,
) -> Result<Vec<(usize, CellSite)>> {
    let located: Vec<Result<CellSite>> = cells
        .par_iter()
        .map(|cell| {
            if !cell.population.is_finite() || cell.population < 0.0 {
                return Err(CoverageError::MissingAttribute {
                    record: cell.id.clone(),
                    field: "population".to_string(),
                });
            }
            CellSite::of(cell)
        })
        .collect();

    let mut admissible = Vec::with_capacity(cells.len());
    for (i, outcome) in located.into_iter().enumerate() {
        match outcome {
            Ok(site) => admissible.push((i, site)),
            Err(e) if e.is_record_level() => record_skip(
                skipped,
                SkippedRecord::new(RecordKind::Population, &cells[i].id, e),
            ),
            Err(e) => return Err(e),
        }
    }
    Ok(admissible)
}

fn locate_facilities(facilities: &[Facility], skipped: &mut Vec<SkippedRecord>) -> Vec<usize> {
    let mut admissible = Vec::with_capacity(facilities.len());
    for (i, facility) in facilities.iter().enumerate() {
        match facility.location.validate() {
            Ok(()) => admissible.push(i),
            Err(e) => record_skip(
                skipped,
                SkippedRecord::new(RecordKind::Facility, &facility.id, e),
            ),
        }
    }
    admissible
}

/// Hands each candidate to the first list that names it.
fn resolve_claims<'a>(
    candidates: impl Iterator<Item = &'a Vec<usize>>,
    len: usize,
) -> Vec<Vec<usize>> {
    let mut taken = vec![false; len];
    candidates
        .map(|list| {
            list.iter()
                .copied()
                .filter(|&i| !std::mem::replace(&mut taken[i], true))
                .collect()
        })
        .collect()
}

/// Hands each fringe cell that no claimant reached by its representative
/// point to the first claimant listing it.
fn resolve_fringe(
    surveys: &[Survey],
    claims: &[Vec<usize>],
    len: usize,
) -> Vec<Vec<(usize, f64)>> {
    let mut taken = vec![false; len];
    for &c in claims.iter().flatten() {
        taken[c] = true;
    }
    surveys
        .iter()
        .map(|survey| {
            survey
                .fringe
                .iter()
                .copied()
                .filter(|&(c, _)| !std::mem::replace(&mut taken[c], true))
                .collect()
        })
        .collect()
}

/// Shares at or below the threshold are slivers and count as nothing.
fn counted_fraction(share: f64, threshold: f64) -> f64 {
    if share <= threshold {
        0.0
    } else {
        share
    }
}

/// What one claimant ended up owning.
struct Claims<'c> {
    cells: &'c [usize],
    fringe: &'c [(usize, f64)],
    facilities: &'c [usize],
}

fn summarise(
    claimant: &Claimant,
    prior: &[Disc],
    claims: &Claims,
    layers: &Layers,
    config: &CoverageConfig,
) -> Result<(CoverageResult, Vec<CellAssignment>)> {
    let mut unweighted = 0.0;
    let mut weighted = 0.0;
    let mut assignments = Vec::with_capacity(claims.cells.len() + claims.fringe.len());

    let mut owned = Vec::with_capacity(assignments.capacity());
    for &c in claims.cells {
        let cell = &layers.cells[layers.sites[c].0];
        let fraction = match config.mode {
            CoverageMode::Unweighted => 1.0,
            CoverageMode::Weighted => {
                let planar = claimant.frame.project_cell(cell)?;
                let share = planar.overlap(&claimant.disc, prior, config.disc_segments);
                counted_fraction(share, config.min_overlap_fraction)
            }
        };
        owned.push((cell, fraction));
    }
    for &(c, fraction) in claims.fringe {
        owned.push((&layers.cells[layers.sites[c].0], fraction));
    }

    for (cell, fraction) in owned {
        unweighted += cell.population;
        weighted += cell.population * fraction;
        assignments.push(CellAssignment {
            cell_id: cell.id.clone(),
            asset_id: claimant.asset.id.clone(),
            fraction,
        });
    }

    let mut facility_counts: BTreeMap<FacilityType, u32> =
        FacilityType::ALL.iter().map(|kind| (*kind, 0)).collect();
    for &f in claims.facilities {
        let kind = layers.facilities[layers.facility_sites[f]].kind;
        *facility_counts.entry(kind).or_insert(0) += 1;
    }

    let result = CoverageResult {
        asset_id: claimant.asset.id.clone(),
        location: claimant.asset.location,
        unweighted_population: unweighted,
        weighted_population: weighted,
        score: score(&config.weights, weighted, &facility_counts),
        facility_counts,
    };
    Ok((result, assignments))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DisasterType;
    use crate::model::{AssetStatus, GeoPoint};
    use crate::projection::{to_geodetic_utm, to_projected, ProjectedPoint};
    use geo::{GeodesicDistance, LineString, MultiPolygon, Point, Polygon};

    fn t1() -> GeoPoint {
        GeoPoint::new(-36.8485, 174.7633).unwrap()
    }

    /// Point `east`, `north` metres from `origin` on the UTM grid.
    fn at(origin: &GeoPoint, east: f64, north: f64) -> GeoPoint {
        let p = to_projected(origin, None).unwrap();
        to_geodetic_utm(&ProjectedPoint {
            easting: p.easting + east,
            northing: p.northing + north,
            ..p
        })
        .unwrap()
    }

    fn down(id: &str, location: GeoPoint) -> Asset {
        Asset::new(id, location, AssetStatus::Down)
    }

    fn up(id: &str, location: GeoPoint) -> Asset {
        Asset::new(id, location, AssetStatus::Up)
    }

    fn square(id: &str, origin: &GeoPoint, east: f64, north: f64, size: f64, population: f64) -> PopulationCell {
        let h = size / 2.0;
        let ring: Vec<(f64, f64)> = [(-h, -h), (h, -h), (h, h), (-h, h), (-h, -h)]
            .iter()
            .map(|(dx, dy)| {
                let p = at(origin, east + dx, north + dy);
                (p.longitude, p.latitude)
            })
            .collect();
        PopulationCell::polygon(
            id,
            MultiPolygon::new(vec![Polygon::new(LineString::from(ring), vec![])]),
            population,
        )
    }

    fn facility(id: &str, location: GeoPoint, kind: FacilityType) -> Facility {
        Facility {
            id: id.to_string(),
            location,
            kind,
        }
    }

    fn unweighted_config() -> CoverageConfig {
        CoverageConfig {
            mode: CoverageMode::Unweighted,
            ..CoverageConfig::default()
        }
    }

    #[test]
    fn test_single_tower_counts_cells_inside_radius() {
        let origin = t1();
        let assets = vec![down("T1", origin)];
        let cells = vec![
            PopulationCell::point("near", at(&origin, 3000.0, 0.0), 2000.0),
            PopulationCell::point("far", at(&origin, 0.0, -6000.0), 500.0),
        ];
        let report = compute_coverage(&assets, &cells, &[], &unweighted_config()).unwrap();
        let t1 = report.result("T1").unwrap();
        assert_eq!(t1.unweighted_population, 2000.0);
        assert_eq!(t1.weighted_population, 2000.0);
        assert_eq!(report.cells_processed, 2);
        assert_eq!(report.skipped_count(), 0);
    }

    #[test]
    fn test_priority_decides_contested_cell() {
        let origin = t1();
        let assets = vec![down("B", at(&origin, 4000.0, 0.0)), down("A", origin)];
        let cells = vec![PopulationCell::point("shared", at(&origin, 2000.0, 0.0), 1000.0)];

        let config = CoverageConfig {
            priority: Some(vec!["A".to_string(), "B".to_string()]),
            ..unweighted_config()
        };
        let report = compute_coverage(&assets, &cells, &[], &config).unwrap();
        assert_eq!(report.result("A").unwrap().unweighted_population, 1000.0);
        assert_eq!(report.result("B").unwrap().unweighted_population, 0.0);

        let config = CoverageConfig {
            priority: Some(vec!["B".to_string()]),
            ..unweighted_config()
        };
        let report = compute_coverage(&assets, &cells, &[], &config).unwrap();
        assert_eq!(report.result("B").unwrap().unweighted_population, 1000.0);
        assert_eq!(report.result("A").unwrap().unweighted_population, 0.0);
    }

    #[test]
    fn test_default_priority_is_ascending_id() {
        let origin = t1();
        let assets = vec![down("T9", origin), down("T10", at(&origin, 1000.0, 0.0))];
        let cells = vec![PopulationCell::point("c", at(&origin, 500.0, 0.0), 10.0)];
        let report = compute_coverage(&assets, &cells, &[], &unweighted_config()).unwrap();
        // "T10" < "T9" lexicographically.
        assert_eq!(report.result("T10").unwrap().unweighted_population, 10.0);
        assert_eq!(report.results[0].asset_id, "T10");
    }

    #[test]
    fn test_priority_order_ignores_unknown_and_duplicates() {
        let a = down("A", t1());
        let b = down("B", t1());
        let c = down("C", t1());
        let assets = vec![&a, &b, &c];
        let priority = vec![
            "C".to_string(),
            "ghost".to_string(),
            "C".to_string(),
            "A".to_string(),
        ];
        let ordered: Vec<&str> = priority_order(&assets, Some(priority.as_slice()))
            .iter()
            .map(|a| a.id.as_str())
            .collect();
        assert_eq!(ordered, vec!["C", "A", "B"]);
    }

    #[test]
    fn test_no_cell_counted_twice() {
        let origin = t1();
        let assets: Vec<Asset> = (0..4)
            .map(|i| down(&format!("T{}", i), at(&origin, i as f64 * 3000.0, 0.0)))
            .collect();
        let cells: Vec<PopulationCell> = (0..60)
            .map(|i| {
                PopulationCell::point(
                    format!("c{}", i),
                    at(&origin, (i % 12) as f64 * 1000.0 - 2000.0, (i / 12) as f64 * 1500.0 - 3000.0),
                    (i + 1) as f64,
                )
            })
            .collect();
        let report = compute_coverage(&assets, &cells, &[], &unweighted_config()).unwrap();

        let mut seen = HashSet::new();
        for a in &report.assignments {
            assert!(seen.insert(a.cell_id.clone()), "cell {} assigned twice", a.cell_id);
        }
        let attributed: f64 = report.results.iter().map(|r| r.unweighted_population).sum();
        let assigned: f64 = report
            .assignments
            .iter()
            .map(|a| cells.iter().find(|c| c.id == a.cell_id).unwrap().population)
            .sum();
        assert!((attributed - assigned).abs() < 1e-9);
        assert!(attributed <= cells.iter().map(|c| c.population).sum::<f64>());
    }

    #[test]
    fn test_weighted_never_exceeds_unweighted() {
        let origin = t1();
        let assets = vec![down("A", origin), down("B", at(&origin, 6000.0, 0.0))];
        let cells: Vec<PopulationCell> = (0..10)
            .map(|i| square(&format!("sq{}", i), &origin, i as f64 * 1000.0, 400.0, 800.0, 100.0))
            .collect();
        let report = compute_coverage(&assets, &cells, &[], &CoverageConfig::default()).unwrap();
        for r in &report.results {
            assert!(
                r.weighted_population <= r.unweighted_population,
                "{}: {} > {}",
                r.asset_id,
                r.weighted_population,
                r.unweighted_population
            );
        }
        let b = report.result("B").unwrap();
        assert!(b.weighted_population < b.unweighted_population);
    }

    #[test]
    fn test_boundary_cell_partially_weighted() {
        let origin = t1();
        let assets = vec![down("T1", origin)];
        let cells = vec![
            square("inside", &origin, 0.0, 0.0, 250.0, 100.0),
            square("edge", &origin, 4990.0, 0.0, 250.0, 100.0),
        ];
        let report = compute_coverage(&assets, &cells, &[], &CoverageConfig::default()).unwrap();
        let t1 = report.result("T1").unwrap();
        assert_eq!(t1.unweighted_population, 200.0);
        assert!(t1.weighted_population > 150.0 && t1.weighted_population < 160.0);
    }

    #[test]
    fn test_sliver_overlap_is_dropped() {
        let origin = t1();
        // Centroid is inside, but about half of the 2 km cell lies outside the disc.
        let assets = vec![down("T1", origin)];
        let cells = vec![square("big", &origin, 4990.0, 0.0, 2000.0, 100.0)];
        let strict = CoverageConfig {
            min_overlap_fraction: 0.9,
            ..CoverageConfig::default()
        };
        let report = compute_coverage(&assets, &cells, &[], &strict).unwrap();
        assert_eq!(report.result("T1").unwrap().weighted_population, 0.0);
        assert_eq!(report.assignments[0].fraction, 0.0);
    }

    #[test]
    fn test_facilities_are_exclusive_per_type() {
        let origin = t1();
        let assets = vec![down("A", origin), down("B", at(&origin, 3000.0, 0.0))];
        let cells = vec![PopulationCell::point("c", origin, 1.0)];
        let facilities = vec![
            facility("h1", at(&origin, 1500.0, 0.0), FacilityType::Hospital),
            facility("p1", at(&origin, 7000.0, 0.0), FacilityType::Police),
            facility("f1", at(&origin, 20_000.0, 0.0), FacilityType::FireStation),
        ];
        let report =
            compute_coverage(&assets, &cells, &facilities, &unweighted_config()).unwrap();
        let a = report.result("A").unwrap();
        let b = report.result("B").unwrap();
        assert_eq!(a.facility_count(FacilityType::Hospital), 1);
        assert_eq!(b.facility_count(FacilityType::Hospital), 0);
        assert_eq!(b.facility_count(FacilityType::Police), 1);
        assert_eq!(a.facility_count(FacilityType::FireStation), 0);
        assert_eq!(b.facility_count(FacilityType::FireStation), 0);
        assert_eq!(report.facilities_processed, 3);
    }

    #[test]
    fn test_score_uses_disaster_weights() {
        let origin = t1();
        let assets = vec![down("T1", origin)];
        let cells = vec![PopulationCell::point("c", origin, 10_000.0)];
        let facilities = vec![
            facility("h", origin, FacilityType::Hospital),
            facility("f", origin, FacilityType::FireStation),
            facility("f2", origin, FacilityType::FireStation),
        ];
        let config = CoverageConfig::for_disaster(DisasterType::Wildfire);
        let report = compute_coverage(&assets, &cells, &facilities, &config).unwrap();
        let w = DisasterType::Wildfire.weights();
        let expected = w.hospital + 2.0 * w.fire_station + 10_000.0 * w.population_scale;
        assert!((report.results[0].score - expected).abs() < 1e-9);
    }

    #[test]
    fn test_live_towers_remove_coverage() {
        let origin = t1();
        let assets = vec![down("F1", origin), up("L1", at(&origin, 2000.0, 0.0))];
        let cells = vec![
            PopulationCell::point("shared", at(&origin, 1000.0, 0.0), 300.0),
            PopulationCell::point("own", at(&origin, -4000.0, 0.0), 50.0),
        ];
        let report = compute_coverage(&assets, &cells, &[], &unweighted_config()).unwrap();
        assert_eq!(report.result("F1").unwrap().unweighted_population, 350.0);

        let config = CoverageConfig {
            subtract_live_coverage: true,
            ..unweighted_config()
        };
        let report = compute_coverage(&assets, &cells, &[], &config).unwrap();
        assert_eq!(report.results.len(), 1);
        assert_eq!(report.result("F1").unwrap().unweighted_population, 50.0);
        assert!(report.result("L1").is_none());
    }

    #[test]
    fn test_bad_records_are_skipped() {
        let origin = t1();
        let assets = vec![
            down("T1", origin),
            down("bad", GeoPoint { latitude: 95.0, longitude: 0.0 }),
            down("T1", at(&origin, 10.0, 0.0)),
        ];
        let cells = vec![
            PopulationCell::point("ok", origin, 5.0),
            PopulationCell::point("negative", origin, -1.0),
            PopulationCell::point("nan", origin, f64::NAN),
        ];
        let report = compute_coverage(&assets, &cells, &[], &unweighted_config()).unwrap();
        assert_eq!(report.results.len(), 1);
        assert_eq!(report.cells_processed, 1);
        assert_eq!(report.skipped_count(), 4);
        assert_eq!(
            report.skipped.iter().filter(|s| s.kind == RecordKind::Population).count(),
            2
        );
    }

    #[test]
    fn test_empty_inputs_are_fatal() {
        let origin = t1();
        let cells = vec![PopulationCell::point("c", origin, 1.0)];
        let err = compute_coverage(&[up("L", origin)], &cells, &[], &unweighted_config())
            .unwrap_err();
        assert!(matches!(err, CoverageError::EmptyInput(_)));

        let err = compute_coverage(&[down("T", origin)], &[], &[], &unweighted_config())
            .unwrap_err();
        assert!(matches!(err, CoverageError::EmptyInput(_)));
    }

    #[test]
    fn test_invalid_config_is_fatal() {
        let config = CoverageConfig {
            radius_m: -5.0,
            ..CoverageConfig::default()
        };
        let cells = vec![PopulationCell::point("c", t1(), 1.0)];
        let err = compute_coverage(&[down("T", t1())], &cells, &[], &config).unwrap_err();
        assert!(matches!(err, CoverageError::InvalidConfig(_)));
    }

    #[test]
    fn test_runs_are_identical() {
        let origin = t1();
        let assets: Vec<Asset> = (0..5)
            .map(|i| down(&format!("T{}", i), at(&origin, i as f64 * 2500.0, (i % 2) as f64 * 2000.0)))
            .collect();
        let cells: Vec<PopulationCell> = (0..30)
            .map(|i| square(&format!("s{}", i), &origin, (i % 6) as f64 * 2000.0, (i / 6) as f64 * 1000.0 - 2000.0, 600.0, 10.0 * i as f64))
            .collect();
        let first = compute_coverage(&assets, &cells, &[], &CoverageConfig::default()).unwrap();
        let second = compute_coverage(&assets, &cells, &[], &CoverageConfig::default()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_towers_measure_in_their_own_zone() {
        // Zones 58 and 60. Their mean falls in zone 59, which stretches E's distances by half a percent.
        let west = GeoPoint::new(-45.4, 166.5).unwrap();
        let east = GeoPoint::new(-37.7, 178.5).unwrap();
        let assets = vec![down("W", west), down("E", east)];
        let east_edge = at(&east, 4980.0, 0.0);
        let cells = vec![
            PopulationCell::point("east_edge", east_edge, 2000.0),
            PopulationCell::point("east_beyond", at(&east, 5020.0, 0.0), 7.0),
            PopulationCell::point("west_edge", at(&west, -4990.0, 0.0), 300.0),
        ];
        let geodesic = Point::new(east.longitude, east.latitude)
            .geodesic_distance(&Point::new(east_edge.longitude, east_edge.latitude));
        assert!(geodesic < 5000.0, "{}", geodesic);

        let report = compute_coverage(&assets, &cells, &[], &unweighted_config()).unwrap();
        assert_eq!(report.result("E").unwrap().unweighted_population, 2000.0);
        assert_eq!(report.result("W").unwrap().unweighted_population, 300.0);
        assert_eq!(
            report.frames,
            vec![(58, Hemisphere::South), (60, Hemisphere::South)]
        );
    }

    #[test]
    fn test_fringe_cell_is_weighted_by_overlap() {
        let origin = t1();
        let assets = vec![down("T1", origin)];
        // Spans 4700..5700 m east: centroid outside, about 29% of the area inside.
        let cells = vec![square("fringe", &origin, 5200.0, 0.0, 1000.0, 1000.0)];

        let report = compute_coverage(&assets, &cells, &[], &CoverageConfig::default()).unwrap();
        let t1 = report.result("T1").unwrap();
        assert_eq!(t1.unweighted_population, 1000.0);
        assert!(
            t1.weighted_population > 280.0 && t1.weighted_population < 300.0,
            "{}",
            t1.weighted_population
        );
        assert_eq!(report.assignments.len(), 1);

        // Unweighted mode only counts representative points.
        let report = compute_coverage(&assets, &cells, &[], &unweighted_config()).unwrap();
        assert_eq!(report.result("T1").unwrap().unweighted_population, 0.0);
        assert!(report.assignments.is_empty());
    }

    #[test]
    fn test_fringe_cell_goes_to_first_tower_in_order() {
        let origin = t1();
        let assets = vec![down("A", origin), down("B", at(&origin, 10_400.0, 0.0))];
        // Halfway between the towers; each disc holds about 29% of it.
        let cells = vec![square("between", &origin, 5200.0, 0.0, 1000.0, 1000.0)];

        let report = compute_coverage(&assets, &cells, &[], &CoverageConfig::default()).unwrap();
        assert_eq!(report.result("A").unwrap().unweighted_population, 1000.0);
        assert_eq!(report.result("B").unwrap().unweighted_population, 0.0);

        let config = CoverageConfig {
            priority: Some(vec!["B".to_string()]),
            ..CoverageConfig::default()
        };
        let report = compute_coverage(&assets, &cells, &[], &config).unwrap();
        let b = report.result("B").unwrap();
        assert_eq!(b.unweighted_population, 1000.0);
        assert!(b.weighted_population > 280.0 && b.weighted_population < 300.0);
        assert_eq!(report.result("A").unwrap().unweighted_population, 0.0);
    }

    #[test]
    fn test_fringe_cell_below_threshold_is_left_out() {
        let origin = t1();
        let assets = vec![down("T1", origin)];
        let cells = vec![square("fringe", &origin, 5200.0, 0.0, 1000.0, 1000.0)];
        let config = CoverageConfig {
            min_overlap_fraction: 0.5,
            ..CoverageConfig::default()
        };
        let report = compute_coverage(&assets, &cells, &[], &config).unwrap();
        assert_eq!(report.result("T1").unwrap().unweighted_population, 0.0);
        assert!(report.assignments.is_empty());
    }

    #[test]
    fn test_share_at_threshold_is_dropped() {
        assert_eq!(counted_fraction(0.005, 0.005), 0.0);
        assert_eq!(counted_fraction(0.004, 0.005), 0.0);
        assert_eq!(counted_fraction(0.0051, 0.005), 0.0051);
        assert_eq!(counted_fraction(1.0, 0.0), 1.0);
        assert_eq!(counted_fraction(0.0, 0.0), 0.0);
    }

    #[test]
    fn test_resolve_fringe_skips_claimed_cells() {
        let survey = |fringe: Vec<(usize, f64)>| Survey {
            cells: Vec::new(),
            facilities: Vec::new(),
            fringe,
            prior: Vec::new(),
        };
        let surveys = vec![
            survey(vec![(1, 0.2), (2, 0.4)]),
            survey(vec![(2, 0.3), (3, 0.6)]),
        ];
        let claims = vec![vec![0], vec![1]];
        let fringe = resolve_fringe(&surveys, &claims, 4);
        assert_eq!(fringe, vec![vec![(2, 0.4)], vec![(3, 0.6)]]);
    }

    #[test]
    fn test_resolve_claims_first_wins() {
        let lists = vec![vec![0, 2], vec![1, 2, 3], vec![3, 4]];
        let claims = resolve_claims(lists.iter(), 5);
        assert_eq!(claims, vec![vec![0, 2], vec![1, 3], vec![4]]);
    }
}
