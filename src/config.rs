//! Run configuration: disaster profiles, scoring weights and the optional TOML file.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Deserialize;

use crate::error::{CoverageError, Result};
use crate::logger;
use crate::model::FacilityType;
use crate::projection::TransverseMercator;
use crate::spatial::{DEFAULT_SEGMENTS, MIN_SEGMENTS};
use crate::wkt::CoordinateSource;

pub const DEFAULT_RADIUS_M: f64 = 5000.0;

/// Weighted contributions below this share of a cell are treated as slivers.
pub const DEFAULT_MIN_OVERLAP_FRACTION: f64 = 0.005;

/// File names looked up in the working directory when `--config` is not given.
pub const CONFIG_FILE_NAMES: [&str; 2] = ["tower-coverage.toml", ".tower-coverage.toml"];

/// Scenario used to pick a scoring weight vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum DisasterType {
    #[default]
    Default,
    Tsunami,
    Wildfire,
    Earthquake,
    Flood,
    Storm,
    VolcanicEruption,
}

impl DisasterType {
    pub const ALL: [DisasterType; 7] = [
        DisasterType::Default,
        DisasterType::Tsunami,
        DisasterType::Wildfire,
        DisasterType::Earthquake,
        DisasterType::Flood,
        DisasterType::Storm,
        DisasterType::VolcanicEruption,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            DisasterType::Default => "default",
            DisasterType::Tsunami => "tsunami",
            DisasterType::Wildfire => "wildfire",
            DisasterType::Earthquake => "earthquake",
            DisasterType::Flood => "flood",
            DisasterType::Storm => "storm",
            DisasterType::VolcanicEruption => "volcanic_eruption",
        }
    }

    /// Matches labels like `Volcanic Eruption`, `volcanic-eruption` or `VOLCANIC_ERUPTION`.
    pub fn from_label(label: &str) -> Option<Self> {
        let normalised: String = label
            .trim()
            .chars()
            .map(|c| match c {
                ' ' | '-' => '_',
                c => c.to_ascii_lowercase(),
            })
            .collect();
        DisasterType::ALL
            .into_iter()
            .find(|d| d.label() == normalised)
    }

    /// Like [`DisasterType::from_label`], falling back to `Default` with a warning.
    pub fn from_label_or_default(label: &str) -> Self {
        DisasterType::from_label(label).unwrap_or_else(|| {
            logger::warn(&format!(
                "Unknown disaster type '{}', using default weights",
                label
            ));
            DisasterType::Default
        })
    }

    /// Built-in weight vector for this scenario.
    pub fn weights(&self) -> Weights {
        match self {
            DisasterType::Default => Weights::new(9.0, 5.0, 7.0, 0.00045),
            DisasterType::Tsunami => Weights::new(11.0, 5.0, 4.0, 0.0007),
            DisasterType::Wildfire => Weights::new(7.0, 5.0, 11.0, 0.00035),
            DisasterType::Earthquake => Weights::new(11.0, 6.0, 9.0, 0.00055),
            DisasterType::Flood => Weights::new(8.0, 7.0, 5.0, 0.0006),
            DisasterType::Storm => Weights::new(8.0, 5.0, 6.0, 0.0005),
            DisasterType::VolcanicEruption => Weights::new(10.0, 6.0, 7.0, 0.0006),
        }
    }
}

impl FromStr for DisasterType {
    type Err = CoverageError;

    fn from_str(s: &str) -> Result<Self> {
        DisasterType::from_label(s)
            .ok_or_else(|| CoverageError::InvalidConfig(format!("unknown disaster type '{}'", s)))
    }
}

impl fmt::Display for DisasterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Score multipliers: one per facility type plus a population scale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Weights {
    pub hospital: f64,
    pub police: f64,
    pub fire_station: f64,
    pub population_scale: f64,
}

impl Weights {
    pub const fn new(hospital: f64, police: f64, fire_station: f64, population_scale: f64) -> Self {
        Self {
            hospital,
            police,
            fire_station,
            population_scale,
        }
    }

    pub fn for_facility(&self, kind: FacilityType) -> f64 {
        match kind {
            FacilityType::Hospital => self.hospital,
            FacilityType::Police => self.police,
            FacilityType::FireStation => self.fire_station,
        }
    }

    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("hospital", self.hospital),
            ("police", self.police),
            ("fire_station", self.fire_station),
            ("population_scale", self.population_scale),
        ];
        for (name, value) in fields {
            if !value.is_finite() || value < 0.0 {
                return Err(CoverageError::InvalidConfig(format!(
                    "weight '{}' must be a non-negative number, got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }
}

impl Default for Weights {
    fn default() -> Self {
        DisasterType::Default.weights()
    }
}

/// Partial weight vector from the config file; unset fields keep the preset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
pub struct WeightOverride {
    pub hospital: Option<f64>,
    pub police: Option<f64>,
    pub fire_station: Option<f64>,
    pub population_scale: Option<f64>,
}

impl WeightOverride {
    pub fn apply(&self, base: Weights) -> Weights {
        Weights {
            hospital: self.hospital.unwrap_or(base.hospital),
            police: self.police.unwrap_or(base.police),
            fire_station: self.fire_station.unwrap_or(base.fire_station),
            population_scale: self.population_scale.unwrap_or(base.population_scale),
        }
    }
}

/// How population is attributed to a tower.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoverageMode {
    /// Whole cells, by centroid.
    Unweighted,
    /// Cells scaled by the share of their area inside the tower's exclusive disc.
    #[default]
    Weighted,
}

/// Coordinate system of population and facility input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinateSystem {
    #[default]
    Wgs84,
    Nztm2000,
}

impl CoordinateSystem {
    pub fn source(&self) -> CoordinateSource {
        match self {
            CoordinateSystem::Wgs84 => CoordinateSource::Geodetic,
            CoordinateSystem::Nztm2000 => {
                CoordinateSource::Projected(TransverseMercator::nztm2000())
            }
        }
    }
}

/// Parameters of one coverage run.
#[derive(Debug, Clone, PartialEq)]
pub struct CoverageConfig {
    pub radius_m: f64,
    pub disaster_type: DisasterType,
    pub weights: Weights,
    /// Explicit claim order; towers not listed follow in ascending id order.
    pub priority: Option<Vec<String>>,
    pub mode: CoverageMode,
    pub disc_segments: usize,
    pub min_overlap_fraction: f64,
    /// Let live towers claim first and discard what they cover.
    pub subtract_live_coverage: bool,
}

impl Default for CoverageConfig {
    fn default() -> Self {
        Self::for_disaster(DisasterType::Default)
    }
}

impl CoverageConfig {
    pub fn for_disaster(disaster_type: DisasterType) -> Self {
        Self {
            radius_m: DEFAULT_RADIUS_M,
            disaster_type,
            weights: disaster_type.weights(),
            priority: None,
            mode: CoverageMode::default(),
            disc_segments: DEFAULT_SEGMENTS,
            min_overlap_fraction: DEFAULT_MIN_OVERLAP_FRACTION,
            subtract_live_coverage: false,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.radius_m.is_finite() || self.radius_m <= 0.0 {
            return Err(CoverageError::InvalidConfig(format!(
                "radius must be a positive number of metres, got {}",
                self.radius_m
            )));
        }
        if self.disc_segments < MIN_SEGMENTS {
            return Err(CoverageError::InvalidConfig(format!(
                "disc_segments must be at least {}, got {}",
                MIN_SEGMENTS, self.disc_segments
            )));
        }
        if !(0.0..1.0).contains(&self.min_overlap_fraction) {
            return Err(CoverageError::InvalidConfig(format!(
                "min_overlap_fraction must be in [0, 1), got {}",
                self.min_overlap_fraction
            )));
        }
        self.weights.validate()
    }
}

/// Settings read from `tower-coverage.toml`. Every field is optional; command
/// line flags take precedence.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub radius_m: Option<f64>,
    #[serde(default)]
    pub disaster_type: Option<String>,
    #[serde(default)]
    pub mode: Option<CoverageMode>,
    #[serde(default)]
    pub priority: Option<Vec<String>>,
    #[serde(default)]
    pub disc_segments: Option<usize>,
    #[serde(default)]
    pub min_overlap_fraction: Option<f64>,
    #[serde(default)]
    pub subtract_live_coverage: Option<bool>,
    #[serde(default)]
    pub coordinates: Option<CoordinateSystem>,
    #[serde(default)]
    pub population_column: Option<String>,
    /// Per-scenario weight overrides keyed by disaster label.
    #[serde(default)]
    pub weights: BTreeMap<String, WeightOverride>,
}

impl FileConfig {
    pub fn from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(CoverageError::FileNotFound(path.display().to_string()));
        }
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// First config file present in the working directory.
    pub fn discover() -> Option<PathBuf> {
        CONFIG_FILE_NAMES
            .iter()
            .map(PathBuf::from)
            .find(|path| path.is_file())
    }

    /// Preset weights for `disaster_type` with any file override applied.
    pub fn weights_for(&self, disaster_type: DisasterType) -> Weights {
        let mut weights = disaster_type.weights();
        for (label, over) in &self.weights {
            match DisasterType::from_label(label) {
                Some(d) if d == disaster_type => weights = over.apply(weights),
                Some(_) => {}
                None => logger::warn(&format!(
                    "Ignoring weights for unknown disaster type '{}' in config file",
                    label
                )),
            }
        }
        weights
    }
}
