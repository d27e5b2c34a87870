//! CLI argument parsing and validation.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use crate::config::{
    CoordinateSystem, CoverageConfig, CoverageMode, DisasterType, FileConfig,
    DEFAULT_MIN_OVERLAP_FRACTION, DEFAULT_RADIUS_M,
};
use crate::error::{CoverageError, Result};
use crate::input::PopulationFormat;
use crate::logger::VerbosityLevel;
use crate::output::skipped_path;
use crate::spatial::DEFAULT_SEGMENTS;

/// Default ranking file name.
pub const DEFAULT_OUTPUT: &str = "tower_priority_ranking.csv";

/// Population input format
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum Format {
    Csv,
    Geojson,
}

impl Format {
    /// `.geojson` and `.json` files are GeoJSON, anything else CSV.
    pub fn from_extension(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("geojson") | Some("json") => Format::Geojson,
            _ => Format::Csv,
        }
    }
}

/// Command line arguments for tower-coverage.
#[derive(Parser, Debug)]
#[command(name = "tower-coverage")]
#[command(version, about = "Ranks failed cell towers by the population and facilities they leave uncovered", long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Verbose output with timings and per-tower detail.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only print errors and the paths of written files.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable coloured output.
    #[arg(long, global = true)]
    pub no_color: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Rank failed towers by coverage impact.
    Rank(RankArgs),
    /// Reproject the WKT column of a CSV to WGS84.
    ConvertWkt(ConvertArgs),
}

#[derive(clap::Args, Debug, Clone)]
pub struct RankArgs {
    /// Tower CSV: id, lat, lng and an optional UP/DOWN status.
    #[arg(long)]
    pub towers: PathBuf,

    /// Population cells, CSV (points or WKT) or GeoJSON.
    #[arg(long)]
    pub population: PathBuf,

    /// Facilities CSV: id, type and location.
    #[arg(long)]
    pub facilities: Option<PathBuf>,

    /// CSV listing failed tower ids; overrides the status column.
    #[arg(long)]
    pub failed: Option<PathBuf>,

    /// Ranking CSV to write.
    #[arg(short, long, default_value = DEFAULT_OUTPUT)]
    pub output: PathBuf,

    /// Also write the ranking as a GeoJSON point layer.
    #[arg(long)]
    pub geojson: Option<PathBuf>,

    /// Coverage radius in metres.
    #[arg(short, long)]
    pub radius: Option<f64>,

    /// Disaster profile, e.g. "Tsunami" or "Volcanic Eruption".
    #[arg(short, long)]
    pub disaster_type: Option<String>,

    /// Claim order as comma-separated tower ids.
    #[arg(long, value_delimiter = ',')]
    pub priority: Option<Vec<String>>,

    /// Population attribution mode.
    #[arg(short, long, value_enum)]
    pub mode: Option<CoverageMode>,

    /// Discard population already covered by live towers.
    #[arg(long)]
    pub subtract_live: bool,

    /// Coordinate system of population and facility input.
    #[arg(long, value_enum)]
    pub coordinates: Option<CoordinateSystem>,

    /// Population column name, overriding the built-in aliases.
    #[arg(long)]
    pub population_column: Option<String>,

    /// Population file format (default: from the file extension).
    #[arg(short = 'f', long, value_enum)]
    pub population_format: Option<Format>,

    /// Vertices of the polygon approximating each coverage disc.
    #[arg(long)]
    pub disc_segments: Option<usize>,

    /// Weighted overlaps below this fraction of a cell count as zero.
    #[arg(long)]
    pub min_overlap: Option<f64>,

    /// TOML settings file (default: ./tower-coverage.toml if present).
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

#[derive(clap::Args, Debug, Clone)]
pub struct ConvertArgs {
    /// CSV with a WKT/geometry column.
    pub input: PathBuf,

    /// CSV to write.
    #[arg(short, long)]
    pub output: PathBuf,

    /// Coordinate system of the input geometry.
    #[arg(long, value_enum, default_value = "nztm2000")]
    pub from: CoordinateSystem,
}

/// Fully validated configuration object.
#[derive(Debug)]
pub struct Config {
    pub verbosity: VerbosityLevel,
    pub no_color: bool,
    pub task: Task,
}

#[derive(Debug)]
pub enum Task {
    Rank(RankConfig),
    ConvertWkt(ConvertConfig),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RankConfig {
    pub towers: PathBuf,
    pub population: PathBuf,
    pub population_input: Format,
    pub population_format: PopulationFormat,
    pub facilities: Option<PathBuf>,
    /// Coordinate system of the facilities file.
    pub facility_coordinates: CoordinateSystem,
    pub failed: Option<PathBuf>,
    pub output: PathBuf,
    /// Written only when records were skipped.
    pub skipped_output: PathBuf,
    pub geojson: Option<PathBuf>,
    pub coverage: CoverageConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConvertConfig {
    pub input: PathBuf,
    pub output: PathBuf,
    pub from: CoordinateSystem,
}

impl Args {
    /// Verbosity from the global flags.
    pub fn verbosity(&self) -> Result<VerbosityLevel> {
        match (self.quiet, self.verbose) {
            (true, true) => Err(CoverageError::MutuallyExclusiveOptions(
                "quiet".to_string(),
                "verbose".to_string(),
            )),
            (true, false) => Ok(VerbosityLevel::Quiet),
            (false, true) => Ok(VerbosityLevel::Verbose),
            (false, false) => Ok(VerbosityLevel::Normal),
        }
    }

    /// Validates arguments and converts them to a structured `Config`.
    ///
    /// For `rank`, reads the settings file and lets flags override it.
    pub fn validate(self) -> Result<Config> {
        let verbosity = self.verbosity()?;
        let task = match self.command {
            Command::Rank(args) => {
                let file = args.file_config()?;
                Task::Rank(args.into_config(file)?)
            }
            Command::ConvertWkt(args) => Task::ConvertWkt(args.validate()?),
        };
        Ok(Config {
            verbosity,
            no_color: self.no_color,
            task,
        })
    }
}

impl RankArgs {
    /// The `--config` file, else a discovered one, else empty settings.
    pub fn file_config(&self) -> Result<FileConfig> {
        match &self.config {
            Some(path) => FileConfig::from_path(path),
            None => match FileConfig::discover() {
                Some(path) => FileConfig::from_path(&path),
                None => Ok(FileConfig::default()),
            },
        }
    }

    /// Merges flags over `file` and validates the result.
    pub fn into_config(self, file: FileConfig) -> Result<RankConfig> {
        let disaster_type = self
            .disaster_type
            .as_deref()
            .or(file.disaster_type.as_deref())
            .map(DisasterType::from_label_or_default)
            .unwrap_or_default();

        let coverage = CoverageConfig {
            radius_m: self.radius.or(file.radius_m).unwrap_or(DEFAULT_RADIUS_M),
            disaster_type,
            weights: file.weights_for(disaster_type),
            priority: self.priority.or_else(|| file.priority.clone()),
            mode: self.mode.or(file.mode).unwrap_or_default(),
            disc_segments: self
                .disc_segments
                .or(file.disc_segments)
                .unwrap_or(DEFAULT_SEGMENTS),
            min_overlap_fraction: self
                .min_overlap
                .or(file.min_overlap_fraction)
                .unwrap_or(DEFAULT_MIN_OVERLAP_FRACTION),
            subtract_live_coverage: self.subtract_live
                || file.subtract_live_coverage.unwrap_or(false),
        };
        coverage.validate()?;

        let coordinates = self.coordinates.or(file.coordinates).unwrap_or_default();
        let population_input = self
            .population_format
            .unwrap_or_else(|| Format::from_extension(&self.population));

        if let Some(geojson) = &self.geojson {
            if *geojson == self.output {
                return Err(CoverageError::InvalidConfig(
                    "--geojson must differ from --output".to_string(),
                ));
            }
        }

        Ok(RankConfig {
            skipped_output: skipped_path(&self.output),
            towers: self.towers,
            population: self.population,
            population_input,
            population_format: PopulationFormat {
                coordinates,
                population_column: self.population_column.or(file.population_column),
            },
            facilities: self.facilities,
            facility_coordinates: coordinates,
            failed: self.failed,
            output: self.output,
            geojson: self.geojson,
            coverage,
        })
    }
}

impl ConvertArgs {
    pub fn validate(self) -> Result<ConvertConfig> {
        if self.input == self.output {
            return Err(CoverageError::InvalidConfig(
                "convert-wkt cannot overwrite its input".to_string(),
            ));
        }
        Ok(ConvertConfig {
            input: self.input,
            output: self.output,
            from: self.from,
        })
    }
}
