use std::fs::{self, File};
use std::io::BufWriter;
use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;

use tower_coverage::cli::{Args, ConvertConfig, Format, RankConfig, Task};
use tower_coverage::convert::convert_wkt_csv;
use tower_coverage::coverage::compute_coverage;
use tower_coverage::geojson::{load_population as load_geojson_population, write_ranking_geojson};
use tower_coverage::input::{self, apply_failed_list};
use tower_coverage::logger::{self, Logger, VerbosityLevel};
use tower_coverage::model::{RecordKind, SkippedRecord};
use tower_coverage::output::{write_ranking_csv, write_skipped_csv};
use tower_coverage::ranking::Ranking;

fn main() {
    let args = Args::parse();

    let level = match args.verbosity() {
        Ok(level) => level,
        Err(e) => {
            Logger::init(VerbosityLevel::Normal, args.no_color);
            logger::error(&e.to_string());
            std::process::exit(1);
        }
    };
    Logger::init(level, args.no_color);

    let result = args
        .validate()
        .map_err(anyhow::Error::from)
        .and_then(|config| match config.task {
            Task::Rank(rank) => run_rank(&rank),
            Task::ConvertWkt(convert) => run_convert(&convert),
        });

    if let Err(e) = result {
        logger::error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

fn run_rank(config: &RankConfig) -> Result<()> {
    logger::debug(&format!("Configuration: {:?}", config.coverage));

    let mut skipped: Vec<SkippedRecord> = Vec::new();

    let towers = input::load_assets(input::open(&config.towers)?)
        .with_context(|| format!("reading towers from {}", config.towers.display()))?;
    let mut assets = towers.records;
    skipped.extend(towers.skipped);

    if let Some(path) = &config.failed {
        let failed = input::load_failed_ids(input::open(path)?)
            .with_context(|| format!("reading failed towers from {}", path.display()))?;
        skipped.extend(failed.skipped);
        for id in apply_failed_list(&mut assets, &failed.records) {
            skipped.push(SkippedRecord::new(
                RecordKind::FailedList,
                id,
                "no tower with this id",
            ));
        }
    }
    logger::info(&format!(
        "Loaded {} towers ({} failed)",
        assets.len(),
        assets.iter().filter(|a| a.is_down()).count()
    ));

    let population = match config.population_input {
        Format::Csv => input::load_population(
            input::open(&config.population)?,
            &config.population_format,
        ),
        Format::Geojson => load_geojson_population(&config.population, &config.population_format),
    }
    .with_context(|| format!("reading population from {}", config.population.display()))?;
    logger::info(&format!("Loaded {} population cells", population.records.len()));
    skipped.extend(population.skipped);

    let facilities = match &config.facilities {
        Some(path) => {
            let loaded = input::load_facilities(input::open(path)?, config.facility_coordinates)
                .with_context(|| format!("reading facilities from {}", path.display()))?;
            logger::info(&format!("Loaded {} facilities", loaded.records.len()));
            skipped.extend(loaded.skipped);
            loaded.records
        }
        None => Vec::new(),
    };

    let report = compute_coverage(&assets, &population.records, &facilities, &config.coverage)?;
    let ranking = Ranking::new(report, skipped);

    write_ranking_csv(create(&config.output)?, &ranking.rows)
        .with_context(|| format!("writing {}", config.output.display()))?;
    logger::output(&config.output.display().to_string());

    if !ranking.skipped.is_empty() {
        write_skipped_csv(create(&config.skipped_output)?, &ranking.skipped)
            .with_context(|| format!("writing {}", config.skipped_output.display()))?;
        logger::output(&config.skipped_output.display().to_string());
    }

    if let Some(path) = &config.geojson {
        write_ranking_geojson(create(path)?, &ranking.rows)
            .with_context(|| format!("writing {}", path.display()))?;
        logger::output(&path.display().to_string());
    }

    logger::summary(&ranking.summary());
    Ok(())
}

fn run_convert(config: &ConvertConfig) -> Result<()> {
    let source = config.from.source();
    let summary = convert_wkt_csv(input::open(&config.input)?, create(&config.output)?, &source)
        .with_context(|| format!("converting {}", config.input.display()))?;
    logger::output(&config.output.display().to_string());
    logger::summary(&format!(
        "Converted {} rows ({} skipped)",
        summary.converted,
        summary.skipped.len()
    ));
    Ok(())
}

/// Creates `path` and any missing parent directories.
fn create(path: &Path) -> Result<BufWriter<File>> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating directory {}", parent.display()))?;
    }
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    Ok(BufWriter::new(file))
}
