//! Ranks failed cell towers by the population and emergency facilities left
//! without coverage, for disaster-response triage.
//!
//! Towers, population cells and facilities are read from CSV (or GeoJSON for
//! population). Each tower measures distances in the UTM frame of its own
//! position, and each population unit is attributed to at most one failed
//! tower in priority order.

pub mod cli;
pub mod config;
pub mod convert;
pub mod coverage;
pub mod error;
pub mod geojson;
pub mod input;
pub mod logger;
pub mod model;
pub mod output;
pub mod projection;
pub mod ranking;
pub mod spatial;
pub mod wkt;
