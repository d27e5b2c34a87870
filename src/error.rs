use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoverageError {
    #[error("Invalid coordinate: latitude {latitude}, longitude {longitude}")]
    InvalidCoordinate { latitude: f64, longitude: f64 },

    #[error("Unsupported UTM zone: {0} (valid range is 1-60)")]
    UnsupportedZone(i32),

    #[error("Malformed geometry: {0}")]
    MalformedGeometry(String),

    #[error("Record '{record}' is missing numeric attribute '{field}'")]
    MissingAttribute { record: String, field: String },

    #[error("Record '{record}' has invalid {field} '{value}'")]
    InvalidAttribute {
        record: String,
        field: String,
        value: String,
    },

    #[error("Missing column: {0}")]
    MissingColumn(String),

    #[error("GeoJSON parse error: {0}")]
    GeojsonParse(String),

    #[error("No usable {0} in input")]
    EmptyInput(&'static str),

    #[error("Invalid projection parameters: {0}")]
    InvalidProjection(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Options --{0} and --{1} are mutually exclusive")]
    MutuallyExclusiveOptions(String, String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Config file error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CoverageError {
    /// Returns true for errors that only invalidate a single input record.
    ///
    /// Record-level errors are skipped and reported; anything else aborts the run.
    pub fn is_record_level(&self) -> bool {
        matches!(
            self,
            CoverageError::InvalidCoordinate { .. }
                | CoverageError::UnsupportedZone(_)
                | CoverageError::MalformedGeometry(_)
                | CoverageError::MissingAttribute { .. }
                | CoverageError::InvalidAttribute { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, CoverageError>;
