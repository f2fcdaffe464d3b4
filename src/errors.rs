use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error reading config file {path}: {source}")]
    IoError {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to parse JSON configuration in {path}: {source}")]
    JsonParseError {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Configuration file not found at {path}")]
    NotFound { path: PathBuf },
    #[error("Invalid configuration value for '{field}': {message}")]
    Invalid { field: String, message: String },
}

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("IO error reading data file {path}: {source}")]
    IoError {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Error reading CSV headers in {path}: {source}")]
    HeaderReadError {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("CSV error in {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("File {path} is missing required columns: {missing:?}")]
    MissingColumns { path: PathBuf, missing: Vec<String> },
    #[error("Schema mismatch for {path}: Missing columns: {missing:?}, Extra columns: {extra:?}")]
    SchemaMismatch {
        path: PathBuf,
        missing: Vec<String>,
        extra: Vec<String>,
    },
    #[error("No input files matched '{pattern}'")]
    NoInputFiles { pattern: String },
    #[error("Invalid glob pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Configuration parsing failed: {0}")]
    ConfigParse(#[from] ConfigError),
    #[error("Parsing failed: {0}")]
    Parse(#[from] ParseError),
    #[error(
        "Invalid date at row {row}: year={year}, month={month}, day={day:?}, hour={hour:?}"
    )]
    InvalidDate {
        row: usize,
        year: i32,
        month: u32,
        day: Option<u32>,
        hour: Option<u32>,
    },
    #[error("Column '{column}' has no observed values to impute from")]
    EmptyColumn { column: String },
    #[error("Row {row} has no timestamp; build timestamps before '{stage}'")]
    MissingTimestamp { row: usize, stage: String },
    #[error("Row {row} has no AQI target value")]
    MissingTarget { row: usize },
    #[error("Lag features are not supported for column '{column}'")]
    UnsupportedLagColumn { column: String },
    #[error("Label '{label}' in column '{column}' was not seen while fitting the encoder")]
    UnseenLabel { column: String, label: String },
    #[error("Feature '{column}' is missing at row {row}")]
    MissingValue { column: String, row: usize },
    #[error("Length mismatch in {context}: expected {expected}, found {found}")]
    LengthMismatch {
        context: String,
        expected: usize,
        found: usize,
    },
    #[error("Stage '{stage}' received an empty input")]
    EmptyInput { stage: String },
    #[error("No importance score provided for feature '{feature}'")]
    MissingImportance { feature: String },
    #[error("Importance score {score} for feature '{feature}' is not a finite non-negative value")]
    InvalidImportance { feature: String, score: f64 },
    #[error("Failed to write {path}: {message}")]
    Export { path: PathBuf, message: String },
}
