use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DataError {
    #[error("Failed to read dataset {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Missing column: {0}")]
    MissingColumn(String),

    #[error("Line {line}: cannot parse date {value:?}")]
    InvalidDate { line: usize, value: String },

    #[error("Line {line}: cannot parse value {value:?}")]
    InvalidValue { line: usize, value: String },

    #[error("Dataset contains no rows")]
    Empty,
}

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Model loading failed for {path}: {message}")]
    LoadError { path: PathBuf, message: String },

    #[error("Model expects {expected} features, got {actual}")]
    FeatureMismatch { expected: usize, actual: usize },

    #[error("Invalid model: {0}")]
    InvalidModel(String),
}

#[derive(Error, Debug)]
pub enum ForecastError {
    #[error("Unknown model: {0}")]
    UnknownModel(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid date: {year}-{month:02}")]
    InvalidDate { year: i32, month: u32 },

    #[error("Inference failed: {0}")]
    Inference(#[from] ModelError),
}
