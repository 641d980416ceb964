use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HaultickError {
    #[error("Template error: {0}")]
    Template(#[from] TemplateError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] crate::pipeline::PipelineError),

    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),

    #[error("OCR error: {0}")]
    Ocr(#[from] crate::ocr::OcrError),
}

#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("Failed to read catalog file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse catalog JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Catalog validation failed: {message}")]
    Validation { message: String },

    #[error("Invalid regex in vendor '{vendor}' field '{field}': {reason}")]
    InvalidRegex {
        vendor: String,
        field: String,
        reason: String,
    },

    #[error("Invalid template for vendor '{vendor}': {reason}")]
    InvalidVendor { vendor: String, reason: String },
}

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Failed to spawn worker: {0}")]
    SpawnFailed(String),

    #[error("Worker channel closed unexpectedly")]
    ChannelClosed,

    #[error("Failed to hash file '{path}': {source}")]
    HashFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("File failed after {attempts} attempts: {reason}")]
    RetriesExhausted { attempts: u32, reason: String },
}

pub type Result<T> = std::result::Result<T, HaultickError>;
