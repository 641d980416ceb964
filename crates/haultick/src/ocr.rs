//! OCR engine abstraction. The pipeline only needs word-level geometry
//! per page; where that comes from is behind [`OcrEngine`].
//!
//! [`JsonOcrEngine`] reads pre-computed `<file>.ocr.json` sidecar dumps,
//! which is how batch runs are replayed and how the end-to-end tests run
//! without a Tesseract install.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::model::OcrPage;

#[derive(Error, Debug)]
pub enum OcrError {
    #[error("Cannot read '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No OCR dump found for '{path}'")]
    MissingDump { path: PathBuf },

    #[error("Malformed OCR dump '{path}': {source}")]
    MalformedDump {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("OCR engine failed on '{path}': {reason}")]
    EngineFailed { path: PathBuf, reason: String },
}

impl OcrError {
    /// Transient errors are worth a retry with backoff; the rest fail the
    /// file immediately.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::ReadFile { source, .. } => matches!(
                source.kind(),
                std::io::ErrorKind::Interrupted | std::io::ErrorKind::WouldBlock
            ),
            Self::EngineFailed { .. } => true,
            Self::MissingDump { .. } | Self::MalformedDump { .. } => false,
        }
    }
}

/// Produces the recognized pages for one source file, in page order.
pub trait OcrEngine: Send + Sync {
    fn pages(&self, path: &Path) -> Result<Vec<OcrPage>, OcrError>;
}

#[derive(Deserialize)]
struct OcrDump {
    pages: Vec<OcrPage>,
}

/// Reads `<file>.ocr.json` sidecars produced by an upstream OCR pass.
#[derive(Debug, Clone, Default)]
pub struct JsonOcrEngine;

impl JsonOcrEngine {
    pub fn new() -> Self {
        Self
    }

    fn dump_path(path: &Path) -> PathBuf {
        let mut name = path.as_os_str().to_owned();
        name.push(".ocr.json");
        PathBuf::from(name)
    }
}

impl OcrEngine for JsonOcrEngine {
    fn pages(&self, path: &Path) -> Result<Vec<OcrPage>, OcrError> {
        let dump = Self::dump_path(path);
        if !dump.exists() {
            return Err(OcrError::MissingDump {
                path: path.to_path_buf(),
            });
        }
        let data = std::fs::read_to_string(&dump).map_err(|e| OcrError::ReadFile {
            path: dump.clone(),
            source: e,
        })?;
        let parsed: OcrDump =
            serde_json::from_str(&data).map_err(|e| OcrError::MalformedDump {
                path: dump,
                source: e,
            })?;
        Ok(parsed.pages)
    }
}
