//! Structured OCR output consumed at the engine boundary.
//!
//! The pipeline never talks to a recognizer directly; it receives pages
//! in this shape (full text plus per-line/word geometry in normalized
//! [0,1] page coordinates).

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box in normalized [0,1] page coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl BBox {
    pub fn center(&self) -> (f32, f32) {
        (self.x + self.w / 2.0, self.y + self.h / 2.0)
    }

    /// True if the given point lies within this box.
    pub fn contains(&self, px: f32, py: f32) -> bool {
        px >= self.x && px <= self.x + self.w && py >= self.y && py <= self.y + self.h
    }

    pub fn right(&self) -> f32 {
        self.x + self.w
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.h
    }
}

/// A single recognized word with its position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrWord {
    pub value: String,
    #[serde(rename = "bbox_normalized")]
    pub bbox: BBox,
}

/// A recognized line: joined text plus its words in reading order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrLine {
    pub text: String,
    pub words: Vec<OcrWord>,
    #[serde(rename = "bbox_normalized")]
    pub bbox: BBox,
}

/// One page of OCR output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrPage {
    pub text: String,
    #[serde(default)]
    pub lines: Vec<OcrLine>,
}

impl OcrPage {
    /// All words across all lines in reading order (top-to-bottom,
    /// left-to-right within a line band).
    pub fn words(&self) -> impl Iterator<Item = &OcrWord> {
        self.lines.iter().flat_map(|l| l.words.iter())
    }
}

/// Identity of a page within a source file.
#[derive(Debug, Clone)]
pub struct PageMeta {
    pub file_id: PathBuf,
    pub page_number: u32,
    /// SHA-256 of the whole source file, lowercase hex (64 chars).
    pub file_hash: String,
}
