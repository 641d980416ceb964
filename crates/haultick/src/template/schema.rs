//! Declarative vendor templates.
//!
//! Extraction rules are data, not code: each field names one of a closed
//! set of methods plus an optional validation pattern and fallback. The
//! loader rejects malformed templates before any page is processed.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Region of interest in normalized [0,1] page coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Roi {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

/// How a field is pulled from a page. Closed tagged variant per method.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum ExtractMethod {
    /// Search recognized text inside a fixed rectangle.
    RoiRegex { roi: Roi, regex: String },
    /// Find a label token and take the match immediately to its right.
    LabelRight {
        label: String,
        #[serde(default)]
        label_synonyms: Vec<String>,
        regex: String,
    },
    /// Search the whole page text, ignoring geometry.
    TextRegex { regex: String },
}

impl ExtractMethod {
    pub fn name(&self) -> &'static str {
        match self {
            Self::RoiRegex { .. } => "roi_regex",
            Self::LabelRight { .. } => "label_right",
            Self::TextRegex { .. } => "text_regex",
        }
    }

    pub fn regex(&self) -> &str {
        match self {
            Self::RoiRegex { regex, .. }
            | Self::LabelRight { regex, .. }
            | Self::TextRegex { regex } => regex,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackMethod {
    /// Search the text positioned just below the primary ROI or label.
    BelowLabel,
}

/// The extraction rule for one field of one vendor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldRule {
    #[serde(flatten)]
    pub method: ExtractMethod,
    /// "i" for case-insensitive matching.
    #[serde(default)]
    pub regex_flags: Option<String>,
    /// A primary match failing this pattern counts as no match.
    #[serde(default)]
    pub validation_regex: Option<String>,
    #[serde(default)]
    pub fallback_method: Option<FallbackMethod>,
    /// Pattern for the fallback search; defaults to the primary regex.
    #[serde(default)]
    pub fallback_regex: Option<String>,
}

/// Logo template reference for image-based vendor detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogoRef {
    /// Path to the template image, relative to the catalog file.
    pub path: String,
    /// Page region the logo is expected in.
    pub region: Roi,
    #[serde(default = "default_logo_threshold")]
    pub threshold: f32,
}

fn default_logo_threshold() -> f32 {
    0.85
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VendorTemplate {
    pub vendor_name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    /// Case-insensitive literals; any hit identifies the vendor.
    pub match_terms: Vec<String>,
    /// Case-insensitive literals; any hit disqualifies the vendor.
    #[serde(default)]
    pub exclude_terms: Vec<String>,
    #[serde(default)]
    pub logo: Option<LogoRef>,
    pub fields: BTreeMap<String, FieldRule>,
}

/// The whole catalog document: vendor templates, the DEFAULT field set
/// used when no vendor is identified, and the synonym table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogFile {
    pub version: String,
    #[serde(default)]
    pub vendors: Vec<VendorTemplate>,
    /// Fields applied when no vendor template matches the page.
    #[serde(default)]
    pub default_fields: BTreeMap<String, FieldRule>,
    /// category -> raw term -> canonical term.
    #[serde(default)]
    pub synonyms: BTreeMap<String, BTreeMap<String, String>>,
}
