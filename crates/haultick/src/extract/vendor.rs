//! Vendor identification from page text and (optionally) page images.
//!
//! Pure over its inputs plus the static template catalog: no side
//! effects, no retained state between pages.

use std::path::Path;

use image::GrayImage;
use log::warn;

use crate::error::TemplateError;
use crate::template::{CatalogFile, LogoRef, Roi};

use super::logo;

/// Candidates below this confidence are reported as "no vendor"; the
/// caller routes the page to review as AMBIGUOUS_VENDOR.
pub const MIN_VENDOR_CONFIDENCE: f32 = 0.80;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionKind {
    Logo,
    Keyword,
}

#[derive(Debug, Clone)]
pub struct VendorMatch {
    pub vendor_name: String,
    pub confidence: f32,
    pub kind: DetectionKind,
    /// Number of exact literal term hits, used for tie-breaking.
    pub term_hits: usize,
}

struct CompiledVendor {
    name: String,
    terms: Vec<String>,
    excludes: Vec<String>,
    logo: Option<(GrayImage, Roi, f32)>,
}

pub struct VendorDetector {
    vendors: Vec<CompiledVendor>,
}

impl VendorDetector {
    /// Compiles the catalog's vendor set. Logo template images are
    /// resolved relative to `logo_dir` and loaded up front; a missing
    /// template file is a configuration error.
    pub fn new(catalog: &CatalogFile, logo_dir: Option<&Path>) -> Result<Self, TemplateError> {
        let mut vendors = Vec::with_capacity(catalog.vendors.len());

        for vendor in &catalog.vendors {
            let mut terms: Vec<String> =
                vendor.match_terms.iter().map(|t| t.to_lowercase()).collect();
            terms.extend(vendor.aliases.iter().map(|a| a.to_lowercase()));

            let logo = match (&vendor.logo, logo_dir) {
                (Some(logo_ref), Some(dir)) => Some(load_logo(&vendor.vendor_name, logo_ref, dir)?),
                (Some(_), None) => {
                    warn!(
                        "Vendor {} declares a logo but no logo directory is configured",
                        vendor.vendor_name
                    );
                    None
                }
                (None, _) => None,
            };

            vendors.push(CompiledVendor {
                name: vendor.vendor_name.clone(),
                terms,
                excludes: vendor.exclude_terms.iter().map(|t| t.to_lowercase()).collect(),
                logo,
            });
        }

        Ok(Self { vendors })
    }

    /// Identifies the issuing vendor for a page. Returns `None` when no
    /// candidate clears [`MIN_VENDOR_CONFIDENCE`].
    pub fn detect(&self, page_text: &str, page_image: Option<&GrayImage>) -> Option<VendorMatch> {
        let text = page_text.to_lowercase();
        let mut candidates: Vec<VendorMatch> = Vec::new();

        for vendor in &self.vendors {
            if vendor.excludes.iter().any(|t| text.contains(t.as_str())) {
                continue;
            }

            if let (Some((template, region, threshold)), Some(img)) = (&vendor.logo, page_image) {
                let score = logo::match_in_region(img, template, region);
                if score >= *threshold {
                    candidates.push(VendorMatch {
                        vendor_name: vendor.name.clone(),
                        confidence: score,
                        kind: DetectionKind::Logo,
                        term_hits: vendor
                            .terms
                            .iter()
                            .filter(|t| text.contains(t.as_str()))
                            .count(),
                    });
                    continue;
                }
            }

            let hits = vendor
                .terms
                .iter()
                .filter(|t| text.contains(t.as_str()))
                .count();
            if hits > 0 {
                let confidence = (0.80 + 0.05 * hits as f32).min(0.95);
                candidates.push(VendorMatch {
                    vendor_name: vendor.name.clone(),
                    confidence,
                    kind: DetectionKind::Keyword,
                    term_hits: hits,
                });
            }
        }

        // Logo beats keyword, then more exact literal hits, then score.
        candidates.sort_by(|a, b| {
            let rank = |m: &VendorMatch| match m.kind {
                DetectionKind::Logo => 1,
                DetectionKind::Keyword => 0,
            };
            rank(b)
                .cmp(&rank(a))
                .then(b.term_hits.cmp(&a.term_hits))
                .then(b.confidence.total_cmp(&a.confidence))
        });

        candidates
            .into_iter()
            .next()
            .filter(|m| m.confidence >= MIN_VENDOR_CONFIDENCE)
    }
}

fn load_logo(
    vendor: &str,
    logo_ref: &LogoRef,
    dir: &Path,
) -> Result<(GrayImage, Roi, f32), TemplateError> {
    let path = dir.join(&logo_ref.path);
    let img = image::open(&path).map_err(|e| TemplateError::InvalidVendor {
        vendor: vendor.to_string(),
        reason: format!("Failed to load logo template '{}': {}", path.display(), e),
    })?;
    Ok((img.to_luma8(), logo_ref.region, logo_ref.threshold))
}
