//! Template-driven field extraction from one page's OCR output.
//!
//! Extraction never fails: a field that cannot be found is an ordinary
//! data value (`None` + confidence 0), not an error. Missing labels,
//! empty ROIs and failed validations all degrade to a miss, optionally
//! via the rule's fallback method first.

use std::collections::HashMap;

use regex::Regex;

use crate::error::TemplateError;
use crate::model::ocr::{BBox, OcrPage, OcrWord};
use crate::template::{CatalogFile, ExtractMethod, FallbackMethod, FieldRule, Roi};

/// Vertical band searched below a label/ROI by the `below_label` fallback,
/// in normalized page coordinates.
const BELOW_BAND: f32 = 0.08;

/// Confidence assigned per extraction path.
const CONF_GEOMETRIC: f32 = 0.90;
const CONF_TEXT_ONLY: f32 = 0.75;
const CONF_FALLBACK: f32 = 0.65;

/// The outcome of extracting one field: value plus confidence, where a
/// miss is `(None, 0.0)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub value: Option<String>,
    pub confidence: f32,
}

impl Extraction {
    pub fn miss() -> Self {
        Self {
            value: None,
            confidence: 0.0,
        }
    }

    fn hit(value: String, confidence: f32) -> Self {
        Self {
            value: Some(value),
            confidence,
        }
    }

    pub fn is_hit(&self) -> bool {
        self.value.is_some()
    }
}

struct CompiledRule {
    rule: FieldRule,
    primary: Regex,
    validation: Option<Regex>,
    fallback: Option<Regex>,
}

pub struct FieldExtractor {
    by_vendor: HashMap<String, HashMap<String, CompiledRule>>,
    default_fields: HashMap<String, CompiledRule>,
}

impl FieldExtractor {
    /// Pre-compiles every rule in the catalog. The loader has already
    /// validated the patterns, so failures here indicate a bug upstream.
    pub fn new(catalog: &CatalogFile) -> Result<Self, TemplateError> {
        let mut by_vendor = HashMap::new();
        for vendor in &catalog.vendors {
            let mut compiled = HashMap::new();
            for (field, rule) in &vendor.fields {
                compiled.insert(field.clone(), compile(&vendor.vendor_name, field, rule)?);
            }
            by_vendor.insert(vendor.vendor_name.clone(), compiled);
        }

        let mut default_fields = HashMap::new();
        for (field, rule) in &catalog.default_fields {
            default_fields.insert(field.clone(), compile("DEFAULT", field, rule)?);
        }

        Ok(Self {
            by_vendor,
            default_fields,
        })
    }

    /// Field names defined for the given vendor (or the DEFAULT set).
    pub fn field_names(&self, vendor: Option<&str>) -> Vec<&str> {
        self.rules_for(vendor).keys().map(|k| k.as_str()).collect()
    }

    /// Extracts one field. A vendor without a template (or `None`) uses
    /// the DEFAULT rules; a field with no rule at all is a plain miss.
    pub fn extract(&self, vendor: Option<&str>, field: &str, page: &OcrPage) -> Extraction {
        let Some(compiled) = self.rules_for(vendor).get(field) else {
            return Extraction::miss();
        };

        if let Some(value) = self.primary_match(compiled, page) {
            let confidence = match compiled.rule.method {
                ExtractMethod::TextRegex { .. } => CONF_TEXT_ONLY,
                _ => CONF_GEOMETRIC,
            };
            return Extraction::hit(value, confidence);
        }

        if compiled.rule.fallback_method == Some(FallbackMethod::BelowLabel) {
            if let Some(value) = self.fallback_match(compiled, page) {
                return Extraction::hit(value, CONF_FALLBACK);
            }
        }

        Extraction::miss()
    }

    fn rules_for(&self, vendor: Option<&str>) -> &HashMap<String, CompiledRule> {
        vendor
            .and_then(|name| self.by_vendor.get(name))
            .unwrap_or(&self.default_fields)
    }

    fn primary_match(&self, compiled: &CompiledRule, page: &OcrPage) -> Option<String> {
        let candidates = match &compiled.rule.method {
            ExtractMethod::RoiRegex { roi, .. } => {
                let text = join_words(&words_in_rect(page, roi));
                find_all(&compiled.primary, &text)
            }
            ExtractMethod::LabelRight {
                label,
                label_synonyms,
                ..
            } => {
                let labels = label_set(label, label_synonyms);
                let anchor = find_label(page, &labels)?;
                let text = join_words(&words_right_of(page, &anchor));
                find_all(&compiled.primary, &text)
            }
            ExtractMethod::TextRegex { .. } => find_all(&compiled.primary, &page.text),
        };

        pick_best(candidates, compiled.validation.as_ref())
    }

    fn fallback_match(&self, compiled: &CompiledRule, page: &OcrPage) -> Option<String> {
        let regex = compiled.fallback.as_ref().unwrap_or(&compiled.primary);

        let band = match &compiled.rule.method {
            ExtractMethod::RoiRegex { roi, .. } => Roi {
                x: roi.x,
                y: (roi.y + roi.h).min(1.0),
                w: roi.w,
                h: BELOW_BAND,
            },
            ExtractMethod::LabelRight {
                label,
                label_synonyms,
                ..
            } => {
                let labels = label_set(label, label_synonyms);
                let anchor = find_label(page, &labels)?;
                Roi {
                    x: (anchor.x - 0.05).max(0.0),
                    y: anchor.bottom(),
                    w: (anchor.w + 0.25).min(1.0),
                    h: BELOW_BAND,
                }
            }
            // below_label has no meaning without geometry; the loader
            // rejects this combination.
            ExtractMethod::TextRegex { .. } => return None,
        };

        let text = join_words(&words_in_rect(page, &band));
        pick_best(find_all(regex, &text), compiled.validation.as_ref())
    }
}

fn compile(vendor: &str, field: &str, rule: &FieldRule) -> Result<CompiledRule, TemplateError> {
    let flags = if rule.regex_flags.as_deref() == Some("i") {
        "(?i)"
    } else {
        ""
    };
    let build = |pattern: &str| {
        Regex::new(&format!("{flags}{pattern}")).map_err(|e| TemplateError::InvalidRegex {
            vendor: vendor.to_string(),
            field: field.to_string(),
            reason: e.to_string(),
        })
    };

    Ok(CompiledRule {
        primary: build(rule.method.regex())?,
        validation: rule
            .validation_regex
            .as_deref()
            .map(build)
            .transpose()?,
        fallback: rule.fallback_regex.as_deref().map(build).transpose()?,
        rule: rule.clone(),
    })
}

fn label_set(label: &str, synonyms: &[String]) -> Vec<String> {
    let mut labels = vec![label.to_lowercase()];
    labels.extend(synonyms.iter().map(|s| s.to_lowercase()));
    labels
}

/// All regex matches with their start offsets (reading order within the
/// searched text).
fn find_all(regex: &Regex, text: &str) -> Vec<(String, usize)> {
    regex
        .find_iter(text)
        .map(|m| (m.as_str().to_string(), m.start()))
        .collect()
}

/// Selection when multiple matches occur: prefer the longest digit run,
/// then the first occurrence in reading order. Candidates failing the
/// validation pattern are treated as no-match.
fn pick_best(candidates: Vec<(String, usize)>, validation: Option<&Regex>) -> Option<String> {
    candidates
        .into_iter()
        .filter(|(value, _)| validation.map_or(true, |v| v.is_match(value)))
        .max_by(|(a, ai), (b, bi)| {
            digit_run_len(a)
                .cmp(&digit_run_len(b))
                .then(bi.cmp(ai)) // lower offset wins, so invert
        })
        .map(|(value, _)| value)
}

fn digit_run_len(s: &str) -> usize {
    let mut best = 0;
    let mut run = 0;
    for c in s.chars() {
        if c.is_ascii_digit() {
            run += 1;
            best = best.max(run);
        } else {
            run = 0;
        }
    }
    best
}

/// Words whose center falls inside the rectangle, in reading order
/// (top-to-bottom in row bands, then left-to-right).
fn words_in_rect<'a>(page: &'a OcrPage, roi: &Roi) -> Vec<&'a OcrWord> {
    let mut words: Vec<&OcrWord> = page
        .words()
        .filter(|w| {
            let (cx, cy) = w.bbox.center();
            cx >= roi.x && cx <= roi.x + roi.w && cy >= roi.y && cy <= roi.y + roi.h
        })
        .collect();
    sort_reading_order(&mut words);
    words
}

/// Words on the same line band as the anchor, strictly to its right.
fn words_right_of<'a>(page: &'a OcrPage, anchor: &BBox) -> Vec<&'a OcrWord> {
    let (_, ay) = anchor.center();
    let mut words: Vec<&OcrWord> = page
        .words()
        .filter(|w| {
            let (cx, cy) = w.bbox.center();
            cx >= anchor.right() && (cy - ay).abs() <= anchor.h.max(0.01)
        })
        .collect();
    sort_reading_order(&mut words);
    words
}

fn sort_reading_order(words: &mut [&OcrWord]) {
    words.sort_by(|a, b| {
        let (ax, ay) = a.bbox.center();
        let (bx, by) = b.bbox.center();
        // Bucket y into 1%-of-page rows so slight skew keeps line order.
        let (ar, br) = ((ay * 100.0) as i32, (by * 100.0) as i32);
        ar.cmp(&br).then(ax.total_cmp(&bx))
    });
}

/// Finds a label token (possibly multi-word) anywhere on the page,
/// matching case-insensitively with trailing ':'/'#' stripped. Returns
/// the merged bounding box of the matched word sequence.
fn find_label(page: &OcrPage, labels: &[String]) -> Option<BBox> {
    for line in &page.lines {
        for label in labels {
            let parts: Vec<&str> = label.split_whitespace().collect();
            if parts.is_empty() || line.words.len() < parts.len() {
                continue;
            }
            for start in 0..=(line.words.len() - parts.len()) {
                let window = &line.words[start..start + parts.len()];
                let matches = window.iter().zip(&parts).all(|(word, part)| {
                    word.value
                        .trim_end_matches([':', '#'])
                        .eq_ignore_ascii_case(part)
                });
                if matches {
                    return Some(merge_boxes(window));
                }
            }
        }
    }
    None
}

fn merge_boxes(words: &[OcrWord]) -> BBox {
    let x0 = words.iter().map(|w| w.bbox.x).fold(f32::MAX, f32::min);
    let y0 = words.iter().map(|w| w.bbox.y).fold(f32::MAX, f32::min);
    let x1 = words.iter().map(|w| w.bbox.right()).fold(f32::MIN, f32::max);
    let y1 = words.iter().map(|w| w.bbox.bottom()).fold(f32::MIN, f32::max);
    BBox {
        x: x0,
        y: y0,
        w: x1 - x0,
        h: y1 - y0,
    }
}

fn join_words(words: &[&OcrWord]) -> String {
    words
        .iter()
        .map(|w| w.value.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}
