//! Catalog loading with fail-fast validation.
//!
//! A malformed template is a configuration error: it is rejected here,
//! at startup, never at extraction time.

use std::collections::HashSet;
use std::path::Path;

use crate::error::TemplateError;
use crate::model::RefCategory;

use super::schema::{CatalogFile, ExtractMethod, FieldRule, Roi, VendorTemplate};

pub fn load_catalog<P: AsRef<Path>>(path: P) -> Result<CatalogFile, TemplateError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| TemplateError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_catalog_from_str(&content)
}

pub fn load_catalog_from_str(content: &str) -> Result<CatalogFile, TemplateError> {
    let catalog: CatalogFile = serde_json::from_str(content)?;
    validate_catalog(&catalog)?;
    Ok(catalog)
}

fn validate_catalog(catalog: &CatalogFile) -> Result<(), TemplateError> {
    if catalog.version != "1.0" {
        return Err(TemplateError::Validation {
            message: format!("Unsupported catalog version: {}", catalog.version),
        });
    }

    let mut names = HashSet::new();
    for vendor in &catalog.vendors {
        if !names.insert(&vendor.vendor_name) {
            return Err(TemplateError::InvalidVendor {
                vendor: vendor.vendor_name.clone(),
                reason: "Duplicate vendor name".to_string(),
            });
        }
        validate_vendor(vendor)?;
    }

    for (field, rule) in &catalog.default_fields {
        validate_rule("DEFAULT", field, rule)?;
    }

    for category in catalog.synonyms.keys() {
        if RefCategory::from_str(category).is_none() {
            return Err(TemplateError::Validation {
                message: format!("Unknown synonym category: {}", category),
            });
        }
    }

    Ok(())
}

fn validate_vendor(vendor: &VendorTemplate) -> Result<(), TemplateError> {
    if vendor.match_terms.is_empty() && vendor.logo.is_none() {
        return Err(TemplateError::InvalidVendor {
            vendor: vendor.vendor_name.clone(),
            reason: "Vendor has neither match_terms nor a logo template".to_string(),
        });
    }

    if vendor.match_terms.iter().any(|t| t.trim().is_empty()) {
        return Err(TemplateError::InvalidVendor {
            vendor: vendor.vendor_name.clone(),
            reason: "Empty match term".to_string(),
        });
    }

    if let Some(logo) = &vendor.logo {
        if !(0.0..=1.0).contains(&logo.threshold) || logo.threshold == 0.0 {
            return Err(TemplateError::InvalidVendor {
                vendor: vendor.vendor_name.clone(),
                reason: format!("Logo threshold out of range: {}", logo.threshold),
            });
        }
        validate_roi(&vendor.vendor_name, "logo.region", &logo.region)?;
    }

    for (field, rule) in &vendor.fields {
        validate_rule(&vendor.vendor_name, field, rule)?;
    }

    Ok(())
}

fn validate_rule(vendor: &str, field: &str, rule: &FieldRule) -> Result<(), TemplateError> {
    check_regex(vendor, field, rule.method.regex())?;

    if let Some(v) = &rule.validation_regex {
        check_regex(vendor, field, v)?;
    }
    if let Some(f) = &rule.fallback_regex {
        check_regex(vendor, field, f)?;
    }

    if rule.fallback_regex.is_some() && rule.fallback_method.is_none() {
        return Err(TemplateError::InvalidVendor {
            vendor: vendor.to_string(),
            reason: format!("Field '{}' has fallback_regex without fallback_method", field),
        });
    }

    match &rule.method {
        ExtractMethod::RoiRegex { roi, .. } => validate_roi(vendor, field, roi)?,
        ExtractMethod::LabelRight { label, .. } => {
            if label.trim().is_empty() {
                return Err(TemplateError::InvalidVendor {
                    vendor: vendor.to_string(),
                    reason: format!("Field '{}' has an empty label", field),
                });
            }
        }
        ExtractMethod::TextRegex { .. } => {
            if rule.fallback_method.is_some() {
                return Err(TemplateError::InvalidVendor {
                    vendor: vendor.to_string(),
                    reason: format!(
                        "Field '{}' uses below_label fallback without geometry",
                        field
                    ),
                });
            }
        }
    }

    if let Some(flags) = &rule.regex_flags {
        if flags != "i" {
            return Err(TemplateError::InvalidVendor {
                vendor: vendor.to_string(),
                reason: format!("Field '{}' has unsupported regex_flags '{}'", field, flags),
            });
        }
    }

    Ok(())
}

fn check_regex(vendor: &str, field: &str, pattern: &str) -> Result<(), TemplateError> {
    regex::Regex::new(pattern).map_err(|e| TemplateError::InvalidRegex {
        vendor: vendor.to_string(),
        field: field.to_string(),
        reason: e.to_string(),
    })?;
    Ok(())
}

fn validate_roi(vendor: &str, field: &str, roi: &Roi) -> Result<(), TemplateError> {
    let in_unit = |v: f32| (0.0..=1.0).contains(&v);
    if !in_unit(roi.x)
        || !in_unit(roi.y)
        || roi.w <= 0.0
        || roi.h <= 0.0
        || roi.x + roi.w > 1.0 + f32::EPSILON
        || roi.y + roi.h > 1.0 + f32::EPSILON
    {
        return Err(TemplateError::InvalidVendor {
            vendor: vendor.to_string(),
            reason: format!(
                "Field '{}' ROI out of normalized bounds: ({}, {}, {}, {})",
                field, roi.x, roi.y, roi.w, roi.h
            ),
        });
    }
    Ok(())
}
