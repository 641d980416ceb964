//! Synonym normalization: raw extracted text to canonical vocabulary.
//!
//! Pure and total — lookups never fail, unmapped input is returned
//! unchanged. Whether an unmapped value warrants a review flag is the
//! ticket processor's policy, not this module's.

use std::collections::HashMap;

use crate::model::RefCategory;

pub struct SynonymTable {
    /// category -> lowercased raw term -> canonical term.
    by_category: HashMap<RefCategory, HashMap<String, String>>,
    /// category -> lowercased canonical terms, for idempotence checks.
    canonical: HashMap<RefCategory, Vec<String>>,
}

impl SynonymTable {
    /// Builds the table from the catalog's synonym section. Unknown
    /// categories are rejected by the catalog loader before this point.
    pub fn from_catalog(
        synonyms: &std::collections::BTreeMap<String, std::collections::BTreeMap<String, String>>,
    ) -> Self {
        let mut by_category: HashMap<RefCategory, HashMap<String, String>> = HashMap::new();
        let mut canonical: HashMap<RefCategory, Vec<String>> = HashMap::new();

        for (cat_name, table) in synonyms {
            let Some(category) = RefCategory::from_str(cat_name) else {
                continue;
            };
            let entry = by_category.entry(category).or_default();
            let canon = canonical.entry(category).or_default();
            for (raw, target) in table {
                entry.insert(raw.to_lowercase(), target.clone());
                canon.push(target.to_lowercase());
            }
        }

        Self {
            by_category,
            canonical,
        }
    }

    pub fn empty() -> Self {
        Self {
            by_category: HashMap::new(),
            canonical: HashMap::new(),
        }
    }

    /// Maps raw text to its canonical form, or returns the input
    /// unchanged when no mapping exists.
    ///
    /// Lookup order: already-canonical values pass through first (keeps
    /// normalization idempotent even when a canonical name contains a
    /// raw term as a substring), then case-insensitive exact match, then
    /// substring match.
    pub fn normalize(&self, category: RefCategory, raw: &str) -> String {
        let trimmed = raw.trim();
        let lowered = trimmed.to_lowercase();

        if let Some(canon) = self.canonical.get(&category) {
            if canon.iter().any(|c| c == &lowered) {
                return trimmed.to_string();
            }
        }

        let Some(table) = self.by_category.get(&category) else {
            return trimmed.to_string();
        };

        if let Some(target) = table.get(&lowered) {
            return target.clone();
        }

        for (raw_term, target) in table {
            if lowered.contains(raw_term.as_str()) {
                return target.clone();
            }
        }

        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn table() -> SynonymTable {
        let mut material = BTreeMap::new();
        material.insert("class 2".to_string(), "CLASS_2_CONTAMINATED".to_string());
        material.insert("class ii".to_string(), "CLASS_2_CONTAMINATED".to_string());
        material.insert("clean dirt".to_string(), "CLEAN_FILL".to_string());

        let mut vendor = BTreeMap::new();
        vendor.insert("wm lewisville".to_string(), "WASTE_MANAGEMENT_LEWISVILLE".to_string());

        let mut synonyms = BTreeMap::new();
        synonyms.insert("material".to_string(), material);
        synonyms.insert("vendor".to_string(), vendor);

        SynonymTable::from_catalog(&synonyms)
    }

    #[test]
    fn test_exact_match_case_insensitive() {
        let t = table();
        assert_eq!(
            t.normalize(RefCategory::Material, "Class 2"),
            "CLASS_2_CONTAMINATED"
        );
        assert_eq!(
            t.normalize(RefCategory::Material, "CLASS II"),
            "CLASS_2_CONTAMINATED"
        );
    }

    #[test]
    fn test_substring_match() {
        let t = table();
        assert_eq!(
            t.normalize(RefCategory::Material, "Material: Class 2 Contaminated Soil"),
            "CLASS_2_CONTAMINATED"
        );
    }

    #[test]
    fn test_unmapped_returned_unchanged() {
        let t = table();
        assert_eq!(t.normalize(RefCategory::Material, "Limestone"), "Limestone");
        assert_eq!(t.normalize(RefCategory::Source, "Anything"), "Anything");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let t = table();
        for raw in [
            "Class 2",
            "clean dirt",
            "Limestone",
            "CLASS_2_CONTAMINATED",
            "wm lewisville",
            "",
            "  padded  ",
        ] {
            let once = t.normalize(RefCategory::Material, raw);
            let twice = t.normalize(RefCategory::Material, &once);
            assert_eq!(once, twice, "not idempotent for {:?}", raw);
        }
    }

    #[test]
    fn test_categories_are_isolated() {
        let t = table();
        // "class 2" only maps under material, not vendor.
        assert_eq!(t.normalize(RefCategory::Vendor, "class 2"), "class 2");
        assert_eq!(
            t.normalize(RefCategory::Vendor, "WM Lewisville"),
            "WASTE_MANAGEMENT_LEWISVILLE"
        );
    }
}
