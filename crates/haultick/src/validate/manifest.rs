//! Manifest compliance. Regulated materials must carry a well-formed
//! manifest number; a missing or malformed one is a blocking problem.

use chrono::NaiveDate;
use regex::Regex;
use std::sync::OnceLock;

use crate::db::{self, Database, DatabaseError};
use crate::model::{Problem, ReviewReason};

/// Accepted manifest number shape: 6 to 20 alphanumerics.
pub const MANIFEST_PATTERN: &str = "^[A-Za-z0-9]{6,20}$";

fn manifest_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // Compile of a literal pattern cannot fail.
    RE.get_or_init(|| Regex::new(MANIFEST_PATTERN).expect("valid manifest pattern"))
}

/// Checks a ticket's manifest against the material's regulation flag.
///
/// Returns a CRITICAL problem when a regulated material has no manifest or
/// a malformed one. Unregulated materials pass regardless, and a present
/// manifest on an unregulated material is not an error.
pub fn check_manifest(requires_manifest: bool, manifest: Option<&str>) -> Option<Problem> {
    if !requires_manifest {
        return None;
    }
    match manifest {
        None => Some(Problem::new(
            ReviewReason::MissingManifest,
            "regulated material has no manifest number",
        )),
        Some(m) if !manifest_regex().is_match(m) => Some(Problem::new(
            ReviewReason::MissingManifest,
            format!("manifest number '{}' is malformed", m),
        )),
        Some(_) => None,
    }
}

/// Checks whether the manifest number was already used by the same vendor
/// on the same date. Non-blocking: a reuse is worth an operator's glance
/// but does not stop the commit.
pub fn check_manifest_reuse(
    db: &Database,
    vendor_id: i64,
    ticket_date: NaiveDate,
    manifest: Option<&str>,
) -> Result<Option<Problem>, DatabaseError> {
    let manifest = match manifest {
        Some(m) => m,
        None => return Ok(None),
    };
    if db::ticket_repo::manifest_reused(db, vendor_id, ticket_date, manifest)? {
        Ok(Some(Problem::new(
            ReviewReason::ReusedManifest,
            format!("manifest '{}' already used by this vendor on {}", manifest, ticket_date),
        )))
    } else {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Severity;

    #[test]
    fn test_unregulated_material_passes() {
        assert!(check_manifest(false, None).is_none());
        assert!(check_manifest(false, Some("whatever")).is_none());
    }

    #[test]
    fn test_regulated_without_manifest_is_critical() {
        let problem = check_manifest(true, None).unwrap();
        assert_eq!(problem.reason, ReviewReason::MissingManifest);
        assert_eq!(problem.severity(), Severity::Critical);
    }

    #[test]
    fn test_manifest_pattern() {
        // Boundary lengths and character classes.
        assert!(check_manifest(true, Some("ABC123")).is_none());
        assert!(check_manifest(true, Some("A1B2C3D4E5F6G7H8I9J0")).is_none());
        assert!(check_manifest(true, Some("AB12")).is_some()); // too short
        assert!(check_manifest(true, Some("A1B2C3D4E5F6G7H8I9J0X")).is_some()); // too long
        assert!(check_manifest(true, Some("ABC-123")).is_some()); // punctuation
        assert!(check_manifest(true, Some("")).is_some());
    }

    #[test]
    fn test_manifest_pattern_exhaustive_lengths() {
        for len in 0..30 {
            let m = "A".repeat(len);
            let ok = (6..=20).contains(&len);
            assert_eq!(check_manifest(true, Some(&m)).is_none(), ok, "len {}", len);
        }
    }
}
