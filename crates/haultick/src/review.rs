//! Review Queue Router: folds every problem found on a page into a single
//! queue entry and decides whether the page may still auto-commit.

use std::collections::BTreeMap;

use chrono::Utc;

use crate::model::{PageRef, Problem, ReviewReason, ReviewQueueEntry, Severity, TruckTicket};

/// A page commits without operator review only when nothing worse than
/// INFO was found on it.
pub fn requires_review(problems: &[Problem]) -> bool {
    max_severity(problems).map_or(false, |s| s >= Severity::Warning)
}

pub fn max_severity(problems: &[Problem]) -> Option<Severity> {
    problems.iter().map(Problem::severity).max()
}

/// Builds the single aggregated entry for a page. Call only when
/// `problems` is non-empty; INFO-only pages still get an entry (the
/// ticket commits anyway, the entry is a paper trail).
pub fn route(
    page: PageRef,
    problems: Vec<Problem>,
    detected_fields: BTreeMap<String, String>,
    ticket: Option<TruckTicket>,
) -> ReviewQueueEntry {
    debug_assert!(!problems.is_empty());
    let severity = max_severity(&problems).unwrap_or(Severity::Info);
    let suggested_fix = suggest_fix(&problems);

    ReviewQueueEntry {
        id: None,
        page,
        severity,
        suggested_fix,
        detected_fields,
        ticket,
        problems,
        resolved: false,
        resolved_by: None,
        resolved_at: None,
        created_at: Utc::now(),
    }
}

/// A one-line hint for the operator, derived from the worst problem.
fn suggest_fix(problems: &[Problem]) -> Option<String> {
    let worst = problems
        .iter()
        .max_by_key(|p| p.severity())?;
    let hint = match worst.reason {
        ReviewReason::MissingTicketNumber => "Read the ticket number off the scan and enter it",
        ReviewReason::MissingManifest => "Locate the manifest number or reclassify the material",
        ReviewReason::InvalidDate => "Correct the ticket date from the scan",
        ReviewReason::AmbiguousVendor => "Pick the vendor from the template catalog",
        ReviewReason::UnresolvedReference => "Add the named entity to reference data or fix the value",
        ReviewReason::LowConfidenceOcr => "Verify all fields against the scan",
        ReviewReason::DuplicateTicket => "Compare with the original ticket and discard one",
        ReviewReason::OutOfRangeDate => "Confirm the ticket date is real",
        ReviewReason::UnusualQuantity => "Confirm the quantity against the scale readout",
        ReviewReason::ReusedManifest => "Check whether the manifest covers multiple loads",
        ReviewReason::MissingSource => "Fill in the source site if known",
        ReviewReason::AssumedVendor | ReviewReason::FilenameOverride => {
            "No action needed unless the assumption looks wrong"
        }
    };
    Some(hint.to_string())
}
