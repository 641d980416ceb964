//! Windowed duplicate detection. A candidate is a duplicate of the
//! earliest committed ticket with the same number and vendor whose date
//! falls within the look-back window ending at the candidate's date.

use crate::db::{self, Database, DatabaseError};
use crate::model::{Problem, ReviewReason, TruckTicket};

/// Look-back window. Vendors recycle ticket numbers, so the same number
/// reappearing after this many days is treated as a fresh ticket.
pub const DUPLICATE_WINDOW_DAYS: i64 = 120;

/// Checks the candidate against committed tickets. Returns the prior
/// ticket and a WARNING problem when a duplicate is found.
///
/// The window looks back only: a committed ticket dated after the
/// candidate never makes the candidate a duplicate, whatever order the
/// two files were processed in. Tickets without a resolved vendor are
/// never matched; vendor identity is part of the duplicate key.
pub fn check_duplicate(
    db: &Database,
    candidate: &TruckTicket,
) -> Result<Option<(TruckTicket, Problem)>, DatabaseError> {
    let vendor_id = match candidate.vendor_id {
        Some(v) => v,
        None => return Ok(None),
    };

    let prior = db::ticket_repo::find_prior_in_window(
        db,
        &candidate.ticket_number,
        vendor_id,
        candidate.ticket_date,
        DUPLICATE_WINDOW_DAYS,
    )?;

    Ok(prior.map(|original| {
        let problem = Problem::new(
            ReviewReason::DuplicateTicket,
            format!(
                "matches committed ticket {} ({})",
                original.id.map_or("?".to_string(), |id| id.to_string()),
                original.summary(),
            ),
        );
        (original, problem)
    }))
}
