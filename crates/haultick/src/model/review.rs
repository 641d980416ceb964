//! Review queue records: the holding area for pages the pipeline cannot
//! auto-commit with full confidence.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ticket::TruckTicket;

/// Severity tiers, ordered so `max()` picks the worst problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Critical => "CRITICAL",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "INFO" => Some(Self::Info),
            "WARNING" => Some(Self::Warning),
            "CRITICAL" => Some(Self::Critical),
            _ => None,
        }
    }
}

/// Reason codes for review entries. Each reason carries a fixed severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewReason {
    MissingTicketNumber,
    MissingManifest,
    InvalidDate,
    AmbiguousVendor,
    /// A reference name could not be resolved to an id; the problem
    /// detail names the category and value.
    UnresolvedReference,
    LowConfidenceOcr,
    DuplicateTicket,
    OutOfRangeDate,
    UnusualQuantity,
    /// A manifest number repeated for the same vendor on the same date.
    ReusedManifest,
    MissingSource,
    AssumedVendor,
    FilenameOverride,
}

impl ReviewReason {
    pub fn severity(&self) -> Severity {
        match self {
            Self::MissingTicketNumber
            | Self::MissingManifest
            | Self::InvalidDate
            | Self::AmbiguousVendor
            | Self::UnresolvedReference => Severity::Critical,
            Self::LowConfidenceOcr
            | Self::DuplicateTicket
            | Self::OutOfRangeDate
            | Self::UnusualQuantity
            | Self::ReusedManifest => Severity::Warning,
            Self::MissingSource | Self::AssumedVendor | Self::FilenameOverride => Severity::Info,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingTicketNumber => "MISSING_TICKET_NUMBER",
            Self::MissingManifest => "MISSING_MANIFEST",
            Self::InvalidDate => "INVALID_DATE",
            Self::AmbiguousVendor => "AMBIGUOUS_VENDOR",
            Self::UnresolvedReference => "UNRESOLVED_REFERENCE",
            Self::LowConfidenceOcr => "LOW_CONFIDENCE_OCR",
            Self::DuplicateTicket => "DUPLICATE_TICKET",
            Self::OutOfRangeDate => "OUT_OF_RANGE_DATE",
            Self::UnusualQuantity => "UNUSUAL_QUANTITY",
            Self::ReusedManifest => "REUSED_MANIFEST",
            Self::MissingSource => "MISSING_SOURCE",
            Self::AssumedVendor => "ASSUMED_VENDOR",
            Self::FilenameOverride => "FILENAME_OVERRIDE",
        }
    }
}

/// One unresolved problem detected while processing a page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Problem {
    pub reason: ReviewReason,
    pub detail: String,
}

impl Problem {
    pub fn new(reason: ReviewReason, detail: impl Into<String>) -> Self {
        Self {
            reason,
            detail: detail.into(),
        }
    }

    pub fn severity(&self) -> Severity {
        self.reason.severity()
    }
}

/// Identifies a page within a source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRef {
    pub file_id: PathBuf,
    pub page_number: u32,
}

/// An aggregated review entry for one page. All problems found while
/// processing the page land in a single entry; severity is the maximum
/// over its problems.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewQueueEntry {
    pub id: Option<i64>,
    pub page: PageRef,
    pub problems: Vec<Problem>,
    pub severity: Severity,
    /// Raw field values as extracted, for the operator's reference.
    pub detected_fields: BTreeMap<String, String>,
    pub suggested_fix: Option<String>,
    /// The provisional ticket, retained only as an attachment when the
    /// page could not be committed.
    pub ticket: Option<TruckTicket>,
    pub resolved: bool,
    pub resolved_by: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}
