use std::collections::BTreeMap;

use image::GrayImage;

use crate::extract::{Extraction, VendorMatch};
use crate::model::{OcrPage, PageMeta, Problem, Severity, TruckTicket};

/// Explicit phase of the per-page state machine. Pages never move
/// backwards and never retry a phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PagePhase {
    Extracting,
    Validating,
    Committing,
    Queued,
}

/// Where the page ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageOutcome {
    /// Ticket committed clean, or with INFO-level notes on record.
    Committed {
        ticket_id: i64,
        review_entry_id: Option<i64>,
    },
    /// Held for an operator; no ticket row was written.
    Queued {
        review_entry_id: i64,
        severity: Severity,
    },
}

/// Reference ids resolved from extracted names. Required-ness is the
/// ticket builder's concern; resolution just records what it could find.
#[derive(Debug, Clone, Default)]
pub struct ResolvedRefs {
    pub job_id: Option<i64>,
    pub material_id: Option<i64>,
    pub source_id: Option<i64>,
    pub destination_id: Option<i64>,
    pub vendor_id: Option<i64>,
}

/// Mutable state threaded through the pipeline steps for one page.
pub struct PageContext {
    // Input
    pub page: OcrPage,
    pub meta: PageMeta,
    /// Rendered page image, when available, for logo matching.
    pub image: Option<GrayImage>,

    pub phase: PagePhase,

    // Step 1 result
    pub vendor: Option<VendorMatch>,

    // Step 2 results
    pub fields: BTreeMap<String, Extraction>,
    /// Raw hit values only, for review entries and logs.
    pub detected_fields: BTreeMap<String, String>,
    /// Mean confidence over the required fields.
    pub page_confidence: f32,

    // Step 3 result
    pub resolved: ResolvedRefs,

    // Step 4 result — Some unless a CRITICAL problem blocked construction
    pub ticket: Option<TruckTicket>,

    // Accumulated across all steps
    pub problems: Vec<Problem>,

    // Step 6 result
    pub outcome: Option<PageOutcome>,
}

impl PageContext {
    pub fn new(page: OcrPage, meta: PageMeta) -> Self {
        Self {
            page,
            meta,
            image: None,
            phase: PagePhase::Extracting,
            vendor: None,
            fields: BTreeMap::new(),
            detected_fields: BTreeMap::new(),
            page_confidence: 0.0,
            resolved: ResolvedRefs::default(),
            ticket: None,
            problems: Vec::new(),
            outcome: None,
        }
    }

    pub fn with_image(mut self, image: GrayImage) -> Self {
        self.image = Some(image);
        self
    }

    /// Hit value of a field, if it was extracted.
    pub fn field_value(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(|e| e.value.as_deref())
    }

    pub fn push_problem(&mut self, problem: Problem) {
        self.problems.push(problem);
    }
}
