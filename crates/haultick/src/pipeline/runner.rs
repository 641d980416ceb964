use std::path::Path;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tracing::{debug, info_span, warn};

use crate::db::{self, Database};
use crate::error::TemplateError;
use crate::extract::{DetectionKind, FieldExtractor, SynonymTable, VendorDetector, VendorMatch};
use crate::model::{
    PageRef, Problem, QuantityUnit, RefCategory, ReviewReason, TicketType, TruckTicket,
};
use crate::refdata::{ReferenceCache, ResolveError};
use crate::review;
use crate::validate;

use super::config::{PipelineConfig, REQUIRED_FIELDS};
use super::context::{PageContext, PageOutcome, PagePhase};
use super::error::PipelineError;
use super::progress::{ProgressEvent, ProgressReporter};

pub struct Pipeline {
    config: Arc<PipelineConfig>,
    detector: VendorDetector,
    extractor: FieldExtractor,
    synonyms: SynonymTable,
    db: Database,
    refs: Arc<ReferenceCache>,
}

impl Pipeline {
    /// Production constructor — builds all sub-components from config.
    pub fn from_config(
        config: Arc<PipelineConfig>,
        db: Database,
        refs: Arc<ReferenceCache>,
    ) -> Result<Self, TemplateError> {
        let detector = VendorDetector::new(&config.catalog, config.logo_dir.as_deref())?;
        let extractor = FieldExtractor::new(&config.catalog)?;
        let synonyms = SynonymTable::from_catalog(&config.catalog.synonyms);

        Ok(Self {
            config,
            detector,
            extractor,
            synonyms,
            db,
            refs,
        })
    }

    /// Run the full pipeline for a single page.
    /// Returns the outcome paired with the final context.
    pub fn run(
        &self,
        mut ctx: PageContext,
        progress: &dyn ProgressReporter,
    ) -> (Result<PageOutcome, PipelineError>, PageContext) {
        let _pipeline_span = info_span!("pipeline",
            file = %ctx.meta.file_id.display(),
            page = ctx.meta.page_number,
        )
        .entered();

        ctx.phase = PagePhase::Extracting;
        progress.report(ProgressEvent::Phase {
            phase: PagePhase::Extracting,
            message: "Detecting vendor and extracting fields...".to_string(),
        });

        // Step 1: Detect vendor
        {
            let _step = info_span!("detect_vendor").entered();
            self.step_detect_vendor(&mut ctx);
        }

        // Step 2: Extract fields
        {
            let _step = info_span!("extract_fields").entered();
            self.step_extract_fields(&mut ctx);
        }

        // Step 3: Resolve references
        {
            let _step = info_span!("resolve_references").entered();
            if let Err(e) = self.step_resolve_references(&mut ctx) {
                progress.report(ProgressEvent::Failed {
                    error: e.to_string(),
                });
                return (Err(e), ctx);
            }
        }

        // Step 4: Build the provisional ticket
        {
            let _step = info_span!("build_ticket").entered();
            self.step_build_ticket(&mut ctx);
        }

        // Step 5: Validate
        ctx.phase = PagePhase::Validating;
        progress.report(ProgressEvent::Phase {
            phase: PagePhase::Validating,
            message: "Validating manifest and checking duplicates...".to_string(),
        });
        {
            let _step = info_span!("validate").entered();
            if let Err(e) = self.step_validate(&mut ctx) {
                progress.report(ProgressEvent::Failed {
                    error: e.to_string(),
                });
                return (Err(e), ctx);
            }
        }

        // Step 6: Commit or queue
        let outcome = {
            let _step = info_span!("commit_or_queue").entered();
            match self.step_commit_or_queue(&mut ctx) {
                Ok(outcome) => outcome,
                Err(e) => {
                    progress.report(ProgressEvent::Failed {
                        error: e.to_string(),
                    });
                    return (Err(e), ctx);
                }
            }
        };

        match &outcome {
            PageOutcome::Committed { ticket_id, .. } => {
                progress.report(ProgressEvent::Committed {
                    ticket_id: *ticket_id,
                });
            }
            PageOutcome::Queued { severity, .. } => {
                progress.report(ProgressEvent::Queued {
                    severity: *severity,
                });
            }
        }
        ctx.outcome = Some(outcome.clone());
        (Ok(outcome), ctx)
    }

    fn step_detect_vendor(&self, ctx: &mut PageContext) {
        match self.detector.detect(&ctx.page.text, ctx.image.as_ref()) {
            Some(m) => {
                debug!(vendor = %m.vendor_name, confidence = m.confidence, "vendor detected");
                ctx.vendor = Some(m);
            }
            None => {
                // A single-vendor catalog has no ambiguity to resolve.
                if self.config.catalog.vendors.len() == 1 {
                    let name = self.config.catalog.vendors[0].vendor_name.clone();
                    ctx.push_problem(Problem::new(
                        ReviewReason::AssumedVendor,
                        format!("no detection signal; assumed sole vendor '{}'", name),
                    ));
                    ctx.vendor = Some(VendorMatch {
                        vendor_name: name,
                        confidence: 0.0,
                        kind: DetectionKind::Keyword,
                        term_hits: 0,
                    });
                } else {
                    ctx.push_problem(Problem::new(
                        ReviewReason::AmbiguousVendor,
                        "no vendor template matched with sufficient confidence",
                    ));
                }
            }
        }
    }

    fn step_extract_fields(&self, ctx: &mut PageContext) {
        let vendor = ctx.vendor.as_ref().map(|v| v.vendor_name.clone());
        let names: Vec<String> = self
            .extractor
            .field_names(vendor.as_deref())
            .into_iter()
            .map(String::from)
            .collect();

        for name in names {
            let extraction = self.extractor.extract(vendor.as_deref(), &name, &ctx.page);
            if let Some(ref value) = extraction.value {
                ctx.detected_fields.insert(name.clone(), value.clone());
            }
            ctx.fields.insert(name, extraction);
        }

        let sum: f32 = REQUIRED_FIELDS
            .iter()
            .map(|f| ctx.fields.get(*f).map_or(0.0, |e| e.confidence))
            .sum();
        ctx.page_confidence = sum / REQUIRED_FIELDS.len() as f32;

        if ctx.page_confidence < self.config.min_page_confidence {
            ctx.push_problem(Problem::new(
                ReviewReason::LowConfidenceOcr,
                format!(
                    "aggregate confidence {:.2} below {:.2}",
                    ctx.page_confidence, self.config.min_page_confidence
                ),
            ));
        }
    }

    fn step_resolve_references(&self, ctx: &mut PageContext) -> Result<(), PipelineError> {
        ctx.resolved.job_id = self.resolve_field(ctx, "job", RefCategory::Job)?;
        ctx.resolved.material_id = self.resolve_field(ctx, "material", RefCategory::Material)?;
        ctx.resolved.source_id = self.resolve_field(ctx, "source", RefCategory::Source)?;
        ctx.resolved.destination_id =
            self.resolve_field(ctx, "destination", RefCategory::Destination)?;

        if let Some(vendor) = ctx.vendor.as_ref().map(|v| v.vendor_name.clone()) {
            ctx.resolved.vendor_id =
                self.resolve_name(ctx, RefCategory::Vendor, &vendor)?;
        }
        Ok(())
    }

    /// Normalizes and resolves one extracted field. A missing value is not
    /// flagged here; whether the ticket can live without it is decided by
    /// the builder. A present value that resolves to nothing is flagged.
    fn resolve_field(
        &self,
        ctx: &mut PageContext,
        field: &str,
        category: RefCategory,
    ) -> Result<Option<i64>, PipelineError> {
        let raw = match ctx.field_value(field) {
            Some(v) => v.to_string(),
            None => return Ok(None),
        };
        let name = self.synonyms.normalize(category, &raw);
        self.resolve_name(ctx, category, &name)
    }

    fn resolve_name(
        &self,
        ctx: &mut PageContext,
        category: RefCategory,
        name: &str,
    ) -> Result<Option<i64>, PipelineError> {
        match self.refs.resolve(&self.db, category, name) {
            Ok(id) => Ok(Some(id)),
            Err(ResolveError::NotFound { category, name }) => {
                ctx.push_problem(Problem::new(
                    ReviewReason::UnresolvedReference,
                    format!("no {} entity named '{}'", category, name),
                ));
                Ok(None)
            }
            Err(e) => Err(PipelineError::Reference(e)),
        }
    }

    fn step_build_ticket(&self, ctx: &mut PageContext) {
        let ticket_number = match ctx.field_value("ticket_number") {
            Some(v) => v.to_string(),
            None => {
                ctx.push_problem(Problem::new(
                    ReviewReason::MissingTicketNumber,
                    "no ticket number found on page",
                ));
                return;
            }
        };

        let ticket_date = match self.decide_date(ctx) {
            Some(d) => d,
            None => return,
        };

        let (job_id, material_id) = match (ctx.resolved.job_id, ctx.resolved.material_id) {
            (Some(j), Some(m)) => (j, m),
            _ => {
                // UnresolvedReference already recorded when a value was
                // present; a wholly missing value gets recorded here.
                if ctx.resolved.job_id.is_none() && ctx.field_value("job").is_none() {
                    ctx.push_problem(Problem::new(
                        ReviewReason::UnresolvedReference,
                        "no job value extracted",
                    ));
                }
                if ctx.resolved.material_id.is_none() && ctx.field_value("material").is_none() {
                    ctx.push_problem(Problem::new(
                        ReviewReason::UnresolvedReference,
                        "no material value extracted",
                    ));
                }
                return;
            }
        };

        let ticket_type = self.decide_ticket_type(ctx);
        let quantity = ctx
            .field_value("quantity")
            .and_then(|v| v.replace(',', "").parse::<f64>().ok());
        let quantity_unit = ctx
            .field_value("quantity_unit")
            .and_then(QuantityUnit::from_str);

        ctx.ticket = Some(TruckTicket {
            id: None,
            ticket_number,
            ticket_date,
            quantity,
            quantity_unit,
            job_id,
            material_id,
            source_id: ctx.resolved.source_id,
            destination_id: ctx.resolved.destination_id,
            vendor_id: ctx.resolved.vendor_id,
            ticket_type,
            manifest_number: ctx.field_value("manifest_number").map(String::from),
            truck_number: ctx.field_value("truck_number").map(String::from),
            file_id: ctx.meta.file_id.clone(),
            file_page: ctx.meta.page_number,
            file_hash: ctx.meta.file_hash.clone(),
            duplicate_of: None,
            review_required: false,
            confidence: ctx.page_confidence,
            created_at: Utc::now(),
        });
    }

    /// A date embedded in the file name pins the ticket date; otherwise
    /// the extracted field must parse.
    fn decide_date(&self, ctx: &mut PageContext) -> Option<NaiveDate> {
        if let Some(d) = filename_date(&ctx.meta.file_id) {
            ctx.push_problem(Problem::new(
                ReviewReason::FilenameOverride,
                format!("ticket date {} taken from file name", d),
            ));
            return Some(d);
        }

        match ctx.field_value("ticket_date") {
            Some(raw) => match parse_date(raw) {
                Some(d) => Some(d),
                None => {
                    let detail = format!("unparseable ticket date '{}'", raw);
                    ctx.push_problem(Problem::new(ReviewReason::InvalidDate, detail));
                    None
                }
            },
            None => {
                ctx.push_problem(Problem::new(
                    ReviewReason::InvalidDate,
                    "no ticket date found on page",
                ));
                None
            }
        }
    }

    fn decide_ticket_type(&self, ctx: &mut PageContext) -> TicketType {
        if let Some(t) = filename_ticket_type(&ctx.meta.file_id) {
            ctx.push_problem(Problem::new(
                ReviewReason::FilenameOverride,
                format!("ticket type {} taken from file name", t.as_str()),
            ));
            return t;
        }
        ctx.field_value("ticket_type")
            .map(|raw| self.synonyms.normalize(RefCategory::TicketType, raw))
            .and_then(|v| TicketType::from_str(&v))
            .unwrap_or(TicketType::Import)
    }

    fn step_validate(&self, ctx: &mut PageContext) -> Result<(), PipelineError> {
        let ticket = match ctx.ticket.as_mut() {
            Some(t) => t,
            None => return Ok(()),
        };

        let requires = self.refs.requires_manifest(&self.db, ticket.material_id)?;
        if let Some(p) = validate::check_manifest(requires, ticket.manifest_number.as_deref()) {
            ctx.problems.push(p);
        } else if let Some(vendor_id) = ticket.vendor_id {
            if let Some(p) = validate::check_manifest_reuse(
                &self.db,
                vendor_id,
                ticket.ticket_date,
                ticket.manifest_number.as_deref(),
            )? {
                ctx.problems.push(p);
            }
        }

        if let Some(p) = validate::check_quantity(ticket.quantity) {
            ctx.problems.push(p);
        }
        if let Some(p) = validate::check_date_range(ticket.ticket_date) {
            ctx.problems.push(p);
        }
        if ticket.source_id.is_none() {
            ctx.problems.push(Problem::new(
                ReviewReason::MissingSource,
                "no source site on ticket",
            ));
        }

        if let Some((original, problem)) = validate::check_duplicate(&self.db, ticket)? {
            ticket.duplicate_of = original.id;
            ctx.problems.push(problem);
        }

        Ok(())
    }

    fn step_commit_or_queue(&self, ctx: &mut PageContext) -> Result<PageOutcome, PipelineError> {
        if review::requires_review(&ctx.problems) {
            return self.queue(ctx);
        }

        ctx.phase = PagePhase::Committing;
        let mut ticket = ctx
            .ticket
            .clone()
            .expect("ticket built when nothing blocked it");

        match db::ticket_repo::insert(&self.db, &ticket)? {
            db::ticket_repo::InsertOutcome::Inserted(ticket_id) => {
                ticket.id = Some(ticket_id);
                ctx.ticket = Some(ticket);

                // INFO-only pages still leave a paper trail.
                let review_entry_id = if ctx.problems.is_empty() {
                    None
                } else {
                    let entry = review::route(
                        self.page_ref(ctx),
                        ctx.problems.clone(),
                        ctx.detected_fields.clone(),
                        ctx.ticket.clone(),
                    );
                    Some(db::review_repo::insert(&self.db, &entry)?)
                };

                Ok(PageOutcome::Committed {
                    ticket_id,
                    review_entry_id,
                })
            }
            db::ticket_repo::InsertOutcome::DuplicateRace => {
                // Another worker won the commit; hand the page to the
                // duplicate path instead of failing it.
                warn!(ticket = %ticket.ticket_number, "lost commit race, requeueing as duplicate");
                if let Some((original, problem)) = validate::check_duplicate(&self.db, &ticket)? {
                    ticket.duplicate_of = original.id;
                    ctx.problems.push(problem);
                } else {
                    ctx.problems.push(Problem::new(
                        ReviewReason::DuplicateTicket,
                        "committed concurrently by another worker",
                    ));
                }
                ctx.ticket = Some(ticket);
                self.queue(ctx)
            }
        }
    }

    fn queue(&self, ctx: &mut PageContext) -> Result<PageOutcome, PipelineError> {
        ctx.phase = PagePhase::Queued;
        let ticket = ctx.ticket.clone().map(|mut t| {
            t.review_required = true;
            t
        });
        let entry = review::route(
            self.page_ref(ctx),
            ctx.problems.clone(),
            ctx.detected_fields.clone(),
            ticket,
        );
        let severity = entry.severity;
        let review_entry_id = db::review_repo::insert(&self.db, &entry)?;
        Ok(PageOutcome::Queued {
            review_entry_id,
            severity,
        })
    }

    fn page_ref(&self, ctx: &PageContext) -> PageRef {
        PageRef {
            file_id: ctx.meta.file_id.clone(),
            page_number: ctx.meta.page_number,
        }
    }
}

/// Tries the date shapes that show up on scale tickets.
fn parse_date(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    const FORMATS: [&str; 6] = [
        "%Y-%m-%d",
        "%m/%d/%Y",
        "%m/%d/%y",
        "%m-%d-%Y",
        "%b %d, %Y",
        "%B %d, %Y",
    ];
    FORMATS
        .iter()
        .find_map(|f| NaiveDate::parse_from_str(s, f).ok())
}

/// `IMPORT`/`EXPORT` embedded in the file name pins the ticket type.
fn filename_ticket_type(path: &Path) -> Option<TicketType> {
    let name = path.file_stem()?.to_string_lossy().to_uppercase();
    if name.contains("IMPORT") {
        Some(TicketType::Import)
    } else if name.contains("EXPORT") {
        Some(TicketType::Export)
    } else {
        None
    }
}

/// A `YYYY-MM-DD` or `YYYYMMDD` run in the file name pins the date.
fn filename_date(path: &Path) -> Option<NaiveDate> {
    let name = path.file_stem()?.to_string_lossy().into_owned();

    for (start, _) in name.match_indices(|c: char| c.is_ascii_digit()) {
        if let Some(chunk) = name.get(start..start + 10) {
            if let Ok(d) = NaiveDate::parse_from_str(chunk, "%Y-%m-%d") {
                return Some(d);
            }
        }
        if let Some(chunk) = name.get(start..start + 8) {
            if chunk.chars().all(|c| c.is_ascii_digit()) {
                if let Ok(d) = NaiveDate::parse_from_str(chunk, "%Y%m%d") {
                    return Some(d);
                }
            }
        }
    }
    None
}
