//! End-to-end batch tests: files with OCR sidecar dumps go through the
//! full worker pool, pipeline and database.

mod common;

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use haultick::db;
use haultick::model::Severity;
use haultick::ocr::{JsonOcrEngine, OcrEngine, OcrError};
use haultick::worker::batch::RetryPolicy;
use haultick::worker::{BatchConfig, BatchProcessor, FileOutcome};

use common::{apex_page, pipeline_fixture, recent_date, write_ticket_file};

fn processor(db: &db::Database, pipeline: Arc<haultick::Pipeline>) -> BatchProcessor {
    processor_with_engine(db, pipeline, Arc::new(JsonOcrEngine::new()))
}

fn processor_with_engine(
    db: &db::Database,
    pipeline: Arc<haultick::Pipeline>,
    engine: Arc<dyn OcrEngine>,
) -> BatchProcessor {
    let config = BatchConfig {
        worker_count: 1,
        retry: RetryPolicy {
            max_retries: 2,
            backoff: Duration::from_millis(1),
        },
    };
    BatchProcessor::new(pipeline, engine, db.clone(), config)
}

fn run_batch(
    processor: &BatchProcessor,
    files: Vec<std::path::PathBuf>,
) -> haultick::BatchSummary {
    processor
        .run(files, Arc::new(AtomicBool::new(false)), |_| {})
        .unwrap()
}

#[test]
fn test_clean_ticket_commits_without_review() {
    let dir = TempDir::new().unwrap();
    let (db, pipeline) = pipeline_fixture();
    let file = write_ticket_file(dir.path(), "clean.pdf", &apex_page("48215501", &recent_date(3)));

    let summary = run_batch(&processor(&db, pipeline), vec![file]);

    assert_eq!(summary.ok, 1);
    assert_eq!(summary.errors, 0);
    assert_eq!(summary.review, 0);
    assert_eq!(summary.pages, 1);

    let ids = match &summary.results[0].outcome {
        FileOutcome::Processed { ticket_ids, .. } => ticket_ids.clone(),
        other => panic!("unexpected outcome: {:?}", other),
    };
    let ticket = db::ticket_repo::find_by_id(&db, ids[0]).unwrap().unwrap();
    assert_eq!(ticket.ticket_number, "48215501");
    assert_eq!(ticket.manifest_number.as_deref(), Some("MAN1234567"));
    assert_eq!(ticket.quantity, Some(14.2));
    assert!(!ticket.review_required);
    assert!(ticket.duplicate_of.is_none());
    assert!(db::review_repo::list_unresolved(&db).unwrap().is_empty());
}

#[test]
fn test_missing_manifest_is_critical_and_blocks_commit() {
    let dir = TempDir::new().unwrap();
    let (db, pipeline) = pipeline_fixture();
    // Regulated material without a manifest line.
    let text = format!(
        "APEX HAULING INC\nTicket No: 48215502\nDate: {}\nJob: RIVERSIDE\n\
         Material: CONTAMINATED SOIL\nQty: 14.2 TONS\nSource: NORTH PIT",
        recent_date(3)
    );
    let file = write_ticket_file(dir.path(), "nomanifest.pdf", &text);

    let summary = run_batch(&processor(&db, pipeline), vec![file]);

    assert_eq!(summary.ok, 0);
    assert_eq!(summary.review, 1);

    let entries = db::review_repo::list_unresolved(&db).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].severity, Severity::Critical);
    assert!(entries[0]
        .problems
        .iter()
        .any(|p| p.reason.as_str() == "MISSING_MANIFEST"));
    // The provisional ticket rides along for the operator, but no ticket
    // row exists.
    assert!(entries[0].ticket.is_some());
    let ticket = entries[0].ticket.as_ref().unwrap();
    assert!(ticket.review_required);
    assert!(db::ticket_repo::find_by_id(&db, 1).unwrap().is_none());
}

#[test]
fn test_duplicate_within_window_links_to_original() {
    let dir = TempDir::new().unwrap();
    let (db, pipeline) = pipeline_fixture();
    let first = write_ticket_file(dir.path(), "a.pdf", &apex_page("48215503", &recent_date(30)));
    let second = write_ticket_file(dir.path(), "b.pdf", &apex_page("48215503", &recent_date(3)));

    let summary = run_batch(&processor(&db, pipeline), vec![first, second]);

    assert_eq!(summary.ok, 1);
    assert_eq!(summary.review, 1);

    let entries = db::review_repo::list_unresolved(&db).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].severity, Severity::Warning);

    let original_id = match &summary.results[0].outcome {
        FileOutcome::Processed { ticket_ids, .. } => ticket_ids[0],
        other => panic!("unexpected outcome: {:?}", other),
    };
    let attached = entries[0].ticket.as_ref().unwrap();
    assert_eq!(attached.duplicate_of, Some(original_id));
}

#[test]
fn test_same_number_different_vendor_is_not_a_duplicate() {
    let dir = TempDir::new().unwrap();
    let (db, pipeline) = pipeline_fixture();
    let apex = write_ticket_file(dir.path(), "apex.pdf", &apex_page("48215504", &recent_date(3)));
    let bravo_text = format!(
        "BRAVO DISPOSAL LLC\nTicket No: 48215504\nDate: {}\nJob: RIVERSIDE\n\
         Material: CLEAN FILL\nQty: 9.0 TONS\nSource: NORTH PIT",
        recent_date(3)
    );
    let bravo = write_ticket_file(dir.path(), "bravo.pdf", &bravo_text);

    let summary = run_batch(&processor(&db, pipeline), vec![apex, bravo]);

    assert_eq!(summary.ok, 2);
    assert_eq!(summary.review, 0);
}

#[test]
fn test_file_hash_short_circuits_reprocessing() {
    let dir = TempDir::new().unwrap();
    let (db, pipeline) = pipeline_fixture();
    let file = write_ticket_file(dir.path(), "once.pdf", &apex_page("48215505", &recent_date(3)));

    let processor = processor(&db, pipeline);
    let first = run_batch(&processor, vec![file.clone()]);
    let second = run_batch(&processor, vec![file]);

    let first_ids = match &first.results[0].outcome {
        FileOutcome::Processed { ticket_ids, .. } => ticket_ids.clone(),
        other => panic!("unexpected outcome: {:?}", other),
    };
    match &second.results[0].outcome {
        FileOutcome::AlreadyProcessed { ticket_ids } => assert_eq!(*ticket_ids, first_ids),
        other => panic!("expected ledger hit, got {:?}", other),
    }
    // No second ticket row, no duplicate review entry.
    assert_eq!(second.ok, 0);
    assert_eq!(second.review, 0);
    assert!(db::ticket_repo::find_by_id(&db, first_ids[0] + 1)
        .unwrap()
        .is_none());
}

/// Fails transiently a fixed number of times before delegating.
struct FlakyEngine {
    inner: JsonOcrEngine,
    failures_left: AtomicU32,
}

impl FlakyEngine {
    fn new(failures: u32) -> Self {
        Self {
            inner: JsonOcrEngine::new(),
            failures_left: AtomicU32::new(failures),
        }
    }
}

impl OcrEngine for FlakyEngine {
    fn pages(&self, path: &Path) -> Result<Vec<haultick::model::OcrPage>, OcrError> {
        if self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(OcrError::EngineFailed {
                path: path.to_path_buf(),
                reason: "simulated transient failure".to_string(),
            });
        }
        self.inner.pages(path)
    }
}

#[test]
fn test_transient_ocr_failure_retries_then_succeeds() {
    let dir = TempDir::new().unwrap();
    let (db, pipeline) = pipeline_fixture();
    let file = write_ticket_file(dir.path(), "flaky.pdf", &apex_page("48215506", &recent_date(3)));

    // Two failures, two retries allowed: third attempt succeeds.
    let engine = Arc::new(FlakyEngine::new(2));
    let summary = run_batch(&processor_with_engine(&db, pipeline, engine), vec![file]);

    assert_eq!(summary.ok, 1);
    assert_eq!(summary.errors, 0);
}

#[test]
fn test_exhausted_retries_fail_the_file_without_tickets() {
    let dir = TempDir::new().unwrap();
    let (db, pipeline) = pipeline_fixture();
    let file = write_ticket_file(dir.path(), "dead.pdf", &apex_page("48215507", &recent_date(3)));

    // Three failures against two retries: attempts run out.
    let engine = Arc::new(FlakyEngine::new(3));
    let summary = run_batch(&processor_with_engine(&db, pipeline, engine), vec![file]);

    assert_eq!(summary.errors, 1);
    assert_eq!(summary.ok, 0);
    match &summary.results[0].outcome {
        FileOutcome::Failed { error } => assert!(error.contains("attempts")),
        other => panic!("expected failure, got {:?}", other),
    }
    assert!(db::ticket_repo::find_by_id(&db, 1).unwrap().is_none());
}

#[test]
fn test_failed_file_does_not_poison_the_batch() {
    let dir = TempDir::new().unwrap();
    let (db, pipeline) = pipeline_fixture();
    let good = write_ticket_file(dir.path(), "good.pdf", &apex_page("48215508", &recent_date(3)));
    // Document without a sidecar dump: OCR fails permanently.
    let bad = dir.path().join("no-dump.pdf");
    std::fs::write(&bad, b"no sidecar").unwrap();

    let summary = run_batch(&processor(&db, pipeline), vec![bad, good]);

    assert_eq!(summary.errors, 1);
    assert_eq!(summary.ok, 1);
}

#[test]
fn test_cancelled_batch_skips_files_and_still_seals() {
    let dir = TempDir::new().unwrap();
    let (db, pipeline) = pipeline_fixture();
    let a = write_ticket_file(dir.path(), "s1.pdf", &apex_page("48215509", &recent_date(3)));
    let b = write_ticket_file(dir.path(), "s2.pdf", &apex_page("48215510", &recent_date(3)));

    let cancel = Arc::new(AtomicBool::new(true));
    let summary = processor(&db, pipeline)
        .run(vec![a, b], cancel, |_| {})
        .unwrap();

    assert_eq!(summary.skipped, 2);
    assert_eq!(summary.ok, 0);

    let run = db::run_repo::find(&db, &summary.request_guid).unwrap().unwrap();
    assert_eq!(run.skipped_count, 2);
    assert!(run.completed_at.is_some());
}

#[test]
fn test_run_record_carries_batch_totals() {
    let dir = TempDir::new().unwrap();
    let (db, pipeline) = pipeline_fixture();
    let clean = write_ticket_file(dir.path(), "t1.pdf", &apex_page("48215511", &recent_date(3)));
    let text = format!(
        "APEX HAULING INC\nTicket No: 48215512\nDate: {}\nJob: RIVERSIDE\n\
         Material: CONTAMINATED SOIL\nQty: 14.2 TONS\nSource: NORTH PIT",
        recent_date(3)
    );
    let queued = write_ticket_file(dir.path(), "t2.pdf", &text);

    let summary = run_batch(&processor(&db, pipeline), vec![clean, queued]);

    let run = db::run_repo::find(&db, &summary.request_guid).unwrap().unwrap();
    assert_eq!(run.files_count, 2);
    assert_eq!(run.pages_count, 2);
    assert_eq!(run.ok_count, 1);
    assert_eq!(run.review_count, 1);
    assert_eq!(run.error_count, 0);
    assert_eq!(run.status, haultick::model::RunStatus::Completed);
}

#[test]
fn test_multipage_file_processes_pages_in_order() {
    let dir = TempDir::new().unwrap();
    let (db, pipeline) = pipeline_fixture();
    let file = common::write_multipage_file(
        dir.path(),
        "multi.pdf",
        &[
            &apex_page("48215513", &recent_date(4)),
            &apex_page("48215514", &recent_date(5)),
        ],
    );

    let summary = run_batch(&processor(&db, pipeline), vec![file]);

    assert_eq!(summary.pages, 2);
    assert_eq!(summary.ok, 2);
    let ids = match &summary.results[0].outcome {
        FileOutcome::Processed { ticket_ids, .. } => ticket_ids.clone(),
        other => panic!("unexpected outcome: {:?}", other),
    };
    let first = db::ticket_repo::find_by_id(&db, ids[0]).unwrap().unwrap();
    let second = db::ticket_repo::find_by_id(&db, ids[1]).unwrap().unwrap();
    assert_eq!(first.file_page, 1);
    assert_eq!(second.file_page, 2);
    assert_eq!(first.ticket_number, "48215513");
    assert_eq!(second.ticket_number, "48215514");
}

#[test]
fn test_logo_sidecar_identifies_vendor_without_text_terms() {
    let dir = TempDir::new().unwrap();
    let db = db::Database::open_in_memory().unwrap();
    common::seed_refs(&db);

    // Deterministic non-flat pattern as the logo template.
    let mut logo = image::GrayImage::new(16, 16);
    for (x, y, p) in logo.enumerate_pixels_mut() {
        *p = image::Luma([((x * 31 + y * 17) % 251) as u8]);
    }
    let logo_dir = dir.path().join("logos");
    std::fs::create_dir(&logo_dir).unwrap();
    logo.save(logo_dir.join("apex.png")).unwrap();

    let catalog = haultick::template::load_catalog_from_str(
        r#"{
            "version": "1.0",
            "vendors": [
                {
                    "vendor_name": "APEX",
                    "match_terms": ["APEX HAULING"],
                    "logo": {
                        "path": "apex.png",
                        "region": { "x": 0.0, "y": 0.0, "w": 0.25, "h": 0.2 },
                        "threshold": 0.9
                    },
                    "fields": {
                        "ticket_number": { "method": "text_regex", "regex": "\\d{8}" },
                        "ticket_date": { "method": "text_regex", "regex": "\\d{2}/\\d{2}/\\d{4}" },
                        "job": { "method": "text_regex", "regex": "RIVERSIDE|HILLSIDE" },
                        "material": { "method": "text_regex", "regex": "CONTAMINATED SOIL|CLEAN FILL" },
                        "quantity": { "method": "text_regex", "regex": "\\d+\\.\\d" },
                        "source": { "method": "text_regex", "regex": "NORTH PIT|SOUTH PIT" }
                    }
                },
                {
                    "vendor_name": "BRAVO",
                    "match_terms": ["BRAVO DISPOSAL"],
                    "fields": {
                        "ticket_number": { "method": "text_regex", "regex": "\\d{8}" }
                    }
                }
            ],
            "default_fields": {},
            "synonyms": {
                "job": { "riverside": "Riverside Phase 2" }
            }
        }"#,
    )
    .unwrap();
    let config = Arc::new(haultick::PipelineConfig::new(catalog).with_logo_dir(&logo_dir));
    let refs = Arc::new(haultick::ReferenceCache::preload(&db).unwrap());
    let pipeline = Arc::new(haultick::Pipeline::from_config(config, db.clone(), refs).unwrap());

    // No vendor text anywhere on the page: only the stamped logo in the
    // page scan sidecar can identify APEX.
    let text = format!(
        "Scale ticket\nTicket No: 58215520\nDate: {}\nJob: RIVERSIDE\n\
         Material: CLEAN FILL\nSource: NORTH PIT\nQty: 9.1 TONS",
        recent_date(3)
    );
    let file = write_ticket_file(dir.path(), "logo.pdf", &text);

    let mut scan = image::GrayImage::from_pixel(400, 520, image::Luma([230]));
    for y in 0..16 {
        for x in 0..16 {
            scan.put_pixel(20 + x, 24 + y, *logo.get_pixel(x, y));
        }
    }
    scan.save(dir.path().join("logo.pdf.p1.png")).unwrap();

    let summary = run_batch(&processor(&db, pipeline), vec![file]);

    assert_eq!(summary.ok, 1);
    assert_eq!(summary.review, 0);

    let ids = match &summary.results[0].outcome {
        FileOutcome::Processed { ticket_ids, .. } => ticket_ids.clone(),
        other => panic!("unexpected outcome: {:?}", other),
    };
    let ticket = db::ticket_repo::find_by_id(&db, ids[0]).unwrap().unwrap();
    let apex = db::ref_repo::find(&db, haultick::model::RefCategory::Vendor, "APEX")
        .unwrap()
        .unwrap();
    assert_eq!(ticket.vendor_id, Some(apex.id));
}
