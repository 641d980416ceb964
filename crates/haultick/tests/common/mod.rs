//! Shared fixtures for the end-to-end tests: a two-vendor catalog,
//! seeded reference data, and helpers that lay down document files with
//! their OCR sidecar dumps.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Once};

use haultick::db::{self, Database};
use haultick::model::RefCategory;
use haultick::pipeline::{Pipeline, PipelineConfig};
use haultick::refdata::ReferenceCache;
use haultick::template::load_catalog_from_str;

pub const CATALOG: &str = r#"{
    "version": "1.0",
    "vendors": [
        {
            "vendor_name": "APEX",
            "match_terms": ["APEX HAULING"],
            "fields": {
                "ticket_number": { "method": "text_regex", "regex": "\\d{8}" },
                "ticket_date": { "method": "text_regex", "regex": "\\d{2}/\\d{2}/\\d{4}" },
                "job": { "method": "text_regex", "regex": "RIVERSIDE|HILLSIDE" },
                "material": { "method": "text_regex", "regex": "CONTAMINATED SOIL|CLEAN FILL" },
                "manifest_number": { "method": "text_regex", "regex": "MAN[0-9]{7}" },
                "quantity": { "method": "text_regex", "regex": "\\d+\\.\\d" },
                "quantity_unit": { "method": "text_regex", "regex": "TONS|CY|LOADS" },
                "source": { "method": "text_regex", "regex": "NORTH PIT|SOUTH PIT" }
            }
        },
        {
            "vendor_name": "BRAVO",
            "match_terms": ["BRAVO DISPOSAL"],
            "fields": {
                "ticket_number": { "method": "text_regex", "regex": "\\d{8}" },
                "ticket_date": { "method": "text_regex", "regex": "\\d{2}/\\d{2}/\\d{4}" },
                "job": { "method": "text_regex", "regex": "RIVERSIDE|HILLSIDE" },
                "material": { "method": "text_regex", "regex": "CONTAMINATED SOIL|CLEAN FILL" },
                "quantity": { "method": "text_regex", "regex": "\\d+\\.\\d" },
                "source": { "method": "text_regex", "regex": "NORTH PIT|SOUTH PIT" }
            }
        }
    ],
    "default_fields": {
        "ticket_number": { "method": "text_regex", "regex": "\\d{8}" },
        "ticket_date": { "method": "text_regex", "regex": "\\d{2}/\\d{2}/\\d{4}" }
    },
    "synonyms": {
        "job": { "riverside": "Riverside Phase 2", "hillside": "Hillside Cap" }
    }
}"#;

/// Seeds the reference entities the catalog's pages resolve against.
pub fn seed_refs(db: &Database) {
    db::ref_repo::insert(db, RefCategory::Job, "Riverside Phase 2", false).unwrap();
    db::ref_repo::insert(db, RefCategory::Job, "Hillside Cap", false).unwrap();
    db::ref_repo::insert(db, RefCategory::Material, "Contaminated Soil", true).unwrap();
    db::ref_repo::insert(db, RefCategory::Material, "Clean Fill", false).unwrap();
    db::ref_repo::insert(db, RefCategory::Source, "North Pit", false).unwrap();
    db::ref_repo::insert(db, RefCategory::Source, "South Pit", false).unwrap();
    db::ref_repo::insert(db, RefCategory::Vendor, "APEX", false).unwrap();
    db::ref_repo::insert(db, RefCategory::Vendor, "BRAVO", false).unwrap();
}

static TRACING: Once = Once::new();

/// Installs a fmt subscriber once per test binary so pipeline span
/// output shows up under `--nocapture`. Filter via `RUST_LOG`.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// A fresh in-memory database with references seeded, plus a pipeline
/// wired to it.
pub fn pipeline_fixture() -> (Database, Arc<Pipeline>) {
    init_tracing();
    let db = Database::open_in_memory().unwrap();
    seed_refs(&db);

    let catalog = load_catalog_from_str(CATALOG).unwrap();
    let config = Arc::new(PipelineConfig::new(catalog));
    let refs = Arc::new(ReferenceCache::preload(&db).unwrap());
    let pipeline = Arc::new(Pipeline::from_config(config, db.clone(), refs).unwrap());
    (db, pipeline)
}

/// Writes a document file (empty, only its bytes are hashed) and its
/// `.ocr.json` sidecar containing a single page with the given text.
pub fn write_ticket_file(dir: &Path, name: &str, page_text: &str) -> PathBuf {
    write_multipage_file(dir, name, &[page_text])
}

pub fn write_multipage_file(dir: &Path, name: &str, page_texts: &[&str]) -> PathBuf {
    let doc = dir.join(name);
    // Distinct content per file so ledger hashes differ.
    std::fs::write(&doc, name.as_bytes()).unwrap();

    let pages: Vec<serde_json::Value> = page_texts
        .iter()
        .map(|t| serde_json::json!({ "text": t }))
        .collect();
    let dump = serde_json::json!({ "pages": pages });
    std::fs::write(
        dir.join(format!("{name}.ocr.json")),
        serde_json::to_string_pretty(&dump).unwrap(),
    )
    .unwrap();
    doc
}

/// Page text for a fully clean APEX ticket.
pub fn apex_page(ticket_number: &str, date_mdy: &str) -> String {
    format!(
        "APEX HAULING INC\n\
         Ticket No: {ticket_number}\n\
         Date: {date_mdy}\n\
         Job: RIVERSIDE\n\
         Material: CONTAMINATED SOIL\n\
         Manifest: MAN1234567\n\
         Qty: 14.2 TONS\n\
         Source: NORTH PIT"
    )
}

/// Recent date formatted the way the tickets print it.
pub fn recent_date(days_ago: i64) -> String {
    (chrono::Utc::now().date_naive() - chrono::Duration::days(days_ago))
        .format("%m/%d/%Y")
        .to_string()
}
