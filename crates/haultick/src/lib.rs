pub mod db;
pub mod error;
pub mod extract;
pub mod model;
pub mod ocr;
pub mod pipeline;
pub mod refdata;
pub mod review;
pub mod template;
pub mod validate;
pub mod worker;

pub use db::Database;
pub use error::{HaultickError, Result, TemplateError, WorkerError};
pub use extract::{FieldExtractor, SynonymTable, VendorDetector};
pub use model::{
    Problem, ReviewQueueEntry, ReviewReason, Severity, TicketType, TruckTicket,
};
pub use ocr::{JsonOcrEngine, OcrEngine, OcrError};
pub use pipeline::{PageContext, PageOutcome, Pipeline, PipelineConfig};
pub use refdata::ReferenceCache;
pub use template::{load_catalog, CatalogFile};
pub use worker::{BatchConfig, BatchProcessor, BatchSummary};
