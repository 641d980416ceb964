use crate::model::Severity;

use super::context::PagePhase;

/// Events emitted while a page moves through the pipeline. Raw OCR text
/// is never included; listeners that need it read the page dump.
pub enum ProgressEvent {
    Phase { phase: PagePhase, message: String },
    Committed { ticket_id: i64 },
    Queued { severity: Severity },
    Failed { error: String },
}

pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// No-op reporter for unit tests.
pub struct NoopProgress;

impl ProgressReporter for NoopProgress {
    fn report(&self, _event: ProgressEvent) {}
}
