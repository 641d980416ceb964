pub mod ocr;
pub mod reference;
pub mod review;
pub mod run;
pub mod ticket;

pub use ocr::{BBox, OcrLine, OcrPage, OcrWord, PageMeta};
pub use reference::{RefCategory, ReferenceEntity};
pub use review::{PageRef, Problem, ReviewQueueEntry, ReviewReason, Severity};
pub use run::{ProcessingRun, RunStatus};
pub use ticket::{QuantityUnit, TicketType, TruckTicket};
