pub mod batch;
pub mod job;
pub mod pool;

pub use batch::{BatchConfig, BatchProcessor, BatchProgress, BatchSummary};
pub use job::{FileJob, FileOutcome, FileResult};
pub use pool::WorkerPool;
