//! Batch processor: fans a list of files out over the worker pool,
//! retries transient OCR failures, rolls back files that fail partway,
//! and seals an audit run record when everything has drained.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};

use crate::db::{self, Database};
use crate::error::HaultickError;
use crate::model::{PageMeta, ProcessingRun, RunStatus, Severity};
use crate::ocr::OcrEngine;
use crate::pipeline::{NoopProgress, PageContext, PageOutcome, Pipeline};
use crate::worker::job::{FileJob, FileOutcome, FileResult};
use crate::worker::pool::WorkerPool;

/// Retry behaviour for transient OCR failures. Attempt N sleeps
/// `backoff * 2^N` before retrying.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff: Duration::from_millis(200),
        }
    }
}

pub struct BatchConfig {
    pub worker_count: usize,
    pub retry: RetryPolicy,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            worker_count: num_cpus::get(),
            retry: RetryPolicy::default(),
        }
    }
}

/// Running totals reported after each file completes.
#[derive(Debug, Clone, Copy)]
pub struct BatchProgress {
    pub files_done: u32,
    pub files_total: u32,
    pub pages: u32,
    pub ok: u32,
    pub errors: u32,
    pub review: u32,
    pub skipped: u32,
}

#[derive(Debug, Clone)]
pub struct BatchSummary {
    pub request_guid: String,
    pub files: u32,
    pub pages: u32,
    pub ok: u32,
    pub errors: u32,
    pub review: u32,
    pub skipped: u32,
    pub results: Vec<FileResult>,
}

pub struct BatchProcessor {
    pipeline: Arc<Pipeline>,
    engine: Arc<dyn OcrEngine>,
    db: Database,
    config: BatchConfig,
}

impl BatchProcessor {
    pub fn new(
        pipeline: Arc<Pipeline>,
        engine: Arc<dyn OcrEngine>,
        db: Database,
        config: BatchConfig,
    ) -> Self {
        Self {
            pipeline,
            engine,
            db,
            config,
        }
    }

    /// Processes every file, blocking until all results are in. The
    /// cancel flag may be flipped from another thread; files not yet
    /// started come back SKIPPED.
    pub fn run(
        &self,
        files: Vec<PathBuf>,
        cancel: Arc<AtomicBool>,
        mut on_progress: impl FnMut(BatchProgress),
    ) -> Result<BatchSummary, HaultickError> {
        let mut run = ProcessingRun::start(files.len() as u32);
        db::run_repo::create(&self.db, &run)?;
        info!("Batch {} started: {} files", run.request_guid, files.len());

        let pool = WorkerPool::new(
            Arc::clone(&self.pipeline),
            Arc::clone(&self.engine),
            self.db.clone(),
            self.config.retry,
            self.config.worker_count.max(1),
            cancel,
        );

        // Submission happens on a helper thread: the job channel is
        // bounded, so submitting and receiving from the same thread could
        // deadlock on large batches.
        let files_total = files.len() as u32;
        let jobs: Vec<FileJob> = files.into_iter().map(FileJob::new).collect();
        let pool_ref = &pool;
        let submitter = move || {
            for job in jobs {
                if pool_ref.submit(job).is_err() {
                    warn!("Job channel closed before all files were submitted");
                    break;
                }
            }
        };

        let mut results = Vec::with_capacity(files_total as usize);
        let mut progress = BatchProgress {
            files_done: 0,
            files_total,
            pages: 0,
            ok: 0,
            errors: 0,
            review: 0,
            skipped: 0,
        };

        std::thread::scope(|scope| {
            scope.spawn(submitter);

            for _ in 0..files_total {
                let result = match pool.recv_result() {
                    Some(r) => r,
                    None => break,
                };
                self.tally(&mut run, &mut progress, &result);
                on_progress(progress);
                results.push(result);
            }
        });

        pool.wait();

        let status = if progress.errors > 0 {
            RunStatus::Failed
        } else {
            RunStatus::Completed
        };
        run.seal(status);
        db::run_repo::seal(&self.db, &run)?;
        info!(
            "Batch {} sealed: {} ok, {} errors, {} review, {} skipped",
            run.request_guid, progress.ok, progress.errors, progress.review, progress.skipped
        );

        Ok(BatchSummary {
            request_guid: run.request_guid,
            files: files_total,
            pages: progress.pages,
            ok: progress.ok,
            errors: progress.errors,
            review: progress.review,
            skipped: progress.skipped,
            results,
        })
    }

    fn tally(&self, run: &mut ProcessingRun, progress: &mut BatchProgress, result: &FileResult) {
        progress.files_done += 1;
        progress.pages += result.pages;

        let (ok, errors, review, skipped) = match &result.outcome {
            FileOutcome::Processed {
                committed, queued, ..
            } => (*committed, 0, *queued, 0),
            FileOutcome::AlreadyProcessed { .. } => (0, 0, 0, 0),
            FileOutcome::Skipped => (0, 0, 0, 1),
            FileOutcome::Failed { .. } => (0, 1, 0, 0),
        };
        progress.ok += ok;
        progress.errors += errors;
        progress.review += review;
        progress.skipped += skipped;

        if let Err(e) = db::run_repo::bump(
            &self.db,
            &run.request_guid,
            result.pages,
            ok,
            errors,
            review,
            skipped,
        ) {
            warn!("Failed to update run counters: {}", e);
        }
    }
}

/// Processes a single file end to end. Called from worker threads.
///
/// Pages run sequentially: tickets on a multi-page file often share
/// context, and a page failure must be able to roll back its siblings.
pub(crate) fn process_file(
    pipeline: &Pipeline,
    engine: &dyn OcrEngine,
    db: &Database,
    job: &FileJob,
    retry: RetryPolicy,
    cancel: &AtomicBool,
) -> FileResult {
    if cancel.load(Ordering::Relaxed) {
        return FileResult {
            job_id: job.id.clone(),
            path: job.path.clone(),
            pages: 0,
            outcome: FileOutcome::Skipped,
        };
    }

    let file_hash = match job.compute_hash() {
        Ok(h) => h,
        Err(e) => return failed(job, 0, e.to_string()),
    };

    // Ledger hit: this exact content was already processed.
    match db::file_ledger::find_by_hash(db, &file_hash) {
        Ok(Some(entry)) => {
            info!("Skipping {} (already processed)", job.path.display());
            return FileResult {
                job_id: job.id.clone(),
                path: job.path.clone(),
                pages: 0,
                outcome: FileOutcome::AlreadyProcessed {
                    ticket_ids: entry.ticket_ids,
                },
            };
        }
        Ok(None) => {}
        Err(e) => return failed(job, 0, e.to_string()),
    }

    let pages = match ocr_with_retry(engine, job, retry) {
        Ok(p) => p,
        Err(reason) => return failed(job, 0, reason),
    };

    let mut ticket_ids: Vec<i64> = Vec::new();
    let mut committed = 0u32;
    let mut queued = 0u32;
    let mut worst: Option<Severity> = None;
    let mut pages_done = 0u32;

    for (idx, page) in pages.into_iter().enumerate() {
        let page_number = idx as u32 + 1;
        let meta = PageMeta {
            file_id: job.path.clone(),
            page_number,
            file_hash: file_hash.clone(),
        };
        let mut ctx = PageContext::new(page, meta);
        if let Some(img) = page_image(&job.path, page_number) {
            ctx = ctx.with_image(img);
        }
        let (result, _ctx) = pipeline.run(ctx, &NoopProgress);
        pages_done += 1;

        match result {
            Ok(PageOutcome::Committed { ticket_id, .. }) => {
                ticket_ids.push(ticket_id);
                committed += 1;
            }
            Ok(PageOutcome::Queued { severity, .. }) => {
                queued += 1;
                worst = worst.max(Some(severity));
            }
            Err(e) => {
                rollback(db, job, &ticket_ids);
                return failed(job, pages_done, e.to_string());
            }
        }

        if cancel.load(Ordering::Relaxed) {
            // Finish nothing further; a partially processed file is
            // rolled back so a re-run starts clean.
            rollback(db, job, &ticket_ids);
            return FileResult {
                job_id: job.id.clone(),
                path: job.path.clone(),
                pages: pages_done,
                outcome: FileOutcome::Skipped,
            };
        }
    }

    if let Err(e) = db::file_ledger::record(db, &file_hash, &job.path.to_string_lossy(), &ticket_ids)
    {
        rollback(db, job, &ticket_ids);
        return failed(job, pages_done, e.to_string());
    }

    FileResult {
        job_id: job.id.clone(),
        path: job.path.clone(),
        pages: pages_done,
        outcome: FileOutcome::Processed {
            ticket_ids,
            committed,
            queued,
            worst_severity: worst,
        },
    }
}

/// Optional grayscale scan of one page, next to the document in the same
/// style as the `.ocr.json` sidecar: `<file>.p<N>.png`. Feeds logo
/// matching; a missing or unreadable image degrades to text-only
/// vendor detection.
fn page_image(path: &Path, page_number: u32) -> Option<image::GrayImage> {
    let mut name = path.as_os_str().to_os_string();
    name.push(format!(".p{page_number}.png"));
    let sidecar = PathBuf::from(name);
    if !sidecar.is_file() {
        return None;
    }
    match image::open(&sidecar) {
        Ok(img) => Some(img.to_luma8()),
        Err(e) => {
            warn!("Unreadable page image {}: {}", sidecar.display(), e);
            None
        }
    }
}

fn ocr_with_retry(
    engine: &dyn OcrEngine,
    job: &FileJob,
    retry: RetryPolicy,
) -> Result<Vec<crate::model::OcrPage>, String> {
    let mut attempt = 0u32;
    loop {
        match engine.pages(&job.path) {
            Ok(pages) => return Ok(pages),
            Err(e) if e.is_transient() && attempt < retry.max_retries => {
                let delay = retry.backoff * 2u32.pow(attempt);
                warn!(
                    "OCR attempt {} failed for {} ({}); retrying in {:?}",
                    attempt + 1,
                    job.path.display(),
                    e,
                    delay
                );
                std::thread::sleep(delay);
                attempt += 1;
            }
            Err(e) => {
                let attempts = attempt + 1;
                return Err(crate::error::WorkerError::RetriesExhausted {
                    attempts,
                    reason: e.to_string(),
                }
                .to_string());
            }
        }
    }
}

/// Deletes any tickets this file committed. Failure to roll back is
/// logged loudly; the file result still reports the original failure.
fn rollback(db: &Database, job: &FileJob, ticket_ids: &[i64]) {
    if ticket_ids.is_empty() {
        return;
    }
    match db::ticket_repo::delete_many(db, ticket_ids) {
        Ok(_) => info!(
            "Rolled back {} tickets from {}",
            ticket_ids.len(),
            job.path.display()
        ),
        Err(e) => log::error!(
            "Rollback of {} failed, tickets {:?} are orphaned: {}",
            job.path.display(),
            ticket_ids,
            e
        ),
    }
}

fn failed(job: &FileJob, pages: u32, error: String) -> FileResult {
    FileResult {
        job_id: job.id.clone(),
        path: job.path.clone(),
        pages,
        outcome: FileOutcome::Failed { error },
    }
}
