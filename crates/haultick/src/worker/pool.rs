use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use log::{debug, error, info};

use crate::db::Database;
use crate::error::WorkerError;
use crate::ocr::OcrEngine;
use crate::pipeline::Pipeline;
use crate::worker::batch::{process_file, RetryPolicy};
use crate::worker::job::{FileJob, FileResult};

pub struct WorkerPool {
    job_sender: Sender<FileJob>,
    result_receiver: Receiver<FileResult>,
    workers: Vec<JoinHandle<()>>,
    cancel: Arc<AtomicBool>,
}

impl WorkerPool {
    /// Starts `worker_count` threads pulling file jobs off a bounded
    /// channel. Results go out unbounded so workers never block on a slow
    /// consumer.
    ///
    /// # Panics
    /// Panics if `worker_count` is 0.
    pub fn new(
        pipeline: Arc<Pipeline>,
        engine: Arc<dyn OcrEngine>,
        db: Database,
        retry: RetryPolicy,
        worker_count: usize,
        cancel: Arc<AtomicBool>,
    ) -> Self {
        assert!(worker_count > 0, "worker_count must be > 0");
        let (job_sender, job_receiver) = bounded::<FileJob>(worker_count * 2);
        let (result_sender, result_receiver) = unbounded::<FileResult>();

        let mut workers = Vec::with_capacity(worker_count);

        for worker_id in 0..worker_count {
            let job_rx = job_receiver.clone();
            let result_tx = result_sender.clone();
            let cancel_flag = Arc::clone(&cancel);
            let worker_pipeline = Arc::clone(&pipeline);
            let worker_engine = Arc::clone(&engine);
            let worker_db = db.clone();

            let handle = thread::spawn(move || {
                run_worker(
                    worker_id,
                    job_rx,
                    result_tx,
                    cancel_flag,
                    worker_pipeline,
                    worker_engine,
                    worker_db,
                    retry,
                );
            });

            workers.push(handle);
        }

        info!("Started {} workers", worker_count);

        Self {
            job_sender,
            result_receiver,
            workers,
            cancel,
        }
    }

    pub fn submit(&self, job: FileJob) -> Result<(), WorkerError> {
        self.job_sender
            .send(job)
            .map_err(|_| WorkerError::ChannelClosed)
    }

    pub fn recv_result(&self) -> Option<FileResult> {
        self.result_receiver.recv().ok()
    }

    /// Requests cancellation. Workers finish the page they are on, roll
    /// back their in-flight file, and drain the rest of the queue as
    /// SKIPPED so every submitted job still yields a result.
    pub fn cancel(&self) {
        info!("Cancelling worker pool...");
        self.cancel.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    pub fn wait(self) {
        // Drop sender to signal workers to exit
        drop(self.job_sender);

        for (i, worker) in self.workers.into_iter().enumerate() {
            if let Err(e) = worker.join() {
                error!("Worker {} panicked: {:?}", i, e);
            } else {
                debug!("Worker {} finished", i);
            }
        }

        info!("All workers have stopped");
    }
}

#[allow(clippy::too_many_arguments)]
fn run_worker(
    worker_id: usize,
    job_receiver: Receiver<FileJob>,
    result_sender: Sender<FileResult>,
    cancel: Arc<AtomicBool>,
    pipeline: Arc<Pipeline>,
    engine: Arc<dyn OcrEngine>,
    db: Database,
    retry: RetryPolicy,
) {
    debug!("Worker {} started", worker_id);

    // Loop until the job channel disconnects. Cancellation does not break
    // the loop: remaining jobs must still be drained into SKIPPED results.
    while let Ok(job) = job_receiver.recv() {
        debug!("Worker {} processing file: {:?}", worker_id, job.path);

        let result = process_file(&pipeline, engine.as_ref(), &db, &job, retry, &cancel);

        if result_sender.send(result).is_err() {
            error!("Worker {} failed to send result", worker_id);
            break;
        }
    }

    debug!("Worker {} stopped", worker_id);
}
