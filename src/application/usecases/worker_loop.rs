// Use case: worker_loop.

use crate::application::context::AppContext;
use crate::application::usecases::reserve_and_run_one::WorkerConfig;
use crate::application::usecases::work_off::{WorkOffError, WorkOffUseCase};
use crate::domain::value_objects::ids::WorkerId;
use crate::infrastructure::db::repositories::job_repository::JobRepositoryError;
use tracing::{info, warn};

/// Runs batches continuously until a shutdown signal is received.
pub struct WorkerLoopUseCase;

#[derive(Debug)]
pub enum WorkerLoopError {
    Worker(WorkOffError),
    ClearLocks(JobRepositoryError),
}

impl WorkerLoopUseCase {
    /// Run the worker loop, sleeping `poll_interval` whenever a batch found nothing.
    ///
    /// Locks still held by `worker` are released on the way out, even on error.
    pub async fn run(
        ctx: &AppContext,
        worker: &WorkerId,
        config: &WorkerConfig,
        mut shutdown: tokio::sync::watch::Receiver<bool>,
    ) -> Result<(), WorkerLoopError> {
        info!(worker = %worker, "worker_started");

        // Step 1: Work until told to stop.
        let result = Self::poll(ctx, worker, config, &mut shutdown).await;

        // Step 2: Release our locks whatever happened.
        let cleared = ctx.repos.job.clear_locks(worker).await;
        info!(worker = %worker, "worker_stopped");

        result?;
        let released = cleared.map_err(WorkerLoopError::ClearLocks)?;
        if released > 0 {
            warn!(worker = %worker, released, "worker_released_locks");
        }
        Ok(())
    }

    async fn poll(
        ctx: &AppContext,
        worker: &WorkerId,
        config: &WorkerConfig,
        shutdown: &mut tokio::sync::watch::Receiver<bool>,
    ) -> Result<(), WorkerLoopError> {
        loop {
            if *shutdown.borrow() {
                break;
            }

            // Work off one batch.
            let started = tokio::time::Instant::now();
            let stats = WorkOffUseCase::execute(ctx, worker, config, config.batch_size, shutdown)
                .await
                .map_err(WorkerLoopError::Worker)?;

            if stats.total() > 0 {
                let seconds = started.elapsed().as_secs_f64();
                info!(
                    worker = %worker,
                    processed = stats.total(),
                    failed = stats.failure,
                    jobs_per_second = stats.total() as f64 / seconds.max(f64::EPSILON),
                    "worker_batch_complete"
                );
                continue;
            }

            // Empty queue: sleep until the next poll or shutdown.
            let sleep_duration =
                std::time::Duration::from_millis(config.poll_interval.whole_milliseconds().max(0) as u64);

            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
                _ = tokio::time::sleep(sleep_duration) => {}
            }
        }

        Ok(())
    }
}
