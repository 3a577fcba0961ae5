// Use case: work_off.

use crate::application::context::AppContext;
use crate::application::usecases::reserve_and_run_one::{
    ReserveAndRunOneError, ReserveAndRunOneUseCase, RunOutcome, WorkerConfig,
};
use crate::domain::value_objects::ids::WorkerId;
use tokio::sync::watch;

/// Counts from one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkOffStats {
    pub success: usize,
    pub failure: usize,
}

impl WorkOffStats {
    pub fn total(&self) -> usize {
        self.success + self.failure
    }
}

/// Runs jobs back to back until the batch is done or the queue is empty.
pub struct WorkOffUseCase;

#[derive(Debug)]
pub enum WorkOffError {
    Worker(ReserveAndRunOneError),
}

impl WorkOffUseCase {
    /// Run up to `max_jobs` jobs. Stops early on an empty queue or once `shutdown` is true.
    pub async fn execute(
        ctx: &AppContext,
        worker: &WorkerId,
        config: &WorkerConfig,
        max_jobs: usize,
        shutdown: &watch::Receiver<bool>,
    ) -> Result<WorkOffStats, WorkOffError> {
        let mut stats = WorkOffStats::default();

        for _ in 0..max_jobs {
            if *shutdown.borrow() {
                break;
            }

            match ReserveAndRunOneUseCase::execute(ctx, worker, config)
                .await
                .map_err(WorkOffError::Worker)?
            {
                RunOutcome::Success => stats.success += 1,
                RunOutcome::Failure => stats.failure += 1,
                RunOutcome::NoWork => break,
            }
        }

        Ok(stats)
    }
}
