// Use case: lock_job.

use crate::application::context::AppContext;
use crate::domain::entities::job::Job;
use crate::domain::value_objects::ids::WorkerId;
use crate::infrastructure::db::repositories::job_repository::JobRepositoryError;
use metrics::counter;
use time::Duration;
use tracing::{debug, warn};

/// Claims one job for one worker through a single conditional write.
pub struct LockJobUseCase;

#[derive(Debug)]
pub enum LockJobError {
    NotPersisted,
    Storage(JobRepositoryError),
}

impl LockJobUseCase {
    /// Returns `true` when `worker` now holds the lock. Losing a race is `Ok(false)`.
    ///
    /// On success the in-memory job carries the new lock fields.
    pub async fn execute(
        ctx: &AppContext,
        job: &mut Job,
        worker: &WorkerId,
        max_run_time: Duration,
    ) -> Result<bool, LockJobError> {
        let id = job.id.clone().ok_or(LockJobError::NotPersisted)?;
        let now = ctx.clock.now();
        debug!(job_id = %id, worker = %worker, "job_lock_attempt");

        // Step 1: Refresh our own lock, or take a free or stale one.
        let affected = if job.is_locked_by(worker) {
            ctx.repos.job.refresh_own_lock(&id, worker, now).await
        } else {
            ctx.repos
                .job
                .lock_unowned(&id, worker, now, now - max_run_time)
                .await
        }
        .map_err(LockJobError::Storage)?;

        // Step 2: Exactly one changed record means we won.
        if affected != 1 {
            counter!("job_lock_conflicts_total").increment(1);
            warn!(job_id = %id, worker = %worker, "job_lock_lost");
            return Ok(false);
        }

        job.locked_at = Some(now);
        job.locked_by = Some(worker.clone());
        Ok(true)
    }
}
