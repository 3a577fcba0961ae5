// Use case: find_available_jobs.

use crate::application::context::AppContext;
use crate::application::usecases::reserve_and_run_one::WorkerConfig;
use crate::domain::entities::job::Job;
use crate::domain::value_objects::ids::WorkerId;
use crate::infrastructure::db::repositories::job_repository::JobRepositoryError;
use rand::seq::SliceRandom;

/// Produces the shortlist of jobs a worker should try to lock.
pub struct FindAvailableJobsUseCase;

#[derive(Debug)]
pub enum FindAvailableJobsError {
    Storage(JobRepositoryError),
}

impl FindAvailableJobsUseCase {
    /// Up to `limit` available jobs, in random order.
    pub async fn execute(
        ctx: &AppContext,
        worker: &WorkerId,
        limit: usize,
        config: &WorkerConfig,
    ) -> Result<Vec<Job>, FindAvailableJobsError> {
        let mut candidates = Self::select_candidates(ctx, worker, limit, config).await?;

        // Spread concurrent workers across the shortlist instead of the head job.
        candidates.shuffle(&mut rand::rng());
        Ok(candidates)
    }

    /// The shortlist before shuffling: by priority descending, then earliest `run_at`.
    pub async fn select_candidates(
        ctx: &AppContext,
        worker: &WorkerId,
        limit: usize,
        config: &WorkerConfig,
    ) -> Result<Vec<Job>, FindAvailableJobsError> {
        // Step 1: Query due, unfailed jobs within the priority bounds.
        let now = ctx.clock.now();
        let due = ctx
            .repos
            .job
            .list_due(now, config.min_priority, config.max_priority)
            .await
            .map_err(FindAvailableJobsError::Storage)?;

        // Step 2: Keep jobs this worker may lock.
        let mut available: Vec<Job> = due
            .into_iter()
            .filter(|job| job.is_available(worker, now, config.max_run_time))
            .collect();

        // Step 3: Order and truncate.
        available.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| a.run_at.cmp(&b.run_at))
        });
        available.truncate(limit);

        Ok(available)
    }
}
