// Use case: reserve_and_run_one.

use crate::application::context::AppContext;
use crate::application::usecases::find_available_jobs::{
    FindAvailableJobsError, FindAvailableJobsUseCase,
};
use crate::application::usecases::lock_job::{LockJobError, LockJobUseCase};
use crate::application::usecases::reschedule_job::{RescheduleJobError, RescheduleJobUseCase};
use crate::config::WorkerSettings;
use crate::domain::entities::job::Job;
use crate::domain::value_objects::ids::WorkerId;
use crate::domain::workflows::payload_registry::PayloadError;
use crate::domain::workflows::retry_policy::RetryPolicy;
use crate::infrastructure::db::repositories::job_repository::JobRepositoryError;
use metrics::{counter, histogram};
use time::Duration;
use tracing::{error, info, instrument, warn};

/// Configuration for reservation, execution and retries.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Lock staleness window. Runs longer than this are logged, not aborted.
    pub max_run_time: Duration,
    pub retry_policy: RetryPolicy,
    pub min_priority: Option<i32>,
    pub max_priority: Option<i32>,
    pub candidate_limit: usize,
    pub batch_size: usize,
    pub poll_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self::from_settings(&WorkerSettings::default())
    }
}

impl WorkerConfig {
    pub fn from_settings(settings: &WorkerSettings) -> Self {
        Self {
            max_run_time: Duration::seconds(
                i64::try_from(settings.max_run_time_seconds).unwrap_or(i64::MAX),
            ),
            retry_policy: RetryPolicy {
                max_attempts: settings.max_attempts,
                destroy_failed_jobs: settings.destroy_failed_jobs,
            },
            min_priority: settings.min_priority,
            max_priority: settings.max_priority,
            candidate_limit: settings.candidate_limit.max(1),
            batch_size: settings.batch_size.max(1),
            poll_interval: Duration::milliseconds(
                i64::try_from(settings.poll_interval_ms).unwrap_or(i64::MAX),
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Success,
    Failure,
    NoWork,
}

/// Selects, locks and runs at most one job.
pub struct ReserveAndRunOneUseCase;

/// Store failures only; job failures become a reschedule instead.
#[derive(Debug)]
pub enum ReserveAndRunOneError {
    Selection(FindAvailableJobsError),
    Lock(LockJobError),
    Reschedule(RescheduleJobError),
    Storage(JobRepositoryError),
}

impl ReserveAndRunOneUseCase {
    #[instrument(skip(ctx, worker, config), fields(worker = %worker))]
    pub async fn execute(
        ctx: &AppContext,
        worker: &WorkerId,
        config: &WorkerConfig,
    ) -> Result<RunOutcome, ReserveAndRunOneError> {
        // Step 1: Fetch a shuffled shortlist.
        let candidates =
            FindAvailableJobsUseCase::execute(ctx, worker, config.candidate_limit, config)
                .await
                .map_err(ReserveAndRunOneError::Selection)?;

        // Step 2: Run the first one we manage to lock.
        for mut job in candidates {
            let locked = LockJobUseCase::execute(ctx, &mut job, worker, config.max_run_time)
                .await
                .map_err(ReserveAndRunOneError::Lock)?;
            if locked {
                return Self::run(ctx, job, config).await;
            }
        }

        Ok(RunOutcome::NoWork)
    }

    /// Run a job this worker already holds the lock on.
    pub async fn run(
        ctx: &AppContext,
        job: Job,
        config: &WorkerConfig,
    ) -> Result<RunOutcome, ReserveAndRunOneError> {
        let job_id = job.id.clone().map(|id| id.0).unwrap_or_default();
        let job_name = job.name(&ctx.registry);

        // Step 1: Decode and invoke, timing the whole run.
        let started = tokio::time::Instant::now();
        let result = Self::perform(ctx, &job).await;
        let elapsed = started.elapsed();
        let runtime_ms = elapsed.as_millis() as u64;

        counter!("jobs_processed_total").increment(1);
        histogram!("job_runtime_seconds").record(elapsed.as_secs_f64());
        if Duration::try_from(elapsed).map_or(true, |runtime| runtime > config.max_run_time) {
            warn!(job_id = %job_id, job_name = %job_name, runtime_ms, "job_exceeded_max_run_time");
        }

        match result {
            // Step 2: Success removes the job.
            Ok(()) => {
                ctx.repos
                    .job
                    .destroy(job)
                    .await
                    .map_err(ReserveAndRunOneError::Storage)?;

                counter!("jobs_succeeded_total").increment(1);
                info!(job_id = %job_id, job_name = %job_name, runtime_ms, "job_completed");
                Ok(RunOutcome::Success)
            }
            // Step 3: Failure goes through the retry policy.
            Err(err) => {
                counter!("jobs_failed_total").increment(1);
                error!(
                    job_id = %job_id,
                    job_name = %job_name,
                    attempts = job.attempts,
                    error = %err,
                    "job_failed"
                );

                let now = ctx.clock.now();
                RescheduleJobUseCase::execute(
                    ctx,
                    job,
                    &err.message,
                    &err.trace,
                    now,
                    &config.retry_policy,
                )
                .await
                .map_err(ReserveAndRunOneError::Reschedule)?;
                Ok(RunOutcome::Failure)
            }
        }
    }

    /// Invoke the payload on its own task so a panic fails only this job.
    async fn perform(ctx: &AppContext, job: &Job) -> Result<(), PayloadError> {
        let payload = job
            .payload_object(&ctx.registry)
            .map_err(|e| PayloadError::new(e.to_string()).with_context("payload_object"))?;

        match tokio::spawn(async move { payload.perform().await }).await {
            Ok(result) => result,
            Err(join_err) => Err(PayloadError::new(format!("job panicked: {join_err}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ReserveAndRunOneError, ReserveAndRunOneUseCase, RunOutcome, WorkerConfig};
    use crate::application::context::test_support::{
        Fails, Panics, SUCCEEDED_RUNS, Succeeds, null_context, start, test_context,
    };
    use crate::application::usecases::enqueue_job::{EnqueueJobCommand, EnqueueJobUseCase};
    use crate::config::WorkerSettings;
    use crate::domain::entities::job::Job;
    use crate::domain::value_objects::ids::WorkerId;
    use std::sync::atomic::Ordering;
    use time::Duration;

    fn worker() -> WorkerId {
        WorkerId::from("host:test pid:1")
    }

    #[test]
    fn given_worker_settings_when_converted_should_carry_every_knob() {
        let settings = WorkerSettings {
            max_attempts: 3,
            max_run_time_seconds: 60,
            destroy_failed_jobs: false,
            min_priority: Some(1),
            candidate_limit: 0,
            poll_interval_ms: 250,
            ..WorkerSettings::default()
        };

        let config = WorkerConfig::from_settings(&settings);

        assert_eq!(config.max_run_time, Duration::seconds(60));
        assert_eq!(config.retry_policy.max_attempts, 3);
        assert!(!config.retry_policy.destroy_failed_jobs);
        assert_eq!(config.min_priority, Some(1));
        assert_eq!(config.candidate_limit, 1);
        assert_eq!(config.poll_interval, Duration::milliseconds(250));
    }

    #[tokio::test]
    async fn given_single_job_when_run_once_should_succeed_and_remove_it() {
        let (ctx, _clock) = test_context();
        let job = EnqueueJobUseCase::execute(&ctx, EnqueueJobCommand::new(Succeeds))
            .await
            .unwrap();
        let before = SUCCEEDED_RUNS.load(Ordering::SeqCst);

        let outcome = ReserveAndRunOneUseCase::execute(&ctx, &worker(), &WorkerConfig::default())
            .await
            .unwrap();

        assert_eq!(outcome, RunOutcome::Success);
        assert!(SUCCEEDED_RUNS.load(Ordering::SeqCst) > before);
        assert_eq!(ctx.repos.job.reload(&job).await.unwrap(), None);
    }

    #[tokio::test]
    async fn given_empty_queue_when_run_once_should_report_no_work() {
        let (ctx, _clock) = test_context();

        let outcome = ReserveAndRunOneUseCase::execute(&ctx, &worker(), &WorkerConfig::default())
            .await
            .unwrap();

        assert_eq!(outcome, RunOutcome::NoWork);
    }

    #[tokio::test]
    async fn given_failing_job_when_run_once_should_reschedule_with_error() {
        let (ctx, _clock) = test_context();
        let job = EnqueueJobUseCase::execute(&ctx, EnqueueJobCommand::new(Fails))
            .await
            .unwrap();

        let outcome = ReserveAndRunOneUseCase::execute(&ctx, &worker(), &WorkerConfig::default())
            .await
            .unwrap();

        assert_eq!(outcome, RunOutcome::Failure);
        let stored = ctx.repos.job.reload(&job).await.unwrap().unwrap();
        assert_eq!(stored.attempts, 1);
        assert_eq!(stored.run_at, Some(start() + Duration::seconds(5)));
        assert_eq!(stored.last_error.as_deref(), Some("always fails\nfails.rs:1"));
        assert!(!stored.is_locked());
    }

    #[tokio::test]
    async fn given_panicking_job_when_run_once_should_count_as_failure() {
        let (ctx, _clock) = test_context();
        let job = EnqueueJobUseCase::execute(&ctx, EnqueueJobCommand::new(Panics))
            .await
            .unwrap();

        let outcome = ReserveAndRunOneUseCase::execute(&ctx, &worker(), &WorkerConfig::default())
            .await
            .unwrap();

        assert_eq!(outcome, RunOutcome::Failure);
        let stored = ctx.repos.job.reload(&job).await.unwrap().unwrap();
        assert_eq!(stored.attempts, 1);
        assert!(stored.last_error.unwrap().contains("panicked"));
    }

    #[tokio::test]
    async fn given_undecodable_handler_when_run_once_should_reschedule() {
        let (ctx, _clock) = test_context();
        let mut job = Job::new(r#"{"kind":"retired","data":{}}"#);
        ctx.repos.job.insert(&mut job, start()).await.unwrap();

        let outcome = ReserveAndRunOneUseCase::execute(&ctx, &worker(), &WorkerConfig::default())
            .await
            .unwrap();

        assert_eq!(outcome, RunOutcome::Failure);
        let stored = ctx.repos.job.reload(&job).await.unwrap().unwrap();
        assert_eq!(stored.attempts, 1);
        assert!(stored.last_error.unwrap().contains("retired"));
    }

    #[tokio::test]
    async fn given_only_foreign_locked_jobs_when_run_once_should_report_no_work() {
        let (ctx, _clock) = test_context();
        let job = EnqueueJobUseCase::execute(&ctx, EnqueueJobCommand::new(Succeeds))
            .await
            .unwrap();
        ctx.repos
            .job
            .lock_unowned(job.id.as_ref().unwrap(), &WorkerId::from("other"), start(), start())
            .await
            .unwrap();

        let outcome = ReserveAndRunOneUseCase::execute(&ctx, &worker(), &WorkerConfig::default())
            .await
            .unwrap();

        assert_eq!(outcome, RunOutcome::NoWork);
        assert!(ctx.repos.job.reload(&job).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn given_unavailable_store_when_run_once_should_propagate() {
        let ctx = null_context();

        let result =
            ReserveAndRunOneUseCase::execute(&ctx, &worker(), &WorkerConfig::default()).await;

        assert!(matches!(result, Err(ReserveAndRunOneError::Selection(_))));
    }
}
