// Use case: reschedule_job.

use crate::application::context::AppContext;
use crate::domain::entities::job::Job;
use crate::domain::value_objects::timestamps::Timestamp;
use crate::domain::workflows::retry_policy::{RetryDecision, RetryPolicy};
use crate::infrastructure::db::repositories::job_repository::JobRepositoryError;
use metrics::counter;
use tracing::warn;

/// Records a failed run: schedules a retry with backoff, or ends the job.
pub struct RescheduleJobUseCase;

#[derive(Debug)]
pub enum RescheduleJobError {
    Storage(JobRepositoryError),
}

/// Where a failed job ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RescheduleOutcome {
    Retried { attempts: u32, run_at: Timestamp },
    Destroyed,
    MarkedFailed,
}

impl RescheduleJobUseCase {
    pub async fn execute(
        ctx: &AppContext,
        mut job: Job,
        message: &str,
        trace: &[String],
        now: Timestamp,
        policy: &RetryPolicy,
    ) -> Result<RescheduleOutcome, RescheduleJobError> {
        let last_error = format!("{message}\n{}", trace.join("\n"));

        match policy.decide(job.attempts, now) {
            RetryDecision::Retry { attempts, run_at } => {
                // Step 1: Push the job back with the next attempt count.
                job.attempts = attempts;
                job.run_at = Some(run_at);
                job.last_error = Some(last_error);
                job.unlock();
                ctx.repos
                    .job
                    .save(&mut job, now)
                    .await
                    .map_err(RescheduleJobError::Storage)?;

                Ok(RescheduleOutcome::Retried { attempts, run_at })
            }
            RetryDecision::Destroy => {
                // Step 1: Drop the job for good.
                let name = job.name(&ctx.registry);
                let attempts = job.attempts;
                let id = job.id.clone();
                ctx.repos
                    .job
                    .destroy(job)
                    .await
                    .map_err(RescheduleJobError::Storage)?;

                counter!("jobs_permanently_failed_total").increment(1);
                warn!(
                    job_id = %id.as_ref().map(|id| id.as_str()).unwrap_or(""),
                    job_name = %name,
                    attempts,
                    "job_permanently_removed"
                );
                Ok(RescheduleOutcome::Destroyed)
            }
            RetryDecision::MarkFailed => {
                // Step 1: Keep the job for inspection, out of every future selection.
                job.failed_at = Some(now);
                job.last_error = Some(last_error);
                job.unlock();
                ctx.repos
                    .job
                    .save(&mut job, now)
                    .await
                    .map_err(RescheduleJobError::Storage)?;

                counter!("jobs_permanently_failed_total").increment(1);
                warn!(
                    job_id = %job.id.as_ref().map(|id| id.as_str()).unwrap_or(""),
                    job_name = %job.name(&ctx.registry),
                    attempts = job.attempts,
                    "job_permanently_failed"
                );
                Ok(RescheduleOutcome::MarkedFailed)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{RescheduleJobError, RescheduleJobUseCase, RescheduleOutcome};
    use crate::application::context::test_support::{Fails, null_context, start, test_context};
    use crate::application::usecases::enqueue_job::{EnqueueJobCommand, EnqueueJobUseCase};
    use crate::domain::entities::job::Job;
    use crate::domain::value_objects::ids::{JobId, WorkerId};
    use crate::domain::workflows::retry_policy::RetryPolicy;
    use time::Duration;

    fn trace() -> Vec<String> {
        vec!["a.rs:1".to_string(), "b.rs:2".to_string()]
    }

    #[tokio::test]
    async fn given_retryable_job_when_rescheduled_should_back_off_and_unlock() {
        let (ctx, _clock) = test_context();
        let mut job = EnqueueJobUseCase::execute(&ctx, EnqueueJobCommand::new(Fails))
            .await
            .unwrap();
        job.attempts = 3;
        job.locked_at = Some(start());
        job.locked_by = Some(WorkerId::from("w"));
        let now = start() + Duration::seconds(10);

        let outcome = RescheduleJobUseCase::execute(
            &ctx,
            job.clone(),
            "boom",
            &trace(),
            now,
            &RetryPolicy::default(),
        )
        .await
        .unwrap();

        let expected_run_at = now + Duration::seconds(81 + 5);
        assert_eq!(
            outcome,
            RescheduleOutcome::Retried {
                attempts: 4,
                run_at: expected_run_at,
            }
        );
        let stored = ctx.repos.job.reload(&job).await.unwrap().unwrap();
        assert_eq!(stored.attempts, 4);
        assert_eq!(stored.run_at, Some(expected_run_at));
        assert_eq!(stored.last_error.as_deref(), Some("boom\na.rs:1\nb.rs:2"));
        assert!(!stored.is_locked());
        assert!(stored.locked_by.is_none());
        assert!(!stored.is_failed());
    }

    #[tokio::test]
    async fn given_exhausted_job_when_destroy_policy_should_remove_it() {
        let (ctx, _clock) = test_context();
        let mut job = EnqueueJobUseCase::execute(&ctx, EnqueueJobCommand::new(Fails))
            .await
            .unwrap();
        job.attempts = RetryPolicy::DEFAULT_MAX_ATTEMPTS;

        let outcome = RescheduleJobUseCase::execute(
            &ctx,
            job.clone(),
            "boom",
            &[],
            start(),
            &RetryPolicy::default(),
        )
        .await
        .unwrap();

        assert_eq!(outcome, RescheduleOutcome::Destroyed);
        assert_eq!(ctx.repos.job.reload(&job).await.unwrap(), None);
    }

    #[tokio::test]
    async fn given_exhausted_job_when_retain_policy_should_mark_failed() {
        let (ctx, _clock) = test_context();
        let mut job = EnqueueJobUseCase::execute(&ctx, EnqueueJobCommand::new(Fails))
            .await
            .unwrap();
        job.attempts = RetryPolicy::DEFAULT_MAX_ATTEMPTS;
        let policy = RetryPolicy {
            destroy_failed_jobs: false,
            ..RetryPolicy::default()
        };
        let now = start() + Duration::seconds(3);

        let outcome = RescheduleJobUseCase::execute(&ctx, job.clone(), "boom", &[], now, &policy)
            .await
            .unwrap();

        assert_eq!(outcome, RescheduleOutcome::MarkedFailed);
        let stored = ctx.repos.job.reload(&job).await.unwrap().unwrap();
        assert!(stored.is_failed());
        assert_eq!(stored.failed_at, Some(now));
        assert_eq!(stored.last_error.as_deref(), Some("boom\n"));
        assert_eq!(ctx.repos.job.list_failed(10).await.unwrap(), vec![stored]);
    }

    #[tokio::test]
    async fn given_unavailable_store_when_rescheduled_should_return_storage_error() {
        let ctx = null_context();
        let mut job = Job::new("{}");
        job.id = Some(JobId::from("1"));

        let result = RescheduleJobUseCase::execute(
            &ctx,
            job,
            "boom",
            &[],
            start(),
            &RetryPolicy::default(),
        )
        .await;

        assert!(matches!(result, Err(RescheduleJobError::Storage(_))));
    }
}
