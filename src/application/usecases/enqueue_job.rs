// Use case: enqueue_job.

use crate::application::context::AppContext;
use crate::domain::entities::job::Job;
use crate::domain::value_objects::timestamps::Timestamp;
use crate::domain::workflows::payload_registry::{JobPayload, SerializationError};
use crate::infrastructure::db::repositories::job_repository::JobRepositoryError;
use tracing::info;

/// Input for enqueueing a payload.
pub struct EnqueueJobCommand<P> {
    pub payload: P,
    pub priority: i32,
    /// Earliest run time; now when unset.
    pub run_at: Option<Timestamp>,
}

impl<P> EnqueueJobCommand<P> {
    pub fn new(payload: P) -> Self {
        Self {
            payload,
            priority: 0,
            run_at: None,
        }
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn run_at(mut self, run_at: Timestamp) -> Self {
        self.run_at = Some(run_at);
        self
    }
}

/// Serializes a payload into a new stored job.
pub struct EnqueueJobUseCase;

#[derive(Debug)]
pub enum EnqueueJobError {
    /// The payload kind has no decoder, so no worker could ever run it.
    UnregisteredKind(&'static str),
    Serialization(String),
    Storage(JobRepositoryError),
}

impl EnqueueJobUseCase {
    pub async fn execute<P: JobPayload>(
        ctx: &AppContext,
        cmd: EnqueueJobCommand<P>,
    ) -> Result<Job, EnqueueJobError> {
        // Step 1: Serialize the payload; refuses kinds the registry cannot decode.
        let handler = ctx.registry.serialize(&cmd.payload).map_err(|e| match e {
            SerializationError::UnregisteredKind(kind) => EnqueueJobError::UnregisteredKind(kind),
            SerializationError::Encode(err) => EnqueueJobError::Serialization(err.to_string()),
        })?;

        // Step 2: Build the job.
        let now = ctx.clock.now();
        let mut job = Job::new(handler)
            .with_priority(cmd.priority)
            .with_run_at(cmd.run_at.unwrap_or(now));

        // Step 3: Persist it.
        ctx.repos
            .job
            .insert(&mut job, now)
            .await
            .map_err(EnqueueJobError::Storage)?;

        info!(
            job_id = %job.id.as_ref().map(|id| id.as_str()).unwrap_or(""),
            kind = P::KIND,
            priority = job.priority,
            "job_enqueued"
        );

        Ok(job)
    }
}
