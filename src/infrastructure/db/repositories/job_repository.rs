use crate::domain::entities::job::Job;
use crate::domain::value_objects::ids::{JobId, WorkerId};
use crate::domain::value_objects::timestamps::Timestamp;
use crate::infrastructure::db::dto::job::{
    FAILED_AT, LOCKED_AT, LOCKED_BY, PRIORITY, RUN_AT, UNSET_TIMESTAMP,
};
use crate::infrastructure::db::dto::JobRow;
use crate::infrastructure::db::stores::query::{Operator, Predicate, Query, SortDirection};
use crate::infrastructure::db::stores::record_store::{
    Fields, ID_FIELD, RecordStore, RecordStoreError,
};
use std::sync::Arc;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JobRepositoryError {
    #[error(transparent)]
    Store(#[from] RecordStoreError),

    #[error("job has not been stored yet")]
    NotPersisted,
}

/// Typed persistence for jobs over any record store.
pub struct JobRepository {
    store: Arc<dyn RecordStore>,
}

impl JobRepository {
    /// Build a repository that uses the given store implementation.
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Store a new job, assigning its id and bookkeeping timestamps.
    ///
    /// An unset `run_at` defaults to `now`.
    pub async fn insert(&self, job: &mut Job, now: Timestamp) -> Result<(), JobRepositoryError> {
        let id = self.store.generate_unique_id().await?;

        job.id = Some(JobId(id.clone()));
        job.run_at.get_or_insert(now);
        job.created_at = Some(now);
        job.updated_at = Some(now);

        let row = JobRow::from_job(job);
        self.store.put(&id, &row.fields).await?;
        Ok(())
    }

    /// Fetch a job by its ID. Returns `None` if it doesn't exist.
    pub async fn get(&self, id: &JobId) -> Result<Option<Job>, JobRepositoryError> {
        let fields = self.store.get(id.as_str()).await?;
        Ok(fields.map(|fields| JobRow::from_record(id.as_str(), fields).into_job()))
    }

    /// Re-read a stored job. `None` means it has been destroyed since.
    pub async fn reload(&self, job: &Job) -> Result<Option<Job>, JobRepositoryError> {
        let id = job.id.as_ref().ok_or(JobRepositoryError::NotPersisted)?;
        self.get(id).await
    }

    /// Write every field of a stored job back, stamping `updated_at`.
    pub async fn save(&self, job: &mut Job, now: Timestamp) -> Result<(), JobRepositoryError> {
        let id = job.id.clone().ok_or(JobRepositoryError::NotPersisted)?;
        job.updated_at = Some(now);

        let row = JobRow::from_job(job);
        self.store.put(id.as_str(), &row.fields).await?;
        Ok(())
    }

    /// Remove a job for good. Returns `false` when it was already gone.
    pub async fn destroy(&self, job: Job) -> Result<bool, JobRepositoryError> {
        let id = job.id.ok_or(JobRepositoryError::NotPersisted)?;
        let removed = self.store.delete(id.as_str()).await?;
        if !removed {
            warn!(job_id = %id, "job_already_destroyed");
        }
        Ok(removed)
    }

    /// Due, unfailed jobs within the priority bounds, highest priority first.
    ///
    /// Lock state is not filtered here.
    pub async fn list_due(
        &self,
        now: Timestamp,
        min_priority: Option<i32>,
        max_priority: Option<i32>,
    ) -> Result<Vec<Job>, JobRepositoryError> {
        let mut query = Query::new()
            .filter(Predicate::new(RUN_AT, Operator::NumLe, now.unix()))
            .filter(Predicate::new(FAILED_AT, Operator::NumEquals, 0))
            .order_by(PRIORITY, SortDirection::NumDesc);
        if let Some(min) = min_priority {
            query = query.filter(Predicate::new(PRIORITY, Operator::NumGe, min));
        }
        if let Some(max) = max_priority {
            query = query.filter(Predicate::new(PRIORITY, Operator::NumLe, max));
        }

        self.load_all(&query).await
    }

    /// Retained terminal failures, most recent first.
    pub async fn list_failed(&self, limit: usize) -> Result<Vec<Job>, JobRepositoryError> {
        let query = Query::new()
            .filter(Predicate::new(FAILED_AT, Operator::NumGt, 0))
            .order_by(FAILED_AT, SortDirection::NumDesc)
            .limit(limit);

        self.load_all(&query).await
    }

    /// Number of stored jobs, failed ones included.
    pub async fn count(&self) -> Result<usize, JobRepositoryError> {
        Ok(self.store.query(&Query::new()).await?.len())
    }

    /// Claim a due, unfailed job nobody holds, or whose lock was taken before
    /// `stale_before`.
    ///
    /// Returns the number of records changed: `1` on success, `0` if another
    /// worker holds a fresh lock, the job was rescheduled or failed since it
    /// was read, or the job is gone.
    pub async fn lock_unowned(
        &self,
        id: &JobId,
        worker: &WorkerId,
        now: Timestamp,
        stale_before: Timestamp,
    ) -> Result<u64, JobRepositoryError> {
        let changes = Fields::from([
            (LOCKED_AT.to_string(), now.unix().to_string()),
            (LOCKED_BY.to_string(), worker.0.clone()),
        ]);
        // An unset lock is stored as 0 and must stay claimable for any window.
        let stale_before = stale_before.unix().max(1);
        let guard = [
            Predicate::equals(ID_FIELD, id),
            Predicate::new(LOCKED_AT, Operator::NumLt, stale_before),
            Predicate::new(RUN_AT, Operator::NumLe, now.unix()),
            Predicate::new(FAILED_AT, Operator::NumEquals, 0),
        ];

        Ok(self.store.conditional_update(&changes, &guard).await?)
    }

    /// Refresh `locked_at` on a job that `worker` already holds.
    pub async fn refresh_own_lock(
        &self,
        id: &JobId,
        worker: &WorkerId,
        now: Timestamp,
    ) -> Result<u64, JobRepositoryError> {
        let changes = Fields::from([(LOCKED_AT.to_string(), now.unix().to_string())]);
        let guard = [
            Predicate::equals(ID_FIELD, id),
            Predicate::equals(LOCKED_BY, worker),
        ];

        Ok(self.store.conditional_update(&changes, &guard).await?)
    }

    /// Release every lock held by `worker`. Returns how many were released.
    pub async fn clear_locks(&self, worker: &WorkerId) -> Result<u64, JobRepositoryError> {
        let changes = Fields::from([
            (LOCKED_AT.to_string(), UNSET_TIMESTAMP.to_string()),
            (LOCKED_BY.to_string(), String::new()),
        ]);
        let guard = [Predicate::equals(LOCKED_BY, worker)];

        Ok(self.store.conditional_update(&changes, &guard).await?)
    }

    async fn load_all(&self, query: &Query) -> Result<Vec<Job>, JobRepositoryError> {
        let ids = self.store.query(query).await?;

        let mut jobs = Vec::with_capacity(ids.len());
        for id in ids {
            // Destroyed between the scan and the read.
            if let Some(fields) = self.store.get(&id).await? {
                jobs.push(JobRow::from_record(id, fields).into_job());
            }
        }
        Ok(jobs)
    }
}
