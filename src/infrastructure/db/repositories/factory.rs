use std::sync::Arc;

use crate::infrastructure::db::database::{Database, DatabaseError};
use crate::infrastructure::db::memory::RecordStoreMemory;
use crate::infrastructure::db::postgres::{PostgresDatabase, RecordStorePostgres};
use crate::infrastructure::db::repositories::job_repository::JobRepository;
use crate::infrastructure::db::stores::record_store::RecordStore;

#[derive(Clone)]
pub struct Repositories {
    pub db: Option<Arc<PostgresDatabase>>,
    pub job: Arc<JobRepository>,
}

impl Repositories {
    /// Build all repositories backed by Postgres stores.
    pub fn postgres(db: Arc<PostgresDatabase>) -> Self {
        let store = Arc::new(RecordStorePostgres::new(db.clone()));
        Self {
            db: Some(db),
            job: Arc::new(JobRepository::new(store)),
        }
    }

    /// Build repositories over a fresh process-local store.
    pub fn memory() -> Self {
        Self::with_store(Arc::new(RecordStoreMemory::new()))
    }

    /// Build repositories over any record store.
    pub fn with_store(store: Arc<dyn RecordStore>) -> Self {
        Self {
            db: None,
            job: Arc::new(JobRepository::new(store)),
        }
    }

    /// Create the job table and id sequence when backed by Postgres.
    pub async fn migrate(&self) -> Result<(), DatabaseError> {
        match self.db.as_ref() {
            Some(db) => db.migrate().await,
            None => Ok(()),
        }
    }
}
