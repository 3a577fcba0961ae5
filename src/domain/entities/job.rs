use std::fmt;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use time::Duration;

use crate::domain::value_objects::ids::{JobId, WorkerId};
use crate::domain::value_objects::timestamps::Timestamp;
use crate::domain::workflows::payload_registry::{
    DeserializationError, Payload, PayloadRegistry,
};

/// A unit of deferred work plus its scheduling and lock metadata.
///
/// `id` is `None` until the job has been stored. Equality is by stored id.
#[derive(Clone)]
pub struct Job {
    pub id: Option<JobId>,
    pub priority: i32,
    pub attempts: u32,
    pub handler: String,
    pub last_error: Option<String>,
    pub run_at: Option<Timestamp>,
    pub locked_at: Option<Timestamp>,
    pub locked_by: Option<WorkerId>,
    pub failed_at: Option<Timestamp>,
    pub created_at: Option<Timestamp>,
    pub updated_at: Option<Timestamp>,
    payload: OnceCell<Arc<dyn Payload>>,
}

impl Job {
    pub fn new(handler: impl Into<String>) -> Self {
        Self {
            id: None,
            priority: 0,
            attempts: 0,
            handler: handler.into(),
            last_error: None,
            run_at: None,
            locked_at: None,
            locked_by: None,
            failed_at: None,
            created_at: None,
            updated_at: None,
            payload: OnceCell::new(),
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_run_at(mut self, run_at: Timestamp) -> Self {
        self.run_at = Some(run_at);
        self
    }

    pub fn is_persisted(&self) -> bool {
        self.id.is_some()
    }

    pub fn is_failed(&self) -> bool {
        self.failed_at.is_some()
    }

    pub fn is_locked(&self) -> bool {
        self.locked_at.is_some()
    }

    pub fn is_locked_by(&self, worker: &WorkerId) -> bool {
        self.locked_by.as_ref() == Some(worker)
    }

    /// Lock part of the availability rule: unlocked, stale, or already ours.
    pub fn is_lockable_by(&self, worker: &WorkerId, now: Timestamp, max_run_time: Duration) -> bool {
        match self.locked_at {
            None => true,
            Some(locked_at) => locked_at < now - max_run_time || self.is_locked_by(worker),
        }
    }

    /// Full availability rule: due, not failed, and lockable by `worker`.
    pub fn is_available(&self, worker: &WorkerId, now: Timestamp, max_run_time: Duration) -> bool {
        let due = self.run_at.map_or(true, |run_at| run_at <= now);
        due && !self.is_failed() && self.is_lockable_by(worker, now, max_run_time)
    }

    /// Clear the lock fields. The change is local until the job is saved.
    pub fn unlock(&mut self) {
        self.locked_at = None;
        self.locked_by = None;
    }

    /// Decode `handler` once and keep the result for the lifetime of this value.
    pub fn payload_object(
        &self,
        registry: &PayloadRegistry,
    ) -> Result<Arc<dyn Payload>, DeserializationError> {
        self.payload
            .get_or_try_init(|| registry.deserialize(&self.handler))
            .cloned()
    }

    /// Display name of the payload, else its kind tag.
    pub fn name(&self, registry: &PayloadRegistry) -> String {
        if let Ok(payload) = self.payload_object(registry) {
            if let Some(name) = payload.display_name() {
                return name;
            }
        }

        PayloadRegistry::kind_of(&self.handler).unwrap_or_else(|| "unknown".to_string())
    }
}

impl PartialEq for Job {
    fn eq(&self, other: &Self) -> bool {
        match (&self.id, &other.id) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("priority", &self.priority)
            .field("attempts", &self.attempts)
            .field("handler", &self.handler)
            .field("last_error", &self.last_error)
            .field("run_at", &self.run_at)
            .field("locked_at", &self.locked_at)
            .field("locked_by", &self.locked_by)
            .field("failed_at", &self.failed_at)
            .field("created_at", &self.created_at)
            .field("updated_at", &self.updated_at)
            .finish()
    }
}
