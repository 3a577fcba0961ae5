use crate::domain::entities::job::Job;
use crate::domain::value_objects::ids::{JobId, WorkerId};
use crate::domain::value_objects::timestamps::Timestamp;
use crate::infrastructure::db::stores::record_store::{Fields, ID_FIELD};

pub const PRIORITY: &str = "priority";
pub const ATTEMPTS: &str = "attempts";
pub const HANDLER: &str = "handler";
pub const LAST_ERROR: &str = "last_error";
pub const RUN_AT: &str = "run_at";
pub const LOCKED_AT: &str = "locked_at";
pub const LOCKED_BY: &str = "locked_by";
pub const FAILED_AT: &str = "failed_at";
pub const CREATED_AT: &str = "created_at";
pub const UPDATED_AT: &str = "updated_at";

/// Unset timestamps are written as `"0"` so numeric predicates treat them as the epoch.
pub const UNSET_TIMESTAMP: &str = "0";

/// A job as the record store sees it: a flat, string-valued field map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRow {
    pub id: Option<String>,
    pub fields: Fields,
}

impl JobRow {
    pub fn from_job(job: &Job) -> Self {
        let mut fields = Fields::new();
        if let Some(id) = &job.id {
            fields.insert(ID_FIELD.to_string(), id.0.clone());
        }
        fields.insert(PRIORITY.to_string(), job.priority.to_string());
        fields.insert(ATTEMPTS.to_string(), job.attempts.to_string());
        fields.insert(HANDLER.to_string(), job.handler.clone());
        fields.insert(
            LAST_ERROR.to_string(),
            job.last_error.clone().unwrap_or_default(),
        );
        fields.insert(RUN_AT.to_string(), encode_timestamp(job.run_at));
        fields.insert(LOCKED_AT.to_string(), encode_timestamp(job.locked_at));
        fields.insert(
            LOCKED_BY.to_string(),
            job.locked_by
                .as_ref()
                .map(|w| w.0.clone())
                .unwrap_or_default(),
        );
        fields.insert(FAILED_AT.to_string(), encode_timestamp(job.failed_at));
        fields.insert(CREATED_AT.to_string(), encode_timestamp(job.created_at));
        fields.insert(UPDATED_AT.to_string(), encode_timestamp(job.updated_at));

        Self {
            id: job.id.as_ref().map(|id| id.0.clone()),
            fields,
        }
    }

    pub fn from_record(id: impl Into<String>, fields: Fields) -> Self {
        Self {
            id: Some(id.into()),
            fields,
        }
    }

    /// Rebuild the entity. Missing or unparseable fields fall back to defaults.
    pub fn into_job(self) -> Job {
        let fields = self.fields;
        let text = |name: &str| fields.get(name).cloned().unwrap_or_default();

        let mut job = Job::new(text(HANDLER));
        job.id = self.id.map(JobId);
        job.priority = text(PRIORITY).trim().parse().unwrap_or_default();
        job.attempts = text(ATTEMPTS).trim().parse().unwrap_or_default();
        job.last_error = non_empty(text(LAST_ERROR));
        job.run_at = decode_timestamp(&text(RUN_AT));
        job.locked_at = decode_timestamp(&text(LOCKED_AT));
        job.locked_by = non_empty(text(LOCKED_BY)).map(WorkerId);
        job.failed_at = decode_timestamp(&text(FAILED_AT));
        job.created_at = decode_timestamp(&text(CREATED_AT));
        job.updated_at = decode_timestamp(&text(UPDATED_AT));
        job
    }
}

pub fn encode_timestamp(value: Option<Timestamp>) -> String {
    value
        .map(|t| t.unix().to_string())
        .unwrap_or_else(|| UNSET_TIMESTAMP.to_string())
}

/// `"0"`, `""` and garbage all decode to unset.
pub fn decode_timestamp(value: &str) -> Option<Timestamp> {
    match value.trim().parse::<i64>() {
        Ok(0) | Err(_) => None,
        Ok(seconds) => Timestamp::from_unix(seconds),
    }
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() { None } else { Some(value) }
}
