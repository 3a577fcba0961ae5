use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::infrastructure::db::database::DatabaseError;
use crate::infrastructure::db::stores::query::{Predicate, Query};

/// A stored record: field names mapped to string-encoded values.
pub type Fields = BTreeMap<String, String>;

/// Field that mirrors the record key, so predicates can address a single record.
pub const ID_FIELD: &str = "id";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecordStoreError {
    #[error("record store unavailable: {0}")]
    Unavailable(String),

    #[error("invalid query: {0}")]
    InvalidQuery(String),
}

impl From<DatabaseError> for RecordStoreError {
    fn from(err: DatabaseError) -> Self {
        RecordStoreError::Unavailable(err.to_string())
    }
}

/// Durable keyed store holding one record per job.
///
/// `conditional_update` is the only primitive relied upon for mutual
/// exclusion: it must apply the change and count the matching records as one
/// atomic step with respect to concurrent callers.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Fetch a record by id. Returns `None` if it doesn't exist.
    async fn get(&self, id: &str) -> Result<Option<Fields>, RecordStoreError>;
    /// Write a record, replacing every field of any existing one.
    async fn put(&self, id: &str, fields: &Fields) -> Result<(), RecordStoreError>;
    /// Ids of the records matching every predicate, ordered and paged.
    async fn query(&self, query: &Query) -> Result<Vec<String>, RecordStoreError>;
    /// Merge `changes` into every record matching `predicates` and return how
    /// many records were changed.
    async fn conditional_update(
        &self,
        changes: &Fields,
        predicates: &[Predicate],
    ) -> Result<u64, RecordStoreError>;
    /// Delete a record. Returns `false` when it was already gone.
    async fn delete(&self, id: &str) -> Result<bool, RecordStoreError>;
    /// Remove every record.
    async fn clear(&self) -> Result<(), RecordStoreError>;
    /// A fresh id that no existing or future record will share.
    async fn generate_unique_id(&self) -> Result<String, RecordStoreError>;
}

/// Format a numeric sequence value the way record ids are written.
pub fn format_record_id(sequence: u64) -> String {
    format!("{sequence:064}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn given_sequence_when_formatted_should_pad_to_64_digits() {
        let id = format_record_id(42);
        assert_eq!(id.len(), 64);
        assert!(id.ends_with("42"));
        assert!(id.starts_with("000"));
    }

    #[test]
    fn given_database_error_when_converted_should_be_unavailable() {
        let err: RecordStoreError = DatabaseError::Connection("down".to_string()).into();
        assert!(matches!(err, RecordStoreError::Unavailable(msg) if msg.contains("down")));
    }
}
