use crate::infrastructure::db::stores::query::{Predicate, Query, matches_all};
use crate::infrastructure::db::stores::record_store::{
    Fields, RecordStore, RecordStoreError, format_record_id,
};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

/// Process-local record store.
///
/// Every operation runs under one mutex, which makes `conditional_update`
/// atomic with respect to other callers sharing the same instance.
#[derive(Debug, Default)]
pub struct RecordStoreMemory {
    records: Mutex<BTreeMap<String, Fields>>,
    sequence: AtomicU64,
}

impl RecordStoreMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn records(&self) -> Result<MutexGuard<'_, BTreeMap<String, Fields>>, RecordStoreError> {
        self.records
            .lock()
            .map_err(|_| RecordStoreError::Unavailable("record store lock poisoned".to_string()))
    }
}

#[async_trait]
impl RecordStore for RecordStoreMemory {
    async fn get(&self, id: &str) -> Result<Option<Fields>, RecordStoreError> {
        Ok(self.records()?.get(id).cloned())
    }

    async fn put(&self, id: &str, fields: &Fields) -> Result<(), RecordStoreError> {
        self.records()?.insert(id.to_string(), fields.clone());
        Ok(())
    }

    async fn query(&self, query: &Query) -> Result<Vec<String>, RecordStoreError> {
        let records = self.records()?;

        // Step 1: Filter, in id order.
        let mut matched: Vec<(&String, &Fields)> = Vec::new();
        for (id, fields) in records.iter() {
            if matches_all(&query.predicates, fields)? {
                matched.push((id, fields));
            }
        }

        // Step 2: Stable sort keeps id order among equal keys.
        if let Some(order) = &query.order {
            matched.sort_by(|a, b| order.compare(a.1, b.1));
        }

        // Step 3: Page.
        let offset = query.offset.unwrap_or(0);
        let limit = query.limit.unwrap_or(usize::MAX);
        Ok(matched
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|(id, _)| id.clone())
            .collect())
    }

    async fn conditional_update(
        &self,
        changes: &Fields,
        predicates: &[Predicate],
    ) -> Result<u64, RecordStoreError> {
        let mut records = self.records()?;
        let mut affected = 0;

        for fields in records.values_mut() {
            if matches_all(predicates, fields)? {
                fields.extend(changes.iter().map(|(k, v)| (k.clone(), v.clone())));
                affected += 1;
            }
        }

        Ok(affected)
    }

    async fn delete(&self, id: &str) -> Result<bool, RecordStoreError> {
        Ok(self.records()?.remove(id).is_some())
    }

    async fn clear(&self) -> Result<(), RecordStoreError> {
        self.records()?.clear();
        Ok(())
    }

    async fn generate_unique_id(&self) -> Result<String, RecordStoreError> {
        let next = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format_record_id(next))
    }
}
