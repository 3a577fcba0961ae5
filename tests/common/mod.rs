#![allow(dead_code)]

use async_trait::async_trait;
use forge_delay::application::context::AppContext;
use forge_delay::domain::value_objects::timestamps::{ManualClock, Timestamp};
use forge_delay::domain::workflows::payload_registry::{
    JobPayload, Payload, PayloadError, PayloadRegistry,
};
use forge_delay::infrastructure::db::repositories::Repositories;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

static RUNS: Lazy<Mutex<HashMap<String, usize>>> = Lazy::new(|| Mutex::new(HashMap::new()));

/// Succeeds and records one run under `key`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    pub key: String,
}

#[async_trait]
impl Payload for Record {
    async fn perform(&self) -> Result<(), PayloadError> {
        *RUNS.lock().unwrap().entry(self.key.clone()).or_default() += 1;
        Ok(())
    }

    fn display_name(&self) -> Option<String> {
        Some(format!("record {}", self.key))
    }
}

impl JobPayload for Record {
    const KIND: &'static str = "record";
}

/// Always fails.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlwaysFails {
    pub reason: String,
}

#[async_trait]
impl Payload for AlwaysFails {
    async fn perform(&self) -> Result<(), PayloadError> {
        Err(PayloadError::new(self.reason.clone()).with_context("always_fails"))
    }
}

impl JobPayload for AlwaysFails {
    const KIND: &'static str = "always_fails";
}

pub fn runs_of(key: &str) -> usize {
    RUNS.lock().unwrap().get(key).copied().unwrap_or(0)
}

pub fn unique_key(prefix: &str) -> String {
    format!("{prefix}-{}", rand::random::<u64>())
}

pub fn registry() -> PayloadRegistry {
    PayloadRegistry::new().with::<Record>().with::<AlwaysFails>()
}

pub fn start() -> Timestamp {
    Timestamp::from_unix(1_700_000_000).unwrap()
}

pub fn memory_context() -> (AppContext, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(start()));
    let ctx = AppContext::with_clock(Repositories::memory(), registry(), clock.clone());
    (ctx, clock)
}
