use std::sync::Arc;

use crate::domain::value_objects::timestamps::{Clock, SystemClock};
use crate::domain::workflows::payload_registry::PayloadRegistry;
use crate::infrastructure::db::repositories::Repositories;

/// Shared application resources used by use cases.
#[derive(Clone)]
pub struct AppContext {
    pub repos: Repositories,
    pub registry: Arc<PayloadRegistry>,
    pub clock: Arc<dyn Clock>,
}

impl AppContext {
    /// Build a context on the system clock.
    pub fn new(repos: Repositories, registry: PayloadRegistry) -> Self {
        Self::with_clock(repos, registry, Arc::new(SystemClock))
    }

    pub fn with_clock(repos: Repositories, registry: PayloadRegistry, clock: Arc<dyn Clock>) -> Self {
        Self {
            repos,
            registry: Arc::new(registry),
            clock,
        }
    }
}
