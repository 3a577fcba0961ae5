pub mod payload_registry;
pub mod retry_policy;
