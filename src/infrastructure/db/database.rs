use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("query error: {0}")]
    Query(String),

    #[error("schema error: {0}")]
    Schema(String),
}

/// A SQL database backing one or more record stores.
#[async_trait]
pub trait Database: Send + Sync {
    /// Create the tables and sequences the stores need, if missing.
    async fn migrate(&self) -> Result<(), DatabaseError>;
}
