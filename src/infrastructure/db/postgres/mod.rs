mod database;
pub mod record_store_postgres;

pub use database::PostgresDatabase;
pub use record_store_postgres::RecordStorePostgres;
