pub mod query;
pub mod record_store;

pub use query::{Operator, Order, Predicate, Query, SortDirection};
pub use record_store::{Fields, ID_FIELD, RecordStore, RecordStoreError};
