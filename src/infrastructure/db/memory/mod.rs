pub mod record_store_memory;

pub use record_store_memory::RecordStoreMemory;
