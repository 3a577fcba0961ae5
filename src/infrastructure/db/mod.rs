pub mod database;
pub mod dto;
pub mod memory;
pub mod postgres;
pub mod repositories;
pub mod stores;
