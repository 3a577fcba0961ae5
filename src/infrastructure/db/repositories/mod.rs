pub mod factory;
pub mod job_repository;

pub use factory::Repositories;
