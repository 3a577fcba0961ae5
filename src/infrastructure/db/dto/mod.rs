pub mod job;

pub use job::JobRow;
