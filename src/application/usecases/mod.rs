pub mod enqueue_job;
pub mod find_available_jobs;
pub mod lock_job;
pub mod reschedule_job;
pub mod reserve_and_run_one;
pub mod work_off;
pub mod worker_loop;
