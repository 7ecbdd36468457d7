pub mod checkpoint;
pub mod graph;
pub mod import_job;
pub mod job_lock;
