//! Repository layer: one unit struct per table group, each method taking
//! the pool explicitly.

pub mod checkpoint_repo;
pub mod graph_repo;
pub mod import_job_repo;
pub mod job_lock_repo;

pub use checkpoint_repo::CheckpointRepo;
pub use graph_repo::GraphRepo;
pub use import_job_repo::ImportJobRepo;
pub use job_lock_repo::JobLockRepo;
