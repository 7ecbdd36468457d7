//! Pure domain types and logic for the twin graph import engine.
//!
//! Nothing in this crate performs I/O; the database, engine and API crates
//! build on these types.

pub mod checkpoint;
pub mod error;
pub mod import_job;
pub mod job_lock;
pub mod job_log;
pub mod job_state;
pub mod model_deps;
pub mod options;
pub mod section;
pub mod status;
pub mod types;
