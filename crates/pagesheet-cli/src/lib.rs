//! pagesheet CLI — job loading and run reporting for the `pagesheet` binary.

pub mod config;
pub mod report;

pub use config::{load_job_file, resolve_job, resolve_translate_key, JobFile};
pub use report::render_outcome;
