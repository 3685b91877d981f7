//! Background jobs: one spreadsheet plus one PDF in, one PDF per site out

mod manager;
mod registry;
mod runner;
mod workspace;

pub use manager::{JobHandle, JobManager, JobProgress};
pub use registry::{
    progress_percent, Clock, IdGenerator, JobRegistry, JobSnapshot, JobStatus, SiteOutcome,
    SystemClock, UuidGenerator,
};
pub use runner::{run_job, JobRequest};
pub use workspace::{output_file_name, sanitize_site_name, JobWorkspace};

#[cfg(test)]
pub(crate) use runner::tests::FakeRenderer;
