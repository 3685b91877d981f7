//! PDF Identifier Marker Library
//!
//! Finds the UAN or ESIC numbers a spreadsheet lists for each site inside a
//! PDF, marks every occurrence and writes one trimmed PDF per site:
//! - `identifiers`: spreadsheet loading, validation and grouping by site
//! - `pdf`: text search, marking (PDFium) and page trimming (qpdf)
//! - `job`: background jobs with progress tracking
//! - `server`: MCP tools over the job manager

pub mod error;
pub mod identifiers;
pub mod job;
pub mod pdf;
pub mod server;

pub use error::{Error, Result};
pub use job::{JobHandle, JobManager, JobProgress, JobRequest, JobStatus};
pub use server::{run_server, run_server_with_config, MarkerServer, ServerConfig};
