//! Job submission and queries over the registry and workspace

use super::registry::{JobRegistry, JobSnapshot, JobStatus};
use super::runner::{run_job, JobRequest};
use super::workspace::JobWorkspace;
use crate::error::{Error, Result};
use crate::identifiers::table;
use crate::pdf::{validate_pdf_header, PdfiumRenderer, SiteRenderer};
use serde::Serialize;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Progress view returned to pollers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct JobProgress {
    pub progress: u8,
    pub status: JobStatus,
}

/// A running job
pub struct JobHandle {
    job_id: String,
    task: JoinHandle<JobStatus>,
}

impl JobHandle {
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Wait for the terminal status
    pub async fn wait(self) -> JobStatus {
        self.task.await.unwrap_or(JobStatus::Error)
    }
}

/// Owns every job of the process
#[derive(Clone)]
pub struct JobManager {
    registry: Arc<JobRegistry>,
    workspace: Arc<JobWorkspace>,
    renderer: Arc<dyn SiteRenderer>,
    ttl: Duration,
}

impl JobManager {
    /// Manager rendering with PDFium and qpdf
    pub fn new<P: Into<PathBuf>>(work_dir: P, ttl: Duration) -> Self {
        Self::with_parts(
            Arc::new(JobRegistry::new()),
            JobWorkspace::new(work_dir),
            Arc::new(PdfiumRenderer),
            ttl,
        )
    }

    pub fn with_parts(
        registry: Arc<JobRegistry>,
        workspace: JobWorkspace,
        renderer: Arc<dyn SiteRenderer>,
        ttl: Duration,
    ) -> Self {
        Self {
            registry,
            workspace: Arc::new(workspace),
            renderer,
            ttl,
        }
    }

    pub fn workspace(&self) -> &JobWorkspace {
        &self.workspace
    }

    /// Validate the inputs, stage copies of them and start the job.
    /// File work runs on the blocking pool; the job itself is not awaited.
    pub async fn submit(&self, request: JobRequest) -> Result<JobHandle> {
        let manager = self.clone();
        let (job_id, staged) = tokio::task::spawn_blocking(move || manager.prepare(&request))
            .await
            .map_err(|e| Error::Unexpected {
                reason: format!("Task join error: {}", e),
            })??;

        tracing::info!(
            job_id = %job_id,
            kind = %staged.kind,
            mode = ?staged.spec.mode,
            "Job submitted"
        );

        let registry = self.registry.clone();
        let workspace = self.workspace.clone();
        let renderer = self.renderer.clone();
        let id = job_id.clone();

        let task = tokio::spawn(async move {
            let worker_registry = registry.clone();
            let worker_id = id.clone();
            let blocking = tokio::task::spawn_blocking(move || {
                run_job(
                    &worker_id,
                    &staged,
                    &worker_registry,
                    &workspace,
                    renderer.as_ref(),
                )
            });

            match blocking.await {
                Ok(status) => status,
                Err(e) => {
                    tracing::error!(job_id = %id, error = %e, "Job worker terminated");
                    registry.fail(&id);
                    JobStatus::Error
                }
            }
        });

        Ok(JobHandle { job_id, task })
    }

    /// Register the job and stage its inputs; nothing is left behind on error
    fn prepare(&self, request: &JobRequest) -> Result<(String, JobRequest)> {
        self.evict_expired();
        validate_inputs(request)?;

        let job_id = self.registry.create();
        match self.stage(&job_id, request) {
            Ok(staged) => Ok((job_id, staged)),
            Err(e) => {
                self.registry.remove(&job_id);
                if let Err(cleanup) = self.workspace.remove(&job_id) {
                    tracing::warn!(
                        job_id = %job_id,
                        error = %cleanup,
                        "Failed to remove workspace"
                    );
                }
                Err(e)
            }
        }
    }

    fn stage(&self, job_id: &str, request: &JobRequest) -> Result<JobRequest> {
        let spreadsheet_path = self
            .workspace
            .stage_input(job_id, &request.spreadsheet_path)?;
        let pdf_path = self.workspace.stage_input(job_id, &request.pdf_path)?;

        Ok(JobRequest {
            spreadsheet_path,
            pdf_path,
            ..request.clone()
        })
    }

    pub fn snapshot(&self, job_id: &str) -> Result<JobSnapshot> {
        self.registry.get(job_id).ok_or_else(|| Error::JobNotFound {
            job_id: job_id.to_string(),
        })
    }

    pub fn progress(&self, job_id: &str) -> Result<JobProgress> {
        let job = self.snapshot(job_id)?;
        Ok(JobProgress {
            progress: job.progress,
            status: job.status,
        })
    }

    /// Names of the files produced so far, sorted
    pub fn results(&self, job_id: &str) -> Result<Vec<String>> {
        self.snapshot(job_id)?;
        self.workspace.list_outputs(job_id)
    }

    pub fn result_file(&self, job_id: &str, file_name: &str) -> Result<Vec<u8>> {
        self.snapshot(job_id)?;
        self.workspace.read_output(job_id, file_name)
    }

    /// Zip archive of every produced file
    pub fn bundle(&self, job_id: &str) -> Result<Vec<u8>> {
        self.snapshot(job_id)?;
        self.workspace.bundle(job_id)
    }

    /// Forget a finished job and delete everything it wrote
    pub fn cleanup(&self, job_id: &str) -> Result<()> {
        // Terminal status is final, so the worker can no longer write
        if let Some(job) = self.registry.get(job_id) {
            if !job.status.is_terminal() {
                return Err(Error::JobStillProcessing {
                    job_id: job_id.to_string(),
                });
            }
        }

        let known = self.registry.remove(job_id).is_some();
        let removed = self.workspace.remove(job_id)?;

        if !known && !removed {
            return Err(Error::JobNotFound {
                job_id: job_id.to_string(),
            });
        }

        tracing::info!(job_id = %job_id, "Job cleaned up");
        Ok(())
    }

    /// Drop terminal jobs older than the configured TTL along with their files
    pub fn evict_expired(&self) -> Vec<String> {
        let evicted = self.registry.evict_expired(self.ttl);
        for job_id in &evicted {
            match self.workspace.remove(job_id) {
                Ok(_) => tracing::debug!(job_id = %job_id, "Evicted expired job"),
                Err(e) => {
                    tracing::warn!(job_id = %job_id, error = %e, "Failed to remove expired job")
                }
            }
        }
        evicted
    }
}

fn validate_inputs(request: &JobRequest) -> Result<()> {
    let pdf = &request.pdf_path;
    if !pdf.is_file() {
        return Err(Error::PdfNotFound {
            path: pdf.display().to_string(),
        });
    }

    let mut header = Vec::with_capacity(4);
    File::open(pdf)?.take(4).read_to_end(&mut header)?;
    validate_pdf_header(&header)?;

    validate_spreadsheet(&request.spreadsheet_path)
}

fn validate_spreadsheet(path: &Path) -> Result<()> {
    if !path.is_file() {
        return Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("Spreadsheet not found: {}", path.display()),
        )));
    }
    if !table::is_supported(path) {
        return Err(Error::UnsupportedSpreadsheet {
            path: path.display().to_string(),
        });
    }
    Ok(())
}
