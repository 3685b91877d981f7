//! MCP Server implementation using rmcp

use crate::identifiers::{list_columns, IdentifierKind};
use crate::job::{JobManager, JobRequest, JobStatus, SiteOutcome};
use crate::pdf::{AnnotationSpec, HighlightMode, Margins, Rgb};
use anyhow::Result;
use base64::Engine;
use rmcp::{
    handler::server::tool::ToolRouter, handler::server::wrapper::Parameters, model::*,
    schemars::JsonSchema, tool, tool_handler, tool_router, ServerHandler, ServiceExt,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Sandbox and job configuration for the marker server
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Directories input and output paths must live under (empty: unrestricted)
    pub resource_dirs: Vec<String>,
    /// Directory holding one folder per job (default: ./work)
    pub work_dir: PathBuf,
    /// How long finished jobs are kept before eviction (default: 24h)
    pub job_ttl: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            resource_dirs: Vec::new(),
            work_dir: PathBuf::from("./work"),
            job_ttl: Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// Identifier marker MCP server
#[derive(Clone)]
pub struct MarkerServer {
    manager: JobManager,
    tool_router: ToolRouter<Self>,
    /// Server configuration
    config: Arc<ServerConfig>,
}

// ============================================================================
// Request/Response types for list_columns
// ============================================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ListColumnsParams {
    /// Path to the spreadsheet (.xlsx, .xlsm, .xlsb, .xls, .ods or .csv)
    pub spreadsheet_path: String,
}

#[derive(Debug, Serialize)]
pub struct ListColumnsResult {
    pub spreadsheet_path: String,
    /// Header names of the first sheet, in order
    pub columns: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ============================================================================
// Request/Response types for submit_job
// ============================================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SubmitJobParams {
    /// Path to the spreadsheet listing identifiers and sites
    pub spreadsheet_path: String,
    /// Path to the PDF to search
    pub pdf_path: String,
    /// Identifier type: "uan" (12 digits) or "esic" (10 digits)
    pub identifier_type: String,
    /// Column holding the identifiers
    pub identifier_column: String,
    /// Column holding the site names
    pub site_column: String,
    /// Mark style: "border" (default), "highlight" or "underline"
    #[serde(default)]
    pub mode: Option<String>,
    /// Mark colour: red (default), blue, green, black, orange or yellow
    #[serde(default)]
    pub color: Option<String>,
    /// Colour for special identifiers (default: blue)
    #[serde(default)]
    pub special_color: Option<String>,
    /// Fill opacity for highlight mode, 0.0 to 1.0 (default: 0.25)
    #[serde(default)]
    pub opacity: Option<f32>,
    /// Stroke width in points (default: 0.5)
    #[serde(default)]
    pub border_width: Option<f32>,
    /// Padding around each match in points (default: 1.0)
    #[serde(default)]
    pub margin: Option<f32>,
}

#[derive(Debug, Serialize)]
pub struct SubmitJobResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<JobStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ============================================================================
// Request/Response types for job queries
// ============================================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct JobParams {
    /// Job id returned by submit_job
    pub job_id: String,
}

#[derive(Debug, Serialize)]
pub struct JobProgressResult {
    pub job_id: String,
    /// Percentage of sites processed, 0 to 100
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<JobStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ListResultsResult {
    pub job_id: String,
    /// Produced PDF names, sorted
    pub files: Vec<String>,
    /// Outcome of every site processed so far
    pub sites: Vec<SiteOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct GetResultParams {
    /// Job id returned by submit_job
    pub job_id: String,
    /// File name as listed by list_results
    pub file_name: String,
    /// Output file path (optional). If omitted the PDF is returned as base64.
    #[serde(default)]
    pub output_path: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct DownloadZipParams {
    /// Job id returned by submit_job
    pub job_id: String,
    /// Output file path (optional). If omitted the archive is returned as base64.
    #[serde(default)]
    pub output_path: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct FileResult {
    pub job_id: String,
    pub file_name: String,
    /// Size in bytes
    pub size: usize,
    /// Path where the file was saved (if output_path was specified)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<String>,
    /// File content (if output_path was not specified)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base64: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CleanupResult {
    pub job_id: String,
    pub cleaned: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn to_json<T: Serialize>(result: &T) -> String {
    serde_json::to_string_pretty(result).unwrap_or_default()
}

fn invalid(reason: impl Into<String>) -> crate::error::Error {
    crate::error::Error::InvalidParameter {
        reason: reason.into(),
    }
}

/// Archive name offered for a job's bundle
pub fn bundle_file_name(job_id: &str) -> String {
    format!("highlighted_pdfs_{}.zip", job_id)
}

// ============================================================================
// Tool implementations
// ============================================================================

#[tool_router]
impl MarkerServer {
    pub fn new() -> Self {
        Self::with_config(ServerConfig::default())
    }

    /// Create a new MarkerServer with full configuration
    pub fn with_config(config: ServerConfig) -> Self {
        let manager = JobManager::new(config.work_dir.clone(), config.job_ttl);
        Self::with_manager(config, manager)
    }

    /// Create a new MarkerServer around an existing job manager
    pub fn with_manager(config: ServerConfig, manager: JobManager) -> Self {
        Self {
            manager,
            tool_router: Self::tool_router(),
            config: Arc::new(config),
        }
    }

    /// List spreadsheet columns
    #[tool(
        description = "List the column headers of a spreadsheet (first sheet for workbooks). Use this to pick the identifier and site columns before submit_job."
    )]
    async fn list_columns(&self, Parameters(params): Parameters<ListColumnsParams>) -> String {
        let result = self
            .process_list_columns(&params)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "list_columns failed");
                ListColumnsResult {
                    spreadsheet_path: params.spreadsheet_path.clone(),
                    columns: vec![],
                    error: Some(e.client_message()),
                }
            });

        to_json(&result)
    }

    /// Start a marking job
    #[tool(
        description = "Start a background job that finds every UAN or ESIC number of each site in the PDF, marks the matches and writes one trimmed PDF per site.

UAN output keeps the first page, the last page and every page with a match. ESIC output keeps the first page and every page with a match.

Returns a job_id; poll job_progress until status is \"completed\" or \"error\"."
    )]
    async fn submit_job(&self, Parameters(params): Parameters<SubmitJobParams>) -> String {
        let result = self.process_submit_job(&params).await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "submit_job failed");
            SubmitJobResult {
                job_id: None,
                status: None,
                error: Some(e.client_message()),
            }
        });

        to_json(&result)
    }

    /// Poll job progress
    #[tool(
        description = "Get the progress (0-100) and status (processing, completed, error) of a job."
    )]
    async fn job_progress(&self, Parameters(params): Parameters<JobParams>) -> String {
        let result = match self.manager.progress(&params.job_id) {
            Ok(progress) => JobProgressResult {
                job_id: params.job_id.clone(),
                progress: progress.progress,
                status: Some(progress.status),
                error: None,
            },
            Err(e) => {
                tracing::warn!(error = %e, "job_progress failed");
                JobProgressResult {
                    job_id: params.job_id.clone(),
                    progress: 0,
                    status: None,
                    error: Some(e.client_message()),
                }
            }
        };

        to_json(&result)
    }

    /// List produced files
    #[tool(
        description = "List the PDFs a job has produced so far, plus the outcome of every processed site (written, no_matches or failed)."
    )]
    async fn list_results(&self, Parameters(params): Parameters<JobParams>) -> String {
        let result = self.process_list_results(&params).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "list_results failed");
            ListResultsResult {
                job_id: params.job_id.clone(),
                files: vec![],
                sites: vec![],
                error: Some(e.client_message()),
            }
        });

        to_json(&result)
    }

    /// Fetch one produced PDF
    #[tool(
        description = "Fetch one PDF produced by a job. Saves it to output_path when given, otherwise returns it base64-encoded."
    )]
    async fn get_result(&self, Parameters(params): Parameters<GetResultParams>) -> String {
        let result = self.process_get_result(&params).await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "get_result failed");
            FileResult {
                job_id: params.job_id.clone(),
                file_name: params.file_name.clone(),
                size: 0,
                output_path: None,
                base64: None,
                error: Some(e.client_message()),
            }
        });

        to_json(&result)
    }

    /// Fetch every produced PDF as a zip
    #[tool(
        description = "Bundle every PDF produced by a job into a zip archive. Saves it to output_path when given, otherwise returns it base64-encoded."
    )]
    async fn download_zip(&self, Parameters(params): Parameters<DownloadZipParams>) -> String {
        let result = self.process_download_zip(&params).await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "download_zip failed");
            FileResult {
                job_id: params.job_id.clone(),
                file_name: bundle_file_name(&params.job_id),
                size: 0,
                output_path: None,
                base64: None,
                error: Some(e.client_message()),
            }
        });

        to_json(&result)
    }

    /// Delete a job
    #[tool(
        description = "Delete a finished job: its staged inputs, its produced PDFs and its progress record. Jobs still processing cannot be deleted."
    )]
    async fn cleanup_job(&self, Parameters(params): Parameters<JobParams>) -> String {
        let result = match self.manager.cleanup(&params.job_id) {
            Ok(()) => CleanupResult {
                job_id: params.job_id.clone(),
                cleaned: true,
                error: None,
            },
            Err(e) => {
                tracing::warn!(error = %e, "cleanup_job failed");
                CleanupResult {
                    job_id: params.job_id.clone(),
                    cleaned: false,
                    error: Some(e.client_message()),
                }
            }
        };

        to_json(&result)
    }
}

impl MarkerServer {
    async fn process_list_columns(
        &self,
        params: &ListColumnsParams,
    ) -> crate::error::Result<ListColumnsResult> {
        let path = self.validate_path_access(&params.spreadsheet_path)?;

        let columns = tokio::task::spawn_blocking(move || list_columns(path))
            .await
            .map_err(|e| crate::error::Error::Unexpected {
                reason: format!("Task join error: {}", e),
            })??;

        Ok(ListColumnsResult {
            spreadsheet_path: params.spreadsheet_path.clone(),
            columns,
            error: None,
        })
    }

    async fn process_submit_job(
        &self,
        params: &SubmitJobParams,
    ) -> crate::error::Result<SubmitJobResult> {
        let request = self.build_request(params)?;
        let handle = self.manager.submit(request).await?;

        Ok(SubmitJobResult {
            job_id: Some(handle.job_id().to_string()),
            status: Some(JobStatus::Processing),
            error: None,
        })
    }

    /// Turn tool arguments into a job request, applying defaults
    fn build_request(&self, params: &SubmitJobParams) -> crate::error::Result<JobRequest> {
        let spreadsheet_path = self.validate_path_access(&params.spreadsheet_path)?;
        let pdf_path = self.validate_path_access(&params.pdf_path)?;

        let kind: IdentifierKind = params.identifier_type.parse().map_err(invalid)?;
        if params.identifier_column.trim().is_empty() || params.site_column.trim().is_empty() {
            return Err(invalid("identifier_column and site_column are required"));
        }

        let defaults = AnnotationSpec::default();
        let mode = match &params.mode {
            Some(mode) => mode.parse::<HighlightMode>().map_err(invalid)?,
            None => defaults.mode,
        };

        let opacity = params.opacity.unwrap_or(defaults.opacity);
        if !(0.0..=1.0).contains(&opacity) {
            return Err(invalid("opacity must be between 0.0 and 1.0"));
        }

        let border_width = params.border_width.unwrap_or(defaults.border_width);
        if !border_width.is_finite() || border_width < 0.0 {
            return Err(invalid("border_width must be a non-negative number"));
        }

        let margins = match params.margin {
            Some(margin) if !margin.is_finite() || margin < 0.0 => {
                return Err(invalid("margin must be a non-negative number"));
            }
            Some(margin) => Margins::uniform(margin),
            None => defaults.margins,
        };

        Ok(JobRequest {
            spreadsheet_path,
            pdf_path,
            identifier_column: params.identifier_column.clone(),
            site_column: params.site_column.clone(),
            kind,
            spec: AnnotationSpec {
                margins,
                border_color: params
                    .color
                    .as_deref()
                    .map(Rgb::from_name)
                    .unwrap_or(defaults.border_color),
                special_color: params
                    .special_color
                    .as_deref()
                    .map(Rgb::from_name)
                    .unwrap_or(defaults.special_color),
                border_width,
                mode,
                opacity,
            },
        })
    }

    fn process_list_results(&self, params: &JobParams) -> crate::error::Result<ListResultsResult> {
        let snapshot = self.manager.snapshot(&params.job_id)?;
        let files = self.manager.results(&params.job_id)?;

        Ok(ListResultsResult {
            job_id: params.job_id.clone(),
            files,
            sites: snapshot.sites,
            error: None,
        })
    }

    async fn process_get_result(&self, params: &GetResultParams) -> crate::error::Result<FileResult> {
        let manager = self.manager.clone();
        let job_id = params.job_id.clone();
        let file_name = params.file_name.clone();

        let data = tokio::task::spawn_blocking(move || manager.result_file(&job_id, &file_name))
            .await
            .map_err(|e| crate::error::Error::Unexpected {
                reason: format!("Task join error: {}", e),
            })??;

        self.file_result(&params.job_id, &params.file_name, &params.output_path, data)
    }

    async fn process_download_zip(
        &self,
        params: &DownloadZipParams,
    ) -> crate::error::Result<FileResult> {
        let manager = self.manager.clone();
        let job_id = params.job_id.clone();

        let data = tokio::task::spawn_blocking(move || manager.bundle(&job_id))
            .await
            .map_err(|e| crate::error::Error::Unexpected {
                reason: format!("Task join error: {}", e),
            })??;

        self.file_result(
            &params.job_id,
            &bundle_file_name(&params.job_id),
            &params.output_path,
            data,
        )
    }

    /// Save `data` to `output_path` if given, otherwise inline it as base64
    fn file_result(
        &self,
        job_id: &str,
        file_name: &str,
        output_path: &Option<String>,
        data: Vec<u8>,
    ) -> crate::error::Result<FileResult> {
        let written = self.write_output(output_path, &data)?;
        let base64 = match written {
            Some(_) => None,
            None => Some(base64::engine::general_purpose::STANDARD.encode(&data)),
        };

        Ok(FileResult {
            job_id: job_id.to_string(),
            file_name: file_name.to_string(),
            size: data.len(),
            output_path: written,
            base64,
            error: None,
        })
    }

    /// Validate that a path is within allowed resource directories.
    /// Returns the canonicalized path if access is allowed.
    fn validate_path_access(&self, path: &str) -> crate::error::Result<PathBuf> {
        if self.config.resource_dirs.is_empty() {
            return Ok(PathBuf::from(path));
        }

        let canonical =
            std::fs::canonicalize(path).map_err(|_| crate::error::Error::PathAccessDenied {
                path: path.to_string(),
            })?;

        for dir in &self.config.resource_dirs {
            if let Ok(canonical_dir) = std::fs::canonicalize(dir) {
                if canonical.starts_with(&canonical_dir) {
                    return Ok(canonical);
                }
            }
        }

        Err(crate::error::Error::PathAccessDenied {
            path: path.to_string(),
        })
    }

    /// Validate an output path: its parent must exist inside a resource directory
    fn validate_output_path_access(&self, path: &str) -> crate::error::Result<PathBuf> {
        if self.config.resource_dirs.is_empty() {
            return Ok(PathBuf::from(path));
        }

        let path_obj = Path::new(path);
        let parent = path_obj.parent().unwrap_or(Path::new("."));

        let canonical_parent =
            std::fs::canonicalize(parent).map_err(|_| crate::error::Error::PathAccessDenied {
                path: path.to_string(),
            })?;

        let canonical_target =
            canonical_parent.join(path_obj.file_name().unwrap_or(std::ffi::OsStr::new("")));

        for dir in &self.config.resource_dirs {
            if let Ok(canonical_dir) = std::fs::canonicalize(dir) {
                if canonical_target.starts_with(&canonical_dir) {
                    return Ok(canonical_target);
                }
            }
        }

        Err(crate::error::Error::PathAccessDenied {
            path: path.to_string(),
        })
    }

    fn write_output(
        &self,
        output_path: &Option<String>,
        data: &[u8],
    ) -> crate::error::Result<Option<String>> {
        if let Some(ref path_str) = output_path {
            self.validate_output_path_access(path_str)?;

            let path = Path::new(path_str);

            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() && !parent.exists() {
                    std::fs::create_dir_all(parent)?;
                }
            }

            std::fs::write(path, data)?;
            Ok(Some(path_str.clone()))
        } else {
            Ok(None)
        }
    }
}

impl Default for MarkerServer {
    fn default() -> Self {
        Self::new()
    }
}

#[tool_handler]
impl ServerHandler for MarkerServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(
                "Marks UAN or ESIC numbers listed in a spreadsheet inside a PDF and produces one \
                 trimmed PDF per site. Use list_columns, then submit_job, poll job_progress, \
                 and fetch outputs with list_results, get_result or download_zip."
                    .into(),
            ),
        }
    }
}

/// Run the MCP server with default configuration
pub async fn run_server() -> Result<()> {
    run_server_with_config(ServerConfig::default()).await
}

/// Run the MCP server with full configuration
pub async fn run_server_with_config(config: ServerConfig) -> Result<()> {
    std::fs::create_dir_all(&config.work_dir)?;
    let server = MarkerServer::with_config(config);

    tracing::info!("Marker server ready, waiting for connections...");

    let service = server.serve(rmcp::transport::io::stdio()).await?;
    service.waiting().await?;

    Ok(())
}
