//! Error types for the identifier marker

use thiserror::Error;

/// Result type alias for the identifier marker
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the identifier marker
#[derive(Error, Debug)]
pub enum Error {
    /// A required spreadsheet column is absent
    #[error("Required column not found: {column}")]
    MissingColumn { column: String },

    /// No row survived identifier validation
    #[error("No valid identifiers in column {column}")]
    NoValidIdentifiers { column: String },

    /// Spreadsheet format is not supported
    #[error("Unsupported spreadsheet: {path}")]
    UnsupportedSpreadsheet { path: String },

    /// Spreadsheet could not be read
    #[error("Spreadsheet error: {reason}")]
    Spreadsheet { reason: String },

    /// CSV parse error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// PDF file not found
    #[error("PDF not found: {path}")]
    PdfNotFound { path: String },

    /// Invalid PDF file
    #[error("Invalid PDF file: {reason}")]
    InvalidPdf { reason: String },

    /// Page out of bounds
    #[error("Page {page} out of bounds (total: {total})")]
    PageOutOfBounds { page: u32, total: u32 },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// PDFium error
    #[error("PDFium error: {reason}")]
    Pdfium { reason: String },

    /// qpdf error
    #[error("qpdf error: {reason}")]
    QpdfError { reason: String },

    /// Zip archive error
    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// Job id is unknown (never submitted, cleaned up or evicted)
    #[error("Job not found: {job_id}")]
    JobNotFound { job_id: String },

    /// Job has not reached a terminal status yet
    #[error("Job is still processing: {job_id}")]
    JobStillProcessing { job_id: String },

    /// Requested output file does not belong to the job
    #[error("Result not found: {name}")]
    ResultNotFound { name: String },

    /// A tool argument could not be parsed or is out of range
    #[error("Invalid parameter: {reason}")]
    InvalidParameter { reason: String },

    /// Path access denied (outside allowed resource directories)
    #[error("Path access denied: {path}")]
    PathAccessDenied { path: String },

    /// Anything else, including worker panics
    #[error("Unexpected error: {reason}")]
    Unexpected { reason: String },
}

/// Coarse failure classes used when logging job failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Schema,
    EmptyResult,
    Io,
    Unexpected,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorCategory::Schema => "schema",
            ErrorCategory::EmptyResult => "empty_result",
            ErrorCategory::Io => "io",
            ErrorCategory::Unexpected => "unexpected",
        };
        f.write_str(name)
    }
}

impl Error {
    /// Classify this error for job-level reporting.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::MissingColumn { .. } => ErrorCategory::Schema,
            Error::NoValidIdentifiers { .. } => ErrorCategory::EmptyResult,
            Error::UnsupportedSpreadsheet { .. }
            | Error::Spreadsheet { .. }
            | Error::Csv(_)
            | Error::PdfNotFound { .. }
            | Error::InvalidPdf { .. }
            | Error::PageOutOfBounds { .. }
            | Error::Io(_)
            | Error::Pdfium { .. }
            | Error::QpdfError { .. }
            | Error::Zip(_) => ErrorCategory::Io,
            Error::JobNotFound { .. }
            | Error::JobStillProcessing { .. }
            | Error::ResultNotFound { .. }
            | Error::InvalidParameter { .. }
            | Error::PathAccessDenied { .. }
            | Error::Unexpected { .. } => ErrorCategory::Unexpected,
        }
    }

    /// Return a sanitized error message safe to send to clients.
    /// Internal details (paths, library errors) are omitted.
    /// Full details should be logged via tracing before calling this.
    pub fn client_message(&self) -> String {
        match self {
            Error::MissingColumn { column } => format!("Required column not found: {}", column),
            Error::NoValidIdentifiers { column } => {
                format!("No valid identifiers in column {}", column)
            }
            Error::UnsupportedSpreadsheet { .. } => "Unsupported spreadsheet format".to_string(),
            Error::Spreadsheet { .. } | Error::Csv(_) => "Failed to read spreadsheet".to_string(),
            Error::PdfNotFound { .. } => "PDF not found".to_string(),
            Error::InvalidPdf { .. } => "Invalid PDF file".to_string(),
            Error::PageOutOfBounds { page, total } => {
                format!("Page {} out of bounds (total: {})", page, total)
            }
            Error::Io(_) => "I/O error".to_string(),
            Error::Pdfium { .. } | Error::QpdfError { .. } => "PDF processing error".to_string(),
            Error::Zip(_) => "Failed to build archive".to_string(),
            Error::JobNotFound { job_id } => format!("Job not found: {}", job_id),
            Error::JobStillProcessing { job_id } => {
                format!("Job is still processing: {}", job_id)
            }
            Error::ResultNotFound { name } => format!("Result not found: {}", name),
            Error::InvalidParameter { reason } => format!("Invalid parameter: {}", reason),
            Error::PathAccessDenied { .. } => "Access denied".to_string(),
            Error::Unexpected { .. } => "Unexpected error".to_string(),
        }
    }
}
