//! qpdf FFI wrapper for page trimming
//!
//! Builds a new PDF from a subset of pages and writes it with compressed
//! streams, generated object streams and unreferenced objects dropped.

use crate::error::{Error, Result};
use qpdf::{ObjectStreamMode, QPdf};

/// Wrapper for qpdf operations via FFI
pub struct QpdfWrapper;

/// Map qpdf crate errors to our error types
fn map_qpdf_error(e: qpdf::QPdfError) -> Error {
    Error::QpdfError {
        reason: e.to_string(),
    }
}

impl QpdfWrapper {
    /// Copy the given zero-based pages, in the given order, into a new PDF
    ///
    /// # Arguments
    /// * `input_data` - Raw PDF bytes
    /// * `pages` - Zero-based page indices; callers pass them ascending
    ///
    /// # Returns
    /// The trimmed, compressed PDF as bytes
    pub fn select_pages(input_data: &[u8], pages: &[u32]) -> Result<Vec<u8>> {
        if pages.is_empty() {
            return Err(Error::QpdfError {
                reason: "No pages selected".to_string(),
            });
        }

        let source = QPdf::read_from_memory(input_data).map_err(map_qpdf_error)?;
        let num_pages = source.get_num_pages().map_err(map_qpdf_error)?;

        let dest = QPdf::empty();

        for &idx in pages {
            let page = source.get_page(idx).ok_or(Error::PageOutOfBounds {
                page: idx + 1,
                total: num_pages,
            })?;
            let copied = dest.copy_from_foreign(&page);
            dest.add_page(&copied, false).map_err(map_qpdf_error)?;
        }

        let mut writer = dest.writer();
        writer
            .object_stream_mode(ObjectStreamMode::Generate)
            .compress_streams(true)
            .preserve_unreferenced_objects(false)
            .preserve_encryption(false);
        writer.write_to_memory().map_err(map_qpdf_error)
    }

    /// Get the page count of a PDF
    pub fn get_page_count(input_data: &[u8]) -> Result<u32> {
        let qpdf = QPdf::read_from_memory(input_data).map_err(map_qpdf_error)?;
        qpdf.get_num_pages().map_err(map_qpdf_error)
    }
}
