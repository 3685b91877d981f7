//! Per-site rendering: mark a fresh copy of the source, then trim it

use super::markup::{mark_site, AnnotationSpec};
use super::pdfium::{create_pdfium, PdfiumMarkupDocument};
use super::qpdf::QpdfWrapper;
use crate::error::Result;
use crate::identifiers::{IdentifierKind, SiteGroup};

/// Output PDF for one site
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedSite {
    /// Trimmed PDF bytes
    pub data: Vec<u8>,
    /// Total marks drawn
    pub matches: usize,
    /// Zero-based source pages kept, ascending
    pub pages: Vec<u32>,
}

/// Turns the source PDF and one site's identifiers into that site's output
pub trait SiteRenderer: Send + Sync {
    /// `Ok(None)` when no identifier of the site occurs in the document
    fn render_site(
        &self,
        source: &[u8],
        site: &SiteGroup,
        kind: IdentifierKind,
        spec: &AnnotationSpec,
    ) -> Result<Option<RenderedSite>>;
}

/// Marks with PDFium and trims with qpdf
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfiumRenderer;

impl SiteRenderer for PdfiumRenderer {
    fn render_site(
        &self,
        source: &[u8],
        site: &SiteGroup,
        kind: IdentifierKind,
        spec: &AnnotationSpec,
    ) -> Result<Option<RenderedSite>> {
        let pdfium = create_pdfium()?;
        let mut doc = PdfiumMarkupDocument::load(&pdfium, source)?;

        let marked = match mark_site(&mut doc, site, kind, spec)? {
            Some(marked) => marked,
            None => return Ok(None),
        };

        let annotated = doc.save_to_bytes()?;
        drop(doc);

        let pages = marked.selection.pages();
        let data = QpdfWrapper::select_pages(&annotated, &pages)?;

        Ok(Some(RenderedSite {
            data,
            matches: marked.matches.total(),
            pages,
        }))
    }
}
