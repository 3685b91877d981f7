//! PDF processing layer
//!
//! Identifier search and marking use PDFium; page trimming uses qpdf.

mod markup;
mod pdfium;
mod qpdf;
mod render;
mod text;

pub use markup::{
    annotate_site, mark_site, AnnotationSpec, HighlightMode, Margins, Mark, MarkedSite,
    MarkupDocument, PageSelection, Rgb, SiteMatches, UNDERLINE_OFFSET,
};
pub use pdfium::{create_pdfium, validate_pdf_header, PdfiumMarkupDocument};
pub use qpdf::QpdfWrapper;
pub use render::{PdfiumRenderer, RenderedSite, SiteRenderer};
pub use text::{PageText, PositionedChar, Rect};
