//! PDFium-backed markup document

use super::markup::{to_byte, Mark, MarkupDocument, Rgb};
use super::text::{PageText, Rect};
use crate::error::{Error, Result};
use pdfium_render::prelude::*;

/// Get PDFium instance (creates new instance each time - PDFium is not thread-safe)
pub fn create_pdfium() -> Result<Pdfium> {
    // Try to bind to system library or use static linking
    let bindings = Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
        .or_else(|_| {
            Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(
                "/opt/pdfium/lib",
            ))
        })
        .or_else(|_| Pdfium::bind_to_system_library())
        .map_err(|e| Error::Pdfium {
            reason: format!("Failed to initialize PDFium: {}", e),
        })?;

    Ok(Pdfium::new(bindings))
}

/// Reject data that does not start with a PDF header
pub fn validate_pdf_header(data: &[u8]) -> Result<()> {
    if data.len() < 4 || &data[0..4] != b"%PDF" {
        return Err(Error::InvalidPdf {
            reason: "Not a valid PDF file".to_string(),
        });
    }
    Ok(())
}

/// Map PDFium errors to our error type
fn map_pdfium_error(err: PdfiumError) -> Error {
    match err {
        PdfiumError::PdfiumLibraryInternalError(PdfiumInternalError::PasswordError) => {
            Error::InvalidPdf {
                reason: "PDF is password protected".to_string(),
            }
        }
        _ => Error::Pdfium {
            reason: format!("{}", err),
        },
    }
}

fn pdf_color(color: Rgb, alpha: u8) -> PdfColor {
    let [r, g, b] = color.to_bytes();
    PdfColor::new(r, g, b, alpha)
}

fn pdf_rect(rect: &Rect) -> PdfRect {
    PdfRect::new_from_values(rect.bottom, rect.left, rect.top, rect.right)
}

/// The single colour given to a square annotation. PDFium keeps one `/CA`
/// alpha per annotation and every colour call rewrites it, so a filled
/// square must not also get a stroke colour.
#[derive(Debug, Clone, Copy)]
enum SquareColor {
    Stroke(PdfColor),
    Fill(PdfColor),
}

fn square_color(mark: &Mark) -> Option<SquareColor> {
    match *mark {
        // Border width is not settable through pdfium-render's annotation API
        Mark::Border { color, .. } => Some(SquareColor::Stroke(pdf_color(color, 255))),
        Mark::Fill { color, opacity, .. } => {
            Some(SquareColor::Fill(pdf_color(color, to_byte(opacity))))
        }
        Mark::Underline { .. } => None,
    }
}

/// A loaded document that marks are drawn into
pub struct PdfiumMarkupDocument<'a> {
    document: PdfDocument<'a>,
}

impl<'a> PdfiumMarkupDocument<'a> {
    /// Load a document from bytes; the bytes must outlive it
    pub fn load(pdfium: &'a Pdfium, data: &'a [u8]) -> Result<Self> {
        validate_pdf_header(data)?;

        let document = pdfium
            .load_pdf_from_byte_slice(data, None)
            .map_err(map_pdfium_error)?;

        Ok(Self { document })
    }

    /// Serialize the document including every mark drawn so far
    pub fn save_to_bytes(&self) -> Result<Vec<u8>> {
        self.document.save_to_bytes().map_err(|e| Error::Pdfium {
            reason: format!("Failed to save marked PDF: {}", e),
        })
    }

    fn page(&self, page: u32) -> Result<PdfPage<'a>> {
        self.document
            .pages()
            .get(page as _)
            .map_err(|e| Error::Pdfium {
                reason: format!("Failed to get page {}: {}", page + 1, e),
            })
    }
}

impl MarkupDocument for PdfiumMarkupDocument<'_> {
    fn page_count(&self) -> u32 {
        self.document.pages().len() as u32
    }

    fn page_text(&self, page: u32) -> Result<PageText> {
        let page = self.page(page)?;
        let text_obj = match page.text() {
            Ok(t) => t,
            Err(_) => return Ok(PageText::default()),
        };

        // Page-wide chars keep PDFium's generated spaces and line breaks
        let mut text = PageText::default();
        for char_result in text_obj.chars().iter() {
            let Some(c) = char_result.unicode_char() else {
                continue;
            };
            let bounds = if char_result.is_generated().unwrap_or(false) {
                None
            } else {
                char_result.loose_bounds().ok().map(|b| {
                    Rect::new(
                        b.left().value,
                        b.bottom().value,
                        b.right().value,
                        b.top().value,
                    )
                })
            };
            text.push_glyph(c, bounds);
        }

        Ok(text)
    }

    fn add_marks(&mut self, page: u32, marks: &[Mark]) -> Result<()> {
        let mut page = self.page(page)?;

        for mark in marks {
            match *mark {
                Mark::Border { rect, .. } | Mark::Fill { rect, .. } => {
                    let mut annotation = page
                        .annotations_mut()
                        .create_square_annotation()
                        .map_err(map_pdfium_error)?;
                    annotation
                        .set_bounds(pdf_rect(&rect))
                        .map_err(map_pdfium_error)?;
                    match square_color(mark) {
                        Some(SquareColor::Stroke(color)) => annotation.set_stroke_color(color),
                        Some(SquareColor::Fill(color)) => annotation.set_fill_color(color),
                        None => Ok(()),
                    }
                    .map_err(map_pdfium_error)?;
                }
                Mark::Underline {
                    x0,
                    x1,
                    y,
                    color,
                    width,
                } => {
                    page.objects_mut()
                        .create_path_object_line(
                            PdfPoints::new(x0),
                            PdfPoints::new(y),
                            PdfPoints::new(x1),
                            PdfPoints::new(y),
                            pdf_color(color, 255),
                            PdfPoints::new(width),
                        )
                        .map_err(map_pdfium_error)?;
                }
            }
        }

        Ok(())
    }
}
