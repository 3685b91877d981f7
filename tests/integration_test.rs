//! Integration tests for the PDF identifier marker
//!
//! PDFium is not needed here: page text comes from a scripted document,
//! while trimming runs through qpdf on generated PDFs.

use pdf_id_marker::identifiers::{list_columns, load_from_path, IdentifierKind, SiteGroup};
use pdf_id_marker::job::{JobManager, JobRegistry, JobStatus, JobWorkspace, SiteOutcome};
use pdf_id_marker::pdf::{
    mark_site, AnnotationSpec, Mark, MarkupDocument, PageText, PositionedChar, QpdfWrapper, Rect,
    RenderedSite, SiteRenderer,
};
use pdf_id_marker::{JobRequest, Result};
use pretty_assertions::assert_eq;
use qpdf::{QPdf, QPdfArray, QPdfScalar};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// PDF with `page_count` empty pages and a valid xref table; page `i` is
/// `600 + i` points wide so pages can be told apart after trimming
fn blank_pdf(page_count: usize) -> Vec<u8> {
    let mut out = b"%PDF-1.4\n".to_vec();
    let mut offsets = Vec::new();
    let kids: Vec<String> = (0..page_count).map(|i| format!("{} 0 R", 3 + i)).collect();

    let mut objects = vec![
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        format!(
            "<< /Type /Pages /Kids [{}] /Count {} >>",
            kids.join(" "),
            page_count
        ),
    ];
    for i in 0..page_count {
        objects.push(format!(
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {} 792] >>",
            600 + i
        ));
    }

    for (i, body) in objects.iter().enumerate() {
        offsets.push(out.len());
        out.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", i + 1, body).as_bytes());
    }

    let xref = out.len();
    out.extend_from_slice(format!("xref\n0 {}\n", objects.len() + 1).as_bytes());
    out.extend_from_slice(b"0000000000 65535 f \n");
    for offset in offsets {
        out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    out.extend_from_slice(
        format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
            objects.len() + 1,
            xref
        )
        .as_bytes(),
    );
    out
}

/// Source page index of every page in `data`, read back from its width
fn source_pages(data: &[u8]) -> Vec<i32> {
    let pdf = QPdf::read_from_memory(data).unwrap();
    pdf.get_pages()
        .unwrap()
        .iter()
        .map(|page| {
            let media_box = QPdfArray::from(page.get("/MediaBox").unwrap());
            QPdfScalar::from(media_box.get(2).unwrap()).as_i32() - 600
        })
        .collect()
}

/// One line of fixed-pitch text per page
struct ScriptedDocument {
    pages: Vec<String>,
    marks: usize,
}

impl MarkupDocument for ScriptedDocument {
    fn page_count(&self) -> u32 {
        self.pages.len() as u32
    }

    fn page_text(&self, page: u32) -> Result<PageText> {
        let line = &self.pages[page as usize];
        let chars = line
            .chars()
            .enumerate()
            .map(|(i, ch)| {
                let left = 40.0 + i as f32 * 5.0;
                PositionedChar::new(ch, Some(Rect::new(left, 700.0, left + 5.0, 710.0)))
            })
            .collect();
        Ok(PageText::new(chars))
    }

    fn add_marks(&mut self, _page: u32, marks: &[Mark]) -> Result<()> {
        self.marks += marks.len();
        Ok(())
    }
}

/// Searches scripted page text and trims the real source PDF with qpdf
struct ScriptedRenderer {
    pages: Vec<String>,
}

impl SiteRenderer for ScriptedRenderer {
    fn render_site(
        &self,
        source: &[u8],
        site: &SiteGroup,
        kind: IdentifierKind,
        spec: &AnnotationSpec,
    ) -> Result<Option<RenderedSite>> {
        let mut doc = ScriptedDocument {
            pages: self.pages.clone(),
            marks: 0,
        };
        let marked = match mark_site(&mut doc, site, kind, spec)? {
            Some(marked) => marked,
            None => return Ok(None),
        };
        assert_eq!(doc.marks, marked.matches.total());

        let pages = marked.selection.pages();
        let data = QpdfWrapper::select_pages(source, &pages)?;
        Ok(Some(RenderedSite {
            data,
            matches: marked.matches.total(),
            pages,
        }))
    }
}

fn seven_page_register() -> Vec<String> {
    vec![
        "Contribution register".to_string(),
        "UAN 999999999999".to_string(),
        "UAN 111111111111 and 111111111111".to_string(),
        "UAN 333333333333".to_string(),
        "no identifiers here".to_string(),
        "UAN 222222222222".to_string(),
        "Totals".to_string(),
    ]
}

fn write_inputs(dir: &Path, csv: &str, pages: usize) -> JobRequest {
    let spreadsheet_path = dir.join("ids.csv");
    let pdf_path = dir.join("register.pdf");
    fs::write(&spreadsheet_path, csv).unwrap();
    fs::write(&pdf_path, blank_pdf(pages)).unwrap();

    JobRequest {
        spreadsheet_path,
        pdf_path,
        identifier_column: "UAN".to_string(),
        site_column: "Site".to_string(),
        kind: IdentifierKind::Uan,
        spec: AnnotationSpec::default(),
    }
}

fn manager(dir: &Path, renderer: ScriptedRenderer) -> JobManager {
    JobManager::with_parts(
        Arc::new(JobRegistry::new()),
        JobWorkspace::new(dir.join("work")),
        Arc::new(renderer),
        Duration::from_secs(3600),
    )
}

#[test]
fn test_load_identifiers_from_csv() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ids.csv");
    fs::write(
        &path,
        "UAN,Site\n 111111111111.0 ,Pune\n12345,Pune\n222222222222, Delhi \n333333333333,\n",
    )
    .unwrap();

    assert_eq!(
        list_columns(&path).unwrap(),
        vec!["UAN".to_string(), "Site".to_string()]
    );

    let groups = load_from_path(&path, "UAN", "Site", IdentifierKind::Uan).unwrap();
    let names: Vec<&str> = groups.iter().map(|g| g.name()).collect();
    assert_eq!(names, vec!["Pune", "Delhi"]);
    assert!(groups.get("Pune").unwrap().contains("111111111111"));
    assert_eq!(groups.identifier_count(), 2);
}

#[test]
fn test_trim_keeps_requested_pages() {
    let source = blank_pdf(7);
    let trimmed = QpdfWrapper::select_pages(&source, &[0, 2, 5, 6]).unwrap();

    assert!(trimmed.starts_with(b"%PDF"));
    assert_eq!(source_pages(&trimmed), vec![0, 2, 5, 6]);
}

#[tokio::test]
async fn test_job_writes_one_trimmed_pdf_per_site() {
    let dir = tempfile::tempdir().unwrap();
    let request = write_inputs(
        dir.path(),
        "UAN,Site\n111111111111,A\n222222222222,A\n333333333333,B\n444444444444,C\n",
        7,
    );
    let manager = manager(
        dir.path(),
        ScriptedRenderer {
            pages: seven_page_register(),
        },
    );

    let handle = manager.submit(request).await.unwrap();
    let job_id = handle.job_id().to_string();
    assert_eq!(handle.wait().await, JobStatus::Completed);

    assert_eq!(
        manager.results(&job_id).unwrap(),
        vec!["A_uan.pdf".to_string(), "B_uan.pdf".to_string()]
    );

    // A: first page, matches on pages 2 and 5, last page
    let a = manager.result_file(&job_id, "A_uan.pdf").unwrap();
    assert_eq!(source_pages(&a), vec![0, 2, 5, 6]);

    // B: first page, match on page 3, last page
    let b = manager.result_file(&job_id, "B_uan.pdf").unwrap();
    assert_eq!(source_pages(&b), vec![0, 3, 6]);

    let snapshot = manager.snapshot(&job_id).unwrap();
    assert_eq!(snapshot.progress, 100);
    assert_eq!(
        snapshot.sites[0],
        SiteOutcome::Written {
            site: "A".to_string(),
            file_name: "A_uan.pdf".to_string(),
            matches: 3,
            pages: 4,
        }
    );
    assert_eq!(
        snapshot.sites[2],
        SiteOutcome::NoMatches {
            site: "C".to_string()
        }
    );
}

#[tokio::test]
async fn test_esic_job_keeps_only_first_and_matched_pages() {
    let dir = tempfile::tempdir().unwrap();
    let mut request = write_inputs(dir.path(), "ESIC,Site\n1234567890,North\n", 4);
    request.identifier_column = "ESIC".to_string();
    request.kind = IdentifierKind::Esic;

    let manager = manager(
        dir.path(),
        ScriptedRenderer {
            pages: vec![
                "cover".to_string(),
                "nothing".to_string(),
                "ESIC 1234567890".to_string(),
                "last".to_string(),
            ],
        },
    );

    let handle = manager.submit(request).await.unwrap();
    let job_id = handle.job_id().to_string();
    assert_eq!(handle.wait().await, JobStatus::Completed);

    let data = manager.result_file(&job_id, "North_esic.pdf").unwrap();
    assert_eq!(source_pages(&data), vec![0, 2]);
}

#[tokio::test]
async fn test_bundle_and_cleanup() {
    let dir = tempfile::tempdir().unwrap();
    let request = write_inputs(
        dir.path(),
        "UAN,Site\n111111111111,A\n333333333333,B\n",
        7,
    );
    let manager = manager(
        dir.path(),
        ScriptedRenderer {
            pages: seven_page_register(),
        },
    );

    let handle = manager.submit(request).await.unwrap();
    let job_id = handle.job_id().to_string();
    handle.wait().await;

    let bundle = manager.bundle(&job_id).unwrap();
    let archive = zip::ZipArchive::new(std::io::Cursor::new(bundle)).unwrap();
    assert_eq!(archive.len(), 2);

    manager.cleanup(&job_id).unwrap();
    assert!(manager.results(&job_id).is_err());
    assert!(!dir.path().join("work").join(&job_id).exists());
}
