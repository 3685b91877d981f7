//! The per-job pipeline: load identifiers, render each site, record outcomes

use super::registry::{progress_percent, JobRegistry, JobStatus, SiteOutcome};
use super::workspace::{output_file_name, JobWorkspace};
use crate::error::{Error, Result};
use crate::identifiers::{load_from_path, IdentifierKind, SiteGroup};
use crate::pdf::{validate_pdf_header, AnnotationSpec, SiteRenderer};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;

/// Everything a job needs; fixed once submitted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRequest {
    pub spreadsheet_path: PathBuf,
    pub pdf_path: PathBuf,
    pub identifier_column: String,
    pub site_column: String,
    pub kind: IdentifierKind,
    #[serde(default)]
    pub spec: AnnotationSpec,
}

/// Output name for a site, suffixed `_2`, `_3`, ... when two sites
/// sanitize to the same name
fn unique_output_name(site: &str, kind: IdentifierKind, used: &mut HashSet<String>) -> String {
    let base = output_file_name(site, kind);
    if used.insert(base.clone()) {
        return base;
    }

    let stem = base.trim_end_matches(".pdf");
    let (prefix, suffix) = stem.rsplit_once('_').unwrap_or((stem, kind.file_suffix()));
    (2..)
        .map(|n| format!("{}_{}_{}.pdf", prefix, n, suffix))
        .find(|name| used.insert(name.clone()))
        .unwrap_or(base)
}

fn panic_reason(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("renderer panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("renderer panicked: {}", s)
    } else {
        "renderer panicked".to_string()
    }
}

fn render_one(
    job_id: &str,
    source: &[u8],
    site: &SiteGroup,
    request: &JobRequest,
    workspace: &JobWorkspace,
    renderer: &dyn SiteRenderer,
    used: &mut HashSet<String>,
) -> SiteOutcome {
    let rendered = catch_unwind(AssertUnwindSafe(|| {
        renderer.render_site(source, site, request.kind, &request.spec)
    }))
    .unwrap_or_else(|payload| {
        Err(Error::Unexpected {
            reason: panic_reason(payload.as_ref()),
        })
    });

    let result = rendered.and_then(|rendered| match rendered {
        Some(rendered) => {
            let file_name = unique_output_name(site.name(), request.kind, used);
            workspace.write_output(job_id, &file_name, &rendered.data)?;
            Ok(SiteOutcome::Written {
                site: site.name().to_string(),
                file_name,
                matches: rendered.matches,
                pages: rendered.pages.len(),
            })
        }
        None => Ok(SiteOutcome::NoMatches {
            site: site.name().to_string(),
        }),
    });

    match result {
        Ok(outcome) => {
            match &outcome {
                SiteOutcome::Written {
                    file_name, matches, ..
                } => tracing::info!(
                    job_id,
                    site = site.name(),
                    file_name = %file_name,
                    matches,
                    "Site written"
                ),
                _ => tracing::info!(job_id, site = site.name(), "No identifiers found for site"),
            }
            outcome
        }
        Err(e) => {
            tracing::warn!(
                job_id,
                site = site.name(),
                category = %e.category(),
                error = %e,
                "Site failed"
            );
            SiteOutcome::Failed {
                site: site.name().to_string(),
                reason: e.client_message(),
            }
        }
    }
}

fn execute(
    job_id: &str,
    request: &JobRequest,
    registry: &JobRegistry,
    workspace: &JobWorkspace,
    renderer: &dyn SiteRenderer,
) -> Result<JobStatus> {
    let groups = load_from_path(
        &request.spreadsheet_path,
        &request.identifier_column,
        &request.site_column,
        request.kind,
    )?;

    let source = fs::read(&request.pdf_path)?;
    validate_pdf_header(&source)?;

    let total = groups.len();
    let mut used = HashSet::new();
    let mut failed = 0usize;

    for (idx, site) in groups.iter().enumerate() {
        // A job dropped from the registry gets no further files
        if !registry.contains(job_id) {
            return Err(Error::JobNotFound {
                job_id: job_id.to_string(),
            });
        }

        let outcome = render_one(job_id, &source, site, request, workspace, renderer, &mut used);
        if outcome.is_failure() {
            failed += 1;
        }
        if !registry.record_site(job_id, outcome) {
            return Err(Error::JobNotFound {
                job_id: job_id.to_string(),
            });
        }
        registry.set_progress(job_id, progress_percent(idx + 1, total));
    }

    if failed == total {
        Ok(JobStatus::Error)
    } else {
        Ok(JobStatus::Completed)
    }
}

/// Run a job to completion on the current thread and record its terminal
/// status. Sites are processed one at a time; a failing site does not stop
/// the others.
pub fn run_job(
    job_id: &str,
    request: &JobRequest,
    registry: &JobRegistry,
    workspace: &JobWorkspace,
    renderer: &dyn SiteRenderer,
) -> JobStatus {
    tracing::info!(job_id, kind = %request.kind, "Job started");

    let status = match execute(job_id, request, registry, workspace, renderer) {
        Ok(status) => status,
        Err(e) => {
            tracing::error!(
                job_id,
                category = %e.category(),
                error = %e,
                "Job failed"
            );
            JobStatus::Error
        }
    };

    match status {
        JobStatus::Completed => registry.complete(job_id),
        _ => registry.fail(job_id),
    };

    tracing::info!(job_id, status = ?status, "Job finished");
    status
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::pdf::RenderedSite;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    /// Renders a site when any of its identifiers is in `present`;
    /// sites named in `failing` error out, sites named in `panicking` panic
    #[derive(Default)]
    pub(crate) struct FakeRenderer {
        pub(crate) present: Vec<String>,
        pub(crate) failing: Vec<String>,
        pub(crate) panicking: Vec<String>,
        pub(crate) calls: Mutex<Vec<String>>,
    }

    impl FakeRenderer {
        pub(crate) fn with_present(ids: &[&str]) -> Self {
            Self {
                present: ids.iter().map(|s| s.to_string()).collect(),
                ..Self::default()
            }
        }
    }

    impl SiteRenderer for FakeRenderer {
        fn render_site(
            &self,
            _source: &[u8],
            site: &SiteGroup,
            _kind: IdentifierKind,
            _spec: &AnnotationSpec,
        ) -> Result<Option<RenderedSite>> {
            self.calls.lock().push(site.name().to_string());

            if self.panicking.iter().any(|s| s == site.name()) {
                panic!("boom");
            }
            if self.failing.iter().any(|s| s == site.name()) {
                return Err(Error::Pdfium {
                    reason: "cannot open".to_string(),
                });
            }

            let matches = site
                .identifiers()
                .filter(|(id, _)| self.present.iter().any(|p| p == *id))
                .count();
            if matches == 0 {
                return Ok(None);
            }

            Ok(Some(RenderedSite {
                data: format!("%PDF-{}", site.name()).into_bytes(),
                matches,
                pages: vec![0],
            }))
        }
    }

    /// Matches every site and notes the job's progress as each site starts;
    /// optionally drops the job from the registry on the n-th call
    struct ProgressRecorder {
        registry: Arc<JobRegistry>,
        job_id: String,
        seen: Mutex<Vec<u8>>,
        remove_on_call: Option<usize>,
    }

    impl ProgressRecorder {
        fn new(registry: Arc<JobRegistry>, job_id: &str) -> Self {
            Self {
                registry,
                job_id: job_id.to_string(),
                seen: Mutex::new(Vec::new()),
                remove_on_call: None,
            }
        }
    }

    impl SiteRenderer for ProgressRecorder {
        fn render_site(
            &self,
            _source: &[u8],
            site: &SiteGroup,
            _kind: IdentifierKind,
            _spec: &AnnotationSpec,
        ) -> Result<Option<RenderedSite>> {
            let mut seen = self.seen.lock();
            let progress = self
                .registry
                .get(&self.job_id)
                .map(|job| job.progress)
                .unwrap_or_default();
            seen.push(progress);

            if self.remove_on_call == Some(seen.len()) {
                self.registry.remove(&self.job_id);
            }

            Ok(Some(RenderedSite {
                data: format!("%PDF-{}", site.name()).into_bytes(),
                matches: 1,
                pages: vec![0],
            }))
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        request: JobRequest,
        registry: JobRegistry,
        workspace: JobWorkspace,
    }

    fn fixture(csv: &str) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let spreadsheet_path = dir.path().join("ids.csv");
        let pdf_path = dir.path().join("register.pdf");
        fs::write(&spreadsheet_path, csv).unwrap();
        fs::write(&pdf_path, b"%PDF-1.4\n").unwrap();

        let workspace = JobWorkspace::new(dir.path().join("work"));
        Fixture {
            request: JobRequest {
                spreadsheet_path,
                pdf_path,
                identifier_column: "UAN".to_string(),
                site_column: "Site".to_string(),
                kind: IdentifierKind::Uan,
                spec: AnnotationSpec::default(),
            },
            registry: JobRegistry::new(),
            workspace,
            _dir: dir,
        }
    }

    const TWO_SITES: &str = "UAN,Site\n111111111111,A\n222222222222,A\n333333333333,B\n";

    #[test]
    fn test_two_sites_one_match() {
        let f = fixture(TWO_SITES);
        let renderer = FakeRenderer::with_present(&["111111111111"]);
        let id = f.registry.create();

        let status = run_job(&id, &f.request, &f.registry, &f.workspace, &renderer);

        assert_eq!(status, JobStatus::Completed);
        assert_eq!(f.workspace.list_outputs(&id).unwrap(), vec!["A_uan.pdf".to_string()]);

        let job = f.registry.get(&id).unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.progress, 100);
        assert_eq!(
            job.sites,
            vec![
                SiteOutcome::Written {
                    site: "A".to_string(),
                    file_name: "A_uan.pdf".to_string(),
                    matches: 1,
                    pages: 1,
                },
                SiteOutcome::NoMatches {
                    site: "B".to_string()
                },
            ]
        );
    }

    const THREE_SITES: &str = "UAN,Site\n111111111111,A\n222222222222,B\n333333333333,C\n";

    #[test]
    fn test_progress_advances_per_site() {
        let f = fixture(THREE_SITES);
        let registry = Arc::new(JobRegistry::new());
        let id = registry.create();
        let renderer = ProgressRecorder::new(registry.clone(), &id);

        let status = run_job(&id, &f.request, &registry, &f.workspace, &renderer);

        assert_eq!(status, JobStatus::Completed);
        assert_eq!(*renderer.seen.lock(), vec![0, 33, 67]);
        let job = registry.get(&id).unwrap();
        assert_eq!(job.progress, 100);
        assert_eq!(job.sites.len(), 3);
    }

    #[test]
    fn test_job_dropped_mid_run_stops() {
        let f = fixture(THREE_SITES);
        let registry = Arc::new(JobRegistry::new());
        let id = registry.create();
        let renderer = ProgressRecorder {
            remove_on_call: Some(1),
            ..ProgressRecorder::new(registry.clone(), &id)
        };

        let status = run_job(&id, &f.request, &registry, &f.workspace, &renderer);

        assert_eq!(status, JobStatus::Error);
        assert_eq!(renderer.seen.lock().len(), 1);
        assert!(registry.get(&id).is_none());
        // Only the site already in flight reached the disk
        assert_eq!(f.workspace.list_outputs(&id).unwrap(), vec!["A_uan.pdf".to_string()]);
    }

    #[test]
    fn test_sites_run_in_first_appearance_order() {
        let f = fixture("UAN,Site\n111111111111,Z\n222222222222,A\n333333333333,Z\n");
        let renderer = FakeRenderer::default();
        let id = f.registry.create();

        run_job(&id, &f.request, &f.registry, &f.workspace, &renderer);

        assert_eq!(*renderer.calls.lock(), vec!["Z".to_string(), "A".to_string()]);
    }

    #[test]
    fn test_site_failure_is_isolated() {
        let f = fixture(TWO_SITES);
        let renderer = FakeRenderer {
            present: vec!["333333333333".to_string()],
            failing: vec!["A".to_string()],
            ..FakeRenderer::default()
        };
        let id = f.registry.create();

        let status = run_job(&id, &f.request, &f.registry, &f.workspace, &renderer);

        assert_eq!(status, JobStatus::Completed);
        assert_eq!(f.workspace.list_outputs(&id).unwrap(), vec!["B_uan.pdf".to_string()]);
        assert!(f.registry.get(&id).unwrap().sites[0].is_failure());
    }

    #[test]
    fn test_panicking_site_is_isolated() {
        let f = fixture(TWO_SITES);
        let renderer = FakeRenderer {
            present: vec!["333333333333".to_string()],
            panicking: vec!["A".to_string()],
            ..FakeRenderer::default()
        };
        let id = f.registry.create();

        let status = run_job(&id, &f.request, &f.registry, &f.workspace, &renderer);

        assert_eq!(status, JobStatus::Completed);
        match &f.registry.get(&id).unwrap().sites[0] {
            SiteOutcome::Failed { site, .. } => assert_eq!(site, "A"),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_every_site_failing_is_an_error() {
        let f = fixture(TWO_SITES);
        let renderer = FakeRenderer {
            failing: vec!["A".to_string(), "B".to_string()],
            ..FakeRenderer::default()
        };
        let id = f.registry.create();

        let status = run_job(&id, &f.request, &f.registry, &f.workspace, &renderer);

        assert_eq!(status, JobStatus::Error);
        assert_eq!(f.registry.get(&id).unwrap().status, JobStatus::Error);
        assert!(f.workspace.list_outputs(&id).unwrap().is_empty());
    }

    #[test]
    fn test_no_matches_anywhere_completes_empty() {
        let f = fixture(TWO_SITES);
        let id = f.registry.create();

        let status = run_job(&id, &f.request, &f.registry, &f.workspace, &FakeRenderer::default());

        assert_eq!(status, JobStatus::Completed);
        assert!(f.workspace.list_outputs(&id).unwrap().is_empty());
    }

    #[test]
    fn test_missing_column_fails_job() {
        let f = fixture("Number,Site\n111111111111,A\n");
        let renderer = FakeRenderer::default();
        let id = f.registry.create();

        let status = run_job(&id, &f.request, &f.registry, &f.workspace, &renderer);

        assert_eq!(status, JobStatus::Error);
        assert!(renderer.calls.lock().is_empty());
        assert_eq!(f.registry.get(&id).unwrap().progress, 0);
    }

    #[test]
    fn test_no_valid_identifiers_fails_job() {
        let f = fixture("UAN,Site\n12345,A\nabc,B\n");
        let id = f.registry.create();

        let status = run_job(&id, &f.request, &f.registry, &f.workspace, &FakeRenderer::default());
        assert_eq!(status, JobStatus::Error);
    }

    #[test]
    fn test_invalid_pdf_fails_job() {
        let f = fixture(TWO_SITES);
        fs::write(&f.request.pdf_path, b"hello").unwrap();
        let id = f.registry.create();

        let status = run_job(&id, &f.request, &f.registry, &f.workspace, &FakeRenderer::default());
        assert_eq!(status, JobStatus::Error);
    }

    #[test]
    fn test_colliding_site_names_get_distinct_files() {
        let f = fixture("UAN,Site\n111111111111,A/B\n222222222222,A B\n");
        let renderer = FakeRenderer::with_present(&["111111111111", "222222222222"]);
        let id = f.registry.create();

        run_job(&id, &f.request, &f.registry, &f.workspace, &renderer);

        assert_eq!(
            f.workspace.list_outputs(&id).unwrap(),
            vec!["A_B_2_uan.pdf".to_string(), "A_B_uan.pdf".to_string()]
        );
    }

    #[test]
    fn test_unique_output_name() {
        let mut used = HashSet::new();
        assert_eq!(unique_output_name("X", IdentifierKind::Esic, &mut used), "X_esic.pdf");
        assert_eq!(unique_output_name("X", IdentifierKind::Esic, &mut used), "X_2_esic.pdf");
        assert_eq!(unique_output_name("X", IdentifierKind::Esic, &mut used), "X_3_esic.pdf");
    }
}
