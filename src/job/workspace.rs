//! Per-job directories on disk
//!
//! Layout: `<root>/<job_id>/input` holds staged copies of the uploaded
//! files, `<root>/<job_id>/output` holds one PDF per site.

use crate::error::{Error, Result};
use crate::identifiers::IdentifierKind;
use std::fs;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use zip::write::SimpleFileOptions;

const INPUT_DIR: &str = "input";
const OUTPUT_DIR: &str = "output";

/// Replace every character that is not alphanumeric with `_`; letters and
/// digits of any script are kept
pub fn sanitize_site_name(site: &str) -> String {
    site.chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect()
}

/// `<sanitized site>_<uan|esic>.pdf`
pub fn output_file_name(site: &str, kind: IdentifierKind) -> String {
    format!("{}_{}.pdf", sanitize_site_name(site), kind.file_suffix())
}

/// True for a single, plain path component
fn is_plain_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\'])
        && Path::new(name).file_name().map(|n| n == name).unwrap_or(false)
}

/// Root directory under which every job gets its own folder
#[derive(Debug, Clone)]
pub struct JobWorkspace {
    root: PathBuf,
}

impl JobWorkspace {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn job_dir(&self, job_id: &str) -> Result<PathBuf> {
        if !is_plain_name(job_id) {
            return Err(Error::JobNotFound {
                job_id: job_id.to_string(),
            });
        }
        Ok(self.root.join(job_id))
    }

    pub fn input_dir(&self, job_id: &str) -> Result<PathBuf> {
        Ok(self.job_dir(job_id)?.join(INPUT_DIR))
    }

    pub fn output_dir(&self, job_id: &str) -> Result<PathBuf> {
        Ok(self.job_dir(job_id)?.join(OUTPUT_DIR))
    }

    /// Copy `source` into the job's input folder, keeping its file name
    pub fn stage_input(&self, job_id: &str, source: &Path) -> Result<PathBuf> {
        let file_name = source.file_name().ok_or_else(|| Error::Unexpected {
            reason: format!("Input path has no file name: {}", source.display()),
        })?;

        let dir = self.input_dir(job_id)?;
        fs::create_dir_all(&dir)?;

        let target = dir.join(file_name);
        fs::copy(source, &target)?;
        Ok(target)
    }

    /// Write one output file; `file_name` must be a plain name
    pub fn write_output(&self, job_id: &str, file_name: &str, data: &[u8]) -> Result<PathBuf> {
        if !is_plain_name(file_name) {
            return Err(Error::Unexpected {
                reason: format!("Invalid output file name: {}", file_name),
            });
        }

        let dir = self.output_dir(job_id)?;
        fs::create_dir_all(&dir)?;

        let target = dir.join(file_name);
        fs::write(&target, data)?;
        Ok(target)
    }

    /// Names of the PDFs produced so far, sorted
    pub fn list_outputs(&self, job_id: &str) -> Result<Vec<String>> {
        let dir = self.output_dir(job_id)?;
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut names = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.to_lowercase().ends_with(".pdf") {
                names.push(name);
            }
        }

        names.sort();
        Ok(names)
    }

    /// Bytes of one produced file. Only names listed by `list_outputs` resolve.
    pub fn read_output(&self, job_id: &str, file_name: &str) -> Result<Vec<u8>> {
        let not_found = || Error::ResultNotFound {
            name: file_name.to_string(),
        };

        if !is_plain_name(file_name) {
            return Err(not_found());
        }
        if !self.list_outputs(job_id)?.iter().any(|n| n == file_name) {
            return Err(not_found());
        }

        Ok(fs::read(self.output_dir(job_id)?.join(file_name))?)
    }

    /// Zip every produced PDF at the archive root
    pub fn bundle(&self, job_id: &str) -> Result<Vec<u8>> {
        let dir = self.output_dir(job_id)?;
        let names = self.list_outputs(job_id)?;

        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options =
            SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

        for name in &names {
            let data = fs::read(dir.join(name))?;
            writer.start_file(name.as_str(), options)?;
            writer.write_all(&data)?;
        }

        Ok(writer.finish()?.into_inner())
    }

    /// Delete the job's folder; `false` if there was nothing to delete
    pub fn remove(&self, job_id: &str) -> Result<bool> {
        let dir = self.job_dir(job_id)?;
        if !dir.exists() {
            return Ok(false);
        }
        fs::remove_dir_all(&dir)?;
        Ok(true)
    }
}
