//! Tabular input: the first sheet of a workbook, or a CSV file

use crate::error::{Error, Result};
use calamine::{open_workbook_auto, Data, Reader};
use std::path::Path;

const WORKBOOK_EXTENSIONS: &[&str] = &["xlsx", "xlsm", "xlsb", "xls", "ods"];

/// A header row plus data rows, every cell rendered to text
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { headers, rows }
    }

    /// Read a spreadsheet, dispatching on the file extension
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("spreadsheet not found: {}", path.display()),
            )));
        }

        match extension(path).as_deref() {
            Some("csv") => Self::read_csv(path),
            Some(ext) if WORKBOOK_EXTENSIONS.contains(&ext) => Self::read_workbook(path),
            _ => Err(Error::UnsupportedSpreadsheet {
                path: path.display().to_string(),
            }),
        }
    }

    fn read_csv(path: &Path) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(path)?;

        let headers = reader.headers()?.iter().map(str::to_string).collect();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            rows.push(record.iter().map(str::to_string).collect());
        }

        Ok(Self { headers, rows })
    }

    fn read_workbook(path: &Path) -> Result<Self> {
        let mut workbook = open_workbook_auto(path).map_err(|e| Error::Spreadsheet {
            reason: e.to_string(),
        })?;

        let range = workbook
            .worksheet_range_at(0)
            .ok_or_else(|| Error::Spreadsheet {
                reason: "workbook has no sheets".to_string(),
            })?
            .map_err(|e| Error::Spreadsheet {
                reason: e.to_string(),
            })?;

        let mut rows = range.rows();
        let headers = rows
            .next()
            .map(|header| header.iter().map(render_cell).collect())
            .unwrap_or_default();
        let rows = rows
            .map(|row| row.iter().map(render_cell).collect())
            .collect();

        Ok(Self { headers, rows })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    /// Position of a header, matched exactly
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Cell text for a row; short rows read as empty
    pub fn cell<'a>(row: &'a [String], index: usize) -> &'a str {
        row.get(index).map(String::as_str).unwrap_or("")
    }
}

/// Whether the loader can read this file
pub fn is_supported<P: AsRef<Path>>(path: P) -> bool {
    match extension(path.as_ref()).as_deref() {
        Some("csv") => true,
        Some(ext) => WORKBOOK_EXTENSIONS.contains(&ext),
        None => false,
    }
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

/// Render a workbook cell the way a dataframe string cast does.
///
/// Numeric columns come back as floats, so `123456789012` renders as
/// `123456789012.0`; the loader strips that suffix during normalisation.
pub fn render_cell(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => format!("{:?}", f),
        Data::Bool(true) => "True".to_string(),
        Data::Bool(false) => "False".to_string(),
        other => other.to_string(),
    }
}
