//! Identifier validation and grouping by site

use super::table::Table;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::str::FromStr;

/// Which identifier family is being searched for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentifierKind {
    /// Universal Account Number, 12 digits
    Uan,
    /// ESIC insurance number, 10 digits
    Esic,
}

impl IdentifierKind {
    pub fn expected_length(self) -> usize {
        match self {
            IdentifierKind::Uan => 12,
            IdentifierKind::Esic => 10,
        }
    }

    /// Suffix appended to per-site output file names
    pub fn file_suffix(self) -> &'static str {
        match self {
            IdentifierKind::Uan => "uan",
            IdentifierKind::Esic => "esic",
        }
    }

    /// Whether the last page is always kept alongside the first.
    /// UAN statements carry a totals page at the end; ESIC ones do not.
    pub fn keeps_last_page(self) -> bool {
        matches!(self, IdentifierKind::Uan)
    }
}

impl std::fmt::Display for IdentifierKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.file_suffix())
    }
}

impl FromStr for IdentifierKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "uan" => Ok(IdentifierKind::Uan),
            "esic" => Ok(IdentifierKind::Esic),
            other => Err(format!("unknown identifier kind: {}", other)),
        }
    }
}

/// Classification of an identifier, selecting its mark colour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchTag {
    #[default]
    Regular,
    /// Reserved: no loader produces it yet
    Special,
}

/// Distinct identifiers belonging to one site
#[derive(Debug, Clone, PartialEq)]
pub struct SiteGroup {
    name: String,
    identifiers: BTreeMap<String, MatchTag>,
}

impl SiteGroup {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            identifiers: BTreeMap::new(),
        }
    }

    /// Add an identifier; re-inserting keeps the first tag
    pub fn insert(&mut self, identifier: impl Into<String>, tag: MatchTag) {
        self.identifiers.entry(identifier.into()).or_insert(tag);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn identifiers(&self) -> impl Iterator<Item = (&str, MatchTag)> {
        self.identifiers.iter().map(|(id, tag)| (id.as_str(), *tag))
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.identifiers.contains_key(identifier)
    }

    pub fn len(&self) -> usize {
        self.identifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identifiers.is_empty()
    }
}

/// Site groups in order of first appearance in the spreadsheet
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SiteGroups {
    groups: Vec<SiteGroup>,
    index: HashMap<String, usize>,
}

impl SiteGroups {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, site: &str, identifier: impl Into<String>, tag: MatchTag) {
        let position = match self.index.get(site) {
            Some(&position) => position,
            None => {
                self.groups.push(SiteGroup::new(site));
                self.index.insert(site.to_string(), self.groups.len() - 1);
                self.groups.len() - 1
            }
        };
        self.groups[position].insert(identifier, tag);
    }

    pub fn get(&self, site: &str) -> Option<&SiteGroup> {
        self.index.get(site).map(|&i| &self.groups[i])
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SiteGroup> {
        self.groups.iter()
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Distinct identifiers across all sites
    pub fn identifier_count(&self) -> usize {
        self.groups.iter().map(SiteGroup::len).sum()
    }
}

impl<'a> IntoIterator for &'a SiteGroups {
    type Item = &'a SiteGroup;
    type IntoIter = std::slice::Iter<'a, SiteGroup>;

    fn into_iter(self) -> Self::IntoIter {
        self.groups.iter()
    }
}

/// Restore a spreadsheet identifier to its canonical string form.
///
/// Numeric coercion leaves a trailing `.0`; surrounding whitespace is noise.
pub fn normalize_identifier(raw: &str) -> String {
    let trimmed = raw.trim();
    trimmed
        .strip_suffix(".0")
        .unwrap_or(trimmed)
        .trim()
        .to_string()
}

/// A cleaned value is kept only if it is exactly `length` ASCII digits
pub fn is_valid_identifier(value: &str, length: usize) -> bool {
    !value.is_empty()
        && value != "nan"
        && value.len() == length
        && value.bytes().all(|b| b.is_ascii_digit())
}

/// Validate the identifier column and group surviving rows by site
pub fn load_site_groups(
    table: &Table,
    identifier_column: &str,
    site_column: &str,
    kind: IdentifierKind,
) -> Result<SiteGroups> {
    let id_index = table
        .column_index(identifier_column)
        .ok_or_else(|| Error::MissingColumn {
            column: identifier_column.to_string(),
        })?;
    let site_index = table
        .column_index(site_column)
        .ok_or_else(|| Error::MissingColumn {
            column: site_column.to_string(),
        })?;

    let length = kind.expected_length();
    let mut groups = SiteGroups::new();
    let mut dropped = 0usize;

    for row in table.rows() {
        let identifier = normalize_identifier(Table::cell(row, id_index));
        let site = Table::cell(row, site_index).trim();

        if site.is_empty() || site == "nan" || !is_valid_identifier(&identifier, length) {
            dropped += 1;
            continue;
        }

        groups.insert(site, identifier, MatchTag::Regular);
    }

    if groups.is_empty() {
        return Err(Error::NoValidIdentifiers {
            column: identifier_column.to_string(),
        });
    }

    tracing::info!(
        kind = %kind,
        sites = groups.len(),
        identifiers = groups.identifier_count(),
        dropped,
        "Loaded identifier table"
    );

    Ok(groups)
}

/// Read a spreadsheet and build its site groups
pub fn load_from_path<P: AsRef<Path>>(
    path: P,
    identifier_column: &str,
    site_column: &str,
    kind: IdentifierKind,
) -> Result<SiteGroups> {
    let table = Table::read(path)?;
    load_site_groups(&table, identifier_column, site_column, kind)
}

/// Header names of a spreadsheet, for column selection
pub fn list_columns<P: AsRef<Path>>(path: P) -> Result<Vec<String>> {
    Ok(Table::read(path)?.headers().to_vec())
}
