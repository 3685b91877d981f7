//! Marking identifier occurrences and choosing the pages to keep

use super::text::{PageText, Rect};
use crate::error::Result;
use crate::identifiers::{IdentifierKind, MatchTag, SiteGroup};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::str::FromStr;

/// RGB colour with components in `0.0..=1.0`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rgb {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Rgb {
    pub const RED: Rgb = Rgb::new(1.0, 0.0, 0.0);
    pub const BLUE: Rgb = Rgb::new(0.0, 0.0, 1.0);
    pub const GREEN: Rgb = Rgb::new(0.0, 0.5, 0.0);
    pub const BLACK: Rgb = Rgb::new(0.0, 0.0, 0.0);
    pub const ORANGE: Rgb = Rgb::new(1.0, 0.5, 0.0);
    pub const YELLOW: Rgb = Rgb::new(1.0, 0.9, 0.0);

    pub const fn new(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    /// Look up a colour name; anything unrecognised is red
    pub fn from_name(name: &str) -> Rgb {
        match name.trim().to_ascii_lowercase().as_str() {
            "red" => Rgb::RED,
            "blue" => Rgb::BLUE,
            "green" => Rgb::GREEN,
            "black" => Rgb::BLACK,
            "orange" => Rgb::ORANGE,
            "yellow" => Rgb::YELLOW,
            _ => Rgb::RED,
        }
    }

    /// Components scaled to bytes
    pub fn to_bytes(self) -> [u8; 3] {
        [to_byte(self.r), to_byte(self.g), to_byte(self.b)]
    }
}

/// Scale a `0.0..=1.0` value to a byte, clamping out-of-range input
pub(crate) fn to_byte(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Visual treatment applied at each match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HighlightMode {
    #[default]
    Border,
    Highlight,
    Underline,
}

impl FromStr for HighlightMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "border" => Ok(HighlightMode::Border),
            "highlight" => Ok(HighlightMode::Highlight),
            "underline" => Ok(HighlightMode::Underline),
            other => Err(format!("unknown highlight mode: {}", other)),
        }
    }
}

/// How far a mark extends past the matched text on each side
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Margins {
    pub left: f32,
    pub right: f32,
    pub top: f32,
    pub bottom: f32,
}

impl Margins {
    pub fn uniform(value: f32) -> Self {
        Self {
            left: value,
            right: value,
            top: value,
            bottom: value,
        }
    }

    pub fn expand(&self, rect: &Rect) -> Rect {
        Rect::new(
            rect.left - self.left,
            rect.bottom - self.bottom,
            rect.right + self.right,
            rect.top + self.top,
        )
    }
}

impl Default for Margins {
    fn default() -> Self {
        Self::uniform(1.0)
    }
}

/// Distance below a match at which underline mode draws its stroke
pub const UNDERLINE_OFFSET: f32 = 0.5;

/// Styling for one job; fixed once the job starts
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnnotationSpec {
    pub margins: Margins,
    pub border_color: Rgb,
    pub special_color: Rgb,
    pub border_width: f32,
    pub mode: HighlightMode,
    pub opacity: f32,
}

impl Default for AnnotationSpec {
    fn default() -> Self {
        Self {
            margins: Margins::default(),
            border_color: Rgb::RED,
            special_color: Rgb::BLUE,
            border_width: 0.5,
            mode: HighlightMode::Border,
            opacity: 0.25,
        }
    }
}

impl AnnotationSpec {
    pub fn color_for(&self, tag: MatchTag) -> Rgb {
        match tag {
            MatchTag::Special => self.special_color,
            MatchTag::Regular => self.border_color,
        }
    }

    /// The mark to draw for one search hit
    pub fn mark_for(&self, hit: &Rect, tag: MatchTag) -> Mark {
        let color = self.color_for(tag);
        match self.mode {
            HighlightMode::Border => Mark::Border {
                rect: self.margins.expand(hit),
                color,
                width: self.border_width,
            },
            HighlightMode::Highlight => Mark::Fill {
                rect: self.margins.expand(hit),
                color,
                opacity: self.opacity,
            },
            HighlightMode::Underline => Mark::Underline {
                x0: hit.left,
                x1: hit.right,
                y: hit.bottom - UNDERLINE_OFFSET,
                color,
                width: self.border_width,
            },
        }
    }
}

/// A drawing instruction for one page
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Mark {
    /// Stroke-only rectangle annotation
    Border { rect: Rect, color: Rgb, width: f32 },
    /// Filled, translucent rectangle annotation without border
    Fill { rect: Rect, color: Rgb, opacity: f32 },
    /// Horizontal line drawn into the page content
    Underline {
        x0: f32,
        x1: f32,
        y: f32,
        color: Rgb,
        width: f32,
    },
}

/// A document that can be searched and marked page by page
pub trait MarkupDocument {
    fn page_count(&self) -> u32;

    /// Text layer of a zero-based page
    fn page_text(&self, page: u32) -> Result<PageText>;

    /// Draw all marks for a zero-based page
    fn add_marks(&mut self, page: u32, marks: &[Mark]) -> Result<()>;
}

/// Match counts for one site over the whole document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SiteMatches {
    per_page: Vec<usize>,
}

impl SiteMatches {
    pub fn from_counts(per_page: Vec<usize>) -> Self {
        Self { per_page }
    }

    pub fn total(&self) -> usize {
        self.per_page.iter().sum()
    }

    pub fn page_count(&self) -> u32 {
        self.per_page.len() as u32
    }

    pub fn on_page(&self, page: u32) -> usize {
        self.per_page.get(page as usize).copied().unwrap_or(0)
    }

    /// Zero-based pages with at least one match
    pub fn matched_pages(&self) -> impl Iterator<Item = u32> + '_ {
        self.per_page
            .iter()
            .enumerate()
            .filter(|&(_, &count)| count > 0)
            .map(|(page, _)| page as u32)
    }
}

/// Zero-based page indices to keep, always iterated in ascending order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageSelection {
    pages: BTreeSet<u32>,
}

impl PageSelection {
    /// Start from the pages that are kept regardless of matches
    pub fn boundary(page_count: u32, keep_last: bool) -> Self {
        let mut pages = BTreeSet::new();
        if page_count > 0 {
            pages.insert(0);
            if keep_last {
                pages.insert(page_count - 1);
            }
        }
        Self { pages }
    }

    /// Boundary pages plus every matched page
    pub fn for_matches(matches: &SiteMatches, kind: IdentifierKind) -> Self {
        let mut selection = Self::boundary(matches.page_count(), kind.keeps_last_page());
        for page in matches.matched_pages() {
            selection.insert(page);
        }
        selection
    }

    pub fn insert(&mut self, page: u32) {
        self.pages.insert(page);
    }

    pub fn contains(&self, page: u32) -> bool {
        self.pages.contains(&page)
    }

    pub fn pages(&self) -> Vec<u32> {
        self.pages.iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}

/// Search every page for every identifier of the site and draw a mark per hit
pub fn annotate_site<D: MarkupDocument + ?Sized>(
    doc: &mut D,
    site: &SiteGroup,
    spec: &AnnotationSpec,
) -> Result<SiteMatches> {
    let page_count = doc.page_count();
    let mut per_page = Vec::with_capacity(page_count as usize);

    for page in 0..page_count {
        let text = doc.page_text(page)?;
        let mut marks = Vec::new();

        for (identifier, tag) in site.identifiers() {
            for hit in text.find(identifier) {
                marks.push(spec.mark_for(&hit, tag));
            }
        }

        if !marks.is_empty() {
            doc.add_marks(page, &marks)?;
            tracing::debug!(site = site.name(), page, matches = marks.len(), "Marked page");
        }
        per_page.push(marks.len());
    }

    Ok(SiteMatches::from_counts(per_page))
}

/// Outcome of marking a site that had at least one match
#[derive(Debug, Clone, PartialEq)]
pub struct MarkedSite {
    pub matches: SiteMatches,
    pub selection: PageSelection,
}

/// Mark a site and pick its pages; `None` when nothing matched
pub fn mark_site<D: MarkupDocument + ?Sized>(
    doc: &mut D,
    site: &SiteGroup,
    kind: IdentifierKind,
    spec: &AnnotationSpec,
) -> Result<Option<MarkedSite>> {
    let matches = annotate_site(doc, site, spec)?;

    if matches.total() == 0 {
        return Ok(None);
    }

    let selection = PageSelection::for_matches(&matches, kind);
    Ok(Some(MarkedSite { matches, selection }))
}
