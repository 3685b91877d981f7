//! Positioned page text and literal search over it
//!
//! Coordinates are PDF user space: origin at the bottom-left corner of the
//! page, y growing upwards.

/// Axis-aligned rectangle in page coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub left: f32,
    pub bottom: f32,
    pub right: f32,
    pub top: f32,
}

impl Rect {
    pub fn new(left: f32, bottom: f32, right: f32, top: f32) -> Self {
        Self {
            left,
            bottom,
            right,
            top,
        }
    }

    /// Smallest rectangle covering both
    pub fn union(&self, other: &Rect) -> Rect {
        Rect {
            left: self.left.min(other.left),
            bottom: self.bottom.min(other.bottom),
            right: self.right.max(other.right),
            top: self.top.max(other.top),
        }
    }

    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    pub fn height(&self) -> f32 {
        self.top - self.bottom
    }

    /// Whether this glyph follows `prev` on the same line, left to right
    pub fn continues(&self, prev: &Rect) -> bool {
        let tolerance = self.height().max(prev.height()) / 2.0;
        let mid = (self.top + self.bottom) / 2.0;
        let prev_mid = (prev.top + prev.bottom) / 2.0;
        (mid - prev_mid).abs() <= tolerance && self.left >= prev.left
    }
}

/// A character together with its bounds, when the text layer reports any
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionedChar {
    pub ch: char,
    pub bounds: Option<Rect>,
}

impl PositionedChar {
    pub fn new(ch: char, bounds: Option<Rect>) -> Self {
        Self { ch, bounds }
    }
}

/// The characters of one page in content order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageText {
    chars: Vec<PositionedChar>,
}

impl PageText {
    pub fn new(chars: Vec<PositionedChar>) -> Self {
        Self { chars }
    }

    pub fn push(&mut self, ch: PositionedChar) {
        self.chars.push(ch);
    }

    /// Append a glyph from a text layer. A line break without bounds is
    /// inserted first when the glyph does not continue the previous one,
    /// so runs from different lines or columns never join into one word.
    pub fn push_glyph(&mut self, ch: char, bounds: Option<Rect>) {
        let prev = self.chars.last().and_then(|c| c.bounds);
        if let (Some(prev), Some(next)) = (prev, bounds) {
            if !next.continues(&prev) {
                self.chars.push(PositionedChar::new('\n', None));
            }
        }
        self.chars.push(PositionedChar::new(ch, bounds));
    }

    pub fn len(&self) -> usize {
        self.chars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    /// Plain text of the page
    pub fn text(&self) -> String {
        self.chars.iter().map(|c| c.ch).collect()
    }

    /// Find every exact occurrence of `needle`, scanning left to right
    /// without overlap. Each hit is the union of its characters' bounds;
    /// hits whose characters carry no bounds at all are skipped.
    pub fn find(&self, needle: &str) -> Vec<Rect> {
        let needle: Vec<char> = needle.chars().collect();
        let n = needle.len();
        let mut hits = Vec::new();

        if n == 0 || n > self.chars.len() {
            return hits;
        }

        let mut i = 0;
        while i + n <= self.chars.len() {
            let window = &self.chars[i..i + n];
            if window.iter().zip(&needle).all(|(c, &wanted)| c.ch == wanted) {
                let bounds = window
                    .iter()
                    .filter_map(|c| c.bounds)
                    .reduce(|acc, r| acc.union(&r));
                if let Some(rect) = bounds {
                    hits.push(rect);
                }
                i += n;
            } else {
                i += 1;
            }
        }

        hits
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Lay out `lines` top-down with fixed-pitch 6pt-wide glyphs
    pub(crate) fn layout(lines: &[&str]) -> PageText {
        let mut page = PageText::default();
        for (row, line) in lines.iter().enumerate() {
            let top = 800.0 - row as f32 * 20.0;
            for (col, ch) in line.chars().enumerate() {
                let left = 50.0 + col as f32 * 6.0;
                page.push(PositionedChar::new(
                    ch,
                    Some(Rect::new(left, top - 10.0, left + 6.0, top)),
                ));
            }
            page.push(PositionedChar::new('\n', None));
        }
        page
    }

    #[test]
    fn test_find_single_hit_bounds() {
        let page = layout(&["UAN 123456789012 Pune"]);
        let hits = page.find("123456789012");

        assert_eq!(hits.len(), 1);
        let hit = hits[0];
        assert_eq!(hit.left, 50.0 + 4.0 * 6.0);
        assert_eq!(hit.right, 50.0 + 16.0 * 6.0);
        assert_eq!(hit.bottom, 790.0);
        assert_eq!(hit.top, 800.0);
    }

    #[test]
    fn test_find_multiple_hits_on_page() {
        let page = layout(&["999999999999", "x", "999999999999 999999999999"]);
        assert_eq!(page.find("999999999999").len(), 3);
    }

    #[test]
    fn test_find_does_not_overlap() {
        let page = layout(&["1111"]);
        assert_eq!(page.find("11").len(), 2);
    }

    #[test]
    fn test_find_does_not_cross_lines() {
        let page = layout(&["123456", "789012"]);
        assert!(page.find("123456789012").is_empty());
    }

    fn glyphs(page: &mut PageText, text: &str, left: f32, top: f32) {
        for (col, ch) in text.chars().enumerate() {
            let x = left + col as f32 * 6.0;
            page.push_glyph(ch, Some(Rect::new(x, top - 10.0, x + 6.0, top)));
        }
    }

    #[test]
    fn test_glyphs_from_separate_runs_do_not_join() {
        // End of one table row at the right, start of the next at the left
        let mut page = PageText::default();
        glyphs(&mut page, "123456", 400.0, 710.0);
        glyphs(&mut page, "789012", 50.0, 690.0);

        assert!(page.find("123456789012").is_empty());
        assert_eq!(page.text(), "123456\n789012");
    }

    #[test]
    fn test_glyphs_on_one_line_stay_searchable() {
        let mut page = PageText::default();
        glyphs(&mut page, "UAN ", 50.0, 710.0);
        glyphs(&mut page, "123456789012", 74.0, 710.5);

        let hits = page.find("123456789012");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].left, 74.0);
        assert_eq!(page.text(), "UAN 123456789012");
    }

    #[test]
    fn test_backwards_jump_on_same_line_breaks() {
        let mut page = PageText::default();
        glyphs(&mut page, "1234", 300.0, 710.0);
        glyphs(&mut page, "5678", 50.0, 710.0);
        assert!(page.find("12345678").is_empty());
    }

    #[test]
    fn test_find_empty_needle_and_short_page() {
        let page = layout(&["12"]);
        assert!(page.find("").is_empty());
        assert!(page.find("123456789012").is_empty());
        assert!(PageText::default().find("1").is_empty());
    }

    #[test]
    fn test_hit_without_bounds_is_skipped() {
        let page = PageText::new(vec![
            PositionedChar::new('4', None),
            PositionedChar::new('2', None),
        ]);
        assert!(page.find("42").is_empty());
        assert_eq!(page.text(), "42");
    }

    #[test]
    fn test_rect_union() {
        let a = Rect::new(0.0, 0.0, 5.0, 5.0);
        let b = Rect::new(3.0, -2.0, 9.0, 4.0);
        assert_eq!(a.union(&b), Rect::new(0.0, -2.0, 9.0, 5.0));
        assert_eq!(a.width(), 5.0);
        assert_eq!(b.height(), 6.0);
    }
}
