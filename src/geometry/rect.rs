//! Rectangle primitives
//!
//! Pixel rectangles are page-relative (origin top-left of the rendered page
//! element). Percent rectangles are relative to the current page box and are
//! expressed in the 0-100 range.

use serde::{Deserialize, Serialize};

/// Pixel rectangle, origin top-left
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    pub fn from_ltrb(left: f64, top: f64, right: f64, bottom: f64) -> Self {
        Self {
            left,
            top,
            width: right - left,
            height: bottom - top,
        }
    }

    pub fn right(&self) -> f64 {
        self.left + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.top + self.height
    }

    pub fn area(&self) -> f64 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    /// True when the rectangle has no drawable area
    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    /// Smallest rectangle covering both
    pub fn union(&self, other: &Rect) -> Rect {
        Rect::from_ltrb(
            self.left.min(other.left),
            self.top.min(other.top),
            self.right().max(other.right()),
            self.bottom().max(other.bottom()),
        )
    }

    /// Shift by the given offsets
    pub fn translate(&self, dx: f64, dy: f64) -> Rect {
        Rect::new(self.left + dx, self.top + dy, self.width, self.height)
    }

    /// Express this rectangle relative to another rectangle's origin
    pub fn relative_to(&self, origin: &Rect) -> Rect {
        self.translate(-origin.left, -origin.top)
    }

    /// Scale every coordinate by a uniform factor
    pub fn scale(&self, factor: f64) -> Rect {
        Rect::new(
            self.left * factor,
            self.top * factor,
            self.width * factor,
            self.height * factor,
        )
    }

    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        x >= self.left && x <= self.right() && y >= self.top && y <= self.bottom()
    }
}

/// Min/max envelope of a set of rectangles
pub fn envelope<'a, I>(rects: I) -> Option<Rect>
where
    I: IntoIterator<Item = &'a Rect>,
{
    rects.into_iter().fold(None, |acc: Option<Rect>, rect| match acc {
        Some(bbox) => Some(bbox.union(rect)),
        None => Some(*rect),
    })
}

/// Page-relative rectangle expressed in percent (0-100) of the page box
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PercentRect {
    pub x_percent: f64,
    pub y_percent: f64,
    pub width_percent: f64,
    pub height_percent: f64,
}

impl PercentRect {
    pub fn new(x_percent: f64, y_percent: f64, width_percent: f64, height_percent: f64) -> Self {
        Self {
            x_percent,
            y_percent,
            width_percent,
            height_percent,
        }
    }

    /// Convert to page-relative pixels for the current page size
    pub fn to_pixels(&self, page_width: f64, page_height: f64) -> Rect {
        Rect::new(
            self.x_percent / 100.0 * page_width,
            self.y_percent / 100.0 * page_height,
            self.width_percent / 100.0 * page_width,
            self.height_percent / 100.0 * page_height,
        )
    }

    /// Convert a page-relative pixel rectangle to percent of the page size
    ///
    /// Returns `None` for a degenerate page box.
    pub fn from_pixels(rect: &Rect, page_width: f64, page_height: f64) -> Option<Self> {
        if page_width <= 0.0 || page_height <= 0.0 {
            return None;
        }
        Some(Self {
            x_percent: rect.left / page_width * 100.0,
            y_percent: rect.top / page_height * 100.0,
            width_percent: rect.width / page_width * 100.0,
            height_percent: rect.height / page_height * 100.0,
        })
    }

    pub fn has_area(&self) -> bool {
        self.width_percent > 0.0 && self.height_percent > 0.0
    }

    /// Whether the rectangle lies within the page (0-100 on both axes)
    pub fn is_within_page(&self) -> bool {
        self.x_percent >= 0.0
            && self.y_percent >= 0.0
            && self.x_percent + self.width_percent <= 100.0 + f64::EPSILON * 100.0
            && self.y_percent + self.height_percent <= 100.0 + f64::EPSILON * 100.0
    }
}

/// Page-relative point expressed in percent (0-100) of the page box
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PercentPoint {
    pub x_percent: f64,
    pub y_percent: f64,
}

impl PercentPoint {
    pub fn new(x_percent: f64, y_percent: f64) -> Self {
        Self {
            x_percent,
            y_percent,
        }
    }

    pub fn to_pixels(&self, page_width: f64, page_height: f64) -> (f64, f64) {
        (
            self.x_percent / 100.0 * page_width,
            self.y_percent / 100.0 * page_height,
        )
    }

    pub fn is_within_page(&self) -> bool {
        (0.0..=100.0).contains(&self.x_percent) && (0.0..=100.0).contains(&self.y_percent)
    }
}

/// Character-offset span into the concatenated text of a page's text layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TextRange {
    /// Inclusive start offset
    pub start: usize,
    /// Exclusive end offset
    pub end: usize,
}

impl TextRange {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// Overlap with `[node_start, node_end)`, if any
    pub fn intersect(&self, node_start: usize, node_end: usize) -> Option<(usize, usize)> {
        let start = self.start.max(node_start);
        let end = self.end.min(node_end);
        (start < end).then_some((start, end))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_union_covers_both() {
        let a = Rect::new(10.0, 10.0, 20.0, 10.0);
        let b = Rect::new(25.0, 12.0, 30.0, 12.0);
        let u = a.union(&b);

        assert_eq!(u, Rect::from_ltrb(10.0, 10.0, 55.0, 24.0));
        assert!(u.area() >= a.area());
        assert!(u.area() >= b.area());
    }

    #[test]
    fn test_envelope() {
        assert!(envelope(&[]).is_none());

        let rects = [
            Rect::new(5.0, 40.0, 10.0, 10.0),
            Rect::new(50.0, 10.0, 5.0, 5.0),
        ];
        let bbox = envelope(&rects).unwrap();
        assert_eq!(bbox, Rect::from_ltrb(5.0, 10.0, 55.0, 50.0));
    }

    #[test]
    fn test_percent_to_pixels() {
        let rect = PercentRect::new(50.0, 10.0, 40.0, 5.0);
        let px = rect.to_pixels(800.0, 1000.0);

        assert_eq!(px, Rect::new(400.0, 100.0, 320.0, 50.0));

        let back = PercentRect::from_pixels(&px, 800.0, 1000.0).unwrap();
        assert!((back.x_percent - 50.0).abs() < 1e-9);
        assert!((back.height_percent - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_percent_from_degenerate_page() {
        let px = Rect::new(1.0, 1.0, 1.0, 1.0);
        assert!(PercentRect::from_pixels(&px, 0.0, 100.0).is_none());
    }

    #[test]
    fn test_text_range_intersection() {
        let range = TextRange::new(5, 15);

        assert_eq!(range.intersect(0, 10), Some((5, 10)));
        assert_eq!(range.intersect(10, 20), Some((10, 15)));
        assert_eq!(range.intersect(15, 20), None);
        assert_eq!(range.len(), 10);
    }
}
