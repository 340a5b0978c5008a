//! Line-rectangle merging
//!
//! Client rectangles read from a text range come back one per text run, often
//! several per visual line with small gaps between them. Merging collapses
//! rectangles that sit on the same line and touch horizontally into a single
//! box, which keeps overlays clean and reduces the number of drawn elements.
//!
//! The result is canonical: it does not depend on input order, and merging an
//! already merged list returns it unchanged.

use std::cmp::Ordering;

use super::rect::Rect;

/// Tolerances for the merge predicate
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MergeConfig {
    /// Maximum vertical distance between tops for two rects to share a line
    pub line_tolerance: f64,
    /// Maximum horizontal gap between two rects on the same line
    pub adjacency_gap: f64,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            line_tolerance: 5.0,
            adjacency_gap: 2.0,
        }
    }
}

/// Same visual line and horizontally adjacent or overlapping
pub fn should_merge(a: &Rect, b: &Rect, config: &MergeConfig) -> bool {
    if (a.top - b.top).abs() >= config.line_tolerance {
        return false;
    }
    let (first, second) = if a.left <= b.left { (a, b) } else { (b, a) };
    second.left <= first.right() + config.adjacency_gap
}

/// Merge same-line adjacent rectangles until no pair qualifies
///
/// Output is sorted top-to-bottom, left-to-right. The output never holds
/// more rectangles than the input.
pub fn merge_rects(rects: &[Rect], config: &MergeConfig) -> Vec<Rect> {
    let mut current: Vec<Rect> = rects.to_vec();

    loop {
        current.sort_by(reading_order);

        let mut merged: Vec<Rect> = Vec::with_capacity(current.len());
        for rect in &current {
            match merged.iter_mut().find(|m| should_merge(m, rect, config)) {
                Some(existing) => *existing = existing.union(rect),
                None => merged.push(*rect),
            }
        }

        // A pass without merges means every pair was checked and rejected.
        if merged.len() == current.len() {
            merged.sort_by(reading_order);
            return merged;
        }
        current = merged;
    }
}

/// Total order: top, then left, then size
fn reading_order(a: &Rect, b: &Rect) -> Ordering {
    a.top
        .total_cmp(&b.top)
        .then(a.left.total_cmp(&b.left))
        .then(a.width.total_cmp(&b.width))
        .then(a.height.total_cmp(&b.height))
}
