//! Selection boundary of the rendering surface

use crate::geometry::{NodeRef, TextLayoutProvider};

/// A caret position inside a text node, offset in characters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionPoint {
    pub node: NodeRef,
    pub offset: usize,
}

impl SelectionPoint {
    pub fn new(node: NodeRef, offset: usize) -> Self {
        Self { node, offset }
    }
}

/// The user's current selection, `start` before `end` in document order
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveSelection {
    pub text: String,
    pub start: SelectionPoint,
    pub end: SelectionPoint,
}

/// Surface access needed to capture selections
pub trait SelectionHost: TextLayoutProvider {
    fn active_selection(&self) -> Option<ActiveSelection>;

    fn clear_selection(&self);

    fn parent(&self, node: NodeRef) -> Option<NodeRef>;

    /// Page number when `node` is a page element
    fn page_marker(&self, node: NodeRef) -> Option<u32>;
}
