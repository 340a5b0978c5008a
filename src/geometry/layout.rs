//! Rendering surface boundary
//!
//! The geometry engine never touches a concrete DOM. Hosts expose the page
//! box, the text layer and its text nodes, and character-span measurement
//! through [`TextLayoutProvider`], and accept overlay containers through
//! [`OverlayLayer`]. All coordinates returned by the host are client
//! coordinates; the engine translates them to page-relative pixels.

use serde::{Deserialize, Serialize};

use super::rect::Rect;
use crate::error::RenderAnchorError;

/// Opaque handle to a node of the rendering surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeRef(pub u64);

/// A text node of a page's text layer
#[derive(Debug, Clone, PartialEq)]
pub struct TextNode {
    pub node: NodeRef,
    pub text: String,
}

impl TextNode {
    /// Length in characters (Unicode scalar values)
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// Read-only access to page geometry and text layout
pub trait TextLayoutProvider: Send + Sync {
    /// Client box of the rendered page element, `None` when not in the surface
    fn page_rect(&self, page: u32) -> Option<Rect>;

    /// Client box of the page's text layer
    fn text_layer_rect(&self, page: u32) -> Option<Rect>;

    /// Text nodes of the page's text layer in reading order
    fn text_nodes(&self, page: u32) -> Option<Vec<TextNode>>;

    /// Client rectangles covering characters `[start, end)` of one text node
    fn span_client_rects(&self, node: NodeRef, start: usize, end: usize) -> Vec<Rect>;
}

/// Visual role of an overlay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverlayKind {
    /// Translucent fill over text lines
    Highlight,
    /// Thin bar under text lines
    Underline,
    /// Outline around a captured region
    Frame,
    /// Marker for a point comment
    Pin,
}

/// One drawn box inside an overlay container, page-relative pixels
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverlayBox {
    pub rect: Rect,
    pub color: String,
    pub opacity: f32,
}

/// Container element describing one annotation's visual representation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Overlay {
    pub annotation_id: String,
    pub kind: OverlayKind,
    pub boxes: Vec<OverlayBox>,
}

/// Handle to an attached overlay container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OverlayHandle(pub u64);

/// Mutable access to the page overlay layers
pub trait OverlayLayer: Send + Sync {
    /// Attach a container to the page's highlight layer
    fn attach(&self, page: u32, overlay: Overlay) -> Result<OverlayHandle, RenderAnchorError>;

    /// Detach a container; `false` if it was already gone
    fn detach(&self, handle: OverlayHandle) -> bool;

    /// Recolor every box of a container in place
    fn restyle(&self, handle: OverlayHandle, color: &str) -> bool;

    /// Whether the container is still part of the surface
    ///
    /// Re-rendering a page destroys its overlay layer, so handles go stale.
    fn is_attached(&self, handle: OverlayHandle) -> bool;
}

/// A surface the geometry engine can measure and draw on
pub trait RenderSurface: TextLayoutProvider + OverlayLayer {}

impl<T: TextLayoutProvider + OverlayLayer + ?Sized> RenderSurface for T {}
