//! Geometry for annotation overlays
//!
//! Rectangle primitives, the line-merging algorithm, the rendering surface
//! boundary and the engine that turns annotations into overlays.

mod engine;
mod layout;
mod merge;
mod rect;

pub use engine::{measure_ranges, GeometryEngine, OverlayStyle, RenderRecord, FRAME_COLOR, PIN_COLOR, PIN_SIZE};
pub use layout::{
    NodeRef, Overlay, OverlayBox, OverlayHandle, OverlayKind, OverlayLayer, RenderSurface,
    TextLayoutProvider, TextNode,
};
pub use merge::{merge_rects, should_merge, MergeConfig};
pub use rect::{envelope, PercentPoint, PercentRect, Rect, TextRange};
