//! In-memory rendering surface
//!
//! A paginated document with a text layer and highlight layer per page,
//! implementing the layout, overlay and selection boundaries.

mod document;
mod dom;
mod fixture;

pub use document::{DocumentSurface, PageSpec, TextRun, PAGE_GAP};
pub use dom::{Dom, DomNode, NodeKind};
pub use fixture::SurfaceFixture;
