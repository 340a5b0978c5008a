//! Annotation model
//!
//! Validated annotation entities and their type-specific payloads.

mod payload;
mod types;

pub use payload::{
    validate_color, AnnotationData, AnnotationType, CommentData, HighlightData, ScreenshotData,
    UnderlineData,
};
pub use types::{Annotation, AnnotationChanges, AnnotationDraft, Comment};
