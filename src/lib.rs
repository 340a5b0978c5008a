//! Amnesia Annotator
//!
//! Annotation subsystem for paginated, zoomable documents: a tool-plugin
//! registry with a single active tool, an annotation store with transparent
//! local/remote persistence, and a geometry engine that turns text ranges
//! or percent rectangles into page overlays.
//!
//! # Modules
//!
//! - `annotations`: validated annotation entities and payloads
//! - `store`: CRUD, persistence backends and document id resolution
//! - `geometry`: rectangles, line merging and overlay rendering
//! - `selection`: selection capture and normalization
//! - `tools`: the tool trait, registry and built-in tools
//! - `surface`: in-memory paginated rendering surface
//! - `events`: local/global event bus

pub mod annotations;
pub mod config;
pub mod error;
pub mod events;
pub mod geometry;
pub mod selection;
pub mod state;
pub mod store;
pub mod surface;
pub mod tools;

pub use config::Config;
pub use error::{AnnotatorError, Result};
pub use state::AnnotatorState;
