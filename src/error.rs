//! Error types for the annotation subsystem
//!
//! Three failure families cross component boundaries:
//!
//! - [`ValidationError`]: an annotation payload does not satisfy its
//!   type-specific schema. Raised synchronously, never sent to the network.
//! - [`PersistenceError`]: transport failure or timeout. Caught at the store
//!   boundary and reported as a `*:failed` event.
//! - [`RenderAnchorError`]: the target page is not part of the surface.
//!   Rendering is skipped and retried when the page renders again.

use std::time::Duration;

use thiserror::Error;

use crate::config::ConfigError;
use crate::store::StoreError;
use crate::store::TransportError;
use crate::tools::{RegistryError, ToolError};

/// Crate-wide result type
pub type Result<T> = std::result::Result<T, AnnotatorError>;

/// Top-level error type
#[derive(Error, Debug)]
pub enum AnnotatorError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Render anchor error: {0}")]
    RenderAnchor(#[from] RenderAnchorError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Annotation payload failed its schema
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    #[error("invalid field `{field}`: {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("data of type `{actual}` does not match annotation type `{expected}`")]
    TypeMismatch {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("unknown annotation type `{0}`")]
    UnknownType(String),

    #[error("malformed payload: {0}")]
    Malformed(String),
}

impl ValidationError {
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field,
            reason: reason.into(),
        }
    }

    /// Name of the offending field, when the error is tied to one
    pub fn field(&self) -> Option<&'static str> {
        match self {
            Self::MissingField(field) => Some(field),
            Self::InvalidField { field, .. } => Some(field),
            Self::TypeMismatch { .. } => Some("data"),
            Self::UnknownType(_) => Some("type"),
            Self::Malformed(_) => None,
        }
    }
}

/// Remote persistence failure
#[derive(Error, Debug, Clone)]
pub enum PersistenceError {
    #[error("{operation} timed out after {}ms", after.as_millis())]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("{operation} failed: {source}")]
    Transport {
        operation: &'static str,
        #[source]
        source: TransportError,
    },

    #[error("{operation} returned an unexpected response: {reason}")]
    BadResponse {
        operation: &'static str,
        reason: String,
    },
}

/// Target page is not present on the surface
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RenderAnchorError {
    #[error("page {0} is not rendered")]
    PageNotRendered(u32),

    #[error("text layer of page {0} is not available")]
    TextLayerMissing(u32),

    #[error("annotation {0} produced no drawable geometry")]
    NoGeometry(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_names_field() {
        let err = ValidationError::MissingField("textRanges");
        assert_eq!(err.field(), Some("textRanges"));
        assert!(err.to_string().contains("textRanges"));

        let err = ValidationError::invalid("color", "expected a hex color");
        assert_eq!(err.field(), Some("color"));
        assert!(err.to_string().contains("expected a hex color"));
    }

    #[test]
    fn test_persistence_error_message() {
        let err = PersistenceError::Timeout {
            operation: "create",
            after: Duration::from_secs(8),
        };
        assert_eq!(err.to_string(), "create timed out after 8000ms");
    }
}
