//! Annotation tools
//!
//! A tool implements capture and visualization for one annotation kind. The
//! registry owns every tool, initializes them with a shared context and
//! keeps at most one of them active.

mod comment;
mod highlight;
mod registry;
mod screenshot;
mod sync;

pub use comment::CommentTool;
pub use highlight::{ActionMenu, HighlightStyle, HighlightTool, MenuAction, HIGHLIGHT_PALETTE};
pub use registry::{InitReport, ToolRegistry, BUILTIN_SERVICES};
pub use screenshot::{ScreenshotCapturer, ScreenshotTool};

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use crate::annotations::Annotation;
use crate::config::Config;
use crate::error::{RenderAnchorError, ValidationError};
use crate::events::EventBus;
use crate::geometry::{GeometryEngine, OverlayStyle, RenderSurface};
use crate::selection::SelectionHost;
use crate::store::{AnnotationStore, StoreError};

/// Everything a tool needs from its host
pub trait Surface: RenderSurface + SelectionHost {}

impl<T: RenderSurface + SelectionHost + ?Sized> Surface for T {}

/// Closed set of tool kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolKind {
    Highlight,
    Screenshot,
    Comment,
}

impl ToolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolKind::Highlight => "highlight",
            ToolKind::Screenshot => "screenshot",
            ToolKind::Comment => "comment",
        }
    }
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared services handed to every tool at initialization
#[derive(Clone)]
pub struct ToolContext {
    pub bus: EventBus,
    pub store: AnnotationStore,
    pub surface: Arc<dyn Surface>,
    pub config: Config,
}

impl ToolContext {
    pub fn new(bus: EventBus, store: AnnotationStore, surface: Arc<dyn Surface>, config: Config) -> Self {
        Self {
            bus,
            store,
            surface,
            config,
        }
    }

    /// A geometry engine over the shared surface, configured from `config`
    pub fn geometry_engine(&self) -> GeometryEngine<dyn Surface> {
        GeometryEngine::new(
            self.surface.clone(),
            self.config.geometry.merge(),
            OverlayStyle {
                highlight_opacity: self.config.highlight.opacity,
            },
        )
    }
}

/// Toolbar affordance of a tool
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolButton {
    pub name: String,
    pub label: String,
    pub icon: String,
    pub active: bool,
}

/// Sidebar card describing one annotation
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotationCard {
    pub annotation_id: String,
    pub tool: ToolKind,
    pub page_number: u32,
    pub title: String,
    pub excerpt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    pub comment_count: usize,
}

#[derive(Error, Debug)]
pub enum ToolError {
    #[error("tool {0} is not initialized")]
    NotInitialized(String),

    #[error("tool {0} is not active")]
    Inactive(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("capture failed: {0}")]
    Capture(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    RenderAnchor(#[from] RenderAnchorError),
}

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("tool `{tool}` is missing capability `{capability}`")]
    MissingCapability { tool: String, capability: &'static str },

    #[error("tool `{tool}` has invalid version `{version}` (expected x.y.z)")]
    InvalidVersion { tool: String, version: String },

    #[error("tool `{0}` is already registered")]
    Duplicate(String),

    #[error("no tool named `{0}`")]
    Unknown(String),

    #[error("tool `{0}` is not initialized")]
    NotInitialized(String),

    #[error("tool `{tool}` depends on missing `{dependency}`")]
    DependencyMissing { tool: String, dependency: String },

    #[error("tool `{tool}` failed: {source}")]
    Tool {
        tool: String,
        #[source]
        source: ToolError,
    },
}

/// Capability interface of an annotation tool
///
/// Tools use interior mutability; every method takes `&self` so the registry
/// can hold them as shared trait objects.
pub trait Tool: Send + Sync {
    fn kind(&self) -> ToolKind;

    /// Unique registry key
    fn name(&self) -> &str;

    fn display_name(&self) -> &str;

    fn icon(&self) -> &str;

    /// Semantic version, `x.y.z`
    fn version(&self) -> &str;

    /// Tools or built-in services this tool needs
    fn dependencies(&self) -> Vec<String>;

    fn initialize(&self, context: &ToolContext) -> Result<(), ToolError>;

    fn activate(&self) -> Result<(), ToolError>;

    fn deactivate(&self);

    fn is_active(&self) -> bool;

    fn create_tool_button(&self) -> ToolButton;

    /// Card for an annotation this tool owns, `None` for other kinds
    fn create_annotation_card(&self, annotation: &Annotation) -> Option<AnnotationCard>;

    /// Release subscriptions and overlays
    fn destroy(&self);
}

/// Run a tool task on the current runtime, dropping it outside one
pub(crate) fn spawn_task<F>(label: &str, task: F)
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(task);
        }
        Err(_) => tracing::warn!("Dropping {}: no async runtime", label),
    }
}

/// Shorten text to `max` characters for card excerpts
pub(crate) fn excerpt(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut short: String = text.chars().take(max.saturating_sub(1)).collect();
    short.push('…');
    short
}

#[cfg(test)]
pub(crate) mod testing {
    //! Shared fixtures for tool tests

    use super::*;
    use crate::config::StoreConfig;
    use crate::surface::{DocumentSurface, PageSpec, TextRun};
    use std::time::Duration;

    pub fn surface() -> Arc<DocumentSurface> {
        let surface = DocumentSurface::new();
        surface.add_page(PageSpec::new(800.0, 1000.0).with_runs(vec![TextRun::new(
            "First page text",
            40.0,
            40.0,
            10.0,
            20.0,
        )]));
        surface.add_page(PageSpec::new(800.0, 1000.0).with_runs(vec![
            TextRun::new("The quick ", 50.0, 100.0, 10.0, 20.0),
            TextRun::new("brown fox", 150.0, 100.0, 10.0, 20.0),
            TextRun::new("jumps over", 50.0, 140.0, 10.0, 20.0),
        ]));
        Arc::new(surface)
    }

    pub fn config() -> Config {
        let mut config = Config::default();
        config.store = StoreConfig {
            local_latency: Duration::ZERO,
            ..StoreConfig::default()
        };
        config.selection.settle_delay = Duration::ZERO;
        config
    }

    pub fn context(surface: Arc<DocumentSurface>) -> ToolContext {
        let bus = EventBus::new();
        surface.connect_bus(bus.clone());
        let config = config();
        let store = AnnotationStore::new(bus.clone(), config.store.clone());
        ToolContext::new(bus, store, surface, config)
    }
}
