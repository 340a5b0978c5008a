//! Subsystem wiring
//!
//! Builds the event bus, store, registry and built-in tools around a
//! rendering surface and hands out cheap clones of the whole assembly.

use std::sync::Arc;

use crate::annotations::Annotation;
use crate::config::Config;
use crate::error::Result;
use crate::events::EventBus;
use crate::geometry::RenderRecord;
use crate::store::{AnnotationStore, PdfIdSources};
use crate::tools::{
    CommentTool, HighlightTool, InitReport, ScreenshotCapturer, ScreenshotTool, Surface, ToolContext, ToolRegistry,
};

/// Shared annotator state
#[derive(Clone)]
pub struct AnnotatorState {
    inner: Arc<AnnotatorStateInner>,
}

struct AnnotatorStateInner {
    config: Config,
    context: ToolContext,
    registry: ToolRegistry,
    highlight: HighlightTool,
    comment: CommentTool,
    screenshot: Option<ScreenshotTool>,
    init_report: InitReport,
}

impl AnnotatorState {
    /// Wire the subsystem around `surface`
    ///
    /// The screenshot tool is registered only when a capturer is supplied.
    pub fn new(
        config: Config,
        surface: Arc<dyn Surface>,
        capturer: Option<Arc<dyn ScreenshotCapturer>>,
    ) -> Result<Self> {
        let bus = EventBus::new();
        let store = AnnotationStore::new(bus.clone(), config.store.clone());
        store.listen();

        let context = ToolContext::new(bus.clone(), store, surface, config.clone());
        let registry = ToolRegistry::new(bus);

        let highlight = HighlightTool::new();
        let comment = CommentTool::new();
        let screenshot = capturer.map(ScreenshotTool::new);

        registry.register(Arc::new(highlight.clone()))?;
        registry.register(Arc::new(comment.clone()))?;
        if let Some(screenshot) = &screenshot {
            registry.register(Arc::new(screenshot.clone()))?;
        }

        let init_report = registry.initialize_all(&context);
        registry.listen();
        tracing::info!(
            "Annotator ready: {} tools initialized, {} failed",
            init_report.initialized.len(),
            init_report.failed.len()
        );

        Ok(Self {
            inner: Arc::new(AnnotatorStateInner {
                config,
                context,
                registry,
                highlight,
                comment,
                screenshot,
                init_report,
            }),
        })
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn bus(&self) -> &EventBus {
        &self.inner.context.bus
    }

    pub fn store(&self) -> &AnnotationStore {
        &self.inner.context.store
    }

    pub fn surface(&self) -> &Arc<dyn Surface> {
        &self.inner.context.surface
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.inner.registry
    }

    pub fn highlight(&self) -> &HighlightTool {
        &self.inner.highlight
    }

    pub fn comment(&self) -> &CommentTool {
        &self.inner.comment
    }

    pub fn screenshot(&self) -> Option<&ScreenshotTool> {
        self.inner.screenshot.as_ref()
    }

    pub fn init_report(&self) -> &InitReport {
        &self.inner.init_report
    }

    /// Resolve the document id and load its annotations
    pub async fn open_document(&self, sources: &PdfIdSources<'_>) -> Vec<Annotation> {
        self.inner.context.store.open(sources).await
    }

    /// Overlay records of every tool, ordered by page then position
    pub fn render_records(&self) -> Vec<RenderRecord> {
        let engines = [
            self.inner.highlight.engine(),
            self.inner.comment.engine(),
            self.inner.screenshot.as_ref().and_then(|s| s.engine()),
        ];
        let mut records: Vec<RenderRecord> = engines
            .into_iter()
            .flatten()
            .flat_map(|engine| engine.records())
            .collect();
        records.sort_by(|a, b| {
            a.page_number
                .cmp(&b.page_number)
                .then(a.bounding_box.top.total_cmp(&b.bounding_box.top))
                .then(a.bounding_box.left.total_cmp(&b.bounding_box.left))
        });
        records
    }

    /// Tear down every tool and stop serving tool requests
    pub fn shutdown(&self) {
        self.inner.registry.destroy_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotations::{AnnotationData, AnnotationDraft, CommentData, HighlightData};
    use crate::events::names;
    use crate::geometry::{OverlayKind, PercentPoint, PercentRect, TextRange};
    use crate::store::PersistenceMode;
    use crate::surface::{DocumentSurface, PageSpec, TextRun};
    use serde_json::json;
    use std::time::Duration;

    fn state() -> (AnnotatorState, Arc<DocumentSurface>) {
        let surface = DocumentSurface::new();
        surface.add_page(PageSpec::new(600.0, 800.0).with_runs(vec![TextRun::new(
            "Annotated text",
            20.0,
            20.0,
            8.0,
            16.0,
        )]));
        let surface = Arc::new(surface);

        let mut config = Config::default();
        config.store.local_latency = Duration::ZERO;
        let state = AnnotatorState::new(config, surface.clone(), None).unwrap();
        surface.connect_bus(state.bus().clone());
        (state, surface)
    }

    #[tokio::test]
    async fn test_wiring_renders_each_kind() {
        let (state, surface) = state();
        assert!(state.init_report().is_clean());
        assert_eq!(state.registry().tool_names(), vec!["highlight", "comment"]);
        assert_eq!(state.store().persistence_mode(), PersistenceMode::Local);

        state
            .store()
            .create(AnnotationDraft::new(
                1,
                AnnotationData::TextHighlight(HighlightData {
                    selected_text: "Annotated".to_string(),
                    text_ranges: vec![TextRange::new(0, 9)],
                    color: "#ffeb3b".to_string(),
                    line_rects: vec![PercentRect::new(3.0, 2.0, 12.0, 2.0)],
                }),
            ))
            .await
            .unwrap();
        state
            .store()
            .create(AnnotationDraft::new(
                1,
                AnnotationData::Comment(CommentData {
                    position: Some(PercentPoint::new(50.0, 50.0)),
                    content: "Look".to_string(),
                }),
            ))
            .await
            .unwrap();

        let kinds: Vec<OverlayKind> = state.render_records().iter().map(|r| r.kind).collect();
        assert_eq!(kinds, vec![OverlayKind::Highlight, OverlayKind::Pin]);
        assert_eq!(surface.overlays_on(1).len(), 2);
    }

    #[tokio::test]
    async fn test_open_document_then_reload() {
        let (state, _) = state();
        let sources = PdfIdSources {
            file_name: Some("demos/Annotated-0A1B2C3D4E5F.pdf"),
            ..Default::default()
        };
        assert!(state.open_document(&sources).await.is_empty());
        assert_eq!(state.store().pdf_id().as_deref(), Some("0a1b2c3d4e5f"));

        state
            .store()
            .create(AnnotationDraft::new(
                1,
                AnnotationData::Comment(CommentData {
                    position: Some(PercentPoint::new(10.0, 10.0)),
                    content: "kept".to_string(),
                }),
            ))
            .await
            .unwrap();
        state.store().clear();

        let reloaded = state.open_document(&sources).await;
        assert_eq!(reloaded.len(), 1);
        assert_eq!(state.render_records().len(), 1);
    }

    #[test]
    fn test_activation_through_bus() {
        let (state, _) = state();
        state
            .bus()
            .emit(names::TOOL_ACTIVATE_REQUESTED, json!({ "name": "comment" }));
        assert_eq!(state.registry().active_tool().as_deref(), Some("comment"));

        state.shutdown();
        assert!(state.registry().is_empty());
        assert!(state.render_records().is_empty());
    }
}
