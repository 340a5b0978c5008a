//! Text highlight tool
//!
//! While active, every completed selection becomes a text-highlight (or
//! underline) annotation in the current color. Overlays follow store events
//! whether or not the tool is active. Each drawn highlight offers an action
//! menu anchored to its bounding box.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use serde::Serialize;
use serde_json::json;

use crate::annotations::{
    validate_color, Annotation, AnnotationChanges, AnnotationData, AnnotationDraft, AnnotationType,
    HighlightData, UnderlineData,
};
use crate::events::{names, SubscriptionId};
use crate::geometry::{GeometryEngine, Rect};
use crate::selection::{SelectionCapture, SelectionPayload};

use super::sync::OverlaySync;
use super::{excerpt, spawn_task, AnnotationCard, Surface, Tool, ToolButton, ToolContext, ToolError, ToolKind};

/// Colors offered by the action menu, first is the default
pub const HIGHLIGHT_PALETTE: [&str; 5] = ["#ffeb3b", "#4caf50", "#2196f3", "#ff9800", "#e91e63"];

const OWNED: &[AnnotationType] = &[AnnotationType::TextHighlight, AnnotationType::Underline];

/// How new selections are marked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HighlightStyle {
    #[default]
    Highlight,
    Underline,
}

/// Entry of a highlight's contextual menu
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", content = "value", rename_all = "kebab-case")]
pub enum MenuAction {
    ChangeColor(String),
    Delete,
    JumpToPage,
    Copy,
}

/// Contextual menu of one drawn highlight
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionMenu {
    pub annotation_id: String,
    pub page_number: u32,
    /// Bounding box of the highlight, page-relative pixels
    pub anchor: Rect,
    pub actions: Vec<MenuAction>,
}

#[derive(Clone)]
pub struct HighlightTool {
    inner: Arc<HighlightInner>,
}

struct HighlightInner {
    active: AtomicBool,
    settings: RwLock<Settings>,
    bound: RwLock<Option<Bound>>,
}

struct Settings {
    color: String,
    style: HighlightStyle,
}

/// State that exists once the tool is initialized
struct Bound {
    context: ToolContext,
    sync: Arc<OverlaySync>,
    capture: Arc<SelectionCapture<dyn Surface>>,
    subscriptions: Vec<SubscriptionId>,
}

impl HighlightTool {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(HighlightInner {
                active: AtomicBool::new(false),
                settings: RwLock::new(Settings {
                    color: HIGHLIGHT_PALETTE[0].to_string(),
                    style: HighlightStyle::default(),
                }),
                bound: RwLock::new(None),
            }),
        }
    }

    pub fn color(&self) -> String {
        self.inner.settings.read().color.clone()
    }

    /// Color for highlights created from now on
    pub fn set_color(&self, color: &str) -> Result<(), ToolError> {
        validate_color(color)?;
        self.inner.settings.write().color = color.to_string();
        Ok(())
    }

    pub fn style(&self) -> HighlightStyle {
        self.inner.settings.read().style
    }

    pub fn set_style(&self, style: HighlightStyle) {
        self.inner.settings.write().style = style;
    }

    pub fn engine(&self) -> Option<Arc<GeometryEngine<dyn Surface>>> {
        self.inner.bound.read().as_ref().map(|b| b.sync.engine().clone())
    }

    pub fn selection_capture(&self) -> Option<Arc<SelectionCapture<dyn Surface>>> {
        self.inner.bound.read().as_ref().map(|b| b.capture.clone())
    }

    fn bound(&self) -> Result<(ToolContext, Arc<OverlaySync>), ToolError> {
        self.inner
            .bound
            .read()
            .as_ref()
            .map(|b| (b.context.clone(), b.sync.clone()))
            .ok_or_else(|| ToolError::NotInitialized(self.name().to_string()))
    }

    fn owned_annotation(&self, context: &ToolContext, id: &str) -> Result<Annotation, ToolError> {
        match context.store.get(id) {
            Some(annotation) if OWNED.contains(&annotation.annotation_type()) => Ok(annotation),
            Some(annotation) => Err(ToolError::InvalidInput(format!(
                "{} is a {} annotation",
                id,
                annotation.annotation_type()
            ))),
            None => Err(ToolError::Store(crate::store::StoreError::NotFound(id.to_string()))),
        }
    }

    // ========================================================================
    // Operations
    // ========================================================================

    /// Turn a captured selection into a stored annotation
    pub async fn create_from_selection(&self, selection: &SelectionPayload) -> Result<Annotation, ToolError> {
        let (context, _) = self.bound()?;
        let (color, style) = {
            let settings = self.inner.settings.read();
            (settings.color.clone(), settings.style)
        };

        let data = match style {
            HighlightStyle::Highlight => AnnotationData::TextHighlight(HighlightData {
                selected_text: selection.text.clone(),
                text_ranges: selection.text_ranges.clone(),
                color,
                line_rects: selection.line_rects.clone(),
            }),
            HighlightStyle::Underline => AnnotationData::Underline(UnderlineData {
                selected_text: selection.text.clone(),
                text_ranges: selection.text_ranges.clone(),
                color,
                line_rects: selection.line_rects.clone(),
                thickness: context.config.highlight.underline_thickness,
            }),
        };

        let annotation = context
            .store
            .create(AnnotationDraft::new(selection.page_number, data))
            .await?;
        Ok(annotation)
    }

    /// Recolor a highlight on screen at once, then persist the change
    pub async fn update_highlight_color(&self, id: &str, color: &str) -> Result<Annotation, ToolError> {
        validate_color(color)?;
        let (context, sync) = self.bound()?;
        self.owned_annotation(&context, id)?;

        sync.engine().update_color(id, color);
        let updated = context.store.update(id, AnnotationChanges::color(color)).await?;
        Ok(updated)
    }

    /// Remove a highlight's overlay and delete it from the store
    pub async fn delete_highlight(&self, id: &str) -> Result<bool, ToolError> {
        let (context, sync) = self.bound()?;
        self.owned_annotation(&context, id)?;

        sync.engine().remove(id);
        Ok(context.store.delete(id).await)
    }

    /// Redraw every owned annotation; returns how many were drawn
    pub fn render_existing(&self) -> Result<usize, ToolError> {
        let (_, sync) = self.bound()?;
        Ok(sync.sync_all())
    }

    /// Menu for a drawn highlight, `None` when it is not on screen
    pub fn action_menu(&self, id: &str) -> Option<ActionMenu> {
        let (_, sync) = self.bound().ok()?;
        let record = sync.engine().record(id)?;

        let mut actions: Vec<MenuAction> = HIGHLIGHT_PALETTE
            .iter()
            .filter(|c| !c.eq_ignore_ascii_case(&record.color))
            .map(|c| MenuAction::ChangeColor(c.to_string()))
            .collect();
        actions.extend([MenuAction::Delete, MenuAction::JumpToPage, MenuAction::Copy]);

        Some(ActionMenu {
            annotation_id: record.annotation_id,
            page_number: record.page_number,
            anchor: record.bounding_box,
            actions,
        })
    }

    /// Run a menu action
    pub async fn perform(&self, id: &str, action: MenuAction) -> Result<(), ToolError> {
        let (context, _) = self.bound()?;
        match action {
            MenuAction::ChangeColor(color) => {
                self.update_highlight_color(id, &color).await?;
            }
            MenuAction::Delete => {
                self.delete_highlight(id).await?;
            }
            MenuAction::JumpToPage => {
                let annotation = self.owned_annotation(&context, id)?;
                context.bus.emit_global(
                    names::NAVIGATION_GOTO_REQUESTED,
                    json!({ "pageNumber": annotation.page_number(), "annotationId": id }),
                );
            }
            MenuAction::Copy => {
                let annotation = self.owned_annotation(&context, id)?;
                let text = annotation.data().selected_text().unwrap_or_default();
                context
                    .bus
                    .emit_global(names::CLIPBOARD_COPY_REQUESTED, json!({ "text": text }));
            }
        }
        Ok(())
    }
}

impl Default for HighlightTool {
    fn default() -> Self {
        Self::new()
    }
}

/// Create an annotation from a `selection:completed` payload when active
fn on_selection(weak: &Weak<HighlightInner>, payload: &serde_json::Value) {
    let inner = match weak.upgrade() {
        Some(inner) => inner,
        None => return,
    };
    if !inner.active.load(Ordering::SeqCst) {
        return;
    }

    let selection: SelectionPayload = match serde_json::from_value(payload.clone()) {
        Ok(selection) => selection,
        Err(e) => {
            tracing::warn!("Ignoring malformed selection: {}", e);
            return;
        }
    };

    let tool = HighlightTool { inner };
    spawn_task(names::SELECTION_COMPLETED, async move {
        match tool.create_from_selection(&selection).await {
            Ok(annotation) => {
                tracing::debug!("Highlighted \"{}\" on page {}", selection.text, annotation.page_number());
                if let Ok((context, _)) = tool.bound() {
                    context.surface.clear_selection();
                }
            }
            Err(e) => tracing::warn!("Failed to create highlight: {}", e),
        }
    });
}

impl Tool for HighlightTool {
    fn kind(&self) -> ToolKind {
        ToolKind::Highlight
    }

    fn name(&self) -> &str {
        "highlight"
    }

    fn display_name(&self) -> &str {
        "Highlight"
    }

    fn icon(&self) -> &str {
        "highlighter"
    }

    fn version(&self) -> &str {
        "1.0.0"
    }

    fn dependencies(&self) -> Vec<String> {
        vec!["annotation-store".to_string(), "render-surface".to_string()]
    }

    fn initialize(&self, context: &ToolContext) -> Result<(), ToolError> {
        if self.inner.bound.read().is_some() {
            return Ok(());
        }
        self.set_color(&context.config.highlight.default_color)?;

        let sync = Arc::new(OverlaySync::new(
            OWNED,
            Arc::new(context.geometry_engine()),
            context.store.clone(),
        ));
        let mut subscriptions = sync.subscribe(&context.bus);

        let weak = Arc::downgrade(&self.inner);
        subscriptions.push(
            context
                .bus
                .on(names::SELECTION_COMPLETED, move |event| on_selection(&weak, &event.payload)),
        );

        let capture = Arc::new(SelectionCapture::new(
            context.surface.clone(),
            context.bus.clone(),
            context.config.geometry.merge(),
            context.config.selection.settle_delay,
        ));

        sync.sync_all();
        *self.inner.bound.write() = Some(Bound {
            context: context.clone(),
            sync,
            capture,
            subscriptions,
        });
        Ok(())
    }

    fn activate(&self) -> Result<(), ToolError> {
        self.bound()?;
        self.inner.active.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn deactivate(&self) {
        self.inner.active.store(false, Ordering::SeqCst);
    }

    fn is_active(&self) -> bool {
        self.inner.active.load(Ordering::SeqCst)
    }

    fn create_tool_button(&self) -> ToolButton {
        ToolButton {
            name: self.name().to_string(),
            label: self.display_name().to_string(),
            icon: self.icon().to_string(),
            active: self.is_active(),
        }
    }

    fn create_annotation_card(&self, annotation: &Annotation) -> Option<AnnotationCard> {
        if !OWNED.contains(&annotation.annotation_type()) {
            return None;
        }
        let title = match annotation.annotation_type() {
            AnnotationType::Underline => "Underline",
            _ => "Highlight",
        };
        Some(AnnotationCard {
            annotation_id: annotation.id().to_string(),
            tool: self.kind(),
            page_number: annotation.page_number(),
            title: title.to_string(),
            excerpt: excerpt(annotation.data().selected_text().unwrap_or_default(), 120),
            color: annotation.color().map(str::to_string),
            comment_count: annotation.comments().len(),
        })
    }

    fn destroy(&self) {
        self.deactivate();
        let bound = self.inner.bound.write().take();
        if let Some(bound) = bound {
            for id in bound.subscriptions {
                bound.context.bus.off(id);
            }
            bound.sync.engine().clear();
        }
    }
}
