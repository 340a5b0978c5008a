//! Screenshot tool
//!
//! Captures a rectangular page region through an external capturer and
//! stores it as a screenshot annotation framed on the page.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::annotations::{
    Annotation, AnnotationChanges, AnnotationData, AnnotationDraft, AnnotationType, ScreenshotData,
};
use crate::events::SubscriptionId;
use crate::geometry::{GeometryEngine, PercentRect, Rect};

use super::sync::OverlaySync;
use super::{excerpt, AnnotationCard, Surface, Tool, ToolButton, ToolContext, ToolError, ToolKind};

const OWNED: &[AnnotationType] = &[AnnotationType::Screenshot];

/// Pixel capture backend
#[async_trait]
pub trait ScreenshotCapturer: Send + Sync {
    /// Capture `region` (page-relative pixels) of a page, returning an image
    /// reference such as a data URL
    async fn capture(&self, page: u32, region: Rect) -> Result<String, ToolError>;
}

#[derive(Clone)]
pub struct ScreenshotTool {
    inner: Arc<ScreenshotInner>,
}

struct ScreenshotInner {
    capturer: Arc<dyn ScreenshotCapturer>,
    active: AtomicBool,
    bound: RwLock<Option<Bound>>,
}

struct Bound {
    context: ToolContext,
    sync: Arc<OverlaySync>,
    subscriptions: Vec<SubscriptionId>,
}

impl ScreenshotTool {
    pub fn new(capturer: Arc<dyn ScreenshotCapturer>) -> Self {
        Self {
            inner: Arc::new(ScreenshotInner {
                capturer,
                active: AtomicBool::new(false),
                bound: RwLock::new(None),
            }),
        }
    }

    pub fn engine(&self) -> Option<Arc<GeometryEngine<dyn Surface>>> {
        self.inner.bound.read().as_ref().map(|b| b.sync.engine().clone())
    }

    fn context(&self) -> Result<ToolContext, ToolError> {
        self.inner
            .bound
            .read()
            .as_ref()
            .map(|b| b.context.clone())
            .ok_or_else(|| ToolError::NotInitialized(self.name().to_string()))
    }

    /// Capture a region of a rendered page and store it
    pub async fn capture_region(
        &self,
        page: u32,
        region: PercentRect,
        caption: Option<&str>,
    ) -> Result<Annotation, ToolError> {
        let context = self.context()?;
        if !self.is_active() {
            return Err(ToolError::Inactive(self.name().to_string()));
        }
        if !(region.has_area() && region.is_within_page()) {
            return Err(ToolError::InvalidInput(
                "region must have area and lie within the page".to_string(),
            ));
        }
        let page_box = context
            .surface
            .page_rect(page)
            .ok_or_else(|| ToolError::InvalidInput(format!("page {} is not rendered", page)))?;

        let pixels = region.to_pixels(page_box.width, page_box.height);
        let image = self.inner.capturer.capture(page, pixels).await?;
        tracing::debug!("Captured {}x{} px on page {}", pixels.width, pixels.height, page);

        let data = AnnotationData::Screenshot(ScreenshotData {
            rect: Some(region),
            image_data: Some(image),
            caption: caption.map(str::to_string).filter(|c| !c.trim().is_empty()),
        });
        let annotation = context.store.create(AnnotationDraft::new(page, data)).await?;
        Ok(annotation)
    }

    /// Replace or clear the caption of a screenshot annotation
    pub async fn set_caption(&self, id: &str, caption: Option<&str>) -> Result<Annotation, ToolError> {
        let context = self.context()?;
        let annotation = context
            .store
            .get(id)
            .ok_or_else(|| crate::store::StoreError::NotFound(id.to_string()))?;

        let mut data = match annotation.data() {
            AnnotationData::Screenshot(d) => d.clone(),
            other => {
                return Err(ToolError::InvalidInput(format!(
                    "{} is a {} annotation",
                    id,
                    other.annotation_type()
                )))
            }
        };
        data.caption = caption.map(str::to_string).filter(|c| !c.trim().is_empty());

        let changes = AnnotationChanges::data(AnnotationData::Screenshot(data));
        Ok(context.store.update(id, changes).await?)
    }
}

impl Tool for ScreenshotTool {
    fn kind(&self) -> ToolKind {
        ToolKind::Screenshot
    }

    fn name(&self) -> &str {
        "screenshot"
    }

    fn display_name(&self) -> &str {
        "Screenshot"
    }

    fn icon(&self) -> &str {
        "crop"
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
        let sync = Arc::new(OverlaySync::new(
            OWNED,
            Arc::new(context.geometry_engine()),
            context.store.clone(),
        ));
        let subscriptions = sync.subscribe(&context.bus);
        sync.sync_all();

        *self.inner.bound.write() = Some(Bound {
            context: context.clone(),
            sync,
            subscriptions,
        });
        Ok(())
    }

    fn activate(&self) -> Result<(), ToolError> {
        self.context()?;
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
        let data = match annotation.data() {
            AnnotationData::Screenshot(d) => d,
            _ => return None,
        };
        Some(AnnotationCard {
            annotation_id: annotation.id().to_string(),
            tool: self.kind(),
            page_number: annotation.page_number(),
            title: "Screenshot".to_string(),
            excerpt: excerpt(data.caption.as_deref().unwrap_or_default(), 120),
            color: None,
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
