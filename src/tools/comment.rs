//! Comment pins
//!
//! Places free-form comments at a page position and keeps a pin overlay for
//! every stored comment annotation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::annotations::{
    Annotation, AnnotationChanges, AnnotationData, AnnotationDraft, AnnotationType, CommentData,
};
use crate::events::SubscriptionId;
use crate::geometry::{GeometryEngine, PercentPoint};

use super::sync::OverlaySync;
use super::{excerpt, AnnotationCard, Surface, Tool, ToolButton, ToolContext, ToolError, ToolKind};

const OWNED: &[AnnotationType] = &[AnnotationType::Comment];

#[derive(Clone, Default)]
pub struct CommentTool {
    inner: Arc<CommentInner>,
}

#[derive(Default)]
struct CommentInner {
    active: AtomicBool,
    bound: RwLock<Option<Bound>>,
}

struct Bound {
    context: ToolContext,
    sync: Arc<OverlaySync>,
    subscriptions: Vec<SubscriptionId>,
}

impl CommentTool {
    pub fn new() -> Self {
        Self::default()
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

    /// Drop a pin at `position` on `page`; the tool must be active
    pub async fn place_comment(
        &self,
        page: u32,
        position: PercentPoint,
        content: &str,
    ) -> Result<Annotation, ToolError> {
        let context = self.context()?;
        if !self.is_active() {
            return Err(ToolError::Inactive(self.name().to_string()));
        }
        if context.surface.page_rect(page).is_none() {
            return Err(ToolError::InvalidInput(format!("page {} is not rendered", page)));
        }

        let data = AnnotationData::Comment(CommentData {
            position: Some(position),
            content: content.trim().to_string(),
        });
        let annotation = context.store.create(AnnotationDraft::new(page, data)).await?;
        Ok(annotation)
    }

    /// Replace the text of a comment annotation, keeping its position
    pub async fn edit_comment(&self, id: &str, content: &str) -> Result<Annotation, ToolError> {
        let context = self.context()?;
        let annotation = context
            .store
            .get(id)
            .ok_or_else(|| crate::store::StoreError::NotFound(id.to_string()))?;

        let position = match annotation.data() {
            AnnotationData::Comment(d) => d.position,
            other => {
                return Err(ToolError::InvalidInput(format!(
                    "{} is a {} annotation",
                    id,
                    other.annotation_type()
                )))
            }
        };
        let changes = AnnotationChanges::data(AnnotationData::Comment(CommentData {
            position,
            content: content.trim().to_string(),
        }));
        Ok(context.store.update(id, changes).await?)
    }

    pub async fn delete_comment(&self, id: &str) -> Result<bool, ToolError> {
        let context = self.context()?;
        if let Some(engine) = self.engine() {
            engine.remove(id);
        }
        Ok(context.store.delete(id).await)
    }
}

impl Tool for CommentTool {
    fn kind(&self) -> ToolKind {
        ToolKind::Comment
    }

    fn name(&self) -> &str {
        "comment"
    }

    fn display_name(&self) -> &str {
        "Comment"
    }

    fn icon(&self) -> &str {
        "message-square"
    }

    fn version(&self) -> &str {
        "1.0.0"
    }

    fn dependencies(&self) -> Vec<String> {
        vec!["annotation-store".to_string()]
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
        let content = match annotation.data() {
            AnnotationData::Comment(d) => &d.content,
            _ => return None,
        };
        Some(AnnotationCard {
            annotation_id: annotation.id().to_string(),
            tool: self.kind(),
            page_number: annotation.page_number(),
            title: "Comment".to_string(),
            excerpt: excerpt(content, 120),
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
