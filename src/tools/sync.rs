//! Keeps a tool's overlays in step with store and surface events

use std::sync::Arc;

use serde_json::Value;

use crate::annotations::{Annotation, AnnotationType};
use crate::events::{names, EventBus, SubscriptionId};
use crate::geometry::GeometryEngine;
use crate::store::AnnotationStore;

use super::Surface;

/// Overlay bookkeeping for the annotation types one tool owns
pub(crate) struct OverlaySync {
    types: &'static [AnnotationType],
    engine: Arc<GeometryEngine<dyn Surface>>,
    store: AnnotationStore,
}

impl OverlaySync {
    pub fn new(
        types: &'static [AnnotationType],
        engine: Arc<GeometryEngine<dyn Surface>>,
        store: AnnotationStore,
    ) -> Self {
        Self { types, engine, store }
    }

    pub fn engine(&self) -> &Arc<GeometryEngine<dyn Surface>> {
        &self.engine
    }

    pub fn owns(&self, annotation_type: AnnotationType) -> bool {
        self.types.contains(&annotation_type)
    }

    fn owned(&self, annotations: Vec<Annotation>) -> Vec<Annotation> {
        annotations
            .into_iter()
            .filter(|a| self.owns(a.annotation_type()))
            .collect()
    }

    /// Bring one annotation's overlay in line with the store
    pub fn sync_one(&self, id: &str) {
        let annotation = match self.store.get(id) {
            Some(annotation) if self.owns(annotation.annotation_type()) => annotation,
            Some(_) => return,
            None => {
                self.engine.remove(id);
                return;
            }
        };

        if let Some(record) = self.engine.record(id) {
            if record.page_number == annotation.page_number() && self.engine.is_rendered(id) {
                match self.engine.boxes_for(&annotation) {
                    Ok(boxes) if boxes == record.boxes => {
                        if let Some(color) = annotation.color().filter(|c| record.color != *c) {
                            self.engine.update_color(id, color);
                        }
                    }
                    _ => self.redraw(id),
                }
                return;
            }
        }

        if let Err(e) = self.engine.ensure_rendered_for(&annotation) {
            tracing::debug!("Overlay for {} not drawn: {}", id, e);
        }
    }

    /// Redraw after a data change that may move geometry
    fn redraw(&self, id: &str) {
        match self.store.get(id) {
            Some(annotation) if self.owns(annotation.annotation_type()) => {
                if let Err(e) = self.engine.render(&annotation) {
                    tracing::debug!("Overlay for {} not drawn: {}", id, e);
                    self.engine.remove(id);
                }
            }
            _ => {
                self.engine.remove(id);
            }
        }
    }

    pub fn sync_page(&self, page: u32) -> usize {
        let annotations = self.owned(self.store.get_by_page(page));
        self.engine.ensure_all(&annotations)
    }

    /// Drop every overlay and redraw from the store
    pub fn sync_all(&self) -> usize {
        self.engine.clear();
        let annotations = self.owned(self.store.get_all());
        self.engine.ensure_all(&annotations)
    }

    /// Subscribe to lifecycle and page events
    pub fn subscribe(self: &Arc<Self>, bus: &EventBus) -> Vec<SubscriptionId> {
        let mut ids = Vec::new();

        for name in [names::ANNOTATION_CREATED, names::ANNOTATION_CREATE_FAILED] {
            let sync = self.clone();
            ids.push(bus.on(name, move |event| {
                if let Some(id) = annotation_id(&event.payload) {
                    sync.sync_one(id);
                }
            }));
        }

        let sync = self.clone();
        ids.push(bus.on(names::ANNOTATION_UPDATED, move |event| {
            if let Some(id) = annotation_id(&event.payload) {
                sync.sync_one(id);
            }
        }));

        for name in [names::ANNOTATION_DELETED, names::ANNOTATION_DELETE_FAILED] {
            let sync = self.clone();
            ids.push(bus.on(name, move |event| {
                if let Some(id) = event.payload.get("id").and_then(Value::as_str) {
                    if !sync.store.contains(id) {
                        sync.engine.remove(id);
                    }
                }
            }));
        }

        let sync = self.clone();
        ids.push(bus.on(names::ANNOTATION_LOADED, move |_| {
            sync.sync_all();
        }));

        let sync = self.clone();
        ids.push(bus.on_global(names::PAGE_RENDERED, move |event| {
            if let Some(page) = event.payload.get("pageNumber").and_then(Value::as_u64) {
                sync.sync_page(page as u32);
            }
        }));

        ids
    }
}

/// Id from `{annotation: {id}}` or `{id}` payloads
fn annotation_id(payload: &Value) -> Option<&str> {
    payload
        .get("annotation")
        .and_then(|a| a.get("id"))
        .or_else(|| payload.get("id"))
        .and_then(Value::as_str)
}
