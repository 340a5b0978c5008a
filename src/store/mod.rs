//! Annotation store
//!
//! Owns the canonical in-memory annotation collection. Every mutation is
//! applied to memory first and then persisted; the backend is chosen per
//! call from the transport and document id present at that moment.
//! Persistence failures are reported as `*:failed` events and never roll
//! back the in-memory state.

mod backend;
mod pdf_id;
mod transport;

pub use backend::{select_mode, LocalBackend, PersistenceBackend, PersistenceMode, RemoteBackend};
pub use pdf_id::{extract_pdf_id, resolve_pdf_id, PdfIdSources};
pub use transport::{LoopbackTransport, Transport, TransportError};

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::{json, Value};
use thiserror::Error;

use crate::annotations::{Annotation, AnnotationChanges, AnnotationDraft, AnnotationType, Comment};
use crate::config::StoreConfig;
use crate::error::ValidationError;
use crate::events::{names, EventBus, SubscriptionId};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("annotation {0} not found")]
    NotFound(String),
}

/// Shared annotation store handle
#[derive(Clone)]
pub struct AnnotationStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    annotations: RwLock<HashMap<String, Annotation>>,
    pdf_id: RwLock<Option<String>>,
    transport: RwLock<Option<Arc<dyn Transport>>>,
    local: Arc<LocalBackend>,
    bus: EventBus,
    config: StoreConfig,
}

impl AnnotationStore {
    pub fn new(bus: EventBus, config: StoreConfig) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                annotations: RwLock::new(HashMap::new()),
                pdf_id: RwLock::new(None),
                transport: RwLock::new(None),
                local: Arc::new(LocalBackend::new(config.local_latency)),
                bus,
                config,
            }),
        }
    }

    pub fn bus(&self) -> &EventBus {
        &self.inner.bus
    }

    // ========================================================================
    // Persistence wiring
    // ========================================================================

    pub fn set_pdf_id(&self, pdf_id: Option<&str>) {
        *self.inner.pdf_id.write() = pdf_id.map(|s| s.to_string());
    }

    pub fn pdf_id(&self) -> Option<String> {
        self.inner.pdf_id.read().clone()
    }

    pub fn set_transport(&self, transport: Arc<dyn Transport>) {
        *self.inner.transport.write() = Some(transport);
    }

    pub fn clear_transport(&self) {
        *self.inner.transport.write() = None;
    }

    /// Mode the next operation would use
    pub fn persistence_mode(&self) -> PersistenceMode {
        let connected = self
            .inner
            .transport
            .read()
            .as_ref()
            .map(|t| t.is_connected())
            .unwrap_or(false);
        select_mode(connected, self.inner.pdf_id.read().is_some())
    }

    fn backend(&self) -> Arc<dyn PersistenceBackend> {
        let pdf_id_set = self.inner.pdf_id.read().is_some();
        let transport = self.inner.transport.read().clone();
        if let Some(transport) = transport {
            if select_mode(transport.is_connected(), pdf_id_set) == PersistenceMode::Remote {
                return Arc::new(RemoteBackend::new(transport, &self.inner.config));
            }
        }
        self.inner.local.clone()
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Validate, insert and persist a new annotation
    ///
    /// Returns the annotation as inserted. A persistence failure emits
    /// `annotation:create:failed` and keeps the annotation in memory.
    pub async fn create(&self, draft: AnnotationDraft) -> Result<Annotation, ValidationError> {
        let annotation = Annotation::new(draft)?;
        {
            let mut annotations = self.inner.annotations.write();
            if annotations.contains_key(annotation.id()) {
                return Err(ValidationError::invalid(
                    "id",
                    format!("annotation {} already exists", annotation.id()),
                ));
            }
            annotations.insert(annotation.id().to_string(), annotation.clone());
        }

        let backend = self.backend();
        let pdf_id = self.pdf_id();
        let mode = backend.mode();

        match backend.create(pdf_id.as_deref(), &annotation).await {
            Ok(()) => {
                if self.contains(annotation.id()) {
                    tracing::debug!("Created annotation {} ({})", annotation.id(), mode.as_str());
                    self.emit_result(
                        names::ANNOTATION_CREATED,
                        json!({ "annotation": to_value(&annotation), "mode": mode }),
                    );
                } else {
                    tracing::debug!("Annotation {} deleted before create resolved", annotation.id());
                }
            }
            Err(e) => {
                tracing::warn!("Failed to persist annotation {}: {}", annotation.id(), e);
                self.emit_result(
                    names::ANNOTATION_CREATE_FAILED,
                    json!({
                        "id": annotation.id(),
                        "annotation": to_value(&annotation),
                        "error": e.to_string(),
                    }),
                );
            }
        }

        Ok(annotation)
    }

    /// Apply a change set and persist it
    pub async fn update(&self, id: &str, changes: AnnotationChanges) -> Result<Annotation, StoreError> {
        let updated = match self.modify(id, |annotation| Ok(annotation.apply(&changes)?)) {
            Ok((annotation, ())) => annotation,
            Err(StoreError::NotFound(_)) => {
                self.emit_result(
                    names::ANNOTATION_UPDATE_FAILED,
                    json!({ "id": id, "error": format!("annotation {} not found", id) }),
                );
                return Err(StoreError::NotFound(id.to_string()));
            }
            Err(e) => return Err(e),
        };
        self.persist_update(updated).await
    }

    /// Remove an annotation and persist the removal
    ///
    /// Returns `false` if the id is unknown.
    pub async fn delete(&self, id: &str) -> bool {
        let removed = self.inner.annotations.write().remove(id);
        let removed = match removed {
            Some(annotation) => annotation,
            None => {
                self.emit_result(
                    names::ANNOTATION_DELETE_FAILED,
                    json!({ "id": id, "error": format!("annotation {} not found", id) }),
                );
                return false;
            }
        };

        let backend = self.backend();
        let pdf_id = self.pdf_id();

        match backend.delete(pdf_id.as_deref(), id).await {
            Ok(()) => {
                self.emit_result(
                    names::ANNOTATION_DELETED,
                    json!({ "id": id, "pageNumber": removed.page_number() }),
                );
            }
            Err(e) => {
                tracing::warn!("Failed to delete annotation {}: {}", id, e);
                self.emit_result(
                    names::ANNOTATION_DELETE_FAILED,
                    json!({ "id": id, "pageNumber": removed.page_number(), "error": e.to_string() }),
                );
            }
        }
        true
    }

    /// Replace the in-memory collection with the persisted one
    ///
    /// `Some(id)` sets the document id first. On failure the current
    /// collection is kept and an empty list is returned.
    pub async fn load(&self, pdf_id: Option<&str>) -> Vec<Annotation> {
        if let Some(pdf_id) = pdf_id {
            self.set_pdf_id(Some(pdf_id));
        }
        let pdf_id = self.pdf_id();
        let backend = self.backend();

        match backend.load(pdf_id.as_deref()).await {
            Ok(loaded) => {
                {
                    let mut annotations = self.inner.annotations.write();
                    annotations.clear();
                    for annotation in &loaded {
                        annotations.insert(annotation.id().to_string(), annotation.clone());
                    }
                }
                let loaded = self.get_all();
                tracing::info!(
                    "Loaded {} annotations for {} ({})",
                    loaded.len(),
                    pdf_id.as_deref().unwrap_or("<local>"),
                    backend.mode().as_str()
                );
                self.emit_result(
                    names::ANNOTATION_LOADED,
                    json!({
                        "pdfId": pdf_id,
                        "count": loaded.len(),
                        "annotations": loaded.iter().map(to_value).collect::<Vec<_>>(),
                    }),
                );
                loaded
            }
            Err(e) => {
                tracing::warn!("Failed to load annotations: {}", e);
                self.emit_result(
                    names::ANNOTATION_LOAD_FAILED,
                    json!({ "pdfId": pdf_id, "error": e.to_string() }),
                );
                Vec::new()
            }
        }
    }

    /// Resolve the document id from `sources` and load its annotations
    ///
    /// When no source yields an id the document id is cleared and the
    /// local backend serves the load.
    pub async fn open(&self, sources: &PdfIdSources<'_>) -> Vec<Annotation> {
        let pdf_id = resolve_pdf_id(sources);
        match &pdf_id {
            Some(pdf_id) => tracing::debug!("Resolved document id {}", pdf_id),
            None => tracing::debug!("No document id found, annotations stay local"),
        }
        self.set_pdf_id(pdf_id.as_deref());
        self.load(None).await
    }

    pub async fn add_comment(
        &self,
        id: &str,
        content: &str,
        author: Option<&str>,
    ) -> Result<Comment, StoreError> {
        let (annotation, comment) =
            self.modify(id, |annotation| Ok(annotation.add_comment(content, author)?.clone()))?;
        self.persist_update(annotation).await?;
        Ok(comment)
    }

    pub async fn remove_comment(&self, id: &str, comment_id: &str) -> Result<Option<Comment>, StoreError> {
        let (annotation, removed) = self.modify(id, |annotation| Ok(annotation.remove_comment(comment_id)))?;
        if removed.is_some() {
            self.persist_update(annotation).await?;
        }
        Ok(removed)
    }

    /// Edit the stored annotation in place under the write lock
    ///
    /// Returns a snapshot taken while the lock is held.
    fn modify<T, F>(&self, id: &str, edit: F) -> Result<(Annotation, T), StoreError>
    where
        F: FnOnce(&mut Annotation) -> Result<T, StoreError>,
    {
        let mut annotations = self.inner.annotations.write();
        let annotation = annotations
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        let output = edit(annotation)?;
        Ok((annotation.clone(), output))
    }

    /// Persist an annotation already updated in memory
    async fn persist_update(&self, annotation: Annotation) -> Result<Annotation, StoreError> {
        let id = annotation.id().to_string();
        let backend = self.backend();
        let pdf_id = self.pdf_id();

        match backend.update(pdf_id.as_deref(), &annotation).await {
            Ok(()) => match self.get(&id) {
                Some(current) => {
                    self.emit_result(names::ANNOTATION_UPDATED, json!({ "annotation": to_value(&current) }));
                }
                None => tracing::debug!("Annotation {} deleted before update resolved", id),
            },
            Err(e) => {
                tracing::warn!("Failed to persist update of {}: {}", id, e);
                self.emit_result(
                    names::ANNOTATION_UPDATE_FAILED,
                    json!({ "id": id, "error": e.to_string() }),
                );
            }
        }

        Ok(annotation)
    }

    /// Drop every annotation from memory without persisting
    pub fn clear(&self) {
        self.inner.annotations.write().clear();
    }

    fn emit_result(&self, name: &str, payload: Value) {
        self.inner.bus.emit_both(name, payload);
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// All annotations, ordered by page then creation time
    pub fn get_all(&self) -> Vec<Annotation> {
        let mut all: Vec<Annotation> = self.inner.annotations.read().values().cloned().collect();
        all.sort_by(|a, b| {
            a.page_number()
                .cmp(&b.page_number())
                .then(a.created_at().cmp(&b.created_at()))
                .then_with(|| a.id().cmp(b.id()))
        });
        all
    }

    pub fn get_by_page(&self, page_number: u32) -> Vec<Annotation> {
        self.get_all()
            .into_iter()
            .filter(|a| a.page_number() == page_number)
            .collect()
    }

    pub fn get_by_type(&self, annotation_type: AnnotationType) -> Vec<Annotation> {
        self.get_all()
            .into_iter()
            .filter(|a| a.annotation_type() == annotation_type)
            .collect()
    }

    pub fn get(&self, id: &str) -> Option<Annotation> {
        self.inner.annotations.read().get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.inner.annotations.read().contains_key(id)
    }

    pub fn count(&self) -> usize {
        self.inner.annotations.read().len()
    }

    // ========================================================================
    // Event wiring
    // ========================================================================

    /// Serve `annotation:*:requested` events from the local channel
    ///
    /// Each request runs as a spawned task; requests arriving outside a
    /// tokio runtime are dropped with a warning.
    pub fn listen(&self) -> Vec<SubscriptionId> {
        let bus = self.inner.bus.clone();
        let mut ids = Vec::new();

        let store = self.clone();
        ids.push(bus.on(names::ANNOTATION_CREATE_REQUESTED, move |event| {
            match AnnotationDraft::from_value(event.payload.clone()) {
                Ok(draft) => {
                    let store = store.clone();
                    spawn_request(names::ANNOTATION_CREATE_REQUESTED, async move {
                        // Validation already passed; the result is reported through events.
                        let _ = store.create(draft).await;
                    });
                }
                Err(e) => store.emit_result(
                    names::ANNOTATION_CREATE_FAILED,
                    json!({ "error": e.to_string() }),
                ),
            }
        }));

        let store = self.clone();
        ids.push(bus.on(names::ANNOTATION_UPDATE_REQUESTED, move |event| {
            let id = event.payload.get("id").and_then(Value::as_str).unwrap_or_default();
            let changes = store
                .get(id)
                .ok_or_else(|| StoreError::NotFound(id.to_string()))
                .and_then(|current| {
                    let raw = event.payload.get("changes").cloned().unwrap_or(Value::Null);
                    let raw = if raw.is_null() { json!({}) } else { raw };
                    Ok(AnnotationChanges::from_value(raw, current.annotation_type())?)
                });

            match changes {
                Ok(changes) => {
                    let store = store.clone();
                    let id = id.to_string();
                    spawn_request(names::ANNOTATION_UPDATE_REQUESTED, async move {
                        // NotFound is reported by `update` itself
                        if let Err(StoreError::Validation(e)) = store.update(&id, changes).await {
                            store.emit_result(
                                names::ANNOTATION_UPDATE_FAILED,
                                json!({ "id": id, "error": e.to_string() }),
                            );
                        }
                    });
                }
                Err(e) => store.emit_result(
                    names::ANNOTATION_UPDATE_FAILED,
                    json!({ "id": id, "error": e.to_string() }),
                ),
            }
        }));

        let store = self.clone();
        ids.push(bus.on(names::ANNOTATION_DELETE_REQUESTED, move |event| {
            let id = event
                .payload
                .get("id")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let store = store.clone();
            spawn_request(names::ANNOTATION_DELETE_REQUESTED, async move {
                store.delete(&id).await;
            });
        }));

        let store = self.clone();
        ids.push(bus.on(names::ANNOTATION_LOAD_REQUESTED, move |event| {
            let pdf_id = event.payload.get("pdfId").and_then(Value::as_str).map(str::to_string);
            let store = store.clone();
            spawn_request(names::ANNOTATION_LOAD_REQUESTED, async move {
                store.load(pdf_id.as_deref()).await;
            });
        }));

        ids
    }
}

fn to_value(annotation: &Annotation) -> Value {
    annotation.to_json().unwrap_or(Value::Null)
}

fn spawn_request<F>(event: &str, request: F)
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(request);
        }
        Err(_) => tracing::warn!("Dropping {}: no async runtime", event),
    }
}
