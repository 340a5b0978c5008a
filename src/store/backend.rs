//! Persistence backends
//!
//! The store picks a backend on every call through [`select_mode`]. Remote
//! persistence goes through the transport with an explicit timeout per
//! operation; local persistence keeps a per-document snapshot in memory and
//! simulates network latency.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::{json, Value};

use super::transport::{Transport, MSG_CREATE, MSG_DELETE, MSG_LOAD, MSG_UPDATE};
use crate::annotations::Annotation;
use crate::config::StoreConfig;
use crate::error::PersistenceError;

/// Where an operation is persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PersistenceMode {
    Local,
    Remote,
}

impl PersistenceMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PersistenceMode::Local => "local",
            PersistenceMode::Remote => "remote",
        }
    }
}

/// Remote iff a connected transport exists and a document id is set
pub fn select_mode(transport_connected: bool, pdf_id_set: bool) -> PersistenceMode {
    if transport_connected && pdf_id_set {
        PersistenceMode::Remote
    } else {
        PersistenceMode::Local
    }
}

/// Storage behind the annotation store
#[async_trait]
pub trait PersistenceBackend: Send + Sync {
    fn mode(&self) -> PersistenceMode;

    async fn create(&self, pdf_id: Option<&str>, annotation: &Annotation) -> Result<(), PersistenceError>;

    async fn update(&self, pdf_id: Option<&str>, annotation: &Annotation) -> Result<(), PersistenceError>;

    async fn delete(&self, pdf_id: Option<&str>, id: &str) -> Result<(), PersistenceError>;

    async fn load(&self, pdf_id: Option<&str>) -> Result<Vec<Annotation>, PersistenceError>;
}

// ============================================================================
// Local backend
// ============================================================================

/// In-memory persistence with simulated latency
pub struct LocalBackend {
    latency: Duration,
    /// Document key -> annotations saved while local
    snapshots: RwLock<HashMap<String, HashMap<String, Annotation>>>,
}

impl LocalBackend {
    pub fn new(latency: Duration) -> Self {
        Self {
            latency,
            snapshots: RwLock::new(HashMap::new()),
        }
    }

    fn key(pdf_id: Option<&str>) -> String {
        pdf_id.unwrap_or_default().to_string()
    }

    async fn simulate_latency(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }
}

#[async_trait]
impl PersistenceBackend for LocalBackend {
    fn mode(&self) -> PersistenceMode {
        PersistenceMode::Local
    }

    async fn create(&self, pdf_id: Option<&str>, annotation: &Annotation) -> Result<(), PersistenceError> {
        self.simulate_latency().await;
        self.snapshots
            .write()
            .entry(Self::key(pdf_id))
            .or_default()
            .insert(annotation.id().to_string(), annotation.clone());
        Ok(())
    }

    async fn update(&self, pdf_id: Option<&str>, annotation: &Annotation) -> Result<(), PersistenceError> {
        self.create(pdf_id, annotation).await
    }

    async fn delete(&self, pdf_id: Option<&str>, id: &str) -> Result<(), PersistenceError> {
        self.simulate_latency().await;
        if let Some(snapshot) = self.snapshots.write().get_mut(&Self::key(pdf_id)) {
            snapshot.remove(id);
        }
        Ok(())
    }

    async fn load(&self, pdf_id: Option<&str>) -> Result<Vec<Annotation>, PersistenceError> {
        self.simulate_latency().await;
        Ok(self
            .snapshots
            .read()
            .get(&Self::key(pdf_id))
            .map(|snapshot| snapshot.values().cloned().collect())
            .unwrap_or_default())
    }
}

// ============================================================================
// Remote backend
// ============================================================================

/// Persistence through a transport, with per-operation timeouts
pub struct RemoteBackend {
    transport: Arc<dyn Transport>,
    create_timeout: Duration,
    update_timeout: Duration,
    delete_timeout: Duration,
    load_timeout: Duration,
}

impl RemoteBackend {
    pub fn new(transport: Arc<dyn Transport>, config: &StoreConfig) -> Self {
        Self {
            transport,
            create_timeout: config.create_timeout,
            update_timeout: config.update_timeout,
            delete_timeout: config.delete_timeout,
            load_timeout: config.load_timeout,
        }
    }

    async fn call(
        &self,
        operation: &'static str,
        message_type: &str,
        payload: Value,
        timeout: Duration,
    ) -> Result<Value, PersistenceError> {
        let request = self.transport.request(message_type, payload, timeout);
        match tokio::time::timeout(timeout, request).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(source)) => Err(PersistenceError::Transport { operation, source }),
            Err(_) => Err(PersistenceError::Timeout {
                operation,
                after: timeout,
            }),
        }
    }

    fn require_pdf_id<'a>(operation: &'static str, pdf_id: Option<&'a str>) -> Result<&'a str, PersistenceError> {
        pdf_id.ok_or(PersistenceError::BadResponse {
            operation,
            reason: "no document id set".to_string(),
        })
    }

    fn encode(operation: &'static str, annotation: &Annotation) -> Result<Value, PersistenceError> {
        annotation.to_json().map_err(|e| PersistenceError::BadResponse {
            operation,
            reason: e.to_string(),
        })
    }
}

#[async_trait]
impl PersistenceBackend for RemoteBackend {
    fn mode(&self) -> PersistenceMode {
        PersistenceMode::Remote
    }

    async fn create(&self, pdf_id: Option<&str>, annotation: &Annotation) -> Result<(), PersistenceError> {
        let pdf_id = Self::require_pdf_id("create", pdf_id)?;
        let payload = json!({ "pdfId": pdf_id, "annotation": Self::encode("create", annotation)? });
        self.call("create", MSG_CREATE, payload, self.create_timeout).await?;
        Ok(())
    }

    async fn update(&self, pdf_id: Option<&str>, annotation: &Annotation) -> Result<(), PersistenceError> {
        let pdf_id = Self::require_pdf_id("update", pdf_id)?;
        let payload = json!({
            "pdfId": pdf_id,
            "id": annotation.id(),
            "annotation": Self::encode("update", annotation)?,
        });
        self.call("update", MSG_UPDATE, payload, self.update_timeout).await?;
        Ok(())
    }

    async fn delete(&self, pdf_id: Option<&str>, id: &str) -> Result<(), PersistenceError> {
        let pdf_id = Self::require_pdf_id("delete", pdf_id)?;
        let payload = json!({ "pdfId": pdf_id, "id": id });
        self.call("delete", MSG_DELETE, payload, self.delete_timeout).await?;
        Ok(())
    }

    async fn load(&self, pdf_id: Option<&str>) -> Result<Vec<Annotation>, PersistenceError> {
        let pdf_id = Self::require_pdf_id("load", pdf_id)?;
        let response = self
            .call("load", MSG_LOAD, json!({ "pdfId": pdf_id }), self.load_timeout)
            .await?;

        let entries = response
            .get("annotations")
            .and_then(Value::as_array)
            .ok_or_else(|| PersistenceError::BadResponse {
                operation: "load",
                reason: "missing `annotations` array".to_string(),
            })?;

        let mut annotations = Vec::with_capacity(entries.len());
        for entry in entries {
            match Annotation::from_json(entry) {
                Ok(annotation) => annotations.push(annotation),
                Err(e) => tracing::warn!("Skipping invalid annotation from server: {}", e),
            }
        }
        Ok(annotations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotations::{AnnotationData, AnnotationDraft, CommentData};
    use crate::geometry::PercentPoint;
    use crate::store::transport::{LoopbackTransport, TransportError};

    fn comment(content: &str) -> Annotation {
        Annotation::new(AnnotationDraft::new(
            1,
            AnnotationData::Comment(CommentData {
                position: Some(PercentPoint::new(10.0, 10.0)),
                content: content.to_string(),
            }),
        ))
        .unwrap()
    }

    fn fast_config() -> StoreConfig {
        StoreConfig {
            create_timeout: Duration::from_millis(40),
            update_timeout: Duration::from_millis(40),
            delete_timeout: Duration::from_millis(20),
            load_timeout: Duration::from_millis(40),
            local_latency: Duration::ZERO,
        }
    }

    #[test]
    fn test_select_mode_truth_table() {
        assert_eq!(select_mode(true, true), PersistenceMode::Remote);
        assert_eq!(select_mode(true, false), PersistenceMode::Local);
        assert_eq!(select_mode(false, true), PersistenceMode::Local);
        assert_eq!(select_mode(false, false), PersistenceMode::Local);
    }

    #[tokio::test]
    async fn test_local_snapshot_per_document() {
        let backend = LocalBackend::new(Duration::ZERO);
        let a = comment("a");
        let b = comment("b");

        backend.create(Some("doc-1"), &a).await.unwrap();
        backend.create(Some("doc-2"), &b).await.unwrap();
        backend.delete(Some("doc-2"), b.id()).await.unwrap();

        let loaded = backend.load(Some("doc-1")).await.unwrap();
        assert_eq!(loaded, vec![a]);
        assert!(backend.load(Some("doc-2")).await.unwrap().is_empty());
        assert!(backend.load(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_remote_round_trip() {
        let transport = LoopbackTransport::connected();
        let backend = RemoteBackend::new(Arc::new(transport.clone()), &fast_config());
        let a = comment("remote");

        backend.create(Some("abc123def456"), &a).await.unwrap();
        let loaded = backend.load(Some("abc123def456")).await.unwrap();

        assert_eq!(loaded, vec![a]);
        assert_eq!(transport.stored("abc123def456").len(), 1);
    }

    #[tokio::test]
    async fn test_remote_requires_pdf_id() {
        let transport = LoopbackTransport::connected();
        let backend = RemoteBackend::new(Arc::new(transport), &fast_config());
        let a = comment("orphan");

        let err = backend.create(None, &a).await.unwrap_err();
        assert!(matches!(err, PersistenceError::BadResponse { operation: "create", .. }));
        assert!(backend.load(Some("abc123def456")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_remote_timeout() {
        let transport = LoopbackTransport::connected();
        transport.set_latency(Duration::from_millis(300));
        let backend = RemoteBackend::new(Arc::new(transport), &fast_config());

        let err = backend.delete(Some("doc"), "x").await.unwrap_err();
        match err {
            PersistenceError::Timeout { operation, after } => {
                assert_eq!(operation, "delete");
                assert_eq!(after, Duration::from_millis(20));
            }
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_remote_transport_error() {
        let transport = LoopbackTransport::connected();
        transport.set_failure(Some(TransportError::Failed("boom".to_string())));
        let backend = RemoteBackend::new(Arc::new(transport), &fast_config());

        let err = backend.create(Some("doc"), &comment("x")).await.unwrap_err();
        assert!(matches!(err, PersistenceError::Transport { operation: "create", .. }));
        assert!(err.to_string().contains("boom"));
    }

    #[tokio::test]
    async fn test_remote_load_skips_invalid_entries() {
        let transport = LoopbackTransport::connected();
        let valid = comment("kept").to_json().unwrap();
        transport.seed("doc", vec![valid, json!({"id": "broken", "type": "comment"})]);
        let backend = RemoteBackend::new(Arc::new(transport), &fast_config());

        let loaded = backend.load(Some("doc")).await.unwrap();
        assert_eq!(loaded.len(), 1);
    }
}
