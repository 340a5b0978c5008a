//! Transport seam for remote persistence
//!
//! The store only needs `is_connected` and a request/response call with a
//! timeout. [`LoopbackTransport`] serves the annotation messages from memory
//! and is what the binary and the tests run against.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde_json::{json, Value};
use thiserror::Error;

pub const MSG_CREATE: &str = "annotations.create";
pub const MSG_UPDATE: &str = "annotations.update";
pub const MSG_DELETE: &str = "annotations.delete";
pub const MSG_LOAD: &str = "annotations.load";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("transport is not connected")]
    NotConnected,

    #[error("unknown message type `{0}`")]
    UnknownMessage(String),

    #[error("request rejected: {0}")]
    Rejected(String),

    #[error("request failed: {0}")]
    Failed(String),
}

/// Request/response channel to the persistence server
#[async_trait]
pub trait Transport: Send + Sync {
    fn is_connected(&self) -> bool;

    async fn request(
        &self,
        message_type: &str,
        payload: Value,
        timeout: Duration,
    ) -> Result<Value, TransportError>;
}

// ============================================================================
// Loopback transport
// ============================================================================

/// In-process annotation server
#[derive(Clone, Default)]
pub struct LoopbackTransport {
    inner: Arc<LoopbackInner>,
}

#[derive(Default)]
struct LoopbackInner {
    connected: AtomicBool,
    latency: Mutex<Duration>,
    /// Error returned by every request while set
    failure: Mutex<Option<TransportError>>,
    /// pdfId -> (annotation id -> annotation JSON)
    documents: RwLock<HashMap<String, HashMap<String, Value>>>,
    requests: AtomicUsize,
}

impl LoopbackTransport {
    /// A connected transport with no latency
    pub fn connected() -> Self {
        let transport = Self::default();
        transport.set_connected(true);
        transport
    }

    pub fn set_connected(&self, connected: bool) {
        self.inner.connected.store(connected, Ordering::SeqCst);
    }

    pub fn set_latency(&self, latency: Duration) {
        *self.inner.latency.lock() = latency;
    }

    /// Fail every request with `error` until cleared with `None`
    pub fn set_failure(&self, error: Option<TransportError>) {
        *self.inner.failure.lock() = error;
    }

    /// Seed a document with annotation JSON
    pub fn seed(&self, pdf_id: &str, annotations: Vec<Value>) {
        let mut documents = self.inner.documents.write();
        let document = documents.entry(pdf_id.to_string()).or_default();
        for annotation in annotations {
            if let Some(id) = annotation.get("id").and_then(Value::as_str) {
                document.insert(id.to_string(), annotation.clone());
            }
        }
    }

    /// Annotations stored for a document
    pub fn stored(&self, pdf_id: &str) -> Vec<Value> {
        self.inner
            .documents
            .read()
            .get(pdf_id)
            .map(|doc| doc.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of requests received so far
    pub fn request_count(&self) -> usize {
        self.inner.requests.load(Ordering::SeqCst)
    }

    fn handle(&self, message_type: &str, payload: &Value) -> Result<Value, TransportError> {
        let pdf_id = payload
            .get("pdfId")
            .and_then(Value::as_str)
            .ok_or_else(|| TransportError::Rejected("missing pdfId".to_string()))?;

        match message_type {
            MSG_CREATE | MSG_UPDATE => {
                let annotation = payload
                    .get("annotation")
                    .cloned()
                    .ok_or_else(|| TransportError::Rejected("missing annotation".to_string()))?;
                let id = annotation
                    .get("id")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .ok_or_else(|| TransportError::Rejected("annotation has no id".to_string()))?;

                let mut documents = self.inner.documents.write();
                let document = documents.entry(pdf_id.to_string()).or_default();
                if message_type == MSG_UPDATE && !document.contains_key(&id) {
                    return Err(TransportError::Rejected(format!("annotation {} not found", id)));
                }
                document.insert(id, annotation.clone());
                Ok(json!({ "annotation": annotation }))
            }
            MSG_DELETE => {
                let id = payload
                    .get("id")
                    .and_then(Value::as_str)
                    .ok_or_else(|| TransportError::Rejected("missing id".to_string()))?;
                let deleted = self
                    .inner
                    .documents
                    .write()
                    .get_mut(pdf_id)
                    .map(|doc| doc.remove(id).is_some())
                    .unwrap_or(false);
                Ok(json!({ "deleted": deleted }))
            }
            MSG_LOAD => Ok(json!({ "annotations": self.stored(pdf_id) })),
            other => Err(TransportError::UnknownMessage(other.to_string())),
        }
    }
}

#[async_trait]
impl Transport for LoopbackTransport {
    fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    async fn request(
        &self,
        message_type: &str,
        payload: Value,
        _timeout: Duration,
    ) -> Result<Value, TransportError> {
        self.inner.requests.fetch_add(1, Ordering::SeqCst);

        let latency = *self.inner.latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        let failure = self.inner.failure.lock().clone();
        if let Some(error) = failure {
            return Err(error);
        }

        self.handle(message_type, &payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_then_load() {
        let transport = LoopbackTransport::connected();
        let annotation = json!({"id": "a1", "type": "comment"});

        transport
            .request(MSG_CREATE, json!({"pdfId": "doc", "annotation": annotation}), Duration::from_secs(1))
            .await
            .unwrap();
        let response = transport
            .request(MSG_LOAD, json!({"pdfId": "doc"}), Duration::from_secs(1))
            .await
            .unwrap();

        assert_eq!(response["annotations"].as_array().unwrap().len(), 1);
        assert_eq!(transport.request_count(), 2);
    }

    #[tokio::test]
    async fn test_update_unknown_is_rejected() {
        let transport = LoopbackTransport::connected();
        let err = transport
            .request(
                MSG_UPDATE,
                json!({"pdfId": "doc", "annotation": {"id": "missing"}}),
                Duration::from_secs(1),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Rejected(_)));
    }

    #[tokio::test]
    async fn test_disconnected_and_injected_failures() {
        let transport = LoopbackTransport::default();
        let err = transport
            .request(MSG_LOAD, json!({"pdfId": "doc"}), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert_eq!(err, TransportError::NotConnected);

        transport.set_connected(true);
        transport.set_failure(Some(TransportError::Failed("socket closed".to_string())));
        let err = transport
            .request(MSG_LOAD, json!({"pdfId": "doc"}), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "request failed: socket closed");

        let err = {
            transport.set_failure(None);
            transport
                .request("annotations.export", json!({"pdfId": "doc"}), Duration::from_secs(1))
                .await
                .unwrap_err()
        };
        assert!(matches!(err, TransportError::UnknownMessage(_)));
    }
}
