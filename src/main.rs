//! Amnesia Annotator CLI
//!
//! Builds a document surface from a JSON fixture, imports annotations in
//! local mode and prints the overlays they render to as JSON.
//!
//! Usage: `amnesia-annotator <surface.json> [annotations.json]`

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use futures::future::join_all;
use serde::Serialize;
use serde_json::Value;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use amnesia_annotator::annotations::AnnotationDraft;
use amnesia_annotator::geometry::{RenderRecord, Rect};
use amnesia_annotator::store::PdfIdSources;
use amnesia_annotator::surface::SurfaceFixture;
use amnesia_annotator::tools::{ScreenshotCapturer, ToolError};
use amnesia_annotator::{AnnotatorState, Config};

const USAGE: &str = "usage: amnesia-annotator <surface.json> [annotations.json]";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Report {
    mode: &'static str,
    pdf_id: Option<String>,
    pages: u32,
    annotations: usize,
    rejected: usize,
    overlays: Vec<RenderRecord>,
}

/// Imported screenshots are framed, new captures are refused
struct NoCapture;

#[async_trait]
impl ScreenshotCapturer for NoCapture {
    async fn capture(&self, page: u32, _region: Rect) -> Result<String, ToolError> {
        Err(ToolError::Capture(format!("no capture backend for page {}", page)))
    }
}

/// Accept a bare array or an object with an `annotations` array
fn annotation_entries(raw: Value) -> Vec<Value> {
    match raw {
        Value::Array(items) => items,
        Value::Object(mut object) => match object.remove("annotations") {
            Some(Value::Array(items)) => items,
            _ => vec![Value::Object(object)],
        },
        _ => Vec::new(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so stdout carries only the report
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "amnesia_annotator=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    dotenvy::dotenv().ok();

    let config = Config::from_env().unwrap_or_else(|e| {
        tracing::warn!("Failed to load config from env: {}, using defaults", e);
        Config::default()
    });

    let mut args = std::env::args().skip(1);
    let surface_path = args.next().context(USAGE)?;
    let annotations_path = args.next();

    tracing::info!("Starting Amnesia Annotator v{}", env!("CARGO_PKG_VERSION"));

    let fixture_json = std::fs::read_to_string(&surface_path)
        .with_context(|| format!("Failed to read surface fixture {}", surface_path))?;
    let fixture = SurfaceFixture::from_json(&fixture_json)
        .with_context(|| format!("Invalid surface fixture {}", surface_path))?;
    let surface = Arc::new(fixture.build());

    let state = AnnotatorState::new(config, surface.clone(), Some(Arc::new(NoCapture)))?;
    surface.connect_bus(state.bus().clone());

    // ANNOTATOR_PDF_ID wins over an id embedded in the fixture file name
    let explicit = std::env::var("ANNOTATOR_PDF_ID").ok();
    let existing = state
        .open_document(&PdfIdSources {
            explicit: explicit.as_deref(),
            file_name: Some(surface_path.as_str()),
            ..Default::default()
        })
        .await;
    tracing::info!(
        "Opened document {} with {} stored annotations",
        state.store().pdf_id().as_deref().unwrap_or("<none>"),
        existing.len()
    );

    let mut rejected = 0;
    if let Some(path) = annotations_path {
        let raw = std::fs::read_to_string(&path).with_context(|| format!("Failed to read annotations {}", path))?;
        let raw: Value = serde_json::from_str(&raw).with_context(|| format!("Invalid JSON in {}", path))?;

        let mut drafts = Vec::new();
        for entry in annotation_entries(raw) {
            match AnnotationDraft::from_value(entry) {
                Ok(draft) => drafts.push(draft),
                Err(e) => {
                    tracing::warn!("Skipping annotation: {}", e);
                    rejected += 1;
                }
            }
        }

        let results = join_all(drafts.into_iter().map(|draft| state.store().create(draft))).await;
        for result in results {
            if let Err(e) = result {
                tracing::warn!("Skipping annotation: {}", e);
                rejected += 1;
            }
        }
        tracing::info!("Imported {} annotations from {}", state.store().count(), path);
    }

    let report = Report {
        mode: state.store().persistence_mode().as_str(),
        pdf_id: state.store().pdf_id(),
        pages: surface.page_count(),
        annotations: state.store().count(),
        rejected,
        overlays: state.render_records(),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);

    state.shutdown();
    Ok(())
}
