//! Text selection capture
//!
//! Turns the user's selection into a single-page payload: the raw text, the
//! owning page, logical character ranges into the page's text layer, a
//! page-relative bounding rectangle and merged line rectangles in percent of
//! the page box. Selections that are empty or span pages are rejected.

mod host;

pub use host::{ActiveSelection, SelectionHost, SelectionPoint};

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::events::{names, EventBus};
use crate::geometry::{
    envelope, measure_ranges, merge_rects, MergeConfig, NodeRef, PercentRect, Rect, TextNode, TextRange,
};

/// Why a selection produced no payload
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SelectionRejected {
    #[error("selection is empty")]
    Empty,

    #[error("selection is not inside a page")]
    OutsidePage,

    #[error("selection spans pages {start} to {end}")]
    CrossPage { start: u32, end: u32 },

    #[error("text layer of page {0} is not rendered")]
    NotRendered(u32),
}

/// Normalized selection, emitted as `selection:completed`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionPayload {
    pub text: String,
    pub page_number: u32,
    pub text_ranges: Vec<TextRange>,
    /// Page-relative pixels
    pub bounding_rect: Rect,
    /// Merged line rectangles, percent of the page box
    pub line_rects: Vec<PercentRect>,
}

pub struct SelectionCapture<H: SelectionHost + ?Sized> {
    host: Arc<H>,
    bus: EventBus,
    merge: MergeConfig,
    settle_delay: Duration,
}

impl<H: SelectionHost + ?Sized> SelectionCapture<H> {
    pub fn new(host: Arc<H>, bus: EventBus, merge: MergeConfig, settle_delay: Duration) -> Self {
        Self {
            host,
            bus,
            merge,
            settle_delay,
        }
    }

    /// Page owning a node, found by walking ancestors for a page marker
    pub fn owning_page(&self, node: NodeRef) -> Option<u32> {
        let mut current = Some(node);
        while let Some(node) = current {
            if let Some(page) = self.host.page_marker(node) {
                return Some(page);
            }
            current = self.host.parent(node);
        }
        None
    }

    /// Read and normalize the active selection
    pub fn capture(&self) -> Result<SelectionPayload, SelectionRejected> {
        let selection = self.host.active_selection().ok_or(SelectionRejected::Empty)?;
        if selection.text.trim().is_empty() {
            return Err(SelectionRejected::Empty);
        }

        let start_page = self
            .owning_page(selection.start.node)
            .ok_or(SelectionRejected::OutsidePage)?;
        let end_page = self
            .owning_page(selection.end.node)
            .ok_or(SelectionRejected::OutsidePage)?;
        if start_page != end_page {
            return Err(SelectionRejected::CrossPage {
                start: start_page,
                end: end_page,
            });
        }
        let page = start_page;

        let nodes = self
            .host
            .text_nodes(page)
            .ok_or(SelectionRejected::NotRendered(page))?;
        let range = resolve_range(&nodes, &selection).unwrap_or_else(|| {
            tracing::debug!("Selection nodes not in text layer of page {}, using text match", page);
            fallback_range(&nodes, &selection.text)
        });

        let (bounding_rect, line_rects) = self.measure(page, range)?;

        Ok(SelectionPayload {
            text: selection.text,
            page_number: page,
            text_ranges: vec![range],
            bounding_rect,
            line_rects,
        })
    }

    fn measure(&self, page: u32, range: TextRange) -> Result<(Rect, Vec<PercentRect>), SelectionRejected> {
        let page_box = self
            .host
            .page_rect(page)
            .ok_or(SelectionRejected::NotRendered(page))?;
        let layer = self
            .host
            .text_layer_rect(page)
            .ok_or(SelectionRejected::NotRendered(page))?;

        // Measured rects are relative to the text layer; shift them onto the page.
        let dx = layer.left - page_box.left;
        let dy = layer.top - page_box.top;
        let rects: Vec<Rect> = measure_ranges(&*self.host, page, &[range])
            .map_err(|_| SelectionRejected::NotRendered(page))?
            .into_iter()
            .filter(|r| !r.is_empty())
            .map(|r| r.translate(dx, dy))
            .collect();

        let merged = merge_rects(&rects, &self.merge);
        let bounding_rect = envelope(&merged).unwrap_or(Rect::new(0.0, 0.0, 0.0, 0.0));
        let line_rects = merged
            .iter()
            .filter_map(|r| PercentRect::from_pixels(r, page_box.width, page_box.height))
            .collect();

        Ok((bounding_rect, line_rects))
    }

    /// Capture and emit `selection:completed` on the local channel
    pub fn capture_and_emit(&self) -> Option<SelectionPayload> {
        match self.capture() {
            Ok(payload) => {
                match serde_json::to_value(&payload) {
                    Ok(value) => self.bus.emit(names::SELECTION_COMPLETED, value),
                    Err(e) => tracing::warn!("Failed to encode selection: {}", e),
                }
                Some(payload)
            }
            Err(e) => {
                tracing::debug!("Ignoring selection: {}", e);
                None
            }
        }
    }

    /// Pointer-release hook: wait for the selection to settle, then capture
    pub async fn on_pointer_release(&self) -> Option<SelectionPayload> {
        if !self.settle_delay.is_zero() {
            tokio::time::sleep(self.settle_delay).await;
        }
        self.capture_and_emit()
    }
}

/// Page-level offsets of the selection endpoints
fn resolve_range(nodes: &[TextNode], selection: &ActiveSelection) -> Option<TextRange> {
    let mut start = None;
    let mut end = None;
    let mut offset = 0;

    for node in nodes {
        let len = node.char_len();
        if node.node == selection.start.node {
            start = Some(offset + selection.start.offset.min(len));
        }
        if node.node == selection.end.node {
            end = Some(offset + selection.end.offset.min(len));
        }
        offset += len;
    }

    match (start, end) {
        (Some(start), Some(end)) if start < end => Some(TextRange::new(start, end)),
        _ => None,
    }
}

/// Locate the selected text in the page text, else cover the whole string
fn fallback_range(nodes: &[TextNode], text: &str) -> TextRange {
    let page_text: String = nodes.iter().map(|n| n.text.as_str()).collect();
    let len = text.chars().count();
    match page_text.find(text) {
        Some(byte_index) => {
            let start = page_text[..byte_index].chars().count();
            TextRange::new(start, start + len)
        }
        None => TextRange::new(0, len),
    }
}
