//! Overlay rendering
//!
//! Converts an annotation's anchor into page-relative pixel rectangles and
//! keeps one overlay container per annotation on the surface.
//!
//! Two input modes are supported. Percent mode multiplies stored percent
//! rectangles by the current page box and is preferred when the annotation
//! carries line rectangles, because it does not depend on the text layer's
//! flow. Range mode walks the page's text nodes, measures every intersecting
//! character span and translates the client rectangles by the text layer
//! origin.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;

use super::layout::{Overlay, OverlayBox, OverlayHandle, OverlayKind, RenderSurface, TextLayoutProvider};
use super::merge::{merge_rects, MergeConfig};
use super::rect::{envelope, PercentRect, Rect, TextRange};
use crate::annotations::{Annotation, AnnotationData};
use crate::error::RenderAnchorError;

/// Measure logical ranges on a page's text layer
///
/// Rectangles are relative to the text layer origin, one or more per
/// intersected text node, unmerged.
pub fn measure_ranges<P>(provider: &P, page: u32, ranges: &[TextRange]) -> Result<Vec<Rect>, RenderAnchorError>
where
    P: TextLayoutProvider + ?Sized,
{
    provider
        .page_rect(page)
        .ok_or(RenderAnchorError::PageNotRendered(page))?;
    let layer = provider
        .text_layer_rect(page)
        .ok_or(RenderAnchorError::TextLayerMissing(page))?;
    let nodes = provider
        .text_nodes(page)
        .ok_or(RenderAnchorError::TextLayerMissing(page))?;

    let mut rects = Vec::new();
    for range in ranges.iter().filter(|r| !r.is_empty()) {
        let mut offset = 0;
        for node in &nodes {
            let node_start = offset;
            let node_end = offset + node.char_len();
            offset = node_end;

            if node_start >= range.end {
                break;
            }
            if let Some((start, end)) = range.intersect(node_start, node_end) {
                let client = provider.span_client_rects(node.node, start - node_start, end - node_start);
                rects.extend(client.iter().map(|r| r.relative_to(&layer)));
            }
        }
    }
    Ok(rects)
}

/// Outline color of screenshot frames
pub const FRAME_COLOR: &str = "#2196f3";
/// Fill color of comment pins
pub const PIN_COLOR: &str = "#ff9800";
/// Edge length of a comment pin in pixels
pub const PIN_SIZE: f64 = 16.0;

/// Visual parameters applied to every overlay
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayStyle {
    /// Fill opacity of highlight boxes
    pub highlight_opacity: f32,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            highlight_opacity: 0.35,
        }
    }
}

/// Live visual representation of one annotation
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderRecord {
    pub annotation_id: String,
    #[serde(skip)]
    pub handle: OverlayHandle,
    pub page_number: u32,
    pub kind: OverlayKind,
    /// Envelope of every drawn box
    pub bounding_box: Rect,
    pub boxes: Vec<Rect>,
    pub color: String,
}

/// Renders annotations onto a surface
pub struct GeometryEngine<S: RenderSurface + ?Sized> {
    surface: Arc<S>,
    merge: MergeConfig,
    style: OverlayStyle,
    records: RwLock<HashMap<String, RenderRecord>>,
}

impl<S: RenderSurface + ?Sized> GeometryEngine<S> {
    pub fn new(surface: Arc<S>, merge: MergeConfig, style: OverlayStyle) -> Self {
        Self {
            surface,
            merge,
            style,
            records: RwLock::new(HashMap::new()),
        }
    }

    pub fn surface(&self) -> &Arc<S> {
        &self.surface
    }

    pub fn merge_config(&self) -> &MergeConfig {
        &self.merge
    }

    // ========================================================================
    // Measurement
    // ========================================================================

    /// Page-relative rectangles covering logical text ranges
    pub fn range_rects(&self, page: u32, ranges: &[TextRange]) -> Result<Vec<Rect>, RenderAnchorError> {
        measure_ranges(&*self.surface, page, ranges)
    }

    /// Page-relative rectangles for percent rectangles at the current page size
    pub fn percent_rects(&self, page: u32, rects: &[PercentRect]) -> Result<Vec<Rect>, RenderAnchorError> {
        let page_box = self
            .surface
            .page_rect(page)
            .ok_or(RenderAnchorError::PageNotRendered(page))?;
        Ok(rects
            .iter()
            .map(|r| r.to_pixels(page_box.width, page_box.height))
            .collect())
    }

    /// Merged line rectangles of a text-anchored annotation
    ///
    /// Percent mode when line rectangles are stored, range mode otherwise.
    pub fn line_rects(&self, annotation: &Annotation) -> Result<Vec<Rect>, RenderAnchorError> {
        let page = annotation.page_number();
        let data = annotation.data();

        let raw = if !data.line_rects().is_empty() {
            self.percent_rects(page, data.line_rects())?
        } else {
            self.range_rects(page, data.text_ranges())?
        };

        let drawable: Vec<Rect> = raw.into_iter().filter(|r| !r.is_empty()).collect();
        Ok(merge_rects(&drawable, &self.merge))
    }

    fn build_overlay(&self, annotation: &Annotation) -> Result<(Overlay, String), RenderAnchorError> {
        let page = annotation.page_number();
        let id = annotation.id().to_string();

        let (kind, color, boxes) = match annotation.data() {
            AnnotationData::TextHighlight(d) => {
                let boxes = self
                    .line_rects(annotation)?
                    .into_iter()
                    .map(|rect| OverlayBox {
                        rect,
                        color: d.color.clone(),
                        opacity: self.style.highlight_opacity,
                    })
                    .collect();
                (OverlayKind::Highlight, d.color.clone(), boxes)
            }
            AnnotationData::Underline(d) => {
                let boxes = self
                    .line_rects(annotation)?
                    .into_iter()
                    .map(|line| OverlayBox {
                        rect: Rect::new(line.left, line.bottom() - d.thickness, line.width, d.thickness),
                        color: d.color.clone(),
                        opacity: 1.0,
                    })
                    .collect();
                (OverlayKind::Underline, d.color.clone(), boxes)
            }
            AnnotationData::Screenshot(d) => {
                let rects = match &d.rect {
                    Some(rect) => self.percent_rects(page, std::slice::from_ref(rect))?,
                    None => Vec::new(),
                };
                let boxes = rects
                    .into_iter()
                    .filter(|r| !r.is_empty())
                    .map(|rect| OverlayBox {
                        rect,
                        color: FRAME_COLOR.to_string(),
                        opacity: 1.0,
                    })
                    .collect();
                (OverlayKind::Frame, FRAME_COLOR.to_string(), boxes)
            }
            AnnotationData::Comment(d) => {
                let page_box = self
                    .surface
                    .page_rect(page)
                    .ok_or(RenderAnchorError::PageNotRendered(page))?;
                let boxes = d
                    .position
                    .map(|p| {
                        let (x, y) = p.to_pixels(page_box.width, page_box.height);
                        vec![OverlayBox {
                            rect: Rect::new(x, y, PIN_SIZE, PIN_SIZE),
                            color: PIN_COLOR.to_string(),
                            opacity: 1.0,
                        }]
                    })
                    .unwrap_or_default();
                (OverlayKind::Pin, PIN_COLOR.to_string(), boxes)
            }
        };

        Ok((
            Overlay {
                annotation_id: id,
                kind,
                boxes,
            },
            color,
        ))
    }

    /// Boxes an annotation would draw with, without touching the surface
    pub fn boxes_for(&self, annotation: &Annotation) -> Result<Vec<Rect>, RenderAnchorError> {
        let (overlay, _) = self.build_overlay(annotation)?;
        Ok(overlay.boxes.iter().map(|b| b.rect).collect())
    }

    // ========================================================================
    // Rendering
    // ========================================================================

    /// Draw an annotation, replacing any existing container for it
    pub fn render(&self, annotation: &Annotation) -> Result<RenderRecord, RenderAnchorError> {
        let (overlay, color) = self.build_overlay(annotation)?;
        if overlay.boxes.is_empty() {
            return Err(RenderAnchorError::NoGeometry(annotation.id().to_string()));
        }

        let boxes: Vec<Rect> = overlay.boxes.iter().map(|b| b.rect).collect();
        let bounding_box = envelope(&boxes)
            .ok_or_else(|| RenderAnchorError::NoGeometry(annotation.id().to_string()))?;
        let kind = overlay.kind;

        self.remove(annotation.id());
        let handle = self.surface.attach(annotation.page_number(), overlay)?;

        let record = RenderRecord {
            annotation_id: annotation.id().to_string(),
            handle,
            page_number: annotation.page_number(),
            kind,
            bounding_box,
            boxes,
            color,
        };
        self.records
            .write()
            .insert(record.annotation_id.clone(), record.clone());
        Ok(record)
    }

    /// Render unless a live container already exists
    ///
    /// Returns `Ok(true)` when a container was drawn, `Ok(false)` when the
    /// existing one is still attached to the right page.
    pub fn ensure_rendered_for(&self, annotation: &Annotation) -> Result<bool, RenderAnchorError> {
        let existing = self.records.read().get(annotation.id()).cloned();
        if let Some(record) = existing {
            if record.page_number == annotation.page_number() && self.surface.is_attached(record.handle) {
                return Ok(false);
            }
            // Stale: the page was re-rendered or the annotation moved.
            self.forget(annotation.id());
        }
        self.render(annotation).map(|_| true)
    }

    /// Ensure every annotation is drawn; returns how many were (re)drawn
    ///
    /// Annotations whose page is not on the surface are skipped.
    pub fn ensure_all<'a, I>(&self, annotations: I) -> usize
    where
        I: IntoIterator<Item = &'a Annotation>,
    {
        let mut drawn = 0;
        for annotation in annotations {
            match self.ensure_rendered_for(annotation) {
                Ok(true) => drawn += 1,
                Ok(false) => {}
                Err(e) => tracing::debug!("Skipping render of {}: {}", annotation.id(), e),
            }
        }
        drawn
    }

    /// Recolor an existing container without recomputing geometry
    pub fn update_color(&self, id: &str, color: &str) -> bool {
        let mut records = self.records.write();
        match records.get_mut(id) {
            Some(record) if self.surface.restyle(record.handle, color) => {
                record.color = color.to_string();
                true
            }
            _ => false,
        }
    }

    /// Detach an annotation's container and forget it
    pub fn remove(&self, id: &str) -> bool {
        match self.forget(id) {
            Some(record) => self.surface.detach(record.handle),
            None => false,
        }
    }

    fn forget(&self, id: &str) -> Option<RenderRecord> {
        self.records.write().remove(id)
    }

    /// Detach every container
    pub fn clear(&self) {
        let records: Vec<RenderRecord> = self.records.write().drain().map(|(_, r)| r).collect();
        for record in records {
            self.surface.detach(record.handle);
        }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn record(&self, id: &str) -> Option<RenderRecord> {
        self.records.read().get(id).cloned()
    }

    /// Envelope of an annotation's drawn boxes, for anchoring menus
    pub fn bounding_box(&self, id: &str) -> Option<Rect> {
        self.records.read().get(id).map(|r| r.bounding_box)
    }

    pub fn is_rendered(&self, id: &str) -> bool {
        self.records
            .read()
            .get(id)
            .map(|r| self.surface.is_attached(r.handle))
            .unwrap_or(false)
    }

    /// Records ordered by page then position
    pub fn records(&self) -> Vec<RenderRecord> {
        let mut records: Vec<RenderRecord> = self.records.read().values().cloned().collect();
        records.sort_by(|a, b| {
            a.page_number
                .cmp(&b.page_number)
                .then(a.bounding_box.top.total_cmp(&b.bounding_box.top))
                .then(a.bounding_box.left.total_cmp(&b.bounding_box.left))
                .then_with(|| a.annotation_id.cmp(&b.annotation_id))
        });
        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotations::{AnnotationDraft, CommentData, HighlightData, ScreenshotData, UnderlineData};
    use crate::geometry::PercentPoint;
    use crate::surface::{DocumentSurface, PageSpec, TextRun};

    fn surface() -> Arc<DocumentSurface> {
        let surface = DocumentSurface::new();
        surface.add_page(PageSpec::new(800.0, 1000.0).with_runs(vec![TextRun::new(
            "Hello world",
            100.0,
            200.0,
            10.0,
            20.0,
        )]));
        surface.add_page(
            PageSpec::new(800.0, 1000.0).with_runs(vec![
                TextRun::new("The quick ", 50.0, 100.0, 10.0, 20.0),
                TextRun::new("brown fox", 150.0, 100.0, 10.0, 20.0),
                TextRun::new("jumps over", 50.0, 140.0, 10.0, 20.0),
            ]),
        );
        Arc::new(surface)
    }

    fn engine(surface: Arc<DocumentSurface>) -> GeometryEngine<DocumentSurface> {
        GeometryEngine::new(surface, MergeConfig::default(), OverlayStyle::default())
    }

    fn highlight(page: u32, ranges: Vec<TextRange>, line_rects: Vec<PercentRect>) -> Annotation {
        Annotation::new(AnnotationDraft::new(
            page,
            AnnotationData::TextHighlight(HighlightData {
                selected_text: "text".to_string(),
                text_ranges: ranges,
                color: "#ffeb3b".to_string(),
                line_rects,
            }),
        ))
        .unwrap()
    }

    #[test]
    fn test_percent_mode_two_lines() {
        let surface = surface();
        let engine = engine(surface.clone());
        let annotation = highlight(
            2,
            vec![TextRange::new(0, 10)],
            vec![
                PercentRect::new(50.0, 10.0, 40.0, 5.0),
                PercentRect::new(10.0, 16.0, 60.0, 5.0),
            ],
        );

        let record = engine.render(&annotation).unwrap();

        assert_eq!(record.kind, OverlayKind::Highlight);
        assert_eq!(
            record.boxes,
            vec![
                Rect::new(400.0, 100.0, 320.0, 50.0),
                Rect::new(80.0, 160.0, 480.0, 50.0),
            ]
        );
        assert_eq!(record.bounding_box, Rect::from_ltrb(80.0, 100.0, 720.0, 210.0));
        assert_eq!(surface.overlays_on(2).len(), 1);
    }

    #[test]
    fn test_range_mode_merges_runs_on_a_line() {
        let surface = surface();
        let engine = engine(surface.clone());

        // "quick brown" spans the first two runs of one line
        let rects = engine.range_rects(2, &[TextRange::new(4, 15)]).unwrap();
        assert_eq!(rects.len(), 2);

        let annotation = highlight(2, vec![TextRange::new(4, 15)], vec![]);
        let merged = engine.line_rects(&annotation).unwrap();
        assert_eq!(merged, vec![Rect::from_ltrb(90.0, 100.0, 200.0, 120.0)]);
    }

    #[test]
    fn test_range_mode_across_lines() {
        let engine = engine(surface());
        let annotation = highlight(2, vec![TextRange::new(16, 25)], vec![]);

        let merged = engine.line_rects(&annotation).unwrap();

        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0], Rect::from_ltrb(210.0, 100.0, 240.0, 120.0));
        assert_eq!(merged[1], Rect::from_ltrb(50.0, 140.0, 110.0, 160.0));
    }

    #[test]
    fn test_update_color_keeps_geometry() {
        let surface = surface();
        let engine = engine(surface.clone());
        let annotation = highlight(2, vec![TextRange::new(0, 3)], vec![PercentRect::new(10.0, 10.0, 10.0, 2.0)]);
        let before = engine.render(&annotation).unwrap();

        assert!(engine.update_color(annotation.id(), "#4caf50"));

        let after = engine.record(annotation.id()).unwrap();
        assert_eq!(after.boxes, before.boxes);
        assert_eq!(after.color, "#4caf50");
        let overlay = surface.overlay(after.handle).unwrap();
        assert!(overlay.boxes.iter().all(|b| b.color == "#4caf50"));
        assert!(!engine.update_color("unknown", "#4caf50"));
    }

    #[test]
    fn test_remove_detaches_only_its_container() {
        let surface = surface();
        let engine = engine(surface.clone());
        let first = highlight(2, vec![TextRange::new(0, 3)], vec![]);
        let second = highlight(2, vec![TextRange::new(10, 15)], vec![]);
        engine.render(&first).unwrap();
        let kept = engine.render(&second).unwrap();

        assert!(engine.remove(first.id()));
        assert!(!engine.remove(first.id()));

        let remaining = surface.overlays_on(2);
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].annotation_id, second.id());
        assert!(engine.is_rendered(second.id()));
        assert_eq!(engine.record(second.id()).unwrap(), kept);
    }

    #[test]
    fn test_ensure_rendered_is_idempotent_and_recovers() {
        let surface = surface();
        let engine = engine(surface.clone());
        let annotation = highlight(2, vec![TextRange::new(0, 3)], vec![]);

        assert!(engine.ensure_rendered_for(&annotation).unwrap());
        assert!(!engine.ensure_rendered_for(&annotation).unwrap());
        assert_eq!(surface.overlays_on(2).len(), 1);

        surface.rerender_page(2);
        assert!(!engine.is_rendered(annotation.id()));
        assert!(engine.ensure_rendered_for(&annotation).unwrap());
        assert_eq!(surface.overlays_on(2).len(), 1);
    }

    #[test]
    fn test_unloaded_page_is_a_render_anchor_error() {
        let surface = surface();
        let engine = engine(surface.clone());
        let annotation = highlight(2, vec![TextRange::new(0, 3)], vec![]);

        surface.unload_page(2);
        let err = engine.ensure_rendered_for(&annotation).unwrap_err();
        assert_eq!(err, RenderAnchorError::PageNotRendered(2));
        assert_eq!(engine.ensure_all([&annotation]), 0);

        surface.load_page(2);
        assert_eq!(engine.ensure_all([&annotation]), 1);
    }

    #[test]
    fn test_percent_mode_follows_zoom() {
        let surface = surface();
        let engine = engine(surface.clone());
        let annotation = highlight(2, vec![TextRange::new(0, 3)], vec![PercentRect::new(50.0, 10.0, 40.0, 5.0)]);
        engine.render(&annotation).unwrap();

        surface.set_zoom(2.0);
        engine.ensure_rendered_for(&annotation).unwrap();

        let record = engine.record(annotation.id()).unwrap();
        assert_eq!(record.boxes, vec![Rect::new(800.0, 200.0, 640.0, 100.0)]);
    }

    #[test]
    fn test_other_overlay_kinds() {
        let engine = engine(surface());

        let underline = Annotation::new(AnnotationDraft::new(
            1,
            AnnotationData::Underline(UnderlineData {
                selected_text: "Hello".to_string(),
                text_ranges: vec![TextRange::new(0, 5)],
                color: "#2196f3".to_string(),
                line_rects: vec![],
                thickness: 2.0,
            }),
        ))
        .unwrap();
        let record = engine.render(&underline).unwrap();
        assert_eq!(record.kind, OverlayKind::Underline);
        assert_eq!(record.boxes, vec![Rect::new(100.0, 218.0, 50.0, 2.0)]);

        let screenshot = Annotation::new(AnnotationDraft::new(
            1,
            AnnotationData::Screenshot(ScreenshotData {
                rect: Some(PercentRect::new(10.0, 10.0, 50.0, 20.0)),
                image_data: Some("img-1".to_string()),
                caption: None,
            }),
        ))
        .unwrap();
        let record = engine.render(&screenshot).unwrap();
        assert_eq!(record.kind, OverlayKind::Frame);
        assert_eq!(record.bounding_box, Rect::new(80.0, 100.0, 400.0, 200.0));

        let comment = Annotation::new(AnnotationDraft::new(
            1,
            AnnotationData::Comment(CommentData {
                position: Some(PercentPoint::new(50.0, 50.0)),
                content: "pin".to_string(),
            }),
        ))
        .unwrap();
        let record = engine.render(&comment).unwrap();
        assert_eq!(record.kind, OverlayKind::Pin);
        assert_eq!(record.bounding_box, Rect::new(400.0, 500.0, PIN_SIZE, PIN_SIZE));
    }
}
