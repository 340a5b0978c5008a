//! In-memory paginated document surface
//!
//! Pages are laid out top to bottom with a fixed gap. Each rendered page is
//! an element tagged `data-page-number` holding a `textLayer` of text-run
//! spans and a `highlightLayer` for overlay containers. Re-rendering a page
//! (zoom, virtualization) rebuilds its subtree, which destroys every overlay
//! attached to it, then announces `page:rendered` on the global channel.

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::dom::Dom;
use crate::error::RenderAnchorError;
use crate::events::{names, EventBus};
use crate::geometry::{
    NodeRef, Overlay, OverlayHandle, OverlayLayer, Rect, TextLayoutProvider, TextNode,
};
use crate::selection::{ActiveSelection, SelectionHost, SelectionPoint};

/// Vertical gap between pages, in pixels
pub const PAGE_GAP: f64 = 16.0;

/// A run of text drawn on one line, in unscaled page coordinates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextRun {
    pub text: String,
    pub x: f64,
    pub y: f64,
    /// Advance of every character when `char_widths` is absent
    pub char_width: f64,
    pub height: f64,
    /// Per-character advances
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub char_widths: Option<Vec<f64>>,
}

impl TextRun {
    pub fn new(text: &str, x: f64, y: f64, char_width: f64, height: f64) -> Self {
        Self {
            text: text.to_string(),
            x,
            y,
            char_width,
            height,
            char_widths: None,
        }
    }

    pub fn with_char_widths(mut self, widths: Vec<f64>) -> Self {
        self.char_widths = Some(widths);
        self
    }

    fn advance(&self, index: usize) -> f64 {
        self.char_widths
            .as_ref()
            .and_then(|w| w.get(index).copied())
            .unwrap_or(self.char_width)
    }

    /// Horizontal offset and width of characters `[start, end)`
    fn span(&self, start: usize, end: usize) -> (f64, f64) {
        let offset: f64 = (0..start).map(|i| self.advance(i)).sum();
        let width: f64 = (start..end).map(|i| self.advance(i)).sum();
        (offset, width)
    }
}

/// Size and content of one page at zoom 1
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageSpec {
    pub width: f64,
    pub height: f64,
    #[serde(default)]
    pub runs: Vec<TextRun>,
}

impl PageSpec {
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            width,
            height,
            runs: Vec::new(),
        }
    }

    pub fn with_runs(mut self, runs: Vec<TextRun>) -> Self {
        self.runs = runs;
        self
    }

    pub fn text(&self) -> String {
        self.runs.iter().map(|r| r.text.as_str()).collect()
    }
}

struct RenderedPage {
    element: NodeRef,
    highlight_layer: NodeRef,
    text_nodes: Vec<NodeRef>,
}

struct PageSlot {
    spec: PageSpec,
    rendered: Option<RenderedPage>,
}

struct AttachedOverlay {
    page: u32,
    container: NodeRef,
    overlay: Overlay,
}

struct SurfaceState {
    dom: Dom,
    root: NodeRef,
    pages: Vec<PageSlot>,
    zoom: f64,
    overlays: HashMap<OverlayHandle, AttachedOverlay>,
    next_handle: u64,
    /// Text node -> (page number, run index)
    text_index: HashMap<NodeRef, (u32, usize)>,
    selection: Option<ActiveSelection>,
}

impl SurfaceState {
    fn slot(&self, page: u32) -> Option<&PageSlot> {
        page.checked_sub(1).and_then(|i| self.pages.get(i as usize))
    }

    fn rendered(&self, page: u32) -> Option<&RenderedPage> {
        self.slot(page)?.rendered.as_ref()
    }

    fn page_rect(&self, page: u32) -> Option<Rect> {
        self.rendered(page)?;
        let index = (page - 1) as usize;
        let top: f64 = self.pages[..index]
            .iter()
            .map(|p| p.spec.height * self.zoom + PAGE_GAP)
            .sum();
        let spec = &self.pages[index].spec;
        Some(Rect::new(0.0, top, spec.width * self.zoom, spec.height * self.zoom))
    }

    fn render_page(&mut self, page: u32) -> bool {
        if self.slot(page).is_none() {
            return false;
        }
        self.destroy_page(page);

        let index = (page - 1) as usize;
        let spec = self.pages[index].spec.clone();
        let zoom = self.zoom;
        let dom = &mut self.dom;

        let element = dom.create_element("div", Some(self.root));
        dom.set_attribute(element, "class", "page");
        dom.set_attribute(element, "data-page-number", &page.to_string());

        let text_layer = dom.create_element("div", Some(element));
        dom.set_attribute(text_layer, "class", "textLayer");

        let mut text_nodes = Vec::with_capacity(spec.runs.len());
        for (i, run) in spec.runs.iter().enumerate() {
            let span = dom.create_element("span", Some(text_layer));
            dom.set_attribute(
                span,
                "style",
                &format!("left:{}px;top:{}px;font-size:{}px", run.x * zoom, run.y * zoom, run.height * zoom),
            );
            let text = dom.create_text(&run.text, span);
            self.text_index.insert(text, (page, i));
            text_nodes.push(text);
        }

        let highlight_layer = dom.create_element("div", Some(element));
        dom.set_attribute(highlight_layer, "class", "highlightLayer");

        self.pages[index].rendered = Some(RenderedPage {
            element,
            highlight_layer,
            text_nodes,
        });
        true
    }

    fn destroy_page(&mut self, page: u32) -> bool {
        let index = match page.checked_sub(1) {
            Some(i) if (i as usize) < self.pages.len() => i as usize,
            _ => return false,
        };
        let rendered = match self.pages[index].rendered.take() {
            Some(rendered) => rendered,
            None => return false,
        };

        for node in &rendered.text_nodes {
            self.text_index.remove(node);
        }
        self.dom.remove(rendered.element);
        self.overlays.retain(|_, o| o.page != page);

        let stale = self
            .selection
            .as_ref()
            .map(|s| !self.dom.contains(s.start.node) || !self.dom.contains(s.end.node))
            .unwrap_or(false);
        if stale {
            self.selection = None;
        }
        true
    }

    /// Every rendered text node in document order
    fn document_text_nodes(&self) -> Vec<NodeRef> {
        self.pages
            .iter()
            .filter_map(|p| p.rendered.as_ref())
            .flat_map(|r| r.text_nodes.iter().copied())
            .collect()
    }
}

/// Paginated in-memory surface
pub struct DocumentSurface {
    state: RwLock<SurfaceState>,
    bus: RwLock<Option<EventBus>>,
}

impl DocumentSurface {
    pub fn new() -> Self {
        let mut dom = Dom::new();
        let root = dom.create_element("div", None);
        dom.set_attribute(root, "class", "document");

        Self {
            state: RwLock::new(SurfaceState {
                dom,
                root,
                pages: Vec::new(),
                zoom: 1.0,
                overlays: HashMap::new(),
                next_handle: 0,
                text_index: HashMap::new(),
                selection: None,
            }),
            bus: RwLock::new(None),
        }
    }

    /// Announce page renders on this bus from now on
    pub fn connect_bus(&self, bus: EventBus) {
        *self.bus.write() = Some(bus);
    }

    fn announce(&self, pages: &[u32]) {
        let bus = self.bus.read().clone();
        if let Some(bus) = bus {
            for page in pages {
                bus.emit_global(names::PAGE_RENDERED, json!({ "pageNumber": page }));
            }
        }
    }

    /// Append and render a page; returns its number
    pub fn add_page(&self, spec: PageSpec) -> u32 {
        let page = {
            let mut state = self.state.write();
            state.pages.push(PageSlot { spec, rendered: None });
            let page = state.pages.len() as u32;
            state.render_page(page);
            page
        };
        self.announce(&[page]);
        page
    }

    pub fn page_count(&self) -> u32 {
        self.state.read().pages.len() as u32
    }

    pub fn zoom(&self) -> f64 {
        self.state.read().zoom
    }

    /// Change the zoom factor and re-render every loaded page
    pub fn set_zoom(&self, zoom: f64) {
        let rendered: Vec<u32> = {
            let mut state = self.state.write();
            state.zoom = zoom;
            let loaded: Vec<u32> = (1..=state.pages.len() as u32)
                .filter(|p| state.rendered(*p).is_some())
                .collect();
            for page in &loaded {
                state.render_page(*page);
            }
            loaded
        };
        tracing::debug!("Zoom set to {}, re-rendered {} pages", zoom, rendered.len());
        self.announce(&rendered);
    }

    /// Rebuild a loaded page, destroying its overlays
    pub fn rerender_page(&self, page: u32) -> bool {
        let done = {
            let mut state = self.state.write();
            state.rendered(page).is_some() && state.render_page(page)
        };
        if done {
            self.announce(&[page]);
        }
        done
    }

    /// Drop a page's subtree, as a virtualized viewer does off screen
    pub fn unload_page(&self, page: u32) -> bool {
        self.state.write().destroy_page(page)
    }

    /// Render a page that was unloaded
    pub fn load_page(&self, page: u32) -> bool {
        let done = {
            let mut state = self.state.write();
            state.rendered(page).is_none() && state.render_page(page)
        };
        if done {
            self.announce(&[page]);
        }
        done
    }

    pub fn is_page_rendered(&self, page: u32) -> bool {
        self.state.read().rendered(page).is_some()
    }

    pub fn page_text(&self, page: u32) -> Option<String> {
        self.state.read().slot(page).map(|s| s.spec.text())
    }

    pub fn page_element(&self, page: u32) -> Option<NodeRef> {
        self.state.read().rendered(page).map(|r| r.element)
    }

    /// Text node of a run on a rendered page
    pub fn text_node(&self, page: u32, run: usize) -> Option<NodeRef> {
        self.state
            .read()
            .rendered(page)
            .and_then(|r| r.text_nodes.get(run).copied())
    }

    // ========================================================================
    // Selection
    // ========================================================================

    /// Select characters `[start, end)` of a page's text
    pub fn select_text(&self, page: u32, start: usize, end: usize) -> bool {
        let points = {
            let state = self.state.read();
            let rendered = match state.rendered(page) {
                Some(rendered) => rendered,
                None => return false,
            };
            let locate = |target: usize, prefer_next: bool| -> Option<SelectionPoint> {
                let mut offset = 0;
                for node in &rendered.text_nodes {
                    let len = state.dom.text(*node).map(|t| t.chars().count()).unwrap_or(0);
                    let inside = if prefer_next {
                        target < offset + len
                    } else {
                        target <= offset + len
                    };
                    if inside {
                        return Some(SelectionPoint::new(*node, target - offset));
                    }
                    offset += len;
                }
                None
            };
            locate(start, true).zip(locate(end, false))
        };

        match points {
            Some((start, end)) if start != end => self.select_between(start, end),
            _ => false,
        }
    }

    /// Select from one caret position to another, across pages if needed
    pub fn select_between(&self, a: SelectionPoint, b: SelectionPoint) -> bool {
        let mut state = self.state.write();
        let order = state.document_text_nodes();
        let position = |p: &SelectionPoint| order.iter().position(|n| *n == p.node);
        let (start, end) = match (position(&a), position(&b)) {
            (Some(ia), Some(ib)) if (ia, a.offset) <= (ib, b.offset) => (a, b),
            (Some(_), Some(_)) => (b, a),
            _ => return false,
        };

        let mut text = String::new();
        let mut within = false;
        for node in &order {
            let content = state.dom.text(*node).unwrap_or_default();
            let from = if *node == start.node {
                within = true;
                start.offset
            } else {
                0
            };
            if !within {
                continue;
            }
            if *node == end.node {
                text.extend(content.chars().skip(from).take(end.offset.saturating_sub(from)));
                break;
            }
            text.extend(content.chars().skip(from));
        }

        state.selection = Some(ActiveSelection { text, start, end });
        true
    }

    /// Replace the selection as-is, bypassing text resolution
    pub fn set_selection(&self, selection: Option<ActiveSelection>) {
        self.state.write().selection = selection;
    }

    // ========================================================================
    // Overlay inspection
    // ========================================================================

    /// Overlays attached to a page, in attach order
    pub fn overlays_on(&self, page: u32) -> Vec<Overlay> {
        let state = self.state.read();
        let mut attached: Vec<(&OverlayHandle, &AttachedOverlay)> =
            state.overlays.iter().filter(|(_, o)| o.page == page).collect();
        attached.sort_by_key(|(h, _)| h.0);
        attached.into_iter().map(|(_, o)| o.overlay.clone()).collect()
    }

    pub fn overlay(&self, handle: OverlayHandle) -> Option<Overlay> {
        self.state.read().overlays.get(&handle).map(|o| o.overlay.clone())
    }

    pub fn overlay_count(&self) -> usize {
        self.state.read().overlays.len()
    }
}

impl Default for DocumentSurface {
    fn default() -> Self {
        Self::new()
    }
}

impl TextLayoutProvider for DocumentSurface {
    fn page_rect(&self, page: u32) -> Option<Rect> {
        self.state.read().page_rect(page)
    }

    fn text_layer_rect(&self, page: u32) -> Option<Rect> {
        // The text layer covers the page box exactly.
        self.state.read().page_rect(page)
    }

    fn text_nodes(&self, page: u32) -> Option<Vec<TextNode>> {
        let state = self.state.read();
        let rendered = state.rendered(page)?;
        Some(
            rendered
                .text_nodes
                .iter()
                .map(|node| TextNode {
                    node: *node,
                    text: state.dom.text(*node).unwrap_or_default().to_string(),
                })
                .collect(),
        )
    }

    fn span_client_rects(&self, node: NodeRef, start: usize, end: usize) -> Vec<Rect> {
        let state = self.state.read();
        let (page, run_index) = match state.text_index.get(&node) {
            Some(entry) => *entry,
            None => return Vec::new(),
        };
        let (page_box, run) = match (state.page_rect(page), state.slot(page)) {
            (Some(page_box), Some(slot)) => match slot.spec.runs.get(run_index) {
                Some(run) => (page_box, run),
                None => return Vec::new(),
            },
            _ => return Vec::new(),
        };

        let end = end.min(run.text.chars().count());
        if start >= end {
            return Vec::new();
        }
        let (offset, width) = run.span(start, end);
        let zoom = state.zoom;
        vec![Rect::new(
            page_box.left + (run.x + offset) * zoom,
            page_box.top + run.y * zoom,
            width * zoom,
            run.height * zoom,
        )]
    }
}

impl OverlayLayer for DocumentSurface {
    fn attach(&self, page: u32, overlay: Overlay) -> Result<OverlayHandle, RenderAnchorError> {
        let mut state = self.state.write();
        let layer = state
            .rendered(page)
            .map(|r| r.highlight_layer)
            .ok_or(RenderAnchorError::PageNotRendered(page))?;

        let dom = &mut state.dom;
        let container = dom.create_element("div", Some(layer));
        dom.set_attribute(container, "class", "annotation-overlay");
        dom.set_attribute(container, "data-annotation-id", &overlay.annotation_id);
        for b in &overlay.boxes {
            let child = dom.create_element("div", Some(container));
            dom.set_attribute(
                child,
                "style",
                &format!(
                    "left:{}px;top:{}px;width:{}px;height:{}px;opacity:{}",
                    b.rect.left, b.rect.top, b.rect.width, b.rect.height, b.opacity
                ),
            );
            dom.set_attribute(child, "data-color", &b.color);
        }

        state.next_handle += 1;
        let handle = OverlayHandle(state.next_handle);
        state.overlays.insert(
            handle,
            AttachedOverlay {
                page,
                container,
                overlay,
            },
        );
        Ok(handle)
    }

    fn detach(&self, handle: OverlayHandle) -> bool {
        let mut state = self.state.write();
        match state.overlays.remove(&handle) {
            Some(attached) => {
                state.dom.remove(attached.container);
                true
            }
            None => false,
        }
    }

    fn restyle(&self, handle: OverlayHandle, color: &str) -> bool {
        let mut state = self.state.write();
        let state = &mut *state;
        let attached = match state.overlays.get_mut(&handle) {
            Some(attached) => attached,
            None => return false,
        };
        for b in &mut attached.overlay.boxes {
            b.color = color.to_string();
        }
        let children = state.dom.children(attached.container).to_vec();
        for child in children {
            state.dom.set_attribute(child, "data-color", color);
        }
        true
    }

    fn is_attached(&self, handle: OverlayHandle) -> bool {
        let state = self.state.read();
        state
            .overlays
            .get(&handle)
            .map(|o| state.dom.contains(o.container))
            .unwrap_or(false)
    }
}

impl SelectionHost for DocumentSurface {
    fn active_selection(&self) -> Option<ActiveSelection> {
        self.state.read().selection.clone()
    }

    fn clear_selection(&self) {
        self.state.write().selection = None;
    }

    fn parent(&self, node: NodeRef) -> Option<NodeRef> {
        self.state.read().dom.parent(node)
    }

    fn page_marker(&self, node: NodeRef) -> Option<u32> {
        self.state
            .read()
            .dom
            .attribute(node, "data-page-number")
            .and_then(|v| v.parse().ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{OverlayBox, OverlayKind};
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn two_pages() -> DocumentSurface {
        let surface = DocumentSurface::new();
        surface.add_page(PageSpec::new(600.0, 800.0).with_runs(vec![
            TextRun::new("Hello ", 10.0, 10.0, 8.0, 16.0),
            TextRun::new("world", 58.0, 10.0, 8.0, 16.0),
        ]));
        surface.add_page(PageSpec::new(600.0, 800.0).with_runs(vec![TextRun::new(
            "Second page",
            10.0,
            10.0,
            8.0,
            16.0,
        )]));
        surface
    }

    fn overlay(id: &str) -> Overlay {
        Overlay {
            annotation_id: id.to_string(),
            kind: OverlayKind::Highlight,
            boxes: vec![OverlayBox {
                rect: Rect::new(1.0, 1.0, 10.0, 10.0),
                color: "#ffeb3b".to_string(),
                opacity: 0.35,
            }],
        }
    }

    #[test]
    fn test_page_layout() {
        let surface = two_pages();

        assert_eq!(surface.page_rect(1), Some(Rect::new(0.0, 0.0, 600.0, 800.0)));
        assert_eq!(surface.page_rect(2), Some(Rect::new(0.0, 816.0, 600.0, 800.0)));
        assert_eq!(surface.page_rect(3), None);

        surface.set_zoom(1.5);
        assert_eq!(surface.page_rect(2), Some(Rect::new(0.0, 1216.0, 900.0, 1200.0)));
    }

    #[test]
    fn test_span_rects_in_client_space() {
        let surface = two_pages();
        let node = surface.text_node(2, 0).unwrap();

        assert_eq!(
            surface.span_client_rects(node, 7, 11),
            vec![Rect::new(66.0, 826.0, 32.0, 16.0)]
        );
        assert!(surface.span_client_rects(node, 11, 20).is_empty());
    }

    #[test]
    fn test_variable_char_widths() {
        let surface = DocumentSurface::new();
        surface.add_page(PageSpec::new(100.0, 100.0).with_runs(vec![
            TextRun::new("iwi", 0.0, 0.0, 5.0, 10.0).with_char_widths(vec![2.0, 9.0, 2.0]),
        ]));
        let node = surface.text_node(1, 0).unwrap();

        assert_eq!(surface.span_client_rects(node, 1, 3), vec![Rect::new(2.0, 0.0, 11.0, 10.0)]);
    }

    #[test]
    fn test_rerender_destroys_overlays() {
        let surface = two_pages();
        let a = surface.attach(1, overlay("a")).unwrap();
        let b = surface.attach(2, overlay("b")).unwrap();

        assert!(surface.rerender_page(1));

        assert!(!surface.is_attached(a));
        assert!(surface.is_attached(b));
        assert!(surface.overlays_on(1).is_empty());
    }

    #[test]
    fn test_attach_to_unloaded_page_fails() {
        let surface = two_pages();
        surface.unload_page(2);

        assert_eq!(
            surface.attach(2, overlay("a")).unwrap_err(),
            RenderAnchorError::PageNotRendered(2)
        );
        assert!(surface.text_nodes(2).is_none());
        assert!(surface.load_page(2));
        assert!(surface.attach(2, overlay("a")).is_ok());
    }

    #[test]
    fn test_restyle_and_detach() {
        let surface = two_pages();
        let handle = surface.attach(1, overlay("a")).unwrap();

        assert!(surface.restyle(handle, "#4caf50"));
        assert_eq!(surface.overlay(handle).unwrap().boxes[0].color, "#4caf50");

        assert!(surface.detach(handle));
        assert!(!surface.detach(handle));
        assert!(!surface.restyle(handle, "#4caf50"));
        assert_eq!(surface.overlay_count(), 0);
    }

    #[test]
    fn test_select_text_resolves_nodes() {
        let surface = two_pages();

        assert!(surface.select_text(1, 3, 9));
        let selection = surface.active_selection().unwrap();
        assert_eq!(selection.text, "lo wor");
        assert_eq!(selection.start, SelectionPoint::new(surface.text_node(1, 0).unwrap(), 3));
        assert_eq!(selection.end, SelectionPoint::new(surface.text_node(1, 1).unwrap(), 3));

        let page = surface.page_element(1).unwrap();
        let span = surface.parent(selection.start.node).unwrap();
        let layer = surface.parent(span).unwrap();
        assert_eq!(surface.parent(layer), Some(page));
        assert_eq!(surface.page_marker(page), Some(1));
        assert_eq!(surface.page_marker(layer), None);
    }

    #[test]
    fn test_select_across_pages() {
        let surface = two_pages();
        let end = SelectionPoint::new(surface.text_node(2, 0).unwrap(), 6);
        let start = SelectionPoint::new(surface.text_node(1, 1).unwrap(), 0);

        assert!(surface.select_between(end, start));
        assert_eq!(surface.active_selection().unwrap().text, "worldSecond");

        surface.unload_page(2);
        assert!(surface.active_selection().is_none());
    }

    #[test]
    fn test_page_rendered_events() {
        let surface = two_pages();
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        bus.on_global(names::PAGE_RENDERED, move |e| {
            s.lock().push(e.payload["pageNumber"].as_u64().unwrap_or(0))
        });
        surface.connect_bus(bus);

        surface.set_zoom(2.0);
        surface.unload_page(1);
        surface.load_page(1);

        assert_eq!(*seen.lock(), vec![1, 2, 1]);
    }
}
