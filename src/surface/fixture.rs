//! JSON description of a document surface

use serde::{Deserialize, Serialize};

use super::document::{DocumentSurface, PageSpec};

fn default_zoom() -> f64 {
    1.0
}

/// Pages and zoom of a surface, as loaded from disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SurfaceFixture {
    #[serde(default = "default_zoom")]
    pub zoom: f64,
    pub pages: Vec<PageSpec>,
    /// Pages to leave unloaded after building
    #[serde(default)]
    pub unloaded: Vec<u32>,
}

impl SurfaceFixture {
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    pub fn build(&self) -> DocumentSurface {
        let surface = DocumentSurface::new();
        for page in &self.pages {
            surface.add_page(page.clone());
        }
        if (self.zoom - 1.0).abs() > f64::EPSILON {
            surface.set_zoom(self.zoom);
        }
        for page in &self.unloaded {
            surface.unload_page(*page);
        }
        surface
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Rect, TextLayoutProvider};

    #[test]
    fn test_build_from_json() {
        let fixture = SurfaceFixture::from_json(
            r#"{
                "zoom": 2.0,
                "pages": [
                    {"width": 400, "height": 500, "runs": [
                        {"text": "Alpha", "x": 10, "y": 20, "charWidth": 6, "height": 12}
                    ]},
                    {"width": 400, "height": 500}
                ],
                "unloaded": [2]
            }"#,
        )
        .unwrap();
        let surface = fixture.build();

        assert_eq!(surface.page_count(), 2);
        assert_eq!(surface.page_rect(1), Some(Rect::new(0.0, 0.0, 800.0, 1000.0)));
        assert!(!surface.is_page_rendered(2));
        assert_eq!(surface.page_text(1).as_deref(), Some("Alpha"));
    }

    #[test]
    fn test_rejects_missing_pages() {
        assert!(SurfaceFixture::from_json(r#"{"zoom": 1.0}"#).is_err());
    }
}
