//! Type-specific annotation payloads
//!
//! Each annotation type carries its own data shape. Shapes are validated when
//! an annotation is constructed and again on every update; a payload that
//! fails validation never reaches the store or the network.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ValidationError;
use crate::geometry::{PercentPoint, PercentRect, TextRange};

/// Types of annotations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AnnotationType {
    /// Captured page region with an image reference
    Screenshot,
    /// Translucent text highlight
    TextHighlight,
    /// Text underline
    Underline,
    /// Free-form comment pinned to a page position
    Comment,
}

impl AnnotationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnnotationType::Screenshot => "screenshot",
            AnnotationType::TextHighlight => "text-highlight",
            AnnotationType::Underline => "underline",
            AnnotationType::Comment => "comment",
        }
    }

    /// Whether annotations of this type are anchored to text
    pub fn is_text_anchored(&self) -> bool {
        matches!(self, AnnotationType::TextHighlight | AnnotationType::Underline)
    }
}

impl fmt::Display for AnnotationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnnotationType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "screenshot" => Ok(AnnotationType::Screenshot),
            "text-highlight" => Ok(AnnotationType::TextHighlight),
            "underline" => Ok(AnnotationType::Underline),
            "comment" => Ok(AnnotationType::Comment),
            other => Err(ValidationError::UnknownType(other.to_string())),
        }
    }
}

/// Screenshot payload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScreenshotData {
    /// Captured region
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rect: Option<PercentRect>,
    /// Image reference (data URL or storage key)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_data: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
}

/// Text highlight payload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HighlightData {
    pub selected_text: String,
    pub text_ranges: Vec<TextRange>,
    pub color: String,
    /// Line rectangles for zoom-resilient replay
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub line_rects: Vec<PercentRect>,
}

/// Underline payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UnderlineData {
    pub selected_text: String,
    pub text_ranges: Vec<TextRange>,
    pub color: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub line_rects: Vec<PercentRect>,
    /// Bar thickness in pixels
    pub thickness: f64,
}

impl Default for UnderlineData {
    fn default() -> Self {
        Self {
            selected_text: String::new(),
            text_ranges: Vec::new(),
            color: String::new(),
            line_rects: Vec::new(),
            thickness: 2.0,
        }
    }
}

/// Comment payload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CommentData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<PercentPoint>,
    pub content: String,
}

/// Type-specific annotation data
#[derive(Debug, Clone, PartialEq)]
pub enum AnnotationData {
    Screenshot(ScreenshotData),
    TextHighlight(HighlightData),
    Underline(UnderlineData),
    Comment(CommentData),
}

impl AnnotationData {
    pub fn annotation_type(&self) -> AnnotationType {
        match self {
            AnnotationData::Screenshot(_) => AnnotationType::Screenshot,
            AnnotationData::TextHighlight(_) => AnnotationType::TextHighlight,
            AnnotationData::Underline(_) => AnnotationType::Underline,
            AnnotationData::Comment(_) => AnnotationType::Comment,
        }
    }

    /// Decode a JSON payload for the given type and validate it
    pub fn from_value(annotation_type: AnnotationType, value: Value) -> Result<Self, ValidationError> {
        let malformed = |e: serde_json::Error| ValidationError::Malformed(e.to_string());
        let value = if value.is_null() {
            Value::Object(Default::default())
        } else {
            value
        };

        let data = match annotation_type {
            AnnotationType::Screenshot => {
                AnnotationData::Screenshot(serde_json::from_value(value).map_err(malformed)?)
            }
            AnnotationType::TextHighlight => {
                AnnotationData::TextHighlight(serde_json::from_value(value).map_err(malformed)?)
            }
            AnnotationType::Underline => {
                AnnotationData::Underline(serde_json::from_value(value).map_err(malformed)?)
            }
            AnnotationType::Comment => {
                AnnotationData::Comment(serde_json::from_value(value).map_err(malformed)?)
            }
        };

        data.validate()?;
        Ok(data)
    }

    /// Encode the payload without its type tag
    pub fn to_value(&self) -> serde_json::Result<Value> {
        match self {
            AnnotationData::Screenshot(d) => serde_json::to_value(d),
            AnnotationData::TextHighlight(d) => serde_json::to_value(d),
            AnnotationData::Underline(d) => serde_json::to_value(d),
            AnnotationData::Comment(d) => serde_json::to_value(d),
        }
    }

    /// Check the type-specific schema
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            AnnotationData::Screenshot(d) => {
                let rect = d.rect.as_ref().ok_or(ValidationError::MissingField("rect"))?;
                validate_percent_rect("rect", rect)?;
                match d.image_data.as_deref() {
                    Some(image) if !image.trim().is_empty() => Ok(()),
                    _ => Err(ValidationError::MissingField("imageData")),
                }
            }
            AnnotationData::TextHighlight(d) => {
                validate_text_anchor(&d.selected_text, &d.text_ranges, &d.line_rects)?;
                validate_color(&d.color)
            }
            AnnotationData::Underline(d) => {
                validate_text_anchor(&d.selected_text, &d.text_ranges, &d.line_rects)?;
                validate_color(&d.color)?;
                if !(d.thickness.is_finite() && d.thickness > 0.0) {
                    return Err(ValidationError::invalid("thickness", "must be a positive number"));
                }
                Ok(())
            }
            AnnotationData::Comment(d) => {
                let position = d
                    .position
                    .as_ref()
                    .ok_or(ValidationError::MissingField("position"))?;
                if !position.is_within_page() {
                    return Err(ValidationError::invalid("position", "must lie within 0-100%"));
                }
                if d.content.trim().is_empty() {
                    return Err(ValidationError::MissingField("content"));
                }
                Ok(())
            }
        }
    }

    /// Display color for colored payloads
    pub fn color(&self) -> Option<&str> {
        match self {
            AnnotationData::TextHighlight(d) => Some(&d.color),
            AnnotationData::Underline(d) => Some(&d.color),
            _ => None,
        }
    }

    /// Replace the display color
    pub fn set_color(&mut self, color: &str) -> Result<(), ValidationError> {
        validate_color(color)?;
        match self {
            AnnotationData::TextHighlight(d) => d.color = color.to_string(),
            AnnotationData::Underline(d) => d.color = color.to_string(),
            other => {
                return Err(ValidationError::invalid(
                    "color",
                    format!("{} annotations have no color", other.annotation_type()),
                ))
            }
        }
        Ok(())
    }

    /// The annotated text for text-anchored payloads
    pub fn selected_text(&self) -> Option<&str> {
        match self {
            AnnotationData::TextHighlight(d) => Some(&d.selected_text),
            AnnotationData::Underline(d) => Some(&d.selected_text),
            _ => None,
        }
    }

    pub fn text_ranges(&self) -> &[TextRange] {
        match self {
            AnnotationData::TextHighlight(d) => &d.text_ranges,
            AnnotationData::Underline(d) => &d.text_ranges,
            _ => &[],
        }
    }

    pub fn line_rects(&self) -> &[PercentRect] {
        match self {
            AnnotationData::TextHighlight(d) => &d.line_rects,
            AnnotationData::Underline(d) => &d.line_rects,
            _ => &[],
        }
    }
}

fn validate_text_anchor(
    selected_text: &str,
    text_ranges: &[TextRange],
    line_rects: &[PercentRect],
) -> Result<(), ValidationError> {
    if selected_text.trim().is_empty() {
        return Err(ValidationError::MissingField("selectedText"));
    }
    if text_ranges.is_empty() {
        return Err(ValidationError::MissingField("textRanges"));
    }
    if let Some(range) = text_ranges.iter().find(|r| r.is_empty()) {
        return Err(ValidationError::invalid(
            "textRanges",
            format!("range {}..{} is empty", range.start, range.end),
        ));
    }
    for rect in line_rects {
        validate_percent_rect("lineRects", rect)?;
    }
    Ok(())
}

fn validate_percent_rect(field: &'static str, rect: &PercentRect) -> Result<(), ValidationError> {
    let values = [
        rect.x_percent,
        rect.y_percent,
        rect.width_percent,
        rect.height_percent,
    ];
    if values.iter().any(|v| !v.is_finite()) {
        return Err(ValidationError::invalid(field, "coordinates must be finite"));
    }
    if !rect.has_area() {
        return Err(ValidationError::invalid(field, "width and height must be positive"));
    }
    Ok(())
}

/// Accepts `#rgb`, `#rrggbb` and `#rrggbbaa`
pub fn validate_color(color: &str) -> Result<(), ValidationError> {
    if color.is_empty() {
        return Err(ValidationError::MissingField("color"));
    }
    let valid = color
        .strip_prefix('#')
        .map(|hex| matches!(hex.len(), 3 | 6 | 8) && hex.chars().all(|c| c.is_ascii_hexdigit()))
        .unwrap_or(false);
    if valid {
        Ok(())
    } else {
        Err(ValidationError::invalid(
            "color",
            format!("`{}` is not a hex color", color),
        ))
    }
}
