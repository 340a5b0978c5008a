//! Annotation entity
//!
//! An annotation is anchored to one page and carries a type-specific payload.
//! Identifiers are generated client-side at construction, so an annotation
//! has a stable identity before any persistence round trip.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::payload::{AnnotationData, AnnotationType};
use crate::error::ValidationError;

/// A user comment attached to an annotation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Comment {
    pub fn new(content: &str, author: Option<&str>) -> Result<Self, ValidationError> {
        if content.trim().is_empty() {
            return Err(ValidationError::MissingField("content"));
        }
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            content: content.to_string(),
            author: author.map(|a| a.to_string()),
            created_at: Utc::now(),
        })
    }
}

/// Input for creating an annotation
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationDraft {
    /// Caller-chosen id; generated when absent
    pub id: Option<String>,
    pub page_number: u32,
    pub data: AnnotationData,
}

impl AnnotationDraft {
    pub fn new(page_number: u32, data: AnnotationData) -> Self {
        Self {
            id: None,
            page_number,
            data,
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.id = Some(id.to_string());
        self
    }

    /// Decode `{ id?, type, pageNumber, data }`
    pub fn from_value(value: Value) -> Result<Self, ValidationError> {
        let raw: RawDraft =
            serde_json::from_value(value).map_err(|e| ValidationError::Malformed(e.to_string()))?;
        let annotation_type = raw
            .annotation_type
            .ok_or(ValidationError::MissingField("type"))?
            .parse::<AnnotationType>()?;
        let page_number = raw
            .page_number
            .ok_or(ValidationError::MissingField("pageNumber"))?;

        Ok(Self {
            id: raw.id,
            page_number,
            data: AnnotationData::from_value(annotation_type, raw.data)?,
        })
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDraft {
    id: Option<String>,
    #[serde(rename = "type")]
    annotation_type: Option<String>,
    page_number: Option<u32>,
    #[serde(default)]
    data: Value,
}

/// Partial update applied by [`Annotation::apply`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnnotationChanges {
    pub page_number: Option<u32>,
    pub data: Option<AnnotationData>,
    pub color: Option<String>,
}

impl AnnotationChanges {
    pub fn color(color: &str) -> Self {
        Self {
            color: Some(color.to_string()),
            ..Default::default()
        }
    }

    pub fn data(data: AnnotationData) -> Self {
        Self {
            data: Some(data),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.page_number.is_none() && self.data.is_none() && self.color.is_none()
    }

    /// Decode `{ pageNumber?, data?, color? }`; `data` is read as `annotation_type`
    pub fn from_value(value: Value, annotation_type: AnnotationType) -> Result<Self, ValidationError> {
        let raw: RawChanges =
            serde_json::from_value(value).map_err(|e| ValidationError::Malformed(e.to_string()))?;
        let data = match raw.data {
            Some(data) => Some(AnnotationData::from_value(annotation_type, data)?),
            None => None,
        };
        Ok(Self {
            page_number: raw.page_number,
            data,
            color: raw.color,
        })
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawChanges {
    page_number: Option<u32>,
    data: Option<Value>,
    color: Option<String>,
}

/// A validated annotation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "AnnotationRecord", into = "AnnotationRecord")]
pub struct Annotation {
    id: String,
    page_number: u32,
    data: AnnotationData,
    comments: Vec<Comment>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Annotation {
    /// Construct and validate a new annotation
    pub fn new(draft: AnnotationDraft) -> Result<Self, ValidationError> {
        let id = match draft.id {
            Some(id) if id.trim().is_empty() => return Err(ValidationError::MissingField("id")),
            Some(id) => id,
            None => Uuid::new_v4().to_string(),
        };
        let now = Utc::now();
        let annotation = Self {
            id,
            page_number: draft.page_number,
            data: draft.data,
            comments: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        annotation.validate()?;
        Ok(annotation)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn annotation_type(&self) -> AnnotationType {
        self.data.annotation_type()
    }

    pub fn page_number(&self) -> u32 {
        self.page_number
    }

    pub fn data(&self) -> &AnnotationData {
        &self.data
    }

    pub fn comments(&self) -> &[Comment] {
        &self.comments
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn color(&self) -> Option<&str> {
        self.data.color()
    }

    /// Check every invariant of the entity
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.id.trim().is_empty() {
            return Err(ValidationError::MissingField("id"));
        }
        if self.page_number < 1 {
            return Err(ValidationError::invalid("pageNumber", "pages are numbered from 1"));
        }
        self.data.validate()?;
        if self.comments.iter().any(|c| c.content.trim().is_empty()) {
            return Err(ValidationError::invalid("comments", "comment content is empty"));
        }
        Ok(())
    }

    /// Apply a change set atomically
    ///
    /// Changes are validated on a copy; on error `self` is left untouched.
    pub fn apply(&mut self, changes: &AnnotationChanges) -> Result<(), ValidationError> {
        let mut next = self.clone();

        if let Some(page_number) = changes.page_number {
            next.page_number = page_number;
        }
        if let Some(data) = &changes.data {
            if data.annotation_type() != self.annotation_type() {
                return Err(ValidationError::TypeMismatch {
                    expected: self.annotation_type().as_str(),
                    actual: data.annotation_type().as_str(),
                });
            }
            next.data = data.clone();
        }
        if let Some(color) = &changes.color {
            next.data.set_color(color)?;
        }

        next.validate()?;
        next.updated_at = Utc::now();
        *self = next;
        Ok(())
    }

    /// Attach a comment and bump `updatedAt`
    pub fn add_comment(&mut self, content: &str, author: Option<&str>) -> Result<&Comment, ValidationError> {
        let comment = Comment::new(content, author)?;
        self.comments.push(comment);
        self.updated_at = Utc::now();
        Ok(&self.comments[self.comments.len() - 1])
    }

    /// Detach a comment by id and bump `updatedAt`
    pub fn remove_comment(&mut self, comment_id: &str) -> Option<Comment> {
        let index = self.comments.iter().position(|c| c.id == comment_id)?;
        self.updated_at = Utc::now();
        Some(self.comments.remove(index))
    }

    pub fn to_json(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }

    /// Decode and validate an annotation
    pub fn from_json(value: &Value) -> Result<Self, ValidationError> {
        Annotation::deserialize(value).map_err(|e| ValidationError::Malformed(e.to_string()))
    }
}

/// Wire shape: `{ id, type, pageNumber, data, comments, createdAt, updatedAt }`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnnotationRecord {
    id: String,
    #[serde(rename = "type")]
    annotation_type: AnnotationType,
    page_number: u32,
    data: Value,
    #[serde(default)]
    comments: Vec<Comment>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<AnnotationRecord> for Annotation {
    type Error = ValidationError;

    fn try_from(record: AnnotationRecord) -> Result<Self, Self::Error> {
        let annotation = Annotation {
            id: record.id,
            page_number: record.page_number,
            data: AnnotationData::from_value(record.annotation_type, record.data)?,
            comments: record.comments,
            created_at: record.created_at,
            updated_at: record.updated_at,
        };
        annotation.validate()?;
        Ok(annotation)
    }
}

impl From<Annotation> for AnnotationRecord {
    fn from(annotation: Annotation) -> Self {
        let annotation_type = annotation.annotation_type();
        AnnotationRecord {
            id: annotation.id,
            annotation_type,
            page_number: annotation.page_number,
            data: annotation.data.to_value().unwrap_or(Value::Null),
            comments: annotation.comments,
            created_at: annotation.created_at,
            updated_at: annotation.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotations::payload::{CommentData, HighlightData, ScreenshotData, UnderlineData};
    use crate::geometry::{PercentPoint, PercentRect, TextRange};
    use serde_json::json;

    fn highlight_data() -> AnnotationData {
        AnnotationData::TextHighlight(HighlightData {
            selected_text: "The quick brown fox".to_string(),
            text_ranges: vec![TextRange::new(4, 23)],
            color: "#ffeb3b".to_string(),
            line_rects: vec![PercentRect::new(50.0, 10.0, 40.0, 5.0)],
        })
    }

    #[test]
    fn test_create_highlight() {
        let annotation = Annotation::new(AnnotationDraft::new(2, highlight_data())).unwrap();

        assert_eq!(annotation.annotation_type(), AnnotationType::TextHighlight);
        assert_eq!(annotation.page_number(), 2);
        assert_eq!(annotation.color(), Some("#ffeb3b"));
        assert!(Uuid::parse_str(annotation.id()).is_ok());
        assert_eq!(annotation.created_at(), annotation.updated_at());
    }

    #[test]
    fn test_ids_are_unique() {
        let a = Annotation::new(AnnotationDraft::new(1, highlight_data())).unwrap();
        let b = Annotation::new(AnnotationDraft::new(1, highlight_data())).unwrap();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_rejects_page_zero() {
        let err = Annotation::new(AnnotationDraft::new(0, highlight_data())).unwrap_err();
        assert_eq!(err.field(), Some("pageNumber"));
    }

    #[test]
    fn test_round_trip_all_types() {
        let payloads = vec![
            AnnotationData::Screenshot(ScreenshotData {
                rect: Some(PercentRect::new(10.0, 10.0, 30.0, 20.0)),
                image_data: Some("data:image/png;base64,AAAA".to_string()),
                caption: Some("Figure 2".to_string()),
            }),
            highlight_data(),
            AnnotationData::Underline(UnderlineData {
                selected_text: "brown".to_string(),
                text_ranges: vec![TextRange::new(10, 15)],
                color: "#2196f3".to_string(),
                line_rects: vec![],
                thickness: 2.5,
            }),
            AnnotationData::Comment(CommentData {
                position: Some(PercentPoint::new(20.0, 30.0)),
                content: "Revisit".to_string(),
            }),
        ];

        for data in payloads {
            let mut annotation = Annotation::new(AnnotationDraft::new(3, data)).unwrap();
            annotation.add_comment("first", Some("reader")).unwrap();

            let json = annotation.to_json().unwrap();
            let parsed = Annotation::from_json(&json).unwrap();

            assert_eq!(parsed.id(), annotation.id());
            assert_eq!(parsed.annotation_type(), annotation.annotation_type());
            assert_eq!(parsed.page_number(), annotation.page_number());
            assert_eq!(parsed.data(), annotation.data());
            assert_eq!(parsed.comments().len(), 1);
            assert_eq!(parsed, annotation);
        }
    }

    #[test]
    fn test_wire_shape() {
        let annotation = Annotation::new(AnnotationDraft::new(2, highlight_data()).with_id("hl-1")).unwrap();
        let json = annotation.to_json().unwrap();

        assert_eq!(json["id"], "hl-1");
        assert_eq!(json["type"], "text-highlight");
        assert_eq!(json["pageNumber"], 2);
        assert_eq!(json["data"]["selectedText"], "The quick brown fox");
        assert_eq!(json["data"]["lineRects"][0]["xPercent"], 50.0);
    }

    #[test]
    fn test_from_json_validates() {
        let json = json!({
            "id": "bad-1",
            "type": "text-highlight",
            "pageNumber": 1,
            "data": {"selectedText": "x", "textRanges": [], "color": "#fff"},
            "comments": [],
            "createdAt": "2025-01-01T00:00:00Z",
            "updatedAt": "2025-01-01T00:00:00Z"
        });
        let err = Annotation::from_json(&json).unwrap_err();
        assert!(err.to_string().contains("textRanges"));
    }

    #[test]
    fn test_apply_color_change() {
        let mut annotation = Annotation::new(AnnotationDraft::new(2, highlight_data())).unwrap();
        let before = annotation.updated_at();

        annotation.apply(&AnnotationChanges::color("#4caf50")).unwrap();

        assert_eq!(annotation.color(), Some("#4caf50"));
        assert!(annotation.updated_at() >= before);
    }

    #[test]
    fn test_apply_is_atomic() {
        let mut annotation = Annotation::new(AnnotationDraft::new(2, highlight_data())).unwrap();
        let original = annotation.clone();

        let changes = AnnotationChanges {
            page_number: Some(5),
            color: Some("not-a-color".to_string()),
            ..Default::default()
        };
        assert!(annotation.apply(&changes).is_err());
        assert_eq!(annotation, original);
    }

    #[test]
    fn test_apply_rejects_type_change() {
        let mut annotation = Annotation::new(AnnotationDraft::new(2, highlight_data())).unwrap();
        let comment = AnnotationData::Comment(CommentData {
            position: Some(PercentPoint::new(1.0, 1.0)),
            content: "x".to_string(),
        });

        let err = annotation.apply(&AnnotationChanges::data(comment)).unwrap_err();
        assert!(matches!(err, ValidationError::TypeMismatch { .. }));
    }

    #[test]
    fn test_comment_lifecycle_bumps_updated_at() {
        let mut annotation = Annotation::new(AnnotationDraft::new(1, highlight_data())).unwrap();
        let created = annotation.updated_at();

        let comment_id = annotation.add_comment("looks right", None).unwrap().id.clone();
        let after_add = annotation.updated_at();
        assert!(after_add >= created);
        assert_eq!(annotation.comments().len(), 1);

        assert!(annotation.add_comment("  ", None).is_err());

        let removed = annotation.remove_comment(&comment_id).unwrap();
        assert_eq!(removed.content, "looks right");
        assert!(annotation.updated_at() >= after_add);
        assert!(annotation.remove_comment(&comment_id).is_none());
    }

    #[test]
    fn test_draft_from_value() {
        let draft = AnnotationDraft::from_value(json!({
            "type": "comment",
            "pageNumber": 4,
            "data": {"position": {"xPercent": 5.0, "yPercent": 5.0}, "content": "hi"}
        }))
        .unwrap();
        assert_eq!(draft.page_number, 4);
        assert_eq!(draft.data.annotation_type(), AnnotationType::Comment);

        let err = AnnotationDraft::from_value(json!({"pageNumber": 1, "data": {}})).unwrap_err();
        assert_eq!(err.field(), Some("type"));
    }
}
