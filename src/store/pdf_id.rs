//! Document id resolution
//!
//! Persisted annotations are scoped by a 12-hex-digit document id. When the
//! caller does not pass one explicitly it is recovered, in order, from a URL
//! query parameter, the loaded file name, then the resource URL.

use std::sync::OnceLock;

use regex::Regex;

fn token_regex() -> Option<&'static Regex> {
    static TOKEN: OnceLock<Option<Regex>> = OnceLock::new();
    TOKEN
        .get_or_init(|| Regex::new(r"(?i)[0-9a-f]{12}").ok())
        .as_ref()
}

/// Where a document id may come from
#[derive(Debug, Clone, Default)]
pub struct PdfIdSources<'a> {
    pub explicit: Option<&'a str>,
    /// Page URL whose query string may carry the id
    pub url: Option<&'a str>,
    pub file_name: Option<&'a str>,
    pub resource_url: Option<&'a str>,
}

/// First 12-hex-digit token in `text`, lowercased
pub fn extract_pdf_id(text: &str) -> Option<String> {
    token_regex()?
        .find(text)
        .map(|m| m.as_str().to_ascii_lowercase())
}

/// First query parameter value containing a token
fn from_query(url: &str) -> Option<String> {
    let (_, query) = url.split_once('?')?;
    let query = query.split('#').next().unwrap_or_default();

    query.split('&').find_map(|pair| {
        let value = pair.split_once('=').map(|(_, v)| v)?;
        let decoded = urlencoding::decode(&value.replace('+', " "))
            .map(|v| v.into_owned())
            .unwrap_or_else(|_| value.to_string());
        extract_pdf_id(&decoded)
    })
}

/// Resolve the document id from the available sources
pub fn resolve_pdf_id(sources: &PdfIdSources<'_>) -> Option<String> {
    if let Some(explicit) = sources.explicit.map(str::trim).filter(|s| !s.is_empty()) {
        return Some(explicit.to_string());
    }
    sources
        .url
        .and_then(from_query)
        .or_else(|| sources.file_name.and_then(extract_pdf_id))
        .or_else(|| sources.resource_url.and_then(extract_pdf_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_normalizes_case() {
        assert_eq!(
            extract_pdf_id("Report-ABCDEF123456.pdf"),
            Some("abcdef123456".to_string())
        );
        assert_eq!(extract_pdf_id("short-abc123.pdf"), None);
    }

    #[test]
    fn test_explicit_wins() {
        let sources = PdfIdSources {
            explicit: Some("my-doc"),
            url: Some("https://reader.local/view?doc=0123456789ab"),
            ..Default::default()
        };
        assert_eq!(resolve_pdf_id(&sources), Some("my-doc".to_string()));
    }

    #[test]
    fn test_resolution_order() {
        let sources = PdfIdSources {
            explicit: Some("  "),
            url: Some("https://reader.local/view?lang=en&file=%2Fbooks%2FAAAAAA000001.pdf#page=2"),
            file_name: Some("bbbbbb000002.pdf"),
            resource_url: Some("https://cdn.local/cccccc000003"),
        };
        assert_eq!(resolve_pdf_id(&sources), Some("aaaaaa000001".to_string()));

        let sources = PdfIdSources {
            url: Some("https://reader.local/view?lang=en"),
            file_name: Some("bbbbbb000002.pdf"),
            resource_url: Some("https://cdn.local/cccccc000003"),
            ..Default::default()
        };
        assert_eq!(resolve_pdf_id(&sources), Some("bbbbbb000002".to_string()));

        let sources = PdfIdSources {
            file_name: Some("notes.pdf"),
            resource_url: Some("https://cdn.local/files/CCCCCC000003/download"),
            ..Default::default()
        };
        assert_eq!(resolve_pdf_id(&sources), Some("cccccc000003".to_string()));

        assert_eq!(resolve_pdf_id(&PdfIdSources::default()), None);
    }
}
