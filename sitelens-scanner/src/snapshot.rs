use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Everything harvested from a single page load.
///
/// Lists default to empty when absent from serialized input, so a snapshot
/// saved by an older build (or written by hand) still deserializes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RawPageSnapshot {
    pub url: String,
    pub html: String,
    pub title: String,
    pub scripts: Vec<ScriptAsset>,
    pub styles: StyleAssets,
    pub cookies: Vec<Cookie>,
    pub responses: Vec<ResponseRecord>,
    pub requests: Vec<RequestRecord>,
    pub links: Vec<String>,
}

impl RawPageSnapshot {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }
}

/// A `<script>` element. External scripts carry `source`, inline ones `content`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptAsset {
    pub source: Option<String>,
    pub content: Option<String>,
}

impl ScriptAsset {
    pub fn external(source: impl Into<String>) -> Self {
        Self {
            source: Some(source.into()),
            content: None,
        }
    }

    pub fn inline(content: impl Into<String>) -> Self {
        Self {
            source: None,
            content: Some(content.into()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StyleAssets {
    pub external: Vec<StyleAsset>,
    pub inline: Vec<StyleAsset>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StyleAsset {
    pub href: Option<String>,
    pub content: Option<String>,
}

impl StyleAsset {
    pub fn external(href: impl Into<String>) -> Self {
        Self {
            href: Some(href.into()),
            content: None,
        }
    }

    pub fn inline(content: impl Into<String>) -> Self {
        Self {
            href: None,
            content: Some(content.into()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
    pub secure: bool,
    pub http_only: bool,
}

/// An inbound response observed during navigation.
///
/// `headers` is `None` when the record arrived without a usable header map;
/// consumers treat such records as malformed and skip them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponseRecord {
    pub url: String,
    pub status: u16,
    pub headers: Option<BTreeMap<String, String>>,
    pub method: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RequestRecord {
    pub url: String,
    pub method: String,
    pub resource_type: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_lists_default_to_empty() {
        let snapshot: RawPageSnapshot =
            serde_json::from_str(r#"{"url": "https://example.com", "html": "<html></html>"}"#)
                .unwrap();

        assert_eq!(snapshot.url, "https://example.com");
        assert!(snapshot.scripts.is_empty());
        assert!(snapshot.styles.external.is_empty());
        assert!(snapshot.responses.is_empty());
        assert!(snapshot.links.is_empty());
    }

    #[test]
    fn test_response_without_headers_deserializes() {
        let record: ResponseRecord =
            serde_json::from_str(r#"{"url": "https://example.com", "status": 200}"#).unwrap();
        assert!(record.headers.is_none());
    }

    #[test]
    fn test_request_record_uses_camel_case() {
        let record = RequestRecord {
            url: "https://example.com/app.js".to_string(),
            method: "GET".to_string(),
            resource_type: "Script".to_string(),
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["resourceType"], "Script");
    }
}
