// Signal extraction: raw snapshot to normalized, query-friendly evidence

use sitelens_scanner::{
    Cookie, MalformedSignal, RawPageSnapshot, ResponseRecord, ScriptAsset, StyleAsset,
};
use std::collections::BTreeMap;
use tracing::debug;
use url::Url;

/// A well-formed response with lower-cased header names.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedResponse {
    pub url: String,
    pub status: u16,
    pub method: String,
    pub headers: BTreeMap<String, String>,
}

/// Immutable evidence bundle consumed by the classifier and the scorer.
#[derive(Debug, Clone, Default)]
pub struct Signals {
    pub url: String,
    pub html: String,
    pub title: String,
    /// Main-document headers, names lower-cased. Empty when no response qualified.
    pub headers: BTreeMap<String, String>,
    pub main_response: Option<NormalizedResponse>,
    pub responses: Vec<NormalizedResponse>,
    pub scripts: Vec<ScriptAsset>,
    /// External stylesheets first, then inline blocks.
    pub styles: Vec<StyleAsset>,
    pub cookies: Vec<Cookie>,
    pub request_urls: Vec<String>,
    pub links: Vec<String>,
    /// Response records dropped for missing headers.
    pub skipped_responses: usize,
}

impl Signals {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_lowercase()).map(String::as_str)
    }

    pub fn has_header(&self, name: &str) -> bool {
        self.header(name).is_some()
    }

    /// Main-document headers rendered as `name: value` lines.
    pub fn headers_text(&self) -> String {
        self.headers
            .iter()
            .map(|(k, v)| format!("{}: {}", k, v))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Script bodies and script source URLs, one entry per non-empty value.
    pub fn js_texts(&self) -> impl Iterator<Item = &str> {
        self.scripts.iter().flat_map(|s| {
            s.content
                .as_deref()
                .into_iter()
                .chain(s.source.as_deref())
                .filter(|t| !t.is_empty())
        })
    }

    /// Stylesheet bodies and stylesheet hrefs, one entry per non-empty value.
    pub fn css_texts(&self) -> impl Iterator<Item = &str> {
        self.styles.iter().flat_map(|s| {
            s.content
                .as_deref()
                .into_iter()
                .chain(s.href.as_deref())
                .filter(|t| !t.is_empty())
        })
    }

    /// Request URLs followed by the page markup.
    pub fn network_text(&self) -> String {
        let mut text = self.request_urls.join(" ");
        text.push(' ');
        text.push_str(&self.html);
        text
    }

    pub fn is_https(&self) -> bool {
        Url::parse(&self.url)
            .map(|u| u.scheme() == "https")
            .unwrap_or(false)
    }
}

/// Normalize a snapshot. Pure; malformed response records are logged and skipped.
pub fn extract(snapshot: &RawPageSnapshot) -> Signals {
    let mut skipped = 0;
    let mut responses = Vec::with_capacity(snapshot.responses.len());

    for record in &snapshot.responses {
        match normalize_response(record) {
            Ok(response) => responses.push(response),
            Err(e) => {
                debug!("{}", e);
                skipped += 1;
            }
        }
    }

    let main_response = select_main_response(&snapshot.url, &responses).cloned();
    let headers = main_response
        .as_ref()
        .map(|r| r.headers.clone())
        .unwrap_or_default();

    let styles = snapshot
        .styles
        .external
        .iter()
        .chain(snapshot.styles.inline.iter())
        .cloned()
        .collect();

    Signals {
        url: snapshot.url.clone(),
        html: snapshot.html.clone(),
        title: snapshot.title.clone(),
        headers,
        main_response,
        responses,
        scripts: snapshot.scripts.clone(),
        styles,
        cookies: snapshot.cookies.clone(),
        request_urls: snapshot.requests.iter().map(|r| r.url.clone()).collect(),
        links: snapshot.links.clone(),
        skipped_responses: skipped,
    }
}

fn normalize_response(record: &ResponseRecord) -> Result<NormalizedResponse, MalformedSignal> {
    let headers = record
        .headers
        .as_ref()
        .ok_or_else(|| MalformedSignal::new("response", &record.url, "no headers"))?;

    let mut lowered: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        lowered
            .entry(name.to_lowercase())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(value);
            })
            .or_insert_with(|| value.clone());
    }

    Ok(NormalizedResponse {
        url: record.url.clone(),
        status: record.status,
        method: record.method.clone(),
        headers: lowered,
    })
}

/// Exact URL match, then a match ignoring one trailing slash, then the first
/// well-formed response.
pub fn select_main_response<'a>(
    url: &str,
    responses: &'a [NormalizedResponse],
) -> Option<&'a NormalizedResponse> {
    let trimmed = url.trim_end_matches('/');
    responses
        .iter()
        .find(|r| r.url == url)
        .or_else(|| responses.iter().find(|r| r.url.trim_end_matches('/') == trimmed))
        .or_else(|| responses.first())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(url: &str, server: &str) -> NormalizedResponse {
        NormalizedResponse {
            url: url.to_string(),
            status: 200,
            method: "GET".to_string(),
            headers: BTreeMap::from([("server".to_string(), server.to_string())]),
        }
    }

    #[test]
    fn test_select_main_prefers_exact_match() {
        let responses = vec![
            response("https://example.com", "first"),
            response("https://example.com/", "exact"),
        ];
        let main = select_main_response("https://example.com/", &responses).unwrap();
        assert_eq!(main.headers["server"], "exact");
    }

    #[test]
    fn test_select_main_ignores_trailing_slash() {
        let responses = vec![
            response("https://cdn.example.com/app.js", "cdn"),
            response("https://example.com", "doc"),
        ];
        let main = select_main_response("https://example.com/", &responses).unwrap();
        assert_eq!(main.headers["server"], "doc");
    }

    #[test]
    fn test_select_main_falls_back_to_first() {
        let responses = vec![response("https://www.example.com/", "redirected")];
        let main = select_main_response("https://example.com/", &responses).unwrap();
        assert_eq!(main.headers["server"], "redirected");
        assert!(select_main_response("https://example.com/", &[]).is_none());
    }
}
