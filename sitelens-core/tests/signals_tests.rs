// Tests for signal extraction

use sitelens_core::signals::extract;
use sitelens_scanner::{
    Cookie, RawPageSnapshot, RequestRecord, ResponseRecord, ScriptAsset, StyleAsset,
};
use std::collections::BTreeMap;

fn response(url: &str, headers: Option<&[(&str, &str)]>) -> ResponseRecord {
    ResponseRecord {
        url: url.to_string(),
        status: 200,
        headers: headers.map(|pairs| {
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<BTreeMap<_, _>>()
        }),
        method: "GET".to_string(),
    }
}

#[test]
fn test_header_names_are_lowercased() {
    let mut snapshot = RawPageSnapshot::new("https://example.com/");
    snapshot.responses.push(response(
        "https://example.com/",
        Some(&[("Content-Security-Policy", "default-src 'self'"), ("X-Frame-Options", "DENY")]),
    ));

    let signals = extract(&snapshot);

    assert_eq!(signals.header("content-security-policy"), Some("default-src 'self'"));
    assert_eq!(signals.header("X-FRAME-OPTIONS"), Some("DENY"));
    assert!(signals.headers.keys().all(|k| k == &k.to_lowercase()));
}

#[test]
fn test_main_document_matches_requested_url() {
    let mut snapshot = RawPageSnapshot::new("https://example.com/");
    snapshot
        .responses
        .push(response("https://cdn.example.com/app.js", Some(&[("server", "cdn")])));
    snapshot
        .responses
        .push(response("https://example.com/", Some(&[("server", "origin")])));

    let signals = extract(&snapshot);

    assert_eq!(signals.header("server"), Some("origin"));
    assert_eq!(signals.responses.len(), 2);
}

#[test]
fn test_main_document_falls_back_to_first_response() {
    let mut snapshot = RawPageSnapshot::new("https://example.com/");
    snapshot
        .responses
        .push(response("https://www.example.com/", Some(&[("server", "redirected")])));

    let signals = extract(&snapshot);
    assert_eq!(signals.header("server"), Some("redirected"));
}

#[test]
fn test_response_without_headers_is_skipped() {
    let mut snapshot = RawPageSnapshot::new("https://example.com/");
    snapshot.responses.push(response("https://example.com/", None));
    snapshot
        .responses
        .push(response("https://example.com/style.css", Some(&[("server", "nginx")])));

    let signals = extract(&snapshot);

    assert_eq!(signals.skipped_responses, 1);
    assert_eq!(signals.responses.len(), 1);
    assert_eq!(signals.header("server"), Some("nginx"));
}

#[test]
fn test_empty_snapshot_yields_empty_signals() {
    let signals = extract(&RawPageSnapshot::new("https://example.com/"));

    assert!(signals.headers.is_empty());
    assert!(signals.main_response.is_none());
    assert_eq!(signals.js_texts().count(), 0);
    assert_eq!(signals.css_texts().count(), 0);
}

#[test]
fn test_js_and_css_text_helpers() {
    let mut snapshot = RawPageSnapshot::new("https://example.com/");
    snapshot
        .scripts
        .push(ScriptAsset::external("https://code.jquery.com/jquery-3.6.0.min.js"));
    snapshot.scripts.push(ScriptAsset::inline("window.__NUXT__={}"));
    snapshot
        .styles
        .inline
        .push(StyleAsset::inline(".btn{color:red}"));
    snapshot
        .styles
        .external
        .push(StyleAsset::external("/css/bootstrap-4.1.3.min.css"));

    let signals = extract(&snapshot);

    let js: Vec<&str> = signals.js_texts().collect();
    assert_eq!(js, vec!["https://code.jquery.com/jquery-3.6.0.min.js", "window.__NUXT__={}"]);

    let css: Vec<&str> = signals.css_texts().collect();
    assert_eq!(css, vec!["/css/bootstrap-4.1.3.min.css", ".btn{color:red}"]);
}

#[test]
fn test_network_text_includes_requests_and_markup() {
    let mut snapshot = RawPageSnapshot::new("https://example.com/");
    snapshot.html = "<img src=\"https://bucket.s3.amazonaws.com/a.png\">".to_string();
    snapshot.requests.push(RequestRecord {
        url: "https://site.netlify.app/app.js".to_string(),
        method: "GET".to_string(),
        resource_type: "Script".to_string(),
    });

    let signals = extract(&snapshot);
    let text = signals.network_text();

    assert!(text.contains("netlify.app"));
    assert!(text.contains("amazonaws.com"));
}

#[test]
fn test_https_detection_and_cookies_carried() {
    let mut snapshot = RawPageSnapshot::new("https://example.com/");
    snapshot.cookies.push(Cookie {
        name: "sessionid".to_string(),
        value: "abc".to_string(),
        secure: true,
        ..Default::default()
    });

    let signals = extract(&snapshot);
    assert!(signals.is_https());
    assert_eq!(signals.cookies.len(), 1);

    let plain = extract(&RawPageSnapshot::new("http://example.com/"));
    assert!(!plain.is_https());
}
