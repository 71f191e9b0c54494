use crate::error::{CaptureError, Result};
use crate::pool::ContextLease;
use crate::renderer::Renderer;
use crate::snapshot::{
    Cookie, RawPageSnapshot, RequestRecord, ResponseRecord, ScriptAsset, StyleAsset,
};
use once_cell::sync::Lazy;
use reqwest::Client;
use reqwest::header::HeaderMap;
use scraper::{Html, Selector};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::debug;
use url::Url;

pub const DEFAULT_USER_AGENT: &str = "SiteLens/0.1 (+https://github.com/trapdoorsec/sitelens)";

static TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse("title").unwrap());
static SCRIPT: Lazy<Selector> = Lazy::new(|| Selector::parse("script").unwrap());
static STYLESHEET: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"link[rel~="stylesheet"][href]"#).unwrap());
static STYLE: Lazy<Selector> = Lazy::new(|| Selector::parse("style").unwrap());
static ANCHOR: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").unwrap());

/// Static engine: one GET of the document, markup parsed with `scraper`.
///
/// Scripts are never executed, so client-rendered markup is only what the
/// server sent. The request log holds the single document exchange.
#[derive(Debug, Clone)]
pub struct HttpRenderer {
    client: Client,
}

impl HttpRenderer {
    pub fn new() -> Result<Self> {
        Self::with_user_agent(DEFAULT_USER_AGENT)
    }

    pub fn with_user_agent(user_agent: &str) -> Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| CaptureError::Engine(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client })
    }
}

impl Renderer for HttpRenderer {
    async fn render(
        &self,
        url: &str,
        timeout: Duration,
        _lease: ContextLease,
    ) -> Result<RawPageSnapshot> {
        debug!("Fetching {}", url);

        let start = Instant::now();
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| map_reqwest_error(url, timeout, e))?;

        let final_url = response.url().to_string();
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let cookies = response_cookies(&response);
        let body = response
            .text()
            .await
            .map_err(|e| map_reqwest_error(url, timeout, e))?;
        debug!(url, status, elapsed_ms = start.elapsed().as_millis() as u64, "Document fetched");

        let mut snapshot = extract_document(&body, &final_url);
        snapshot.url = url.to_string();
        snapshot.cookies = cookies;
        snapshot.requests.push(RequestRecord {
            url: url.to_string(),
            method: "GET".to_string(),
            resource_type: "Document".to_string(),
        });
        snapshot.responses.push(ResponseRecord {
            url: final_url,
            status,
            headers: Some(flatten_headers(&headers)),
            method: "GET".to_string(),
        });

        Ok(snapshot)
    }
}

fn map_reqwest_error(url: &str, timeout: Duration, e: reqwest::Error) -> CaptureError {
    if e.is_timeout() {
        CaptureError::Timeout {
            url: url.to_string(),
            timeout_ms: timeout.as_millis() as u64,
        }
    } else {
        CaptureError::navigation(url, e)
    }
}

/// Parse markup into a snapshot. Relative asset and link URLs are resolved
/// against `base_url`.
pub fn extract_document(html: &str, base_url: &str) -> RawPageSnapshot {
    let document = Html::parse_document(html);
    let base = Url::parse(base_url).ok();
    let mut snapshot = RawPageSnapshot::new(base_url);
    snapshot.html = html.to_string();

    snapshot.title = document
        .select(&TITLE)
        .next()
        .map(|t| t.text().collect::<String>().trim().to_string())
        .unwrap_or_default();

    for element in document.select(&SCRIPT) {
        match element.value().attr("src") {
            Some(src) => snapshot
                .scripts
                .push(ScriptAsset::external(resolve(base.as_ref(), src))),
            None => {
                let content: String = element.text().collect();
                if !content.trim().is_empty() {
                    snapshot.scripts.push(ScriptAsset::inline(content));
                }
            }
        }
    }

    for element in document.select(&STYLESHEET) {
        if let Some(href) = element.value().attr("href") {
            snapshot
                .styles
                .external
                .push(StyleAsset::external(resolve(base.as_ref(), href)));
        }
    }

    for element in document.select(&STYLE) {
        let content: String = element.text().collect();
        if !content.trim().is_empty() {
            snapshot.styles.inline.push(StyleAsset::inline(content));
        }
    }

    for element in document.select(&ANCHOR) {
        if let Some(href) = element.value().attr("href")
            && let Some(link) = resolve_link(base.as_ref(), href)
        {
            snapshot.links.push(link);
        }
    }

    snapshot
}

fn resolve(base: Option<&Url>, reference: &str) -> String {
    base.and_then(|b| b.join(reference).ok())
        .map(|u| u.to_string())
        .unwrap_or_else(|| reference.to_string())
}

fn resolve_link(base: Option<&Url>, href: &str) -> Option<String> {
    if href.is_empty()
        || href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
        || href.starts_with('#')
    {
        return None;
    }

    let mut url = base?.join(href).ok()?;
    url.set_fragment(None);
    Some(url.to_string())
}

/// Lower-cased header map; repeated headers are joined with ", ".
pub fn flatten_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut flat: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let Ok(value) = value.to_str() else {
            debug!(header = %name, "Skipping non-text header value");
            continue;
        };
        flat.entry(name.as_str().to_lowercase())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(value);
            })
            .or_insert_with(|| value.to_string());
    }
    flat
}

/// Cookies set by the response. Domain and path default to the response
/// URL's host and `/` when the attribute is absent.
fn response_cookies(response: &reqwest::Response) -> Vec<Cookie> {
    let host = response.url().host_str().unwrap_or_default().to_string();
    response
        .cookies()
        .map(|c| Cookie {
            name: c.name().to_string(),
            value: c.value().to_string(),
            domain: c
                .domain()
                .map(|d| d.trim_start_matches('.').to_string())
                .filter(|d| !d.is_empty())
                .unwrap_or_else(|| host.clone()),
            path: c
                .path()
                .filter(|p| !p.is_empty())
                .unwrap_or("/")
                .to_string(),
            secure: c.secure(),
            http_only: c.http_only(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::ContextPool;
    use reqwest::header::HeaderValue;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{method, path},
    };

    #[test]
    fn test_extract_document_collects_assets() {
        let html = r#"<html><head>
            <title> Demo Shop </title>
            <link rel="stylesheet" href="/css/bootstrap-4.6.0.min.css">
            <link rel="preload" href="/font.woff2">
            <style>.x { color: red }</style>
            <script src="/js/jquery-3.6.0.min.js"></script>
            <script>window.__NEXT_DATA__ = {};</script>
            <script>   </script>
        </head><body>
            <a href="/about#team">About</a>
            <a href="mailto:hi@example.com">Mail</a>
            <a href="https://other.example.org/">Other</a>
        </body></html>"#;

        let snapshot = extract_document(html, "https://shop.example.com/");

        assert_eq!(snapshot.title, "Demo Shop");
        assert_eq!(snapshot.scripts.len(), 2);
        assert_eq!(
            snapshot.scripts[0].source.as_deref(),
            Some("https://shop.example.com/js/jquery-3.6.0.min.js")
        );
        assert!(snapshot.scripts[1].content.as_deref().unwrap().contains("__NEXT_DATA__"));
        assert_eq!(snapshot.styles.external.len(), 1);
        assert_eq!(snapshot.styles.inline.len(), 1);
        assert_eq!(
            snapshot.links,
            vec!["https://shop.example.com/about", "https://other.example.org/"]
        );
    }

    #[test]
    fn test_flatten_headers_lowercases_and_joins() {
        let mut headers = HeaderMap::new();
        headers.append("X-Frame-Options", HeaderValue::from_static("DENY"));
        headers.append("Vary", HeaderValue::from_static("Accept"));
        headers.append("Vary", HeaderValue::from_static("Origin"));

        let flat = flatten_headers(&headers);

        assert_eq!(flat.get("x-frame-options").map(String::as_str), Some("DENY"));
        assert_eq!(flat.get("vary").map(String::as_str), Some("Accept, Origin"));
    }

    #[tokio::test]
    async fn test_render_reads_cookie_attributes() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/login"))
            .respond_with(
                ResponseTemplate::new(200)
                    .append_header("Set-Cookie", "session=abc; Path=/app; Secure; HttpOnly")
                    .append_header("Set-Cookie", "theme=dark; Domain=.example.com")
                    .append_header("Set-Cookie", "garbage")
                    .set_body_string("<html></html>"),
            )
            .mount(&mock_server)
            .await;

        let renderer = HttpRenderer::new().unwrap();
        let pool = ContextPool::new(1);
        let url = format!("{}/login", mock_server.uri());
        let snapshot = renderer
            .render(&url, Duration::from_secs(5), pool.acquire().await.unwrap())
            .await
            .unwrap();

        let session = snapshot.cookies.iter().find(|c| c.name == "session").unwrap();
        assert_eq!(session.value, "abc");
        assert_eq!(session.path, "/app");
        assert_eq!(session.domain, "127.0.0.1");
        assert!(session.secure && session.http_only);

        let theme = snapshot.cookies.iter().find(|c| c.name == "theme").unwrap();
        assert_eq!(theme.domain, "example.com");
        assert_eq!(theme.path, "/");
        assert!(!theme.secure && !theme.http_only);

        assert!(snapshot.cookies.iter().all(|c| c.name != "garbage"));
        assert_eq!(pool.active(), 0);
    }

    #[tokio::test]
    async fn test_render_builds_snapshot_from_response() {
        let mock_server = MockServer::start().await;
        let body = r#"<html><head><title>Home</title>
            <script src="/static/app.js"></script></head>
            <body><div data-reactroot=""></div></body></html>"#;

        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/html")
                    .insert_header("Server", "nginx/1.25.3")
                    .insert_header("Set-Cookie", "sid=1; HttpOnly")
                    .set_body_string(body),
            )
            .mount(&mock_server)
            .await;

        let renderer = HttpRenderer::new().unwrap();
        let pool = ContextPool::new(1);
        let url = format!("{}/", mock_server.uri());
        let snapshot = renderer
            .render(&url, Duration::from_secs(5), pool.acquire().await.unwrap())
            .await
            .unwrap();

        assert_eq!(snapshot.url, url);
        assert_eq!(snapshot.title, "Home");
        assert_eq!(snapshot.scripts.len(), 1);
        assert_eq!(snapshot.cookies.len(), 1);
        assert_eq!(snapshot.requests.len(), 1);
        assert_eq!(snapshot.responses.len(), 1);

        let headers = snapshot.responses[0].headers.as_ref().unwrap();
        assert_eq!(headers.get("server").map(String::as_str), Some("nginx/1.25.3"));
        assert_eq!(snapshot.responses[0].status, 200);
    }

    #[tokio::test]
    async fn test_render_slow_server_times_out() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/slow"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("<html></html>")
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&mock_server)
            .await;

        let renderer = HttpRenderer::new().unwrap();
        let url = format!("{}/slow", mock_server.uri());
        let pool = ContextPool::new(1);
        let err = renderer
            .render(&url, Duration::from_millis(100), pool.acquire().await.unwrap())
            .await
            .unwrap_err();

        assert!(err.is_timeout(), "expected timeout, got {err}");
    }

    #[tokio::test]
    async fn test_render_unreachable_host_is_navigation_error() {
        let renderer = HttpRenderer::new().unwrap();
        let pool = ContextPool::new(1);
        // Port 9 on loopback is not expected to accept connections.
        let err = renderer
            .render("http://127.0.0.1:9/", Duration::from_secs(2), pool.acquire().await.unwrap())
            .await
            .unwrap_err();

        assert!(matches!(err, CaptureError::Navigation { .. }));
    }
}
