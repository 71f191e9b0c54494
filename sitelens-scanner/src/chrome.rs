use crate::error::{CaptureError, MalformedSignal, Result};
use crate::pool::ContextLease;
use crate::renderer::Renderer;
use crate::snapshot::{
    Cookie, RawPageSnapshot, RequestRecord, ResponseRecord, ScriptAsset, StyleAsset,
};
use headless_chrome::protocol::cdp::types::Event;
use headless_chrome::{Browser, LaunchOptions, Tab};
use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{Receiver, SyncSender, TrySendError, sync_channel};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};

const RESPONSE_HANDLER: &str = "sitelens";

/// Collects everything the classifier needs in a single round trip.
const HARVEST_JS: &str = r#"
(function() {
    const text = el => el.textContent || '';
    return JSON.stringify({
        title: document.title || '',
        scripts: Array.from(document.scripts).map(s => ({
            source: s.src || null,
            content: s.src ? null : text(s)
        })),
        external: Array.from(document.querySelectorAll('link[rel~="stylesheet"][href]')).map(l => l.href),
        inline: Array.from(document.querySelectorAll('style')).map(text),
        links: Array.from(document.querySelectorAll('a[href]')).map(a => a.href)
    });
})()
"#;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DomHarvest {
    title: String,
    scripts: Vec<ScriptAsset>,
    external: Vec<String>,
    inline: Vec<String>,
    links: Vec<String>,
}

/// Headless Chromium engine.
///
/// The browser process is launched on first use and shared by every capture;
/// each capture gets its own tab, which is closed when the capture ends.
pub struct ChromeRenderer {
    browser: Arc<BrowserSlot>,
    settle: Duration,
    max_network_events: usize,
}

impl ChromeRenderer {
    pub fn new() -> Self {
        Self {
            browser: Arc::new(BrowserSlot::default()),
            settle: Duration::from_millis(500),
            max_network_events: 2000,
        }
    }

    /// Extra wait after the load event for client-side rendering.
    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    pub fn with_max_network_events(mut self, max: usize) -> Self {
        self.max_network_events = max.max(1);
        self
    }
}

impl Default for ChromeRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer for ChromeRenderer {
    async fn render(
        &self,
        url: &str,
        timeout: Duration,
        lease: ContextLease,
    ) -> Result<RawPageSnapshot> {
        let cancelled = Arc::new(AtomicBool::new(false));
        let _cancel = CancelOnDrop(cancelled.clone());

        let slot = self.browser.clone();
        let url_owned = url.to_string();
        let settle = self.settle;
        let max_events = self.max_network_events;

        // Tab and lease live on the blocking thread. Locals drop in reverse
        // order, so the tab is closed before the pool slot is returned.
        tokio::task::spawn_blocking(move || {
            let _lease = lease;
            check_cancelled(&cancelled, &url_owned)?;
            let guard = TabGuard(slot.open_tab()?);
            capture_tab(&guard.0, &url_owned, timeout, settle, max_events, &cancelled)
        })
        .await?
    }
}

/// Lazily launched browser shared by all captures. Only touched from
/// blocking threads.
#[derive(Default)]
struct BrowserSlot(Mutex<Option<Arc<Browser>>>);

impl BrowserSlot {
    fn get(&self) -> Result<Arc<Browser>> {
        let mut slot = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(browser) = slot.as_ref() {
            return Ok(browser.clone());
        }

        info!("Launching headless browser");
        let browser = Arc::new(launch_browser()?);
        *slot = Some(browser.clone());
        Ok(browser)
    }

    /// Forget a browser whose connection has gone away, unless another
    /// capture already replaced it.
    fn discard(&self, stale: &Arc<Browser>) {
        let mut slot = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().is_some_and(|b| Arc::ptr_eq(b, stale)) {
            warn!("Discarding unresponsive browser");
            *slot = None;
        }
    }

    fn open_tab(&self) -> Result<Arc<Tab>> {
        let browser = self.get()?;
        match browser.new_tab() {
            Ok(tab) => Ok(tab),
            Err(e) => {
                debug!(error = %e, "Opening tab failed, relaunching browser");
                self.discard(&browser);
                self.get()?
                    .new_tab()
                    .map_err(|e| CaptureError::Engine(format!("Failed to open tab: {}", e)))
            }
        }
    }
}

fn launch_browser() -> Result<Browser> {
    let options = LaunchOptions::default_builder()
        .headless(true)
        .sandbox(false)
        .idle_browser_timeout(Duration::from_secs(600))
        .build()
        .map_err(|e| CaptureError::Engine(format!("Browser launch options error: {}", e)))?;

    Browser::new(options)
        .map_err(|e| CaptureError::Engine(format!("Failed to launch Chrome/Chromium: {}", e)))
}

/// Closes the tab however the blocking capture exits.
struct TabGuard(Arc<Tab>);

impl Drop for TabGuard {
    fn drop(&mut self) {
        if let Err(e) = self.0.close(false) {
            debug!(error = %e, "Tab close failed");
        }
    }
}

/// Flags the blocking capture to stop early when the render future is dropped.
struct CancelOnDrop(Arc<AtomicBool>);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

fn check_cancelled(cancelled: &AtomicBool, url: &str) -> Result<()> {
    if cancelled.load(Ordering::SeqCst) {
        return Err(CaptureError::navigation(url, "capture cancelled"));
    }
    Ok(())
}

fn capture_tab(
    tab: &Arc<Tab>,
    url: &str,
    timeout: Duration,
    settle: Duration,
    max_events: usize,
    cancelled: &AtomicBool,
) -> Result<RawPageSnapshot> {
    check_cancelled(cancelled, url)?;
    tab.set_default_timeout(timeout);

    let (log, sink) = NetworkLog::new(max_events);

    let response_sink = sink.clone();
    tab.register_response_handling(
        RESPONSE_HANDLER,
        Box::new(move |params, _body| match serde_json::to_value(&params) {
            Ok(value) => response_sink.push(NetworkEvent::Response(value)),
            Err(e) => debug!(error = %e, "Unserializable response event"),
        }),
    )
    .map_err(|e| CaptureError::Engine(format!("Failed to observe responses: {}", e)))?;

    let request_sink = sink.clone();
    tab.add_event_listener(Arc::new(move |event: &Event| {
        if let Event::NetworkRequestWillBeSent(e) = event {
            match serde_json::to_value(&e.params) {
                Ok(value) => request_sink.push(NetworkEvent::Request(value)),
                Err(err) => debug!(error = %err, "Unserializable request event"),
            }
        }
    }))
    .map_err(|e| CaptureError::Engine(format!("Failed to observe requests: {}", e)))?;

    check_cancelled(cancelled, url)?;
    tab.navigate_to(url)
        .map_err(|e| navigation_error(url, timeout, e))?;
    tab.wait_until_navigated()
        .map_err(|e| navigation_error(url, timeout, e))?;

    check_cancelled(cancelled, url)?;
    std::thread::sleep(settle);
    sink.close();
    check_cancelled(cancelled, url)?;

    let html = tab
        .get_content()
        .map_err(|e| CaptureError::Engine(format!("Failed to read rendered HTML: {}", e)))?;

    let harvest = tab
        .evaluate(HARVEST_JS, false)
        .ok()
        .and_then(|result| result.value)
        .and_then(|value| value.as_str().map(str::to_string))
        .and_then(|json| serde_json::from_str::<DomHarvest>(&json).ok())
        .unwrap_or_else(|| {
            debug!(url, "DOM harvest unavailable, continuing with HTML only");
            DomHarvest::default()
        });

    let cookies = match tab.get_cookies() {
        Ok(cookies) => cookies
            .into_iter()
            .map(|c| Cookie {
                name: c.name,
                value: c.value,
                domain: c.domain,
                path: c.path,
                secure: c.secure,
                http_only: c.http_only,
            })
            .collect(),
        Err(e) => {
            debug!(error = %e, "Cookie read failed");
            Vec::new()
        }
    };

    if let Err(e) = tab.deregister_response_handling(RESPONSE_HANDLER) {
        debug!(error = %e, "Response handler removal failed");
    }

    let (requests, responses) = log.drain();

    let mut snapshot = RawPageSnapshot::new(url);
    snapshot.html = html;
    snapshot.title = harvest.title;
    snapshot.scripts = harvest.scripts;
    snapshot.styles.external = harvest.external.into_iter().map(StyleAsset::external).collect();
    snapshot.styles.inline = harvest
        .inline
        .into_iter()
        .filter(|s| !s.trim().is_empty())
        .map(StyleAsset::inline)
        .collect();
    snapshot.links = harvest.links;
    snapshot.cookies = cookies;
    snapshot.requests = requests;
    snapshot.responses = responses;

    Ok(snapshot)
}

fn navigation_error(url: &str, timeout: Duration, e: impl std::fmt::Display) -> CaptureError {
    let reason = e.to_string();
    if reason.to_lowercase().contains("timed out") || reason.to_lowercase().contains("timeout") {
        CaptureError::Timeout {
            url: url.to_string(),
            timeout_ms: timeout.as_millis() as u64,
        }
    } else {
        CaptureError::navigation(url, reason)
    }
}

#[derive(Debug)]
enum NetworkEvent {
    Request(Value),
    Response(Value),
}

/// Producer half handed to browser event callbacks.
#[derive(Clone)]
struct NetworkSink {
    tx: SyncSender<NetworkEvent>,
    open: Arc<AtomicBool>,
    dropped: Arc<AtomicUsize>,
}

impl NetworkSink {
    fn push(&self, event: NetworkEvent) {
        if !self.open.load(Ordering::SeqCst) {
            return;
        }
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }

    /// Stop accepting events. Anything arriving afterwards is ignored.
    fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
    }
}

/// Bounded buffer of raw network events for one capture.
struct NetworkLog {
    rx: Receiver<NetworkEvent>,
    dropped: Arc<AtomicUsize>,
}

impl NetworkLog {
    fn new(capacity: usize) -> (Self, NetworkSink) {
        let (tx, rx) = sync_channel(capacity);
        let dropped = Arc::new(AtomicUsize::new(0));
        let sink = NetworkSink {
            tx,
            open: Arc::new(AtomicBool::new(true)),
            dropped: dropped.clone(),
        };
        (Self { rx, dropped }, sink)
    }

    /// Parse everything buffered so far. Responses inherit the method of the
    /// request with the same id, defaulting to GET.
    fn drain(self) -> (Vec<RequestRecord>, Vec<ResponseRecord>) {
        let mut requests = Vec::new();
        let mut responses = Vec::new();
        let mut methods: HashMap<String, String> = HashMap::new();

        for event in self.rx.try_iter() {
            match event {
                NetworkEvent::Request(value) => match parse_request_event(&value) {
                    Ok((id, record)) => {
                        if let Some(id) = id {
                            methods.insert(id, record.method.clone());
                        }
                        requests.push(record);
                    }
                    Err(e) => debug!("{}", e),
                },
                NetworkEvent::Response(value) => match parse_response_event(&value) {
                    Ok((id, record)) => responses.push((id, record)),
                    Err(e) => debug!("{}", e),
                },
            }
        }

        let dropped = self.dropped.load(Ordering::Relaxed);
        if dropped > 0 {
            debug!(dropped, "Network log full, events discarded");
        }

        let responses = responses
            .into_iter()
            .map(|(id, mut record)| {
                if let Some(method) = id.and_then(|id| methods.get(&id)) {
                    record.method = method.clone();
                }
                record
            })
            .collect();

        (requests, responses)
    }
}

fn request_id(params: &Value) -> Option<String> {
    params.get("requestId").and_then(Value::as_str).map(str::to_string)
}

/// `Network.requestWillBeSent` params to a request record.
fn parse_request_event(
    params: &Value,
) -> std::result::Result<(Option<String>, RequestRecord), MalformedSignal> {
    let request = params
        .get("request")
        .ok_or_else(|| MalformedSignal::new("request", "", "missing request object"))?;
    let url = request
        .get("url")
        .and_then(Value::as_str)
        .ok_or_else(|| MalformedSignal::new("request", "", "missing url"))?;

    let record = RequestRecord {
        url: url.to_string(),
        method: request
            .get("method")
            .and_then(Value::as_str)
            .unwrap_or("GET")
            .to_string(),
        resource_type: params
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or("Other")
            .to_string(),
    };
    Ok((request_id(params), record))
}

/// `Network.responseReceived` params to a response record. A response whose
/// header block is not an object keeps `headers: None`.
fn parse_response_event(
    params: &Value,
) -> std::result::Result<(Option<String>, ResponseRecord), MalformedSignal> {
    let response = params
        .get("response")
        .ok_or_else(|| MalformedSignal::new("response", "", "missing response object"))?;
    let url = response
        .get("url")
        .and_then(Value::as_str)
        .ok_or_else(|| MalformedSignal::new("response", "", "missing url"))?;

    let headers = response.get("headers").and_then(Value::as_object).map(|map| {
        map.iter()
            .map(|(k, v)| {
                let value = match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (k.clone(), value)
            })
            .collect::<BTreeMap<String, String>>()
    });

    let record = ResponseRecord {
        url: url.to_string(),
        status: response
            .get("status")
            .and_then(Value::as_f64)
            .map(|s| s as u16)
            .unwrap_or(0),
        headers,
        method: "GET".to_string(),
    };
    Ok((request_id(params), record))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_request_event() {
        let params = json!({
            "requestId": "42.1",
            "request": { "url": "https://example.com/api", "method": "POST", "headers": {} },
            "type": "XHR"
        });

        let (id, record) = parse_request_event(&params).unwrap();
        assert_eq!(id.as_deref(), Some("42.1"));
        assert_eq!(record.method, "POST");
        assert_eq!(record.resource_type, "XHR");
    }

    #[test]
    fn test_parse_request_event_without_request_is_malformed() {
        let err = parse_request_event(&json!({ "requestId": "1" })).unwrap_err();
        assert_eq!(err.kind, "request");
    }

    #[test]
    fn test_parse_response_event_keeps_headers() {
        let params = json!({
            "requestId": "7",
            "response": {
                "url": "https://example.com/",
                "status": 200,
                "headers": { "Server": "nginx", "Content-Length": 512 }
            }
        });

        let (_, record) = parse_response_event(&params).unwrap();
        let headers = record.headers.unwrap();
        assert_eq!(record.status, 200);
        assert_eq!(headers.get("Server").map(String::as_str), Some("nginx"));
        assert_eq!(headers.get("Content-Length").map(String::as_str), Some("512"));
    }

    #[test]
    fn test_parse_response_event_without_headers() {
        let params = json!({ "response": { "url": "https://example.com/", "status": 204 } });
        let (_, record) = parse_response_event(&params).unwrap();
        assert!(record.headers.is_none());
    }

    #[test]
    fn test_network_log_correlates_methods_and_skips_malformed() {
        let (log, sink) = NetworkLog::new(16);
        sink.push(NetworkEvent::Request(json!({
            "requestId": "1",
            "request": { "url": "https://example.com/form", "method": "POST" },
            "type": "Document"
        })));
        sink.push(NetworkEvent::Response(json!({ "requestId": "1" })));
        sink.push(NetworkEvent::Response(json!({
            "requestId": "1",
            "response": { "url": "https://example.com/form", "status": 302, "headers": {} }
        })));

        let (requests, responses) = log.drain();
        assert_eq!(requests.len(), 1);
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].method, "POST");
    }

    #[test]
    fn test_network_log_is_bounded_and_cut_off() {
        let (log, sink) = NetworkLog::new(2);
        for i in 0..5 {
            sink.push(NetworkEvent::Request(json!({
                "request": { "url": format!("https://example.com/{}", i), "method": "GET" }
            })));
        }
        sink.close();
        sink.push(NetworkEvent::Request(json!({
            "request": { "url": "https://example.com/late", "method": "GET" }
        })));

        let (requests, _) = log.drain();
        assert_eq!(requests.len(), 2);
        assert!(requests.iter().all(|r| !r.url.ends_with("late")));
    }

    #[test]
    fn test_harvest_payload_deserializes() {
        let payload = r#"{
            "title": "Hi",
            "scripts": [{"source": "https://cdn.example.com/vue.js", "content": null}, {"source": null, "content": "init()"}],
            "external": ["https://example.com/site.css"],
            "inline": [""],
            "links": ["https://example.com/a"]
        }"#;
        let harvest: DomHarvest = serde_json::from_str(payload).unwrap();
        assert_eq!(harvest.scripts.len(), 2);
        assert_eq!(harvest.scripts[1].content.as_deref(), Some("init()"));
        assert_eq!(harvest.external.len(), 1);
    }

    #[test]
    fn test_navigation_error_classifies_timeouts() {
        let err = navigation_error("https://example.com", Duration::from_secs(1), "The event waited for never came: timed out");
        assert!(err.is_timeout());
        let err = navigation_error("https://example.com", Duration::from_secs(1), "net::ERR_NAME_NOT_RESOLVED");
        assert!(matches!(err, CaptureError::Navigation { .. }));
    }
}
