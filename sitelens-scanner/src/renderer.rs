use crate::chrome::ChromeRenderer;
use crate::error::Result;
use crate::http::HttpRenderer;
use crate::pool::ContextLease;
use crate::snapshot::RawPageSnapshot;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

/// A rendering capability: load `url` and harvest a [`RawPageSnapshot`].
///
/// Implementations own whatever per-call context they need (a browser tab,
/// an HTTP exchange). The `lease` is the pool slot for that context and must
/// be held until the context is gone, including work that outlives a dropped
/// future on a blocking thread.
pub trait Renderer: Send + Sync {
    fn render(
        &self,
        url: &str,
        timeout: Duration,
        lease: ContextLease,
    ) -> impl Future<Output = Result<RawPageSnapshot>> + Send;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    #[default]
    Chrome,
    Http,
}

impl EngineKind {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "chrome" | "chromium" | "headless" => Some(EngineKind::Chrome),
            "http" | "static" => Some(EngineKind::Http),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EngineKind::Chrome => "chrome",
            EngineKind::Http => "http",
        }
    }
}

/// Runtime choice between the bundled engines.
pub enum Engine {
    Chrome(ChromeRenderer),
    Http(HttpRenderer),
}

impl Engine {
    pub fn kind(&self) -> EngineKind {
        match self {
            Engine::Chrome(_) => EngineKind::Chrome,
            Engine::Http(_) => EngineKind::Http,
        }
    }
}

impl Renderer for Engine {
    async fn render(
        &self,
        url: &str,
        timeout: Duration,
        lease: ContextLease,
    ) -> Result<RawPageSnapshot> {
        match self {
            Engine::Chrome(renderer) => renderer.render(url, timeout, lease).await,
            Engine::Http(renderer) => renderer.render(url, timeout, lease).await,
        }
    }
}
