use crate::error::{CaptureError, Result};
use crate::pool::ContextPool;
use crate::renderer::Renderer;
use crate::snapshot::RawPageSnapshot;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use url::Url;

/// The capture stage: one bounded, pooled render per call.
pub struct PageCapture<R> {
    renderer: R,
    pool: ContextPool,
    timeout: Duration,
}

impl<R: Renderer> PageCapture<R> {
    pub fn new(renderer: R) -> Self {
        Self {
            renderer,
            pool: ContextPool::default(),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_pool(mut self, pool: ContextPool) -> Self {
        self.pool = pool;
        self
    }

    pub fn pool(&self) -> &ContextPool {
        &self.pool
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Render `url` inside a pooled context.
    ///
    /// The lease moves into the renderer and is returned to the pool when the
    /// renderer lets go of its context: at the end of the render future, or
    /// later if the engine is still tearing a context down on another thread.
    /// A timeout discards whatever was collected.
    pub async fn capture(&self, url: &str) -> Result<RawPageSnapshot> {
        let parsed =
            Url::parse(url).map_err(|e| CaptureError::InvalidUrl(format!("{}: {}", url, e)))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(CaptureError::InvalidUrl(format!(
                "{}: unsupported scheme '{}'",
                url,
                parsed.scheme()
            )));
        }

        let lease = self.pool.acquire().await?;
        let start = Instant::now();
        let render = self.renderer.render(url, self.timeout, lease);
        let outcome = tokio::time::timeout(self.timeout, render).await;

        match outcome {
            Ok(Ok(snapshot)) => {
                info!(
                    url,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    scripts = snapshot.scripts.len(),
                    responses = snapshot.responses.len(),
                    requests = snapshot.requests.len(),
                    "Capture complete"
                );
                Ok(snapshot)
            }
            Ok(Err(e)) => {
                warn!(url, error = %e, "Capture failed");
                Err(e)
            }
            Err(_) => {
                warn!(url, timeout_ms = self.timeout.as_millis() as u64, "Capture timed out");
                Err(CaptureError::Timeout {
                    url: url.to_string(),
                    timeout_ms: self.timeout.as_millis() as u64,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::ContextLease;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StaticRenderer;

    impl Renderer for StaticRenderer {
        async fn render(
            &self,
            url: &str,
            _timeout: Duration,
            _lease: ContextLease,
        ) -> Result<RawPageSnapshot> {
            let mut snapshot = RawPageSnapshot::new(url);
            snapshot.html = "<html><body>ok</body></html>".to_string();
            Ok(snapshot)
        }
    }

    /// Never finishes; counts how many render futures were dropped.
    struct HangingRenderer {
        dropped: Arc<AtomicUsize>,
    }

    struct DropCounter(Arc<AtomicUsize>);

    impl Drop for DropCounter {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl Renderer for HangingRenderer {
        async fn render(
            &self,
            _url: &str,
            _timeout: Duration,
            _lease: ContextLease,
        ) -> Result<RawPageSnapshot> {
            let _guard = DropCounter(self.dropped.clone());
            std::future::pending::<()>().await;
            unreachable!()
        }
    }

    /// Keeps its context busy on a blocking thread that ignores cancellation.
    struct BlockingRenderer {
        work: Duration,
    }

    impl Renderer for BlockingRenderer {
        async fn render(
            &self,
            url: &str,
            _timeout: Duration,
            lease: ContextLease,
        ) -> Result<RawPageSnapshot> {
            let work = self.work;
            let url = url.to_string();
            tokio::task::spawn_blocking(move || {
                let _lease = lease;
                std::thread::sleep(work);
                Ok(RawPageSnapshot::new(url))
            })
            .await?
        }
    }

    struct FailingRenderer;

    impl Renderer for FailingRenderer {
        async fn render(
            &self,
            url: &str,
            _timeout: Duration,
            _lease: ContextLease,
        ) -> Result<RawPageSnapshot> {
            Err(CaptureError::navigation(url, "connection refused"))
        }
    }

    #[tokio::test]
    async fn test_capture_returns_snapshot_and_releases_context() {
        let capture = PageCapture::new(StaticRenderer).with_pool(ContextPool::new(1));
        let snapshot = capture.capture("https://example.com/").await.unwrap();

        assert_eq!(snapshot.url, "https://example.com/");
        assert_eq!(capture.pool().active(), 0);
    }

    #[tokio::test]
    async fn test_capture_rejects_invalid_url() {
        let capture = PageCapture::new(StaticRenderer);
        let err = capture.capture("not a url").await.unwrap_err();
        assert!(matches!(err, CaptureError::InvalidUrl(_)));
    }

    #[tokio::test]
    async fn test_capture_rejects_non_http_scheme() {
        let capture = PageCapture::new(StaticRenderer);
        let err = capture.capture("ftp://example.com/").await.unwrap_err();
        assert!(matches!(err, CaptureError::InvalidUrl(_)));
    }

    #[tokio::test]
    async fn test_timeout_releases_context_and_drops_render() {
        let dropped = Arc::new(AtomicUsize::new(0));
        let capture = PageCapture::new(HangingRenderer { dropped: dropped.clone() })
            .with_pool(ContextPool::new(1))
            .with_timeout(Duration::from_millis(50));

        let err = capture.capture("https://example.com/").await.unwrap_err();

        assert!(err.is_timeout());
        assert_eq!(capture.pool().active(), 0);
        assert_eq!(dropped.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_navigation_failure_releases_context() {
        let capture = PageCapture::new(FailingRenderer).with_pool(ContextPool::new(1));
        let err = capture.capture("https://example.com/").await.unwrap_err();

        assert!(matches!(err, CaptureError::Navigation { .. }));
        assert_eq!(capture.pool().active(), 0);
    }

    #[tokio::test]
    async fn test_cancellation_releases_context() {
        let dropped = Arc::new(AtomicUsize::new(0));
        let capture = PageCapture::new(HangingRenderer { dropped: dropped.clone() })
            .with_pool(ContextPool::new(1))
            .with_timeout(Duration::from_secs(60));

        // Caller gives up long before the capture timeout.
        let cancelled =
            tokio::time::timeout(Duration::from_millis(50), capture.capture("https://example.com/")).await;

        assert!(cancelled.is_err());
        assert_eq!(capture.pool().active(), 0);
        assert_eq!(dropped.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_timeout_holds_context_until_blocking_work_ends() {
        let capture = PageCapture::new(BlockingRenderer {
            work: Duration::from_millis(300),
        })
        .with_pool(ContextPool::new(1))
        .with_timeout(Duration::from_millis(30));

        let err = capture.capture("https://example.com/").await.unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(capture.pool().active(), 1);

        // A second capture cannot start while the first context is alive.
        let queued =
            tokio::time::timeout(Duration::from_millis(50), capture.pool().acquire()).await;
        assert!(queued.is_err());

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(capture.pool().active(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_captures_never_exceed_pool() {
        let capture = Arc::new(PageCapture::new(StaticRenderer).with_pool(ContextPool::new(2)));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let capture = capture.clone();
                tokio::spawn(async move {
                    let url = format!("https://example.com/{}", i);
                    let result = capture.capture(&url).await;
                    assert!(capture.pool().active() <= 2);
                    result
                })
            })
            .collect();

        for result in futures::future::join_all(handles).await {
            assert!(result.unwrap().is_ok());
        }
        assert_eq!(capture.pool().active(), 0);
    }
}
