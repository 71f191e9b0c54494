// Analysis pipeline: capture, extract, classify, score, assemble

use crate::classifier::detect_all;
use crate::config::{AnalyzerConfig, RiskConfig};
use crate::error::{AnalysisError, Result};
use crate::report::{Report, assemble};
use crate::risk::score;
use crate::signals::extract;
use crate::whois::WhoisOutcome;
use sitelens_scanner::{
    ChromeRenderer, ContextPool, Engine, EngineKind, HttpRenderer, PageCapture, RawPageSnapshot,
    RegistryLookup, Renderer, WhoisClient,
};
use tracing::{debug, info, warn};
use url::Url;

pub struct Analyzer<R, L> {
    capture: PageCapture<R>,
    registry: Option<L>,
    risk: RiskConfig,
}

impl Analyzer<Engine, WhoisClient> {
    /// Bundled engine and WHOIS client, configured from `config`.
    pub fn from_config(config: &AnalyzerConfig) -> Result<Self> {
        let capture_config = &config.capture;
        let engine = match capture_config.engine {
            EngineKind::Chrome => Engine::Chrome(
                ChromeRenderer::new()
                    .with_settle(capture_config.settle())
                    .with_max_network_events(capture_config.max_network_events),
            ),
            EngineKind::Http => {
                Engine::Http(HttpRenderer::with_user_agent(&capture_config.user_agent)?)
            }
        };

        let capture = PageCapture::new(engine)
            .with_timeout(capture_config.timeout())
            .with_pool(ContextPool::new(capture_config.max_contexts));

        let registry = config.whois.enabled.then(|| {
            WhoisClient::new()
                .with_bootstrap(config.whois.bootstrap_server.clone())
                .with_timeout(config.whois.timeout())
        });

        info!(
            engine = capture_config.engine.as_str(),
            max_contexts = capture_config.max_contexts,
            whois = config.whois.enabled,
            "Analyzer configured"
        );
        Ok(Self::new(capture, registry, config.risk.clone()))
    }
}

impl<R: Renderer, L: RegistryLookup> Analyzer<R, L> {
    pub fn new(capture: PageCapture<R>, registry: Option<L>, risk: RiskConfig) -> Self {
        Self {
            capture,
            registry,
            risk,
        }
    }

    pub fn capture(&self) -> &PageCapture<R> {
        &self.capture
    }

    /// Run the whole pipeline for `url`. Only capture failures are fatal;
    /// a failed registry lookup is embedded in the report.
    pub async fn analyze(&self, url: &str) -> Result<Report> {
        let parsed =
            Url::parse(url).map_err(|e| AnalysisError::InvalidUrl(format!("{}: {}", url, e)))?;
        let host = parsed
            .host_str()
            .ok_or_else(|| AnalysisError::InvalidUrl(format!("{}: missing host", url)))?
            .to_string();

        info!(url = %url, "Starting analysis");
        let snapshot = self.capture.capture(url).await?;
        let whois = self.lookup(&host).await;

        let report = classify_snapshot(url, &snapshot, &self.risk, whois);
        info!(
            url = %url,
            technologies = report.technology_count(),
            risk_score = report.vulnerabilities.risk_score,
            "Analysis complete"
        );
        Ok(report)
    }

    async fn lookup(&self, host: &str) -> WhoisOutcome {
        let Some(registry) = &self.registry else {
            return WhoisOutcome::skipped();
        };

        match registry.lookup(host).await {
            Ok(record) => {
                debug!(
                    host = %host,
                    server = %record.server,
                    fields = record.fields.len(),
                    "WHOIS record received"
                );
                WhoisOutcome::from(&record)
            }
            Err(e) => {
                warn!(host = %host, error = %e, "WHOIS lookup failed");
                WhoisOutcome::failed()
            }
        }
    }
}

/// Pure stages over an already captured snapshot.
pub fn classify_snapshot(
    url: &str,
    snapshot: &RawPageSnapshot,
    risk: &RiskConfig,
    whois: WhoisOutcome,
) -> Report {
    let signals = extract(snapshot);
    if signals.skipped_responses > 0 {
        debug!(skipped = signals.skipped_responses, "Skipped malformed responses");
    }
    let tech = detect_all(&signals);
    let assessment = score(&signals, &tech, risk);
    assemble(url, tech, assessment, whois)
}
