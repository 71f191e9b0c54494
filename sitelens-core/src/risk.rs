// Risk scoring: header audit, adverse signals, performance battery

use crate::classifier::{Category, TechnologyFindings, Version};
use crate::config::{AdverseWeights, HeaderPolicy, RiskConfig, Thresholds};
use crate::signals::Signals;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, info};
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "Low",
            RiskLevel::Medium => "Medium",
            RiskLevel::High => "High",
            RiskLevel::Critical => "Critical",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Thresholds {
    pub fn level(&self, score: u8) -> RiskLevel {
        let score = u32::from(score);
        if score >= self.critical {
            RiskLevel::Critical
        } else if score >= self.high {
            RiskLevel::High
        } else if score >= self.medium {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HeaderState {
    Present,
    Missing,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HeaderStatus {
    pub name: String,
    pub status: HeaderState,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HeaderCounts {
    pub present: usize,
    pub missing: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SecurityHeaderAudit {
    pub present: Vec<HeaderStatus>,
    pub missing: Vec<HeaderStatus>,
    pub counts: HeaderCounts,
}

impl SecurityHeaderAudit {
    pub fn is_missing(&self, name: &str) -> bool {
        self.missing.iter().any(|h| h.name.eq_ignore_ascii_case(name))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PerformanceFinding {
    pub name: String,
    pub version: Version,
    pub signals: Vec<String>,
}

impl PerformanceFinding {
    fn new(name: &str, signals: Vec<String>) -> Self {
        Self {
            name: name.to_string(),
            version: Version::Detected,
            signals,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CategoryScore {
    pub findings: Vec<String>,
    pub contribution: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VulnerabilityReport {
    pub risk_score: u8,
    pub risk_level: RiskLevel,
    pub recommendations: Vec<String>,
    pub categories: BTreeMap<String, CategoryScore>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskAssessment {
    pub security: SecurityHeaderAudit,
    pub performance: Vec<PerformanceFinding>,
    pub vulnerabilities: VulnerabilityReport,
}

/// Groups under which contributions are reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiskCategory {
    Headers,
    Technology,
    Transport,
    Cookies,
}

impl RiskCategory {
    pub const ALL: [RiskCategory; 4] = [
        RiskCategory::Headers,
        RiskCategory::Technology,
        RiskCategory::Transport,
        RiskCategory::Cookies,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskCategory::Headers => "headers",
            RiskCategory::Technology => "technology",
            RiskCategory::Transport => "transport",
            RiskCategory::Cookies => "cookies",
        }
    }
}

/// One weighted contribution to the score.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RiskSignal {
    pub category: RiskCategory,
    pub finding: String,
    pub weight: u32,
    pub recommendation: String,
}

const REC_JQUERY: &str = "Upgrade jQuery to 3.5.0 or later to fix known XSS vulnerabilities.";
const REC_ANGULARJS: &str = "Migrate off AngularJS 1.x, which no longer receives security fixes.";
const REC_BOOTSTRAP: &str =
    "Upgrade Bootstrap to 3.4.1, 4.3.1 or later to fix known XSS vulnerabilities.";
const REC_POWERED_BY: &str = "Remove the X-Powered-By header to avoid disclosing server software.";
const REC_TRANSPORT: &str = "Serve the site over HTTPS and redirect all HTTP traffic to HTTPS.";
const REC_COOKIES: &str = "Mark session cookies as Secure and HttpOnly.";

/// Audit, score and summarize. Pure.
pub fn score(signals: &Signals, tech: &TechnologyFindings, config: &RiskConfig) -> RiskAssessment {
    let security = audit_headers(signals, &config.headers);
    let performance = performance_findings(signals);

    let mut risk_signals = header_signals(&security, &config.headers);
    risk_signals.extend(adverse_signals(signals, tech, &config.adverse));

    let vulnerabilities = summarize(&risk_signals, &config.thresholds);
    info!(
        risk_score = vulnerabilities.risk_score,
        risk_level = %vulnerabilities.risk_level,
        missing_headers = security.counts.missing,
        "Risk scoring complete"
    );

    RiskAssessment {
        security,
        performance,
        vulnerabilities,
    }
}

/// Presence check of every recognized header against the main document.
pub fn audit_headers(signals: &Signals, policies: &[HeaderPolicy]) -> SecurityHeaderAudit {
    let mut audit = SecurityHeaderAudit::default();
    for policy in policies {
        let present = signals
            .header(&policy.name)
            .is_some_and(|v| !v.trim().is_empty());
        let status = HeaderStatus {
            name: policy.name.clone(),
            status: if present {
                HeaderState::Present
            } else {
                HeaderState::Missing
            },
        };
        if present {
            audit.present.push(status);
        } else {
            audit.missing.push(status);
        }
    }
    audit.counts = HeaderCounts {
        present: audit.present.len(),
        missing: audit.missing.len(),
    };
    audit
}

fn header_signals(audit: &SecurityHeaderAudit, policies: &[HeaderPolicy]) -> Vec<RiskSignal> {
    policies
        .iter()
        .filter(|p| p.critical && audit.is_missing(&p.name))
        .map(|p| RiskSignal {
            category: RiskCategory::Headers,
            finding: format!("Missing {}", p.name),
            weight: p.weight,
            recommendation: p.recommendation.clone(),
        })
        .collect()
}

/// Non-header risk signals in fixed order.
pub fn adverse_signals(
    signals: &Signals,
    tech: &TechnologyFindings,
    weights: &AdverseWeights,
) -> Vec<RiskSignal> {
    let mut found = Vec::new();

    if let Some(version) = known_version(tech, "jQuery")
        && version_lt(version, "3.5.0")
    {
        found.push(RiskSignal {
            category: RiskCategory::Technology,
            finding: format!("Outdated jQuery {}", version),
            weight: weights.outdated_jquery,
            recommendation: REC_JQUERY.to_string(),
        });
    }

    if let Some(angularjs) = tech.find(Category::Frontend, "AngularJS") {
        let label = match angularjs.version.as_ref().and_then(Version::known) {
            Some(v) => format!("Legacy AngularJS {}", v),
            None => "Legacy AngularJS 1.x".to_string(),
        };
        found.push(RiskSignal {
            category: RiskCategory::Technology,
            finding: label,
            weight: weights.legacy_angularjs,
            recommendation: REC_ANGULARJS.to_string(),
        });
    }

    if let Some(version) = tech
        .find(Category::Css, "Bootstrap")
        .and_then(|f| f.version.as_ref())
        .and_then(Version::known)
        && bootstrap_outdated(version)
    {
        found.push(RiskSignal {
            category: RiskCategory::Technology,
            finding: format!("Outdated Bootstrap {}", version),
            weight: weights.outdated_bootstrap,
            recommendation: REC_BOOTSTRAP.to_string(),
        });
    }

    if let Some(powered_by) = signals.header("x-powered-by")
        && !powered_by.trim().is_empty()
    {
        found.push(RiskSignal {
            category: RiskCategory::Headers,
            finding: format!("X-Powered-By discloses {}", powered_by.trim()),
            weight: weights.powered_by_disclosure,
            recommendation: REC_POWERED_BY.to_string(),
        });
    }

    if is_insecure_transport(&signals.url) {
        found.push(RiskSignal {
            category: RiskCategory::Transport,
            finding: "Page served over plain HTTP".to_string(),
            weight: weights.insecure_transport,
            recommendation: REC_TRANSPORT.to_string(),
        });
    }

    if signals.is_https() {
        let weak: Vec<&str> = signals
            .cookies
            .iter()
            .filter(|c| is_session_cookie(&c.name) && !(c.secure && c.http_only))
            .map(|c| c.name.as_str())
            .collect();
        if !weak.is_empty() {
            found.push(RiskSignal {
                category: RiskCategory::Cookies,
                finding: format!("Session cookies without Secure/HttpOnly: {}", weak.join(", ")),
                weight: weights.insecure_cookies,
                recommendation: REC_COOKIES.to_string(),
            });
        }
    }

    for signal in &found {
        debug!(finding = %signal.finding, weight = signal.weight, "Adverse signal");
    }
    found
}

/// Sum of clamped weights, clamped to 0..=100, plus the per-category breakdown.
pub fn summarize(signals: &[RiskSignal], thresholds: &Thresholds) -> VulnerabilityReport {
    let mut categories: BTreeMap<String, CategoryScore> = RiskCategory::ALL
        .iter()
        .map(|c| (c.as_str().to_string(), CategoryScore::default()))
        .collect();

    let mut total: u32 = 0;
    let mut recommendations: Vec<String> = Vec::new();

    for signal in signals {
        let weight = signal.weight.min(100);
        total = total.saturating_add(weight);

        let entry = categories.entry(signal.category.as_str().to_string()).or_default();
        entry.findings.push(signal.finding.clone());
        entry.contribution = entry.contribution.saturating_add(weight);

        if !signal.recommendation.is_empty() && !recommendations.contains(&signal.recommendation) {
            recommendations.push(signal.recommendation.clone());
        }
    }

    let risk_score = total.min(100) as u8;
    debug_assert!(risk_score <= 100);

    VulnerabilityReport {
        risk_score,
        risk_level: thresholds.level(risk_score),
        recommendations,
        categories,
    }
}

fn known_version<'a>(tech: &'a TechnologyFindings, name: &str) -> Option<&'a str> {
    tech.find(Category::Frontend, name)
        .and_then(|f| f.version.as_ref())
        .and_then(Version::known)
}

fn is_insecure_transport(url: &str) -> bool {
    let Ok(parsed) = Url::parse(url) else {
        return false;
    };
    if parsed.scheme() != "http" {
        return false;
    }
    match parsed.host_str() {
        Some(host) => !host.starts_with("127.") && host != "localhost" && host != "[::1]",
        None => false,
    }
}

fn is_session_cookie(name: &str) -> bool {
    let lower = name.to_lowercase();
    ["sess", "sid", "auth", "token", "jwt", "remember"]
        .iter()
        .any(|marker| lower.contains(marker))
}

/// Dotted numeric version. `None` when any component is not a number.
pub fn parse_version(version: &str) -> Option<Vec<u32>> {
    let parts: Option<Vec<u32>> = version
        .trim()
        .trim_start_matches('v')
        .split('.')
        .map(|p| p.parse().ok())
        .collect();
    parts.filter(|p| !p.is_empty())
}

/// `a < b` for dotted versions; missing components count as zero.
pub fn version_lt(a: &str, b: &str) -> bool {
    match (parse_version(a), parse_version(b)) {
        (Some(a), Some(b)) => compare_versions(&a, &b) == Ordering::Less,
        _ => false,
    }
}

fn compare_versions(a: &[u32], b: &[u32]) -> Ordering {
    let len = a.len().max(b.len());
    for i in 0..len {
        let x = a.get(i).copied().unwrap_or(0);
        let y = b.get(i).copied().unwrap_or(0);
        match x.cmp(&y) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

fn bootstrap_outdated(version: &str) -> bool {
    match parse_version(version) {
        Some(parts) if parts.first() == Some(&4) => version_lt(version, "4.3.1"),
        Some(_) => version_lt(version, "3.4.1"),
        None => false,
    }
}

static RE_RESOURCE_HINT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)<link[^>]+rel=["']?(preload|prefetch|preconnect|dns-prefetch|modulepreload)\b"#)
        .unwrap()
});
static RE_LAZY_MEDIA: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)<(img|iframe|video)[^>]+loading=["']?lazy"#).unwrap());
static RE_ASYNC_SCRIPT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<script\b[^>]*\s(async|defer)\b").unwrap());
static RE_SERVICE_WORKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"serviceWorker\.register").unwrap());

/// Small battery of performance practices. A finding only appears when
/// evidence for it was found.
pub fn performance_findings(signals: &Signals) -> Vec<PerformanceFinding> {
    let mut findings = Vec::new();

    if let Some(encoding) = signals.header("content-encoding") {
        let encoding = encoding.to_lowercase();
        if ["gzip", "br", "deflate", "zstd"].iter().any(|e| encoding.contains(e)) {
            findings.push(PerformanceFinding::new(
                "Compression",
                vec![format!("content-encoding: {}", encoding)],
            ));
        }
    }

    let mut caching = Vec::new();
    if let Some(cache_control) = signals.header("cache-control") {
        let lower = cache_control.to_lowercase();
        let cacheable = !lower.contains("no-store")
            && (lower.contains("immutable")
                || lower.contains("public")
                || has_positive_max_age(&lower));
        if cacheable {
            caching.push(format!("cache-control: {}", cache_control));
        }
    }
    for validator in ["etag", "last-modified", "expires"] {
        if signals.has_header(validator) {
            caching.push(format!("{} header", validator));
        }
    }
    if !caching.is_empty() {
        findings.push(PerformanceFinding::new("Browser Caching", caching));
    }

    let mut hints: Vec<String> = RE_RESOURCE_HINT
        .captures_iter(&signals.html)
        .filter_map(|c| c.get(1).map(|m| m.as_str().to_lowercase()))
        .collect();
    hints.sort();
    hints.dedup();
    if !hints.is_empty() {
        findings.push(PerformanceFinding::new(
            "Resource Hints",
            hints.into_iter().map(|h| format!("rel={}", h)).collect(),
        ));
    }

    let lazy = RE_LAZY_MEDIA.find_iter(&signals.html).count();
    if lazy > 0 {
        findings.push(PerformanceFinding::new(
            "Lazy Loading",
            vec![format!("{} element(s) with loading=lazy", lazy)],
        ));
    }

    let deferred = RE_ASYNC_SCRIPT.find_iter(&signals.html).count();
    if deferred > 0 {
        findings.push(PerformanceFinding::new(
            "Async/Deferred Scripts",
            vec![format!("{} script(s) with async or defer", deferred)],
        ));
    }

    let minified: Vec<String> = signals
        .scripts
        .iter()
        .filter_map(|s| s.source.as_deref())
        .chain(signals.styles.iter().filter_map(|s| s.href.as_deref()))
        .filter(|src| is_minified(src))
        .map(str::to_string)
        .collect();
    if !minified.is_empty() {
        findings.push(PerformanceFinding::new("Minified Assets", minified));
    }

    let registers_worker = RE_SERVICE_WORKER.is_match(&signals.html)
        || signals.js_texts().any(|t| RE_SERVICE_WORKER.is_match(t));
    if registers_worker {
        findings.push(PerformanceFinding::new(
            "Service Worker",
            vec!["navigator.serviceWorker.register".to_string()],
        ));
    }

    findings
}

fn has_positive_max_age(cache_control: &str) -> bool {
    cache_control
        .split(',')
        .filter_map(|d| d.trim().strip_prefix("max-age="))
        .filter_map(|v| v.trim().parse::<u64>().ok())
        .any(|age| age > 0)
}

fn is_minified(url: &str) -> bool {
    let path = url.split(['?', '#']).next().unwrap_or(url).to_lowercase();
    path.ends_with(".min.js") || path.ends_with(".min.css")
}
