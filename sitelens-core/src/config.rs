// Analyzer configuration, loaded from an optional JSON file

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use sitelens_scanner::EngineKind;
use sitelens_scanner::http::DEFAULT_USER_AGENT;
use sitelens_scanner::whois::IANA_WHOIS;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    pub capture: CaptureConfig,
    pub risk: RiskConfig,
    pub whois: WhoisConfig,
}

impl AnalyzerConfig {
    /// Read and validate a config file. `~` in the path is expanded.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let expanded = shellexpand::tilde(path);
        let path = Path::new(expanded.as_ref());

        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: AnalyzerConfig =
            serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
                path: PathBuf::from(path),
                source,
            })?;

        config.validate()?;
        debug!(path = %path.display(), "Loaded analyzer config");
        Ok(config)
    }

    /// Defaults when no path is given.
    pub fn load_optional(path: Option<&str>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capture.timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout("capture"));
        }
        if self.whois.enabled && self.whois.timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout("whois"));
        }
        self.risk.thresholds.validate()?;
        for policy in &self.risk.headers {
            check_weight(&policy.name, policy.weight)?;
        }
        for (name, weight) in self.risk.adverse.named() {
            check_weight(name, weight)?;
        }
        Ok(())
    }
}

fn check_weight(name: &str, weight: u32) -> Result<(), ConfigError> {
    if weight > 100 {
        return Err(ConfigError::Weight {
            name: name.to_string(),
            weight,
        });
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub timeout_ms: u64,
    pub max_contexts: usize,
    /// Wait after the load event before harvesting (Chrome engine).
    pub settle_ms: u64,
    pub max_network_events: usize,
    /// Sent by the HTTP engine.
    pub user_agent: String,
    pub engine: EngineKind,
}

impl CaptureConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            max_contexts: 4,
            settle_ms: 500,
            max_network_events: 2000,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            engine: EngineKind::Chrome,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WhoisConfig {
    pub enabled: bool,
    pub timeout_ms: u64,
    pub bootstrap_server: String,
}

impl WhoisConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for WhoisConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_ms: 10_000,
            bootstrap_server: IANA_WHOIS.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    pub thresholds: Thresholds,
    /// Recognized security headers, audited in this order.
    pub headers: Vec<HeaderPolicy>,
    pub adverse: AdverseWeights,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            thresholds: Thresholds::default(),
            headers: default_header_policies(),
            adverse: AdverseWeights::default(),
        }
    }
}

/// Lower bounds of the Medium, High and Critical bands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    pub medium: u32,
    pub high: u32,
    pub critical: u32,
}

impl Thresholds {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let ordered = 1 <= self.medium && self.medium < self.high && self.high < self.critical;
        if !ordered || self.critical > 100 {
            return Err(ConfigError::Thresholds(format!(
                "expected 1 <= medium < high < critical <= 100, got {}/{}/{}",
                self.medium, self.high, self.critical
            )));
        }
        Ok(())
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            medium: 25,
            high: 50,
            critical: 75,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeaderPolicy {
    pub name: String,
    /// Only critical headers add to the score when missing.
    pub critical: bool,
    pub weight: u32,
    pub recommendation: String,
}

fn policy(name: &str, critical: bool, weight: u32, recommendation: &str) -> HeaderPolicy {
    HeaderPolicy {
        name: name.to_string(),
        critical,
        weight,
        recommendation: recommendation.to_string(),
    }
}

pub fn default_header_policies() -> Vec<HeaderPolicy> {
    vec![
        policy(
            "Strict-Transport-Security",
            true,
            20,
            "Add 'Strict-Transport-Security: max-age=31536000; includeSubDomains' to enforce HTTPS.",
        ),
        policy(
            "Content-Security-Policy",
            true,
            20,
            "Define a Content-Security-Policy restricting script, style and frame sources.",
        ),
        policy(
            "X-Frame-Options",
            true,
            15,
            "Add 'X-Frame-Options: DENY' or 'SAMEORIGIN' to prevent clickjacking.",
        ),
        policy(
            "X-Content-Type-Options",
            true,
            10,
            "Add 'X-Content-Type-Options: nosniff' to stop MIME type sniffing.",
        ),
        policy(
            "Referrer-Policy",
            false,
            0,
            "Set a Referrer-Policy such as 'strict-origin-when-cross-origin'.",
        ),
        policy(
            "Permissions-Policy",
            false,
            0,
            "Set a Permissions-Policy disabling browser features the site does not use.",
        ),
    ]
}

/// Weights of the non-header risk signals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdverseWeights {
    pub outdated_jquery: u32,
    pub legacy_angularjs: u32,
    pub outdated_bootstrap: u32,
    pub powered_by_disclosure: u32,
    pub insecure_transport: u32,
    pub insecure_cookies: u32,
}

impl AdverseWeights {
    fn named(&self) -> [(&'static str, u32); 6] {
        [
            ("outdated_jquery", self.outdated_jquery),
            ("legacy_angularjs", self.legacy_angularjs),
            ("outdated_bootstrap", self.outdated_bootstrap),
            ("powered_by_disclosure", self.powered_by_disclosure),
            ("insecure_transport", self.insecure_transport),
            ("insecure_cookies", self.insecure_cookies),
        ]
    }
}

impl Default for AdverseWeights {
    fn default() -> Self {
        Self {
            outdated_jquery: 15,
            legacy_angularjs: 15,
            outdated_bootstrap: 10,
            powered_by_disclosure: 5,
            insecure_transport: 15,
            insecure_cookies: 10,
        }
    }
}
