// Report assembly

use crate::classifier::{Finding, TechnologyFindings};
use crate::risk::{PerformanceFinding, RiskAssessment, SecurityHeaderAudit, VulnerabilityReport};
use crate::whois::WhoisOutcome;
use chrono::{SecondsFormat, Utc};
use serde::Serialize;

/// Final analysis output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub url: String,
    /// RFC 3339, UTC, millisecond precision.
    pub timestamp: String,
    pub technology: TechnologyBlock,
    pub vulnerabilities: VulnerabilityReport,
    pub whois: WhoisOutcome,
}

/// The nine classifier categories followed by the header audit and the
/// performance battery. Field order is the serialized key order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TechnologyBlock {
    pub frontend: Vec<Finding>,
    pub css: Vec<Finding>,
    pub build_tools: Vec<Finding>,
    pub backend: Vec<Finding>,
    pub cms: Vec<Finding>,
    pub cdn: Vec<Finding>,
    pub infrastructure: Vec<Finding>,
    pub analytics: Vec<Finding>,
    pub misc: Vec<Finding>,
    pub security: SecurityHeaderAudit,
    pub performance: Vec<PerformanceFinding>,
}

impl TechnologyBlock {
    pub const KEYS: [&'static str; 11] = [
        "frontend",
        "css",
        "buildTools",
        "backend",
        "cms",
        "cdn",
        "infrastructure",
        "analytics",
        "misc",
        "security",
        "performance",
    ];
}

/// Merge the stage outputs, stamping the current time.
pub fn assemble(
    url: &str,
    tech: TechnologyFindings,
    risk: RiskAssessment,
    whois: WhoisOutcome,
) -> Report {
    let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);

    let TechnologyFindings {
        frontend,
        css,
        build_tools,
        backend,
        cms,
        cdn,
        infrastructure,
        analytics,
        misc,
    } = tech;

    Report {
        url: url.to_string(),
        timestamp,
        technology: TechnologyBlock {
            frontend,
            css,
            build_tools,
            backend,
            cms,
            cdn,
            infrastructure,
            analytics,
            misc,
            security: risk.security,
            performance: risk.performance,
        },
        vulnerabilities: risk.vulnerabilities,
        whois,
    }
}

impl Report {
    pub fn to_json(&self, pretty: bool) -> serde_json::Result<String> {
        if pretty {
            serde_json::to_string_pretty(self)
        } else {
            serde_json::to_string(self)
        }
    }

    /// Number of technology findings across the nine categories.
    pub fn technology_count(&self) -> usize {
        let t = &self.technology;
        [
            &t.frontend,
            &t.css,
            &t.build_tools,
            &t.backend,
            &t.cms,
            &t.cdn,
            &t.infrastructure,
            &t.analytics,
            &t.misc,
        ]
        .iter()
        .map(|list| list.len())
        .sum()
    }
}
