pub mod analyze;
pub mod classifier;
pub mod config;
pub mod error;
pub mod report;
pub mod risk;
pub mod signals;
pub mod whois;

pub use analyze::{Analyzer, classify_snapshot};
pub use classifier::{Category, Finding, TechnologyFindings, Version, detect_all};
pub use config::AnalyzerConfig;
pub use error::{AnalysisError, ConfigError};
pub use report::Report;
pub use risk::{RiskAssessment, RiskLevel, VulnerabilityReport};
pub use signals::{Signals, extract};
pub use whois::{WhoisOutcome, WhoisRecord};
