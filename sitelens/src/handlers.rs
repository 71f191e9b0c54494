use anyhow::{Context, Result, bail};
use clap::ArgMatches;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use sitelens_core::config::AnalyzerConfig;
use sitelens_core::risk::RiskLevel;
use sitelens_core::whois::WhoisOutcome;
use sitelens_core::{Analyzer, Report, classify_snapshot};
use sitelens_scanner::{EngineKind, RawPageSnapshot};
use std::fs;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;
use url::Url;

const DEFAULT_LOG_FILTER: &str = "sitelens=info,sitelens_core=info,sitelens_scanner=info";

/// Log to stderr so JSON on stdout stays clean. `RUST_LOG` overrides the default filter.
pub fn init_logging(quiet: bool) {
    let default = if quiet { "warn" } else { DEFAULT_LOG_FILTER };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

pub fn print_banner() {
    eprintln!(
        "{} {}",
        "sitelens".bright_cyan().bold(),
        env!("CARGO_PKG_VERSION").bright_black()
    );
}

/// Trim `input` and prepend `https://` when no scheme is given. `None` unless
/// the result is an http(s) URL with a host.
pub fn normalize_url(input: &str) -> Option<String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }

    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    };

    let parsed = Url::parse(&candidate).ok()?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none_or(str::is_empty) {
        return None;
    }
    Some(parsed.to_string())
}

/// Config file (if any) with command-line overrides applied.
pub fn build_config(args: &ArgMatches) -> Result<AnalyzerConfig> {
    let path = args.get_one::<String>("config").map(String::as_str);
    let mut config = AnalyzerConfig::load_optional(path)?;

    if let Some(timeout) = args.get_one::<u64>("timeout") {
        config.capture.timeout_ms = *timeout;
    }
    if let Some(max) = args.get_one::<usize>("max-contexts") {
        config.capture.max_contexts = *max;
    }
    if let Some(engine) = args.get_one::<String>("engine") {
        config.capture.engine = EngineKind::from_str(engine)
            .with_context(|| format!("Unknown engine '{}'", engine))?;
    }
    if args.get_flag("no-whois") {
        config.whois.enabled = false;
    }

    config.validate()?;
    Ok(config)
}

fn spinner(message: &str) -> Result<ProgressBar> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}")?);
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner.set_message(message.to_string());
    Ok(spinner)
}

pub async fn handle_analyze(args: &ArgMatches) -> Result<()> {
    let quiet = args.get_flag("quiet");
    let raw_url = args.get_one::<String>("URL").context("URL is required")?;
    let Some(url) = normalize_url(raw_url) else {
        bail!("Invalid URL '{}'", raw_url);
    };

    let config = build_config(args)?;
    let analyzer = Analyzer::from_config(&config)?;

    let progress = if quiet {
        None
    } else {
        Some(spinner(&format!("Analyzing {}", url))?)
    };
    let outcome = analyzer.analyze(&url).await;
    if let Some(progress) = progress {
        progress.finish_and_clear();
    }
    let report = outcome?;

    if !quiet {
        print_summary(&report);
    }
    emit(
        &report,
        args.get_flag("pretty"),
        args.get_one::<PathBuf>("output"),
    )
}

pub fn handle_classify(args: &ArgMatches) -> Result<()> {
    let path = args
        .get_one::<PathBuf>("SNAPSHOT")
        .context("SNAPSHOT is required")?;
    let config = build_config(args)?;

    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read snapshot {}", path.display()))?;
    let snapshot: RawPageSnapshot = serde_json::from_str(&raw)
        .with_context(|| format!("Invalid snapshot {}", path.display()))?;

    info!(url = %snapshot.url, "Classifying saved snapshot");
    let report = classify_snapshot(&snapshot.url, &snapshot, &config.risk, WhoisOutcome::skipped());

    if !args.get_flag("quiet") {
        print_summary(&report);
    }
    emit(&report, args.get_flag("pretty"), None)
}

pub async fn handle_serve(args: &ArgMatches) -> Result<()> {
    let addr = *args
        .get_one::<SocketAddr>("bind")
        .context("bind address is required")?;
    let config = build_config(args)?;
    let analyzer = Arc::new(Analyzer::from_config(&config)?);

    if !args.get_flag("quiet") {
        eprintln!("{} Serving on http://{}", "→".blue(), addr);
    }
    crate::server::serve(analyzer, addr).await
}

fn emit(report: &Report, pretty: bool, output: Option<&PathBuf>) -> Result<()> {
    let json = report.to_json(pretty)?;
    match output {
        Some(path) => {
            fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
            eprintln!("{} Report written to {}", "✓".green().bold(), path.display());
        }
        None => println!("{}", json),
    }
    Ok(())
}

fn colored_level(level: RiskLevel) -> colored::ColoredString {
    match level {
        RiskLevel::Low => level.as_str().green().bold(),
        RiskLevel::Medium => level.as_str().yellow().bold(),
        RiskLevel::High => level.as_str().red().bold(),
        RiskLevel::Critical => level.as_str().bright_red().bold().underline(),
    }
}

/// Human summary on stderr.
pub fn print_summary(report: &Report) {
    let vulns = &report.vulnerabilities;
    let tech = &report.technology;

    eprintln!("{}", "═".repeat(60).bright_blue().bold());
    eprintln!("  {}", report.url.bright_white().bold());
    eprintln!("{}", "═".repeat(60).bright_blue().bold());

    eprintln!(
        "{} Risk score {} ({})",
        "→".blue(),
        vulns.risk_score.to_string().bold(),
        colored_level(vulns.risk_level)
    );

    let sections = [
        ("Frontend", &tech.frontend),
        ("CSS", &tech.css),
        ("Build tools", &tech.build_tools),
        ("Backend", &tech.backend),
        ("CMS", &tech.cms),
        ("CDN", &tech.cdn),
        ("Infrastructure", &tech.infrastructure),
        ("Analytics", &tech.analytics),
        ("Misc", &tech.misc),
    ];
    for (label, findings) in sections {
        if findings.is_empty() {
            continue;
        }
        let names: Vec<String> = findings
            .iter()
            .map(|f| match f.version.as_ref().and_then(|v| v.known()) {
                Some(version) => format!("{} {}", f.name, version),
                None => f.name.clone(),
            })
            .collect();
        eprintln!("  {:<15} {}", label.bright_black(), names.join(", "));
    }

    if !tech.security.missing.is_empty() {
        let missing: Vec<&str> = tech.security.missing.iter().map(|h| h.name.as_str()).collect();
        eprintln!("{} Missing headers: {}", "⚠".yellow().bold(), missing.join(", "));
    }
    for recommendation in &vulns.recommendations {
        eprintln!("  {} {}", "•".cyan(), recommendation);
    }

    match &report.whois {
        WhoisOutcome::Record(record) => {
            if let Some(registrar) = &record.registrar {
                eprintln!("{} Registrar: {}", "✓".green(), registrar);
            }
        }
        WhoisOutcome::Error { error } => {
            eprintln!("{} {}", "✗".bright_black(), error.bright_black())
        }
    }
    eprintln!();
}
