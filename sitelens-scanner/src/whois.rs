use crate::error::LookupError;
use std::future::Future;
use std::net::IpAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

pub const IANA_WHOIS: &str = "whois.iana.org";
pub const WHOIS_PORT: u16 = 43;

/// Upper bound on a single registry answer.
const MAX_RESPONSE_BYTES: u64 = 256 * 1024;

/// Longer "keys" are prose lines that happen to contain a colon.
const MAX_KEY_LEN: usize = 48;

/// Keys a registry answers with when it actually holds the domain.
/// "No match" answers carry only notice and terms-of-use lines.
const REGISTRY_KEYS: &[&str] = &[
    "Domain Name",
    "Registrar",
    "Registry Domain ID",
    "Creation Date",
    "Created Date",
    "Registry Expiry Date",
    "Expiry Date",
    "Domain Status",
    "Name Server",
];

/// Key/value lines from one registry answer, in the order they appeared.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRegistryRecord {
    pub server: String,
    pub fields: Vec<(String, String)>,
}

impl RawRegistryRecord {
    /// First value for `key`, compared case-insensitively.
    pub fn first(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// Every value for `key`, in order.
    pub fn values(&self, key: &str) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Whether any line is a known registration field.
    pub fn has_registry_data(&self) -> bool {
        self.fields
            .iter()
            .any(|(k, _)| REGISTRY_KEYS.iter().any(|known| k.eq_ignore_ascii_case(known)))
    }
}

/// Source of domain registration data.
pub trait RegistryLookup: Send + Sync {
    fn lookup(
        &self,
        hostname: &str,
    ) -> impl Future<Output = Result<RawRegistryRecord, LookupError>> + Send;
}

/// Port-43 WHOIS client following the IANA referral for the TLD.
#[derive(Debug, Clone)]
pub struct WhoisClient {
    bootstrap: String,
    port: u16,
    timeout: Duration,
}

impl WhoisClient {
    pub fn new() -> Self {
        Self {
            bootstrap: IANA_WHOIS.to_string(),
            port: WHOIS_PORT,
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_bootstrap(mut self, server: impl Into<String>) -> Self {
        self.bootstrap = server.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn query(&self, server: &str, query: &str) -> Result<String, LookupError> {
        let exchange = async {
            let mut stream = TcpStream::connect((server, self.port)).await?;
            stream.write_all(format!("{}\r\n", query).as_bytes()).await?;

            let mut raw = Vec::new();
            stream.take(MAX_RESPONSE_BYTES).read_to_end(&mut raw).await?;
            Ok::<_, std::io::Error>(String::from_utf8_lossy(&raw).into_owned())
        };

        tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| LookupError::Timeout(self.timeout.as_millis() as u64))?
            .map_err(LookupError::from)
    }
}

impl Default for WhoisClient {
    fn default() -> Self {
        Self::new()
    }
}

impl RegistryLookup for WhoisClient {
    async fn lookup(&self, hostname: &str) -> Result<RawRegistryRecord, LookupError> {
        let domain = registrable_host(hostname)?;
        let tld = domain.rsplit('.').next().unwrap_or(&domain).to_string();

        debug!(server = %self.bootstrap, tld = %tld, "Querying WHOIS bootstrap");
        let bootstrap_answer = self.query(&self.bootstrap, &tld).await?;

        let server = parse_referral(&bootstrap_answer).unwrap_or_else(|| self.bootstrap.clone());
        debug!(server = %server, domain = %domain, "Querying WHOIS registry");
        let answer = self.query(&server, &domain).await?;

        let record = RawRegistryRecord {
            server,
            fields: parse_fields(&answer),
        };
        if !record.has_registry_data() {
            debug!(
                domain = %domain,
                lines = record.fields.len(),
                "Registry answer has no registration fields"
            );
            return Err(LookupError::Empty(domain));
        }
        Ok(record)
    }
}

/// Registrable domain to query: the public suffix plus one label, lower-cased.
pub fn registrable_host(hostname: &str) -> Result<String, LookupError> {
    let host = hostname.trim().trim_end_matches('.').to_lowercase();

    if host.is_empty() || host.parse::<IpAddr>().is_ok() || !host.contains('.') {
        return Err(LookupError::InvalidHost(hostname.to_string()));
    }
    psl::domain_str(&host)
        .map(str::to_string)
        .ok_or_else(|| LookupError::InvalidHost(hostname.to_string()))
}

/// Referred server from an IANA answer (`refer:` or `whois:` line).
pub fn parse_referral(answer: &str) -> Option<String> {
    parse_fields(answer)
        .into_iter()
        .find(|(k, v)| {
            (k.eq_ignore_ascii_case("refer") || k.eq_ignore_ascii_case("whois")) && !v.is_empty()
        })
        .map(|(_, v)| v)
}

/// `Key: value` lines. Comment and notice lines are skipped.
pub fn parse_fields(answer: &str) -> Vec<(String, String)> {
    answer
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| !line.starts_with('%') && !line.starts_with('#') && !line.starts_with(">>>"))
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .filter(|(k, v)| !k.is_empty() && k.len() <= MAX_KEY_LEN && !v.is_empty())
        .collect()
}
