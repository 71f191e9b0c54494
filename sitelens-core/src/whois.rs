// Registration record mapping

use serde::Serialize;
use sitelens_scanner::RawRegistryRecord;

pub const LOOKUP_FAILED: &str = "WHOIS lookup failed";
pub const LOOKUP_SKIPPED: &str = "WHOIS lookup skipped";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AbuseContact {
    pub email: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WhoisRecord {
    pub domain_name: Option<String>,
    pub registrar: Option<String>,
    pub registrar_iana_id: Option<String>,
    pub registrar_url: Option<String>,
    pub abuse_contact: AbuseContact,
    pub created_date: Option<String>,
    pub updated_date: Option<String>,
    pub expiry_date: Option<String>,
    pub status: Vec<String>,
    pub name_servers: Vec<String>,
    pub dnssec: Option<String>,
}

/// Either a mapped record or an embedded `{error}` marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum WhoisOutcome {
    Record(Box<WhoisRecord>),
    Error { error: String },
}

impl WhoisOutcome {
    pub fn failed() -> Self {
        WhoisOutcome::Error {
            error: LOOKUP_FAILED.to_string(),
        }
    }

    pub fn skipped() -> Self {
        WhoisOutcome::Error {
            error: LOOKUP_SKIPPED.to_string(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, WhoisOutcome::Error { .. })
    }

    pub fn record(&self) -> Option<&WhoisRecord> {
        match self {
            WhoisOutcome::Record(record) => Some(record),
            WhoisOutcome::Error { .. } => None,
        }
    }
}

impl From<&RawRegistryRecord> for WhoisOutcome {
    fn from(raw: &RawRegistryRecord) -> Self {
        WhoisOutcome::Record(Box::new(map_record(raw)))
    }
}

/// Map known registry keys. Absent scalars stay `None`, absent lists empty.
pub fn map_record(raw: &RawRegistryRecord) -> WhoisRecord {
    let first_of = |keys: &[&str]| {
        keys.iter()
            .find_map(|k| raw.first(k))
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };

    WhoisRecord {
        domain_name: first_of(&["Domain Name"]),
        registrar: first_of(&["Registrar"]),
        registrar_iana_id: first_of(&["Registrar IANA ID"]),
        registrar_url: first_of(&["Registrar URL"]),
        abuse_contact: AbuseContact {
            email: first_of(&["Registrar Abuse Contact Email"]),
            phone: first_of(&["Registrar Abuse Contact Phone"]),
        },
        created_date: first_of(&["Created Date", "Creation Date"]),
        updated_date: first_of(&["Updated Date"]),
        expiry_date: first_of(&[
            "Expiry Date",
            "Registry Expiry Date",
            "Registrar Registration Expiration Date",
        ]),
        status: collect_values(raw, "Domain Status", status_code),
        name_servers: collect_values(raw, "Name Server", |v| v.to_lowercase()),
        dnssec: first_of(&["DNSSEC"]),
    }
}

/// Non-empty, deduplicated values in answer order.
fn collect_values(
    raw: &RawRegistryRecord,
    key: &str,
    normalize: impl Fn(&str) -> String,
) -> Vec<String> {
    let mut values: Vec<String> = Vec::new();
    for value in raw.values(key) {
        let value = normalize(value.trim());
        if !value.is_empty() && !values.contains(&value) {
            values.push(value);
        }
    }
    values
}

/// `clientTransferProhibited https://icann.org/epp#...` keeps only the code.
fn status_code(value: &str) -> String {
    value.split_whitespace().next().unwrap_or_default().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_code_drops_reference_url() {
        assert_eq!(
            status_code("clientTransferProhibited https://icann.org/epp#clientTransferProhibited"),
            "clientTransferProhibited"
        );
        assert_eq!(status_code(""), "");
    }

    #[test]
    fn test_error_marker_shape() {
        let json = serde_json::to_value(WhoisOutcome::failed()).unwrap();
        assert_eq!(json, serde_json::json!({ "error": "WHOIS lookup failed" }));
    }
}
