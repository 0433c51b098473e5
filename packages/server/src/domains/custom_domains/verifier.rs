//! DNS, HTTP and SSL checks for custom domains.
//!
//! DNS and HTTP decide whether a domain is verified. SSL is checked and
//! recorded but never blocks activation; certificates are issued by the
//! provider after the domain points at it.

use serde::Serialize;
use tracing::{debug, warn};

use crate::common::utils::domain_verification_token;
use crate::common::{DomainId, VerificationError};
use crate::config::DomainConfig;
use crate::domains::custom_domains::models::{DnsRecord, DnsRecordType, Domain};
use crate::kernel::{BaseDnsResolver, BaseEndpointProber, DnsLookupError, ProbeError};

/// Host label under which the ownership TXT record lives.
pub const VERIFICATION_LABEL: &str = "_site-verification";
const TOKEN_PREFIX: &str = "site-verification=";

/// Exactly two labels, e.g. `example.com`.
pub fn is_apex(name: &str) -> bool {
    name.trim_end_matches('.').split('.').count() == 2
}

pub fn verification_token(name: &str, id: DomainId, secret: &str) -> String {
    format!(
        "{}{}",
        TOKEN_PREFIX,
        domain_verification_token(name, &id.to_string(), secret)
    )
}

/// The records a domain owner has to create before verification passes.
pub fn expected_records(name: &str, id: DomainId, config: &DomainConfig) -> Vec<DnsRecord> {
    let token = verification_token(name, id, &config.verification_secret);
    let txt_host = format!("{}.{}", VERIFICATION_LABEL, name);

    if is_apex(name) {
        vec![
            DnsRecord::required(
                DnsRecordType::A,
                name,
                config.anycast_ip.to_string(),
                "Points the apex domain at the hosting edge",
            ),
            DnsRecord::informational(
                DnsRecordType::Cname,
                format!("www.{}", name),
                &config.edge_host,
                "Routes www to the hosting edge",
            ),
            DnsRecord::required(DnsRecordType::Txt, txt_host, token, "Proves domain ownership"),
        ]
    } else {
        vec![
            DnsRecord::required(
                DnsRecordType::Cname,
                name,
                &config.edge_host,
                "Routes the domain to the hosting edge",
            ),
            DnsRecord::required(DnsRecordType::Txt, txt_host, token, "Proves domain ownership"),
        ]
    }
}

// =============================================================================
// DNS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DnsCheck {
    pub record_type: DnsRecordType,
    pub name: String,
    pub expected: String,
    pub verified: bool,
    pub actual_value: Option<String>,
    pub error: Option<VerificationError>,
}

fn normalize(value: &str) -> String {
    value.trim().trim_end_matches('.').to_ascii_lowercase()
}

fn matches(record_type: DnsRecordType, expected: &str, actual: &str) -> bool {
    let expected = normalize(expected);
    match record_type {
        DnsRecordType::Txt => {
            let actual = actual.replace('"', "").to_ascii_lowercase();
            actual.contains(&expected)
        }
        _ => normalize(actual) == expected,
    }
}

/// Resolve the live record and compare it with `expected`. A lookup that
/// finds nothing is a failed check, not an error.
pub async fn verify_dns_record(resolver: &dyn BaseDnsResolver, expected: &DnsRecord) -> DnsCheck {
    let mut check = DnsCheck {
        record_type: expected.record_type,
        name: expected.name.clone(),
        expected: expected.value.clone(),
        verified: false,
        actual_value: None,
        error: None,
    };

    let failure = |message: String| VerificationError::Dns {
        record_type: expected.record_type.to_string(),
        name: expected.name.clone(),
        message,
    };

    match resolver.lookup(expected.record_type, &expected.name).await {
        Ok(values) => {
            check.verified = values
                .iter()
                .any(|v| matches(expected.record_type, &expected.value, v));
            check.actual_value = Some(values.join(", "));
            if !check.verified {
                check.error = Some(failure(format!(
                    "expected {}, found {}",
                    expected.value,
                    values.join(", ")
                )));
            }
        }
        Err(DnsLookupError::NotFound { .. }) => {
            check.error = Some(failure("record not found".to_string()));
        }
        Err(e) => {
            check.error = Some(failure(e.to_string()));
        }
    }

    debug!(
        record_type = %expected.record_type,
        name = %expected.name,
        verified = check.verified,
        "DNS check"
    );
    check
}

// =============================================================================
// HTTP
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpCheck {
    pub verified: bool,
    pub status: Option<u16>,
    pub error: Option<VerificationError>,
}

/// GET `http://<domain>/`. The provider's identifying header proves the
/// domain reaches it; with `accept_any_success` a plain 2xx is enough.
pub async fn verify_http_endpoint(
    prober: &dyn BaseEndpointProber,
    domain: &str,
    proof_header: &str,
    accept_any_success: bool,
) -> HttpCheck {
    let url = format!("http://{}/", domain);
    let failure = |message: String| VerificationError::Http {
        domain: domain.to_string(),
        message,
    };

    match prober.get(&url).await {
        Ok(response) => {
            let proven = response.header(proof_header).is_some();
            let verified = proven || (accept_any_success && response.is_success());
            HttpCheck {
                verified,
                status: Some(response.status),
                error: (!verified).then(|| {
                    failure(format!(
                        "HTTP {} without the {} header",
                        response.status, proof_header
                    ))
                }),
            }
        }
        Err(e) => HttpCheck {
            verified: false,
            status: None,
            error: Some(failure(e.to_string())),
        },
    }
}

// =============================================================================
// SSL
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SslCheck {
    pub valid: bool,
    pub error: Option<VerificationError>,
}

/// GET `https://<domain>/`; any response means the certificate was accepted.
pub async fn verify_ssl_certificate(prober: &dyn BaseEndpointProber, domain: &str) -> SslCheck {
    let url = format!("https://{}/", domain);
    let error = match prober.get(&url).await {
        Ok(_) => None,
        Err(ProbeError::Certificate(message)) => Some(VerificationError::SslCertificate {
            domain: domain.to_string(),
            message,
        }),
        Err(e) => Some(VerificationError::SslConnection {
            domain: domain.to_string(),
            message: e.to_string(),
        }),
    };

    if let Some(error) = &error {
        warn!(domain = %domain, error = %error, "SSL check failed");
    }
    SslCheck {
        valid: error.is_none(),
        error,
    }
}

// =============================================================================
// Combined
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationOutcome {
    pub dns: Vec<DnsCheck>,
    pub http: HttpCheck,
    pub ssl: SslCheck,
}

impl VerificationOutcome {
    /// DNS and HTTP passed. SSL does not count.
    pub fn verified(&self) -> bool {
        self.dns.iter().all(|c| c.verified) && self.http.verified
    }

    /// Blocking failures, in check order.
    pub fn errors(&self) -> Vec<String> {
        self.dns
            .iter()
            .filter_map(|c| c.error.as_ref())
            .chain(self.http.error.as_ref())
            .map(|e| e.to_string())
            .collect()
    }
}

/// Run every check for `domain`. Only its required records are resolved.
pub async fn check_domain(
    domain: &Domain,
    resolver: &dyn BaseDnsResolver,
    prober: &dyn BaseEndpointProber,
    proof_header: &str,
    accept_any_success: bool,
) -> VerificationOutcome {
    let mut dns = Vec::new();
    for record in domain.dns_records.iter().filter(|r| r.required) {
        dns.push(verify_dns_record(resolver, record).await);
    }
    let http = verify_http_endpoint(prober, &domain.name, proof_header, accept_any_success).await;
    let ssl = verify_ssl_certificate(prober, &domain.name).await;

    VerificationOutcome { dns, http, ssl }
}
