//! DNS resolution backed by hickory-resolver.

use std::time::Duration;

use async_trait::async_trait;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::error::ResolveErrorKind;
use hickory_resolver::proto::rr::{RData, RecordType};
use hickory_resolver::TokioAsyncResolver;
use thiserror::Error;
use tracing::debug;

use crate::domains::custom_domains::models::DnsRecordType;
use crate::kernel::BaseDnsResolver;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DnsLookupError {
    /// NXDOMAIN or no records of the requested type.
    #[error("no {record_type} records found for {name}")]
    NotFound { record_type: String, name: String },

    #[error("DNS lookup timed out")]
    Timeout,

    #[error("DNS lookup failed: {0}")]
    Other(String),
}

pub struct HickoryDnsResolver {
    resolver: TokioAsyncResolver,
}

impl HickoryDnsResolver {
    /// Public upstream resolvers, no local cache beyond hickory's own.
    pub fn new(timeout: Duration) -> Self {
        let mut opts = ResolverOpts::default();
        opts.timeout = timeout;
        opts.attempts = 2;
        // Verification wants the live answer, not a cached one.
        opts.cache_size = 0;
        Self {
            resolver: TokioAsyncResolver::tokio(ResolverConfig::default(), opts),
        }
    }
}

fn to_record_type(record_type: DnsRecordType) -> RecordType {
    match record_type {
        DnsRecordType::A => RecordType::A,
        DnsRecordType::Aaaa => RecordType::AAAA,
        DnsRecordType::Cname => RecordType::CNAME,
        DnsRecordType::Txt => RecordType::TXT,
        DnsRecordType::Mx => RecordType::MX,
    }
}

fn render_rdata(rdata: &RData) -> Option<String> {
    match rdata {
        RData::A(a) => Some(a.to_string()),
        RData::AAAA(aaaa) => Some(aaaa.to_string()),
        RData::CNAME(cname) => Some(cname.to_string()),
        RData::TXT(txt) => Some(
            txt.txt_data()
                .iter()
                .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
                .collect::<String>(),
        ),
        RData::MX(mx) => Some(format!("{} {}", mx.preference(), mx.exchange())),
        _ => None,
    }
}

#[async_trait]
impl BaseDnsResolver for HickoryDnsResolver {
    async fn lookup(
        &self,
        record_type: DnsRecordType,
        name: &str,
    ) -> Result<Vec<String>, DnsLookupError> {
        let wanted = to_record_type(record_type);
        let not_found = || DnsLookupError::NotFound {
            record_type: record_type.to_string(),
            name: name.to_string(),
        };

        let lookup = match self.resolver.lookup(name, wanted).await {
            Ok(lookup) => lookup,
            Err(e) => {
                return Err(match e.kind() {
                    ResolveErrorKind::NoRecordsFound { .. } => not_found(),
                    ResolveErrorKind::Timeout => DnsLookupError::Timeout,
                    _ => DnsLookupError::Other(e.to_string()),
                })
            }
        };

        // Answers can include the CNAME chain; keep only the requested type.
        let values: Vec<String> = lookup
            .iter()
            .filter(|rdata| rdata.record_type() == wanted)
            .filter_map(render_rdata)
            .collect();

        debug!(name = %name, record_type = %record_type, count = values.len(), "DNS lookup");

        if values.is_empty() {
            return Err(not_found());
        }
        Ok(values)
    }
}
