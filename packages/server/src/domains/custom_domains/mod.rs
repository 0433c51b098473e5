//! Custom domains domain - attaching, verifying and promoting domains

pub mod activities;
pub mod jobs;
pub mod models;
pub mod verifier;

pub use jobs::DomainVerificationJobHandler;
pub use models::{DnsRecord, DnsRecordType, Domain, DomainStatus, SslStatus, VerificationStatus};
