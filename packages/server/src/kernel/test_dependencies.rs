// TestDependencies - mock implementations for testing
//
// Provides mock network services and in-memory stores that can be injected
// into ServerDeps for tests. Each mock records its calls.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use hosting_client::{HostingError, VerificationRecord};

use super::dns::DnsLookupError;
use super::hosting::{DeployBundle, ProviderDeployment};
use super::jobs::MemoryJobQueue;
use super::memory_store::MemoryStore;
use super::probe::{ProbeError, ProbeResponse};
use super::{BaseDnsResolver, BaseEndpointProber, BaseHostingProvider, ServerDeps};
use crate::config::Config;
use crate::domains::custom_domains::models::DnsRecordType;

// =============================================================================
// Mock DNS Resolver
// =============================================================================

/// Answers from a fixed table; anything not in it is NXDOMAIN.
#[derive(Default)]
pub struct MockDnsResolver {
    records: Mutex<HashMap<(DnsRecordType, String), Vec<String>>>,
    failures: Mutex<HashMap<(DnsRecordType, String), DnsLookupError>>,
    calls: Mutex<Vec<(DnsRecordType, String)>>,
}

impl MockDnsResolver {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(record_type: DnsRecordType, name: &str) -> (DnsRecordType, String) {
        (record_type, name.trim_end_matches('.').to_ascii_lowercase())
    }

    pub fn with_record(self, record_type: DnsRecordType, name: &str, value: &str) -> Self {
        self.set_record(record_type, name, value);
        self
    }

    /// Add a live record value (appends to existing values)
    pub fn set_record(&self, record_type: DnsRecordType, name: &str, value: &str) {
        self.records
            .lock()
            .unwrap()
            .entry(Self::key(record_type, name))
            .or_default()
            .push(value.to_string());
    }

    /// Drop every value of a record
    pub fn clear_record(&self, record_type: DnsRecordType, name: &str) {
        self.records
            .lock()
            .unwrap()
            .remove(&Self::key(record_type, name));
    }

    pub fn fail_lookup(&self, record_type: DnsRecordType, name: &str, error: DnsLookupError) {
        self.failures
            .lock()
            .unwrap()
            .insert(Self::key(record_type, name), error);
    }

    pub fn calls(&self) -> Vec<(DnsRecordType, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl BaseDnsResolver for MockDnsResolver {
    async fn lookup(
        &self,
        record_type: DnsRecordType,
        name: &str,
    ) -> Result<Vec<String>, DnsLookupError> {
        let key = Self::key(record_type, name);
        self.calls.lock().unwrap().push(key.clone());

        if let Some(error) = self.failures.lock().unwrap().get(&key) {
            return Err(error.clone());
        }
        match self.records.lock().unwrap().get(&key) {
            Some(values) if !values.is_empty() => Ok(values.clone()),
            _ => Err(DnsLookupError::NotFound {
                record_type: record_type.to_string(),
                name: name.to_string(),
            }),
        }
    }
}

// =============================================================================
// Mock Endpoint Prober
// =============================================================================

/// Per-URL canned responses; unknown URLs fail to connect.
#[derive(Default)]
pub struct MockProber {
    responses: Mutex<HashMap<String, Result<ProbeResponse, ProbeError>>>,
    calls: Mutex<Vec<String>>,
}

impl MockProber {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, url: &str, status: u16, headers: &[(&str, &str)], body: &str) {
        let response = ProbeResponse {
            status,
            headers: headers
                .iter()
                .map(|(k, v)| (k.to_ascii_lowercase(), v.to_string()))
                .collect(),
            body: body.to_string(),
        };
        self.responses
            .lock()
            .unwrap()
            .insert(url.to_string(), Ok(response));
    }

    pub fn fail(&self, url: &str, error: ProbeError) {
        self.responses
            .lock()
            .unwrap()
            .insert(url.to_string(), Err(error));
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn was_probed(&self, url: &str) -> bool {
        self.calls.lock().unwrap().iter().any(|u| u == url)
    }
}

#[async_trait]
impl BaseEndpointProber for MockProber {
    async fn get(&self, url: &str) -> Result<ProbeResponse, ProbeError> {
        self.calls.lock().unwrap().push(url.to_string());
        match self.responses.lock().unwrap().get(url) {
            Some(result) => result.clone(),
            None => Err(ProbeError::Connection(format!("no route to {}", url))),
        }
    }
}

// =============================================================================
// Mock Hosting Provider
// =============================================================================

/// Records uploads and returns `https://<name>.mock.hosting.test`.
#[derive(Default)]
pub struct MockHostingProvider {
    deploys: Mutex<Vec<DeployBundle>>,
    registered: Mutex<Vec<String>>,
    deploy_failure: Mutex<Option<(u16, String)>>,
    domain_records: Mutex<Vec<VerificationRecord>>,
    simulated: bool,
}

impl MockHostingProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report deployments as simulated (skips post-deploy probing)
    pub fn simulated() -> Self {
        Self {
            simulated: true,
            ..Self::default()
        }
    }

    /// Make every deploy fail with an API error until cleared
    pub fn fail_deploys(&self, status: u16, message: &str) {
        *self.deploy_failure.lock().unwrap() = Some((status, message.to_string()));
    }

    pub fn succeed_deploys(&self) {
        *self.deploy_failure.lock().unwrap() = None;
    }

    /// Extra records returned from `register_domain`
    pub fn with_domain_records(self, records: Vec<VerificationRecord>) -> Self {
        *self.domain_records.lock().unwrap() = records;
        self
    }

    pub fn deploys(&self) -> Vec<DeployBundle> {
        self.deploys.lock().unwrap().clone()
    }

    pub fn registered_domains(&self) -> Vec<String> {
        self.registered.lock().unwrap().clone()
    }

    pub fn url_for(name: &str) -> String {
        format!("https://{}.mock.hosting.test", name)
    }
}

#[async_trait]
impl BaseHostingProvider for MockHostingProvider {
    async fn deploy(&self, bundle: &DeployBundle) -> Result<ProviderDeployment, HostingError> {
        self.deploys.lock().unwrap().push(bundle.clone());
        if let Some((status, message)) = self.deploy_failure.lock().unwrap().clone() {
            return Err(HostingError::Api { status, message });
        }
        Ok(ProviderDeployment {
            url: Self::url_for(&bundle.name),
            provider_deployment_id: Some(format!("dpl_{}", bundle.deployment_id)),
            simulated: self.simulated,
        })
    }

    async fn register_domain(&self, name: &str) -> Result<Vec<VerificationRecord>, HostingError> {
        self.registered.lock().unwrap().push(name.to_string());
        Ok(self.domain_records.lock().unwrap().clone())
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

// =============================================================================
// TestDependencies
// =============================================================================

/// Concrete handles to every mock, plus the `ServerDeps` built from them.
pub struct TestDependencies {
    pub store: Arc<MemoryStore>,
    pub queue: Arc<MemoryJobQueue>,
    pub hosting: Arc<MockHostingProvider>,
    pub dns: Arc<MockDnsResolver>,
    pub prober: Arc<MockProber>,
    pub config: Config,
}

impl TestDependencies {
    pub fn new() -> Self {
        Self {
            store: Arc::new(MemoryStore::new()),
            queue: Arc::new(MemoryJobQueue::new()),
            hosting: Arc::new(MockHostingProvider::new()),
            dns: Arc::new(MockDnsResolver::new()),
            prober: Arc::new(MockProber::new()),
            config: Config::for_tests(),
        }
    }

    pub fn with_hosting(mut self, hosting: MockHostingProvider) -> Self {
        self.hosting = Arc::new(hosting);
        self
    }

    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn into_server_deps(&self) -> ServerDeps {
        ServerDeps::new(
            Arc::new(self.config.clone()),
            self.store.clone(),
            self.store.clone(),
            self.store.clone(),
            self.hosting.clone(),
            self.dns.clone(),
            self.prober.clone(),
            self.queue.clone(),
        )
    }
}

impl Default for TestDependencies {
    fn default() -> Self {
        Self::new()
    }
}
