//! Kernel module - server infrastructure and dependencies.

pub mod deps;
pub mod dns;
pub mod hosting;
pub mod jobs;
pub mod memory_store;
pub mod postgres_store;
pub mod probe;
pub mod test_dependencies;
pub mod traits;

pub use deps::{build_server_deps, ServerDeps};
pub use dns::{DnsLookupError, HickoryDnsResolver};
pub use hosting::{
    build_hosting_provider, DeployBundle, FallbackHostingProvider, LiveHostingProvider,
    ProviderDeployment, SimulatedHostingProvider,
};
pub use memory_store::MemoryStore;
pub use postgres_store::PostgresStore;
pub use probe::{HttpProber, ProbeError, ProbeResponse};
pub use test_dependencies::{MockDnsResolver, MockHostingProvider, MockProber, TestDependencies};
pub use traits::*;
