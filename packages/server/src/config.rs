use anyhow::{bail, Context, Result};
use dotenvy::dotenv;
use std::env;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Deployment environment. Production disables the simulated-provider
/// fallback and the "any 2xx" HTTP verification shortcut.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnv {
    Development,
    Test,
    Production,
}

impl AppEnv {
    pub fn is_production(&self) -> bool {
        matches!(self, AppEnv::Production)
    }
}

impl FromStr for AppEnv {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(AppEnv::Development),
            "test" => Ok(AppEnv::Test),
            "production" | "prod" => Ok(AppEnv::Production),
            other => bail!("Invalid APP_ENV: {}", other),
        }
    }
}

/// Which hosting provider strategy to build at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderMode {
    /// Real provider API; a token is required.
    Live,
    /// Never call the provider; produce simulated URLs.
    Simulated,
    /// Live when a token is configured, simulated otherwise.
    Auto,
}

impl FromStr for ProviderMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "live" => Ok(ProviderMode::Live),
            "simulated" => Ok(ProviderMode::Simulated),
            "auto" => Ok(ProviderMode::Auto),
            other => bail!("Invalid HOSTING_PROVIDER_MODE: {}", other),
        }
    }
}

/// Hosting provider settings.
#[derive(Debug, Clone)]
pub struct HostingConfig {
    pub mode: ProviderMode,
    pub api_token: Option<String>,
    pub api_url: Option<String>,
    pub project_id: Option<String>,
    pub team_id: Option<String>,
    /// Only honored outside production.
    pub fallback_to_simulated: bool,
    pub webhook_secret: Option<String>,
    pub simulated_host: String,
    pub request_timeout: Duration,
}

/// Custom domain verification settings.
#[derive(Debug, Clone)]
pub struct DomainConfig {
    pub edge_host: String,
    pub anycast_ip: Ipv4Addr,
    pub verification_secret: String,
    /// Response header whose presence proves the provider serves the domain.
    pub proof_header: String,
    pub probe_timeout: Duration,
}

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub app_env: AppEnv,
    pub port: u16,
    /// `None` runs on in-memory stores.
    pub database_url: Option<String>,
    pub build_root: PathBuf,
    pub hosting: HostingConfig,
    pub domains: DomainConfig,
    pub run_workers: bool,
    pub worker_concurrency: usize,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        let app_env: AppEnv = env::var("APP_ENV")
            .unwrap_or_else(|_| "development".to_string())
            .parse()?;

        let verification_secret = match env::var("DOMAIN_VERIFICATION_SECRET") {
            Ok(secret) => secret,
            Err(_) if !app_env.is_production() => "development-verification-secret".to_string(),
            Err(_) => bail!("DOMAIN_VERIFICATION_SECRET must be set in production"),
        };

        Ok(Self {
            app_env,
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .context("PORT must be a valid number")?,
            database_url: env::var("DATABASE_URL").ok().filter(|s| !s.is_empty()),
            build_root: env::var("BUILD_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|_| env::temp_dir().join("site-builds")),
            hosting: HostingConfig {
                mode: env::var("HOSTING_PROVIDER_MODE")
                    .unwrap_or_else(|_| "auto".to_string())
                    .parse()?,
                api_token: env::var("HOSTING_API_TOKEN").ok().filter(|s| !s.is_empty()),
                api_url: env::var("HOSTING_API_URL").ok(),
                project_id: env::var("HOSTING_PROJECT_ID").ok(),
                team_id: env::var("HOSTING_TEAM_ID").ok(),
                fallback_to_simulated: parse_bool("HOSTING_FALLBACK_TO_SIMULATED", false)?,
                webhook_secret: env::var("HOSTING_WEBHOOK_SECRET").ok().filter(|s| !s.is_empty()),
                simulated_host: env::var("SIMULATED_DEPLOY_HOST")
                    .unwrap_or_else(|_| "sites.localhost".to_string()),
                request_timeout: Duration::from_secs(parse_u64("PROVIDER_TIMEOUT_SECS", 30)?),
            },
            domains: DomainConfig {
                edge_host: env::var("DOMAIN_EDGE_HOST")
                    .unwrap_or_else(|_| "cname.vercel-dns.com".to_string()),
                anycast_ip: env::var("DOMAIN_ANYCAST_IP")
                    .unwrap_or_else(|_| "76.76.21.21".to_string())
                    .parse()
                    .context("DOMAIN_ANYCAST_IP must be an IPv4 address")?,
                verification_secret,
                proof_header: env::var("PROVIDER_PROOF_HEADER")
                    .unwrap_or_else(|_| "x-vercel-id".to_string())
                    .to_ascii_lowercase(),
                probe_timeout: Duration::from_secs(parse_u64("PROBE_TIMEOUT_SECS", 10)?),
            },
            run_workers: parse_bool("RUN_WORKERS", true)?,
            worker_concurrency: parse_u64("WORKER_CONCURRENCY", 2)? as usize,
        })
    }

    /// Configuration for tests and local tooling: simulated provider,
    /// in-memory stores, builds under the system temp dir.
    pub fn for_tests() -> Self {
        Self {
            app_env: AppEnv::Test,
            port: 0,
            database_url: None,
            build_root: env::temp_dir().join("site-builds-test"),
            hosting: HostingConfig {
                mode: ProviderMode::Simulated,
                api_token: None,
                api_url: None,
                project_id: None,
                team_id: None,
                fallback_to_simulated: false,
                webhook_secret: None,
                simulated_host: "sites.localhost".to_string(),
                request_timeout: Duration::from_secs(5),
            },
            domains: DomainConfig {
                edge_host: "cname.hosting.test".to_string(),
                anycast_ip: Ipv4Addr::new(76, 76, 21, 21),
                verification_secret: "test-secret".to_string(),
                proof_header: "x-vercel-id".to_string(),
                probe_timeout: Duration::from_secs(2),
            },
            run_workers: false,
            worker_concurrency: 1,
        }
    }
}

fn parse_bool(key: &str, default: bool) -> Result<bool> {
    match env::var(key) {
        Ok(value) => match value.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            other => bail!("{} must be a boolean, got {}", key, other),
        },
        Err(_) => Ok(default),
    }
}

fn parse_u64(key: &str, default: u64) -> Result<u64> {
    match env::var(key) {
        Ok(value) => value
            .parse()
            .with_context(|| format!("{} must be a valid number", key)),
        Err(_) => Ok(default),
    }
}
