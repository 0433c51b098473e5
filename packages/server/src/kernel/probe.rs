//! HTTP(S) endpoint probing for verification and post-deploy checks.

use std::collections::HashMap;
use std::error::Error as _;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;

use crate::kernel::BaseEndpointProber;

/// Largest body the prober keeps. Checks only look at the document head.
const MAX_BODY_BYTES: usize = 256 * 1024;

#[derive(Debug, Clone, Default)]
pub struct ProbeResponse {
    pub status: u16,
    /// Lowercase header names.
    pub headers: HashMap<String, String>,
    pub body: String,
}

impl ProbeResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    /// TLS handshake failed on the certificate (expired, wrong host, untrusted).
    #[error("certificate error: {0}")]
    Certificate(String),

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("request timed out")]
    Timeout,
}

pub struct HttpProber {
    client: Client,
}

impl HttpProber {
    pub fn new(timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .user_agent("site-builder-verifier/1.0")
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { client }
    }
}

/// Walk the error chain looking for a certificate failure.
fn classify(error: &reqwest::Error) -> ProbeError {
    if error.is_timeout() {
        return ProbeError::Timeout;
    }

    let mut messages = vec![error.to_string()];
    let mut source = error.source();
    while let Some(inner) = source {
        messages.push(inner.to_string());
        source = inner.source();
    }
    let full = messages.join(": ");

    let lower = full.to_ascii_lowercase();
    if lower.contains("certificate") || lower.contains("self signed") || lower.contains("unknownissuer")
    {
        ProbeError::Certificate(full)
    } else {
        ProbeError::Connection(full)
    }
}

#[async_trait]
impl BaseEndpointProber for HttpProber {
    async fn get(&self, url: &str) -> Result<ProbeResponse, ProbeError> {
        let response = self.client.get(url).send().await.map_err(|e| classify(&e))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();

        let bytes = response.bytes().await.map_err(|e| classify(&e))?;
        let body = String::from_utf8_lossy(&bytes[..bytes.len().min(MAX_BODY_BYTES)]).into_owned();

        Ok(ProbeResponse {
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let response = ProbeResponse {
            status: 200,
            headers: HashMap::from([("x-vercel-id".to_string(), "abc".to_string())]),
            body: String::new(),
        };
        assert_eq!(response.header("X-Vercel-Id"), Some("abc"));
        assert!(response.is_success());
    }

    #[tokio::test]
    async fn test_refused_connection_is_connection_error() {
        let prober = HttpProber::new(Duration::from_secs(2));
        let err = prober.get("http://127.0.0.1:9/").await.unwrap_err();
        assert!(matches!(err, ProbeError::Connection(_)));
    }
}
