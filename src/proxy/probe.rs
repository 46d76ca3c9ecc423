//! Single probe through a candidate and transport error classification

use crate::error::ProbeError;
use crate::proxy::models::{CandidateEndpoint, ProxyType, TestOutcome};
use crate::Result;
use anyhow::bail;
use async_trait::async_trait;
use reqwest::{Client, Proxy as ReqwestProxy};
use std::error::Error as StdError;
use std::time::{Duration, Instant};

/// Something able to reach one target URL through one candidate
#[async_trait]
pub trait Probe: Send + Sync {
    /// Produce exactly one outcome; transport failures are classified, never returned
    async fn probe(&self, endpoint: &CandidateEndpoint, target: &str) -> TestOutcome;
}

/// Probe issuing a GET through the candidate as a forward proxy
#[derive(Debug, Clone)]
pub struct HttpProbe {
    timeout: Duration,
    user_agent: String,
}

impl HttpProbe {
    pub fn new(timeout: Duration, user_agent: impl Into<String>) -> Self {
        Self {
            timeout,
            user_agent: user_agent.into(),
        }
    }

    fn create_client(&self, endpoint: &CandidateEndpoint) -> Result<Client> {
        // Listing "https" support means CONNECT tunnelling, not TLS to the proxy itself
        let proxy_url = match endpoint.proxy_type {
            ProxyType::Http | ProxyType::Https => format!("http://{}", endpoint.address()),
            ProxyType::Socks5 => format!("socks5://{}", endpoint.address()),
            ProxyType::Socks4 => bail!("socks4 proxies are not supported"),
        };
        let reqwest_proxy = ReqwestProxy::all(&proxy_url)?;

        let client = Client::builder()
            .proxy(reqwest_proxy)
            .timeout(self.timeout)
            .connect_timeout(self.timeout)
            .user_agent(&self.user_agent)
            .danger_accept_invalid_certs(true)
            .build()?;

        Ok(client)
    }
}

#[async_trait]
impl Probe for HttpProbe {
    async fn probe(&self, endpoint: &CandidateEndpoint, target: &str) -> TestOutcome {
        let client = match self.create_client(endpoint) {
            Ok(client) => client,
            Err(e) => return TestOutcome::failure(target, ProbeError::Other(e.to_string())),
        };

        let start = Instant::now();
        match tokio::time::timeout(self.timeout, client.get(target).send()).await {
            Ok(Ok(response)) => {
                let status = response.status();
                if status.is_success() {
                    let elapsed = start.elapsed().as_millis() as u64;
                    TestOutcome::success(target, elapsed, status.as_u16())
                } else {
                    TestOutcome::failure(target, ProbeError::Http(status.as_u16()))
                }
            }
            Ok(Err(e)) => TestOutcome::failure(target, classify(&e)),
            Err(_) => TestOutcome::failure(target, ProbeError::Timeout),
        }
    }
}

/// Map a reqwest failure onto the probe error taxonomy
pub fn classify(error: &reqwest::Error) -> ProbeError {
    if error.is_timeout() {
        return ProbeError::Timeout;
    }
    if let Some(status) = error.status() {
        return ProbeError::Http(status.as_u16());
    }

    let chain = error_chain(error);
    if looks_like_tls(&chain) {
        return ProbeError::Tls;
    }
    if looks_like_timeout(&chain) {
        return ProbeError::Timeout;
    }
    if error.is_connect() || looks_like_proxy_refusal(&chain) {
        return ProbeError::Proxy;
    }

    ProbeError::Other(chain)
}

/// Flatten an error and its sources into one lower-cased message
fn error_chain(error: &(dyn StdError + 'static)) -> String {
    let mut parts = vec![error.to_string()];
    let mut source = error.source();
    while let Some(cause) = source {
        parts.push(cause.to_string());
        source = cause.source();
    }
    parts.join(": ").to_lowercase()
}

fn looks_like_tls(message: &str) -> bool {
    ["certificate", "tls", "ssl", "handshake"]
        .iter()
        .any(|needle| message.contains(needle))
}

fn looks_like_timeout(message: &str) -> bool {
    message.contains("timed out") || message.contains("deadline")
}

fn looks_like_proxy_refusal(message: &str) -> bool {
    [
        "connection refused",
        "connection reset",
        "unsuccessful tunnel",
        "proxy",
    ]
    .iter()
    .any(|needle| message.contains(needle))
}
