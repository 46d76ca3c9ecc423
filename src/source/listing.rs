//! Listing-page adapter extracting candidates from HTML tables or plain text

use crate::config::EngineConfig;
use crate::error::SourceFetchError;
use crate::proxy::models::{CandidateEndpoint, Provenance, ProxyType};
use crate::proxy::parser::ProxyParser;
use crate::source::CandidateSource;
use crate::Result;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::{Client, Proxy as ReqwestProxy};
use std::net::Ipv4Addr;
use std::time::Duration;
use tracing::{debug, warn};

/// Browser user agent for listing requests
const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

const ACCEPT_HTML: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8";

/// Table rows read per listing
const MAX_ROWS: usize = 100;

static ROW_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<tr[^>]*>(.*?)</tr>").expect("Invalid row regex"));

static CELL_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<td[^>]*>(.*?)</td>").expect("Invalid cell regex"));

static TAG_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").expect("Invalid tag regex"));

/// Regex pattern to match IP:PORT patterns in text
static IP_PORT_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}):(\d{1,5})\b")
        .expect("Invalid IP:PORT regex")
});

/// A listing page and how to reach it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSpec {
    pub name: String,
    pub url: String,
    pub proxy_type: ProxyType,
    /// Fetch through the local relay
    pub requires_relay: bool,
}

impl SourceSpec {
    pub fn new(url: &str, proxy_type: ProxyType, requires_relay: bool) -> Self {
        let name = reqwest::Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(String::from))
            .unwrap_or_else(|| url.to_string());
        Self {
            name,
            url: url.to_string(),
            proxy_type,
            requires_relay,
        }
    }

    /// Well-known free listing pages
    pub fn defaults() -> Vec<SourceSpec> {
        vec![
            SourceSpec::new("https://www.sslproxies.org/", ProxyType::Https, false),
            SourceSpec::new("https://free-proxy-list.net/", ProxyType::Http, false),
            SourceSpec::new("https://hidemy.name/en/proxy-list/", ProxyType::Http, true),
            SourceSpec::new("https://www.proxy-list.download/HTTP", ProxyType::Http, false),
            SourceSpec::new("https://geonode.com/free-proxy-list/", ProxyType::Http, false),
            SourceSpec::new("https://www.proxynova.com/proxy-server-list/", ProxyType::Http, false),
            SourceSpec::new("https://spys.one/en/", ProxyType::Http, true),
            SourceSpec::new("https://proxy-daily.com/", ProxyType::Http, false),
            SourceSpec::new("https://www.proxyscan.io/", ProxyType::Http, false),
            SourceSpec::new("https://advanced.name/freeproxy", ProxyType::Http, true),
        ]
    }
}

/// HTTP settings shared by listing adapters
#[derive(Debug, Clone)]
pub struct ListingConfig {
    pub timeout: Duration,
    pub user_agent: String,
    /// SOCKS relay used by sources that require it
    pub relay_addr: String,
}

impl Default for ListingConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(15),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            relay_addr: crate::config::DEFAULT_RELAY_ADDR.to_string(),
        }
    }
}

impl ListingConfig {
    pub fn from_engine(config: &EngineConfig) -> Self {
        Self {
            timeout: config.source_timeout,
            relay_addr: config.relay_addr.clone(),
            ..Default::default()
        }
    }
}

/// Adapter fetching one listing page
pub struct ListingSource {
    spec: SourceSpec,
    client: Client,
}

impl ListingSource {
    pub fn new(spec: SourceSpec, config: &ListingConfig) -> Result<Self> {
        let mut builder = Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .danger_accept_invalid_certs(true);

        if spec.requires_relay {
            builder = builder.proxy(ReqwestProxy::all(format!("socks5h://{}", config.relay_addr))?);
        }

        Ok(Self {
            spec,
            client: builder.build()?,
        })
    }

    async fn try_fetch(&self) -> std::result::Result<Vec<CandidateEndpoint>, SourceFetchError> {
        let request_error = |e: reqwest::Error| SourceFetchError::Request {
            source_name: self.spec.name.clone(),
            message: e.to_string(),
        };

        let response = self
            .client
            .get(&self.spec.url)
            .header(reqwest::header::ACCEPT, ACCEPT_HTML)
            .send()
            .await
            .map_err(request_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceFetchError::Status {
                source_name: self.spec.name.clone(),
                status: status.as_u16(),
            });
        }

        let content = response.text().await.map_err(request_error)?;
        Ok(parse_listing(&content, &self.spec.name, self.spec.proxy_type))
    }
}

#[async_trait]
impl CandidateSource for ListingSource {
    fn name(&self) -> &str {
        &self.spec.name
    }

    fn requires_relay(&self) -> bool {
        self.spec.requires_relay
    }

    async fn fetch(&self) -> Vec<CandidateEndpoint> {
        match self.try_fetch().await {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!("Error fetching from {}: {}", self.spec.name, e);
                Vec::new()
            }
        }
    }
}

/// Extract candidates from a listing page.
///
/// Tries, in order: table rows, line-by-line parsing, then a bare
/// IP:PORT scan. Duplicates are removed.
pub fn parse_listing(content: &str, source: &str, proxy_type: ProxyType) -> Vec<CandidateEndpoint> {
    let mut candidates = parse_table_rows(content, source, proxy_type);

    if candidates.is_empty() {
        candidates = ProxyParser::parse_string(content, proxy_type, source);
    }

    if candidates.is_empty() {
        debug!("{}: no table or list lines, scanning for IP:PORT", source);
        candidates = extract_with_regex(content, source, proxy_type);
    }

    ProxyParser::dedup(candidates)
}

/// Rows shaped like IP | Port | Code | Country | Anonymity | Google | Https | Last Checked
fn parse_table_rows(content: &str, source: &str, proxy_type: ProxyType) -> Vec<CandidateEndpoint> {
    ROW_REGEX
        .captures_iter(content)
        .filter_map(|row| {
            let cells: Vec<String> = CELL_REGEX
                .captures_iter(&row[1])
                .map(|cell| TAG_REGEX.replace_all(&cell[1], "").trim().to_string())
                .collect();
            if cells.len() < 2 || cells[0].parse::<Ipv4Addr>().is_err() {
                return None;
            }

            let column = |i: usize| cells.get(i).filter(|c| !c.is_empty()).cloned();
            let https = column(6).map(|v| v.eq_ignore_ascii_case("yes"));
            let provenance = Provenance {
                source: source.to_string(),
                country_code: column(2),
                country: column(3),
                anonymity: column(4),
                https,
                last_checked: column(7),
            };

            CandidateEndpoint::from_raw(&cells[0], &cells[1], proxy_type, provenance).ok()
        })
        .take(MAX_ROWS)
        .collect()
}

fn extract_with_regex(content: &str, source: &str, proxy_type: ProxyType) -> Vec<CandidateEndpoint> {
    IP_PORT_REGEX
        .captures_iter(content)
        .filter_map(|cap| {
            let host = cap.get(1)?.as_str();
            host.parse::<Ipv4Addr>().ok()?;
            CandidateEndpoint::from_raw(
                host,
                cap.get(2)?.as_str(),
                proxy_type,
                Provenance::from_source(source),
            )
            .ok()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &str = r#"
<table id="proxylisttable">
<thead><tr><th>IP Address</th><th>Port</th><th>Code</th><th>Country</th><th>Anonymity</th><th>Google</th><th>Https</th><th>Last Checked</th></tr></thead>
<tbody>
<tr><td>203.0.113.7</td><td>3128</td><td>US</td><td class="hm">United States</td><td>elite proxy</td><td>no</td><td class="hx">yes</td><td>1 min ago</td></tr>
<tr><td>198.51.100.2</td><td>8080</td><td>DE</td><td>Germany</td><td>anonymous</td><td>no</td><td>no</td><td>5 mins ago</td></tr>
<tr><td>not-an-ip</td><td>80</td></tr>
</tbody>
</table>
"#;

    #[test]
    fn test_spec_name_is_domain() {
        let spec = SourceSpec::new("https://www.sslproxies.org/", ProxyType::Https, false);
        assert_eq!(spec.name, "www.sslproxies.org");
    }

    #[test]
    fn test_default_specs() {
        let specs = SourceSpec::defaults();
        assert_eq!(specs.len(), 10);
        assert_eq!(specs.iter().filter(|s| s.requires_relay).count(), 3);
        assert!(specs.iter().all(|s| s.url.starts_with("https://")));
    }

    #[test]
    fn test_table_rows_carry_provenance() {
        let candidates = parse_listing(TABLE, "sslproxies.org", ProxyType::Http);
        assert_eq!(candidates.len(), 2);

        let first = &candidates[0];
        assert_eq!(first.address(), "203.0.113.7:3128");
        assert_eq!(first.provenance.source, "sslproxies.org");
        assert_eq!(first.provenance.country_code.as_deref(), Some("US"));
        assert_eq!(first.provenance.country.as_deref(), Some("United States"));
        assert_eq!(first.provenance.anonymity.as_deref(), Some("elite proxy"));
        assert_eq!(first.provenance.https, Some(true));
        assert_eq!(first.provenance.last_checked.as_deref(), Some("1 min ago"));
        assert_eq!(candidates[1].provenance.https, Some(false));
    }

    #[test]
    fn test_table_rows_are_capped() {
        let rows: String = (0..150)
            .map(|i| format!("<tr><td>10.0.{}.{}</td><td>80</td></tr>", i / 200, i % 200 + 1))
            .collect();
        let candidates = parse_listing(&rows, "big", ProxyType::Http);
        assert_eq!(candidates.len(), MAX_ROWS);
    }

    #[test]
    fn test_plain_list_fallback() {
        let content = "192.168.1.1:8080\n192.168.1.2:3128\n192.168.1.1:8080\n";
        let candidates = parse_listing(content, "txt", ProxyType::Socks5);
        assert_eq!(candidates.len(), 2);
        assert!(candidates.iter().all(|c| c.proxy_type == ProxyType::Socks5));
    }

    #[test]
    fn test_regex_fallback_in_free_text() {
        let content = "<p>Here is one: 10.0.0.1:3128, and 999.1.1.1:80 is bogus, 10.0.0.2:0 too.</p>";
        let candidates = parse_listing(content, "blog", ProxyType::Http);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].address(), "10.0.0.1:3128");
    }

    #[test]
    fn test_relay_source_builds_socks_client() {
        let spec = SourceSpec::new("https://spys.one/en/", ProxyType::Http, true);
        let source = ListingSource::new(spec, &ListingConfig::default()).unwrap();
        assert!(source.requires_relay());
        assert_eq!(source.name(), "spys.one");
    }
}
