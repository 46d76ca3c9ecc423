//! Local and public network context attached to each cycle

use crate::config::EngineConfig;
use chrono::{DateTime, Local};
use gethostname::gethostname;
use if_addrs::{get_if_addrs, IfAddr};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::RwLock;
use tracing::warn;

/// Placeholder for anything that could not be determined
pub const UNAVAILABLE: &str = "N/A";

/// Public address used only to pick the outbound route
const ROUTE_TARGET_ADDR: (Ipv4Addr, u16) = (Ipv4Addr::new(8, 8, 8, 8), 80);

/// One IPv4 address bound to a local interface
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceInfo {
    pub interface: String,
    pub ip: String,
    pub netmask: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkInfo {
    pub public_ip: String,
    pub hostname: String,
    pub local_ip: String,
    pub country: String,
    pub isp: String,
    pub interfaces: Vec<InterfaceInfo>,
    pub timestamp: DateTime<Local>,
}

/// Public address details as returned by the lookup service
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PublicIpInfo {
    pub ip: Option<String>,
    pub country: Option<String>,
    pub org: Option<String>,
}

/// Collects network info once and serves the cached copy until refreshed
#[derive(Debug)]
pub struct NetworkInfoCollector {
    lookup_url: String,
    timeout: Duration,
    cached: RwLock<Option<NetworkInfo>>,
}

impl NetworkInfoCollector {
    pub fn new(lookup_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            lookup_url: lookup_url.into(),
            timeout,
            cached: RwLock::new(None),
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.lookup_url.clone(), config.lookup_timeout)
    }

    /// Cached info, collecting it on first use
    pub async fn get(&self) -> NetworkInfo {
        if let Some(info) = self.cached.read().await.as_ref() {
            return info.clone();
        }
        self.refresh().await
    }

    /// Collect again and replace the cached copy
    pub async fn refresh(&self) -> NetworkInfo {
        let info = self.collect().await;
        *self.cached.write().await = Some(info.clone());
        info
    }

    async fn collect(&self) -> NetworkInfo {
        let public = self.lookup_public().await;
        let interfaces = local_interfaces();
        let local_ip = match default_route_ip().await {
            Some(ip) => ip.to_string(),
            None => interfaces
                .iter()
                .filter_map(|i| i.ip.parse::<Ipv4Addr>().ok())
                .find(|ip| !ip.is_loopback())
                .map(|ip| ip.to_string())
                .unwrap_or_else(|| UNAVAILABLE.to_string()),
        };

        NetworkInfo {
            public_ip: public.ip.unwrap_or_else(|| UNAVAILABLE.to_string()),
            hostname: local_hostname().unwrap_or_else(|| UNAVAILABLE.to_string()),
            local_ip,
            country: public.country.unwrap_or_else(|| UNAVAILABLE.to_string()),
            isp: public.org.unwrap_or_else(|| UNAVAILABLE.to_string()),
            interfaces,
            timestamp: Local::now(),
        }
    }

    async fn lookup_public(&self) -> PublicIpInfo {
        match self.try_lookup_public().await {
            Ok(info) => info,
            Err(e) => {
                warn!("public address lookup via {} failed: {}", self.lookup_url, e);
                PublicIpInfo::default()
            }
        }
    }

    async fn try_lookup_public(&self) -> crate::Result<PublicIpInfo> {
        let client = Client::builder().timeout(self.timeout).build()?;
        let info = client
            .get(&self.lookup_url)
            .send()
            .await?
            .error_for_status()?
            .json::<PublicIpInfo>()
            .await?;
        Ok(info)
    }
}

/// IPv4 addresses of every local interface, loopback included
pub fn local_interfaces() -> Vec<InterfaceInfo> {
    let ifaces = match get_if_addrs() {
        Ok(ifaces) => ifaces,
        Err(e) => {
            warn!("cannot list network interfaces: {}", e);
            return Vec::new();
        }
    };

    let mut interfaces: Vec<InterfaceInfo> = ifaces
        .into_iter()
        .filter_map(|iface| match iface.addr {
            IfAddr::V4(v4) => Some(InterfaceInfo {
                interface: iface.name,
                ip: v4.ip.to_string(),
                netmask: v4.netmask.to_string(),
            }),
            IfAddr::V6(_) => None,
        })
        .collect();
    // Sort for stable output
    interfaces.sort_by(|a, b| (&a.interface, &a.ip).cmp(&(&b.interface, &b.ip)));
    interfaces
}

fn local_hostname() -> Option<String> {
    let name = gethostname().to_string_lossy().trim().to_string();
    (!name.is_empty()).then_some(name)
}

/// Source address the OS would use for outbound traffic.
///
/// Connecting a UDP socket only selects a route; no packet is sent.
async fn default_route_ip() -> Option<IpAddr> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await.ok()?;
    socket.connect(ROUTE_TARGET_ADDR).await.ok()?;
    let ip = socket.local_addr().ok()?.ip();
    (!ip.is_unspecified() && !ip.is_loopback()).then_some(ip)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_failed_lookup_degrades_to_sentinels() {
        // nothing listens on port 9 locally
        let collector = NetworkInfoCollector::new("http://127.0.0.1:9/json", Duration::from_millis(500));
        let info = collector.get().await;
        assert_eq!(info.public_ip, UNAVAILABLE);
        assert_eq!(info.country, UNAVAILABLE);
        assert_eq!(info.isp, UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_info_is_cached_until_refresh() {
        let collector = NetworkInfoCollector::new("http://127.0.0.1:9/json", Duration::from_millis(500));
        let first = collector.get().await;
        let second = collector.get().await;
        assert_eq!(first.timestamp, second.timestamp);

        let refreshed = collector.refresh().await;
        assert!(refreshed.timestamp >= first.timestamp);
    }

    #[test]
    fn test_public_info_tolerates_missing_fields() {
        let info: PublicIpInfo = serde_json::from_str(r#"{"ip": "203.0.113.9", "city": "Oslo"}"#).unwrap();
        assert_eq!(info.ip.as_deref(), Some("203.0.113.9"));
        assert!(info.org.is_none());
    }

    #[test]
    fn test_local_interfaces_are_ipv4() {
        for iface in local_interfaces() {
            assert!(iface.ip.parse::<Ipv4Addr>().is_ok());
            assert!(!iface.interface.is_empty());
        }
    }

    #[test]
    fn test_hostname_is_resolved() {
        let hostname = local_hostname().expect("hostname");
        assert_ne!(hostname, UNAVAILABLE);
        assert_eq!(hostname, hostname.trim());
    }

    #[tokio::test]
    async fn test_local_ip_is_routable_or_sentinel() {
        let collector = NetworkInfoCollector::new("http://127.0.0.1:9/json", Duration::from_millis(500));
        let info = collector.get().await;
        assert!(!info.hostname.is_empty());
        assert_ne!(info.hostname, UNAVAILABLE);
        if info.local_ip != UNAVAILABLE {
            let ip: Ipv4Addr = info.local_ip.parse().expect("ipv4 local address");
            assert!(!ip.is_loopback());
            assert!(!ip.is_unspecified());
        }
    }
}
