//! Reachability check for the local anonymizing relay

use std::time::Duration;
use tokio::net::TcpStream;
use tracing::debug;

/// Whether something accepts TCP connections on `addr` within `timeout`
pub async fn is_relay_available(addr: &str, timeout: Duration) -> bool {
    match tokio::time::timeout(timeout, TcpStream::connect(addr)).await {
        Ok(Ok(_)) => true,
        Ok(Err(e)) => {
            debug!("relay at {} unreachable: {}", addr, e);
            false
        }
        Err(_) => {
            debug!("relay at {} did not answer within {:?}", addr, timeout);
            false
        }
    }
}
