//! Finds the IPv4 address other machines on the LAN should connect to.
//!
//! "Connecting" a UDP socket sends no packets; it only asks the OS routing
//! table which local interface would be used to reach the target.  That
//! interface's address is the one peers on the same network can dial.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use tokio::net::UdpSocket;
use tracing::debug;

/// Any routable public address works; nothing is ever sent to it.
const ROUTE_PROBE: SocketAddr = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8)), 80);

/// Returns the machine's outbound IPv4 address, or `127.0.0.1` when the
/// machine has no route (offline, sandboxed, ...).
pub async fn discover_lan_ip() -> IpAddr {
    match probe().await {
        Ok(ip) => ip,
        Err(e) => {
            debug!("LAN address probe failed ({e}); falling back to loopback");
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        }
    }
}

async fn probe() -> std::io::Result<IpAddr> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await?;
    socket.connect(ROUTE_PROBE).await?;
    Ok(socket.local_addr()?.ip())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_discovered_address_is_ipv4_and_not_unspecified() {
        let ip = discover_lan_ip().await;
        assert!(ip.is_ipv4());
        assert!(!ip.is_unspecified());
    }
}
