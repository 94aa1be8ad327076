use std::net::{IpAddr, Ipv4Addr};

use tracing::debug;

/// Broadcasts tried on every attempt regardless of what the interface list
/// says. Some platforms hide the real subnet mask, and phones acting as a
/// hotspot commonly sit on 192.168.43.0/24.
pub const FALLBACK_BROADCASTS: [Ipv4Addr; 5] = [
    Ipv4Addr::BROADCAST,
    Ipv4Addr::new(192, 168, 0, 255),
    Ipv4Addr::new(192, 168, 1, 255),
    Ipv4Addr::new(192, 168, 43, 255),
    Ipv4Addr::new(10, 0, 0, 255),
];

/// Directed broadcast for `addr`, assuming a /24 prefix.
pub fn subnet_broadcast(addr: Ipv4Addr) -> Ipv4Addr {
    let [a, b, c, _] = addr.octets();
    Ipv4Addr::new(a, b, c, 255)
}

fn usable(addr: &Ipv4Addr) -> bool {
    !addr.is_loopback() && !addr.is_unspecified() && !addr.is_link_local()
}

/// Every address a discovery token is sent to, deduplicated, interface
/// broadcasts first.
pub fn broadcast_targets() -> Vec<IpAddr> {
    let mut out: Vec<IpAddr> = Vec::new();
    match local_ip_address::list_afinet_netifas() {
        Ok(ifaces) => {
            for (name, ip) in ifaces {
                let IpAddr::V4(v4) = ip else { continue };
                if !usable(&v4) {
                    continue;
                }
                let b = IpAddr::V4(subnet_broadcast(v4));
                debug!(iface = %name, addr = %v4, broadcast = %b, "discovery interface");
                push_unique(&mut out, b);
            }
        }
        Err(e) => debug!(error = %e, "interface enumeration failed, using fallbacks only"),
    }
    for b in FALLBACK_BROADCASTS {
        push_unique(&mut out, IpAddr::V4(b));
    }
    out
}

fn push_unique(v: &mut Vec<IpAddr>, ip: IpAddr) {
    if !v.contains(&ip) {
        v.push(ip);
    }
}
