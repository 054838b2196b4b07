//! Local and network URLs for a bound port.

use std::net::{IpAddr, Ipv4Addr};

/// URL reachable from this machine.
///
/// Wildcard and loopback hosts are reported as `localhost`.
pub(crate) fn local_url(host: &str, port: u16) -> String {
    match host.parse::<IpAddr>() {
        Ok(ip) if ip.is_unspecified() || ip.is_loopback() => format!("http://localhost:{port}"),
        Ok(ip) => url_for(ip, port),
        Err(_) => format!("http://{host}:{port}"),
    }
}

/// URL reachable from other machines on the local network.
///
/// Falls back to the local URL when no LAN address can be determined or the
/// server is bound to a specific non-wildcard host.
pub(crate) fn network_url(host: &str, port: u16) -> String {
    let wildcard = host
        .parse::<IpAddr>()
        .is_ok_and(|ip| ip.is_unspecified());
    if !wildcard {
        return local_url(host, port);
    }

    let interfaces = match if_addrs::get_if_addrs() {
        Ok(interfaces) => interfaces,
        Err(err) => {
            tracing::debug!(error = %err, "Cannot list network interfaces");
            return local_url(host, port);
        }
    };

    match lan_ipv4(interfaces.iter().map(if_addrs::Interface::ip)) {
        Some(ip) => url_for(IpAddr::V4(ip), port),
        None => local_url(host, port),
    }
}

/// First non-loopback IPv4 address.
fn lan_ipv4(addrs: impl IntoIterator<Item = IpAddr>) -> Option<Ipv4Addr> {
    addrs.into_iter().find_map(|ip| match ip {
        IpAddr::V4(v4) if !v4.is_loopback() && !v4.is_unspecified() => Some(v4),
        _ => None,
    })
}

/// IPv6 literals are bracketed in URL authorities.
fn url_for(ip: IpAddr, port: u16) -> String {
    match ip {
        IpAddr::V4(v4) => format!("http://{v4}:{port}"),
        IpAddr::V6(v6) => format!("http://[{v6}]:{port}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv6Addr;

    #[test]
    fn test_local_url_wildcard_is_localhost() {
        assert_eq!(local_url("0.0.0.0", 3001), "http://localhost:3001");
        assert_eq!(local_url("::", 3001), "http://localhost:3001");
    }

    #[test]
    fn test_local_url_loopback_is_localhost() {
        assert_eq!(local_url("127.0.0.1", 3000), "http://localhost:3000");
        assert_eq!(local_url("::1", 3000), "http://localhost:3000");
    }

    #[test]
    fn test_local_url_keeps_named_host() {
        assert_eq!(local_url("localhost", 8080), "http://localhost:8080");
        assert_eq!(local_url("192.168.1.10", 8080), "http://192.168.1.10:8080");
    }

    #[test]
    fn test_local_url_brackets_ipv6() {
        let url = local_url("2001:db8::5", 3000);
        assert_eq!(url, "http://[2001:db8::5]:3000");

        let uri: axum::http::Uri = url.parse().unwrap();
        assert_eq!(uri.host(), Some("[2001:db8::5]"));
        assert_eq!(uri.port_u16(), Some(3000));
    }

    #[test]
    fn test_network_url_for_specific_host_is_local() {
        assert_eq!(network_url("127.0.0.1", 3000), "http://localhost:3000");
        assert_eq!(network_url("2001:db8::5", 3000), "http://[2001:db8::5]:3000");
    }

    #[test]
    fn test_network_url_for_wildcard_has_port() {
        let url = network_url("0.0.0.0", 3000);
        assert!(url.starts_with("http://"));
        assert!(url.ends_with(":3000"));
    }

    #[test]
    fn test_lan_ipv4_skips_loopback_and_ipv6() {
        let addrs = [
            IpAddr::V4(Ipv4Addr::LOCALHOST),
            IpAddr::V6(Ipv6Addr::new(0xfe80, 0, 0, 0, 0, 0, 0, 1)),
            IpAddr::V4(Ipv4Addr::new(192, 168, 1, 20)),
            IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)),
        ];
        assert_eq!(lan_ipv4(addrs), Some(Ipv4Addr::new(192, 168, 1, 20)));
        assert_eq!(lan_ipv4([IpAddr::V4(Ipv4Addr::LOCALHOST)]), None);
    }
}
