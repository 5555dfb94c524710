//! Finding the decode service on the local network.
//!
//! The device broadcasts `"<prefix>:<receive port>"` over UDP; the service
//! connects back to that port and writes `"<host>:<port>"` of its decode
//! listener.

use std::{
    fmt,
    io,
    net::{Ipv4Addr, SocketAddr, ToSocketAddrs, UdpSocket},
    str::FromStr,
};

use super::protocol::ProtocolError;
use crate::app::config::DEFAULT_NETMASK;

/// `(ip & netmask) | !netmask`
pub fn broadcast_address(ip: Ipv4Addr, netmask: Ipv4Addr) -> Ipv4Addr {
    let ip = u32::from(ip);
    let mask = u32::from(netmask);
    Ipv4Addr::from((ip & mask) | !mask)
}

/// Broadcast address of the subnet `ip` lives on.
///
/// A configured netmask wins over the one `lookup` reports for the interface;
/// without either the subnet is assumed to be a /24.
pub fn subnet_broadcast(
    ip: Ipv4Addr,
    configured: Option<Ipv4Addr>,
    lookup: impl FnOnce(Ipv4Addr) -> Option<Ipv4Addr>,
) -> Ipv4Addr {
    let netmask = configured.or_else(|| lookup(ip)).unwrap_or_else(|| {
        log::warn!("net: netmask_unknown ip={ip} fallback={DEFAULT_NETMASK}");
        DEFAULT_NETMASK
    });
    broadcast_address(ip, netmask)
}

/// Netmask of the local interface holding `ip`.
pub fn interface_netmask(ip: Ipv4Addr) -> Option<Ipv4Addr> {
    let interfaces = match if_addrs::get_if_addrs() {
        Ok(interfaces) => interfaces,
        Err(err) => {
            log::warn!("net: interface_list_failed err={err}");
            return None;
        }
    };
    interfaces.into_iter().find_map(|iface| match iface.addr {
        if_addrs::IfAddr::V4(v4) if v4.ip == ip => Some(v4.netmask),
        _ => None,
    })
}

pub fn sniff_message(prefix: &str, receive_port: u16) -> String {
    format!("{prefix}:{receive_port}")
}

/// Service side: the reply port of a sniff datagram carrying `prefix`.
pub fn parse_sniff(prefix: &str, datagram: &[u8]) -> Option<u16> {
    let text = std::str::from_utf8(datagram).ok()?.trim();
    let (code, port) = text.split_once(':')?;
    if code != prefix {
        return None;
    }
    port.trim().parse().ok()
}

/// Address of this host on the network that routes to the outside world.
///
/// Connecting a UDP socket only selects a route; nothing is sent.
pub fn local_ipv4() -> io::Result<Ipv4Addr> {
    let route = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
    route.connect((Ipv4Addr::new(8, 8, 8, 8), 80))?;
    match route.local_addr()? {
        SocketAddr::V4(addr) => Ok(*addr.ip()),
        SocketAddr::V6(_) => Err(io::Error::new(
            io::ErrorKind::AddrNotAvailable,
            "no ipv4 route",
        )),
    }
}

pub fn send_sniff(target: SocketAddr, message: &str) -> io::Result<()> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
    socket.set_broadcast(true)?;
    socket.send_to(message.as_bytes(), target)?;
    log::debug!("net: sniff_sent target={target} msg={message}");
    Ok(())
}

/// Decode service address as advertised by the service.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn resolve(&self) -> Result<SocketAddr, ProtocolError> {
        (self.host.as_str(), self.port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| ProtocolError::Malformed(format!("unresolvable host {}", self.host)))
    }
}

impl FromStr for Endpoint {
    type Err = ProtocolError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let raw = raw.trim();
        let (host, port) = raw
            .rsplit_once(':')
            .ok_or_else(|| ProtocolError::Malformed(format!("endpoint {raw:?} lacks a port")))?;
        let port = port
            .parse()
            .map_err(|_| ProtocolError::Malformed(format!("endpoint {raw:?} has a bad port")))?;
        if host.is_empty() {
            return Err(ProtocolError::Malformed(format!("endpoint {raw:?} lacks a host")));
        }
        Ok(Self::new(host, port))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broadcast_covers_host_bits() {
        let cases = [
            ("192.168.1.37", "255.255.255.0", "192.168.1.255"),
            ("10.1.2.3", "255.0.0.0", "10.255.255.255"),
            ("172.16.5.9", "255.255.240.0", "172.16.15.255"),
        ];
        for (ip, mask, expected) in cases {
            let ip: Ipv4Addr = ip.parse().expect("ip");
            let mask: Ipv4Addr = mask.parse().expect("mask");
            assert_eq!(broadcast_address(ip, mask).to_string(), expected);
        }
    }

    #[test]
    fn subnet_broadcast_prefers_configured_then_interface_mask() {
        let ip = Ipv4Addr::new(10, 1, 2, 3);
        let slash16 = |_| Some(Ipv4Addr::new(255, 255, 0, 0));

        assert_eq!(
            subnet_broadcast(ip, None, slash16),
            Ipv4Addr::new(10, 1, 255, 255)
        );
        assert_eq!(
            subnet_broadcast(ip, Some(Ipv4Addr::new(255, 255, 255, 0)), slash16),
            Ipv4Addr::new(10, 1, 2, 255)
        );
        assert_eq!(
            subnet_broadcast(ip, None, |_| None),
            Ipv4Addr::new(10, 1, 2, 255)
        );
    }

    #[test]
    fn loopback_interface_reports_its_netmask() {
        let netmask = interface_netmask(Ipv4Addr::LOCALHOST).expect("loopback netmask");
        assert_eq!(
            broadcast_address(Ipv4Addr::LOCALHOST, netmask).octets()[0],
            127
        );
        assert_eq!(interface_netmask(Ipv4Addr::new(203, 0, 113, 77)), None);
    }

    #[test]
    fn sniff_message_round_trips_through_service_parse() {
        let msg = sniff_message("RequestServerForGesture", 9528);
        assert_eq!(msg, "RequestServerForGesture:9528");
        assert_eq!(parse_sniff("RequestServerForGesture", msg.as_bytes()), Some(9528));
        assert_eq!(parse_sniff("RequestServerForGesture", b"Other:9528"), None);
        assert_eq!(parse_sniff("RequestServerForGesture", b"garbage"), None);
    }

    #[test]
    fn endpoint_parses_host_and_port() {
        let endpoint: Endpoint = "192.168.0.4:10086".parse().expect("endpoint");
        assert_eq!(endpoint, Endpoint::new("192.168.0.4", 10086));
        assert_eq!(endpoint.to_string(), "192.168.0.4:10086");

        assert!("192.168.0.4".parse::<Endpoint>().is_err());
        assert!(":10086".parse::<Endpoint>().is_err());
        assert!("host:port".parse::<Endpoint>().is_err());
    }
}
