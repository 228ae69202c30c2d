//! Network utility functions
//!
//! Address parsing, network kinds and listener binding shared by the selector
//! and the gateway.

use serde::{Deserialize, Serialize};
use socket2::{Domain, Protocol, Socket, Type};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::str::FromStr;
use tokio::net::TcpListener;

use super::error::{Result, SelectorError};

/// Stream network a selector can listen on
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    /// IPv4 or IPv6, whichever the host resolves to first
    #[default]
    Tcp,
    /// IPv4 only
    Tcp4,
    /// IPv6 only
    Tcp6,
}

impl Network {
    /// Whether `ip` belongs to this network's address family
    pub fn accepts(&self, ip: &IpAddr) -> bool {
        match self {
            Self::Tcp => true,
            Self::Tcp4 => ip.is_ipv4(),
            Self::Tcp6 => ip.is_ipv6(),
        }
    }

    /// Address used when no host is given
    pub fn unspecified(&self) -> IpAddr {
        match self {
            Self::Tcp | Self::Tcp4 => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            Self::Tcp6 => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp => write!(f, "tcp"),
            Self::Tcp4 => write!(f, "tcp4"),
            Self::Tcp6 => write!(f, "tcp6"),
        }
    }
}

impl FromStr for Network {
    type Err = SelectorError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "tcp" => Ok(Self::Tcp),
            "tcp4" => Ok(Self::Tcp4),
            "tcp6" => Ok(Self::Tcp6),
            _ => Err(SelectorError::UnsupportedNetwork(s.to_string())),
        }
    }
}

impl<'de> Deserialize<'de> for Network {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Network::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// Split `host:port`, `:port` or `[v6]:port` into an optional host and a port
pub fn split_host_port(address: &str) -> Result<(Option<String>, u16)> {
    let (host, port) = address.rsplit_once(':').ok_or_else(|| {
        SelectorError::Config(format!("Missing port in address: {}", address))
    })?;

    let port = port
        .parse::<u16>()
        .map_err(|e| SelectorError::Config(format!("Invalid port in address {}: {}", address, e)))?;

    let host = host.trim_start_matches('[').trim_end_matches(']');
    let host = if host.is_empty() {
        None
    } else {
        Some(host.to_string())
    };

    Ok((host, port))
}

/// Resolve the address a selector should bind to
///
/// An absent or empty host binds the unspecified address of the network's
/// family. Host names are resolved and the first address of the requested
/// family wins.
pub async fn resolve_listen_addr(network: Network, host: Option<&str>, port: u16) -> Result<SocketAddr> {
    let host = match host.map(str::trim) {
        None | Some("") => return Ok(SocketAddr::new(network.unspecified(), port)),
        Some(host) => host,
    };

    if let Ok(ip) = host.parse::<IpAddr>() {
        if !network.accepts(&ip) {
            return Err(SelectorError::Config(format!(
                "Address {} does not belong to network {}",
                ip, network
            )));
        }
        return Ok(SocketAddr::new(ip, port));
    }

    tokio::net::lookup_host((host, port))
        .await
        .map_err(|e| SelectorError::Config(format!("Failed to resolve {}: {}", host, e)))?
        .find(|addr| network.accepts(&addr.ip()))
        .ok_or_else(|| {
            SelectorError::Config(format!("No {} address found for host {}", network, host))
        })
}

/// Bind a non-blocking TCP listener with `SO_REUSEADDR`
///
/// Must be called from within a tokio runtime.
pub fn bind_listener(addr: SocketAddr, network: Network, backlog: u32) -> Result<TcpListener> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    if network == Network::Tcp6 {
        socket.set_only_v6(true)?;
    }
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(backlog.min(i32::MAX as u32) as i32)?;

    let listener: std::net::TcpListener = socket.into();
    Ok(TcpListener::from_std(listener)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_from_str() {
        assert_eq!("tcp".parse::<Network>().unwrap(), Network::Tcp);
        assert_eq!("TCP4".parse::<Network>().unwrap(), Network::Tcp4);
        assert_eq!("tcp6".parse::<Network>().unwrap(), Network::Tcp6);

        let err = "udp".parse::<Network>().unwrap_err();
        assert!(matches!(err, SelectorError::UnsupportedNetwork(_)));
        assert!(err.is_config());
    }

    #[test]
    fn test_split_host_port() {
        assert_eq!(
            split_host_port("localhost:80").unwrap(),
            (Some("localhost".to_string()), 80)
        );
        assert_eq!(split_host_port(":9000").unwrap(), (None, 9000));
        assert_eq!(
            split_host_port("[::1]:443").unwrap(),
            (Some("::1".to_string()), 443)
        );
        assert!(split_host_port("no-port").is_err());
        assert!(split_host_port("host:http").is_err());
    }

    #[tokio::test]
    async fn test_resolve_listen_addr() {
        let addr = resolve_listen_addr(Network::Tcp, None, 7000).await.unwrap();
        assert_eq!(addr, "0.0.0.0:7000".parse().unwrap());

        let addr = resolve_listen_addr(Network::Tcp6, Some(""), 7000).await.unwrap();
        assert_eq!(addr, "[::]:7000".parse().unwrap());

        let addr = resolve_listen_addr(Network::Tcp4, Some("127.0.0.1"), 0).await.unwrap();
        assert_eq!(addr, "127.0.0.1:0".parse().unwrap());

        let err = resolve_listen_addr(Network::Tcp4, Some("::1"), 0).await.unwrap_err();
        assert!(err.is_config());
    }

    #[tokio::test]
    async fn test_bind_listener() {
        let addr = "127.0.0.1:0".parse().unwrap();
        let listener = bind_listener(addr, Network::Tcp4, 16).unwrap();
        let local = listener.local_addr().unwrap();
        assert!(local.ip().is_loopback());
        assert_ne!(local.port(), 0);
    }
}
