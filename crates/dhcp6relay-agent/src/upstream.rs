use crate::v6::relay::RelayForward;
use dhcp6relay_core::error::{Error, Result};
use socket2::SockRef;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use tokio::net::UdpSocket;
use tracing::{debug, info};

/// Resolve the configured upstream server to a socket address.
///
/// Accepts `ip`, `[ipv6]:port`, `ipv4:port`, `host` and `host:port`. A
/// name resolving to several addresses yields the first IPv6 one, or the
/// first IPv4 one when there is no IPv6 address.
pub async fn resolve_upstream(server: &str, default_port: u16) -> Result<SocketAddr> {
    let server = server.trim();
    if server.is_empty() {
        return Err(Error::Config("dhcpv6 server must not be empty".to_string()));
    }

    if let Ok(addr) = server.parse::<SocketAddr>() {
        return Ok(addr);
    }
    if let Ok(ip) = server.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, default_port));
    }

    let (host, port) = match server.rsplit_once(':') {
        Some((host, port)) if !host.contains(':') => {
            let port = port.parse::<u16>().map_err(|e| Error::Resolve {
                host: server.to_string(),
                reason: format!("invalid port: {e}"),
            })?;
            (host, port)
        }
        _ => (server, default_port),
    };

    let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host, port))
        .await
        .map_err(|e| Error::Resolve {
            host: server.to_string(),
            reason: e.to_string(),
        })?
        .collect();

    prefer_ipv6(&addrs).ok_or_else(|| Error::Resolve {
        host: server.to_string(),
        reason: "no usable address".to_string(),
    })
}

fn prefer_ipv6(addrs: &[SocketAddr]) -> Option<SocketAddr> {
    addrs
        .iter()
        .find(|a| a.is_ipv6())
        .or_else(|| addrs.first())
        .copied()
}

/// The single socket towards the upstream server or relay.
///
/// Created on first use, connected to the destination so every send goes
/// there, and kept for reuse until a send fails.
pub struct UpstreamSession {
    destination: SocketAddr,
    socket: Option<UdpSocket>,
}

impl UpstreamSession {
    pub fn new(destination: SocketAddr) -> Self {
        Self {
            destination,
            socket: None,
        }
    }

    pub fn destination(&self) -> SocketAddr {
        self.destination
    }

    pub fn is_connected(&self) -> bool {
        self.socket.is_some()
    }

    /// Create and connect the upstream socket unless it already exists.
    pub async fn ensure_connected(&mut self) -> Result<&UdpSocket> {
        let socket = match self.socket.take() {
            Some(socket) => socket,
            None => self.connect().await?,
        };
        Ok(&*self.socket.insert(socket))
    }

    async fn connect(&self) -> Result<UdpSocket> {
        let local: SocketAddr = match self.destination {
            SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
            SocketAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
        };

        let socket = UdpSocket::bind(local)
            .await
            .map_err(Error::setup("bind upstream socket"))?;
        socket
            .connect(self.destination)
            .await
            .map_err(Error::setup("connect upstream socket"))?;

        info!(
            upstream = %self.destination,
            local = ?socket.local_addr().ok(),
            "DHCPv6 relay: upstream socket connected"
        );
        Ok(socket)
    }

    /// Local port of the connected socket; replies from upstream return here.
    pub fn local_port(&self) -> Result<u16> {
        let socket = self.socket.as_ref().ok_or_else(not_connected)?;
        Ok(socket.local_addr()?.port())
    }

    /// Transmit a relay-forward message in one non-blocking vectored write.
    ///
    /// A full send buffer surfaces as `WouldBlock` and the packet is lost.
    /// Any other failure also drops the socket so the next packet starts
    /// with a fresh one.
    pub fn send(&mut self, message: &RelayForward<'_>) -> Result<usize> {
        let socket = self.socket.as_ref().ok_or_else(not_connected)?;
        let slices = message.io_slices();
        let result = SockRef::from(socket).send_vectored(&slices);

        match result {
            Ok(sent) => {
                debug!(
                    upstream = %self.destination,
                    bytes = sent,
                    "relay-forw transmitted"
                );
                Ok(sent)
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Err(e.into()),
            Err(e) => {
                self.socket = None;
                Err(e.into())
            }
        }
    }

    pub fn reset(&mut self) {
        if self.socket.take().is_some() {
            debug!(upstream = %self.destination, "upstream socket closed");
        }
    }
}

fn not_connected() -> Error {
    Error::Io(io::Error::from(io::ErrorKind::NotConnected))
}

#[cfg(test)]
mod tests {
    use super::*;
    use dhcp6relay_core::types::PeerIdentity;
    use std::net::SocketAddrV6;

    #[test]
    fn test_prefer_ipv6() {
        let v4: SocketAddr = "192.0.2.1:547".parse().unwrap();
        let v6: SocketAddr = "[2001:db8::1]:547".parse().unwrap();
        assert_eq!(prefer_ipv6(&[v4, v6]), Some(v6));
        assert_eq!(prefer_ipv6(&[v4]), Some(v4));
        assert_eq!(prefer_ipv6(&[]), None);
    }

    #[tokio::test]
    async fn test_resolve_literals() {
        assert_eq!(
            resolve_upstream("2001:db8::5", 547).await.unwrap(),
            "[2001:db8::5]:547".parse().unwrap()
        );
        assert_eq!(
            resolve_upstream("[2001:db8::5]:5547", 547).await.unwrap(),
            "[2001:db8::5]:5547".parse().unwrap()
        );
        assert_eq!(
            resolve_upstream("192.0.2.10", 547).await.unwrap(),
            "192.0.2.10:547".parse().unwrap()
        );
        assert_eq!(
            resolve_upstream(" 192.0.2.10:600 ", 547).await.unwrap(),
            "192.0.2.10:600".parse().unwrap()
        );
    }

    #[tokio::test]
    async fn test_resolve_rejects_bad_input() {
        assert!(matches!(
            resolve_upstream("", 547).await,
            Err(Error::Config(_))
        ));
        assert!(matches!(
            resolve_upstream("server.invalid:notaport", 547).await,
            Err(Error::Resolve { .. })
        ));
    }

    #[tokio::test]
    async fn test_send_without_connect() {
        let mut session = UpstreamSession::new("127.0.0.1:547".parse().unwrap());
        let peer = SocketAddr::V6(SocketAddrV6::new("fe80::1".parse().unwrap(), 546, 0, 0));
        let fwd = RelayForward::build(&[1], peer, 0, &PeerIdentity::default()).unwrap();
        assert!(session.send(&fwd).is_err());
        assert!(session.local_port().is_err());
    }

    #[tokio::test]
    async fn test_connect_is_lazy_and_reused() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let mut session = UpstreamSession::new(server.local_addr().unwrap());
        assert!(!session.is_connected());

        session.ensure_connected().await.unwrap();
        let port = session.local_port().unwrap();
        assert_ne!(port, 0);

        session.ensure_connected().await.unwrap();
        assert_eq!(session.local_port().unwrap(), port);

        session.reset();
        assert!(!session.is_connected());
    }

    #[tokio::test]
    async fn test_send_single_datagram() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let mut session = UpstreamSession::new(server.local_addr().unwrap());
        session.ensure_connected().await.unwrap();
        let relay_port = session.local_port().unwrap();

        let peer = SocketAddr::V6(SocketAddrV6::new("fe80::99".parse().unwrap(), 546, 0, 0));
        let solicit = [1u8, 0x11, 0x22, 0x33];
        let fwd = RelayForward::build(&solicit, peer, relay_port, &PeerIdentity::default())
            .unwrap();
        let sent = session.send(&fwd).unwrap();
        assert_eq!(sent, fwd.len());

        let mut buf = [0u8; 512];
        let (len, from) = server.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..len], fwd.to_vec().as_slice());
        assert_eq!(from.port(), relay_port);
    }
}
