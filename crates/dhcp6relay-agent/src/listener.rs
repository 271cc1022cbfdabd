use crate::v6::packet::ALL_DHCP_RELAY_AGENTS_AND_SERVERS;
use dhcp6relay_core::error::{Error, Result};
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{SocketAddr, SocketAddrV6};
use tokio::net::UdpSocket;
use tracing::{debug, warn};

/// Which listening socket a datagram arrived on. Both feed the same
/// pipeline; the distinction only shows up in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketKind {
    LinkLocal,
    Multicast,
}

impl std::fmt::Display for SocketKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SocketKind::LinkLocal => write!(f, "LL"),
            SocketKind::Multicast => write!(f, "MC"),
        }
    }
}

/// The link-local unicast and All_DHCP_Relay_Agents_and_Servers multicast
/// sockets of one link. They exist together or not at all.
pub struct ListenSockets {
    link_local: UdpSocket,
    multicast: UdpSocket,
    local: SocketAddrV6,
}

impl ListenSockets {
    /// Bind both sockets on `port`.
    ///
    /// `link_local` must carry the interface index as scope id. On any
    /// failure every socket created so far is closed before returning.
    /// Must be called from within the tokio runtime.
    pub fn open(link_local: SocketAddrV6, port: u16) -> Result<Self> {
        let scope_id = link_local.scope_id();
        let local = SocketAddrV6::new(*link_local.ip(), port, 0, scope_id);

        let ll = new_socket("create LL socket")?;
        if let Err(e) = ll.set_unicast_hops_v6(1) {
            warn!("DHCPv6 relay: unable to limit LL socket hop count: {e}");
        }
        ll.bind(&local.into())
            .map_err(Error::setup("bind LL socket"))?;

        let mc = new_socket("create MC socket")?;
        mc.join_multicast_v6(&ALL_DHCP_RELAY_AGENTS_AND_SERVERS, scope_id)
            .map_err(Error::setup("join multicast group"))?;
        let group = SocketAddrV6::new(ALL_DHCP_RELAY_AGENTS_AND_SERVERS, port, 0, scope_id);
        mc.bind(&group.into())
            .map_err(Error::setup("bind MC socket"))?;

        let link_local = UdpSocket::from_std(ll.into())
            .map_err(Error::setup("register LL socket"))?;
        let multicast = UdpSocket::from_std(mc.into())
            .map_err(Error::setup("register MC socket"))?;

        debug!(%local, %group, "DHCPv6 relay: listening sockets bound");

        Ok(Self {
            link_local,
            multicast,
            local,
        })
    }

    /// Wrap sockets that are already bound, e.g. on loopback.
    #[cfg(test)]
    pub(crate) fn from_sockets(link_local: UdpSocket, multicast: UdpSocket) -> Self {
        let local = match link_local.local_addr() {
            Ok(SocketAddr::V6(addr)) => addr,
            other => panic!("link-local socket must be IPv6, got {other:?}"),
        };
        Self {
            link_local,
            multicast,
            local,
        }
    }

    pub fn local_addr(&self) -> SocketAddrV6 {
        self.local
    }

    pub fn socket(&self, kind: SocketKind) -> &UdpSocket {
        match kind {
            SocketKind::LinkLocal => &self.link_local,
            SocketKind::Multicast => &self.multicast,
        }
    }

    /// Wait until either socket has a datagram queued.
    pub async fn readable(&self) -> io::Result<SocketKind> {
        tokio::select! {
            r = self.link_local.readable() => r.map(|_| SocketKind::LinkLocal),
            r = self.multicast.readable() => r.map(|_| SocketKind::Multicast),
        }
    }

    /// Read at most one datagram without waiting.
    pub fn try_recv(&self, kind: SocketKind, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        self.socket(kind).try_recv_from(buf)
    }
}

fn new_socket(context: &'static str) -> Result<Socket> {
    let socket = Socket::new(Domain::IPV6, Type::DGRAM, Some(Protocol::UDP))
        .map_err(Error::setup(context))?;
    socket
        .set_only_v6(true)
        .map_err(Error::setup(context))?;
    socket
        .set_nonblocking(true)
        .map_err(Error::setup(context))?;
    Ok(socket)
}
