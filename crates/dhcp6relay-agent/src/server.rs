use crate::classify::{classify, DropReason, Verdict};
use crate::link::{self, LinkEvent};
use crate::listener::{ListenSockets, SocketKind};
use crate::upstream::UpstreamSession;
use crate::v6::packet::{type_name, MAX_MESSAGE_SIZE};
use crate::v6::relay::RelayForward;
use dhcp6relay_core::config::RelayConfig;
use dhcp6relay_core::error::{Error, Result};
use dhcp6relay_core::types::{PeerIdentity, Trust};
use std::io;
use std::net::SocketAddr;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

/// What happened to one inbound datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayOutcome {
    /// Relayed upstream; carries the number of bytes sent.
    Forwarded(usize),
    Dropped(DropReason),
    /// Longer than [`MAX_MESSAGE_SIZE`]; never looked at. The length is
    /// what was read, which the socket caps one byte past the limit.
    Oversized(usize),
}

/// Relay state for one point-to-point link.
///
/// Owns the listening sockets (present only while the link is up) and the
/// upstream session. Everything runs on one task; nothing here is shared.
pub struct Dhcpv6Relay {
    interface: String,
    listen_port: u16,
    trust: Trust,
    identity: PeerIdentity,
    upstream: Option<UpstreamSession>,
    listeners: Option<ListenSockets>,
}

impl Dhcpv6Relay {
    /// `upstream` is the resolved server address; `None` keeps the relay
    /// passive for the lifetime of the link. The peer identity arrives
    /// with each link-up.
    pub fn new(config: &RelayConfig, upstream: Option<SocketAddr>) -> Self {
        Self {
            interface: config.interface.clone(),
            listen_port: config.listen_port,
            trust: config.trust,
            identity: PeerIdentity::default(),
            upstream: upstream.map(UpstreamSession::new),
            listeners: None,
        }
    }

    pub fn is_up(&self) -> bool {
        self.listeners.is_some()
    }

    pub fn trust(&self) -> Trust {
        self.trust
    }

    pub fn upstream(&self) -> Option<&UpstreamSession> {
        self.upstream.as_ref()
    }

    /// Down -> Up. Returns `Ok(false)` when no upstream is configured and
    /// the relay stays down on purpose. On error nothing is left open.
    pub fn link_up(&mut self, identity: PeerIdentity) -> Result<bool> {
        if self.upstream.is_none() {
            debug!(
                interface = %self.interface,
                "no DHCPv6 server configured, not listening for clients"
            );
            return Ok(false);
        }
        if self.is_up() {
            self.link_down();
        }

        let link_local = link::discover_link_local(&self.interface)?;
        let sockets = ListenSockets::open(link_local, self.listen_port)?;

        info!(
            interface = %self.interface,
            local = %sockets.local_addr(),
            trust = %self.trust,
            "DHCPv6 relay: ready"
        );
        self.identity = identity;
        self.listeners = Some(sockets);
        Ok(true)
    }

    /// Up -> Down. Closes both listening sockets; harmless when already down.
    /// The upstream session is kept for the next link-up.
    pub fn link_down(&mut self) {
        if self.listeners.take().is_some() {
            info!(interface = %self.interface, "DHCPv6 relay: listening sockets closed");
        }
    }

    pub async fn run(
        mut self,
        events: mpsc::Receiver<LinkEvent>,
        shutdown: watch::Receiver<bool>,
    ) -> anyhow::Result<()> {
        info!(
            interface = %self.interface,
            upstream = ?self.upstream.as_ref().map(UpstreamSession::destination),
            "DHCPv6 relay started"
        );

        let mut events = events;
        let mut shutdown = shutdown;

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(LinkEvent::Up(identity)) => {
                        if let Err(e) = self.link_up(identity) {
                            error!("DHCPv6 relay: link-up on {} failed: {e}", self.interface);
                        }
                    }
                    Some(LinkEvent::Down) => self.link_down(),
                    None => {
                        info!("link event source closed, DHCPv6 relay stopping");
                        break;
                    }
                },
                ready = wait_readable(self.listeners.as_ref()) => match ready {
                    Ok(kind) => self.handle_readable(kind).await,
                    Err(e) => {
                        error!("DHCPv6 relay: listening socket failed: {e}");
                        self.link_down();
                    }
                },
                res = shutdown.changed() => {
                    if res.is_err() || *shutdown.borrow() {
                        info!("DHCPv6 relay shutting down");
                        break;
                    }
                }
            }
        }

        self.link_down();
        if let Some(upstream) = self.upstream.as_mut() {
            upstream.reset();
        }
        Ok(())
    }

    /// Read one datagram from the ready socket and push it through the
    /// relay pipeline. Failures are logged and the datagram is dropped.
    async fn handle_readable(&mut self, kind: SocketKind) {
        let Some(listeners) = self.listeners.as_ref() else {
            return;
        };

        // One spare byte tells an oversized datagram from a maximal one.
        let mut buf = [0u8; MAX_MESSAGE_SIZE + 1];
        let (len, src) = match listeners.try_recv(kind, &mut buf) {
            Ok(r) => r,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
            Err(e) => {
                warn!("DHCPv6 relay: failed to read from {kind} socket: {e}");
                return;
            }
        };

        match self.relay_datagram(&buf[..len], src, kind).await {
            Ok(RelayOutcome::Forwarded(_)) => {}
            Ok(RelayOutcome::Dropped(reason)) if reason.is_policy_violation() => {
                warn!("Discarding DHCPv6 message from {src} on {}: {reason}", self.interface);
            }
            Ok(RelayOutcome::Dropped(reason)) => {
                debug!("Discarding DHCPv6 message from {src}: {reason}");
            }
            Ok(RelayOutcome::Oversized(_)) => {
                warn!("DHCPv6 relay: dropping datagram from {src}: more than {MAX_MESSAGE_SIZE} bytes");
            }
            Err(Error::Io(e)) if e.kind() == io::ErrorKind::WouldBlock => {
                warn!("DHCPv6 relay: upstream send buffer full, dropping message from {src}");
            }
            Err(e) => {
                error!("DHCPv6 relay: unable to relay message from {src}: {e}");
            }
        }
    }

    /// Classify, encapsulate and forward one datagram received from `src`.
    pub async fn relay_datagram(
        &mut self,
        data: &[u8],
        src: SocketAddr,
        kind: SocketKind,
    ) -> Result<RelayOutcome> {
        if data.len() > MAX_MESSAGE_SIZE {
            return Ok(RelayOutcome::Oversized(data.len()));
        }

        debug!(
            socket = %kind,
            source = %src,
            bytes = data.len(),
            msg_type = data.first().map_or("none", |t| type_name(*t)),
            "DHCPv6 message received"
        );

        if let Verdict::Drop(reason) = classify(data, self.trust) {
            return Ok(RelayOutcome::Dropped(reason));
        }

        let upstream = self
            .upstream
            .as_mut()
            .ok_or_else(|| Error::Config("no DHCPv6 server configured".to_string()))?;
        upstream.ensure_connected().await?;
        let relay_port = upstream.local_port()?;

        let message = RelayForward::build(data, src, relay_port, &self.identity)?;
        let sent = upstream.send(&message)?;
        Ok(RelayOutcome::Forwarded(sent))
    }
}

async fn wait_readable(listeners: Option<&ListenSockets>) -> io::Result<SocketKind> {
    match listeners {
        Some(l) => l.readable().await,
        None => std::future::pending().await,
    }
}
